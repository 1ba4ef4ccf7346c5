//! Literal values carried by known-set types.

use std::fmt;

/// A literal value appearing in a known set.
///
/// Numeric-looking literals that are not integers keep their written text so
/// that set membership stays exact; strings compare case-sensitively.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SqlValue {
    /// An integer literal.
    Int(i64),
    /// A decimal, money or float literal, kept as written.
    Num(String),
    /// A string literal.
    Str(String),
}

impl SqlValue {
    /// True when the value is numerically zero.
    pub fn is_zero(&self) -> bool {
        match self {
            SqlValue::Int(n) => *n == 0,
            SqlValue::Num(text) => matches!(text.trim().parse::<f64>(), Ok(v) if v == 0.0),
            SqlValue::Str(_) => false,
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Int(n) => write!(f, "{}", n),
            SqlValue::Num(text) => write!(f, "{}", text),
            SqlValue::Str(text) => write!(f, "'{}'", text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_detection() {
        assert!(SqlValue::Int(0).is_zero());
        assert!(SqlValue::Num("0.0".to_string()).is_zero());
        assert!(!SqlValue::Int(3).is_zero());
        assert!(!SqlValue::Str("0".to_string()).is_zero());
    }

    #[test]
    fn display_quotes_strings() {
        assert_eq!(SqlValue::Str("apples".to_string()).to_string(), "'apples'");
        assert_eq!(SqlValue::Int(7).to_string(), "7");
    }
}
