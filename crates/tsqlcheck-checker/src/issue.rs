//! User-facing diagnostics.

use std::fmt;

use serde::Serialize;
use tsqlcheck_ast::Span;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueLevel {
    /// Informational only.
    Info,
    /// Heuristic findings that may be over- or under-cautious.
    Warning,
    /// A definite correctness problem.
    Error,
}

impl fmt::Display for IssueLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueLevel::Info => write!(f, "info"),
            IssueLevel::Warning => write!(f, "warning"),
            IssueLevel::Error => write!(f, "error"),
        }
    }
}

/// One diagnostic attributed to a source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    /// Where in the script the problem was found.
    pub span: Span,
    /// Severity.
    pub level: IssueLevel,
    /// Human-readable description.
    pub message: String,
}

impl Issue {
    /// Build a diagnostic.
    pub fn new(span: Span, level: IssueLevel, message: impl Into<String>) -> Self {
        Self {
            span,
            level,
            message: message.into(),
        }
    }

    /// The structured form handed to programmatic consumers.
    pub fn to_record(&self, file: &str) -> IssueRecord {
        IssueRecord {
            file: file.to_string(),
            start_line: self.span.line,
            start_column: self.span.column,
            end_column: self.span.column + self.span.len() as u32,
            level: self.level,
            message: self.message.clone(),
        }
    }

    /// The one-line console rendering.
    pub fn to_console_string(&self, file: &str) -> String {
        format!(
            "{}({},{}-{}): {}: {}",
            file,
            self.span.line,
            self.span.column,
            self.span.column + self.span.len() as u32,
            self.level,
            self.message
        )
    }
}

/// Serializable diagnostic record for editors and HTTP consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssueRecord {
    /// Name of the checked file.
    pub file: String,
    /// One-based line of the start of the span.
    pub start_line: u32,
    /// One-based column of the start of the span.
    pub start_column: u32,
    /// Column one past the end of the span.
    pub end_column: u32,
    /// Severity.
    pub level: IssueLevel,
    /// Human-readable description.
    pub message: String,
}

impl IssueRecord {
    /// Serialize to a JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Issue {
        Issue::new(
            Span::new(10, 15, 2, 4),
            IssueLevel::Error,
            "Cannot assign value of type varchar(3) to int.",
        )
    }

    #[test]
    fn console_format() {
        assert_eq!(
            sample().to_console_string("script.sql"),
            "script.sql(2,4-9): error: Cannot assign value of type varchar(3) to int."
        );
    }

    #[test]
    fn record_serializes_with_lowercase_level() {
        let json = sample().to_record("script.sql").to_json();
        assert!(json.contains("\"level\":\"error\""));
        assert!(json.contains("\"start_line\":2"));
    }
}
