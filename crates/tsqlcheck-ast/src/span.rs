//! Source location information attached to every AST node.

/// A contiguous region of the original script.
///
/// `start`/`end` are byte offsets; `line`/`column` are one-based and refer to
/// the start of the region. Diagnostics render the end column as
/// `column + len`, which is adequate for single-line fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
    /// One-based line of `start`.
    pub line: u32,
    /// One-based column of `start`.
    pub column: u32,
}

impl Span {
    /// Create a span from its raw parts.
    pub fn new(start: usize, end: usize, line: u32, column: u32) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// Length of the region in bytes.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// True when the region is empty.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Smallest span covering both `self` and `other`.
    pub fn merge(&self, other: &Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            line: self.line.min(other.line),
            column: if self.line <= other.line {
                self.column
            } else {
                other.column
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_covers_both() {
        let a = Span::new(4, 9, 1, 5);
        let b = Span::new(12, 20, 2, 1);
        let m = a.merge(&b);
        assert_eq!(m.start, 4);
        assert_eq!(m.end, 20);
        assert_eq!(m.line, 1);
        assert_eq!(m.column, 5);
    }

    #[test]
    fn len_and_empty() {
        assert_eq!(Span::new(3, 8, 1, 4).len(), 5);
        assert!(Span::new(3, 3, 1, 4).is_empty());
    }
}
