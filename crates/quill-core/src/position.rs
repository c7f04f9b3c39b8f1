//! Editor coordinates.

use std::fmt;

/// A location in a buffer.
///
/// Lines are 1-based and columns are 0-based, both counted in Unicode scalar values.
/// `Position::new(1, 0)` is the start of every buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    /// Line number (1-based)
    pub line: usize,
    /// Column (0-based, chars)
    pub column: usize,
}

impl Position {
    /// Create a new position.
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    /// Start of the buffer.
    pub const fn start() -> Self {
        Self::new(1, 0)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_is_line_major() {
        assert!(Position::new(1, 9) < Position::new(2, 0));
        assert!(Position::new(3, 1) > Position::new(3, 0));
        assert_eq!(Position::new(4, 2).to_string(), "4.2");
    }
}
