//! Diagnostics for the compiler pipeline.
//!
//! Every stage reports failure through a [`Diagnostic`]: a single fatal
//! user error anchored at a source position. The driver prefixes the
//! source filename, prints `file:row:col: error: message` to stderr and
//! exits non-zero. There is no aggregation, no recovery and no warnings;
//! the first error wins. Internal invariant violations use `assert!` /
//! `unreachable!` instead and count as compiler bugs.

/// 1-based source position of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
    pub row: u32,
    pub col: u32,
}

impl Cursor {
    pub fn new(row: u32, col: u32) -> Self {
        Cursor { row, col }
    }
}

/// A fatal, positioned user error.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub cursor: Cursor,
    pub message: String,
}

impl Diagnostic {
    pub fn new(cursor: Cursor, message: impl Into<String>) -> Self {
        Diagnostic {
            cursor,
            message: message.into(),
        }
    }

    /// Render the canonical `file:row:col: error: message` line.
    pub fn render(&self, filename: &str) -> String {
        format!(
            "{}:{}:{}: error: {}",
            filename, self.cursor.row, self.cursor.col, self.message
        )
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}: error: {}",
            self.cursor.row, self.cursor.col, self.message
        )
    }
}

pub type CompileResult<T> = Result<T, Diagnostic>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_position() {
        let diag = Diagnostic::new(Cursor::new(3, 14), "unexpected token ';'");
        assert_eq!(
            diag.render("demo.cur"),
            "demo.cur:3:14: error: unexpected token ';'"
        );
    }

    #[test]
    fn test_display_without_filename() {
        let diag = Diagnostic::new(Cursor::new(1, 1), "boom");
        assert_eq!(diag.to_string(), "1:1: error: boom");
    }
}
