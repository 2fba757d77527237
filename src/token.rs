use std::fmt;

/// Source location for error reporting.
///
/// Lines and columns are 1-based. `line_text` holds the full source
/// line the location points into.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Span {
    pub line_text: String,
    pub line: usize,
    pub column: usize,
}

impl Span {
    #[must_use]
    pub fn new(line_text: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            line_text: line_text.into(),
            line,
            column,
        }
    }

    /// Render the offending line with a caret under the column.
    ///
    /// ```text
    /// line 3: $ echo hi => x
    ///                   ^
    /// ```
    #[must_use]
    pub fn excerpt(&self) -> String {
        let text = if self.line_text.is_empty() {
            "<empty line>"
        } else {
            self.line_text.as_str()
        };
        let prefix = format!("line {}: ", self.line);
        let pad = " ".repeat(prefix.len() + self.column.saturating_sub(1));
        format!("{prefix}{text}\n{pad}^")
    }
}

/// Token kinds produced by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Command marker `$`.
    Peso,
    /// Command continuation marker `>`.
    Greater,
    /// `# test` directive.
    Test,
    /// `# setup` directive.
    Setup,
    /// `# teardown` directive.
    Teardown,
    /// `# continuation` / `# continue` directive.
    Continuation,
    /// `global` prefix of a setup/teardown directive.
    Global,
    /// ` of ` between a directive and its reference.
    Pointer,
    /// Equality arrow `=>`.
    AssertEq,
    /// Inequality arrow `=/>`.
    AssertNe,
    /// Free text.
    Text,
    /// Blank line in embedded-tests mode.
    NewLine,
    /// Insignificant lines (blank, comments, `<END>`); never repeated.
    Minor,
    /// End of input, always last.
    Eof,
}

impl TokenKind {
    /// Name used in diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Peso => "PESO",
            Self::Greater => "GREATER",
            Self::Test => "TEST",
            Self::Setup => "SETUP",
            Self::Teardown => "TEARDOWN",
            Self::Continuation => "CONTINUATION",
            Self::Global => "GLOBAL",
            Self::Pointer => "POINTER",
            Self::AssertEq => "ASSERT_EQ",
            Self::AssertNe => "ASSERT_NE",
            Self::Text => "TEXT",
            Self::NewLine => "NEW_LINE",
            Self::Minor => "MINOR",
            Self::Eof => "EOF",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single token with its kind, text, and source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
}

impl Token {
    #[must_use]
    pub fn new(kind: TokenKind, text: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            text: text.into(),
            span,
        }
    }
}
