use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::cursor::Cursor;
use crate::token::{Span, Token, TokenKind};

static GLOBAL_DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^#\s*global\s+(setup|teardown)(?:\s+|$)").expect("valid global directive regex")
});

static DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^#\s*(test|setup|teardown|continuation|continue)(?:\s+|$)")
        .expect("valid directive regex")
});

/// Comment lines kept verbatim by the embedded-tests transform.
static EMBEDDED_DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^#\s*(?:global|test|setup|teardown|continuation|continue)\b")
        .expect("valid embedded directive regex")
});

static POINTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*of(?:\s+|$)").expect("valid pointer regex"));

static PESO: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\$\s*").expect("valid peso regex"));

static GREATER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*>\s*").expect("valid greater regex"));

static ARROW: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*=/?>\s*").expect("valid arrow regex"));

const TAG_EOF: &str = "<EOF>";
const TAG_END: &str = "<END>";
const TAG_BLANK: &str = "<BLANK>";

/// Flags shared between the lexer and grammar assembly.
///
/// `embedded_tests` is an input; the other two are observed while
/// lexing and let the grammar skip productions the input cannot use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Context {
    pub embedded_tests: bool,
    pub has_arrow_assertion: bool,
    pub greater_token_present: bool,
}

impl Context {
    #[must_use]
    pub const fn embedded() -> Self {
        Self {
            embedded_tests: true,
            has_arrow_assertion: false,
            greater_token_present: false,
        }
    }

    /// Context with every optional production enabled.
    #[must_use]
    pub const fn permissive(embedded_tests: bool) -> Self {
        Self {
            embedded_tests,
            has_arrow_assertion: true,
            greater_token_present: true,
        }
    }
}

/// Classifies a lexer error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexErrorKind {
    /// `of` with no name after it (`# setup of`).
    MissingReference { directive: &'static str },
    /// Arrow operator at the start of a line.
    MissingActualValue { operator: String },
    /// No scanning rule matches, e.g. `#` inside free text.
    InvalidSyntax,
}

impl fmt::Display for LexErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingReference { directive } => {
                write!(f, "missing reference name after '{directive} of'")
            }
            Self::MissingActualValue { operator } => {
                write!(f, "missing actual value before '{operator}'")
            }
            Self::InvalidSyntax => f.write_str("invalid syntax"),
        }
    }
}

/// Error produced during lexing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at line {}, column {}", span.line, span.column)]
pub struct LexError {
    pub kind: LexErrorKind,
    pub span: Span,
}

/// Tokenize a test description into a sequence of tokens ending in
/// exactly one `EOF`.
///
/// Updates `context.has_arrow_assertion` and
/// `context.greater_token_present` from what the input contains.
///
/// # Errors
///
/// Returns `LexError` on a pointer without a reference name, an arrow
/// operator without an actual value, or a `#` inside free text.
pub fn tokenize(input: &str, context: &mut Context) -> Result<Vec<Token>, LexError> {
    let input = input.strip_prefix('\u{FEFF}').unwrap_or(input);
    let normalized;
    let text = if context.embedded_tests {
        normalized = normalize_embedded_tests(input);
        normalized.as_str()
    } else {
        input
    };

    let lexer = Lexer::new(text, input, context.embedded_tests);
    let lexed = lexer.tokenize()?;
    context.has_arrow_assertion = lexed.has_arrow_assertion;
    context.greater_token_present = lexed.greater_token_present;

    tracing::debug!(
        tokens = lexed.tokens.len(),
        embedded_tests = context.embedded_tests,
        has_arrow_assertion = context.has_arrow_assertion,
        greater_token_present = context.greater_token_present,
        "tokenized input"
    );
    Ok(lexed.tokens)
}

/// Turn a host script with directive comments into plain test text.
///
/// Lines that are not comments are blanked. Comment markers are
/// stripped (with one following space) from every comment line that is
/// not itself a directive. The line count is preserved.
#[must_use]
pub fn normalize_embedded_tests(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    for line in input.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with('#') {
            if EMBEDDED_DIRECTIVE.is_match(trimmed) {
                result.push_str(trimmed);
            } else {
                let body = &trimmed[1..];
                result.push_str(body.strip_prefix(' ').unwrap_or(body));
            }
        }
        result.push('\n');
    }
    result
}

struct Lexed {
    tokens: Vec<Token>,
    has_arrow_assertion: bool,
    greater_token_present: bool,
}

struct Lexer<'a> {
    cursor: Cursor<'a>,
    source: Vec<&'a str>,
    embedded_tests: bool,
    tokens: Vec<Token>,
    after_command: bool,
    has_arrow_assertion: bool,
    greater_token_present: bool,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str, source: &'a str, embedded_tests: bool) -> Self {
        Self {
            cursor: Cursor::new(text),
            source: source.lines().collect(),
            embedded_tests,
            tokens: Vec::new(),
            after_command: false,
            has_arrow_assertion: false,
            greater_token_present: false,
        }
    }

    fn tokenize(mut self) -> Result<Lexed, LexError> {
        while self.cursor.is_line_in_range() {
            if self.cursor.column() == 0 {
                self.scan_line_start()?;
            } else {
                self.scan_inline()?;
            }
        }

        let eof = Span::new("", self.cursor.line_count() + 1, 1);
        self.tokens.push(Token::new(TokenKind::Eof, "", eof));

        Ok(Lexed {
            tokens: self.tokens,
            has_arrow_assertion: self.has_arrow_assertion,
            greater_token_present: self.greater_token_present,
        })
    }

    fn span(&self) -> Span {
        let line = self.cursor.line();
        let text = self
            .source
            .get(line)
            .copied()
            .or_else(|| self.cursor.current_line())
            .unwrap_or_default();
        Span::new(text, line + 1, self.cursor.column() + 1)
    }

    /// Push a token at the cursor and move past `consumed` bytes.
    fn emit(&mut self, kind: TokenKind, text: &str, consumed: usize) {
        let token = Token::new(kind, text, self.span());
        tracing::trace!(kind = %token.kind, line = token.span.line, column = token.span.column, "token");
        self.tokens.push(token);
        self.cursor.advance_column(consumed);
    }

    /// Push a `MINOR` token unless the previous one already is.
    fn emit_minor(&mut self, consumed: usize) {
        if self
            .tokens
            .last()
            .is_some_and(|last| last.kind == TokenKind::Minor)
        {
            self.cursor.advance_column(consumed);
        } else {
            self.emit(TokenKind::Minor, "", consumed);
        }
    }

    fn skip_line_as_minor(&mut self) {
        if self
            .tokens
            .last()
            .is_none_or(|last| last.kind != TokenKind::Minor)
        {
            let token = Token::new(TokenKind::Minor, "", self.span());
            self.tokens.push(token);
        }
        self.cursor.advance_line();
    }

    fn scan_line_start(&mut self) -> Result<(), LexError> {
        let Some(line) = self.cursor.current_line() else {
            return Ok(());
        };
        let after_command = std::mem::take(&mut self.after_command);

        if line.starts_with("##") {
            self.skip_line_as_minor();
            return Ok(());
        }

        if line.trim().is_empty() {
            if self.embedded_tests {
                let token = Token::new(TokenKind::NewLine, "", self.span());
                self.tokens.push(token);
                self.cursor.advance_line();
            } else {
                self.skip_line_as_minor();
            }
            return Ok(());
        }

        if let Some(caps) = GLOBAL_DIRECTIVE.captures(line) {
            let kind = if caps[1].eq_ignore_ascii_case("setup") {
                TokenKind::Setup
            } else {
                TokenKind::Teardown
            };
            self.emit(TokenKind::Global, &caps[0], 0);
            self.emit(kind, &caps[1], caps[0].len());
            // Anything after the keyword is a free-form title.
            if self.cursor.column() > 0 {
                self.cursor.advance_line();
            }
            return Ok(());
        }

        if let Some(caps) = DIRECTIVE.captures(line) {
            let keyword = caps[1].to_ascii_lowercase();
            let consumed = caps[0].len();
            match keyword.as_str() {
                // A bare `# test` with no name is an ordinary comment.
                "test" if consumed < line.len() => {
                    self.emit(TokenKind::Test, &caps[0], consumed);
                    return Ok(());
                }
                "test" => {}
                "setup" => {
                    self.emit(TokenKind::Setup, &caps[0], consumed);
                    return Ok(());
                }
                "teardown" => {
                    self.emit(TokenKind::Teardown, &caps[0], consumed);
                    if self.cursor.column() > 0 {
                        self.cursor.advance_line();
                    }
                    return Ok(());
                }
                _ => {
                    self.emit(TokenKind::Continuation, &caps[0], consumed);
                    return Ok(());
                }
            }
        }

        if line.starts_with(TAG_EOF) || line.starts_with(TAG_END) {
            self.emit_minor(TAG_EOF.len());
            return Ok(());
        }

        if line.starts_with(TAG_BLANK) {
            self.emit(TokenKind::Text, "\n", TAG_BLANK.len());
            return Ok(());
        }

        if let Some(m) = PESO.find(line) {
            self.after_command = true;
            self.emit(TokenKind::Peso, "$", m.end());
            return Ok(());
        }

        if after_command {
            if let Some(m) = GREATER.find(line) {
                self.after_command = true;
                self.greater_token_present = true;
                self.emit(TokenKind::Greater, ">", m.end());
                return Ok(());
            }
        }

        if line.trim_start().starts_with('#') {
            self.skip_line_as_minor();
            return Ok(());
        }

        if let Some(m) = ARROW.find(line).filter(|m| m.start() == 0) {
            return Err(LexError {
                kind: LexErrorKind::MissingActualValue {
                    operator: m.as_str().trim().to_string(),
                },
                span: self.span(),
            });
        }

        self.scan_text(line)
    }

    /// Continue a line whose start has already been tokenized.
    fn scan_inline(&mut self) -> Result<(), LexError> {
        let Some(rest) = self.cursor.rest_of_line() else {
            self.cursor.advance_line();
            return Ok(());
        };
        let previous = self.tokens.last().map(|t| t.kind);

        match previous {
            Some(TokenKind::Peso | TokenKind::Greater | TokenKind::Test | TokenKind::Pointer) => {
                self.emit(TokenKind::Text, rest, rest.len());
            }
            Some(TokenKind::Setup | TokenKind::Continuation) => {
                self.scan_reference(rest)?;
            }
            _ => self.scan_text(rest)?,
        }
        Ok(())
    }

    /// Scan what follows a `setup`/`continuation` keyword.
    fn scan_reference(&mut self, rest: &str) -> Result<(), LexError> {
        let is_setup = self
            .tokens
            .last()
            .is_some_and(|t| t.kind == TokenKind::Setup);

        if let Some(m) = POINTER.find(rest) {
            if m.end() >= rest.len() {
                return Err(LexError {
                    kind: LexErrorKind::MissingReference {
                        directive: if is_setup { "setup" } else { "continuation" },
                    },
                    span: self.span(),
                });
            }
            self.emit(TokenKind::Pointer, " of ", m.end());
        } else if is_setup {
            // Title of an unreferenced setup, not a name.
            self.cursor.advance_line();
        } else {
            self.emit(TokenKind::Text, rest, rest.len());
        }
        Ok(())
    }

    /// Free text, split around `=>` / `=/>` operators.
    ///
    /// A `#` inside a text segment matches neither the text nor the
    /// comment rule, so it is rejected.
    fn scan_text(&mut self, rest: &str) -> Result<(), LexError> {
        let arrow = ARROW.find(rest);
        if arrow.map_or(rest, |m| &rest[..m.start()]).contains('#') {
            return Err(LexError {
                kind: LexErrorKind::InvalidSyntax,
                span: self.span(),
            });
        }
        match arrow {
            Some(m) if m.start() == 0 => {
                let operator = m.as_str().trim();
                let kind = if operator == "=/>" {
                    TokenKind::AssertNe
                } else {
                    TokenKind::AssertEq
                };
                self.has_arrow_assertion = true;
                self.emit(kind, operator, m.end());
            }
            Some(m) => self.emit(TokenKind::Text, &rest[..m.start()], m.start()),
            None => self.emit(TokenKind::Text, rest, rest.len()),
        }
        Ok(())
    }
}
