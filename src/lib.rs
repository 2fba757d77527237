//! Front end for batspp test descriptions.
//!
//! Turns a plain-text description of shell tests (commands prefixed
//! with `$`, expected output below them, `# Test`/`# Setup` directives
//! as comments) into a resolved syntax tree a code generator can walk.
//!
//! The work happens in three passes: [`tokenize`], [`parse`] and
//! [`analyze`].
//!
//! # Quick start
//!
//! ```
//! use batspp::{Settings, front_end};
//!
//! let input = "# Setup\n$ echo hello > f\n\n# Test greeting\n$ cat f\nhello\n";
//! let suite = front_end(input, false, &Settings::new()).unwrap();
//!
//! let test = suite.tests().next().unwrap();
//! assert_eq!(test.name, "greeting");
//! ```
//!
//! ## Embedded tests
//!
//! Directives can also live in the comments of a host script:
//!
//! ```
//! use batspp::{Settings, front_end};
//!
//! let script = "#!/bin/bash\n# Test sum\n# $ expr 1 + 2\n# 3\necho done\n";
//! let suite = front_end(script, true, &Settings::new()).unwrap();
//! assert_eq!(suite.tests().count(), 1);
//! ```

// Allow noisy pedantic lints that don't add value for
// a library crate.
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

pub mod analyzer;
pub mod ast;
pub mod cursor;
pub mod grammar;
pub mod lexer;
pub mod parser;
pub mod rules;
pub mod settings;
pub mod token;

pub use analyzer::{SemanticError, SemanticErrorKind, analyze};
pub use ast::{
    ArrowAssertion, Assertion, Command, CommandAssertion, CommandExtension, Constant, Constants,
    GlobalSetup, GlobalTeardown, MultilineText, Node, Operator, Setup, SetupAssertion,
    SetupReference, StandaloneCommands, Test, TestOrSetup, TestReference, TestSuite, Text,
};
pub use lexer::{Context, LexError, LexErrorKind, tokenize};
pub use parser::{ParseError, ParseErrorKind, parse};
pub use settings::Settings;
pub use token::{Span, Token, TokenKind};

/// Unified error type covering every front-end pass.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A lexer error.
    #[error("{0}")]
    Lex(#[from] LexError),
    /// A parser error.
    #[error("{0}")]
    Parse(#[from] ParseError),
    /// A semantic error.
    #[error("{0}")]
    Semantic(#[from] SemanticError),
}

impl Error {
    /// Location the error points at.
    #[must_use]
    pub const fn span(&self) -> &Span {
        match self {
            Self::Lex(e) => &e.span,
            Self::Parse(e) => &e.span,
            Self::Semantic(e) => &e.span,
        }
    }
}

/// Tokenize and parse in one step, without semantic analysis.
pub fn parse_str(input: &str, mut context: Context) -> Result<TestSuite, Error> {
    let tokens = tokenize(input, &mut context)?;
    Ok(parse(&tokens, &context)?)
}

/// Run every pass and return the resolved suite.
pub fn front_end(input: &str, embedded_tests: bool, settings: &Settings) -> Result<TestSuite, Error> {
    let context = Context {
        embedded_tests,
        ..Context::default()
    };
    let suite = parse_str(input, context)?;
    Ok(analyze(suite, settings)?)
}
