use std::fmt;
use std::time::Instant;

use crate::ast::{Node, TestSuite};
use crate::grammar::build_grammar;
use crate::lexer::Context;
use crate::rules::{self, Child};
use crate::token::{Span, Token};

/// Classifies a parser error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// A token or production was required here.
    Expected { expected: String, found: String },
    /// None of the alternatives at a choice point matched.
    ExpectedOneOf { expected: Vec<String>, found: String },
    /// A production was handed children it cannot build from.
    Malformed { production: &'static str },
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expected { expected, found } => {
                write!(f, "expected {expected}, got {found}")
            }
            Self::ExpectedOneOf { expected, found } => {
                write!(f, "expected one of {}, got {found}", expected.join(", "))
            }
            Self::Malformed { production } => {
                write!(f, "malformed {production}")
            }
        }
    }
}

/// Error produced during parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at line {}, column {}", span.line, span.column)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub span: Span,
}

/// Parse a token stream into a raw `TestSuite`.
///
/// The tree still holds unmerged setups and continuations; semantic
/// analysis resolves them.
///
/// # Errors
///
/// Returns `ParseError` when the tokens do not form a test suite. The
/// error points at the furthest token any alternative reached.
pub fn parse(tokens: &[Token], context: &Context) -> Result<TestSuite, ParseError> {
    let started = Instant::now();
    let (grammar, start) = build_grammar(context);
    let (mut children, consumed) = rules::run(&grammar, start, tokens)?;

    let suite = match (children.pop(), children.is_empty()) {
        (Some(Child::Node(Node::TestSuite(suite))), true) => suite,
        _ => {
            return Err(ParseError {
                kind: ParseErrorKind::Malformed {
                    production: "TestSuite",
                },
                span: tokens.first().map(|t| t.span.clone()).unwrap_or_default(),
            });
        }
    };

    tracing::debug!(
        tokens = consumed,
        items = suite.tests_or_setups.len(),
        elapsed = ?started.elapsed(),
        "parsed test suite"
    );
    Ok(suite)
}
