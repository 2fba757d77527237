#![allow(dead_code)]

use batspp::{
    Assertion, CommandAssertion, Context, Settings, Test, TestSuite, TokenKind, front_end,
    tokenize,
};

/// Token kinds of `input` in normal mode.
pub fn kinds(input: &str) -> Vec<TokenKind> {
    let mut context = Context::default();
    tokenize(input, &mut context)
        .expect("tokenize failed")
        .iter()
        .map(|t| t.kind)
        .collect()
}

/// Run every pass with default settings.
pub fn resolve(input: &str) -> TestSuite {
    front_end(input, false, &Settings::new()).unwrap_or_else(|e| {
        panic!("front end failed: {e}\n--- input ---\n{input}")
    })
}

pub fn resolve_embedded(input: &str) -> TestSuite {
    front_end(input, true, &Settings::new()).unwrap_or_else(|e| {
        panic!("front end failed: {e}\n--- input ---\n{input}")
    })
}

pub fn tests(suite: &TestSuite) -> Vec<&Test> {
    suite.tests().collect()
}

pub fn test_names(suite: &TestSuite) -> Vec<&str> {
    suite.tests().map(|t| t.name.as_str()).collect()
}

/// The command assertion at `index` of `test`.
pub fn command_assertion(test: &Test, index: usize) -> &CommandAssertion {
    match &test.setup_assertions[index].assertion {
        Assertion::Command(assertion) => assertion,
        Assertion::Arrow(other) => panic!("expected a command assertion, got {other:?}"),
    }
}

/// Setup command texts attached to the assertion at `index`.
pub fn setup_commands(test: &Test, index: usize) -> Vec<&str> {
    test.setup_assertions[index]
        .setup
        .as_ref()
        .map(|s| s.commands.commands.iter().map(|c| c.text.as_str()).collect())
        .unwrap_or_default()
}
