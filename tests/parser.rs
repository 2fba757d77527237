//! Raw syntax tree shapes and parser errors.

use batspp::{
    Assertion, Context, Error, Operator, ParseErrorKind, TestOrSetup, TestSuite, parse, parse_str,
    tokenize,
};

fn raw(input: &str) -> TestSuite {
    parse_str(input, Context::default())
        .unwrap_or_else(|e| panic!("parse failed: {e}\n--- input ---\n{input}"))
}

fn items(suite: &TestSuite) -> Vec<&'static str> {
    suite
        .tests_or_setups
        .iter()
        .map(|item| match item {
            TestOrSetup::Test(_) => "test",
            TestOrSetup::Setup(_) => "setup",
        })
        .collect()
}

// -----------------------------------------------------------
// Tests and assertions.
// -----------------------------------------------------------

#[test]
fn parse_named_test() {
    let suite = raw("# Test listing\n$ ls\nfile\n");
    let [TestOrSetup::Test(test)] = suite.tests_or_setups.as_slice() else {
        panic!("expected one test");
    };
    let reference = test.reference.as_ref().expect("reference");
    assert_eq!(reference.name, "listing");
    assert!(!reference.is_continuation());
    assert_eq!(reference.span.line, 1);
    // Names are resolved by analysis, not by the parser.
    assert!(test.name.is_empty());
}

#[test]
fn parse_multiline_expected_output() {
    let suite = raw("$ printf 'a\\nb\\n'\na\nb\n");
    let TestOrSetup::Test(test) = &suite.tests_or_setups[0] else {
        panic!("expected a test");
    };
    let Assertion::Command(assertion) = &test.setup_assertions[0].assertion else {
        panic!("expected a command assertion");
    };
    assert_eq!(assertion.expected.lines.len(), 2);
    assert_eq!(assertion.expected.joined(), "a\nb");
    assert_eq!(assertion.expected.line(), Some(2));
}

#[test]
fn parse_blank_tag_in_expected_output() {
    let suite = raw("$ echo -e 'a\\n\\nb'\na\n<BLANK>\nb\n");
    let TestOrSetup::Test(test) = &suite.tests_or_setups[0] else {
        panic!("expected a test");
    };
    let Assertion::Command(assertion) = &test.setup_assertions[0].assertion else {
        panic!("expected a command assertion");
    };
    let values: Vec<_> = assertion
        .expected
        .lines
        .iter()
        .map(|t| t.value.as_str())
        .collect();
    assert_eq!(values, ["a", "\n", "b"]);
}

#[test]
fn parse_consecutive_assertions_share_a_test() {
    let suite = raw("# Test pair\n$ echo 1\n1\n$ echo 2\n2\n");
    assert_eq!(items(&suite), ["test"]);
    let TestOrSetup::Test(test) = &suite.tests_or_setups[0] else {
        unreachable!();
    };
    assert_eq!(test.setup_assertions.len(), 2);
}

#[test]
fn parse_blank_line_starts_a_new_test() {
    let suite = raw("# Test first\n$ echo 1\n1\n\n$ echo hi\nhi\n");
    assert_eq!(items(&suite), ["test", "test"]);
    let TestOrSetup::Test(second) = &suite.tests_or_setups[1] else {
        unreachable!();
    };
    assert!(second.reference.is_none());
    assert_eq!(second.line(), Some(5));
}

#[test]
fn parse_end_tag_separates_tests() {
    let suite = raw("$ echo a\na\n<END>\n$ echo b\nb\n");
    assert_eq!(items(&suite), ["test", "test"]);
}

#[test]
fn parse_commands_before_assertion_become_setup() {
    let suite = raw("# Test t\n$ mkdir d\n$ cd d\n$ pwd\n/tmp/d\n");
    let TestOrSetup::Test(test) = &suite.tests_or_setups[0] else {
        panic!("expected a test");
    };
    let setup = test.setup_assertions[0].setup.as_ref().expect("inline setup");
    assert!(setup.reference.is_none());
    let texts: Vec<_> = setup.commands.commands.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, ["mkdir d", "cd d"]);
    let Assertion::Command(assertion) = &test.setup_assertions[0].assertion else {
        panic!("expected a command assertion");
    };
    assert_eq!(assertion.command.text, "pwd");
    assert_eq!(assertion.command.line(), 4);
}

#[test]
fn parse_arrow_assertions() {
    let suite = raw("# Test math\nadd 1 2 => 3\nsub 3 1 =/> 5\n");
    let TestOrSetup::Test(test) = &suite.tests_or_setups[0] else {
        panic!("expected a test");
    };
    assert_eq!(test.setup_assertions.len(), 2);

    let Assertion::Arrow(first) = &test.setup_assertions[0].assertion else {
        panic!("expected an arrow assertion");
    };
    assert_eq!(first.actual.value, "add 1 2");
    assert_eq!(first.operator, Operator::Equal);
    assert_eq!(first.expected.joined(), "3");

    let Assertion::Arrow(second) = &test.setup_assertions[1].assertion else {
        panic!("expected an arrow assertion");
    };
    assert_eq!(second.actual.value, "sub 3 1");
    assert_eq!(second.operator, Operator::NotEqual);
    assert_eq!(second.expected.joined(), "5");
}

#[test]
fn parse_command_extension() {
    let suite = raw("$ echo a \\\n> b\nout\n");
    let TestOrSetup::Test(test) = &suite.tests_or_setups[0] else {
        panic!("expected a test");
    };
    let Assertion::Command(assertion) = &test.setup_assertions[0].assertion else {
        panic!("expected a command assertion");
    };
    assert_eq!(assertion.command.extensions.len(), 1);
    assert_eq!(assertion.command.extensions[0].span.line, 2);
    assert_eq!(assertion.command.full_text(), "echo a \\\nb");
    assert_eq!(assertion.expected.joined(), "out");
}

// -----------------------------------------------------------
// Setups, continuations and global blocks.
// -----------------------------------------------------------

#[test]
fn parse_referenced_setup() {
    let suite = raw("# Setup of t\n$ touch f\n\n# Test t\n$ ls\nf\n");
    assert_eq!(items(&suite), ["setup", "test"]);
    let TestOrSetup::Setup(setup) = &suite.tests_or_setups[0] else {
        unreachable!();
    };
    assert_eq!(setup.reference_name(), "t");
    assert_eq!(setup.line(), Some(1));
    assert_eq!(setup.commands.commands[0].text, "touch f");
}

#[test]
fn parse_continuation_reference() {
    let suite = raw("# Test t\n$ echo 1\n1\n\n# Continuation of t\n$ echo 2\n2\n");
    assert_eq!(items(&suite), ["test", "test"]);
    let TestOrSetup::Test(test) = &suite.tests_or_setups[1] else {
        unreachable!();
    };
    let reference = test.reference.as_ref().expect("reference");
    assert!(reference.is_continuation());
    assert_eq!(reference.name, "t");
    assert_eq!(reference.span.line, 5);
}

#[test]
fn parse_global_setup_and_teardown() {
    let input = "# Global setup\n$ source lib.bash\n$ cd /tmp\n\n\
                 # Test t\n$ pwd\n/tmp\n\n\
                 # Global teardown\n$ rm -rf /tmp/x\n";
    let suite = raw(input);

    let global = suite.global_setup.as_ref().expect("global setup");
    assert_eq!(global.span.as_ref().map(|s| s.line), Some(1));
    assert_eq!(global.commands.len(), 2);
    assert!(global.one_time_commands.is_empty());

    let teardown = suite.global_teardown.as_ref().expect("global teardown");
    assert_eq!(teardown.span.as_ref().map(|s| s.line), Some(9));
    assert_eq!(teardown.commands.commands[0].text, "rm -rf /tmp/x");

    assert_eq!(items(&suite), ["test"]);
}

#[test]
fn parse_plain_teardown() {
    let suite = raw("$ ls\nx\n\n# Teardown\n$ rm x\n");
    let teardown = suite.global_teardown.as_ref().expect("teardown");
    assert_eq!(teardown.span.as_ref().map(|s| s.line), Some(4));
    assert_eq!(teardown.commands.len(), 1);
}

#[test]
fn parse_trailing_setup_is_kept_raw() {
    // Rejected later by analysis, not by the grammar.
    let suite = raw("$ ls\nx\n\n# Setup\n$ touch f\n");
    assert_eq!(items(&suite), ["test", "setup"]);
}

// -----------------------------------------------------------
// Embedded tests.
// -----------------------------------------------------------

#[test]
fn parse_embedded_skips_host_script() {
    let script = "#!/bin/bash\n\
                  # Test greet\n\
                  # $ echo hi\n\
                  # hi\n\
                  greet() { echo hi; }\n\
                  \n\
                  # Test sum\n\
                  # $ expr 1 + 2\n\
                  # 3\n\
                  sum() { expr \"$1\" + \"$2\"; }\n";
    let suite = parse_str(script, Context::embedded()).expect("parse");
    let names: Vec<_> = suite
        .tests_or_setups
        .iter()
        .filter_map(|item| match item {
            TestOrSetup::Test(test) => test.reference.as_ref().map(|r| r.name.as_str()),
            TestOrSetup::Setup(_) => None,
        })
        .collect();
    assert_eq!(names, ["greet", "sum"]);
}

// -----------------------------------------------------------
// Errors.
// -----------------------------------------------------------

#[test]
fn parse_error_on_prose() {
    let err = parse_str("just prose\n", Context::default()).unwrap_err();
    let Error::Parse(err) = err else {
        panic!("expected a parse error, got {err:?}");
    };
    assert_eq!(
        err.kind,
        ParseErrorKind::ExpectedOneOf {
            expected: vec!["Test".into(), "Setup".into()],
            found: "TEXT".into()
        }
    );
    assert_eq!(err.span.line, 1);
}

#[test]
fn parse_error_missing_output() {
    let err = parse_str("# Test t\n$ ls\n", Context::default()).unwrap_err();
    assert!(matches!(err, Error::Parse(_)));
    assert!(err.to_string().contains("got EOF"));
}

#[test]
fn parse_str_lex_error() {
    let err = parse_str("# Setup of\n", Context::default()).unwrap_err();
    assert!(matches!(err, Error::Lex(_)));
}

#[test]
fn parse_uses_lexer_context() {
    let mut context = Context::default();
    let tokens = tokenize("x => 1\n", &mut context).expect("tokenize");
    assert!(context.has_arrow_assertion);
    let suite = parse(&tokens, &context).expect("parse");
    assert_eq!(items(&suite), ["test"]);

    // Without the arrow flag the same tokens have no valid parse.
    assert!(parse(&tokens, &Context::default()).is_err());
}
