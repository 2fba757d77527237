//! Test-description grammar and node constructors.
//!
//! The grammar is rebuilt for every parse from the lexer's [`Context`]:
//! embedded-tests mode changes what counts as a text line and skips
//! host-script filler, and the arrow and `>` productions are wired in
//! only when the lexer saw those tokens.

use std::time::Instant;

use crate::ast::{
    ArrowAssertion, Assertion, Command, Constants, CommandAssertion, CommandExtension,
    ContinuationReferencePrefix, GlobalSetup, GlobalTeardown, MultilineText, Node, Operator,
    Setup, SetupAssertion, SetupReference, StandaloneCommands, Test, TestOrSetup, TestReference,
    TestSuite, Text,
};
use crate::lexer::Context;
use crate::parser::ParseErrorKind;
use crate::rules::{Child, Expected, Grammar, RuleId};
use crate::token::Token;
use crate::token::TokenKind::{
    AssertEq, AssertNe, Continuation, Eof, Global, Greater, Minor, NewLine, Peso, Pointer,
    Setup as SetupToken, Teardown, Test as TestToken, Text as TextToken,
};

/// Build the grammar for `context` and return it with its start rule.
#[must_use]
pub fn build_grammar(context: &Context) -> (Grammar, RuleId) {
    let started = Instant::now();
    let mut g = Grammar::new();

    let gap = g
        .group("gap")
        .expect_some_of([Minor.into(), NewLine.into()])
        .id();

    let text: Expected = if context.embedded_tests {
        TextToken.into()
    } else {
        g.rule("Text", text)
            .expect_some_of([TextToken.into(), NewLine.into()])
            .id()
            .into()
    };

    let command_start = g
        .group("command_start")
        .one_or_more(gap)
        .expect(Peso)
        .id();
    let end_of_text = if context.has_arrow_assertion {
        let arrow_start = g
            .group("arrow_start")
            .zero_or_more(gap)
            .expect(TextToken)
            .expect_some_of([AssertEq.into(), AssertNe.into()])
            .id();
        g.group("end_of_text")
            .expect_some_of([arrow_start.into(), command_start.into()])
            .id()
    } else {
        command_start
    };
    let multiline_text = g
        .rule("MultilineText", multiline_text)
        .one_or_more(text)
        .until(end_of_text)
        .id();

    let command_extension = context.greater_token_present.then(|| {
        g.rule("CommandExtension", command_extension)
            .expect(Greater)
            .expect(TextToken)
            .id()
    });
    let mut command = g.rule("Command", command).expect(Peso).expect(TextToken);
    if let Some(extension) = command_extension {
        command = command.zero_or_more(extension);
    }
    let command = command.ignore_next(gap).id();

    let command_assertion = g
        .rule("CommandAssertion", command_assertion)
        .expect(command)
        .expect(multiline_text)
        .id();
    let mut alternatives: Vec<Expected> = vec![command_assertion.into()];
    if context.has_arrow_assertion {
        let arrow_assertion = g
            .rule("ArrowAssertion", arrow_assertion)
            .expect(TextToken)
            .expect_some_of([AssertEq.into(), AssertNe.into()])
            .expect(multiline_text)
            .id();
        alternatives.push(arrow_assertion.into());
    }
    let assertion = g
        .rule("Assertion", assertion)
        .expect_some_of(alternatives)
        .id();

    let continuation_prefix = g
        .rule("ContinuationReferencePrefix", continuation_prefix)
        .expect(Continuation)
        .expect(Pointer)
        .id();
    let test_reference = g
        .rule("TestReference", test_reference)
        .expect_some_of([TestToken.into(), continuation_prefix.into()])
        .expect(TextToken)
        .id();
    let setup_target = g
        .group("setup_target")
        .expect(Pointer)
        .expect(TextToken)
        .id();
    let setup_reference = g
        .rule("SetupReference", setup_reference)
        .expect(SetupToken)
        .optionally(setup_target)
        .id();

    let standalone_commands = g
        .rule("StandaloneCommands", standalone_commands)
        .one_or_more(command)
        .until(command_assertion)
        .ignore_next(gap)
        .id();
    let setup = g
        .rule("Setup", setup)
        .optionally(setup_reference)
        .expect(standalone_commands)
        .id();
    let setup_assertion = g
        .rule("SetupAssertion", setup_assertion)
        .optionally(setup)
        .expect(assertion)
        .id();
    let test = g
        .rule("Test", test)
        .optionally(test_reference)
        .one_or_more(setup_assertion)
        .ignore_next(gap)
        .id();

    let global_setup = g
        .rule("GlobalSetup", global_setup)
        .expect(Global)
        .expect(SetupToken)
        .expect(standalone_commands)
        .id();
    let global_teardown = g
        .rule("GlobalTeardown", global_teardown)
        .optionally(Global)
        .expect(Teardown)
        .expect(standalone_commands)
        .id();

    let any_text = context.embedded_tests.then(|| {
        g.group("any_text")
            .expect_some_of([multiline_text.into(), gap.into()])
            .id()
    });

    let mut test_or_setup = g.rule("TestOrSetup", test_or_setup);
    if let Some(filler) = any_text {
        test_or_setup = test_or_setup.ignore_next(filler);
    }
    test_or_setup = test_or_setup.expect_some_of([test.into(), setup.into()]);
    if let Some(filler) = any_text {
        test_or_setup = test_or_setup.ignore_next(filler);
    }
    let test_or_setup = test_or_setup.id();

    let test_suite = g
        .rule("TestSuite", test_suite)
        .ignore_next(any_text.unwrap_or(gap))
        .optionally(global_setup)
        .one_or_more(test_or_setup)
        .optionally(global_teardown)
        .expect(Eof)
        .id();

    tracing::debug!(
        rules = g.len(),
        embedded_tests = context.embedded_tests,
        has_arrow_assertion = context.has_arrow_assertion,
        greater_token_present = context.greater_token_present,
        elapsed = ?started.elapsed(),
        "built grammar"
    );
    (g, test_suite)
}

/// Positional reader over a rule's children.
struct Children {
    production: &'static str,
    items: std::vec::IntoIter<Child>,
}

impl Children {
    fn new(production: &'static str, children: Vec<Child>) -> Self {
        Self {
            production,
            items: children.into_iter(),
        }
    }

    const fn malformed(&self) -> ParseErrorKind {
        ParseErrorKind::Malformed {
            production: self.production,
        }
    }

    fn next(&mut self) -> Result<Child, ParseErrorKind> {
        self.items.next().ok_or_else(|| self.malformed())
    }

    fn token(&mut self) -> Result<Token, ParseErrorKind> {
        match self.next()? {
            Child::Token(token) => Ok(token),
            _ => Err(self.malformed()),
        }
    }

    fn node(&mut self) -> Result<Node, ParseErrorKind> {
        match self.next()? {
            Child::Node(node) => Ok(node),
            _ => Err(self.malformed()),
        }
    }

    fn optional_node(&mut self) -> Result<Option<Node>, ParseErrorKind> {
        match self.next()? {
            Child::Node(node) => Ok(Some(node)),
            Child::Absent => Ok(None),
            _ => Err(self.malformed()),
        }
    }

    fn list(&mut self) -> Result<Vec<Child>, ParseErrorKind> {
        match self.next()? {
            Child::List(items) => Ok(items),
            _ => Err(self.malformed()),
        }
    }

    /// Trailing loop list, if the rule was built with one.
    fn optional_list(&mut self) -> Result<Vec<Child>, ParseErrorKind> {
        match self.items.next() {
            None => Ok(Vec::new()),
            Some(Child::List(items)) => Ok(items),
            Some(_) => Err(self.malformed()),
        }
    }

    fn finish<T>(mut self, value: T) -> Result<T, ParseErrorKind> {
        if self.items.next().is_some() {
            return Err(self.malformed());
        }
        Ok(value)
    }
}

/// Unwrap `Node::$variant` or report the production as malformed.
macro_rules! expect_node {
    ($children:expr, $node:expr, $variant:ident) => {
        match $node {
            Node::$variant(inner) => inner,
            _ => return Err($children.malformed()),
        }
    };
}

fn text(children: Vec<Child>) -> Result<Node, ParseErrorKind> {
    let mut c = Children::new("Text", children);
    let token = c.token()?;
    c.finish(Node::Text(Text {
        value: token.text,
        span: token.span,
    }))
}

fn multiline_text(children: Vec<Child>) -> Result<Node, ParseErrorKind> {
    let mut c = Children::new("MultilineText", children);
    let lines = c
        .list()?
        .into_iter()
        .map(|child| match child {
            Child::Token(token) => Ok(Text {
                value: token.text,
                span: token.span,
            }),
            Child::Node(Node::Text(text)) => Ok(text),
            _ => Err(c.malformed()),
        })
        .collect::<Result<Vec<_>, _>>()?;
    c.finish(Node::MultilineText(MultilineText { lines }))
}

fn command_extension(children: Vec<Child>) -> Result<Node, ParseErrorKind> {
    let mut c = Children::new("CommandExtension", children);
    let greater = c.token()?;
    let text = c.token()?;
    c.finish(Node::CommandExtension(CommandExtension {
        text: text.text,
        span: greater.span,
    }))
}

fn command(children: Vec<Child>) -> Result<Node, ParseErrorKind> {
    let mut c = Children::new("Command", children);
    let peso = c.token()?;
    let text = c.token()?;
    let mut extensions = Vec::new();
    for child in c.optional_list()? {
        match child {
            Child::Node(Node::CommandExtension(extension)) => extensions.push(extension),
            _ => return Err(c.malformed()),
        }
    }
    c.finish(Node::Command(Command {
        text: text.text,
        extensions,
        span: peso.span,
    }))
}

fn command_assertion(children: Vec<Child>) -> Result<Node, ParseErrorKind> {
    let mut c = Children::new("CommandAssertion", children);
    let command = expect_node!(c, c.node()?, Command);
    let expected = expect_node!(c, c.node()?, MultilineText);
    c.finish(Node::CommandAssertion(CommandAssertion { command, expected }))
}

fn arrow_assertion(children: Vec<Child>) -> Result<Node, ParseErrorKind> {
    let mut c = Children::new("ArrowAssertion", children);
    let actual = c.token()?;
    let operator = match c.token()?.kind {
        AssertEq => Operator::Equal,
        AssertNe => Operator::NotEqual,
        _ => return Err(c.malformed()),
    };
    let expected = expect_node!(c, c.node()?, MultilineText);
    c.finish(Node::ArrowAssertion(ArrowAssertion {
        actual: Text {
            value: actual.text,
            span: actual.span,
        },
        operator,
        expected,
    }))
}

fn assertion(children: Vec<Child>) -> Result<Node, ParseErrorKind> {
    let mut c = Children::new("Assertion", children);
    let assertion = match c.node()? {
        Node::CommandAssertion(inner) => Assertion::Command(inner),
        Node::ArrowAssertion(inner) => Assertion::Arrow(inner),
        _ => return Err(c.malformed()),
    };
    c.finish(Node::Assertion(assertion))
}

fn continuation_prefix(children: Vec<Child>) -> Result<Node, ParseErrorKind> {
    let mut c = Children::new("ContinuationReferencePrefix", children);
    let continuation = c.token()?;
    c.token()?;
    c.finish(Node::ContinuationReferencePrefix(ContinuationReferencePrefix {
        span: continuation.span,
    }))
}

fn test_reference(children: Vec<Child>) -> Result<Node, ParseErrorKind> {
    let mut c = Children::new("TestReference", children);
    let (continuation, span) = match c.next()? {
        Child::Token(token) => (None, token.span),
        Child::Node(Node::ContinuationReferencePrefix(prefix)) => {
            let span = prefix.span.clone();
            (Some(prefix), span)
        }
        _ => return Err(c.malformed()),
    };
    let name = c.token()?;
    c.finish(Node::TestReference(TestReference {
        continuation,
        name: name.text.trim().to_string(),
        span,
    }))
}

fn setup_reference(children: Vec<Child>) -> Result<Node, ParseErrorKind> {
    let mut c = Children::new("SetupReference", children);
    let setup = c.token()?;
    let name = match c.next()? {
        Child::Absent => None,
        Child::Token(_) => Some(c.token()?.text.trim().to_string()),
        _ => return Err(c.malformed()),
    };
    c.finish(Node::SetupReference(SetupReference {
        name,
        span: setup.span,
    }))
}

fn commands_from(c: &Children, items: Vec<Child>) -> Result<Vec<Command>, ParseErrorKind> {
    items
        .into_iter()
        .map(|child| match child {
            Child::Node(Node::Command(command)) => Ok(command),
            _ => Err(c.malformed()),
        })
        .collect()
}

fn standalone_commands(children: Vec<Child>) -> Result<Node, ParseErrorKind> {
    let mut c = Children::new("StandaloneCommands", children);
    let items = c.list()?;
    let commands = commands_from(&c, items)?;
    c.finish(Node::StandaloneCommands(StandaloneCommands { commands }))
}

fn setup(children: Vec<Child>) -> Result<Node, ParseErrorKind> {
    let mut c = Children::new("Setup", children);
    let reference = match c.optional_node()? {
        Some(node) => Some(expect_node!(c, node, SetupReference)),
        None => None,
    };
    let commands = expect_node!(c, c.node()?, StandaloneCommands);
    c.finish(Node::Setup(Setup {
        reference,
        commands,
    }))
}

fn setup_assertion(children: Vec<Child>) -> Result<Node, ParseErrorKind> {
    let mut c = Children::new("SetupAssertion", children);
    let setup = match c.optional_node()? {
        Some(node) => Some(expect_node!(c, node, Setup)),
        None => None,
    };
    let assertion = expect_node!(c, c.node()?, Assertion);
    c.finish(Node::SetupAssertion(SetupAssertion { setup, assertion }))
}

fn test(children: Vec<Child>) -> Result<Node, ParseErrorKind> {
    let mut c = Children::new("Test", children);
    let reference = match c.optional_node()? {
        Some(node) => Some(expect_node!(c, node, TestReference)),
        None => None,
    };
    let mut setup_assertions = Vec::new();
    for child in c.list()? {
        match child {
            Child::Node(Node::SetupAssertion(item)) => setup_assertions.push(item),
            _ => return Err(c.malformed()),
        }
    }
    c.finish(Node::Test(Test::new(reference, setup_assertions)))
}

fn global_setup(children: Vec<Child>) -> Result<Node, ParseErrorKind> {
    let mut c = Children::new("GlobalSetup", children);
    let global = c.token()?;
    c.token()?;
    let commands = expect_node!(c, c.node()?, StandaloneCommands);
    c.finish(Node::GlobalSetup(GlobalSetup {
        span: Some(global.span),
        one_time_commands: StandaloneCommands::default(),
        commands,
    }))
}

fn global_teardown(children: Vec<Child>) -> Result<Node, ParseErrorKind> {
    let mut c = Children::new("GlobalTeardown", children);
    let global = match c.next()? {
        Child::Absent => None,
        Child::Token(token) => Some(token),
        _ => return Err(c.malformed()),
    };
    let teardown = c.token()?;
    let commands = expect_node!(c, c.node()?, StandaloneCommands);
    c.finish(Node::GlobalTeardown(GlobalTeardown {
        span: Some(global.map_or(teardown.span, |token| token.span)),
        commands,
    }))
}

fn test_or_setup(children: Vec<Child>) -> Result<Node, ParseErrorKind> {
    let mut c = Children::new("TestOrSetup", children);
    let item = match c.node()? {
        Node::Test(test) => TestOrSetup::Test(test),
        Node::Setup(setup) => TestOrSetup::Setup(setup),
        _ => return Err(c.malformed()),
    };
    c.finish(Node::TestOrSetup(item))
}

fn test_suite(children: Vec<Child>) -> Result<Node, ParseErrorKind> {
    let mut c = Children::new("TestSuite", children);
    let global_setup = match c.optional_node()? {
        Some(node) => Some(expect_node!(c, node, GlobalSetup)),
        None => None,
    };
    let mut tests_or_setups = Vec::new();
    for child in c.list()? {
        match child {
            Child::Node(Node::TestOrSetup(item)) => tests_or_setups.push(item),
            _ => return Err(c.malformed()),
        }
    }
    let global_teardown = match c.optional_node()? {
        Some(node) => Some(expect_node!(c, node, GlobalTeardown)),
        None => None,
    };
    let eof = c.token()?;
    c.finish(Node::TestSuite(TestSuite {
        global_setup,
        tests_or_setups,
        global_teardown,
        constants: Constants::default(),
        eof,
    }))
}
