//! Test description syntax tree.
//!
//! Nodes own their children by value. Every node reports the first
//! source line it covers through `line()`, which is the minimum over its
//! descendants.

use crate::token::{Span, Token};

/// One line of expected output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Text {
    pub value: String,
    pub span: Span,
}

/// Expected output spanning one or more source lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultilineText {
    pub lines: Vec<Text>,
}

/// `>`-prefixed continuation of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandExtension {
    pub text: String,
    pub span: Span,
}

/// `$`-prefixed shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub text: String,
    pub extensions: Vec<CommandExtension>,
    pub span: Span,
}

/// A command and the output it should print.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandAssertion {
    pub command: Command,
    pub expected: MultilineText,
}

/// Comparison used by an arrow assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `=>`
    Equal,
    /// `=/>`
    NotEqual,
}

/// `actual => expected` or `actual =/> expected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrowAssertion {
    pub actual: Text,
    pub operator: Operator,
    pub expected: MultilineText,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assertion {
    Command(CommandAssertion),
    Arrow(ArrowAssertion),
}

/// `continuation of` prefix of a test reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationReferencePrefix {
    pub span: Span,
}

/// Names a test, either directly (`# test NAME`) or as a continuation
/// (`# continuation of NAME`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestReference {
    pub continuation: Option<ContinuationReferencePrefix>,
    pub name: String,
    pub span: Span,
}

/// `# setup` or `# setup of NAME`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupReference {
    pub name: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StandaloneCommands {
    pub commands: Vec<Command>,
}

/// Commands run before an assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Setup {
    pub reference: Option<SetupReference>,
    pub commands: StandaloneCommands,
}

/// `# global setup` block.
///
/// Commands are split into those run once per file and those run before
/// every test.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalSetup {
    pub span: Option<Span>,
    pub one_time_commands: StandaloneCommands,
    pub commands: StandaloneCommands,
}

/// `# teardown` / `# global teardown` block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalTeardown {
    pub span: Option<Span>,
    pub commands: StandaloneCommands,
}

/// An assertion with the setup written right before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupAssertion {
    pub setup: Option<Setup>,
    pub assertion: Assertion,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Test {
    pub reference: Option<TestReference>,
    pub setup_assertions: Vec<SetupAssertion>,
    /// Resolved name, filled in by semantic analysis.
    pub name: String,
}

/// Top-level entry, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestOrSetup {
    Test(Test),
    Setup(Setup),
}

/// A named value handed to the code generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constant {
    pub name: String,
    pub value: String,
}

/// Values derived from configuration, not from the source text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Constants {
    pub constants: Vec<Constant>,
}

/// Root of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestSuite {
    pub global_setup: Option<GlobalSetup>,
    pub tests_or_setups: Vec<TestOrSetup>,
    pub global_teardown: Option<GlobalTeardown>,
    pub constants: Constants,
    pub eof: Token,
}

/// Any node the grammar can produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Text(Text),
    MultilineText(MultilineText),
    CommandExtension(CommandExtension),
    Command(Command),
    CommandAssertion(CommandAssertion),
    ArrowAssertion(ArrowAssertion),
    Assertion(Assertion),
    ContinuationReferencePrefix(ContinuationReferencePrefix),
    TestReference(TestReference),
    SetupReference(SetupReference),
    StandaloneCommands(StandaloneCommands),
    Setup(Setup),
    SetupAssertion(SetupAssertion),
    Test(Test),
    GlobalSetup(GlobalSetup),
    GlobalTeardown(GlobalTeardown),
    TestOrSetup(TestOrSetup),
    TestSuite(TestSuite),
}

impl Node {
    /// Variant name, used in diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "Text",
            Self::MultilineText(_) => "MultilineText",
            Self::CommandExtension(_) => "CommandExtension",
            Self::Command(_) => "Command",
            Self::CommandAssertion(_) => "CommandAssertion",
            Self::ArrowAssertion(_) => "ArrowAssertion",
            Self::Assertion(_) => "Assertion",
            Self::ContinuationReferencePrefix(_) => "ContinuationReferencePrefix",
            Self::TestReference(_) => "TestReference",
            Self::SetupReference(_) => "SetupReference",
            Self::StandaloneCommands(_) => "StandaloneCommands",
            Self::Setup(_) => "Setup",
            Self::SetupAssertion(_) => "SetupAssertion",
            Self::Test(_) => "Test",
            Self::GlobalSetup(_) => "GlobalSetup",
            Self::GlobalTeardown(_) => "GlobalTeardown",
            Self::TestOrSetup(_) => "TestOrSetup",
            Self::TestSuite(_) => "TestSuite",
        }
    }
}

fn min_line(lines: impl IntoIterator<Item = Option<usize>>) -> Option<usize> {
    lines.into_iter().flatten().min()
}

impl MultilineText {
    #[must_use]
    pub fn line(&self) -> Option<usize> {
        min_line(self.lines.iter().map(|t| Some(t.span.line)))
    }

    /// Lines joined with `\n`.
    #[must_use]
    pub fn joined(&self) -> String {
        self.lines
            .iter()
            .map(|t| t.value.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Command {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            extensions: Vec::new(),
            span: Span::default(),
        }
    }

    /// The command with its continuation lines, one per line.
    #[must_use]
    pub fn full_text(&self) -> String {
        let mut text = self.text.clone();
        for extension in &self.extensions {
            text.push('\n');
            text.push_str(&extension.text);
        }
        text
    }

    #[must_use]
    pub const fn line(&self) -> usize {
        self.span.line
    }
}

impl Assertion {
    #[must_use]
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Command(a) => min_line([Some(a.command.line()), a.expected.line()]),
            Self::Arrow(a) => min_line([Some(a.actual.span.line), a.expected.line()]),
        }
    }
}

impl TestReference {
    #[must_use]
    pub const fn is_continuation(&self) -> bool {
        self.continuation.is_some()
    }
}

impl StandaloneCommands {
    #[must_use]
    pub fn line(&self) -> Option<usize> {
        min_line(self.commands.iter().map(|c| Some(c.line())))
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.commands.len()
    }
}

impl Setup {
    /// Reference name; empty for an unreferenced setup.
    #[must_use]
    pub fn reference_name(&self) -> &str {
        self.reference
            .as_ref()
            .and_then(|r| r.name.as_deref())
            .map_or("", str::trim)
    }

    #[must_use]
    pub fn line(&self) -> Option<usize> {
        min_line([
            self.reference.as_ref().map(|r| r.span.line),
            self.commands.line(),
        ])
    }
}

impl SetupAssertion {
    #[must_use]
    pub fn line(&self) -> Option<usize> {
        min_line([
            self.setup.as_ref().and_then(Setup::line),
            self.assertion.line(),
        ])
    }
}

impl Test {
    #[must_use]
    pub const fn new(reference: Option<TestReference>, setup_assertions: Vec<SetupAssertion>) -> Self {
        Self {
            reference,
            setup_assertions,
            name: String::new(),
        }
    }

    #[must_use]
    pub fn line(&self) -> Option<usize> {
        min_line(
            std::iter::once(self.reference.as_ref().map(|r| r.span.line))
                .chain(self.setup_assertions.iter().map(SetupAssertion::line)),
        )
    }
}

impl TestOrSetup {
    #[must_use]
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Test(test) => test.line(),
            Self::Setup(setup) => setup.line(),
        }
    }
}

impl TestSuite {
    /// Tests of an analyzed suite; setups are skipped.
    pub fn tests(&self) -> impl Iterator<Item = &Test> {
        self.tests_or_setups.iter().filter_map(|item| match item {
            TestOrSetup::Test(test) => Some(test),
            TestOrSetup::Setup(_) => None,
        })
    }

    /// Look up a constant by name.
    #[must_use]
    pub fn constant(&self, name: &str) -> Option<&str> {
        self.constants
            .constants
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.value.as_str())
    }
}
