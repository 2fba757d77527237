//! Semantic analysis.
//!
//! Resolves test names, folds setups into the tests that follow them,
//! appends continuations to their target test and fills in the global
//! setup, global teardown and constants from [`Settings`].

use std::collections::HashSet;
use std::fmt;

use crate::ast::{
    Command, Constant, Constants, GlobalSetup, Setup, StandaloneCommands, Test,
    TestOrSetup, TestSuite,
};
use crate::settings::Settings;
use crate::token::Span;

/// Global setup commands that run once per file, not before every test.
const ONE_TIME_PREFIXES: [&str; 4] = ["source ", ". ", "shopt -s expand_aliases", "alias "];

pub const VERBOSE_DEBUG: &str = "VERBOSE_DEBUG";
pub const TEMP_DIR: &str = "TEMP_DIR";
pub const COPY_DIR: &str = "COPY_DIR";

/// Classifies a semantic error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemanticErrorKind {
    /// `continuation of NAME` with no earlier test `NAME`.
    ReferencedBeforeAssignment { reference: String },
    /// A setup no later test picked up.
    UnconsumedSetup { reference: String },
    /// A setup block without commands.
    EmptySetup { block: &'static str },
    /// A test without assertions.
    EmptyTest { name: String },
}

impl fmt::Display for SemanticErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReferencedBeforeAssignment { reference } => {
                write!(f, "test \"{reference}\" referenced before assignment")
            }
            Self::UnconsumedSetup { reference } if reference.is_empty() => {
                write!(f, "setup is not followed by any test")
            }
            Self::UnconsumedSetup { reference } => {
                write!(f, "setup of \"{reference}\" referenced before assignment")
            }
            Self::EmptySetup { block } => write!(f, "{block} has no commands"),
            Self::EmptyTest { name } => write!(f, "test \"{name}\" has no assertions"),
        }
    }
}

/// Error produced during semantic analysis.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at line {}, column {}", span.line, span.column)]
pub struct SemanticError {
    pub kind: SemanticErrorKind,
    pub span: Span,
}

/// Resolve a parsed suite.
///
/// The result holds only tests, in file order, each named and carrying
/// the setups written before it. Global setup and teardown are always
/// present.
///
/// # Errors
///
/// Returns `SemanticError` for a continuation of an unknown test, a
/// setup no test consumes, or an empty setup or test.
pub fn analyze(suite: TestSuite, settings: &Settings) -> Result<TestSuite, SemanticError> {
    let TestSuite {
        global_setup,
        tests_or_setups,
        global_teardown,
        eof,
        ..
    } = suite;

    let global_setup = resolve_global_setup(global_setup.unwrap_or_default(), settings)?;
    let global_teardown = global_teardown.unwrap_or_default();
    if global_teardown.span.is_some() && global_teardown.commands.is_empty() {
        return Err(SemanticError {
            kind: SemanticErrorKind::EmptySetup {
                block: "global teardown",
            },
            span: global_teardown.span.clone().unwrap_or_default(),
        });
    }

    let entities = collect_entities(tests_or_setups)?;
    let count = entities.len();
    let tests = merge(entities)?;
    tracing::debug!(entities = count, tests = tests.len(), "analyzed test suite");

    Ok(TestSuite {
        global_setup: Some(global_setup),
        tests_or_setups: tests.into_iter().map(TestOrSetup::Test).collect(),
        global_teardown: Some(global_teardown),
        constants: constants(settings),
        eof,
    })
}

fn resolve_global_setup(block: GlobalSetup, settings: &Settings) -> Result<GlobalSetup, SemanticError> {
    if block.span.is_some() && block.commands.is_empty() && block.one_time_commands.is_empty() {
        return Err(SemanticError {
            kind: SemanticErrorKind::EmptySetup {
                block: "global setup",
            },
            span: block.span.unwrap_or_default(),
        });
    }

    let (user_one_time, per_test): (Vec<Command>, Vec<Command>) =
        block.commands.commands.into_iter().partition(|command| {
            let text = command.text.trim_start();
            ONE_TIME_PREFIXES.iter().any(|prefix| text.starts_with(prefix))
        });

    let mut one_time = Vec::new();
    if !settings.disable_aliases {
        one_time.push(Command::new("shopt -s expand_aliases"));
    }
    for path in &settings.visible_paths {
        one_time.push(Command::new(format!("export PATH=\"{}:$PATH\"", path.display())));
    }
    for source in &settings.sources {
        one_time.push(Command::new(format!("source {}", source.display())));
    }
    one_time.extend(block.one_time_commands.commands);
    one_time.extend(user_one_time);

    tracing::trace!(one_time = one_time.len(), per_test = per_test.len(), "global setup");
    Ok(GlobalSetup {
        span: block.span,
        one_time_commands: StandaloneCommands { commands: one_time },
        commands: StandaloneCommands { commands: per_test },
    })
}

/// A test or setup with its resolved reference.
struct Entity {
    reference: String,
    continuation: bool,
    item: TestOrSetup,
}

fn setup_span(setup: &Setup) -> Span {
    setup
        .reference
        .as_ref()
        .map(|r| r.span.clone())
        .or_else(|| setup.commands.commands.first().map(|c| c.span.clone()))
        .unwrap_or_default()
}

fn collect_entities(items: Vec<TestOrSetup>) -> Result<Vec<Entity>, SemanticError> {
    let mut defined: HashSet<String> = HashSet::new();
    let mut entities = Vec::with_capacity(items.len());

    for item in items {
        let entity = match item {
            TestOrSetup::Setup(setup) => {
                if setup.commands.is_empty() {
                    return Err(SemanticError {
                        kind: SemanticErrorKind::EmptySetup { block: "setup" },
                        span: setup_span(&setup),
                    });
                }
                Entity {
                    reference: setup.reference_name().to_string(),
                    continuation: false,
                    item: TestOrSetup::Setup(setup),
                }
            }
            TestOrSetup::Test(mut test) => {
                let (reference, continuation) = match &test.reference {
                    Some(reference) => (reference.name.trim().to_string(), reference.is_continuation()),
                    None => (format!("test of line {}", test.line().unwrap_or_default()), false),
                };
                if test.setup_assertions.is_empty() {
                    return Err(SemanticError {
                        kind: SemanticErrorKind::EmptyTest { name: reference },
                        span: test.reference.map(|r| r.span).unwrap_or_default(),
                    });
                }
                if continuation && !defined.contains(&reference) {
                    return Err(SemanticError {
                        kind: SemanticErrorKind::ReferencedBeforeAssignment { reference },
                        span: test.reference.map(|r| r.span).unwrap_or_default(),
                    });
                }
                defined.insert(reference.clone());
                test.name.clone_from(&reference);
                Entity {
                    reference,
                    continuation,
                    item: TestOrSetup::Test(test),
                }
            }
        };
        tracing::trace!(
            reference = %entity.reference,
            continuation = entity.continuation,
            "entity"
        );
        entities.push(entity);
    }
    Ok(entities)
}

fn merge(entities: Vec<Entity>) -> Result<Vec<Test>, SemanticError> {
    let mut pending: Vec<Setup> = Vec::new();
    let mut tests: Vec<Test> = Vec::new();

    for entity in entities {
        let mut test = match entity.item {
            TestOrSetup::Setup(setup) => {
                pending.push(setup);
                continue;
            }
            TestOrSetup::Test(test) => test,
        };

        let commands = take_pending(&mut pending, &entity.reference);
        prepend_setup(&mut test, commands);

        if !entity.continuation {
            tests.push(test);
            continue;
        }
        let span = test.reference.as_ref().map(|r| r.span.clone()).unwrap_or_default();
        let Some(target) = tests.iter_mut().rev().find(|t| t.name == entity.reference) else {
            return Err(SemanticError {
                kind: SemanticErrorKind::ReferencedBeforeAssignment {
                    reference: entity.reference,
                },
                span,
            });
        };
        target.setup_assertions.extend(test.setup_assertions);
    }

    if let Some(setup) = pending.first() {
        return Err(SemanticError {
            kind: SemanticErrorKind::UnconsumedSetup {
                reference: setup.reference_name().to_string(),
            },
            span: setup_span(setup),
        });
    }
    Ok(tests)
}

/// Remove the pending setups meant for `reference` and return their
/// commands in stack order.
fn take_pending(pending: &mut Vec<Setup>, reference: &str) -> Vec<Command> {
    let (matching, rest): (Vec<Setup>, Vec<Setup>) = pending.drain(..).partition(|setup| {
        let name = setup.reference_name();
        name.is_empty() || name == reference
    });
    *pending = rest;
    matching
        .into_iter()
        .flat_map(|setup| setup.commands.commands)
        .collect()
}

fn prepend_setup(test: &mut Test, mut commands: Vec<Command>) {
    if commands.is_empty() {
        return;
    }
    let Some(first) = test.setup_assertions.first_mut() else {
        return;
    };
    match &mut first.setup {
        Some(setup) => {
            commands.append(&mut setup.commands.commands);
            setup.commands.commands = commands;
        }
        None => {
            first.setup = Some(Setup {
                reference: None,
                commands: StandaloneCommands { commands },
            });
        }
    }
}

fn constants(settings: &Settings) -> Constants {
    let constant = |name: &str, value: String| Constant {
        name: name.to_string(),
        value,
    };
    Constants {
        constants: vec![
            constant(VERBOSE_DEBUG, settings.debug_sink.clone()),
            constant(TEMP_DIR, settings.temp_dir.display().to_string()),
            constant(COPY_DIR, settings.copy_dir.display().to_string()),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{
        Assertion, CommandAssertion, MultilineText, SetupAssertion, SetupReference, TestReference,
    };
    use crate::token::{Token, TokenKind};

    fn assertion(command: &str) -> SetupAssertion {
        SetupAssertion {
            setup: None,
            assertion: Assertion::Command(CommandAssertion {
                command: Command::new(command),
                expected: MultilineText { lines: Vec::new() },
            }),
        }
    }

    fn suite(items: Vec<TestOrSetup>) -> TestSuite {
        TestSuite {
            global_setup: None,
            tests_or_setups: items,
            global_teardown: None,
            constants: Constants::default(),
            eof: Token::new(TokenKind::Eof, "", Span::default()),
        }
    }

    fn named(name: &str) -> Option<TestReference> {
        Some(TestReference {
            continuation: None,
            name: name.to_string(),
            span: Span::default(),
        })
    }

    fn setup_of(name: Option<&str>, commands: &[&str]) -> Setup {
        Setup {
            reference: Some(SetupReference {
                name: name.map(str::to_string),
                span: Span::default(),
            }),
            commands: StandaloneCommands {
                commands: commands.iter().copied().map(Command::new).collect(),
            },
        }
    }

    #[test]
    fn referenced_setup_goes_to_its_test() {
        let input = suite(vec![
            TestOrSetup::Setup(setup_of(Some("b"), &["mk b"])),
            TestOrSetup::Test(Test::new(named("a"), vec![assertion("ls")])),
            TestOrSetup::Test(Test::new(named("b"), vec![assertion("ls")])),
        ]);
        let out = analyze(input, &Settings::new()).expect("should analyze");
        let tests: Vec<_> = out.tests().collect();
        assert!(tests[0].setup_assertions[0].setup.is_none());
        let setup = tests[1].setup_assertions[0].setup.as_ref().expect("setup");
        assert_eq!(setup.commands.commands[0].text, "mk b");
    }

    #[test]
    fn pending_setups_keep_stack_order() {
        let mut test = Test::new(named("t"), vec![assertion("ls")]);
        test.setup_assertions[0].setup = Some(setup_of(None, &["inline"]));
        let input = suite(vec![
            TestOrSetup::Setup(setup_of(None, &["first"])),
            TestOrSetup::Setup(setup_of(Some("t"), &["second"])),
            TestOrSetup::Test(test),
        ]);
        let out = analyze(input, &Settings::new()).expect("should analyze");
        let test = out.tests().next().expect("one test");
        let setup = test.setup_assertions[0].setup.as_ref().expect("setup");
        let texts: Vec<_> = setup.commands.commands.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, ["first", "second", "inline"]);
    }

    #[test]
    fn empty_test_is_rejected() {
        let input = suite(vec![TestOrSetup::Test(Test::new(named("t"), Vec::new()))]);
        let err = analyze(input, &Settings::new()).unwrap_err();
        assert_eq!(err.kind, SemanticErrorKind::EmptyTest { name: "t".into() });
    }

    #[test]
    fn empty_setup_is_rejected() {
        let input = suite(vec![TestOrSetup::Setup(setup_of(None, &[]))]);
        let err = analyze(input, &Settings::new()).unwrap_err();
        assert_eq!(err.kind, SemanticErrorKind::EmptySetup { block: "setup" });
    }

    #[test]
    fn global_setup_is_partitioned() {
        let mut input = suite(vec![TestOrSetup::Test(Test::new(named("t"), vec![assertion("ls")]))]);
        input.global_setup = Some(GlobalSetup {
            span: Some(Span::default()),
            one_time_commands: StandaloneCommands::default(),
            commands: StandaloneCommands {
                commands: vec![
                    Command::new("source lib.bash"),
                    Command::new("cd /tmp"),
                    Command::new("alias ll='ls -l'"),
                ],
            },
        });
        let settings = Settings::new().visible_path("./bin").source("extra.bash");
        let out = analyze(input, &settings).expect("should analyze");
        let global = out.global_setup.expect("global setup");
        let one_time: Vec<_> = global
            .one_time_commands
            .commands
            .iter()
            .map(|c| c.text.as_str())
            .collect();
        assert_eq!(
            one_time,
            [
                "shopt -s expand_aliases",
                "export PATH=\"./bin:$PATH\"",
                "source extra.bash",
                "source lib.bash",
                "alias ll='ls -l'",
            ]
        );
        assert_eq!(global.commands.commands[0].text, "cd /tmp");
    }

    #[test]
    fn aliases_can_be_disabled() {
        let input = suite(vec![TestOrSetup::Test(Test::new(named("t"), vec![assertion("ls")]))]);
        let out = analyze(input, &Settings::new().disable_aliases(true)).expect("should analyze");
        let global = out.global_setup.expect("global setup");
        assert!(global.one_time_commands.is_empty());
        assert!(out.global_teardown.is_some());
    }

    #[test]
    fn constants_come_from_settings() {
        let input = suite(vec![TestOrSetup::Test(Test::new(named("t"), vec![assertion("ls")]))]);
        let settings = Settings::new().debug_sink("> /dev/null").copy_dir("fixtures");
        let out = analyze(input, &settings).expect("should analyze");
        assert_eq!(out.constant(VERBOSE_DEBUG), Some("> /dev/null"));
        assert_eq!(out.constant(TEMP_DIR), Some("/tmp/batspp"));
        assert_eq!(out.constant(COPY_DIR), Some("fixtures"));
    }

    #[test]
    fn unconsumed_setup_messages() {
        let kind = SemanticErrorKind::UnconsumedSetup { reference: "x".into() };
        assert_eq!(kind.to_string(), "setup of \"x\" referenced before assignment");
        let kind = SemanticErrorKind::UnconsumedSetup {
            reference: String::new(),
        };
        assert_eq!(kind.to_string(), "setup is not followed by any test");
    }
}
