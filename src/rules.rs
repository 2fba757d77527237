//! Combinator rule engine.
//!
//! A [`Grammar`] is an arena of rules addressed by [`RuleId`]. Each rule
//! records a list of instructions at construction time and replays them
//! against a token slice at parse time. Rules may reference themselves
//! or each other recursively; every invocation gets its own `Frame` on
//! the call stack, so reentering a rule never disturbs an outer call.
//!
//! Backtracking is explicit: instructions return `Result<(), Halt>`, and
//! only a mismatch is absorbed by `optionally`, `expect_some_of`,
//! loops and lookahead. Anything that tries and may undo takes a
//! snapshot of the token position and the frame's children first.

use crate::ast::Node;
use crate::parser::{ParseError, ParseErrorKind};
use crate::token::{Span, Token, TokenKind};

/// Builds a node from a rule's children, in recorded order.
pub type Production = fn(Vec<Child>) -> Result<Node, ParseErrorKind>;

/// Handle to a rule inside a [`Grammar`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleId(usize);

/// What a single instruction consumes: one token or one rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    Token(TokenKind),
    Rule(RuleId),
}

impl From<TokenKind> for Expected {
    fn from(kind: TokenKind) -> Self {
        Self::Token(kind)
    }
}

impl From<RuleId> for Expected {
    fn from(id: RuleId) -> Self {
        Self::Rule(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Instruction {
    Expect(Expected),
    Optionally(Expected),
    ZeroOrMore {
        item: Expected,
        stop: Option<Expected>,
    },
    OneOrMore {
        item: Expected,
        stop: Option<Expected>,
    },
    ExpectSomeOf(Vec<Expected>),
    IgnoreNext(Expected),
}

impl Instruction {
    const fn name(&self) -> &'static str {
        match self {
            Self::Expect(_) => "expect",
            Self::Optionally(_) => "optionally",
            Self::ZeroOrMore { .. } => "zero_or_more",
            Self::OneOrMore { .. } => "one_or_more",
            Self::ExpectSomeOf(_) => "expect_some_of",
            Self::IgnoreNext(_) => "ignore_next",
        }
    }
}

/// One entry of a rule's child list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Child {
    Token(Token),
    Node(Node),
    /// Placeholder left by an `optionally` that did not match.
    Absent,
    /// Everything matched by one loop instruction.
    List(Vec<Child>),
}

impl Child {
    #[must_use]
    pub const fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    #[must_use]
    pub fn token_kind(&self) -> Option<TokenKind> {
        match self {
            Self::Token(token) => Some(token.kind),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct RuleDef {
    name: &'static str,
    production: Option<Production>,
    instructions: Vec<Instruction>,
}

/// Arena of rules.
#[derive(Debug, Default)]
pub struct Grammar {
    rules: Vec<RuleDef>,
}

impl Grammar {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a rule that builds a node with `production` once all of its
    /// instructions succeed.
    pub fn rule(&mut self, name: &'static str, production: Production) -> RuleBuilder<'_> {
        self.declare(name, Some(production))
    }

    /// Start a grouping rule: its children are spliced into the caller's
    /// child list instead of becoming a node.
    pub fn group(&mut self, name: &'static str) -> RuleBuilder<'_> {
        self.declare(name, None)
    }

    fn declare(&mut self, name: &'static str, production: Option<Production>) -> RuleBuilder<'_> {
        let id = RuleId(self.rules.len());
        self.rules.push(RuleDef {
            name,
            production,
            instructions: Vec::new(),
        });
        RuleBuilder { grammar: self, id }
    }

    /// Append instructions to an existing rule. Used for rules that
    /// reference themselves.
    pub const fn extend(&mut self, id: RuleId) -> RuleBuilder<'_> {
        RuleBuilder { grammar: self, id }
    }

    #[must_use]
    pub fn name(&self, id: RuleId) -> &'static str {
        self.rules.get(id.0).map_or("<unknown rule>", |rule| rule.name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn describe(&self, expected: Expected) -> String {
        match expected {
            Expected::Token(kind) => kind.name().to_string(),
            Expected::Rule(id) => self.name(id).to_string(),
        }
    }
}

/// Chaining builder returned by [`Grammar::rule`] and [`Grammar::group`].
pub struct RuleBuilder<'g> {
    grammar: &'g mut Grammar,
    id: RuleId,
}

impl RuleBuilder<'_> {
    fn push(self, instruction: Instruction) -> Self {
        self.grammar.rules[self.id.0].instructions.push(instruction);
        self
    }

    /// Consume exactly one token or run one rule.
    #[must_use]
    pub fn expect(self, expected: impl Into<Expected>) -> Self {
        self.push(Instruction::Expect(expected.into()))
    }

    /// Like `expect`, but leaves [`Child::Absent`] instead of failing.
    #[must_use]
    pub fn optionally(self, expected: impl Into<Expected>) -> Self {
        self.push(Instruction::Optionally(expected.into()))
    }

    #[must_use]
    pub fn zero_or_more(self, expected: impl Into<Expected>) -> Self {
        self.push(Instruction::ZeroOrMore {
            item: expected.into(),
            stop: None,
        })
    }

    #[must_use]
    pub fn one_or_more(self, expected: impl Into<Expected>) -> Self {
        self.push(Instruction::OneOrMore {
            item: expected.into(),
            stop: None,
        })
    }

    /// Stop the preceding loop as soon as `stop` would match.
    ///
    /// The check runs before every iteration, including the first: a
    /// `one_or_more` whose stop condition matches right away fails.
    ///
    /// # Panics
    ///
    /// Panics if the previous instruction is not a loop.
    #[must_use]
    pub fn until(self, stop: impl Into<Expected>) -> Self {
        let stop = stop.into();
        let rule = &mut self.grammar.rules[self.id.0];
        match rule.instructions.last_mut() {
            Some(
                Instruction::ZeroOrMore { stop: slot, .. } | Instruction::OneOrMore { stop: slot, .. },
            ) => *slot = Some(stop),
            _ => panic!("until() must follow a loop in rule {}", rule.name),
        }
        self
    }

    /// Ordered choice: the first alternative that matches wins.
    #[must_use]
    pub fn expect_some_of(self, alternatives: impl IntoIterator<Item = Expected>) -> Self {
        self.push(Instruction::ExpectSomeOf(alternatives.into_iter().collect()))
    }

    /// Skip any number of matches without recording children.
    #[must_use]
    pub fn ignore_next(self, expected: impl Into<Expected>) -> Self {
        self.push(Instruction::IgnoreNext(expected.into()))
    }

    #[must_use]
    pub const fn id(&self) -> RuleId {
        self.id
    }
}

/// Run `start` over `tokens`.
///
/// Returns the children the rule contributes (one node, or the spliced
/// children of a grouping rule) and the number of tokens consumed.
///
/// # Errors
///
/// Returns the furthest mismatch seen if `start` cannot match, or the
/// error of a production that rejected its children.
pub fn run(grammar: &Grammar, start: RuleId, tokens: &[Token]) -> Result<(Vec<Child>, usize), ParseError> {
    let mut machine = Machine {
        grammar,
        tokens,
        pos: 0,
        depth: 0,
        furthest: None,
    };
    match machine.run_rule(start) {
        Ok(children) => Ok((children, machine.pos)),
        Err(Halt::Fatal(error)) => Err(error),
        Err(Halt::Mismatch(mismatch)) => {
            let mismatch = match machine.furthest.take() {
                Some(furthest) if furthest.at > mismatch.at => furthest,
                _ => mismatch,
            };
            Err(ParseError {
                span: machine.span_at(mismatch.at),
                kind: mismatch.kind,
            })
        }
    }
}

/// Why an instruction stopped.
#[derive(Debug)]
enum Halt {
    /// Recoverable: the input does not match here.
    Mismatch(Mismatch),
    /// Not recoverable by backtracking.
    Fatal(ParseError),
}

#[derive(Debug, Clone)]
struct Mismatch {
    kind: ParseErrorKind,
    at: usize,
}

/// Per-invocation state of one rule.
#[derive(Debug, Default)]
struct Frame {
    children: Vec<Child>,
    in_loop: bool,
}

impl Frame {
    fn push(&mut self, child: Child) {
        if self.in_loop {
            if let Some(Child::List(items)) = self.children.last_mut() {
                items.push(child);
                return;
            }
        }
        self.children.push(child);
    }

    fn begin_loop(&mut self) {
        if !self.in_loop {
            self.children.push(Child::List(Vec::new()));
            self.in_loop = true;
        }
    }
}

/// Enough state to undo an attempt: children are only ever appended,
/// to the frame or to its trailing list, so truncation restores them.
#[derive(Debug, Clone, Copy)]
struct Snapshot {
    pos: usize,
    children: usize,
    tail: Option<usize>,
    in_loop: bool,
}

struct Machine<'g, 't> {
    grammar: &'g Grammar,
    tokens: &'t [Token],
    pos: usize,
    depth: usize,
    furthest: Option<Mismatch>,
}

impl Machine<'_, '_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn span_at(&self, at: usize) -> Span {
        self.tokens
            .get(at)
            .or_else(|| self.tokens.last())
            .map(|token| token.span.clone())
            .unwrap_or_default()
    }

    fn found(&self) -> String {
        self.peek()
            .map_or_else(|| "end of input".to_string(), |token| token.kind.name().to_string())
    }

    fn mismatch(&mut self, kind: ParseErrorKind) -> Halt {
        let mismatch = Mismatch { kind, at: self.pos };
        if self
            .furthest
            .as_ref()
            .is_none_or(|furthest| mismatch.at > furthest.at)
        {
            self.furthest = Some(mismatch.clone());
        }
        Halt::Mismatch(mismatch)
    }

    fn snapshot(&self, frame: &Frame) -> Snapshot {
        Snapshot {
            pos: self.pos,
            children: frame.children.len(),
            tail: match frame.children.last() {
                Some(Child::List(items)) => Some(items.len()),
                _ => None,
            },
            in_loop: frame.in_loop,
        }
    }

    fn restore(&mut self, frame: &mut Frame, snapshot: Snapshot) {
        self.pos = snapshot.pos;
        frame.children.truncate(snapshot.children);
        if let Some(len) = snapshot.tail {
            if let Some(Child::List(items)) = frame.children.last_mut() {
                items.truncate(len);
            }
        }
        frame.in_loop = snapshot.in_loop;
    }

    fn run_rule(&mut self, id: RuleId) -> Result<Vec<Child>, Halt> {
        let grammar = self.grammar;
        let Some(rule) = grammar.rules.get(id.0) else {
            return Err(Halt::Fatal(ParseError {
                kind: ParseErrorKind::Malformed {
                    production: "<unknown rule>",
                },
                span: self.span_at(self.pos),
            }));
        };

        let start = self.pos;
        let mut frame = Frame::default();
        self.depth += 1;
        let mut result = Ok(());
        for instruction in &rule.instructions {
            tracing::trace!(
                rule = rule.name,
                instruction = instruction.name(),
                next = %self.found(),
                line = self.peek().map_or(0, |t| t.span.line),
                depth = self.depth,
                "step"
            );
            result = self.step(&mut frame, instruction);
            if result.is_err() {
                break;
            }
        }
        self.depth -= 1;

        if let Err(halt) = result {
            self.pos = start;
            return Err(halt);
        }

        match rule.production {
            Some(build) => match build(frame.children) {
                Ok(node) => Ok(vec![Child::Node(node)]),
                Err(kind) => Err(Halt::Fatal(ParseError {
                    kind,
                    span: self.span_at(start),
                })),
            },
            None => Ok(frame.children),
        }
    }

    fn step(&mut self, frame: &mut Frame, instruction: &Instruction) -> Result<(), Halt> {
        match instruction {
            Instruction::Expect(expected) => self.expect(frame, *expected),
            Instruction::Optionally(expected) => {
                let snapshot = self.snapshot(frame);
                match self.expect(frame, *expected) {
                    Err(Halt::Mismatch(_)) => {
                        self.restore(frame, snapshot);
                        frame.push(Child::Absent);
                        Ok(())
                    }
                    other => other,
                }
            }
            Instruction::ZeroOrMore { item, stop } => {
                frame.begin_loop();
                self.repeat(frame, *item, *stop)?;
                frame.in_loop = false;
                Ok(())
            }
            Instruction::OneOrMore { item, stop } => {
                frame.begin_loop();
                if let Some(stop) = *stop {
                    if self.lookahead(frame, stop)? {
                        let kind = ParseErrorKind::Expected {
                            expected: self.grammar.describe(*item),
                            found: self.grammar.describe(stop),
                        };
                        return Err(self.mismatch(kind));
                    }
                }
                self.expect(frame, *item)?;
                self.repeat(frame, *item, *stop)?;
                frame.in_loop = false;
                Ok(())
            }
            Instruction::ExpectSomeOf(alternatives) => {
                for alternative in alternatives {
                    let snapshot = self.snapshot(frame);
                    match self.expect(frame, *alternative) {
                        Ok(()) => return Ok(()),
                        Err(Halt::Mismatch(_)) => self.restore(frame, snapshot),
                        Err(fatal) => return Err(fatal),
                    }
                }
                let expected = alternatives
                    .iter()
                    .map(|alternative| self.grammar.describe(*alternative))
                    .collect();
                let found = self.found();
                Err(self.mismatch(ParseErrorKind::ExpectedOneOf { expected, found }))
            }
            Instruction::IgnoreNext(expected) => {
                let snapshot = self.snapshot(frame);
                while self.pos < self.tokens.len() {
                    let before = self.pos;
                    match self.expect(frame, *expected) {
                        Ok(()) if self.pos == before => break,
                        Ok(()) => {}
                        Err(Halt::Mismatch(_)) => break,
                        Err(fatal) => return Err(fatal),
                    }
                }
                let pos = self.pos;
                self.restore(frame, snapshot);
                self.pos = pos;
                Ok(())
            }
        }
    }

    /// Consume one token or run one rule. On mismatch nothing is
    /// consumed and nothing is added to `frame`.
    fn expect(&mut self, frame: &mut Frame, expected: Expected) -> Result<(), Halt> {
        match expected {
            Expected::Token(kind) => match self.peek() {
                Some(token) if token.kind == kind => {
                    frame.push(Child::Token(token.clone()));
                    self.pos += 1;
                    Ok(())
                }
                _ => {
                    let found = self.found();
                    Err(self.mismatch(ParseErrorKind::Expected {
                        expected: kind.name().to_string(),
                        found,
                    }))
                }
            },
            Expected::Rule(id) => {
                for child in self.run_rule(id)? {
                    frame.push(child);
                }
                Ok(())
            }
        }
    }

    /// Run `item` until it fails, `stop` would match, or an iteration
    /// consumes nothing.
    fn repeat(&mut self, frame: &mut Frame, item: Expected, stop: Option<Expected>) -> Result<(), Halt> {
        while self.pos < self.tokens.len() {
            if let Some(stop) = stop {
                if self.lookahead(frame, stop)? {
                    break;
                }
            }
            let before = self.pos;
            match self.expect(frame, item) {
                Ok(()) if self.pos == before => break,
                Ok(()) => {}
                Err(Halt::Mismatch(_)) => break,
                Err(fatal) => return Err(fatal),
            }
        }
        Ok(())
    }

    /// Whether `expected` matches here. Consumes nothing.
    fn lookahead(&mut self, frame: &mut Frame, expected: Expected) -> Result<bool, Halt> {
        let snapshot = self.snapshot(frame);
        let result = self.expect(frame, expected);
        self.restore(frame, snapshot);
        match result {
            Ok(()) => Ok(true),
            Err(Halt::Mismatch(_)) => Ok(false),
            Err(fatal) => Err(fatal),
        }
    }
}
