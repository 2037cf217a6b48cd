//! Packrat evaluation of parsing expressions.
//!
//! Rule applications are memoized per input position. Each memo entry records
//! how far past its position the evaluation looked (`examined_length`), which
//! is what lets [`PositionMemo::clear_obsolete_entries`] keep entries that an
//! edit could not have affected.
//!
//! Left recursion is handled by seed growing: an application that re-enters
//! itself at the same position reads a failing seed, and the outer
//! application (the head) re-evaluates its body until the match stops
//! getting longer. Results that depended on the seed of an enclosing head are
//! not memoized, since they are only valid during that head's growth.
//!
//! Every rule application recurses on the native stack, so the stack is grown
//! on demand and nesting is capped at [`MAX_APPLICATION_DEPTH`]. A match that
//! hits the cap is abandoned rather than reported as a parse failure.

use std::collections::HashMap;
use std::mem;
use std::rc::Rc;

use super::cst::Node;
use super::failure::{Expected, FailureSet};
use super::match_result::MatchResult;
use super::pexpr::{is_syntactic, IterOp, PExpr};
use super::trace::{TraceKind, TraceNode};
use super::types::{Grammar, RuleInfo};

static END: PExpr = PExpr::End;

const SPACES: &str = "spaces";

/// Deepest chain of nested rule applications a match may build.
pub const MAX_APPLICATION_DEPTH: usize = 20_000;

const STACK_RED_ZONE: usize = 128 * 1024;
const STACK_GROWTH: usize = 2 * 1024 * 1024;

/// Run `f`, first moving to a fresh stack segment if the current one is
/// nearly exhausted. Used by every recursive walk over matches and traces.
pub(crate) fn with_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(STACK_RED_ZONE, STACK_GROWTH, f)
}

#[derive(Debug, Clone)]
struct MemoEntry {
    node: Option<Rc<Node>>,
    match_length: usize,
    examined_length: usize,
    /// Rightmost failures, relative to the entry position
    failures: FailureSet,
    trace: Option<Rc<TraceNode>>,
    in_progress: bool,
    lr_detected: bool,
}

impl MemoEntry {
    fn placeholder() -> Self {
        Self {
            node: None,
            match_length: 0,
            examined_length: 0,
            failures: FailureSet::new(),
            trace: None,
            in_progress: true,
            lr_detected: false,
        }
    }
}

/// Memoized rule results at a single input position.
#[derive(Debug, Clone, Default)]
pub(crate) struct PositionMemo {
    entries: HashMap<String, MemoEntry>,
    max_examined_length: usize,
}

impl PositionMemo {
    fn insert(&mut self, rule: &str, entry: MemoEntry) {
        self.max_examined_length = self.max_examined_length.max(entry.examined_length);
        self.entries.insert(rule.to_string(), entry);
    }

    /// Drop the entries at `pos` whose evaluation looked at `invalidated` or
    /// beyond.
    pub(crate) fn clear_obsolete_entries(&mut self, pos: usize, invalidated: usize) {
        if pos + self.max_examined_length <= invalidated {
            return;
        }
        self.entries
            .retain(|_, entry| pos + entry.examined_length <= invalidated);
        self.max_examined_length = self
            .entries
            .values()
            .map(|e| e.examined_length)
            .max()
            .unwrap_or(0);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// One slot per input position, plus one for the end of input.
pub(crate) type MemoTable = Vec<Option<PositionMemo>>;

pub(crate) fn new_memo_table(input_len: usize) -> MemoTable {
    (0..=input_len).map(|_| None).collect()
}

/// Result of evaluating a rule body once.
struct BodyOutcome {
    node: Option<Rc<Node>>,
    end: usize,
    trace: Vec<Rc<TraceNode>>,
}

/// What a top-level match produced.
pub(crate) struct MatchOutcome {
    cst: Option<(usize, Rc<Node>)>,
    failures: FailureSet,
    trace: Option<Rc<TraceNode>>,
    too_deep: bool,
}

impl MatchOutcome {
    /// The match was abandoned at the application depth cap. Its result and
    /// any memo entries it left behind are meaningless.
    pub(crate) fn too_deep(&self) -> bool {
        self.too_deep
    }

    pub(crate) fn take_trace(&mut self) -> Rc<TraceNode> {
        self.trace.take().unwrap_or_else(|| {
            Rc::new(TraceNode {
                kind: TraceKind::Root,
                display: String::new(),
                start: 0,
                end: 0,
                succeeded: self.cst.is_some(),
                children: Vec::new(),
                memoized: false,
                implicit_spaces: false,
            })
        })
    }

    pub(crate) fn into_result(self, input: Rc<str>, start_rule: &str) -> MatchResult {
        MatchResult::new(input, start_rule.to_string(), self.cst, self.failures)
    }
}

pub(crate) struct MatchState<'a> {
    grammar: &'a Grammar,
    input: &'a str,
    memo: &'a mut MemoTable,
    pos: usize,
    /// Exclusive end of the input examined by the innermost application
    max_examined: usize,
    failures: FailureSet,
    bindings: Vec<(usize, Rc<Node>)>,
    /// `true` for syntactic contexts
    contexts: Vec<bool>,
    /// Active rule applications, outermost first
    frames: Vec<(usize, &'a str)>,
    /// Lowest frame index whose in-progress seed was read
    seed_dependency: usize,
    trace: Option<Vec<Vec<Rc<TraceNode>>>>,
    depth_limit: usize,
    too_deep: bool,
}

impl<'a> MatchState<'a> {
    pub(crate) fn new(
        grammar: &'a Grammar,
        input: &'a str,
        memo: &'a mut MemoTable,
        tracing: bool,
    ) -> Self {
        Self {
            grammar,
            input,
            memo,
            pos: 0,
            max_examined: 0,
            failures: FailureSet::new(),
            bindings: Vec::new(),
            contexts: Vec::new(),
            frames: Vec::new(),
            seed_dependency: usize::MAX,
            trace: tracing.then(Vec::new),
            depth_limit: MAX_APPLICATION_DEPTH,
            too_deep: false,
        }
    }

    /// Match the whole input from `start_rule`, which must exist.
    pub(crate) fn run(mut self, start_rule: &str) -> MatchOutcome {
        let grammar = self.grammar;
        let Some(rule) = grammar.rule(start_rule) else {
            return MatchOutcome {
                cst: None,
                failures: self.failures,
                trace: None,
                too_deep: false,
            };
        };
        let start_rule = rule.name.as_str();
        self.contexts.push(is_syntactic(start_rule));
        self.begin_trace();

        if self.in_syntactic_context() {
            self.skip_spaces();
        }
        let first_binding = self.bindings.len();
        let succeeded = self.apply(start_rule) && self.eval(&END) && !self.too_deep;
        let cst = if succeeded {
            self.bindings.get(first_binding).cloned()
        } else {
            None
        };

        let children = self.end_trace();
        let trace = self.trace.is_some().then(|| {
            Rc::new(TraceNode {
                kind: TraceKind::Root,
                display: start_rule.to_string(),
                start: 0,
                end: if succeeded { self.pos } else { 0 },
                succeeded,
                children,
                memoized: false,
                implicit_spaces: false,
            })
        });

        MatchOutcome {
            cst,
            failures: self.failures,
            trace,
            too_deep: self.too_deep,
        }
    }

    fn in_syntactic_context(&self) -> bool {
        self.contexts.last().copied().unwrap_or(false)
    }

    fn examine(&mut self, end: usize) {
        self.max_examined = self.max_examined.max(end);
    }

    fn fail(&mut self, expected: Expected) {
        self.failures.record(self.pos, expected);
    }

    fn next_char(&mut self) -> Option<char> {
        let c = self.input[self.pos..].chars().next();
        let end = match c {
            Some(c) => self.pos + c.len_utf8(),
            None => self.input.len() + 1,
        };
        self.examine(end);
        c
    }

    fn begin_trace(&mut self) {
        if let Some(stack) = &mut self.trace {
            stack.push(Vec::new());
        }
    }

    fn end_trace(&mut self) -> Vec<Rc<TraceNode>> {
        self.trace
            .as_mut()
            .and_then(|stack| stack.pop())
            .unwrap_or_default()
    }

    fn push_trace(&mut self, node: Rc<TraceNode>) {
        if let Some(top) = self.trace.as_mut().and_then(|stack| stack.last_mut()) {
            top.push(node);
        }
    }

    fn skip_spaces(&mut self) {
        let saved_failures = mem::take(&mut self.failures);
        let first_binding = self.bindings.len();
        self.apply(SPACES);
        self.bindings.truncate(first_binding);
        self.failures = saved_failures;

        if let Some(last) = self
            .trace
            .as_mut()
            .and_then(|stack| stack.last_mut())
            .and_then(|top| top.last_mut())
        {
            Rc::make_mut(last).implicit_spaces = true;
        }
    }

    fn eval(&mut self, expr: &'a PExpr) -> bool {
        let skips = match expr {
            PExpr::Apply(name) => name != SPACES,
            other => other.consumes_input(),
        };
        if skips && self.in_syntactic_context() {
            self.skip_spaces();
        }

        match expr {
            PExpr::Apply(name) => self.apply(name),
            _ if self.trace.is_some() => {
                let start = self.pos;
                self.begin_trace();
                let succeeded = self.eval_body(expr);
                let children = self.end_trace();
                self.push_trace(Rc::new(TraceNode {
                    kind: TraceKind::of(expr),
                    display: expr.to_string(),
                    start,
                    end: if succeeded { self.pos } else { start },
                    succeeded,
                    children,
                    memoized: false,
                    implicit_spaces: false,
                }));
                succeeded
            }
            _ => self.eval_body(expr),
        }
    }

    fn eval_body(&mut self, expr: &'a PExpr) -> bool {
        match expr {
            PExpr::Any => match self.next_char() {
                Some(c) => self.consume(c.len_utf8()),
                None => {
                    self.fail(Expected::Any);
                    false
                }
            },
            PExpr::End => {
                self.examine(self.pos + 1);
                if self.pos >= self.input.len() {
                    true
                } else {
                    self.fail(Expected::End);
                    false
                }
            }
            PExpr::Terminal(s) => {
                let end = self.pos + s.len();
                self.examine(if end > self.input.len() {
                    self.input.len() + 1
                } else {
                    end
                });
                if self.input[self.pos..].starts_with(s.as_str()) {
                    self.consume(s.len())
                } else {
                    self.fail(Expected::Terminal(s.clone()));
                    false
                }
            }
            PExpr::Range(lo, hi) => match self.next_char() {
                Some(c) if *lo <= c && c <= *hi => self.consume(c.len_utf8()),
                _ => {
                    self.fail(Expected::Range(*lo, *hi));
                    false
                }
            },
            PExpr::Apply(name) => self.apply(name),
            PExpr::Alt(alternatives) => {
                let (pos, first_binding) = (self.pos, self.bindings.len());
                for alternative in alternatives {
                    if self.eval(alternative) {
                        return true;
                    }
                    self.pos = pos;
                    self.bindings.truncate(first_binding);
                }
                false
            }
            PExpr::Seq(exprs) => {
                let (pos, first_binding) = (self.pos, self.bindings.len());
                for e in exprs {
                    if !self.eval(e) {
                        self.pos = pos;
                        self.bindings.truncate(first_binding);
                        return false;
                    }
                }
                true
            }
            PExpr::Iter { expr, op } => self.eval_iter(expr, *op),
            PExpr::Not(inner) => {
                let (pos, first_binding) = (self.pos, self.bindings.len());
                let saved_failures = mem::take(&mut self.failures);
                let matched = self.eval(inner);
                self.failures = saved_failures;
                self.pos = pos;
                self.bindings.truncate(first_binding);
                if matched {
                    self.fail(Expected::Not(inner.to_string()));
                    false
                } else {
                    true
                }
            }
            PExpr::Lookahead(inner) => {
                let (pos, first_binding) = (self.pos, self.bindings.len());
                let matched = self.eval(inner);
                self.pos = pos;
                self.bindings.truncate(first_binding);
                matched
            }
            PExpr::Lex(inner) => {
                self.contexts.push(false);
                let matched = self.eval(inner);
                self.contexts.pop();
                matched
            }
        }
    }

    fn consume(&mut self, len: usize) -> bool {
        let start = self.pos;
        self.pos += len;
        self.bindings.push((start, Rc::new(Node::Terminal { len })));
        true
    }

    fn eval_iter(&mut self, expr: &'a PExpr, op: IterOp) -> bool {
        let (start, first_binding) = (self.pos, self.bindings.len());
        let mut count = 0;
        loop {
            if op == IterOp::Opt && count == 1 {
                break;
            }
            let (pos, bindings) = (self.pos, self.bindings.len());
            if !self.eval(expr) {
                self.pos = pos;
                self.bindings.truncate(bindings);
                break;
            }
            count += 1;
            if self.pos == pos {
                break;
            }
        }
        if op == IterOp::Plus && count == 0 {
            self.pos = start;
            self.bindings.truncate(first_binding);
            return false;
        }

        let (offsets, children) = self
            .bindings
            .drain(first_binding..)
            .map(|(offset, node)| (offset - start, node))
            .unzip();
        self.bindings.push((
            start,
            Rc::new(Node::Iter {
                children,
                offsets,
                len: self.pos - start,
                optional: op == IterOp::Opt,
            }),
        ));
        true
    }

    fn apply(&mut self, name: &'a str) -> bool {
        if self.too_deep {
            return false;
        }
        let grammar = self.grammar;
        let Some(rule) = grammar.rule(name) else {
            return false;
        };
        match self.use_memoized(self.pos, &rule.name) {
            Some(succeeded) => succeeded,
            None if self.frames.len() >= self.depth_limit => {
                self.too_deep = true;
                false
            }
            None => with_stack(|| self.evaluate_rule(rule)),
        }
    }

    fn use_memoized(&mut self, pos: usize, name: &str) -> Option<bool> {
        let frame = self
            .frames
            .iter()
            .rposition(|&(p, rule)| p == pos && rule == name);
        let entry = self.memo[pos].as_mut()?.entries.get_mut(name)?;
        if entry.in_progress {
            entry.lr_detected = true;
            if let Some(frame) = frame {
                self.seed_dependency = self.seed_dependency.min(frame);
            }
        }
        let entry = entry.clone();

        self.examine(pos + entry.examined_length);
        self.failures.merge(&entry.failures.absolute_from(pos));
        if self.trace.is_some() {
            let node = match &entry.trace {
                Some(node) => {
                    let mut node = (**node).clone();
                    node.memoized = true;
                    node
                }
                None => TraceNode {
                    kind: TraceKind::Apply(name.to_string()),
                    display: name.to_string(),
                    start: pos,
                    end: pos + entry.match_length,
                    succeeded: entry.node.is_some(),
                    children: Vec::new(),
                    memoized: true,
                    implicit_spaces: false,
                },
            };
            self.push_trace(Rc::new(node));
        }

        match entry.node {
            Some(node) => {
                self.bindings.push((pos, node));
                self.pos = pos + entry.match_length;
                Some(true)
            }
            None => Some(false),
        }
    }

    fn memo_slot(&mut self, pos: usize) -> &mut PositionMemo {
        self.memo[pos].get_or_insert_with(PositionMemo::default)
    }

    fn memo_entry(&mut self, pos: usize, name: &str) -> Option<&mut MemoEntry> {
        self.memo[pos].as_mut()?.entries.get_mut(name)
    }

    fn evaluate_rule(&mut self, rule: &'a RuleInfo) -> bool {
        let name = rule.name.as_str();
        let orig = self.pos;
        let depth = self.frames.len();

        self.memo_slot(orig).insert(name, MemoEntry::placeholder());
        self.frames.push((orig, name));
        let saved_dependency = mem::replace(&mut self.seed_dependency, usize::MAX);
        let saved_failures = mem::take(&mut self.failures);
        let saved_examined = mem::replace(&mut self.max_examined, orig);
        self.contexts.push(is_syntactic(name));

        let mut outcome = self.eval_rule_body(rule, orig);
        let is_head = self.memo_entry(orig, name).is_some_and(|e| e.lr_detected);
        if is_head && outcome.node.is_some() {
            outcome = self.grow_seed(rule, orig, outcome);
        }

        self.contexts.pop();
        self.frames.pop();

        let mut failures = mem::replace(&mut self.failures, saved_failures);
        if let Some(description) = &rule.description {
            failures = if outcome.node.is_some() {
                FailureSet::new()
            } else {
                FailureSet::single(orig, Expected::Description(description.clone()))
            };
        }
        let examined_length = self.max_examined - orig;
        self.max_examined = saved_examined.max(self.max_examined);

        let depends_on_outer_seed = self.seed_dependency < depth;
        self.seed_dependency = if depends_on_outer_seed {
            saved_dependency.min(self.seed_dependency)
        } else {
            saved_dependency
        };

        let succeeded = outcome.node.is_some();
        let end = if succeeded { outcome.end } else { orig };
        let trace = self
            .trace
            .is_some()
            .then(|| apply_trace_node(name, orig, end, succeeded, outcome.trace));

        if depends_on_outer_seed {
            if let Some(slot) = self.memo[orig].as_mut() {
                slot.entries.remove(name);
            }
        } else {
            let entry = MemoEntry {
                node: outcome.node.clone(),
                match_length: end - orig,
                examined_length,
                failures: failures.relative_to(orig),
                trace: trace.clone(),
                in_progress: false,
                lr_detected: false,
            };
            self.memo_slot(orig).insert(name, entry);
        }

        self.failures.merge(&failures);
        if let Some(node) = trace {
            self.push_trace(node);
        }
        self.pos = end;
        match outcome.node {
            Some(node) => {
                self.bindings.push((orig, node));
                true
            }
            None => false,
        }
    }

    fn eval_rule_body(&mut self, rule: &'a RuleInfo, orig: usize) -> BodyOutcome {
        self.pos = orig;
        let first_binding = self.bindings.len();
        self.begin_trace();
        let succeeded = self.eval(&rule.body);
        let trace = self.end_trace();
        let (offsets, children): (Vec<usize>, Vec<Rc<Node>>) = self
            .bindings
            .drain(first_binding..)
            .map(|(offset, node)| (offset - orig, node))
            .unzip();

        if !succeeded {
            return BodyOutcome {
                node: None,
                end: orig,
                trace,
            };
        }
        BodyOutcome {
            node: Some(Rc::new(Node::Nonterminal {
                rule: rule.name.clone(),
                children,
                offsets,
                len: self.pos - orig,
            })),
            end: self.pos,
            trace,
        }
    }

    /// Re-evaluate a left-recursive rule, feeding each result back in as the
    /// seed, until the match stops growing.
    fn grow_seed(&mut self, rule: &'a RuleInfo, orig: usize, seed: BodyOutcome) -> BodyOutcome {
        let name = rule.name.as_str();
        let tracing = self.trace.is_some();
        let mut best = seed;
        loop {
            let seed_trace = tracing
                .then(|| apply_trace_node(name, orig, best.end, true, best.trace.clone()));
            if let Some(entry) = self.memo_entry(orig, name) {
                entry.node = best.node.clone();
                entry.match_length = best.end - orig;
                entry.trace = seed_trace;
            }
            let attempt = self.eval_rule_body(rule, orig);
            if attempt.node.is_none() || attempt.end <= best.end {
                break;
            }
            best = attempt;
        }
        self.pos = best.end;
        best
    }
}

fn apply_trace_node(
    name: &str,
    start: usize,
    end: usize,
    succeeded: bool,
    children: Vec<Rc<TraceNode>>,
) -> Rc<TraceNode> {
    Rc::new(TraceNode {
        kind: TraceKind::Apply(name.to_string()),
        display: name.to_string(),
        start,
        end,
        succeeded,
        children,
        memoized: false,
        implicit_spaces: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::grammar::types::RuleInfo;

    fn grammar(rules: Vec<(&str, PExpr)>) -> Grammar {
        let mut g = Grammar::new("G", None);
        for (name, body) in rules {
            g.define_rule(RuleInfo::new(name, body, "G"));
        }
        g
    }

    fn run(g: &Grammar, input: &str, start: &str) -> MatchResult {
        let mut memo = new_memo_table(input.len());
        MatchState::new(g, input, &mut memo, false)
            .run(start)
            .into_result(Rc::from(input), start)
    }

    #[test]
    fn test_left_recursion_grows_seed() {
        // exp = exp "+" num | num ; num = "0".."9"
        let g = grammar(vec![
            (
                "exp",
                PExpr::alt(vec![
                    PExpr::seq(vec![
                        PExpr::apply("exp"),
                        PExpr::terminal("+"),
                        PExpr::apply("num"),
                    ]),
                    PExpr::apply("num"),
                ]),
            ),
            ("num", PExpr::range('0', '9')),
        ]);
        let result = run(&g, "1+2+3", "exp");
        assert!(result.succeeded(), "{}", result.message());
        assert_eq!(result.match_length(), 5);

        // Left-associative: the outer exp holds a nested exp covering "1+2"
        let root = result.cst().unwrap();
        let inner = root.first("exp").unwrap();
        assert_eq!(inner.text(), "1+2");
    }

    #[test]
    fn test_failure_reports_rightmost_expected() {
        let g = grammar(vec![(
            "start",
            PExpr::seq(vec![PExpr::terminal("a"), PExpr::terminal("b")]),
        )]);
        let result = run(&g, "ac", "start");
        assert!(result.failed());
        assert_eq!(result.rightmost_failure_position(), Some(1));
        assert_eq!(result.short_message(), "Line 1, col 2: expected \"b\"");
    }

    #[test]
    fn test_examined_length_covers_end_checks() {
        let g = grammar(vec![("start", PExpr::star(PExpr::terminal("a")))]);
        let input = "aa";
        let mut memo = new_memo_table(input.len());
        let _ = MatchState::new(&g, input, &mut memo, false).run("start");
        let slot = memo[0].as_ref().unwrap();
        // The iteration looked one past the last character to see the end
        assert_eq!(slot.entries["start"].examined_length, 3);
    }

    /// start = "a" start | end
    fn right_recursive() -> Grammar {
        grammar(vec![(
            "start",
            PExpr::alt(vec![
                PExpr::seq(vec![PExpr::terminal("a"), PExpr::apply("start")]),
                PExpr::End,
            ]),
        )])
    }

    #[test]
    fn test_deep_right_recursion_matches_and_traces() {
        let g = right_recursive();
        let input = "a".repeat(10_000);

        let result = run(&g, &input, "start");
        assert!(result.succeeded(), "{}", result.message());
        assert_eq!(result.match_length(), 10_000);

        let mut memo = new_memo_table(input.len());
        let mut outcome = MatchState::new(&g, &input, &mut memo, true).run("start");
        assert!(!outcome.too_deep());
        let root = outcome.take_trace();
        assert!(root.succeeded);
        assert_eq!(root.end, 10_000);
    }

    #[test]
    fn test_depth_limit_abandons_the_match() {
        let g = right_recursive();

        let input = "a".repeat(50);
        let mut memo = new_memo_table(input.len());
        let mut state = MatchState::new(&g, &input, &mut memo, false);
        state.depth_limit = 100;
        let outcome = state.run("start");
        assert!(!outcome.too_deep());
        assert!(outcome.cst.is_some());

        let input = "a".repeat(200);
        let mut memo = new_memo_table(input.len());
        let mut state = MatchState::new(&g, &input, &mut memo, false);
        state.depth_limit = 100;
        let outcome = state.run("start");
        assert!(outcome.too_deep());
        assert!(outcome.cst.is_none());
    }

    #[test]
    fn test_clear_obsolete_entries_keeps_unaffected() {
        let g = grammar(vec![
            ("start", PExpr::seq(vec![PExpr::apply("a"), PExpr::apply("rest")])),
            ("a", PExpr::terminal("a")),
            ("rest", PExpr::star(PExpr::Any)),
        ]);
        let input = "abc";
        let mut memo = new_memo_table(input.len());
        let _ = MatchState::new(&g, input, &mut memo, false).run("start");
        let slot = memo[0].as_mut().unwrap();
        assert_eq!(slot.len(), 2);
        slot.clear_obsolete_entries(0, 2);
        assert!(slot.entries.contains_key("a"));
        assert!(!slot.entries.contains_key("start"));
    }
}
