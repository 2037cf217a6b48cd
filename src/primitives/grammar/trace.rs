//! Execution traces: a record of every expression attempted while matching,
//! including the attempts that failed and were backtracked over.

use std::rc::Rc;

use serde_json::{json, Value};

use super::eval::with_stack;
use super::match_result::MatchResult;
use super::pexpr::PExpr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceKind {
    Root,
    Apply(String),
    Terminal,
    Range,
    Any,
    End,
    Alt,
    Seq,
    Iter,
    Not,
    Lookahead,
    Lex,
}

impl TraceKind {
    pub(crate) fn of(expr: &PExpr) -> Self {
        match expr {
            PExpr::Any => TraceKind::Any,
            PExpr::End => TraceKind::End,
            PExpr::Terminal(_) => TraceKind::Terminal,
            PExpr::Range(..) => TraceKind::Range,
            PExpr::Apply(name) => TraceKind::Apply(name.clone()),
            PExpr::Alt(_) => TraceKind::Alt,
            PExpr::Seq(_) => TraceKind::Seq,
            PExpr::Iter { .. } => TraceKind::Iter,
            PExpr::Not(_) => TraceKind::Not,
            PExpr::Lookahead(_) => TraceKind::Lookahead,
            PExpr::Lex(_) => TraceKind::Lex,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            TraceKind::Root => "root",
            TraceKind::Apply(_) => "apply",
            TraceKind::Terminal => "terminal",
            TraceKind::Range => "range",
            TraceKind::Any => "any",
            TraceKind::End => "end",
            TraceKind::Alt => "alt",
            TraceKind::Seq => "seq",
            TraceKind::Iter => "iter",
            TraceKind::Not => "not",
            TraceKind::Lookahead => "lookahead",
            TraceKind::Lex => "lex",
        }
    }
}

/// One attempted expression. A trace has a node per attempt, so deep inputs
/// produce deep trees; dropping one unlinks its descendants iteratively.
#[derive(Debug, Clone)]
pub struct TraceNode {
    pub kind: TraceKind,
    /// Source form of the expression, or the rule name for applications
    pub display: String,
    pub start: usize,
    /// End of the consumed input; equals `start` for failed attempts
    pub end: usize,
    pub succeeded: bool,
    pub children: Vec<Rc<TraceNode>>,
    /// The result came from the memo table rather than a fresh evaluation
    pub memoized: bool,
    /// Space skipping inserted implicitly by a syntactic rule
    pub implicit_spaces: bool,
}

impl TraceNode {
    pub fn rule_name(&self) -> Option<&str> {
        match &self.kind {
            TraceKind::Apply(name) => Some(name),
            _ => None,
        }
    }

    pub fn text<'s>(&self, input: &'s str) -> &'s str {
        input.get(self.start..self.end).unwrap_or("")
    }

    fn walk_inner<'a>(&'a self, depth: usize, f: &mut dyn FnMut(&'a TraceNode, usize)) {
        f(self, depth);
        for child in &self.children {
            with_stack(|| child.walk_inner(depth + 1, &mut *f));
        }
    }

    fn to_json(&self) -> Value {
        with_stack(|| self.to_json_inner())
    }

    fn to_json_inner(&self) -> Value {
        json!({
            "kind": self.kind.label(),
            "display": self.display,
            "start": self.start,
            "end": self.end,
            "succeeded": self.succeeded,
            "memoized": self.memoized,
            "implicit_spaces": self.implicit_spaces,
            "children": self.children.iter().map(|c| c.to_json()).collect::<Vec<_>>(),
        })
    }
}

impl Drop for TraceNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(child) = pending.pop() {
            if let Ok(mut node) = Rc::try_unwrap(child) {
                pending.append(&mut node.children);
            }
        }
    }
}

/// A successful rule application and the input span it matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSpan {
    pub rule: String,
    pub start: usize,
    pub end: usize,
}

/// The trace of matching an input from a start rule.
#[derive(Debug, Clone)]
pub struct Trace {
    result: Rc<MatchResult>,
    root: Rc<TraceNode>,
}

impl Trace {
    pub(crate) fn new(result: MatchResult, root: Rc<TraceNode>) -> Self {
        Self {
            result: Rc::new(result),
            root,
        }
    }

    pub fn result(&self) -> &MatchResult {
        &self.result
    }

    pub fn shared_result(&self) -> Rc<MatchResult> {
        Rc::clone(&self.result)
    }

    pub fn root(&self) -> &TraceNode {
        &self.root
    }

    pub fn input(&self) -> &str {
        self.result.input()
    }

    pub fn start_rule(&self) -> &str {
        self.result.start_rule()
    }

    /// Depth-first, pre-order walk over every node below the root.
    pub fn walk<'a>(&'a self, mut f: impl FnMut(&'a TraceNode, usize)) {
        for child in &self.root.children {
            child.walk_inner(0, &mut f);
        }
    }

    /// Successful rule applications, in pre-order. Implicit space skipping is
    /// left out.
    pub fn rule_spans(&self) -> Vec<RuleSpan> {
        fn collect(node: &TraceNode, spans: &mut Vec<RuleSpan>) {
            if node.implicit_spaces || !node.succeeded {
                return;
            }
            if let Some(rule) = node.rule_name() {
                spans.push(RuleSpan {
                    rule: rule.to_string(),
                    start: node.start,
                    end: node.end,
                });
            }
            for child in &node.children {
                with_stack(|| collect(child, spans));
            }
        }

        let mut spans = Vec::new();
        for child in &self.root.children {
            collect(child, &mut spans);
        }
        spans
    }

    /// Every attempt that failed.
    pub fn failures(&self) -> Vec<&TraceNode> {
        let mut failed = Vec::new();
        self.walk(|node, _| {
            if !node.succeeded {
                failed.push(node);
            }
        });
        failed
    }

    /// Indented text rendering. Failed attempts and implicit space skipping
    /// are hidden unless requested; a hidden node hides its subtree.
    pub fn render(&self, show_failures: bool, show_spaces: bool) -> String {
        let mut out = String::new();
        for child in &self.root.children {
            render_node(child, 0, show_failures, show_spaces, self.input(), &mut out);
        }
        out
    }

    pub fn to_json(&self) -> Value {
        json!({
            "start_rule": self.start_rule(),
            "succeeded": self.result.succeeded(),
            "root": self.root.to_json(),
        })
    }
}

fn render_node(
    node: &TraceNode,
    depth: usize,
    show_failures: bool,
    show_spaces: bool,
    input: &str,
    out: &mut String,
) {
    if (!node.succeeded && !show_failures) || (node.implicit_spaces && !show_spaces) {
        return;
    }
    out.push_str(&"  ".repeat(depth));
    out.push_str(&node.display);
    if node.succeeded {
        out.push_str(&format!(" {}..{} {:?}", node.start, node.end, node.text(input)));
    } else {
        out.push_str(&format!(" {} FAILED", node.start));
    }
    out.push('\n');
    for child in &node.children {
        with_stack(|| render_node(child, depth + 1, show_failures, show_spaces, input, out));
    }
}
