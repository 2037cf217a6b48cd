//! Concrete syntax tree produced by a successful match.
//!
//! Nodes do not know their absolute position: each node stores its match
//! length and the offsets of its children relative to its own start. This lets
//! memoized subtrees survive edits that shift them around in the input.
//! [`CstCursor`] pairs a node with an absolute offset for navigation.

use std::mem;
use std::rc::Rc;

use super::eval::with_stack;
use super::interval::Interval;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Text consumed by a terminal, a range, or `any`
    Terminal { len: usize },
    /// A rule application
    Nonterminal {
        rule: String,
        children: Vec<Rc<Node>>,
        offsets: Vec<usize>,
        len: usize,
    },
    /// The repetitions of `*`, `+` or `?`, flattened
    Iter {
        children: Vec<Rc<Node>>,
        offsets: Vec<usize>,
        len: usize,
        optional: bool,
    },
}

impl Node {
    pub fn match_length(&self) -> usize {
        match self {
            Node::Terminal { len }
            | Node::Nonterminal { len, .. }
            | Node::Iter { len, .. } => *len,
        }
    }

    pub fn rule_name(&self) -> Option<&str> {
        match self {
            Node::Nonterminal { rule, .. } => Some(rule),
            _ => None,
        }
    }

    fn children_with_offsets(&self) -> (&[Rc<Node>], &[usize]) {
        match self {
            Node::Terminal { .. } => (&[], &[]),
            Node::Nonterminal {
                children, offsets, ..
            }
            | Node::Iter {
                children, offsets, ..
            } => (children, offsets),
        }
    }

    /// Number of nodes in this subtree.
    pub fn size(&self) -> usize {
        with_stack(|| {
            1 + self
                .children_with_offsets()
                .0
                .iter()
                .map(|c| c.size())
                .sum::<usize>()
        })
    }

    fn take_children(&mut self) -> Vec<Rc<Node>> {
        match self {
            Node::Terminal { .. } => Vec::new(),
            Node::Nonterminal { children, .. } | Node::Iter { children, .. } => {
                mem::take(children)
            }
        }
    }
}

// Deep right-recursive matches nest one node per repetition; unlink them
// iteratively.
impl Drop for Node {
    fn drop(&mut self) {
        let mut pending = self.take_children();
        while let Some(child) = pending.pop() {
            if let Ok(mut node) = Rc::try_unwrap(child) {
                pending.append(&mut node.take_children());
            }
        }
    }
}

/// A node positioned in its source text.
#[derive(Debug, Clone, Copy)]
pub struct CstCursor<'a> {
    node: &'a Rc<Node>,
    offset: usize,
    source: &'a str,
}

impl<'a> CstCursor<'a> {
    pub fn new(node: &'a Rc<Node>, offset: usize, source: &'a str) -> Self {
        Self {
            node,
            offset,
            source,
        }
    }

    pub fn node(&self) -> &'a Rc<Node> {
        self.node
    }

    pub fn rule_name(&self) -> Option<&'a str> {
        self.node.rule_name()
    }

    pub fn interval(&self) -> Interval {
        Interval::new(self.offset, self.offset + self.node.match_length())
    }

    pub fn text(&self) -> &'a str {
        self.interval().contents(self.source)
    }

    pub fn children(&self) -> Vec<CstCursor<'a>> {
        let (children, offsets) = self.node.children_with_offsets();
        children
            .iter()
            .zip(offsets)
            .map(|(child, rel)| CstCursor::new(child, self.offset + rel, self.source))
            .collect()
    }

    /// Rule-application children, looking through iteration nodes.
    pub fn nonterminals(&self) -> Vec<CstCursor<'a>> {
        let mut out = Vec::new();
        for child in self.children() {
            match child.node.as_ref() {
                Node::Nonterminal { .. } => out.push(child),
                Node::Iter { .. } => out.extend(with_stack(|| child.nonterminals())),
                Node::Terminal { .. } => {}
            }
        }
        out
    }

    /// Child applications of rule `name`.
    pub fn named(&self, name: &str) -> Vec<CstCursor<'a>> {
        self.nonterminals()
            .into_iter()
            .filter(|c| c.rule_name() == Some(name))
            .collect()
    }

    pub fn first(&self, name: &str) -> Option<CstCursor<'a>> {
        self.nonterminals()
            .into_iter()
            .find(|c| c.rule_name() == Some(name))
    }

    /// The single rule-application child, for rules that are a plain choice
    /// between case rules.
    pub fn only_child(&self) -> Option<CstCursor<'a>> {
        let mut nts = self.nonterminals();
        if nts.len() == 1 {
            nts.pop()
        } else {
            None
        }
    }
}
