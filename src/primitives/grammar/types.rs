//! Compiled grammars and their rule tables.

use std::collections::HashMap;
use std::rc::Rc;

use super::eval::{new_memo_table, MatchState, MAX_APPLICATION_DEPTH};
use super::interval::Interval;
use super::match_result::MatchResult;
use super::pexpr::PExpr;
use super::trace::Trace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleInfo {
    pub name: String,
    pub body: PExpr,
    /// Human-readable description used in failure messages
    pub description: Option<String>,
    /// Where the rule was declared in the grammar source
    pub source: Option<Interval>,
    /// Grammar that declared (or last overrode or extended) the rule
    pub declared_in: String,
}

impl RuleInfo {
    pub fn new(name: impl Into<String>, body: PExpr, declared_in: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body,
            description: None,
            source: None,
            declared_in: declared_in.into(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_source(mut self, source: Interval) -> Self {
        self.source = Some(source);
        self
    }
}

/// Errors for match requests that cannot run at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
    UnknownRule { grammar: String, rule: String },
    NoStartRule { grammar: String },
    /// Rule applications nested deeper than the evaluator allows
    TooDeep { grammar: String, rule: String },
}

impl std::fmt::Display for MatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchError::UnknownRule { grammar, rule } => {
                write!(f, "Rule '{rule}' is not declared in grammar '{grammar}'")
            }
            MatchError::NoStartRule { grammar } => write!(
                f,
                "Missing start rule argument: grammar '{grammar}' has no default start rule"
            ),
            MatchError::TooDeep { grammar, rule } => write!(
                f,
                "Matching '{rule}' in grammar '{grammar}' nested more than {MAX_APPLICATION_DEPTH} rule applications"
            ),
        }
    }
}

impl std::error::Error for MatchError {}

/// A compiled grammar. Inherited rules are copied into the table, so lookups
/// never walk a super-grammar chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grammar {
    name: String,
    super_grammar: Option<String>,
    rules: Vec<RuleInfo>,
    index: HashMap<String, usize>,
    default_start_rule: Option<String>,
}

impl Grammar {
    pub fn new(name: impl Into<String>, super_grammar: Option<&Grammar>) -> Self {
        let mut grammar = Self {
            name: name.into(),
            super_grammar: super_grammar.map(|g| g.name.clone()),
            rules: Vec::new(),
            index: HashMap::new(),
            default_start_rule: super_grammar.and_then(|g| g.default_start_rule.clone()),
        };
        if let Some(parent) = super_grammar {
            for rule in &parent.rules {
                grammar.define_rule(rule.clone());
            }
        }
        grammar
    }

    /// Insert a rule, replacing (in place) any rule with the same name.
    pub fn define_rule(&mut self, rule: RuleInfo) {
        match self.index.get(&rule.name) {
            Some(&i) => self.rules[i] = rule,
            None => {
                self.index.insert(rule.name.clone(), self.rules.len());
                self.rules.push(rule);
            }
        }
    }

    pub fn set_default_start_rule(&mut self, rule: impl Into<String>) {
        self.default_start_rule = Some(rule.into());
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn super_grammar(&self) -> Option<&str> {
        self.super_grammar.as_deref()
    }

    pub fn rule(&self, name: &str) -> Option<&RuleInfo> {
        self.index.get(name).map(|&i| &self.rules[i])
    }

    pub fn has_rule(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All rules, inherited ones first, in declaration order.
    pub fn rules(&self) -> impl Iterator<Item = &RuleInfo> {
        self.rules.iter()
    }

    /// Rules declared, overridden or extended by this grammar itself.
    pub fn own_rules(&self) -> impl Iterator<Item = &RuleInfo> {
        self.rules.iter().filter(move |r| r.declared_in == self.name)
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn default_start_rule(&self) -> Option<&str> {
        self.default_start_rule.as_deref()
    }

    fn resolve_rule(&self, start_rule: Option<&str>) -> Result<&RuleInfo, MatchError> {
        let name = start_rule
            .or(self.default_start_rule())
            .ok_or_else(|| MatchError::NoStartRule {
                grammar: self.name.clone(),
            })?;
        self.rule(name).ok_or_else(|| MatchError::UnknownRule {
            grammar: self.name.clone(),
            rule: name.to_string(),
        })
    }

    pub(crate) fn too_deep(&self, rule: &str) -> MatchError {
        MatchError::TooDeep {
            grammar: self.name.clone(),
            rule: rule.to_string(),
        }
    }

    /// Match `input` from `start_rule` (or the default start rule). The whole
    /// input must be consumed.
    pub fn match_input(
        &self,
        input: &str,
        start_rule: Option<&str>,
    ) -> Result<MatchResult, MatchError> {
        let rule = self.resolve_rule(start_rule)?;
        let mut memo = new_memo_table(input.len());
        let outcome = MatchState::new(self, input, &mut memo, false).run(&rule.name);
        if outcome.too_deep() {
            return Err(self.too_deep(&rule.name));
        }
        Ok(outcome.into_result(Rc::from(input), &rule.name))
    }

    /// Like [`Grammar::match_input`], also recording every attempted expression.
    pub fn trace(&self, input: &str, start_rule: Option<&str>) -> Result<Trace, MatchError> {
        let rule = self.resolve_rule(start_rule)?;
        let mut memo = new_memo_table(input.len());
        let mut outcome = MatchState::new(self, input, &mut memo, true).run(&rule.name);
        if outcome.too_deep() {
            return Err(self.too_deep(&rule.name));
        }
        let root = outcome.take_trace();
        Ok(Trace::new(outcome.into_result(Rc::from(input), &rule.name), root))
    }
}
