//! Turning a parsed grammar source into compiled [`Grammar`]s.

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use super::builtins::built_in_rules;
use super::cst::CstCursor;
use super::interval::Interval;
use super::match_result::MatchResult;
use super::pexpr::{is_syntactic, PExpr};
use super::types::{Grammar, RuleInfo};

/// A semantic error in an otherwise well-formed grammar source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildError {
    pub message: String,
    pub interval: Interval,
}

impl BuildError {
    fn new(message: impl Into<String>, interval: Interval) -> Self {
        Self {
            message: message.into(),
            interval,
        }
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for BuildError {}

/// Grammars built from one source, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    grammars: Vec<Rc<Grammar>>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Rc<Grammar>> {
        self.grammars.iter().find(|g| g.name() == name)
    }

    /// The first grammar declared in the source.
    pub fn first(&self) -> Option<&Rc<Grammar>> {
        self.grammars.first()
    }

    pub fn names(&self) -> Vec<&str> {
        self.grammars.iter().map(|g| g.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<Grammar>> {
        self.grammars.iter()
    }

    pub fn len(&self) -> usize {
        self.grammars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grammars.is_empty()
    }
}

/// Build every grammar in a successful match of the grammar-of-grammars.
pub fn build_grammars(result: &MatchResult) -> Result<Namespace, BuildError> {
    let root = result
        .cst()
        .ok_or_else(|| BuildError::new("Cannot build grammars from a failed match", result.interval()))?;
    let mut namespace = Namespace::new();
    for grammar in root.named("Grammar") {
        let built = GrammarBuilder::new(&namespace).build(grammar)?;
        namespace.grammars.push(Rc::new(built));
    }
    Ok(namespace)
}

struct Application {
    rule: String,
    interval: Interval,
    lexical: bool,
}

struct GrammarBuilder<'n> {
    namespace: &'n Namespace,
    grammar: Grammar,
    declared_here: HashSet<String>,
    applications: Vec<Application>,
    /// Inline case rules of the rule being built
    pending_cases: Vec<RuleInfo>,
}

fn child<'a>(cursor: &CstCursor<'a>, name: &str) -> Result<CstCursor<'a>, BuildError> {
    cursor.first(name).ok_or_else(|| {
        BuildError::new(
            format!("Malformed grammar syntax tree: missing {name}"),
            cursor.interval(),
        )
    })
}

fn only_child<'a>(cursor: &CstCursor<'a>) -> Result<(CstCursor<'a>, &'a str), BuildError> {
    cursor
        .only_child()
        .and_then(|c| c.rule_name().map(|name| (c, name)))
        .ok_or_else(|| BuildError::new("Malformed grammar syntax tree", cursor.interval()))
}

impl<'n> GrammarBuilder<'n> {
    fn new(namespace: &'n Namespace) -> Self {
        Self {
            namespace,
            grammar: Grammar::new("", None),
            declared_here: HashSet::new(),
            applications: Vec::new(),
            pending_cases: Vec::new(),
        }
    }

    fn build(mut self, node: CstCursor<'_>) -> Result<Grammar, BuildError> {
        let namespace = self.namespace;
        let ident = child(&node, "ident")?;
        let name = ident.text();
        if namespace.get(name).is_some() {
            return Err(BuildError::new(
                format!("Grammar {name} is already declared in this namespace"),
                ident.interval(),
            ));
        }

        let super_grammar = match node.first("SuperGrammar") {
            Some(decl) => {
                let super_ident = child(&decl, "ident")?;
                let super_name = super_ident.text();
                let grammar = namespace.get(super_name).ok_or_else(|| {
                    BuildError::new(
                        format!("Grammar {super_name} is not declared"),
                        super_ident.interval(),
                    )
                })?;
                grammar.as_ref()
            }
            None => built_in_rules(),
        };
        self.grammar = Grammar::new(name, Some(super_grammar));
        let mut has_own_start = false;

        for rule in node.named("Rule") {
            let (case, kind) = only_child(&rule)?;
            let rule_ident = child(&case, "ident")?;
            let rule_name = rule_ident.text();
            let body = child(&case, "RuleBody")?;
            match kind {
                "Rule_define" => {
                    self.check_not_declared(rule_name, rule_ident.interval())?;
                    let description = case
                        .first("RuleDescr")
                        .and_then(|d| d.first("ruleDescrText"))
                        .map(|text| text.text().trim().to_string());
                    let body = self.build_rule_body(&body, rule_name)?;
                    let mut info = RuleInfo::new(rule_name, body, name).with_source(case.interval());
                    info.description = description;
                    self.define(info);
                    if !has_own_start {
                        self.grammar.set_default_start_rule(rule_name);
                        has_own_start = true;
                    }
                }
                "Rule_override" | "Rule_extend" => {
                    let verb = if kind == "Rule_override" { "override" } else { "extend" };
                    let inherited = match self.grammar.rule(rule_name) {
                        Some(rule) if !self.declared_here.contains(rule_name) => rule.clone(),
                        _ => {
                            return Err(BuildError::new(
                                format!(
                                    "Cannot {verb} rule {rule_name} because it is not declared in {}",
                                    super_grammar.name()
                                ),
                                rule_ident.interval(),
                            ))
                        }
                    };
                    let new_body = self.build_rule_body(&body, rule_name)?;
                    let body = if kind == "Rule_extend" {
                        PExpr::alt(vec![new_body, inherited.body])
                    } else {
                        new_body
                    };
                    let mut info = RuleInfo::new(rule_name, body, name).with_source(case.interval());
                    info.description = inherited.description;
                    self.define(info);
                }
                other => {
                    return Err(BuildError::new(
                        format!("Malformed grammar syntax tree: unexpected {other}"),
                        case.interval(),
                    ))
                }
            }
        }

        self.check_applications()?;
        Ok(self.grammar)
    }

    fn check_not_declared(&self, rule: &str, interval: Interval) -> Result<(), BuildError> {
        if self.declared_here.contains(rule) {
            return Err(BuildError::new(
                format!(
                    "Duplicate declaration for rule '{rule}' in grammar '{}'",
                    self.grammar.name()
                ),
                interval,
            ));
        }
        if let Some(existing) = self.grammar.rule(rule) {
            return Err(BuildError::new(
                format!(
                    "Duplicate declaration for rule '{rule}' in grammar '{}' (originally declared in '{}')",
                    self.grammar.name(),
                    existing.declared_in
                ),
                interval,
            ));
        }
        Ok(())
    }

    /// Define a rule followed by the inline case rules collected for it.
    fn define(&mut self, rule: RuleInfo) {
        self.declared_here.insert(rule.name.clone());
        self.grammar.define_rule(rule);
        for case in std::mem::take(&mut self.pending_cases) {
            self.grammar.define_rule(case);
        }
    }

    fn check_applications(&self) -> Result<(), BuildError> {
        for app in &self.applications {
            if !self.grammar.has_rule(&app.rule) {
                return Err(BuildError::new(
                    format!(
                        "Rule {} is not declared in grammar {}",
                        app.rule,
                        self.grammar.name()
                    ),
                    app.interval,
                ));
            }
            if app.lexical && is_syntactic(&app.rule) {
                return Err(BuildError::new(
                    format!(
                        "Cannot apply syntactic rule {} from here (inside a lexical context)",
                        app.rule
                    ),
                    app.interval,
                ));
            }
        }
        Ok(())
    }

    fn build_rule_body(&mut self, body: &CstCursor<'_>, rule: &str) -> Result<PExpr, BuildError> {
        let lexical = !is_syntactic(rule);
        let mut terms = Vec::new();
        for term in body.named("TopLevelTerm") {
            let (inner, kind) = only_child(&term)?;
            let expr = match kind {
                "TopLevelTerm_inline" => {
                    let seq = self.build_seq(&child(&inner, "Seq")?, lexical)?;
                    let case = child(&child(&inner, "caseName")?, "name")?;
                    let case_rule = format!("{rule}_{}", case.text());
                    if self.pending_cases.iter().any(|c| c.name == case_rule) {
                        return Err(BuildError::new(
                            format!(
                                "Duplicate declaration for rule '{case_rule}' in grammar '{}'",
                                self.grammar.name()
                            ),
                            case.interval(),
                        ));
                    }
                    self.check_not_declared(&case_rule, case.interval())?;
                    self.pending_cases.push(
                        RuleInfo::new(&case_rule, seq, self.grammar.name())
                            .with_source(inner.interval()),
                    );
                    PExpr::apply(case_rule)
                }
                _ => self.build_seq(&inner, lexical)?,
            };
            terms.push(expr);
        }
        Ok(PExpr::alt(terms))
    }

    fn build_alt(&mut self, node: &CstCursor<'_>, lexical: bool) -> Result<PExpr, BuildError> {
        let seqs = node
            .named("Seq")
            .iter()
            .map(|seq| self.build_seq(seq, lexical))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PExpr::alt(seqs))
    }

    fn build_seq(&mut self, node: &CstCursor<'_>, lexical: bool) -> Result<PExpr, BuildError> {
        let iters = node
            .named("Iter")
            .iter()
            .map(|iter| self.build_iter(iter, lexical))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PExpr::seq(iters))
    }

    fn build_iter(&mut self, node: &CstCursor<'_>, lexical: bool) -> Result<PExpr, BuildError> {
        let (inner, kind) = only_child(node)?;
        Ok(match kind {
            "Iter_star" => PExpr::star(self.build_pred(&child(&inner, "Pred")?, lexical)?),
            "Iter_plus" => PExpr::plus(self.build_pred(&child(&inner, "Pred")?, lexical)?),
            "Iter_opt" => PExpr::opt(self.build_pred(&child(&inner, "Pred")?, lexical)?),
            _ => self.build_pred(&inner, lexical)?,
        })
    }

    fn build_pred(&mut self, node: &CstCursor<'_>, lexical: bool) -> Result<PExpr, BuildError> {
        let (inner, kind) = only_child(node)?;
        Ok(match kind {
            "Pred_not" => PExpr::not(self.build_lex(&child(&inner, "Lex")?, lexical)?),
            "Pred_lookahead" => PExpr::lookahead(self.build_lex(&child(&inner, "Lex")?, lexical)?),
            _ => self.build_lex(&inner, lexical)?,
        })
    }

    fn build_lex(&mut self, node: &CstCursor<'_>, lexical: bool) -> Result<PExpr, BuildError> {
        let (inner, kind) = only_child(node)?;
        Ok(match kind {
            "Lex_lex" => PExpr::lex(self.build_base(&child(&inner, "Base")?, true)?),
            _ => self.build_base(&inner, lexical)?,
        })
    }

    fn build_base(&mut self, node: &CstCursor<'_>, lexical: bool) -> Result<PExpr, BuildError> {
        let (inner, kind) = only_child(node)?;
        match kind {
            "Base_application" => {
                let ident = child(&inner, "ident")?;
                Ok(match ident.text() {
                    "any" => PExpr::Any,
                    "end" => PExpr::End,
                    name => {
                        self.applications.push(Application {
                            rule: name.to_string(),
                            interval: ident.interval(),
                            lexical,
                        });
                        PExpr::apply(name)
                    }
                })
            }
            "Base_range" => {
                let ends = inner.named("oneCharTerminal");
                let [lo, hi] = ends.as_slice() else {
                    return Err(BuildError::new("Malformed range", inner.interval()));
                };
                match (single_char(lo), single_char(hi)) {
                    (Some(lo), Some(hi)) => Ok(PExpr::range(lo, hi)),
                    _ => Err(BuildError::new("Malformed range", inner.interval())),
                }
            }
            "Base_terminal" => Ok(PExpr::terminal(unquote(child(&inner, "terminal")?.text()))),
            "Base_paren" => self.build_alt(&child(&inner, "Alt")?, lexical),
            other => Err(BuildError::new(
                format!("Malformed grammar syntax tree: unexpected {other}"),
                inner.interval(),
            )),
        }
    }
}

fn single_char(terminal: &CstCursor<'_>) -> Option<char> {
    unquote(terminal.text()).chars().next()
}

/// Strip the surrounding quotes of a terminal and resolve its escapes.
fn unquote(raw: &str) -> String {
    let inner = raw
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(raw);
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('b') => out.push('\u{8}'),
            Some('u') => push_code_point(&mut out, &mut chars, 4),
            Some('x') => push_code_point(&mut out, &mut chars, 2),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

fn push_code_point(out: &mut String, chars: &mut std::str::Chars<'_>, digits: usize) {
    let hex: String = chars.by_ref().take(digits).collect();
    if let Some(c) = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
        out.push(c);
    }
}
