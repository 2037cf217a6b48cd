use crate::primitives::grammar::{Grammar, MatchError, Trace};

/// The start rule to trace from: the selection if the grammar declares it,
/// else the grammar's default start rule.
pub fn resolve_start_rule<'g>(grammar: &'g Grammar, selection: Option<&str>) -> Option<&'g str> {
    if let Some(rule) = selection.and_then(|name| grammar.rule(name)) {
        return Some(rule.name.as_str());
    }
    grammar.default_start_rule()
}

pub fn execute(grammar: &Grammar, start_rule: &str, input: &str) -> Result<Trace, MatchError> {
    tracing::debug!(
        "Tracing {} bytes of input from {}.{}",
        input.len(),
        grammar.name(),
        start_rule
    );
    grammar.trace(input, Some(start_rule))
}
