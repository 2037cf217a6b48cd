//! `BuiltInRules`: the rules every grammar inherits.

use once_cell::sync::Lazy;

use super::pexpr::PExpr;
use super::types::{Grammar, RuleInfo};

pub const BUILT_IN_RULES: &str = "BuiltInRules";

static BUILT_IN: Lazy<Grammar> = Lazy::new(|| {
    let mut g = Grammar::new(BUILT_IN_RULES, None);
    let rules = [
        (
            "alnum",
            Some("an alpha-numeric character"),
            PExpr::alt(vec![PExpr::apply("letter"), PExpr::apply("digit")]),
        ),
        (
            "letter",
            Some("a letter"),
            PExpr::alt(vec![PExpr::apply("lower"), PExpr::apply("upper")]),
        ),
        ("digit", Some("a digit"), PExpr::range('0', '9')),
        (
            "hexDigit",
            Some("a hexadecimal digit"),
            PExpr::alt(vec![
                PExpr::apply("digit"),
                PExpr::range('a', 'f'),
                PExpr::range('A', 'F'),
            ]),
        ),
        ("lower", Some("a lowercase letter"), PExpr::range('a', 'z')),
        ("upper", Some("an uppercase letter"), PExpr::range('A', 'Z')),
        ("space", None, PExpr::range('\u{0}', ' ')),
        ("spaces", None, PExpr::star(PExpr::apply("space"))),
    ];
    for (name, description, body) in rules {
        let mut rule = RuleInfo::new(name, body, BUILT_IN_RULES);
        if let Some(description) = description {
            rule = rule.with_description(description);
        }
        g.define_rule(rule);
    }
    g
});

pub fn built_in_rules() -> &'static Grammar {
    &BUILT_IN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptions_replace_inner_failures() {
        let result = built_in_rules().match_input("x", Some("digit")).unwrap();
        assert!(result.failed());
        assert_eq!(result.short_message(), "Line 1, col 1: expected a digit");
    }

    #[test]
    fn test_spaces_accepts_control_characters() {
        let result = built_in_rules()
            .match_input(" \t\r\n", Some("spaces"))
            .unwrap();
        assert!(result.succeeded());
        assert!(built_in_rules().default_start_rule().is_none());
    }
}
