//! The grammar that grammar sources are matched against.

use once_cell::sync::Lazy;

use super::builtins::built_in_rules;
use super::pexpr::PExpr;
use super::types::{Grammar, RuleInfo};

pub const GRAMMAR_OF_GRAMMARS: &str = "Ohm";

fn t(s: &str) -> PExpr {
    PExpr::terminal(s)
}

fn a(name: &str) -> PExpr {
    PExpr::apply(name)
}

fn seq<const N: usize>(exprs: [PExpr; N]) -> PExpr {
    PExpr::seq(exprs.into())
}

fn alt<const N: usize>(exprs: [PExpr; N]) -> PExpr {
    PExpr::alt(exprs.into())
}

static META: Lazy<Grammar> = Lazy::new(|| {
    let mut g = Grammar::new(GRAMMAR_OF_GRAMMARS, Some(built_in_rules()));
    let not_newline_space = || PExpr::star(seq([PExpr::not(t("\n")), a("space")]));
    let rules = vec![
        ("Grammars", None, PExpr::star(a("Grammar"))),
        (
            "Grammar",
            None,
            seq([
                a("ident"),
                PExpr::opt(a("SuperGrammar")),
                t("{"),
                PExpr::star(a("Rule")),
                t("}"),
            ]),
        ),
        ("SuperGrammar", None, seq([t("<:"), a("ident")])),
        (
            "Rule",
            None,
            alt([a("Rule_define"), a("Rule_override"), a("Rule_extend")]),
        ),
        (
            "Rule_define",
            None,
            seq([a("ident"), PExpr::opt(a("RuleDescr")), t("="), a("RuleBody")]),
        ),
        ("Rule_override", None, seq([a("ident"), t(":="), a("RuleBody")])),
        ("Rule_extend", None, seq([a("ident"), t("+="), a("RuleBody")])),
        (
            "RuleDescr",
            Some("a rule description"),
            seq([t("("), a("ruleDescrText"), t(")")]),
        ),
        (
            "ruleDescrText",
            None,
            PExpr::star(seq([PExpr::not(t(")")), PExpr::Any])),
        ),
        (
            "RuleBody",
            None,
            seq([
                PExpr::opt(t("|")),
                a("TopLevelTerm"),
                PExpr::star(seq([t("|"), a("TopLevelTerm")])),
            ]),
        ),
        (
            "TopLevelTerm",
            None,
            alt([a("TopLevelTerm_inline"), a("Seq")]),
        ),
        ("TopLevelTerm_inline", None, seq([a("Seq"), a("caseName")])),
        (
            "Alt",
            None,
            seq([a("Seq"), PExpr::star(seq([t("|"), a("Seq")]))]),
        ),
        ("Seq", None, PExpr::plus(a("Iter"))),
        (
            "Iter",
            None,
            alt([a("Iter_star"), a("Iter_plus"), a("Iter_opt"), a("Pred")]),
        ),
        ("Iter_star", None, seq([a("Pred"), t("*")])),
        ("Iter_plus", None, seq([a("Pred"), t("+")])),
        ("Iter_opt", None, seq([a("Pred"), t("?")])),
        (
            "Pred",
            None,
            alt([a("Pred_not"), a("Pred_lookahead"), a("Lex")]),
        ),
        ("Pred_not", None, seq([t("~"), a("Lex")])),
        ("Pred_lookahead", None, seq([t("&"), a("Lex")])),
        ("Lex", None, alt([a("Lex_lex"), a("Base")])),
        ("Lex_lex", None, seq([t("#"), a("Base")])),
        (
            "Base",
            None,
            alt([
                a("Base_application"),
                a("Base_range"),
                a("Base_terminal"),
                a("Base_paren"),
            ]),
        ),
        (
            "Base_application",
            None,
            seq([
                a("ident"),
                PExpr::not(alt([
                    seq([PExpr::opt(a("RuleDescr")), t("=")]),
                    t(":="),
                    t("+="),
                ])),
            ]),
        ),
        (
            "Base_range",
            None,
            seq([a("oneCharTerminal"), t(".."), a("oneCharTerminal")]),
        ),
        ("Base_terminal", None, a("terminal")),
        ("Base_paren", None, seq([t("("), a("Alt"), t(")")])),
        (
            "caseName",
            None,
            seq([
                t("--"),
                not_newline_space(),
                a("name"),
                not_newline_space(),
                alt([t("\n"), PExpr::lookahead(t("}"))]),
            ]),
        ),
        ("ident", Some("an identifier"), a("name")),
        (
            "name",
            Some("a name"),
            seq([a("nameFirst"), PExpr::star(a("nameRest"))]),
        ),
        ("nameFirst", None, alt([t("_"), a("letter")])),
        ("nameRest", None, alt([t("_"), a("alnum")])),
        (
            "terminal",
            None,
            seq([t("\""), PExpr::star(a("terminalChar")), t("\"")]),
        ),
        (
            "oneCharTerminal",
            None,
            seq([t("\""), a("terminalChar"), t("\"")]),
        ),
        (
            "terminalChar",
            None,
            alt([
                a("escapeChar"),
                seq([
                    PExpr::not(t("\\")),
                    PExpr::not(t("\"")),
                    PExpr::not(t("\n")),
                    PExpr::Any,
                ]),
            ]),
        ),
        (
            "escapeChar",
            Some("an escape sequence"),
            alt([
                t("\\\\"),
                t("\\\""),
                t("\\'"),
                t("\\b"),
                t("\\n"),
                t("\\r"),
                t("\\t"),
                seq([
                    t("\\u"),
                    a("hexDigit"),
                    a("hexDigit"),
                    a("hexDigit"),
                    a("hexDigit"),
                ]),
                seq([t("\\x"), a("hexDigit"), a("hexDigit")]),
            ]),
        ),
        // space += comment
        (
            "space",
            None,
            alt([a("comment"), PExpr::range('\u{0}', ' ')]),
        ),
        (
            "comment",
            None,
            alt([a("comment_singleLine"), a("comment_multiLine")]),
        ),
        (
            "comment_singleLine",
            None,
            seq([
                t("//"),
                PExpr::star(seq([PExpr::not(t("\n")), PExpr::Any])),
                PExpr::lookahead(alt([t("\n"), PExpr::End])),
            ]),
        ),
        (
            "comment_multiLine",
            None,
            seq([
                t("/*"),
                PExpr::star(seq([PExpr::not(t("*/")), PExpr::Any])),
                t("*/"),
            ]),
        ),
    ];
    for (name, description, body) in rules {
        let mut rule = RuleInfo::new(name, body, GRAMMAR_OF_GRAMMARS);
        if let Some(description) = description {
            rule = rule.with_description(description);
        }
        g.define_rule(rule);
    }
    g.set_default_start_rule("Grammars");
    g
});

/// The grammar of grammar definitions.
pub fn grammar_of_grammars() -> &'static Grammar {
    &META
}
