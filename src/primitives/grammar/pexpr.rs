//! Parsing expressions.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IterOp {
    Star,
    Plus,
    Opt,
}

impl IterOp {
    pub fn symbol(self) -> char {
        match self {
            IterOp::Star => '*',
            IterOp::Plus => '+',
            IterOp::Opt => '?',
        }
    }
}

/// A parsing expression as it appears in a rule body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PExpr {
    /// `any`: a single character
    Any,
    /// `end`: end of input
    End,
    Terminal(String),
    /// `"a".."z"`, inclusive on both ends
    Range(char, char),
    Apply(String),
    Alt(Vec<PExpr>),
    Seq(Vec<PExpr>),
    Iter { expr: Box<PExpr>, op: IterOp },
    /// `~e`
    Not(Box<PExpr>),
    /// `&e`
    Lookahead(Box<PExpr>),
    /// `#e`: evaluate `e` in a lexical context
    Lex(Box<PExpr>),
}

impl PExpr {
    pub fn terminal(s: impl Into<String>) -> Self {
        PExpr::Terminal(s.into())
    }

    pub fn apply(name: impl Into<String>) -> Self {
        PExpr::Apply(name.into())
    }

    pub fn range(lo: char, hi: char) -> Self {
        PExpr::Range(lo, hi)
    }

    /// Sequence, collapsing the single-element case.
    pub fn seq(mut exprs: Vec<PExpr>) -> Self {
        if exprs.len() == 1 {
            exprs.remove(0)
        } else {
            PExpr::Seq(exprs)
        }
    }

    /// Alternation, collapsing the single-element case.
    pub fn alt(mut exprs: Vec<PExpr>) -> Self {
        if exprs.len() == 1 {
            exprs.remove(0)
        } else {
            PExpr::Alt(exprs)
        }
    }

    pub fn star(expr: PExpr) -> Self {
        PExpr::Iter {
            expr: Box::new(expr),
            op: IterOp::Star,
        }
    }

    pub fn plus(expr: PExpr) -> Self {
        PExpr::Iter {
            expr: Box::new(expr),
            op: IterOp::Plus,
        }
    }

    pub fn opt(expr: PExpr) -> Self {
        PExpr::Iter {
            expr: Box::new(expr),
            op: IterOp::Opt,
        }
    }

    pub fn not(expr: PExpr) -> Self {
        PExpr::Not(Box::new(expr))
    }

    pub fn lookahead(expr: PExpr) -> Self {
        PExpr::Lookahead(Box::new(expr))
    }

    pub fn lex(expr: PExpr) -> Self {
        PExpr::Lex(Box::new(expr))
    }

    /// Expressions that read input directly. In a syntactic context, spaces
    /// are skipped before each of these.
    pub fn consumes_input(&self) -> bool {
        matches!(
            self,
            PExpr::Any | PExpr::End | PExpr::Terminal(_) | PExpr::Range(..) | PExpr::Apply(_)
        )
    }

    /// Visit every rule application in this expression, together with whether
    /// it sits inside a `#` lexification.
    pub fn visit_applications<'a>(&'a self, in_lex: bool, f: &mut dyn FnMut(&'a str, bool)) {
        match self {
            PExpr::Apply(name) => f(name, in_lex),
            PExpr::Alt(exprs) | PExpr::Seq(exprs) => {
                for e in exprs {
                    e.visit_applications(in_lex, f);
                }
            }
            PExpr::Iter { expr, .. } | PExpr::Not(expr) | PExpr::Lookahead(expr) => {
                expr.visit_applications(in_lex, f)
            }
            PExpr::Lex(expr) => expr.visit_applications(true, f),
            PExpr::Any | PExpr::End | PExpr::Terminal(_) | PExpr::Range(..) => {}
        }
    }

    fn needs_parens_in_seq(&self) -> bool {
        matches!(self, PExpr::Alt(_))
    }

    fn needs_parens_as_operand(&self) -> bool {
        matches!(self, PExpr::Alt(_) | PExpr::Seq(_))
    }
}

/// Rule names starting with an uppercase letter are syntactic.
pub fn is_syntactic(rule_name: &str) -> bool {
    rule_name.chars().next().is_some_and(|c| c.is_uppercase())
}

/// Quote a terminal the way it would be written in a grammar.
pub fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{s}\""))
}

impl fmt::Display for PExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PExpr::Any => write!(f, "any"),
            PExpr::End => write!(f, "end"),
            PExpr::Terminal(s) => write!(f, "{}", quote(s)),
            PExpr::Range(lo, hi) => {
                write!(f, "{}..{}", quote(&lo.to_string()), quote(&hi.to_string()))
            }
            PExpr::Apply(name) => write!(f, "{name}"),
            PExpr::Alt(exprs) => {
                for (i, e) in exprs.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{e}")?;
                }
                Ok(())
            }
            PExpr::Seq(exprs) => {
                for (i, e) in exprs.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    if e.needs_parens_in_seq() {
                        write!(f, "({e})")?;
                    } else {
                        write!(f, "{e}")?;
                    }
                }
                Ok(())
            }
            PExpr::Iter { expr, op } => {
                if expr.needs_parens_as_operand() {
                    write!(f, "({expr}){}", op.symbol())
                } else {
                    write!(f, "{expr}{}", op.symbol())
                }
            }
            PExpr::Not(expr) | PExpr::Lookahead(expr) | PExpr::Lex(expr) => {
                let prefix = match self {
                    PExpr::Not(_) => '~',
                    PExpr::Lookahead(_) => '&',
                    _ => '#',
                };
                if expr.needs_parens_as_operand() {
                    write!(f, "{prefix}({expr})")
                } else {
                    write!(f, "{prefix}{expr}")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_grammar_syntax() {
        let e = PExpr::seq(vec![
            PExpr::apply("Exp"),
            PExpr::star(PExpr::seq(vec![PExpr::terminal("+"), PExpr::apply("Term")])),
            PExpr::not(PExpr::alt(vec![PExpr::terminal("a"), PExpr::End])),
            PExpr::range('0', '9'),
        ]);
        assert_eq!(e.to_string(), r#"Exp ("+" Term)* ~("a" | end) "0".."9""#);
    }

    #[test]
    fn test_terminal_escapes() {
        assert_eq!(PExpr::terminal("a\"\n").to_string(), r#""a\"\n""#);
    }

    #[test]
    fn test_single_element_collapse() {
        assert_eq!(PExpr::seq(vec![PExpr::Any]), PExpr::Any);
        assert_eq!(PExpr::alt(vec![PExpr::End]), PExpr::End);
    }

    #[test]
    fn test_visit_applications_tracks_lexification() {
        let e = PExpr::seq(vec![PExpr::apply("A"), PExpr::lex(PExpr::apply("B"))]);
        let mut seen = Vec::new();
        e.visit_applications(false, &mut |name, lex| seen.push((name.to_string(), lex)));
        assert_eq!(
            seen,
            vec![("A".to_string(), false), ("B".to_string(), true)]
        );
    }

    #[test]
    fn test_is_syntactic() {
        assert!(is_syntactic("Exp"));
        assert!(!is_syntactic("number"));
        assert!(!is_syntactic("_x"));
    }
}
