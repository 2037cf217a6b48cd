//! A PEG grammar engine with Ohm's grammar syntax.
//!
//! Grammar sources are matched against [`grammar_of_grammars`] and compiled by
//! [`build_grammars`]. Compiled grammars match input directly
//! ([`Grammar::match_input`], [`Grammar::trace`]) or through an incremental
//! [`Matcher`] that keeps its memo table across input edits.

mod build;
mod builtins;
mod cst;
mod eval;
mod failure;
mod interval;
mod match_result;
mod matcher;
mod meta;
mod pexpr;
mod trace;
mod types;

pub use build::{build_grammars, BuildError, Namespace};
pub use builtins::{built_in_rules, BUILT_IN_RULES};
pub use cst::{CstCursor, Node};
pub use eval::MAX_APPLICATION_DEPTH;
pub use failure::{Expected, Failure, FailureSet};
pub use interval::{excerpt, line_and_column, Interval, LineAndColumn};
pub use match_result::MatchResult;
pub use matcher::Matcher;
pub use meta::{grammar_of_grammars, GRAMMAR_OF_GRAMMARS};
pub use pexpr::{is_syntactic, quote, IterOp, PExpr};
pub use trace::{RuleSpan, Trace, TraceKind, TraceNode};
pub use types::{Grammar, MatchError, RuleInfo};
