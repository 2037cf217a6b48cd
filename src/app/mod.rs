//! Application layer: the refresh pipeline and the workbench owning it.

pub mod context;
pub mod grammar_builder;
pub mod incremental;
pub mod scheduler;
pub mod trace_executor;

pub use context::Workbench;
pub use grammar_builder::GrammarError;
pub use scheduler::{CycleReport, RefreshStats};
