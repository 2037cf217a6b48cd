//! Low-level primitives: text edits and the grammar engine.

pub mod edit;
pub mod grammar;
