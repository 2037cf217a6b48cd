//! Core data model: documents, options and the event buses.

pub mod bus;
pub mod document;
pub mod events;
pub mod options;
