//! Services: persistence, time and logging.

pub mod storage;
pub mod time_source;
pub mod tracing_setup;
