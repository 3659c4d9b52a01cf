//! Event log: ordered change notifications and their consumption

pub mod consumer;
pub mod log;

pub use consumer::{ConsumeError, ConsumeSummary, EventConsumer};
pub use log::{EventLog, EventLogError};
