//! The Encoder Dispatcher (spec.md §4.4, component C5): wire protocol,
//! live connection table, and the scheduling/sweep logic that assigns
//! PENDING `EncoderAssignment`s to connected workers.

pub mod error;
pub mod protocol;
pub mod scheduler;
pub mod worker;
pub mod ws;

pub use error::{DispatcherError, DispatcherResult};
pub use protocol::Frame;
pub use scheduler::{Dispatcher, JobSettledHook, NoopHook, SchedulerConfig};
pub use worker::WorkerConnections;
