//! Recovery sweepers and the periodic task scheduler (components C6/C7).
//!
//! `sweep` holds the five crash-recovery repairs the state machine itself
//! cannot perform (they take transitions that are deliberately illegal
//! for every other caller). `scheduler` drives those sweeps, and any other
//! named recurring job, on their own intervals.

pub mod error;
pub mod scheduler;
pub mod sweep;

pub use error::{RecoveryError, RecoveryResult};
pub use scheduler::{RecurringTask, TaskScheduler};
pub use sweep::{RecoveryConfig, RecoveryWorkers};
