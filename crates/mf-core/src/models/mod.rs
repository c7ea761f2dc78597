//! Domain models for the state store.
//!
//! Plain `serde`-derived structs with `as_str`/`from_str` helpers on their
//! enums, following the teacher's `Document`/`DocumentStatus` shape in
//! `foia/src/models/document.rs`. Database row <-> domain conversion lives
//! in `crate::repository`.

mod download;
mod encoder;
mod execution;
mod processing_item;
mod request;

pub use download::{Download, DownloadStatus};
pub use encoder::{
    EncoderAssignment, EncoderAssignmentStatus, EncoderWorker, WorkerCapabilities, WorkerStatus,
};
pub use execution::{ExecutionStatus, PipelineExecution, StepExecutionStatus, StepExecutionRow};
pub use processing_item::{ProcessingItem, ProcessingItemStatus, ProcessingItemType};
pub use request::{derive_request_status, RequestKind, RequestRow, RequestStatus};
