//! Built-in step handlers, one per step kind (spec.md §4.1). Each handler
//! is a thin, idempotent wrapper around a port in [`crate::ports`] plus
//! `mf-core`'s repositories — the heavier external logic (indexer
//! protocol, torrent client, storage transport) lives in `mf-adapters`.

mod approval;
mod deliver;
mod download;
mod encode;
mod notification;
mod search;

pub use approval::ApprovalHandler;
pub use deliver::DeliverHandler;
pub use download::DownloadHandler;
pub use encode::EncodeHandler;
pub use notification::NotificationHandler;
pub use search::SearchHandler;
