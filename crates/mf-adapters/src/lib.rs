//! Concrete adapters for every port `mf-engine` declares: indexer
//! search, the download client, delivery targets, and outbound
//! notifications.

pub mod delivery;
pub mod download_client;
pub mod indexer;
pub mod notification;

pub use delivery::{DeliveryTargets, LocalFilesystemDeliveryAdapter};
pub use download_client::{season_pack, DownloadClientConfig, HttpDownloadClientAdapter};
pub use indexer::{HttpIndexerAdapter, IndexerConfig};
pub use notification::WebhookNotificationDispatcher;
