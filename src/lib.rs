//! Offline content download manager for media clients.
//!
//! Turns a streamed video reference (a direct file URL or an HLS playlist)
//! into a durable, locally stored asset: a persistent registry of download
//! records, a playlist resolver with a tolerant manual parser, a
//! sequential segment pipeline with byte-level combination, and typed
//! progress/notification channels for observers.
//!
//! Persistence and file access are injected ([`store::KeyValueStore`],
//! [`fs::FileSystem`]), so the manager runs unchanged over any durable
//! string store and any disk layout the host application provides.

pub mod config;
pub mod constants;
pub mod downloads;
pub mod errors;
pub mod events;
pub mod fs;
pub mod models;
pub mod store;

pub use config::DownloadConfig;
pub use downloads::{
    DownloadRecord, DownloadRegistry, DownloadStatus, StorageSummary, derived_id,
};
pub use errors::DownloadError;
pub use events::{DownloadNotification, NotificationKind, NotificationSubscriber, ProgressUpdate};
pub use models::{ContentKind, ContentMetadata, DownloadId, QualityTier};
