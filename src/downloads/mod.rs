pub mod hls;
mod record;
mod registry;
mod transfer;

pub use record::{DownloadRecord, DownloadStatus, derived_id, media_extension};
pub use registry::{DownloadRegistry, StorageSummary};
