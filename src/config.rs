use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::constants::{SCRATCH_DIR_NAME, THUMBNAIL_DIR_NAME};
use crate::models::DownloadId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Directory to store downloaded files
    pub download_directory: Option<PathBuf>,

    /// Write buffer size for streamed transfers in kilobytes
    pub chunk_size_kb: u32,

    /// Transfer timeout in seconds (per HTTP request)
    pub download_timeout_secs: u64,

    /// Minimum interval between progress updates in milliseconds
    pub progress_interval_ms: u64,

    /// Number of downloads allowed to transfer at the same time
    pub max_concurrent_downloads: u32,

    /// Capacity of the notification broadcast channel
    pub notification_buffer: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_directory: None, // Will be set to platform-specific default
            chunk_size_kb: 1024,
            download_timeout_secs: 300, // 5 minutes
            progress_interval_ms: 500,
            max_concurrent_downloads: 3,
            notification_buffer: 64,
        }
    }
}

impl DownloadConfig {
    /// Get the download directory path, using platform-specific defaults if not set
    pub fn download_directory(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.download_directory {
            return Ok(dir.clone());
        }

        let base = dirs::video_dir()
            .or_else(dirs::download_dir)
            .or_else(dirs::data_local_dir)
            .ok_or_else(|| anyhow!("Could not determine a downloads directory"))?;

        Ok(base.join("downpour"))
    }

    /// Scratch directory holding segment files for one HLS download
    pub fn scratch_directory(&self, id: &DownloadId) -> Result<PathBuf> {
        Ok(self
            .download_directory()?
            .join(SCRATCH_DIR_NAME)
            .join(id.as_str()))
    }

    /// Directory holding fetched thumbnails
    pub fn thumbnail_directory(&self) -> Result<PathBuf> {
        Ok(self.download_directory()?.join(THUMBNAIL_DIR_NAME))
    }
}
