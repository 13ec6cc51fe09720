use thiserror::Error;

/// Errors surfaced by the download manager.
///
/// Every variant carries a human-readable message so consuming surfaces can
/// render it directly instead of mapping opaque codes.
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Download already in progress: {0}")]
    AlreadyDownloading(String),

    #[error("Download already completed: {0}")]
    AlreadyCompleted(String),

    #[error("Download not found: {0}")]
    DownloadNotFound(String),

    #[error("Download is not paused: {0}")]
    NotPaused(String),

    #[error("Operation not valid in current state: {0}")]
    InvalidState(String),

    #[error("Playlist parse error: {0}")]
    PlaylistParse(String),

    #[error("Segment transfer error: {0}")]
    SegmentTransfer(String),

    #[error("Combine error: {0}")]
    Combine(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DownloadError {
    /// Stable identifier for the error kind, independent of the message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AlreadyDownloading(_) => "already_downloading",
            Self::AlreadyCompleted(_) => "already_completed",
            Self::DownloadNotFound(_) => "download_not_found",
            Self::NotPaused(_) => "not_paused",
            Self::InvalidState(_) => "invalid_state",
            Self::PlaylistParse(_) => "playlist_parse",
            Self::SegmentTransfer(_) => "segment_transfer",
            Self::Combine(_) => "combine",
            Self::Storage(_) => "storage",
            Self::Network(_) => "network",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
        }
    }
}

impl From<anyhow::Error> for DownloadError {
    fn from(err: anyhow::Error) -> Self {
        Self::Storage(format!("{err:#}"))
    }
}
