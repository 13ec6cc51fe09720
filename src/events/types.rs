use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::DownloadId;

/// Severity/category of a download notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Info,
    Success,
    Error,
    Progress,
}

/// Broadcast to global observers on every download lifecycle transition.
#[derive(Debug, Clone)]
pub struct DownloadNotification {
    pub id: DownloadId,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub timestamp: DateTime<Utc>,
}

impl DownloadNotification {
    pub fn new(
        id: DownloadId,
        title: impl Into<String>,
        message: impl Into<String>,
        kind: NotificationKind,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            message: message.into(),
            kind,
            timestamp: Utc::now(),
        }
    }
}

/// Latest transfer progress for one download, delivered over its watch
/// channel. Values are non-decreasing until the download reaches a
/// terminal state.
#[derive(Debug, Clone, Default)]
pub struct ProgressUpdate {
    pub id: DownloadId,
    /// Overall progress, 0–100.
    pub progress: f64,
    pub rate_bps: u64,
    pub total_bytes: u64,
    pub downloaded_bytes: u64,
    pub eta_seconds: Option<u64>,
}
