use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::{ContentKind, ContentMetadata, DownloadId, QualityTier};

/// Lifecycle state of a download record.
///
/// `pending → downloading → {completed, failed, cancelled}`, with
/// `downloading ↔ paused` and explicit cancel from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Pending,
    Downloading,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Terminal states never transition again for the same record.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// A transfer task exists (or is about to) for this record.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Downloading | Self::Paused)
    }
}

/// Compute the deterministic download id for a piece of content.
///
/// Movies key as `movie_{id}`; episodes key under their show as
/// `tv_{id}_s{season}_e{episode}`.
pub fn derived_id(
    content_id: u64,
    kind: ContentKind,
    season: Option<u32>,
    episode: Option<u32>,
) -> DownloadId {
    match kind {
        ContentKind::Movie => DownloadId::new(format!("{}_{}", kind.key_prefix(), content_id)),
        ContentKind::Episode => DownloadId::new(format!(
            "{}_{}_s{}_e{}",
            kind.key_prefix(),
            content_id,
            season.unwrap_or(0),
            episode.unwrap_or(0)
        )),
    }
}

/// The persisted unit of download state, one per requested asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub id: DownloadId,

    // Descriptive fields, immutable after creation
    pub content_id: u64,
    pub kind: ContentKind,
    pub title: String,
    pub episode_title: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub media_url: String,
    pub quality: QualityTier,

    // Transfer fields, mutated by the registry only
    pub status: DownloadStatus,
    /// Overall progress 0–100, non-decreasing while downloading.
    pub progress: f64,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    pub transfer_rate_bps: u64,
    pub eta_seconds: Option<u64>,
    /// Present only when `status == Failed`.
    pub error: Option<String>,

    // Storage fields. `file_path` is set at creation; its content is
    // authoritative only once the record is completed.
    pub file_path: PathBuf,
    pub thumbnail_path: Option<PathBuf>,
    pub subtitle_paths: Vec<PathBuf>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DownloadRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: DownloadId,
        content: &ContentMetadata,
        media_url: impl Into<String>,
        quality: QualityTier,
        season: Option<u32>,
        episode: Option<u32>,
        episode_title: Option<String>,
        file_path: PathBuf,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            content_id: content.id,
            kind: content.kind,
            title: content.title.clone(),
            episode_title,
            poster_path: content.poster_path.clone(),
            backdrop_path: content.backdrop_path.clone(),
            season,
            episode,
            media_url: media_url.into(),
            quality,
            status: DownloadStatus::Pending,
            progress: 0.0,
            downloaded_bytes: 0,
            total_bytes: 0,
            transfer_rate_bps: 0,
            eta_seconds: None,
            error: None,
            file_path,
            thumbnail_path: None,
            subtitle_paths: Vec::new(),
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Display title including the episode marker for episodic content.
    pub fn display_title(&self) -> String {
        match (self.season, self.episode) {
            (Some(season), Some(episode)) => {
                format!("{} S{:02}E{:02}", self.title, season, episode)
            }
            _ => self.title.clone(),
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Pick the destination file extension for a media URL.
///
/// HLS downloads combine MPEG-TS segments, so they land in a `.ts`
/// container; direct files keep a recognized extension from the URL path.
pub fn media_extension(media_url: &str, is_hls: bool) -> &'static str {
    if is_hls {
        return "ts";
    }
    let path = media_url
        .split(['?', '#'])
        .next()
        .unwrap_or(media_url)
        .to_ascii_lowercase();
    const KNOWN: [&str; 6] = ["mp4", "mkv", "webm", "avi", "mov", "m4v"];
    KNOWN
        .iter()
        .find(|ext| path.ends_with(&format!(".{ext}")))
        .copied()
        .unwrap_or("mp4")
}
