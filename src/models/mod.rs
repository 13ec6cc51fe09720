mod identifiers;

pub use identifiers::DownloadId;

use serde::{Deserialize, Serialize};

/// Kind of content a download refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Movie,
    Episode,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Episode => "episode",
        }
    }

    /// Prefix used when deriving download ids. Episodic content keys under
    /// its show, so episodes use the `tv` prefix.
    pub fn key_prefix(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Episode => "tv",
        }
    }
}

/// Quality tier requested for a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Low,      // 480p
    Medium,   // 720p
    High,     // 1080p
    Ultra,    // 4K
    Original, // Original quality
}

impl QualityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Low => "low",
            QualityTier::Medium => "medium",
            QualityTier::High => "high",
            QualityTier::Ultra => "ultra",
            QualityTier::Original => "original",
        }
    }
}

impl Default for QualityTier {
    fn default() -> Self {
        Self::High
    }
}

/// Content metadata handed in by the metadata client when a download is
/// requested. Consumed as plain data; the manager never talks to the
/// metadata service itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentMetadata {
    pub id: u64,
    pub kind: ContentKind,
    pub title: String,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub release_date: Option<String>,
}

impl ContentMetadata {
    pub fn new(id: u64, kind: ContentKind, title: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            title: title.into(),
            poster_path: None,
            backdrop_path: None,
            release_date: None,
        }
    }
}
