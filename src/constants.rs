/// Store key under which the serialized download registry snapshot lives.
pub const REGISTRY_STORE_KEY: &str = "downloads.registry.v1";

/// Directory (under the download directory) holding per-download scratch
/// segment directories during HLS transfers.
pub const SCRATCH_DIR_NAME: &str = ".segments";

/// Directory (under the download directory) holding fetched thumbnails.
pub const THUMBNAIL_DIR_NAME: &str = "thumbnails";

/// Interval the transfer engines wait while a download is paused before
/// re-checking its status.
pub const PAUSE_POLL_INTERVAL_MS: u64 = 100;

/// How deep master playlists may nest before resolution gives up.
pub const MAX_PLAYLIST_DEPTH: u8 = 4;
