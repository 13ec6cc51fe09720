use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::parser::{self, HlsSegment, HlsVariant, Manifest, MediaManifest};
use crate::constants::MAX_PLAYLIST_DEPTH;
use crate::errors::DownloadError;

/// A fully resolved media playlist, ready for the segment transfer engine.
#[derive(Debug, Clone)]
pub struct ResolvedPlaylist {
    /// URL of the final media playlist; segment URIs resolve against it.
    pub url: Url,
    pub segments: Vec<HlsSegment>,
    pub target_duration: f64,
    pub media_sequence: u64,
    pub end_list: bool,
    pub version: u32,
}

/// Fetches playlists and resolves master manifests down to the
/// best-bandwidth media playlist.
pub struct PlaylistResolver {
    client: Client,
    fetch_timeout: Duration,
}

impl PlaylistResolver {
    pub fn new(client: Client, fetch_timeout: Duration) -> Self {
        Self {
            client,
            fetch_timeout,
        }
    }

    /// Resolve a playlist URL to an ordered segment list.
    ///
    /// Master playlists recurse into their highest-bandwidth variant. The
    /// manual parser runs first; when it extracts nothing, the document is
    /// re-parsed with `m3u8-rs` before giving up.
    pub async fn resolve(&self, url: &str) -> Result<ResolvedPlaylist, DownloadError> {
        let mut current = Url::parse(url)
            .map_err(|e| DownloadError::PlaylistParse(format!("Invalid playlist URL {url}: {e}")))?;

        for _ in 0..=MAX_PLAYLIST_DEPTH {
            let text = self.fetch_playlist(&current).await?;

            let manifest = match parser::parse(&text) {
                parsed if !parsed.is_empty() => parsed,
                _ => {
                    debug!("Manual parse of {current} found nothing, trying fallback parser");
                    let fallback = fallback_parse(&text, &current)?;
                    if fallback.is_empty() {
                        return Err(DownloadError::PlaylistParse(format!(
                            "Playlist {current} contains no streams or segments"
                        )));
                    }
                    fallback
                }
            };

            match manifest {
                Manifest::Master(variants) => {
                    let best = select_variant(&variants).ok_or_else(|| {
                        DownloadError::PlaylistParse(format!(
                            "Master playlist {current} has no variant streams"
                        ))
                    })?;
                    debug!(
                        "Selected variant {} ({} bps) from {current}",
                        best.uri, best.bandwidth
                    );
                    current = resolve_uri(&current, &best.uri)?;
                }
                Manifest::Media(manifest) => {
                    return Ok(ResolvedPlaylist {
                        url: current,
                        segments: manifest.segments,
                        target_duration: manifest.target_duration,
                        media_sequence: manifest.media_sequence,
                        end_list: manifest.end_list,
                        version: manifest.version,
                    });
                }
            }
        }

        Err(DownloadError::PlaylistParse(format!(
            "Too many nested master playlists resolving {url}"
        )))
    }

    async fn fetch_playlist(&self, url: &Url) -> Result<String, DownloadError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(self.fetch_timeout)
            .send()
            .await
            .map_err(|e| DownloadError::Network(format!("Failed to fetch playlist {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(DownloadError::Network(format!(
                "Failed to fetch playlist {url}: HTTP {}",
                response.status()
            )));
        }

        response
            .text()
            .await
            .map_err(|e| DownloadError::Network(format!("Failed to read playlist {url}: {e}")))
    }
}

/// Highest bandwidth wins; on a tie the first occurrence stays selected.
pub(crate) fn select_variant(variants: &[HlsVariant]) -> Option<&HlsVariant> {
    variants
        .iter()
        .reduce(|best, v| if v.bandwidth > best.bandwidth { v } else { best })
}

/// Resolve a manifest URI against the playlist URL it came from.
///
/// Absolute URLs pass through unchanged; leading-slash paths resolve
/// against the scheme and host; anything else resolves against the
/// playlist's own directory.
pub fn resolve_uri(base: &Url, uri: &str) -> Result<Url, DownloadError> {
    if let Ok(absolute) = Url::parse(uri) {
        if !absolute.cannot_be_a_base() {
            return Ok(absolute);
        }
    }

    base.join(uri).map_err(|e| {
        DownloadError::PlaylistParse(format!("Cannot resolve URI {uri} against {base}: {e}"))
    })
}

/// Secondary parse path over the structured `m3u8-rs` parser, regenerating
/// the same manifest shape the manual parser produces.
fn fallback_parse(text: &str, url: &Url) -> Result<Manifest, DownloadError> {
    match m3u8_rs::parse_playlist_res(text.as_bytes()) {
        Ok(m3u8_rs::Playlist::MasterPlaylist(playlist)) => {
            let variants = playlist
                .variants
                .iter()
                .map(|v| HlsVariant {
                    uri: v.uri.clone(),
                    bandwidth: v.bandwidth,
                    resolution: v.resolution.map(|r| (r.width as u32, r.height as u32)),
                })
                .collect();
            Ok(Manifest::Master(variants))
        }
        Ok(m3u8_rs::Playlist::MediaPlaylist(playlist)) => {
            let segments = playlist
                .segments
                .iter()
                .enumerate()
                .map(|(index, segment)| HlsSegment {
                    uri: segment.uri.clone(),
                    duration: segment.duration as f64,
                    index,
                })
                .collect();
            Ok(Manifest::Media(MediaManifest {
                segments,
                target_duration: playlist.target_duration as f64,
                media_sequence: playlist.media_sequence,
                end_list: playlist.end_list,
                version: playlist.version.unwrap_or(0) as u32,
            }))
        }
        Err(e) => {
            warn!("Fallback parse of playlist {url} failed: {e}");
            Err(DownloadError::PlaylistParse(format!(
                "Playlist {url} could not be parsed: {e}"
            )))
        }
    }
}
