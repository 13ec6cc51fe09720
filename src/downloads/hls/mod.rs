mod combiner;
mod parser;
mod resolver;
mod segments;

pub use parser::{HlsSegment, HlsVariant, Manifest, MediaManifest};
pub use resolver::{PlaylistResolver, ResolvedPlaylist, resolve_uri};

pub(crate) use combiner::{combine_segments, segment_file_name};
pub(crate) use segments::run_hls_transfer;

/// Indicators that a media URL refers to an HLS playlist rather than a
/// direct file: playlist extensions, MIME-type substrings baked into
/// delivery URLs, and common manifest path patterns.
const HLS_INDICATORS: [&str; 4] = [".m3u8", ".m3u", "mpegurl", "format=m3u8"];

/// Decide whether a media URL should go through the playlist pipeline.
pub fn is_hls_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    if HLS_INDICATORS.iter().any(|marker| lower.contains(marker)) {
        return true;
    }

    let path = lower.split(['?', '#']).next().unwrap_or(&lower);
    path.ends_with("/manifest") || path.ends_with("/playlist")
}
