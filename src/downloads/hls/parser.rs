//! Hand-rolled line-oriented HLS manifest parser.
//!
//! This is the primary parse path: real-world manifests are frequently
//! sloppy (missing version tags, stray blank lines, unquoted attributes)
//! and a tolerant line walk extracts segments where a strict parser
//! rejects the whole document. The structured `m3u8-rs` parser is kept as
//! the fallback in the resolver.

/// One variant entry of a master playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct HlsVariant {
    pub uri: String,
    pub bandwidth: u64,
    pub resolution: Option<(u32, u32)>,
}

/// One media segment reference, in playlist order.
#[derive(Debug, Clone, PartialEq)]
pub struct HlsSegment {
    /// URI exactly as written in the manifest; resolved to an absolute URL
    /// by the transfer engine.
    pub uri: String,
    /// Nominal duration in seconds.
    pub duration: f64,
    /// Position on the playlist timeline.
    pub index: usize,
}

/// Parsed media playlist: ordered segments plus header metadata.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MediaManifest {
    pub segments: Vec<HlsSegment>,
    pub target_duration: f64,
    pub media_sequence: u64,
    pub end_list: bool,
    pub version: u32,
}

/// Outcome of classifying and parsing a manifest document.
#[derive(Debug, Clone, PartialEq)]
pub enum Manifest {
    /// Master playlist: variant streams, in document order.
    Master(Vec<HlsVariant>),
    /// Media playlist: the segment list for one variant.
    Media(MediaManifest),
}

impl Manifest {
    /// A parse that produced neither variants nor segments carries no
    /// usable information; the caller should fall back.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Master(variants) => variants.is_empty(),
            Self::Media(manifest) => manifest.segments.is_empty(),
        }
    }
}

const STREAM_INF: &str = "#EXT-X-STREAM-INF:";
const EXTINF: &str = "#EXTINF:";
const TARGET_DURATION: &str = "#EXT-X-TARGETDURATION:";
const MEDIA_SEQUENCE: &str = "#EXT-X-MEDIA-SEQUENCE:";
const VERSION: &str = "#EXT-X-VERSION:";
const END_LIST: &str = "#EXT-X-ENDLIST";

/// Parse a manifest document, classifying it as master or media.
pub fn parse(text: &str) -> Manifest {
    if text.lines().any(|line| line.trim_start().starts_with(STREAM_INF)) {
        Manifest::Master(parse_master(text))
    } else {
        Manifest::Media(parse_media(text))
    }
}

fn parse_master(text: &str) -> Vec<HlsVariant> {
    let mut variants = Vec::new();
    let mut lines = text.lines().map(str::trim).peekable();

    while let Some(line) = lines.next() {
        let Some(attrs) = line.strip_prefix(STREAM_INF) else {
            continue;
        };

        let mut bandwidth = 0u64;
        let mut resolution = None;
        for (key, value) in split_attributes(attrs) {
            match key.as_str() {
                "BANDWIDTH" => bandwidth = value.parse().unwrap_or(0),
                "RESOLUTION" => resolution = parse_resolution(&value),
                _ => {}
            }
        }

        // The URI for this variant is the next non-comment, non-empty line.
        // A following stream-info tag means this one had no URI; leave it
        // for the outer loop.
        while let Some(&candidate) = lines.peek() {
            if candidate.starts_with(STREAM_INF) {
                break;
            }
            if candidate.is_empty() || candidate.starts_with('#') {
                lines.next();
                continue;
            }
            variants.push(HlsVariant {
                uri: candidate.to_string(),
                bandwidth,
                resolution,
            });
            lines.next();
            break;
        }
    }

    variants
}

fn parse_media(text: &str) -> MediaManifest {
    let mut manifest = MediaManifest::default();
    let mut pending_duration: Option<f64> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(value) = line.strip_prefix(TARGET_DURATION) {
            manifest.target_duration = value.trim().parse().unwrap_or(0.0);
        } else if let Some(value) = line.strip_prefix(MEDIA_SEQUENCE) {
            manifest.media_sequence = value.trim().parse().unwrap_or(0);
        } else if let Some(value) = line.strip_prefix(VERSION) {
            manifest.version = value.trim().parse().unwrap_or(0);
        } else if line.starts_with(END_LIST) {
            manifest.end_list = true;
        } else if let Some(value) = line.strip_prefix(EXTINF) {
            // "#EXTINF:<duration>,[<title>]"
            let duration = value
                .split(',')
                .next()
                .and_then(|d| d.trim().parse().ok())
                .unwrap_or(0.0);
            pending_duration = Some(duration);
        } else if !line.starts_with('#') {
            // A URI line; the preceding EXTINF applies, otherwise the
            // target duration stands in.
            let index = manifest.segments.len();
            manifest.segments.push(HlsSegment {
                uri: line.to_string(),
                duration: pending_duration.take().unwrap_or(manifest.target_duration),
                index,
            });
        }
    }

    manifest
}

/// Split an attribute list on commas outside double quotes.
///
/// Needed because values like `CODECS="avc1.4d401f,mp4a.40.2"` carry
/// commas of their own.
fn split_attributes(input: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    let mut push = |token: &str, pairs: &mut Vec<(String, String)>| {
        if let Some((key, value)) = token.split_once('=') {
            pairs.push((
                key.trim().to_ascii_uppercase(),
                value.trim().trim_matches('"').to_string(),
            ));
        }
    };

    for c in input.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ',' if !in_quotes => {
                push(&current, &mut pairs);
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        push(&current, &mut pairs);
    }

    pairs
}

fn parse_resolution(value: &str) -> Option<(u32, u32)> {
    let (w, h) = value.split_once(['x', 'X'])?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}
