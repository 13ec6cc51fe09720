use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use super::combiner::{combine_segments, segment_file_name};
use super::resolver::{PlaylistResolver, resolve_uri};
use crate::downloads::registry::{DownloadRegistry, TransferGate};
use crate::downloads::transfer::{TransferOutcome, rate_over};
use crate::errors::DownloadError;
use crate::events::ProgressUpdate;
use crate::fs::FileSystem;
use crate::models::DownloadId;

/// Transfer an HLS asset: resolve the playlist, fetch every segment
/// strictly in sequence into the scratch directory, then combine.
///
/// Overall progress is `(segments completed + current fraction) / total`.
/// A single failed segment aborts the whole download with no retry; the
/// registry removes the scratch directory and partial output before the
/// record turns failed.
pub(crate) async fn run_hls_transfer(
    registry: &DownloadRegistry,
    id: &DownloadId,
    media_url: &str,
    destination: &Path,
    token: &CancellationToken,
) -> Result<TransferOutcome, DownloadError> {
    let fs = registry.fs().clone();

    if matches!(registry.transfer_gate(id, token).await, TransferGate::Stop) {
        return Ok(TransferOutcome::Cancelled);
    }

    let fetch_timeout = Duration::from_secs(registry.config().download_timeout_secs);
    let resolver = PlaylistResolver::new(registry.client().clone(), fetch_timeout);
    let playlist = resolver.resolve(media_url).await?;

    let scratch_dir = registry
        .config()
        .scratch_directory(id)
        .map_err(DownloadError::from)?;

    if matches!(registry.transfer_gate(id, token).await, TransferGate::Stop) {
        return Ok(TransferOutcome::Cancelled);
    }

    // Stale data from an earlier cancelled run
    fs.remove_dir_all(&scratch_dir).await?;
    fs.unlink(destination).await?;
    fs.mkdir_all(&scratch_dir).await?;
    registry.mark_downloading(id).await?;

    let total_segments = playlist.segments.len();
    info!(
        "Fetching {total_segments} segments for {id} from {}",
        playlist.url
    );

    let mut session = SegmentSession {
        downloaded_bytes: 0,
        window_start: Instant::now(),
        window_bytes: 0,
        interval: Duration::from_millis(registry.config().progress_interval_ms),
    };

    for segment in &playlist.segments {
        if matches!(registry.transfer_gate(id, token).await, TransferGate::Stop) {
            return Ok(TransferOutcome::Cancelled);
        }

        let segment_url = resolve_uri(&playlist.url, &segment.uri)?;
        let segment_path = scratch_dir.join(segment_file_name(segment.index));
        debug!(
            "Fetching segment {}/{total_segments}: {segment_url}",
            segment.index + 1
        );

        match fetch_segment(
            registry,
            id,
            token,
            &fs,
            &segment_url,
            &segment_path,
            segment.index,
            total_segments,
            &mut session,
        )
        .await
        {
            Ok(SegmentFetch::Done) => {}
            Ok(SegmentFetch::Stopped) => return Ok(TransferOutcome::Cancelled),
            Err(e) => {
                return Err(DownloadError::SegmentTransfer(format!(
                    "Segment {} of {total_segments} failed: {e}",
                    segment.index
                )));
            }
        }
    }

    combine_segments(&fs, &scratch_dir, destination, total_segments).await?;
    Ok(TransferOutcome::Completed)
}

struct SegmentSession {
    downloaded_bytes: u64,
    window_start: Instant,
    window_bytes: u64,
    interval: Duration,
}

enum SegmentFetch {
    Done,
    Stopped,
}

#[allow(clippy::too_many_arguments)]
async fn fetch_segment(
    registry: &DownloadRegistry,
    id: &DownloadId,
    token: &CancellationToken,
    fs: &Arc<dyn FileSystem>,
    url: &Url,
    path: &Path,
    index: usize,
    total_segments: usize,
    session: &mut SegmentSession,
) -> Result<SegmentFetch, DownloadError> {
    let response = registry
        .client()
        .get(url.clone())
        .send()
        .await
        .map_err(|e| DownloadError::Network(format!("Failed to request {url}: {e}")))?;
    if !response.status().is_success() {
        return Err(DownloadError::Network(format!(
            "HTTP {} fetching {url}",
            response.status()
        )));
    }

    let segment_length = response.content_length().unwrap_or(0);
    let mut stream = response.bytes_stream();
    let mut data: Vec<u8> = Vec::new();

    while let Some(next) = stream.next().await {
        if matches!(registry.transfer_gate(id, token).await, TransferGate::Stop) {
            return Ok(SegmentFetch::Stopped);
        }

        let chunk = next.map_err(|e| {
            DownloadError::Network(format!("Transfer interrupted for {url}: {e}"))
        })?;
        data.extend_from_slice(&chunk);
        session.window_bytes += chunk.len() as u64;

        if session.window_start.elapsed() >= session.interval {
            let fraction = if segment_length > 0 {
                (data.len() as u64).min(segment_length) as f64 / segment_length as f64
            } else {
                0.0
            };
            let overall = ((index as f64 + fraction) / total_segments as f64) * 100.0;
            let rate = rate_over(session.window_start.elapsed(), session.window_bytes);
            registry
                .report_progress(
                    id,
                    ProgressUpdate {
                        progress: overall,
                        rate_bps: rate,
                        downloaded_bytes: session.downloaded_bytes + data.len() as u64,
                        ..Default::default()
                    },
                )
                .await;
            session.window_start = Instant::now();
            session.window_bytes = 0;
        }
    }

    fs.write(path, &data).await?;
    session.downloaded_bytes += data.len() as u64;

    let overall = ((index + 1) as f64 / total_segments as f64) * 100.0;
    registry
        .report_progress(
            id,
            ProgressUpdate {
                progress: overall,
                rate_bps: rate_over(session.window_start.elapsed(), session.window_bytes),
                total_bytes: session.downloaded_bytes,
                downloaded_bytes: session.downloaded_bytes,
                ..Default::default()
            },
        )
        .await;

    Ok(SegmentFetch::Done)
}
