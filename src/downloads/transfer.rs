use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::registry::{DownloadRegistry, TransferGate};
use crate::errors::DownloadError;
use crate::events::ProgressUpdate;
use crate::fs::FileSystem;
use crate::models::DownloadId;

/// How a transfer task ended. Cancellation is not an error: the registry
/// operation that requested it already updated state and cleaned up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransferOutcome {
    Completed,
    Cancelled,
}

/// Stream a non-playlist URL straight to the record's destination path.
///
/// Progress, transfer rate, and ETA are folded into the record at the
/// configured cadence. The gate is polled between chunks, so pause keeps
/// the connection open and cancel stops the transfer within one chunk.
pub(crate) async fn run_file_transfer(
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

    // Stale partial data from an earlier cancelled run
    fs.unlink(destination).await?;
    registry.mark_downloading(id).await?;

    debug!("Requesting {media_url}");
    let response = registry
        .client()
        .get(media_url)
        .send()
        .await
        .map_err(|e| DownloadError::Network(format!("Failed to request {media_url}: {e}")))?;
    if !response.status().is_success() {
        return Err(DownloadError::Network(format!(
            "HTTP {} fetching {media_url}",
            response.status()
        )));
    }

    let total_bytes = response.content_length().unwrap_or(0);
    registry
        .report_progress(
            id,
            ProgressUpdate {
                total_bytes,
                ..Default::default()
            },
        )
        .await;

    let chunk_capacity = registry.config().chunk_size_kb as usize * 1024;
    let progress_interval = Duration::from_millis(registry.config().progress_interval_ms);

    let mut stream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::with_capacity(chunk_capacity);
    let mut downloaded: u64 = 0;
    let mut wrote_first = false;
    let mut window_start = Instant::now();
    let mut window_bytes: u64 = 0;

    while let Some(next) = stream.next().await {
        if matches!(registry.transfer_gate(id, token).await, TransferGate::Stop) {
            return Ok(TransferOutcome::Cancelled);
        }

        let chunk = next.map_err(|e| {
            DownloadError::Network(format!("Transfer interrupted for {media_url}: {e}"))
        })?;
        buffer.extend_from_slice(&chunk);

        if buffer.len() >= chunk_capacity {
            flush(&fs, destination, &buffer, &mut wrote_first).await?;
            downloaded += buffer.len() as u64;
            window_bytes += buffer.len() as u64;
            buffer.clear();

            if window_start.elapsed() >= progress_interval {
                let rate = rate_over(window_start.elapsed(), window_bytes);
                registry
                    .report_progress(id, progress_sample(downloaded, total_bytes, rate))
                    .await;
                window_start = Instant::now();
                window_bytes = 0;
            }
        }
    }

    if !buffer.is_empty() {
        flush(&fs, destination, &buffer, &mut wrote_first).await?;
        downloaded += buffer.len() as u64;
    }
    if !wrote_first {
        // A zero-length body still produces the destination file
        fs.write(destination, &[]).await?;
    }

    let final_total = total_bytes.max(downloaded);
    registry
        .report_progress(id, progress_sample(downloaded, final_total, 0))
        .await;

    info!("Transferred {downloaded} bytes to {destination:?}");
    Ok(TransferOutcome::Completed)
}

fn progress_sample(downloaded: u64, total: u64, rate: u64) -> ProgressUpdate {
    let progress = if total > 0 {
        (downloaded as f64 / total as f64) * 100.0
    } else {
        0.0
    };
    let eta_seconds = if rate > 0 && total > downloaded {
        Some((total - downloaded) / rate)
    } else {
        None
    };
    ProgressUpdate {
        progress,
        rate_bps: rate,
        total_bytes: total,
        downloaded_bytes: downloaded,
        eta_seconds,
        ..Default::default()
    }
}

pub(crate) fn rate_over(elapsed: Duration, bytes: u64) -> u64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        (bytes as f64 / secs) as u64
    } else {
        0
    }
}

async fn flush(
    fs: &Arc<dyn FileSystem>,
    destination: &Path,
    data: &[u8],
    wrote_first: &mut bool,
) -> Result<(), DownloadError> {
    if *wrote_first {
        fs.append(destination, data).await?;
    } else {
        fs.write(destination, data).await?;
        *wrote_first = true;
    }
    Ok(())
}
