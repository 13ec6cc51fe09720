use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::errors::DownloadError;
use crate::fs::FileSystem;

/// Scratch file name for a segment at the given timeline index.
pub(crate) fn segment_file_name(index: usize) -> String {
    format!("segment_{index:04}.ts")
}

/// Concatenate scratch segment files into the destination media file.
///
/// Segments are read strictly in index order; MPEG-TS is designed for
/// byte-level concatenation so the first segment writes the file and every
/// later one appends. The scratch directory is removed unconditionally
/// afterwards; a cleanup failure is logged and never fails the download.
pub(crate) async fn combine_segments(
    fs: &Arc<dyn FileSystem>,
    scratch_dir: &Path,
    destination: &Path,
    segment_count: usize,
) -> Result<(), DownloadError> {
    debug!("Combining {segment_count} segments into {destination:?}");

    for index in 0..segment_count {
        let part = scratch_dir.join(segment_file_name(index));
        let data = fs.read(&part).await.map_err(|e| {
            DownloadError::Combine(format!("Failed to read segment {index}: {e:#}"))
        })?;

        let result = if index == 0 {
            fs.write(destination, &data).await
        } else {
            fs.append(destination, &data).await
        };
        result.map_err(|e| {
            DownloadError::Combine(format!(
                "Failed to write segment {index} to {destination:?}: {e:#}"
            ))
        })?;
    }

    if !fs.exists(destination).await {
        return Err(DownloadError::Combine(format!(
            "Combined file missing at {destination:?}"
        )));
    }
    let stat = fs.stat(destination).await.map_err(|e| {
        DownloadError::Combine(format!("Cannot stat combined file {destination:?}: {e:#}"))
    })?;
    if stat.size == 0 {
        return Err(DownloadError::Combine(format!(
            "Combined file at {destination:?} is empty"
        )));
    }

    if let Err(e) = fs.remove_dir_all(scratch_dir).await {
        warn!("Failed to remove scratch directory {scratch_dir:?}: {e:#}");
    }

    info!("✅ Combined {segment_count} segments ({} bytes)", stat.size);
    Ok(())
}
