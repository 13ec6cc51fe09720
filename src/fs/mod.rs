use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use tokio::fs as tokio_fs;
use tokio::io::AsyncWriteExt;

/// Basic file metadata returned by [`FileSystem::stat`].
#[derive(Debug, Clone, Copy)]
pub struct FileStat {
    pub size: u64,
    pub is_dir: bool,
}

/// Platform file-system operations the download manager depends on.
///
/// Injected so transfers and cleanup can be exercised against temp
/// directories in tests and alternate storage on constrained platforms.
#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn exists(&self, path: &Path) -> bool;
    async fn mkdir_all(&self, path: &Path) -> Result<()>;
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;
    async fn append(&self, path: &Path, data: &[u8]) -> Result<()>;
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;
    async fn stat(&self, path: &Path) -> Result<FileStat>;
    /// Remove a file. Removing a missing file is not an error.
    async fn unlink(&self, path: &Path) -> Result<()>;
    /// Remove a directory tree. Removing a missing directory is not an error.
    async fn remove_dir_all(&self, path: &Path) -> Result<()>;
    /// Free space in bytes on the volume containing `path`.
    async fn free_space(&self, path: &Path) -> Result<u64>;
}

/// [`FileSystem`] implementation over the local disk via `tokio::fs`.
#[derive(Debug, Default, Clone)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn exists(&self, path: &Path) -> bool {
        tokio_fs::try_exists(path).await.unwrap_or(false)
    }

    async fn mkdir_all(&self, path: &Path) -> Result<()> {
        tokio_fs::create_dir_all(path)
            .await
            .with_context(|| format!("Failed to create directory {path:?}"))
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        tokio_fs::write(path, data)
            .await
            .with_context(|| format!("Failed to write {path:?}"))
    }

    async fn append(&self, path: &Path, data: &[u8]) -> Result<()> {
        let mut file = tokio_fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("Failed to open {path:?} for append"))?;
        file.write_all(data)
            .await
            .with_context(|| format!("Failed to append to {path:?}"))?;
        file.flush()
            .await
            .with_context(|| format!("Failed to flush {path:?}"))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        tokio_fs::read(path)
            .await
            .with_context(|| format!("Failed to read {path:?}"))
    }

    async fn stat(&self, path: &Path) -> Result<FileStat> {
        let meta = tokio_fs::metadata(path)
            .await
            .with_context(|| format!("Failed to stat {path:?}"))?;
        Ok(FileStat {
            size: meta.len(),
            is_dir: meta.is_dir(),
        })
    }

    async fn unlink(&self, path: &Path) -> Result<()> {
        match tokio_fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {path:?}")),
        }
    }

    async fn remove_dir_all(&self, path: &Path) -> Result<()> {
        match tokio_fs::remove_dir_all(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove directory {path:?}")),
        }
    }

    async fn free_space(&self, path: &Path) -> Result<u64> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || free_space_blocking(&path))
            .await
            .context("free_space task panicked")?
    }
}

#[cfg(unix)]
fn free_space_blocking(path: &Path) -> Result<u64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .with_context(|| format!("Path {path:?} contains a NUL byte"))?;

    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error())
            .with_context(|| format!("statvfs failed for {path:?}"));
    }

    Ok(stat.f_bavail as u64 * stat.f_frsize as u64)
}

#[cfg(not(unix))]
fn free_space_blocking(path: &Path) -> Result<u64> {
    tracing::warn!("Free-space query not supported on this platform for {path:?}");
    Ok(0)
}
