use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Directory holding per-request temporary audio.
#[derive(Debug, Clone)]
pub struct ScratchDir {
    root: PathBuf,
}

impl ScratchDir {
    /// Creates the directory if it does not exist yet.
    pub fn create(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Reserves a unique `<prefix>_<unix-ts>_<seq>.wav` name. Nothing is
    /// written yet, but the returned guard removes whatever ends up there.
    pub fn reserve(&self, prefix: &str) -> ScratchFile {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);

        ScratchFile {
            path: self
                .root
                .join(format!("{}_{}_{}.wav", prefix, timestamp, seq)),
        }
    }

    /// Writes `bytes` to a freshly reserved file.
    pub async fn persist(&self, prefix: &str, bytes: &[u8]) -> io::Result<ScratchFile> {
        let file = self.reserve(prefix);
        tokio::fs::write(file.path(), bytes).await?;
        Ok(file)
    }
}

/// A file in the scratch directory, deleted when the guard is dropped.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Removed scratch file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove scratch file"
            ),
        }
    }
}
