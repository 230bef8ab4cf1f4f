use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::{Result, VerifyError};

/// Per-job scratch directory.
///
/// Every intermediate file of a job lives here. The directory is removed
/// when the workspace is dropped, on success, error and cancellation alike.
#[derive(Debug)]
pub struct JobWorkspace {
    dir: TempDir,
}

impl JobWorkspace {
    pub fn create(root: &Path, upload_id: &str) -> Result<Self> {
        std::fs::create_dir_all(root)?;

        let prefix = format!("verify-{}-", sanitize_id(upload_id));
        let dir = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir_in(root)
            .map_err(|e| {
                VerifyError::Io(std::io::Error::other(format!(
                    "Failed to create job workspace in {}: {}",
                    root.display(),
                    e
                )))
            })?;

        debug!("Created job workspace {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// A collision-free path inside the workspace. Nothing is created.
    pub fn scratch_path(&self, stem: &str, extension: &str) -> PathBuf {
        let millis = chrono::Utc::now().timestamp_millis();
        let nonce = uuid::Uuid::new_v4().simple();
        self.dir
            .path()
            .join(format!("{stem}_{millis}_{nonce}.{extension}"))
    }

    /// Write `data` to a fresh scratch file owned by the returned guard.
    pub async fn write_scratch(
        &self,
        stem: &str,
        extension: &str,
        data: &[u8],
    ) -> Result<ScratchFile> {
        let file = ScratchFile::new(self.scratch_path(stem, extension));
        tokio::fs::write(file.path(), data).await?;
        Ok(file)
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        debug!("Removing job workspace {}", self.dir.path().display());
    }
}

/// Deletes its file when dropped.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole file, then delete it.
    pub async fn consume(self) -> Result<Vec<u8>> {
        let data = tokio::fs::read(&self.path).await?;
        Ok(data)
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", self.path.display(), e),
        }
    }
}

fn sanitize_id(upload_id: &str) -> String {
    let cleaned: String = upload_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(32)
        .collect();
    if cleaned.is_empty() {
        "job".to_string()
    } else {
        cleaned
    }
}
