use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;

/// Handle for a completed download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DownloadId(pub u64);

impl std::fmt::Display for DownloadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Destination for generated reports
#[async_trait]
pub trait DownloadSink: Send + Sync {
    /// Persist `bytes` under `filename`. When `prompt_for_location` is set an
    /// interactive sink asks the user where to save.
    async fn save(
        &self,
        bytes: &[u8],
        filename: &str,
        prompt_for_location: bool,
    ) -> Result<DownloadId>;
}

/// Saves reports into a directory, never overwriting an existing file
pub struct FileDownloadSink {
    dir: PathBuf,
    next_id: AtomicU64,
}

impl FileDownloadSink {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            next_id: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// `report.csv`, `report (1).csv`, `report (2).csv`, ...
fn candidate_name(filename: &str, attempt: u32) -> String {
    if attempt == 0 {
        return filename.to_string();
    }
    match filename.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem} ({attempt}).{ext}"),
        None => format!("{filename} ({attempt})"),
    }
}

#[async_trait]
impl DownloadSink for FileDownloadSink {
    async fn save(
        &self,
        bytes: &[u8],
        filename: &str,
        prompt_for_location: bool,
    ) -> Result<DownloadId> {
        if prompt_for_location {
            log::debug!(
                "No interactive location prompt available, saving into {}",
                self.dir.display()
            );
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let mut attempt = 0;
        let (path, mut file) = loop {
            let path = self.dir.join(candidate_name(filename, attempt));
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => break (path, file),
                Err(e) if e.kind() == ErrorKind::AlreadyExists && attempt < 1000 => {
                    attempt += 1;
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to create {}", path.display()))
                }
            }
        };

        file.write_all(bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        file.flush().await?;

        let id = DownloadId(self.next_id.fetch_add(1, Ordering::SeqCst));
        log::info!("Report downloaded: {} (id {id})", path.display());
        Ok(id)
    }
}
