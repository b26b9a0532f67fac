//! Temporary on-disk copy of an uploaded recording.
//!
//! The file is deleted when the [`ScratchFile`] is closed or dropped,
//! whichever comes first, so every request path removes it exactly once.

use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;

const DEFAULT_SUFFIX: &str = ".webm";

pub struct ScratchFile {
    path: TempPath,
    file: Option<tokio::fs::File>,
    bytes_written: usize,
}

impl ScratchFile {
    /// Create an empty scratch file whose suffix matches the upload's filename.
    pub fn create(original_name: Option<&str>) -> io::Result<Self> {
        let named = tempfile::Builder::new()
            .prefix("voice-note-")
            .suffix(&suffix_for(original_name))
            .tempfile()?;
        let (file, path) = named.into_parts();
        Ok(Self {
            path,
            file: Some(tokio::fs::File::from_std(file)),
            bytes_written: 0,
        })
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "scratch file already finished"))?;
        file.write_all(chunk).await?;
        self.bytes_written += chunk.len();
        Ok(())
    }

    /// Flush and close the write handle so decoders see the whole upload.
    pub async fn finish(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    /// Delete the file now, logging instead of failing if that goes wrong.
    pub fn close(self) {
        let path: PathBuf = self.path.to_path_buf();
        if let Err(e) = self.path.close() {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove scratch audio file");
        }
    }
}

/// Extension of the uploaded filename (with its dot), or `.webm`.
fn suffix_for(original_name: Option<&str>) -> String {
    original_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext))
        .unwrap_or_else(|| DEFAULT_SUFFIX.to_string())
}
