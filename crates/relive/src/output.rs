use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::info;

use crate::error::ClipError;

/// Where a finished clip went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedClip {
    pub filename: String,
    pub location: String,
    pub size: usize,
}

/// Host capability that persists bytes as a downloadable file.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn save(&self, filename: &str, bytes: Bytes) -> Result<SavedClip, ClipError>;
}

/// Writes clips into a directory, creating it on first use.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ArtifactSink for DirectorySink {
    async fn save(&self, filename: &str, bytes: Bytes) -> Result<SavedClip, ClipError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(filename);
        tokio::fs::write(&path, &bytes).await?;

        info!(path = %path.display(), size = bytes.len(), "Clip saved");
        Ok(SavedClip {
            filename: filename.to_owned(),
            location: path.display().to_string(),
            size: bytes.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_clip_into_directory() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let sink = DirectorySink::new(tmp.path().join("clips"));

        let saved = sink
            .save("kick-clip-test.ts", Bytes::from_static(b"payload"))
            .await
            .expect("saved");

        assert_eq!(saved.size, 7);
        let written = tokio::fs::read(tmp.path().join("clips/kick-clip-test.ts"))
            .await
            .expect("file exists");
        assert_eq!(written, b"payload");
    }
}
