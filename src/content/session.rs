use futures::StreamExt;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use super::fetcher::ByteStream;
use super::version::VersionString;
use crate::error::Result;

/// Minimum number of new bytes between two progress messages
pub const PROGRESS_STEP: u64 = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Installed,
    Failed(String),
}

/// One download-and-extract attempt
#[derive(Debug)]
pub struct UpdateSession {
    pub target: VersionString,
    pub initial: bool,
    pub bytes_received: u64,
    pub archive_path: PathBuf,
    pub outcome: Option<SessionOutcome>,
    last_reported: Option<u64>,
}

impl UpdateSession {
    pub fn new(target: VersionString, initial: bool, archive_path: PathBuf) -> Self {
        Self {
            target,
            initial,
            bytes_received: 0,
            archive_path,
            outcome: None,
            last_reported: None,
        }
    }

    /// Count a received chunk; returns true when progress is due for display
    pub fn record_chunk(&mut self, len: usize) -> bool {
        self.bytes_received += len as u64;
        let due = match self.last_reported {
            None => true,
            Some(last) => self.bytes_received - last >= PROGRESS_STEP,
        };
        if due {
            self.last_reported = Some(self.bytes_received);
        }
        due
    }

    pub fn megabytes(&self) -> f64 {
        self.bytes_received as f64 / 1_048_576.0
    }

    /// Persist `stream` into `archive`, calling `on_progress` whenever progress is due
    pub async fn receive(
        &mut self,
        mut stream: ByteStream,
        archive: &TempArchive,
        mut on_progress: impl FnMut(&UpdateSession),
    ) -> Result<u64> {
        let mut file = tokio::fs::File::create(archive.path()).await?;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            if self.record_chunk(chunk.len()) {
                on_progress(self);
            }
        }

        file.flush().await?;
        Ok(self.bytes_received)
    }
}

/// Downloaded archive on disk, removed when dropped
#[derive(Debug)]
pub struct TempArchive {
    path: PathBuf,
}

impl TempArchive {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempArchive {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => log::debug!("Removed {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Could not remove {}: {}", self.path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpdateError;
    use bytes::Bytes;
    use futures::stream;
    use tempfile::tempdir;

    fn chunks(sizes: &[usize]) -> ByteStream {
        let items: Vec<Result<Bytes>> = sizes
            .iter()
            .map(|&n| Ok(Bytes::from(vec![7u8; n])))
            .collect();
        stream::iter(items).boxed_local()
    }

    #[test]
    fn test_progress_throttle() {
        let mut session = UpdateSession::new("1.0".into(), true, PathBuf::from("update.zip"));
        assert!(session.record_chunk(10));
        assert!(!session.record_chunk(1024));
        assert!(!session.record_chunk(PROGRESS_STEP as usize - 1025));
        assert!(session.record_chunk(1));
        assert_eq!(session.bytes_received, PROGRESS_STEP + 10);
    }

    #[tokio::test]
    async fn test_receive_writes_all_chunks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("update.zip");
        let archive = TempArchive::new(path.clone());
        let mut session = UpdateSession::new("1.0".into(), false, path.clone());

        let mut reports = Vec::new();
        let total = session
            .receive(chunks(&[40_000, 40_000, 40_000]), &archive, |s| {
                reports.push(s.bytes_received)
            })
            .await
            .unwrap();

        assert_eq!(total, 120_000);
        assert_eq!(reports, vec![40_000, 120_000]);
        assert_eq!(fs::metadata(&path).unwrap().len(), 120_000);
    }

    #[tokio::test]
    async fn test_receive_surfaces_stream_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("update.zip");
        let archive = TempArchive::new(path.clone());
        let mut session = UpdateSession::new("1.0".into(), false, path.clone());

        let items: Vec<Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"PK")),
            Err(UpdateError::Interrupted("connection reset".into())),
        ];
        let result = session
            .receive(stream::iter(items).boxed_local(), &archive, |_| {})
            .await;

        assert!(matches!(result, Err(UpdateError::Interrupted(_))));
        drop(archive);
        assert!(!path.exists());
    }

    #[test]
    fn test_temp_archive_removed_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("update.zip");
        fs::write(&path, b"partial").unwrap();
        {
            let _archive = TempArchive::new(path.clone());
        }
        assert!(!path.exists());
    }
}
