//! Write-through recording of the live chunk stream.
//!
//! Every chunk seen by the transport is persisted as a hex-encoded text
//! file named `chunk_<seq:08d>.txt`, the same layout [`OfflineSource`]
//! replays. Recording failures are fatal to the stream.
//!
//! [`OfflineSource`]: super::OfflineSource

use super::Chunk;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while persisting the chunk stream.
#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("failed to create capture directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Persists chunks to a capture directory as they stream.
pub struct Recorder {
    dir: PathBuf,
}

impl Recorder {
    /// Creates the destination directory and a recorder writing into it.
    pub fn create(dir: &Path) -> Result<Self, RecordingError> {
        std::fs::create_dir_all(dir).map_err(|source| RecordingError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
        tracing::info!(dir = %dir.display(), "recording chunk stream");
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Writes one chunk synchronously.
    ///
    /// On a write failure the partial file is removed before the error is
    /// surfaced, so the directory never holds a truncated chunk.
    pub fn record(&mut self, chunk: &Chunk) -> Result<(), RecordingError> {
        let path = self.dir.join(format!("chunk_{:08}.txt", chunk.seq()));
        if let Err(source) = std::fs::write(&path, hex::encode(chunk.bytes())) {
            let _ = std::fs::remove_file(&path);
            return Err(RecordingError::Write { path, source });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_hex_chunk_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = Recorder::create(dir.path()).unwrap();

        recorder
            .record(&Chunk::new(vec![0xEF, 0xBE], 0))
            .unwrap();
        recorder.record(&Chunk::new(vec![0x01], 1)).unwrap();

        let first = std::fs::read_to_string(dir.path().join("chunk_00000000.txt")).unwrap();
        assert_eq!(first, "efbe");
        let second = std::fs::read_to_string(dir.path().join("chunk_00000001.txt")).unwrap();
        assert_eq!(second, "01");
    }

    #[test]
    fn test_creates_nested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let mut recorder = Recorder::create(&nested).unwrap();
        recorder.record(&Chunk::new(vec![0xFF], 0)).unwrap();
        assert!(nested.join("chunk_00000000.txt").exists());
    }
}
