//! Offline replay of a captured chunk directory.
//!
//! A capture directory holds one file per chunk, named
//! `chunk_<seq:08d>.txt`, containing the transfer bytes hex-encoded with
//! optional whitespace between bytes. Files are replayed in lexicographic
//! order, which for zero-padded names is also numeric order.

use super::{Chunk, ChunkSource, TransportError};
use std::path::{Path, PathBuf};

/// Chunk source backed by an on-disk capture directory.
pub struct OfflineSource {
    files: Vec<PathBuf>,
    pos: usize,
    /// Passes left after the current one; `None` means replay forever.
    passes_remaining: Option<u32>,
    seq: u64,
}

impl OfflineSource {
    /// Opens a capture directory for replay.
    ///
    /// `repeat` follows the public options contract: 0 means one pass,
    /// a positive N means N passes, and -1 means replay indefinitely.
    pub fn open(dir: &Path, repeat: i32) -> Result<Self, TransportError> {
        if !dir.is_dir() {
            return Err(TransportError::NotADirectory(dir.to_path_buf()));
        }

        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|source| TransportError::Io {
                path: dir.to_path_buf(),
                source,
            })?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        files.sort();

        let passes_remaining = match repeat {
            r if r < 0 => None,
            0 => Some(0),
            n => Some(n as u32 - 1),
        };

        tracing::info!(
            dir = %dir.display(),
            chunks = files.len(),
            "opened capture directory"
        );

        Ok(Self {
            files,
            pos: 0,
            passes_remaining,
            seq: 0,
        })
    }

    fn read_file(&self, path: &Path) -> Result<Vec<u8>, TransportError> {
        let text = std::fs::read_to_string(path).map_err(|source| TransportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        // Whitespace between bytes is permitted in capture files.
        let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        hex::decode(compact).map_err(|source| TransportError::ChunkEncoding {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl ChunkSource for OfflineSource {
    fn next_chunk(&mut self) -> Result<Option<Chunk>, TransportError> {
        if self.files.is_empty() {
            return Ok(None);
        }

        if self.pos == self.files.len() {
            match self.passes_remaining {
                Some(0) => return Ok(None),
                Some(ref mut left) => *left -= 1,
                None => {}
            }
            self.pos = 0;
            tracing::debug!(seq = self.seq, "restarting capture replay");
        }

        let data = self.read_file(&self.files[self.pos])?;
        self.pos += 1;

        let chunk = Chunk::new(data, self.seq);
        self.seq += 1;
        Ok(Some(chunk))
    }

    fn sequence(&self) -> u64 {
        self.seq
    }
}
