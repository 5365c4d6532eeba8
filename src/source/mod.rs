//! Transport backends producing the raw chunk stream.
//!
//! This module provides a trait-based abstraction over the two ways the
//! driver can obtain USB slices: a live bulk IN endpoint and replay of an
//! on-disk capture directory. A mock implementation is provided for
//! testing the pipeline without hardware.

mod chunk;
mod config;
mod offline;
mod recorder;

#[cfg(feature = "usb")]
mod live;

pub use chunk::{Chunk, CHUNK_BYTES};
pub use config::{ConfigError, FileConfig, LiveOptions, OfflineOptions, OutputConfig};
pub use offline::OfflineSource;
pub use recorder::{Recorder, RecordingError};

#[cfg(feature = "usb")]
pub use live::{HandshakeError, LiveSource, PRODUCT_ID, VENDOR_ID};

use std::collections::VecDeque;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal transport failures.
///
/// Anything surfaced here terminates the stream; recoverable conditions
/// (a read timeout on the live endpoint) are reported as zero-length
/// heartbeat chunks instead.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{0} is not a capture directory")]
    NotADirectory(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{path} is not a hex-encoded chunk: {source}")]
    ChunkEncoding {
        path: PathBuf,
        source: hex::FromHexError,
    },
    #[error("device disconnected")]
    Disconnected,
    #[cfg(feature = "usb")]
    #[error("bulk transfer failed: {0}")]
    Usb(#[from] rusb::Error),
}

/// Trait for chunk stream implementations.
///
/// `next_chunk` returns `Ok(None)` when the stream is exhausted (offline
/// replay only; the live backend never ends on its own). Sequence indices
/// are strictly increasing and gap-free within one stream.
pub trait ChunkSource {
    /// Produces the next chunk, blocking if necessary.
    fn next_chunk(&mut self) -> Result<Option<Chunk>, TransportError>;

    /// Returns the sequence index the next chunk will carry.
    fn sequence(&self) -> u64;
}

/// Scripted chunk source for tests and hardware-free development.
///
/// Yields a fixed list of payloads in order, then either ends the stream
/// or raises a transport error, depending on how it was constructed.
#[derive(Debug, Default)]
pub struct MockSource {
    queue: VecDeque<Vec<u8>>,
    seq: u64,
    fail_at_end: bool,
}

impl MockSource {
    /// Creates a source that yields `payloads` and then ends cleanly.
    pub fn new(payloads: Vec<Vec<u8>>) -> Self {
        Self {
            queue: payloads.into(),
            seq: 0,
            fail_at_end: false,
        }
    }

    /// Creates a source that yields `payloads` and then reports the
    /// device as disconnected, simulating a cable pull mid-stream.
    pub fn failing(payloads: Vec<Vec<u8>>) -> Self {
        Self {
            queue: payloads.into(),
            seq: 0,
            fail_at_end: true,
        }
    }
}

impl ChunkSource for MockSource {
    fn next_chunk(&mut self) -> Result<Option<Chunk>, TransportError> {
        match self.queue.pop_front() {
            Some(payload) => {
                let chunk = Chunk::new(payload, self.seq);
                self.seq += 1;
                Ok(Some(chunk))
            }
            None if self.fail_at_end => Err(TransportError::Disconnected),
            None => Ok(None),
        }
    }

    fn sequence(&self) -> u64 {
        self.seq
    }
}
