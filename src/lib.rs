//! FLIR One Pro streaming driver
//!
//! A userspace driver for the FLIR One Pro Gen-3 thermal camera. The
//! device multiplexes a 14-bit radiometric thermal sensor, a JPEG visible
//! camera, JSON telemetry, and edge-mask slices over one USB bulk
//! endpoint; this crate turns that opaque transfer stream into a
//! temporally ordered sequence of composite frames.
//!
//! # Architecture
//!
//! ```text
//! source (live usb | offline replay) ──> classify ──> decode ──> assemble
//!    │                                  thermal / visible /         │
//!    └── recorder (write-through)       telemetry / edge            v
//!                                                            FrameStream
//! ```
//!
//! # Example
//!
//! ```no_run
//! use flir_one::{FrameStream, OfflineOptions};
//!
//! let mut stream = FrameStream::open_offline("./chunks", &OfflineOptions::default())?;
//! while let Some(frame) = stream.next_frame()? {
//!     if let Some(thermal) = frame.thermal() {
//!         let (lo, hi) = thermal.sample_range();
//!         println!("frame {}: counts {lo}..{hi}", frame.idx());
//!     }
//! }
//! # Ok::<(), flir_one::StreamError>(())
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod assemble;
pub mod classify;
pub mod decode;
pub mod metrics;
pub mod source;
pub mod stream;

#[cfg(test)]
mod testutil;

// Re-export commonly used types at crate root
pub use assemble::{CompositeFrame, PipelineCounters};
pub use classify::{SliceClass, UnknownReason};
pub use decode::{EdgeMask, FfcState, ShutterState, Telemetry, ThermalRaster, VisibleImage};
pub use source::{Chunk, ChunkSource, LiveOptions, MockSource, OfflineOptions};
pub use stream::{FrameStream, StreamError};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
