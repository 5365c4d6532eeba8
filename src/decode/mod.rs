//! Per-class slice decoders.
//!
//! Each decoder turns chunks of one semantic class into its domain
//! artifact: the VoSPI thermal raster, the visible JPEG, the telemetry
//! record, and the edge mask. Decode failures are desync values, not
//! stream errors; the assembler absorbs them locally.

pub mod agc;
pub mod edge;
pub mod telemetry;
pub mod thermal;
pub mod visible;

pub use edge::{EdgeDesync, EdgeMask};
pub use telemetry::{FfcState, ShutterState, Telemetry, TelemetryDesync};
pub use thermal::{PartialThermalFrame, ThermalDesync, ThermalRaster};
pub use visible::{PartialJpeg, VisibleDesync, VisibleImage};
