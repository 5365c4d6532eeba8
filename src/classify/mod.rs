//! Slice classification.
//!
//! Every chunk read from the transport is assigned one semantic class
//! before decoding. Rules are applied in a fixed order so that
//! unambiguous magic prefixes win over payload heuristics; the only
//! stateful rule (a JPEG continuation has no magic of its own) asks the
//! frame assembler whether an image is currently being collected instead
//! of keeping global state.

use crate::decode::agc::AGC_SLICE_BYTES;
use crate::decode::edge::EDGE_RLE_MAGIC;
use crate::decode::thermal::{IMAGE_ROWS, PACKET_LEN};
use crate::decode::visible::{JPEG_EOI, JPEG_SOI};
use crate::source::Chunk;

/// Magic prefix of a frame-boundary sync slice.
pub const FRAME_SYNC_MAGIC: [u8; 4] = [0xEF, 0xBE, 0x00, 0x00];

/// Byte offset of the optional device timestamp within a sync slice.
const SYNC_TIMESTAMP_OFFSET: usize = 20;

/// Semantic class of one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SliceClass {
    /// Frame boundary marker.
    FrameSync {
        /// Boundary counter reported by the device.
        boundary_id: u32,
        /// Device timestamp, when the capture carries one.
        timestamp: Option<u32>,
    },
    /// One or more VoSPI thermal row packets.
    ThermalPacket {
        /// Lowest and highest data row seen, if any data packet is present.
        row_range: Option<(u16, u16)>,
    },
    /// Fragment of a visible-camera JPEG.
    VisibleJpeg {
        /// Fragment starts with the SOI marker.
        is_first: bool,
        /// Fragment completes the image.
        is_last: bool,
    },
    /// JSON telemetry record.
    TelemetryJson,
    /// Run-length-encoded edge mask.
    EdgeRle,
    /// Legacy 8-bit AGC thermal slice; tagged and dropped.
    AgcLegacy,
    /// Unclassifiable slice.
    Unknown {
        /// The discriminator stage that rejected the slice.
        reason: UnknownReason,
    },
}

/// Why a slice failed classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownReason {
    /// Zero-length heartbeat chunk.
    Empty,
    /// No magic prefix and no payload shape matched.
    UnrecognizedPrefix,
    /// Sized like a VoSPI packet stream but with invalid packet headers.
    MalformedVospi,
}

/// Answers the one stateful classification question.
///
/// Implemented by the frame assembler, which owns the partial JPEG.
pub trait JpegTracker {
    /// True while a JPEG started in an earlier chunk is still open.
    fn jpeg_in_progress(&self) -> bool;
}

/// Classifies one chunk.
pub fn classify<T: JpegTracker>(chunk: &Chunk, tracker: &T) -> SliceClass {
    let data = chunk.bytes();

    if data.is_empty() {
        return SliceClass::Unknown {
            reason: UnknownReason::Empty,
        };
    }

    // Rule 1: frame-sync magic plus boundary counter.
    if data.len() >= 8 && data[..4] == FRAME_SYNC_MAGIC {
        let boundary_id = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        return SliceClass::FrameSync {
            boundary_id,
            timestamp: sync_timestamp(data),
        };
    }

    // Rule 2: a new JPEG always opens with SOI.
    if data.starts_with(&JPEG_SOI) {
        return SliceClass::VisibleJpeg {
            is_first: true,
            is_last: data.ends_with(&JPEG_EOI),
        };
    }

    // Rule 3: continuation fragments carry no magic of their own.
    if tracker.jpeg_in_progress() && !starts_with_known_magic(data) {
        return SliceClass::VisibleJpeg {
            is_first: false,
            is_last: contains_eoi(data),
        };
    }

    // Rule 4: telemetry is a JSON object, padded with NULs.
    if data[0] == b'{' && json_object_complete(data) {
        return SliceClass::TelemetryJson;
    }

    // Rule 5: edge-mask magic.
    if data.starts_with(&EDGE_RLE_MAGIC) {
        return SliceClass::EdgeRle;
    }

    // Rule 6: VoSPI packet shape.
    match vospi_row_range(data) {
        VospiShape::Packets(row_range) => return SliceClass::ThermalPacket { row_range },
        VospiShape::BadHeaders => {
            return SliceClass::Unknown {
                reason: UnknownReason::MalformedVospi,
            }
        }
        VospiShape::NotVospi => {}
    }

    // Rule 7: legacy AGC slices are full 32 KiB raster dumps.
    if data.len() == AGC_SLICE_BYTES {
        return SliceClass::AgcLegacy;
    }

    SliceClass::Unknown {
        reason: UnknownReason::UnrecognizedPrefix,
    }
}

fn sync_timestamp(data: &[u8]) -> Option<u32> {
    if data.len() < SYNC_TIMESTAMP_OFFSET + 4 {
        return None;
    }
    let raw = u32::from_le_bytes([
        data[SYNC_TIMESTAMP_OFFSET],
        data[SYNC_TIMESTAMP_OFFSET + 1],
        data[SYNC_TIMESTAMP_OFFSET + 2],
        data[SYNC_TIMESTAMP_OFFSET + 3],
    ]);
    (raw != 0).then_some(raw)
}

fn starts_with_known_magic(data: &[u8]) -> bool {
    data.starts_with(&FRAME_SYNC_MAGIC)
        || data.starts_with(&JPEG_SOI)
        || data.starts_with(&EDGE_RLE_MAGIC)
        || data[0] == b'{'
}

fn contains_eoi(data: &[u8]) -> bool {
    data.windows(2).any(|w| w == JPEG_EOI)
}

/// Checks that the slice opens a JSON object that closes, and that the
/// bytes up to the closing brace are valid UTF-8.
fn json_object_complete(data: &[u8]) -> bool {
    let mut depth = 0usize;
    for (i, &b) in data.iter().enumerate() {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return std::str::from_utf8(&data[..=i]).is_ok();
                }
            }
            _ => {}
        }
    }
    false
}

enum VospiShape {
    Packets(Option<(u16, u16)>),
    BadHeaders,
    NotVospi,
}

fn vospi_row_range(data: &[u8]) -> VospiShape {
    if data.len() % PACKET_LEN != 0 {
        return VospiShape::NotVospi;
    }

    let mut range: Option<(u16, u16)> = None;
    for packet in data.chunks_exact(PACKET_LEN) {
        let id = u16::from_be_bytes([packet[0], packet[1]]);
        let discriminator = (id >> 12) as u8;
        let row = id & 0x0FFF;
        match discriminator {
            0x0 => {
                if row as usize >= IMAGE_ROWS {
                    return VospiShape::BadHeaders;
                }
                range = Some(match range {
                    Some((lo, hi)) => (lo.min(row), hi.max(row)),
                    None => (row, row),
                });
            }
            0xE | 0xF => {}
            _ => return VospiShape::BadHeaders,
        }
    }
    VospiShape::Packets(range)
}
