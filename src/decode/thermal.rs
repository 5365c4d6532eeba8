//! VoSPI thermal decoder.
//!
//! The thermal sensor serializes each raster as 164-byte row packets:
//!
//! ```text
//! +-- 2 B id --+-- 2 B crc --+-------- 160 B payload --------+
//! | disc | row |  (ignored)  |   80 x u16 big-endian words   |
//! +------------+-------------+-------------------------------+
//! ```
//!
//! The id's high nibble is the discriminator (0x0 data, 0xE telemetry
//! row, 0xF discard); the low 12 bits are the row number. Each word
//! carries a 14-bit radiometric count in its low bits; nonzero upper bits
//! mean the stream has desynchronized.

use thiserror::Error;

/// Rows in one thermal raster.
pub const IMAGE_ROWS: usize = 60;
/// Samples per row.
pub const ROW_WORDS: usize = 80;
/// On-wire length of one VoSPI packet.
pub const PACKET_LEN: usize = 164;
/// Largest legal radiometric count (14 bits).
pub const SAMPLE_MAX: u16 = (1 << 14) - 1;

const HEADER_LEN: usize = 4;
const DISC_DATA: u8 = 0x0;
const DISC_TELEMETRY: u8 = 0xE;
const DISC_DISCARD: u8 = 0xF;

/// Per-chunk invariant violations in the thermal stream.
///
/// A desync drops the partial raster being built but never the frame's
/// other artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThermalDesync {
    #[error("packet stream of {0} bytes is not a whole number of packets")]
    TruncatedPacket(usize),
    #[error("unrecognized packet discriminator {0:#x}")]
    BadDiscriminator(u8),
    #[error("data row {0} outside the {IMAGE_ROWS}-row raster")]
    RowOutOfRange(u16),
    #[error("row {0} received twice within one frame")]
    DuplicateRow(u16),
    #[error("sample with nonzero upper bits in row {0}")]
    SampleOverflow(u16),
}

/// Immutable 60x80 radiometric raster.
///
/// Every sample is a 14-bit count; the constructor enforces the range so
/// consumers can rely on `value <= SAMPLE_MAX` without rechecking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThermalRaster {
    samples: Vec<u16>,
}

impl ThermalRaster {
    fn new(samples: Vec<u16>) -> Self {
        debug_assert_eq!(samples.len(), IMAGE_ROWS * ROW_WORDS);
        debug_assert!(samples.iter().all(|&s| s <= SAMPLE_MAX));
        Self { samples }
    }

    /// Raster width in samples.
    #[inline]
    pub fn width(&self) -> usize {
        ROW_WORDS
    }

    /// Raster height in rows.
    #[inline]
    pub fn height(&self) -> usize {
        IMAGE_ROWS
    }

    /// Returns the sample at `(row, col)`.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> u16 {
        self.samples[row * ROW_WORDS + col]
    }

    /// Row-major sample slice.
    #[inline]
    pub fn samples(&self) -> &[u16] {
        &self.samples
    }

    /// Smallest and largest count in the raster.
    pub fn sample_range(&self) -> (u16, u16) {
        self.samples.iter().fold((SAMPLE_MAX, 0), |(lo, hi), &s| {
            (lo.min(s), hi.max(s))
        })
    }
}

/// Working state of one raster being reassembled.
///
/// Rows may arrive in any order across several chunks, but each row at
/// most once per frame. The row bitset decides completeness when the
/// closing frame-sync arrives.
#[derive(Debug, Default)]
pub struct PartialThermalFrame {
    samples: Vec<u16>,
    rows_seen: u64,
    telemetry_rows: Vec<Vec<u8>>,
}

impl PartialThermalFrame {
    /// Creates an empty partial raster.
    pub fn new() -> Self {
        Self {
            samples: vec![0; IMAGE_ROWS * ROW_WORDS],
            rows_seen: 0,
            telemetry_rows: Vec::new(),
        }
    }

    /// Consumes one chunk's worth of VoSPI packets.
    ///
    /// On a desync the partial is no longer trustworthy and should be
    /// dropped by the caller; successfully ingested rows before the bad
    /// packet are already lost with it.
    pub fn ingest(&mut self, data: &[u8]) -> Result<(), ThermalDesync> {
        if data.is_empty() || data.len() % PACKET_LEN != 0 {
            return Err(ThermalDesync::TruncatedPacket(data.len()));
        }

        for packet in data.chunks_exact(PACKET_LEN) {
            let id = u16::from_be_bytes([packet[0], packet[1]]);
            let discriminator = (id >> 12) as u8;
            let row = id & 0x0FFF;
            let payload = &packet[HEADER_LEN..];

            match discriminator {
                DISC_DISCARD => {}
                DISC_TELEMETRY => self.telemetry_rows.push(payload.to_vec()),
                DISC_DATA => self.write_row(row, payload)?,
                other => return Err(ThermalDesync::BadDiscriminator(other)),
            }
        }
        Ok(())
    }

    fn write_row(&mut self, row: u16, payload: &[u8]) -> Result<(), ThermalDesync> {
        if row as usize >= IMAGE_ROWS {
            return Err(ThermalDesync::RowOutOfRange(row));
        }
        if self.rows_seen & (1 << row) != 0 {
            return Err(ThermalDesync::DuplicateRow(row));
        }

        let base = row as usize * ROW_WORDS;
        for (col, word) in payload.chunks_exact(2).take(ROW_WORDS).enumerate() {
            let sample = u16::from_be_bytes([word[0], word[1]]);
            if sample > SAMPLE_MAX {
                return Err(ThermalDesync::SampleOverflow(row));
            }
            self.samples[base + col] = sample;
        }

        self.rows_seen |= 1 << row;
        Ok(())
    }

    /// Number of raster rows received so far.
    pub fn rows_received(&self) -> u32 {
        self.rows_seen.count_ones()
    }

    /// True once all 60 rows have been written.
    pub fn is_complete(&self) -> bool {
        self.rows_seen == (1u64 << IMAGE_ROWS) - 1
    }

    /// Takes the raw telemetry-row payloads collected so far.
    ///
    /// Rarely present on this device generation; offered to the telemetry
    /// parser as a side stream.
    pub fn take_telemetry_rows(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.telemetry_rows)
    }

    /// Finalizes a complete raster; `None` if rows are still missing.
    pub fn finalize(self) -> Option<ThermalRaster> {
        self.is_complete().then(|| ThermalRaster::new(self.samples))
    }

    /// Finalizes whatever rows arrived, zero-filling the rest.
    ///
    /// Used only under the opt-in partial-thermal policy; `None` when no
    /// row was received at all.
    pub fn finalize_partial(self) -> Option<ThermalRaster> {
        (self.rows_seen != 0).then(|| ThermalRaster::new(self.samples))
    }
}
