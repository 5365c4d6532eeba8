//! Synthetic chunk builders shared by pipeline tests.

use crate::classify::FRAME_SYNC_MAGIC;
use crate::decode::edge::EDGE_RLE_MAGIC;
use crate::decode::thermal::{IMAGE_ROWS, PACKET_LEN, ROW_WORDS};

/// Builds a 28-byte frame-sync slice.
pub fn sync_chunk(boundary_id: u32, timestamp: u32) -> Vec<u8> {
    let mut data = FRAME_SYNC_MAGIC.to_vec();
    data.extend_from_slice(&boundary_id.to_le_bytes());
    data.resize(20, 0);
    data.extend_from_slice(&timestamp.to_le_bytes());
    data.resize(28, 0);
    data
}

/// Builds one VoSPI data packet with every sample set to `value`.
pub fn thermal_packet(row: u16, value: u16) -> Vec<u8> {
    let mut packet = vec![0u8; PACKET_LEN];
    packet[..2].copy_from_slice(&row.to_be_bytes());
    for col in 0..ROW_WORDS {
        let offset = 4 + col * 2;
        packet[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
    }
    packet
}

/// One chunk per row for a complete raster, rows in order.
pub fn thermal_frame_chunks() -> Vec<Vec<u8>> {
    (0..IMAGE_ROWS as u16)
        .map(|row| thermal_packet(row, 1000 + row))
        .collect()
}

/// Encodes a small deterministic JPEG.
pub fn encode_test_jpeg(width: u32, height: u32) -> Vec<u8> {
    let raw: Vec<u8> = (0..width * height)
        .flat_map(|i| [(i % 251) as u8, 0x40, 0x80])
        .collect();
    let mut out = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, 90)
        .encode(&raw, width, height, image::ColorType::Rgb8)
        .unwrap();
    out
}

/// Splits a JPEG into `pieces` chunks, nudging split points so that no
/// continuation fragment starts with a byte the classifier treats as a
/// magic prefix.
pub fn split_jpeg(jpeg: &[u8], pieces: usize) -> Vec<Vec<u8>> {
    assert!(pieces >= 1 && jpeg.len() >= pieces * 4);
    let step = jpeg.len() / pieces;
    let mut cuts = vec![0];
    for i in 1..pieces {
        let mut cut = i * step;
        while cut + 2 < jpeg.len() && matches!(jpeg[cut], 0xFF | 0xEF | 0x4D | b'{') {
            cut += 1;
        }
        cuts.push(cut);
    }
    cuts.push(jpeg.len());
    cuts.windows(2).map(|w| jpeg[w[0]..w[1]].to_vec()).collect()
}

/// Builds a NUL-padded telemetry chunk from a JSON literal.
pub fn telemetry_chunk(json: &str) -> Vec<u8> {
    let mut data = json.as_bytes().to_vec();
    data.resize(data.len() + 16, 0);
    data
}

/// Builds an edge-mask slice from run lengths.
pub fn edge_chunk(width: u16, height: u16, runs: &[u16]) -> Vec<u8> {
    let mut data = EDGE_RLE_MAGIC.to_vec();
    data.extend_from_slice(&width.to_le_bytes());
    data.extend_from_slice(&height.to_le_bytes());
    for run in runs {
        data.extend_from_slice(&run.to_le_bytes());
    }
    data
}

/// An edge slice covering the full thermal raster with no set bits.
pub fn blank_edge_chunk() -> Vec<u8> {
    edge_chunk(
        ROW_WORDS as u16,
        IMAGE_ROWS as u16,
        &[4000, 0, 800, 0],
    )
}
