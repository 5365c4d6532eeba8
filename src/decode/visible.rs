//! Visible-camera JPEG reassembly and decode.
//!
//! The visible image arrives as JPEG fragments spread over one or more
//! chunks. Fragments are concatenated in arrival order; the image is
//! finalized on the fragment containing the EOI marker, validated at the
//! byte level, and decoded to a BGR raster.

use thiserror::Error;

/// JPEG start-of-image marker.
pub(crate) const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
/// JPEG end-of-image marker.
pub(crate) const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// Nominal visible raster width.
pub const VISIBLE_WIDTH: u32 = 1440;
/// Nominal visible raster height.
pub const VISIBLE_HEIGHT: u32 = 1080;

/// Corruption detected while finalizing a visible image.
///
/// The partial is dropped; the frame's other artifacts are unaffected.
#[derive(Debug, Error)]
pub enum VisibleDesync {
    #[error("buffer does not begin with a start-of-image marker")]
    MissingSoi,
    #[error("no end-of-image marker in finalized buffer")]
    MissingEoi,
    #[error("second start-of-image marker at offset {0}")]
    InteriorSoi(usize),
    #[error("jpeg decode failed: {0}")]
    Decode(#[from] image::ImageError),
}

/// Growing buffer of JPEG fragments for the frame in progress.
#[derive(Debug, Default)]
pub struct PartialJpeg {
    buf: Vec<u8>,
}

impl PartialJpeg {
    /// Creates an empty partial image.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one fragment in arrival order.
    pub fn append(&mut self, fragment: &[u8]) {
        self.buf.extend_from_slice(fragment);
    }

    /// Bytes accumulated so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True when no fragment has arrived yet.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Validates and decodes the accumulated buffer.
    ///
    /// The buffer must open with SOI and contain an EOI; bytes past the
    /// first EOI are device padding and are cut off. A second SOI inside
    /// the image marks an interleaving error and rejects the whole
    /// partial.
    pub fn finalize(self) -> Result<VisibleImage, VisibleDesync> {
        let mut jpeg = self.buf;

        if !jpeg.starts_with(&JPEG_SOI) {
            return Err(VisibleDesync::MissingSoi);
        }

        let eoi = jpeg
            .windows(2)
            .position(|w| w == JPEG_EOI)
            .ok_or(VisibleDesync::MissingEoi)?;
        jpeg.truncate(eoi + 2);

        if let Some(pos) = jpeg[1..].windows(2).position(|w| w == JPEG_SOI) {
            return Err(VisibleDesync::InteriorSoi(pos + 1));
        }

        let decoded = image::load_from_memory(&jpeg)?.to_rgb8();
        let (width, height) = decoded.dimensions();

        // The device delivers BGR; swap channels once at decode time.
        let mut bgr = decoded.into_raw();
        for pixel in bgr.chunks_exact_mut(3) {
            pixel.swap(0, 2);
        }

        Ok(VisibleImage {
            jpeg,
            bgr,
            width,
            height,
        })
    }
}

/// Decoded visible-camera image.
///
/// Carries both the compressed bytes exactly as received (truncated at
/// EOI) and the decoded BGR raster.
#[derive(Clone)]
pub struct VisibleImage {
    jpeg: Vec<u8>,
    bgr: Vec<u8>,
    width: u32,
    height: u32,
}

impl VisibleImage {
    /// The validated JPEG bytes.
    #[inline]
    pub fn as_jpeg(&self) -> &[u8] {
        &self.jpeg
    }

    /// Row-major BGR samples, three bytes per pixel.
    #[inline]
    pub fn bgr(&self) -> &[u8] {
        &self.bgr
    }

    /// Image width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Image height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }
}

impl std::fmt::Debug for VisibleImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisibleImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("jpeg_bytes", &self.jpeg.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_test_jpeg(width: u32, height: u32) -> Vec<u8> {
        let raw: Vec<u8> = (0..width * height)
            .flat_map(|i| [(i % 251) as u8, 0x40, 0x80])
            .collect();
        let mut out = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, 90)
            .encode(&raw, width, height, image::ColorType::Rgb8)
            .unwrap();
        out
    }

    #[test]
    fn test_single_fragment_image() {
        let jpeg = encode_test_jpeg(16, 8);
        let mut partial = PartialJpeg::new();
        partial.append(&jpeg);

        let image = partial.finalize().unwrap();
        assert_eq!(image.width(), 16);
        assert_eq!(image.height(), 8);
        assert!(image.as_jpeg().starts_with(&JPEG_SOI));
        assert!(image.as_jpeg().ends_with(&JPEG_EOI));
        assert_eq!(image.bgr().len(), 16 * 8 * 3);
    }

    #[test]
    fn test_fragments_concatenate_in_order() {
        let jpeg = encode_test_jpeg(16, 16);
        let mid = jpeg.len() / 2;

        let mut partial = PartialJpeg::new();
        partial.append(&jpeg[..mid]);
        partial.append(&jpeg[mid..]);

        let image = partial.finalize().unwrap();
        assert_eq!(image.as_jpeg(), &jpeg[..]);
    }

    #[test]
    fn test_padding_after_eoi_trimmed() {
        let jpeg = encode_test_jpeg(8, 8);
        let mut partial = PartialJpeg::new();
        partial.append(&jpeg);
        partial.append(&[0u8; 32]);

        let image = partial.finalize().unwrap();
        assert!(image.as_jpeg().ends_with(&JPEG_EOI));
        assert_eq!(image.as_jpeg().len(), jpeg.len());
    }

    #[test]
    fn test_missing_soi_rejected() {
        let mut partial = PartialJpeg::new();
        partial.append(&[0x00, 0x01, 0xFF, 0xD9]);
        assert!(matches!(
            partial.finalize(),
            Err(VisibleDesync::MissingSoi)
        ));
    }

    #[test]
    fn test_missing_eoi_rejected() {
        let mut partial = PartialJpeg::new();
        partial.append(&[0xFF, 0xD8, 0x00, 0x01]);
        assert!(matches!(
            partial.finalize(),
            Err(VisibleDesync::MissingEoi)
        ));
    }

    #[test]
    fn test_interior_soi_rejected() {
        let jpeg = encode_test_jpeg(8, 8);
        let mid = jpeg.len() / 2;

        let mut partial = PartialJpeg::new();
        partial.append(&jpeg[..mid]);
        // A stray restart of the image stream inside the buffer.
        partial.append(&JPEG_SOI);
        partial.append(&jpeg[mid..]);

        assert!(matches!(
            partial.finalize(),
            Err(VisibleDesync::InteriorSoi(_))
        ));
    }
}
