//! Legacy AGC slice geometry.
//!
//! Older firmware streams an 8-bit gain-controlled thermal image as a
//! full 32 KiB slice: a 256x128 buffer padded for GPU alignment with the
//! active 160x120 region centered inside it. The path is unreachable on
//! current hardware, so the classifier tags these slices and the
//! assembler drops them; only the layout constants are kept so the
//! secondary path stays documented.

/// On-wire length of one AGC slice.
pub const AGC_SLICE_BYTES: usize = PADDED_WIDTH * PADDED_HEIGHT;

/// Padded buffer width.
pub const PADDED_WIDTH: usize = 256;
/// Padded buffer height.
pub const PADDED_HEIGHT: usize = 128;

/// Active image width.
pub const ACTIVE_WIDTH: usize = 160;
/// Active image height.
pub const ACTIVE_HEIGHT: usize = 120;

/// Top-left corner of the centered active region, as `(row, col)`.
pub fn active_origin() -> (usize, usize) {
    (
        (PADDED_HEIGHT - ACTIVE_HEIGHT) / 2,
        (PADDED_WIDTH - ACTIVE_WIDTH) / 2,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_buffer_fills_one_slice() {
        assert_eq!(AGC_SLICE_BYTES, 32 * 1024);
    }

    #[test]
    fn test_active_region_centered() {
        let (row, col) = active_origin();
        assert_eq!(row, 4);
        assert_eq!(col, 48);
        assert!(row + ACTIVE_HEIGHT <= PADDED_HEIGHT);
        assert!(col + ACTIVE_WIDTH <= PADDED_WIDTH);
    }
}
