//! PlayStation 2 (SVR) address unswizzling.
//!
//! The GS stores 4-bpp and 8-bpp textures in an interlaced layout; textures
//! at or above the size thresholds (128 wide for 4-bpp, 128x64 for 8-bpp,
//! 64x64 for the 16-bit rectangle-swizzled type) need the inverse mapping
//! after decode. Algorithm after Dageron's unswizzle.

use crate::{
    error::{DecodeError, DecodeResult},
    image::{Image, ImageFormat},
};

const INTERLACE_MATRIX: [usize; 8] = [0x00, 0x10, 0x02, 0x12, 0x11, 0x01, 0x13, 0x03];
const MATRIX: [isize; 4] = [0, 1, -1, 0];
const TILE_MATRIX: [isize; 2] = [4, -4];

fn check_unswizzle_dims(img: &Image) -> DecodeResult<()> {
    // The interlace arithmetic walks 16-pixel groups horizontally and
    // 4-row groups vertically; anything else would read out of bounds.
    if img.width() % 16 != 0 || img.height() % 4 != 0 {
        return Err(DecodeError::InvalidGeometry {
            width: img.width() as u32,
            height: img.height() as u32,
            reason: "swizzled texture dimensions must be multiples of 16x4",
        });
    }
    Ok(())
}

/// Computes, for logical `(x, y)`, the swizzled source offset and the
/// destination position the source pixel lands on.
#[inline]
fn unswizzle_site(x: usize, y: usize, width: usize) -> (usize, usize, usize) {
    let odd_row = y & 1 != 0;
    let num1 = (y / 4) & 1;
    let num2 = (x / 4) & 1;
    let num3 = y % 4;
    let mut num4 = (x / 4) % 4;
    if odd_row {
        num4 += 4;
    }
    let num5 = (x * 4) % 16;
    let num6 = (x / 16) * 32;
    let mut num7 = y * width;
    if odd_row {
        num7 -= width;
    }

    let xx = (x as isize + num1 as isize * TILE_MATRIX[num2]) as usize;
    let yy = (y as isize + MATRIX[num3]) as usize;
    let i = INTERLACE_MATRIX[num4] + num5 + num6 + num7;
    (i, xx, yy)
}

/// Unswizzles a CI8 image (covers decoded 4-bpp as well, since CI4 expands
/// to CI8 before this pass). Returns a new image; palette and metadata
/// carry over.
pub fn svr_unswizzle_ci8(src: &Image) -> DecodeResult<Image> {
    debug_assert_eq!(src.format(), ImageFormat::Ci8);
    check_unswizzle_dims(src)?;

    let (width, height) = (src.width(), src.height());
    let mut out = Image::new(width, height, ImageFormat::Ci8)?;
    if let (Some(dst_pal), Some(src_pal)) = (out.palette_mut(), src.palette()) {
        dst_pal.copy_from_slice(src_pal);
    }
    out.set_tr_idx(src.tr_idx());
    if let Some(sbit) = src.sbit() {
        out.set_sbit(sbit);
    }

    for y in 0..height {
        for x in 0..width {
            let (i, xx, yy) = unswizzle_site(x, y, width);
            let px = src.scanline(i / width)[i % width];
            out.scanline_mut(yy)[xx] = px;
        }
    }
    Ok(out)
}

/// Unswizzles a decoded 16-bit texture (already converted to ARGB32).
pub fn svr_unswizzle_argb32(src: &Image) -> DecodeResult<Image> {
    debug_assert_eq!(src.format(), ImageFormat::Argb32);
    check_unswizzle_dims(src)?;

    let (width, height) = (src.width(), src.height());
    let mut out = Image::new(width, height, ImageFormat::Argb32)?;
    if let Some(sbit) = src.sbit() {
        out.set_sbit(sbit);
    }

    for y in 0..height {
        for x in 0..width {
            let (i, xx, yy) = unswizzle_site(x, y, width);
            let px = src.scanline_argb32(i / width)[i % width];
            out.scanline_argb32_mut(yy)[xx] = px;
        }
    }
    Ok(out)
}

/// Transposes bits 3 and 4 of every byte:
/// `b' = (b & 0xE7) | ((b & 0x10) >> 1) | ((b & 0x08) << 1)`.
///
/// SVR 8-bit image data stores palette indices with these two bits swapped;
/// swapping them in the image keeps the palette in its on-disk order.
pub fn svr_swap_index_bits(img_buf: &mut [u8]) {
    for b in img_buf {
        *b = (*b & 0xE7) | ((*b & 0x10) >> 1) | ((*b & 0x08) << 1);
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_bit_swap_is_an_involution() {
        let mut data: Vec<u8> = (0..=255).collect();
        svr_swap_index_bits(&mut data);
        assert_eq!(data[0x08], 0x10);
        assert_eq!(data[0x10], 0x08);
        assert_eq!(data[0x18], 0x18);
        assert_eq!(data[0xE7], 0xE7);
        svr_swap_index_bits(&mut data);
        for (i, b) in data.iter().enumerate() {
            assert_eq!(i as u8, *b);
        }
    }

    #[test]
    fn unswizzle_is_a_permutation() {
        // Every source pixel must land exactly once.
        let width = 128;
        let height = 64;
        let mut img = Image::new(width, height, ImageFormat::Ci8).unwrap();
        for y in 0..height {
            for x in 0..width {
                img.scanline_mut(y)[x] = ((y * width + x) % 251) as u8;
            }
        }
        let out = svr_unswizzle_ci8(&img).unwrap();
        let mut src_hist = [0u32; 256];
        let mut dst_hist = [0u32; 256];
        for y in 0..height {
            for x in 0..width {
                src_hist[img.scanline(y)[x] as usize] += 1;
                dst_hist[out.scanline(y)[x] as usize] += 1;
            }
        }
        assert_eq!(src_hist, dst_hist);
    }

    #[test]
    fn rejects_unaligned_dimensions() {
        let img = Image::new(6, 6, ImageFormat::Ci8).unwrap();
        assert!(svr_unswizzle_ci8(&img).is_err());
    }
}
