//! Dreamcast PowerVR "twiddled" (Morton-order) textures and the VQ variants.

use crate::{
    decode::{palette, PixelFormat},
    error::{DecodeError, DecodeResult},
    image::{Image, ImageFormat},
    pixel::{convert, SBit},
};

// -------------------------------------------------------------------------------------------------

/// Bit-interleave map covering textures up to 4096x4096. For a square
/// twiddled texture, source index = `(TWIDDLE_MAP[x] << 1) | TWIDDLE_MAP[y]`.
pub const TWIDDLE_MAP: [u32; 4096] = build_twiddle_map();

const fn build_twiddle_map() -> [u32; 4096] {
    let mut map = [0u32; 4096];
    let mut i = 0;
    while i < 4096 {
        let mut j = 0;
        let mut k: u32 = 1;
        while k <= i as u32 {
            map[i] |= (i as u32 & k) << j;
            j += 1;
            k <<= 1;
        }
        i += 1;
    }
    map
}

fn pixel_fn_16(px_format: PixelFormat) -> DecodeResult<(fn(u16) -> u32, SBit)> {
    Ok(match px_format {
        PixelFormat::Argb1555 => {
            (convert::argb1555_to_argb32 as fn(u16) -> u32, SBit::new(5, 5, 5, 0, 1))
        }
        PixelFormat::Rgb565 => (convert::rgb565_to_argb32, SBit::new(5, 6, 5, 0, 0)),
        PixelFormat::Argb4444 => (convert::argb4444_to_argb32, SBit::new(4, 4, 4, 0, 4)),
        _ => return Err(DecodeError::InvalidPixelFormat(px_format as u32)),
    })
}

fn check_square(width: usize, height: usize) -> DecodeResult<()> {
    if width == 0 || height == 0 || width != height || width > 4096 {
        return Err(DecodeError::InvalidGeometry {
            width: width as u32,
            height: height as u32,
            reason: "twiddled textures must be square, at most 4096",
        });
    }
    Ok(())
}

/// Square twiddled 16-bit texture to ARGB32.
pub fn from_dreamcast_square_twiddled16(
    px_format: PixelFormat,
    width: usize,
    height: usize,
    img_buf: &[u8],
) -> DecodeResult<Image> {
    check_square(width, height)?;
    let expected = width * height * 2;
    if img_buf.len() < expected {
        return Err(DecodeError::Truncated { expected, got: img_buf.len() });
    }

    let (pxfunc, sbit) = pixel_fn_16(px_format)?;
    let mut img = Image::new(width, height, ImageFormat::Argb32)?;
    for y in 0..height {
        let dest = img.scanline_argb32_mut(y);
        for (x, px) in dest.iter_mut().enumerate() {
            let src_idx = ((TWIDDLE_MAP[x] << 1) | TWIDDLE_MAP[y]) as usize;
            *px = pxfunc(u16::from_le_bytes([img_buf[src_idx * 2], img_buf[src_idx * 2 + 1]]));
        }
    }
    img.set_sbit(sbit);
    Ok(img)
}

// -------------------------------------------------------------------------------------------------

/// Small VQ palette entry count when the texture has no mipmaps.
pub fn small_vq_palette_entries_no_mipmaps(width: usize) -> usize {
    if width <= 16 {
        8 * 4
    } else if width <= 32 {
        32 * 4
    } else if width <= 64 {
        128 * 4
    } else {
        256 * 4
    }
}

/// Small VQ palette entry count when the texture has mipmaps.
pub fn small_vq_palette_entries_with_mipmaps(width: usize) -> usize {
    if width <= 16 {
        16 * 4
    } else if width <= 32 {
        64 * 4
    } else if width <= 64 {
        128 * 4
    } else {
        256 * 4
    }
}

/// Vector-quantized texture to ARGB32. Each source byte is twiddle-addressed
/// in half-coordinates and selects a 2x2 block of palette entries.
pub fn from_dreamcast_vq16(
    px_format: PixelFormat,
    small_vq: bool,
    has_mipmaps: bool,
    width: usize,
    height: usize,
    img_buf: &[u8],
    pal_buf: &[u8],
) -> DecodeResult<Image> {
    check_square(width, height)?;
    if img_buf.is_empty() || pal_buf.is_empty() {
        return Err(DecodeError::Truncated { expected: 1, got: 0 });
    }

    let pal_entries = if small_vq {
        if has_mipmaps {
            small_vq_palette_entries_with_mipmaps(width)
        } else {
            small_vq_palette_entries_no_mipmaps(width)
        }
    } else {
        1024
    };

    let (_, sbit) = pixel_fn_16(px_format)?;
    let (pal, _) = palette::decode_palette_vq(px_format, pal_entries, pal_buf)?;

    let mut img = Image::new(width, height, ImageFormat::Argb32)?;
    for y in (0..height).step_by(2) {
        for x in (0..width).step_by(2) {
            let src_idx = ((TWIDDLE_MAP[x >> 1] << 1) | TWIDDLE_MAP[y >> 1]) as usize;
            if src_idx >= img_buf.len() {
                return Err(DecodeError::Truncated { expected: src_idx + 1, got: img_buf.len() });
            }

            // Each code addresses a 4-entry block of the palette.
            let pal_idx = img_buf[src_idx] as usize * 4;
            if pal_idx + 3 >= pal_entries {
                // Only reachable with Small VQ; full VQ always has 1024 entries.
                return Err(DecodeError::Corrupt("Small VQ palette index out of bounds"));
            }

            let block = [pal[pal_idx], pal[pal_idx + 2], pal[pal_idx + 1], pal[pal_idx + 3]];
            img.scanline_argb32_mut(y)[x] = block[0];
            img.scanline_argb32_mut(y)[x + 1] = block[1];
            img.scanline_argb32_mut(y + 1)[x] = block[2];
            img.scanline_argb32_mut(y + 1)[x + 1] = block[3];
        }
    }
    img.set_sbit(sbit);
    Ok(img)
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twiddle_map_interleaves_bits() {
        assert_eq!(TWIDDLE_MAP[0], 0);
        assert_eq!(TWIDDLE_MAP[1], 1);
        assert_eq!(TWIDDLE_MAP[2], 0b100);
        assert_eq!(TWIDDLE_MAP[3], 0b101);
        assert_eq!(TWIDDLE_MAP[0b1111], 0b01010101);
        // Every entry spreads bit k of i to bit 2k.
        for i in [5usize, 100, 4095] {
            let mut expected = 0u32;
            for k in 0..12 {
                expected |= (((i >> k) & 1) as u32) << (2 * k);
            }
            assert_eq!(TWIDDLE_MAP[i], expected);
        }
    }

    #[test]
    fn square_twiddled_2x2() {
        // Source order for 2x2: (0,0), (0,1), (1,0), (1,1).
        let words = [0xFFFFu16, 0x001F, 0xF800, 0x07E0];
        let buf: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        let img = from_dreamcast_square_twiddled16(PixelFormat::Rgb565, 2, 2, &buf).unwrap();
        assert_eq!(img.scanline_argb32(0)[0], 0xFFFFFFFF);
        assert_eq!(img.scanline_argb32(1)[0], 0xFF0000FF);
        assert_eq!(img.scanline_argb32(0)[1], 0xFFFF0000);
        assert_eq!(img.scanline_argb32(1)[1], 0xFF00FF00);
    }

    #[test]
    fn small_vq_palette_sizes_match_breakpoints() {
        assert_eq!(small_vq_palette_entries_no_mipmaps(16), 8 * 4);
        assert_eq!(small_vq_palette_entries_no_mipmaps(32), 32 * 4);
        assert_eq!(small_vq_palette_entries_no_mipmaps(64), 128 * 4);
        assert_eq!(small_vq_palette_entries_no_mipmaps(128), 256 * 4);
        assert_eq!(small_vq_palette_entries_with_mipmaps(16), 16 * 4);
        assert_eq!(small_vq_palette_entries_with_mipmaps(32), 64 * 4);
        assert_eq!(small_vq_palette_entries_with_mipmaps(64), 128 * 4);
        assert_eq!(small_vq_palette_entries_with_mipmaps(4096), 256 * 4);
    }

    #[test]
    fn vq_code_unrolls_to_2x2_block() {
        // One code (0) over a 2x2 texture; palette block 0..3 in ARGB4444.
        let pal: Vec<u8> = [0xF00Fu16, 0xF0F0, 0xFF00, 0xFFFF]
            .iter()
            .chain(std::iter::repeat(&0u16).take(1020))
            .flat_map(|w| w.to_le_bytes())
            .collect();
        let img =
            from_dreamcast_vq16(PixelFormat::Argb4444, false, false, 2, 2, &[0], &pal).unwrap();
        // top-left = pal[0], top-right = pal[2], bottom-left = pal[1], bottom-right = pal[3]
        assert_eq!(img.scanline_argb32(0)[0], 0xFF0000FF);
        assert_eq!(img.scanline_argb32(0)[1], 0xFFFF0000);
        assert_eq!(img.scanline_argb32(1)[0], 0xFF00FF00);
        assert_eq!(img.scanline_argb32(1)[1], 0xFFFFFFFF);
    }
}
