//! Linear (untiled) raster decoders. Every function takes the source
//! dimensions, a pixel buffer, and an optional row stride in bytes
//! (`0` means tightly packed rows).

use paste::paste;

use crate::{
    decode::{
        linear_simd,
        palette::{self, DecodedPalette},
        PixelFormat,
    },
    error::{DecodeError, DecodeResult},
    image::{Image, ImageFormat},
    pixel::{convert, SBit},
};

// -------------------------------------------------------------------------------------------------

/// Resolves the source stride in bytes. `stride == 0` means tightly packed;
/// otherwise it must be a whole number of pixels and cover a full row.
fn resolve_stride(stride: usize, width: usize, bytespp: usize) -> DecodeResult<usize> {
    let row_bytes = width * bytespp;
    if stride == 0 {
        return Ok(row_bytes);
    }
    if stride % bytespp != 0 || stride < row_bytes {
        return Err(DecodeError::InvalidGeometry {
            width: width as u32,
            height: 0,
            reason: "invalid source stride",
        });
    }
    Ok(stride)
}

fn check_len(buf: &[u8], expected: usize) -> DecodeResult<()> {
    if buf.len() < expected {
        return Err(DecodeError::Truncated { expected, got: buf.len() });
    }
    Ok(())
}

// -------------------------------------------------------------------------------------------------

/// CI4 to CI8 with a decoded palette. `msn_left` selects which nibble of
/// each source byte is the left pixel.
pub fn from_linear_ci4_with(
    pal: &DecodedPalette,
    msn_left: bool,
    width: usize,
    height: usize,
    img_buf: &[u8],
    stride: usize,
) -> DecodeResult<Image> {
    if width % 2 != 0 {
        return Err(DecodeError::InvalidGeometry {
            width: width as u32,
            height: height as u32,
            reason: "CI4 width must be even",
        });
    }
    let src_stride = if stride == 0 { width / 2 } else { stride };
    if src_stride < width / 2 {
        return Err(DecodeError::InvalidGeometry {
            width: width as u32,
            height: height as u32,
            reason: "invalid source stride",
        });
    }
    check_len(img_buf, src_stride * height)?;

    let mut img = Image::new(width, height, ImageFormat::Ci8)?;
    img.palette_mut().unwrap()[..].copy_from_slice(&pal.colors[..]);
    img.set_tr_idx(pal.tr_idx);
    img.set_sbit(pal.sbit);

    for y in 0..height {
        let src = &img_buf[y * src_stride..y * src_stride + width / 2];
        let dest = &mut img.scanline_mut(y)[..width];
        if msn_left {
            for (pair, &b) in dest.chunks_exact_mut(2).zip(src) {
                pair[0] = b >> 4;
                pair[1] = b & 0x0F;
            }
        } else {
            for (pair, &b) in dest.chunks_exact_mut(2).zip(src) {
                pair[0] = b & 0x0F;
                pair[1] = b >> 4;
            }
        }
    }
    Ok(img)
}

/// CI4 to CI8 with a 16-entry little-endian palette blob.
pub fn from_linear_ci4(
    pal_format: PixelFormat,
    msn_left: bool,
    width: usize,
    height: usize,
    img_buf: &[u8],
    pal_buf: &[u8],
    stride: usize,
) -> DecodeResult<Image> {
    let pal = palette::decode_palette(pal_format, 16, pal_buf)?;
    from_linear_ci4_with(&pal, msn_left, width, height, img_buf, stride)
}

/// CI8 to CI8 with a decoded palette; pixel rows are copied verbatim.
pub fn from_linear_ci8_with(
    pal: &DecodedPalette,
    width: usize,
    height: usize,
    img_buf: &[u8],
    stride: usize,
) -> DecodeResult<Image> {
    let src_stride = resolve_stride(stride, width, 1)?;
    check_len(img_buf, src_stride * height)?;

    let mut img = Image::new(width, height, ImageFormat::Ci8)?;
    img.palette_mut().unwrap()[..].copy_from_slice(&pal.colors[..]);
    img.set_tr_idx(pal.tr_idx);
    img.set_sbit(pal.sbit);

    if src_stride == img.stride() {
        // Row layouts agree; one copy covers the whole buffer.
        let total = src_stride * height;
        img.bits_mut()[..total].copy_from_slice(&img_buf[..total]);
    } else {
        for y in 0..height {
            let src = &img_buf[y * src_stride..y * src_stride + width];
            img.scanline_mut(y)[..width].copy_from_slice(src);
        }
    }
    Ok(img)
}

/// CI8 to CI8 with a 256-entry little-endian palette blob.
pub fn from_linear_ci8(
    pal_format: PixelFormat,
    width: usize,
    height: usize,
    img_buf: &[u8],
    pal_buf: &[u8],
    stride: usize,
) -> DecodeResult<Image> {
    let pal = palette::decode_palette(pal_format, 256, pal_buf)?;
    from_linear_ci8_with(&pal, width, height, img_buf, stride)
}

// -------------------------------------------------------------------------------------------------

fn mono_row_bytes(width: usize, bits: usize) -> usize {
    (width * bits + 7) / 8
}

/// 1-bpp to CI8 with a white/black palette. The MSB of each byte is the
/// left-most pixel; widths that are not byte-aligned discard trailing bits.
pub fn from_linear_mono(
    width: usize,
    height: usize,
    img_buf: &[u8],
    stride: usize,
) -> DecodeResult<Image> {
    let row_bytes = mono_row_bytes(width, 1);
    let src_stride = if stride == 0 { row_bytes } else { stride };
    if src_stride < row_bytes {
        return Err(DecodeError::InvalidGeometry {
            width: width as u32,
            height: height as u32,
            reason: "invalid source stride",
        });
    }
    check_len(img_buf, src_stride * height)?;

    let mut img = Image::new(width, height, ImageFormat::Ci8)?;
    let palette = img.palette_mut().unwrap();
    palette[0] = 0xFFFF_FFFF;
    palette[1] = 0xFF00_0000;
    img.set_sbit(SBit::new(1, 1, 1, 1, 0));

    for y in 0..height {
        let src = &img_buf[y * src_stride..];
        let dest = &mut img.scanline_mut(y)[..width];
        for (x, px) in dest.iter_mut().enumerate() {
            *px = (src[x / 8] >> (7 - (x % 8))) & 1;
        }
    }
    Ok(img)
}

/// 2-bpp grayscale to CI8 with the `{FF, C0, 80, 00}` ramp.
pub fn from_linear_gray_2bpp(
    width: usize,
    height: usize,
    img_buf: &[u8],
    stride: usize,
) -> DecodeResult<Image> {
    let row_bytes = mono_row_bytes(width, 2);
    let src_stride = if stride == 0 { row_bytes } else { stride };
    if src_stride < row_bytes {
        return Err(DecodeError::InvalidGeometry {
            width: width as u32,
            height: height as u32,
            reason: "invalid source stride",
        });
    }
    check_len(img_buf, src_stride * height)?;

    let mut img = Image::new(width, height, ImageFormat::Ci8)?;
    let palette = img.palette_mut().unwrap();
    palette[0] = 0xFFFF_FFFF;
    palette[1] = 0xFFC0_C0C0;
    palette[2] = 0xFF80_8080;
    palette[3] = 0xFF00_0000;
    img.set_sbit(SBit::new(2, 2, 2, 2, 0));

    for y in 0..height {
        let src = &img_buf[y * src_stride..];
        let dest = &mut img.scanline_mut(y)[..width];
        for (x, px) in dest.iter_mut().enumerate() {
            *px = (src[x / 4] >> (6 - 2 * (x % 4))) & 3;
        }
    }
    Ok(img)
}

/// 1-bpp icon with a 1-bpp transparency mask (Windows ICO/CUR). Bit 0 in the
/// image is black, bit 1 white; a set mask bit makes the pixel transparent
/// via a dedicated palette index.
pub fn from_linear_mono_win_icon(
    width: usize,
    height: usize,
    img_buf: &[u8],
    mask_buf: &[u8],
    stride: usize,
) -> DecodeResult<Image> {
    let row_bytes = mono_row_bytes(width, 1);
    let src_stride = if stride == 0 { row_bytes } else { stride };
    if src_stride < row_bytes {
        return Err(DecodeError::InvalidGeometry {
            width: width as u32,
            height: height as u32,
            reason: "invalid source stride",
        });
    }
    check_len(img_buf, src_stride * height)?;
    check_len(mask_buf, src_stride * height)?;

    const TRANSPARENT_IDX: u8 = 2;
    let mut img = Image::new(width, height, ImageFormat::Ci8)?;
    let palette = img.palette_mut().unwrap();
    palette[0] = 0xFF00_0000;
    palette[1] = 0xFFFF_FFFF;
    palette[TRANSPARENT_IDX as usize] = 0x0000_0000;
    img.set_tr_idx(Some(TRANSPARENT_IDX));
    img.set_sbit(SBit::new(1, 1, 1, 1, 1));

    for y in 0..height {
        let src = &img_buf[y * src_stride..];
        let mask = &mask_buf[y * src_stride..];
        let dest = &mut img.scanline_mut(y)[..width];
        for (x, px) in dest.iter_mut().enumerate() {
            let bit = 7 - (x % 8);
            if (mask[x / 8] >> bit) & 1 != 0 {
                *px = TRANSPARENT_IDX;
            } else {
                *px = (src[x / 8] >> bit) & 1;
            }
        }
    }
    Ok(img)
}

// -------------------------------------------------------------------------------------------------

macro_rules! linear_loop {
    // One conversion arm: read a source unit per pixel, convert, store.
    ($img:ident, $img_buf:ident, $src_stride:ident, $width:ident, $height:ident,
     $unit:literal, $read:expr, $conv:path, $sbit:expr) => {{
        for y in 0..$height {
            let src = &$img_buf[y * $src_stride..];
            let dest = $img.scanline_argb32_mut(y);
            for (x, px) in dest.iter_mut().enumerate() {
                let off = x * $unit;
                #[allow(clippy::redundant_closure_call)]
                {
                    *px = $conv(($read)(&src[off..off + $unit]));
                }
            }
        }
        $img.set_sbit($sbit);
    }};
}

fn read_le16(b: &[u8]) -> u16 {
    u16::from_le_bytes([b[0], b[1]])
}

fn read_le32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

fn read_u8(b: &[u8]) -> u8 {
    b[0]
}

/// 8-bit formats to ARGB32.
pub fn from_linear8(
    px_format: PixelFormat,
    width: usize,
    height: usize,
    img_buf: &[u8],
    stride: usize,
) -> DecodeResult<Image> {
    let src_stride = resolve_stride(stride, width, 1)?;
    check_len(img_buf, src_stride * height)?;
    let mut img = Image::new(width, height, ImageFormat::Argb32)?;

    macro_rules! arms8 {
        ($(($fmt:ident, $r:literal, $g:literal, $b:literal, $gr:literal, $a:literal)),+ $(,)?) => {
            paste! {
                match px_format {
                    $(PixelFormat::$fmt => linear_loop!(
                        img, img_buf, src_stride, width, height,
                        1, read_u8, convert::[<$fmt:snake _to_argb32>],
                        SBit::new($r, $g, $b, $gr, $a)
                    ),)+
                    _ => return Err(DecodeError::InvalidPixelFormat(px_format as u32)),
                }
            }
        };
    }
    arms8!(
        (L8, 8, 8, 8, 8, 0),
        (A4l4, 4, 4, 4, 4, 4),
        (A8, 1, 1, 1, 1, 8),
        (R8, 8, 1, 1, 0, 0),
        (Rgb332, 3, 3, 2, 0, 0),
    );
    Ok(img)
}

/// 16-bit little-endian formats to ARGB32.
pub fn from_linear16(
    px_format: PixelFormat,
    width: usize,
    height: usize,
    img_buf: &[u8],
    stride: usize,
) -> DecodeResult<Image> {
    let src_stride = resolve_stride(stride, width, 2)?;
    check_len(img_buf, src_stride * height)?;
    let mut img = Image::new(width, height, ImageFormat::Argb32)?;

    macro_rules! arms16 {
        ($(($fmt:ident, $r:literal, $g:literal, $b:literal, $gr:literal, $a:literal)),+ $(,)?) => {
            paste! {
                match px_format {
                    $(PixelFormat::$fmt => linear_loop!(
                        img, img_buf, src_stride, width, height,
                        2, read_le16, convert::[<$fmt:snake _to_argb32>],
                        SBit::new($r, $g, $b, $gr, $a)
                    ),)+
                    _ => return Err(DecodeError::InvalidPixelFormat(px_format as u32)),
                }
            }
        };
    }
    arms16!(
        (Rgb565, 5, 6, 5, 0, 0),
        (Bgr565, 5, 6, 5, 0, 0),
        (Argb1555, 5, 5, 5, 0, 1),
        (Abgr1555, 5, 5, 5, 0, 1),
        (Rgba5551, 5, 5, 5, 0, 1),
        (Bgra5551, 5, 5, 5, 0, 1),
        (Argb4444, 4, 4, 4, 0, 4),
        (Abgr4444, 4, 4, 4, 0, 4),
        (Rgba4444, 4, 4, 4, 0, 4),
        (Bgra4444, 4, 4, 4, 0, 4),
        (Xrgb4444, 4, 4, 4, 0, 4),
        (Xbgr4444, 4, 4, 4, 0, 4),
        (Rgbx4444, 4, 4, 4, 0, 4),
        (Bgrx4444, 4, 4, 4, 0, 4),
        (Argb8332, 3, 3, 2, 0, 8),
        (Rgb5a3, 5, 5, 5, 0, 4),
        (Bgr5a3, 5, 5, 5, 0, 4),
        (Rgb555, 5, 5, 5, 0, 0),
        (Bgr555, 5, 5, 5, 0, 0),
        (Bgr555Ps1, 5, 5, 5, 0, 0),
        (Ia8, 8, 8, 8, 8, 8),
        (L16, 8, 8, 8, 8, 0),
        (A8l8, 8, 8, 8, 8, 8),
        (L8a8, 8, 8, 8, 8, 8),
        (Rg88, 8, 8, 1, 0, 0),
        (Gr88, 8, 8, 1, 0, 0),
    );
    Ok(img)
}

/// 24-bit byte-addressed formats to ARGB32.
pub fn from_linear24(
    px_format: PixelFormat,
    width: usize,
    height: usize,
    img_buf: &[u8],
    stride: usize,
) -> DecodeResult<Image> {
    // Byte-addressed, so the stride only has to cover a full row.
    let row_bytes = width * 3;
    let src_stride = if stride == 0 { row_bytes } else { stride };
    if src_stride < row_bytes {
        return Err(DecodeError::InvalidGeometry {
            width: width as u32,
            height: height as u32,
            reason: "invalid source stride",
        });
    }
    check_len(img_buf, src_stride * height)?;
    let mut img = Image::new(width, height, ImageFormat::Argb32)?;

    let swap_rb = match px_format {
        PixelFormat::Rgb888 => false,
        PixelFormat::Bgr888 => true,
        _ => return Err(DecodeError::InvalidPixelFormat(px_format as u32)),
    };

    for y in 0..height {
        let src = &img_buf[y * src_stride..];
        let dest = img.scanline_argb32_mut(y);
        for (x, px) in dest.iter_mut().enumerate() {
            let s = &src[x * 3..x * 3 + 3];
            let (b, r) = if swap_rb { (s[2], s[0]) } else { (s[0], s[2]) };
            *px = u32::from_le_bytes([b, s[1], r, 0xFF]);
        }
    }
    img.set_sbit(SBit::new(8, 8, 8, 0, 0));
    Ok(img)
}

/// 32-bit little-endian formats to ARGB32. The byte-reorder formats go
/// through the runtime-dispatched fast path; the portable loop is the
/// canonical reference and produces identical output.
pub fn from_linear32(
    px_format: PixelFormat,
    width: usize,
    height: usize,
    img_buf: &[u8],
    stride: usize,
) -> DecodeResult<Image> {
    let src_stride = resolve_stride(stride, width, 4)?;
    check_len(img_buf, src_stride * height)?;
    let mut img = Image::new(width, height, ImageFormat::Argb32)?;

    match px_format {
        PixelFormat::Argb8888 => {
            if src_stride == img.stride() {
                let total = src_stride * height;
                img.bits_mut()[..total].copy_from_slice(&img_buf[..total]);
                // Stored little-endian on disk; fix up the words on BE hosts.
                if cfg!(target_endian = "big") {
                    for y in 0..height {
                        for px in img.scanline_argb32_mut(y) {
                            *px = px.swap_bytes();
                        }
                    }
                }
            } else {
                for y in 0..height {
                    let src = &img_buf[y * src_stride..];
                    for (x, px) in img.scanline_argb32_mut(y).iter_mut().enumerate() {
                        *px = read_le32(&src[x * 4..]);
                    }
                }
            }
            img.set_sbit(SBit::new(8, 8, 8, 0, 8));
        }

        PixelFormat::Xrgb8888 | PixelFormat::Bgra8888 | PixelFormat::Bgrx8888 => {
            let op = match px_format {
                PixelFormat::Xrgb8888 => linear_simd::RowOp::OrAlpha,
                PixelFormat::Bgra8888 => linear_simd::RowOp::Swap,
                _ => linear_simd::RowOp::SwapOrAlpha,
            };
            for y in 0..height {
                let src = &img_buf[y * src_stride..y * src_stride + width * 4];
                linear_simd::process_row(op, src, img.scanline_argb32_mut(y));
            }
            let sbit =
                if px_format == PixelFormat::Bgra8888 { SBit::new(8, 8, 8, 0, 8) } else { SBit::new(8, 8, 8, 0, 0) };
            img.set_sbit(sbit);
        }

        _ => {
            let (conv, sbit): (fn(u32) -> u32, SBit) = match px_format {
                PixelFormat::Rgba8888 => (|v| (v >> 8) | (v << 24), SBit::new(8, 8, 8, 0, 8)),
                PixelFormat::Rgbx8888 => (|v| (v >> 8) | 0xFF00_0000, SBit::new(8, 8, 8, 0, 0)),
                PixelFormat::Abgr8888 => (
                    |v| (v & 0xFF00_FF00) | ((v & 0xFF) << 16) | ((v >> 16) & 0xFF),
                    SBit::new(8, 8, 8, 0, 8),
                ),
                PixelFormat::Xbgr8888 => (
                    |v| 0xFF00_0000 | ((v & 0xFF) << 16) | (v & 0xFF00) | ((v >> 16) & 0xFF),
                    SBit::new(8, 8, 8, 0, 0),
                ),
                PixelFormat::G16r16 => (convert::g16r16_to_argb32, SBit::new(8, 8, 1, 0, 0)),
                PixelFormat::A2r10g10b10 => {
                    (convert::a2r10g10b10_to_argb32, SBit::new(8, 8, 8, 0, 2))
                }
                PixelFormat::A2b10g10r10 => {
                    (convert::a2b10g10r10_to_argb32, SBit::new(8, 8, 8, 0, 2))
                }
                PixelFormat::Rgb9E5 => (convert::rgb9_e5_to_argb32, SBit::new(8, 8, 8, 0, 0)),
                PixelFormat::Bgr888Abgr7888 => {
                    (convert::bgr888_abgr7888_to_argb32, SBit::new(8, 8, 8, 0, 8))
                }
                _ => return Err(DecodeError::InvalidPixelFormat(px_format as u32)),
            };
            for y in 0..height {
                let src = &img_buf[y * src_stride..];
                for (x, px) in img.scanline_argb32_mut(y).iter_mut().enumerate() {
                    *px = conv(read_le32(&src[x * 4..]));
                }
            }
            img.set_sbit(sbit);
        }
    }
    Ok(img)
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn le_bytes16(words: &[u16]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn ci4_nibble_order_is_caller_choice() {
        let pal = le_bytes16(&[0xF000, 0xF111, 0xF222, 0xF333, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        let data = [0x10u8, 0x32];
        let lsn =
            from_linear_ci4(PixelFormat::Argb4444, false, 4, 1, &data, &pal, 0).unwrap();
        assert_eq!(&lsn.scanline(0)[..4], &[0, 1, 2, 3]);
        let msn = from_linear_ci4(PixelFormat::Argb4444, true, 4, 1, &data, &pal, 0).unwrap();
        assert_eq!(&msn.scanline(0)[..4], &[1, 0, 3, 2]);
    }

    #[test]
    fn ci8_pixels_always_index_the_palette() {
        let mut pal = vec![0u8; 256 * 2];
        pal[..2].copy_from_slice(&0x0000u16.to_le_bytes());
        let data: Vec<u8> = (0..=255).collect();
        let img = from_linear_ci8(PixelFormat::Bgr555Ps1, 16, 16, &data, &pal, 0).unwrap();
        assert_eq!(img.tr_idx(), Some(0));
        for y in 0..16 {
            for &px in &img.scanline(y)[..16] {
                assert!((px as usize) < img.palette_len());
            }
        }
    }

    #[test]
    fn mono_msb_is_left() {
        let img = from_linear_mono(8, 1, &[0b1010_0000], 0).unwrap();
        assert_eq!(&img.scanline(0)[..8], &[1, 0, 1, 0, 0, 0, 0, 0]);
        assert_eq!(img.palette().unwrap()[0], 0xFFFFFFFF);
        assert_eq!(img.palette().unwrap()[1], 0xFF000000);
    }

    #[test]
    fn gray_2bpp_ramp() {
        let img = from_linear_gray_2bpp(4, 1, &[0b00_01_10_11], 0).unwrap();
        assert_eq!(&img.scanline(0)[..4], &[0, 1, 2, 3]);
        assert_eq!(img.palette().unwrap()[1], 0xFFC0C0C0);
        assert_eq!(img.palette().unwrap()[2], 0xFF808080);
    }

    #[test]
    fn zero_stride_equals_explicit_tight_stride() {
        let data = le_bytes16(&[0x1234, 0x5678, 0x9ABC, 0xDEF0, 0x1111, 0x2222]);
        let a = from_linear16(PixelFormat::Rgb565, 3, 2, &data, 0).unwrap();
        let b = from_linear16(PixelFormat::Rgb565, 3, 2, &data, 6).unwrap();
        for y in 0..2 {
            assert_eq!(a.scanline_argb32(y), b.scanline_argb32(y));
        }
    }

    #[test]
    fn misaligned_stride_fails() {
        let data = [0u8; 64];
        assert!(from_linear16(PixelFormat::Rgb565, 4, 2, &data, 9).is_err());
        assert!(from_linear16(PixelFormat::Rgb565, 4, 2, &data, 6).is_err());
    }

    #[test]
    fn linear32_channel_orders() {
        let src = 0x11223344u32.to_le_bytes();
        let cases = [
            (PixelFormat::Argb8888, 0x11223344),
            (PixelFormat::Rgba8888, 0x44112233),
            (PixelFormat::Xrgb8888, 0xFF223344),
            (PixelFormat::Rgbx8888, 0xFF112233),
            (PixelFormat::Abgr8888, 0x11443322),
            (PixelFormat::Bgra8888, 0x44332211),
            (PixelFormat::Xbgr8888, 0xFF443322),
            (PixelFormat::Bgrx8888, 0xFF332211),
        ];
        for (fmt, expected) in cases {
            let img = from_linear32(fmt, 1, 1, &src, 0).unwrap();
            assert_eq!(img.scanline_argb32(0)[0], expected, "{fmt:?}");
        }
    }

    #[test]
    fn win_icon_mask_beats_image_bits() {
        let img = from_linear_mono_win_icon(8, 1, &[0b1111_0000], &[0b1010_1010], 0).unwrap();
        assert_eq!(&img.scanline(0)[..8], &[2, 1, 2, 1, 2, 0, 2, 0]);
        assert_eq!(img.tr_idx(), Some(2));
    }
}
