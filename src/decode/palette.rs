//! Palette blob decoding. Every source palette converts into a 256-entry
//! ARGB32 array; the first entry that decodes with alpha = 0 is recorded as
//! the single-index transparency mapping for CI8 output.

use crate::{
    decode::PixelFormat,
    error::{DecodeError, DecodeResult},
    pixel::{convert, SBit},
};

// -------------------------------------------------------------------------------------------------

/// A palette converted to ARGB32, plus the metadata CI8 images inherit.
#[derive(Clone, Debug)]
pub struct DecodedPalette {
    pub colors: Box<[u32; 256]>,
    pub len: usize,
    pub tr_idx: Option<u8>,
    pub sbit: SBit,
}

impl DecodedPalette {
    /// Wraps an in-memory host-endian ARGB32 table, scanning for the first
    /// transparent entry.
    pub fn from_argb32(entries: &[u32], sbit: SBit) -> Self {
        debug_assert!(entries.len() <= 256);
        let mut colors = Box::new([0u32; 256]);
        let mut tr_idx = None;
        for (i, (dst, &src)) in colors.iter_mut().zip(entries).enumerate() {
            *dst = src;
            if tr_idx.is_none() && src >> 24 == 0 {
                tr_idx = Some(i as u8);
            }
        }
        Self { colors, len: entries.len(), tr_idx, sbit }
    }
}

const fn bytes_per_entry(px_format: PixelFormat) -> usize {
    match px_format {
        PixelFormat::Rgb888 => 3,
        PixelFormat::Bgr888Abgr7888
        | PixelFormat::Argb8888
        | PixelFormat::Xrgb8888
        | PixelFormat::Bgra8888
        | PixelFormat::Bgrx8888 => 4,
        _ => 2,
    }
}

/// Decodes `entries` palette entries (16, 256, or up to 1024 for VQ) from an
/// on-disk blob. Multi-byte entries are little-endian; big-endian palettes
/// (GameCube RGB5A3) go through [`decode_palette_be16`].
pub fn decode_palette(
    px_format: PixelFormat,
    entries: usize,
    pal_buf: &[u8],
) -> DecodeResult<DecodedPalette> {
    decode_palette_impl(px_format, entries, pal_buf, u16::from_le_bytes)
}

/// Big-endian 16-bit variant of [`decode_palette`].
pub fn decode_palette_be16(
    px_format: PixelFormat,
    entries: usize,
    pal_buf: &[u8],
) -> DecodeResult<DecodedPalette> {
    debug_assert_eq!(bytes_per_entry(px_format), 2);
    decode_palette_impl(px_format, entries, pal_buf, u16::from_be_bytes)
}

fn decode_palette_impl(
    px_format: PixelFormat,
    entries: usize,
    pal_buf: &[u8],
    read16: fn([u8; 2]) -> u16,
) -> DecodeResult<DecodedPalette> {
    debug_assert!(entries <= 1024);
    let need = entries * bytes_per_entry(px_format);
    if pal_buf.len() < need {
        return Err(DecodeError::Truncated { expected: need, got: pal_buf.len() });
    }

    // VQ palettes can exceed 256 entries; those callers read `colors_vec`
    // via decode_palette_vq() instead.
    let (colors_vec, sbit) = decode_entries(px_format, entries, pal_buf, read16)?;

    let mut colors = Box::new([0u32; 256]);
    let mut tr_idx = None;
    for (i, (dst, &src)) in colors.iter_mut().zip(&colors_vec).enumerate() {
        *dst = src;
        if tr_idx.is_none() && src >> 24 == 0 {
            tr_idx = Some(i as u8);
        }
    }
    Ok(DecodedPalette { colors, len: entries.min(256), tr_idx, sbit })
}

/// Decodes a VQ palette (up to 1024 16-bit little-endian entries) into a
/// plain ARGB32 vector; VQ indices address it in 4-entry blocks.
pub fn decode_palette_vq(
    px_format: PixelFormat,
    entries: usize,
    pal_buf: &[u8],
) -> DecodeResult<(Vec<u32>, SBit)> {
    let need = entries * 2;
    if pal_buf.len() < need {
        return Err(DecodeError::Truncated { expected: need, got: pal_buf.len() });
    }
    decode_entries(px_format, entries, pal_buf, u16::from_le_bytes)
}

fn decode_entries(
    px_format: PixelFormat,
    entries: usize,
    pal_buf: &[u8],
    read16: fn([u8; 2]) -> u16,
) -> DecodeResult<(Vec<u32>, SBit)> {
    let mut colors = Vec::with_capacity(entries);

    macro_rules! convert16 {
        ($func:path, $sbit:expr) => {{
            for chunk in pal_buf.chunks_exact(2).take(entries) {
                colors.push($func(read16([chunk[0], chunk[1]])));
            }
            $sbit
        }};
    }
    macro_rules! convert32 {
        ($func:path, $sbit:expr) => {{
            for chunk in pal_buf.chunks_exact(4).take(entries) {
                colors.push($func(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])));
            }
            $sbit
        }};
    }

    let sbit = match px_format {
        PixelFormat::Argb1555 => convert16!(convert::argb1555_to_argb32, SBit::new(5, 5, 5, 0, 1)),
        PixelFormat::Rgb555 => convert16!(convert::rgb555_to_argb32, SBit::new(5, 5, 5, 0, 0)),
        PixelFormat::Bgr555 => convert16!(convert::bgr555_to_argb32, SBit::new(5, 5, 5, 0, 0)),
        PixelFormat::Bgr555Ps1 => {
            convert16!(convert::bgr555_ps1_to_argb32, SBit::new(5, 5, 5, 0, 0))
        }
        PixelFormat::Rgb565 => convert16!(convert::rgb565_to_argb32, SBit::new(5, 6, 5, 0, 0)),
        PixelFormat::Argb4444 => convert16!(convert::argb4444_to_argb32, SBit::new(4, 4, 4, 0, 4)),
        PixelFormat::Rgba4444 => convert16!(convert::rgba4444_to_argb32, SBit::new(4, 4, 4, 0, 4)),
        PixelFormat::Rgb5a3 => convert16!(convert::rgb5a3_to_argb32, SBit::new(5, 5, 5, 0, 4)),
        PixelFormat::Bgr5a3 => convert16!(convert::bgr5a3_to_argb32, SBit::new(5, 5, 5, 0, 4)),
        PixelFormat::Bgr888Abgr7888 => {
            convert32!(convert::bgr888_abgr7888_to_argb32, SBit::new(8, 8, 8, 0, 8))
        }
        PixelFormat::Rgb888 => {
            // 24-bit entries; alpha forced opaque.
            for chunk in pal_buf.chunks_exact(3).take(entries) {
                colors.push(
                    0xFF00_0000
                        | ((chunk[2] as u32) << 16)
                        | ((chunk[1] as u32) << 8)
                        | chunk[0] as u32,
                );
            }
            SBit::new(8, 8, 8, 0, 0)
        }
        PixelFormat::Argb8888 => convert32!(std::convert::identity, SBit::new(8, 8, 8, 0, 8)),
        PixelFormat::Bgra8888 => convert32!(u32::swap_bytes, SBit::new(8, 8, 8, 0, 8)),
        PixelFormat::Xrgb8888 => {
            for chunk in pal_buf.chunks_exact(4).take(entries) {
                let v = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                colors.push(v | 0xFF00_0000);
            }
            SBit::new(8, 8, 8, 0, 0)
        }
        PixelFormat::Bgrx8888 => {
            for chunk in pal_buf.chunks_exact(4).take(entries) {
                let v = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                colors.push(v.swap_bytes() | 0xFF00_0000);
            }
            SBit::new(8, 8, 8, 0, 0)
        }
        _ => return Err(DecodeError::InvalidPixelFormat(px_format as u32)),
    };

    if colors.len() < entries {
        return Err(DecodeError::Truncated { expected: entries, got: colors.len() });
    }
    Ok((colors, sbit))
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_transparent_entry_wins() {
        // ARGB4444: entry 1 and 3 transparent; entry 1 is recorded.
        let pal: Vec<u8> = [0xF000u16, 0x0FFF, 0xFFFF, 0x0000]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let decoded = decode_palette(PixelFormat::Argb4444, 4, &pal).unwrap();
        assert_eq!(decoded.tr_idx, Some(1));
        assert_eq!(decoded.colors[0], 0xFF000000);
        assert_eq!(decoded.colors[1], 0x00FFFFFF);
    }

    #[test]
    fn ps1_bgr555_zero_entries_are_transparent() {
        let pal: Vec<u8> = [0x0000u16, 0x7FFF].iter().flat_map(|v| v.to_le_bytes()).collect();
        let decoded = decode_palette(PixelFormat::Bgr555Ps1, 2, &pal).unwrap();
        assert_eq!(decoded.tr_idx, Some(0));
        assert_eq!(decoded.colors[0], 0x00000000);
        assert_eq!(decoded.colors[1], 0xFFFFFFFF);
    }

    #[test]
    fn rgb888_palette_is_opaque() {
        let pal = [0x11u8, 0x22, 0x33, 0xFF, 0xFF, 0xFF];
        let decoded = decode_palette(PixelFormat::Rgb888, 2, &pal).unwrap();
        assert_eq!(decoded.colors[0], 0xFF332211);
        assert_eq!(decoded.colors[1], 0xFFFFFFFF);
        assert_eq!(decoded.tr_idx, None);
    }

    #[test]
    fn be16_palette_swaps_at_read_time() {
        let pal = [0x80u8, 0x00]; // RGB5A3 opaque black, big-endian
        let decoded = decode_palette_be16(PixelFormat::Rgb5a3, 1, &pal).unwrap();
        assert_eq!(decoded.colors[0], 0xFF000000);
    }

    #[test]
    fn truncated_palette_fails() {
        let err = decode_palette(PixelFormat::Rgb565, 16, &[0u8; 10]).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { .. }));
    }
}
