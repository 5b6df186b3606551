//! Tiled fixed-function layouts: GameCube (row-major tiles of big-endian
//! pixels), Nintendo DS (8x8 CI4), Nintendo 3DS (8x8 Morton order).

use smallvec::SmallVec;

use crate::{
    decode::{palette, PixelFormat},
    error::{DecodeError, DecodeResult},
    image::{
        blit::{blit_tile_argb32, blit_tile_ci4_left_lsn, blit_tile_ci4_left_msn, blit_tile_ci8},
        Image, ImageFormat,
    },
    pixel::{convert, SBit},
};

// -------------------------------------------------------------------------------------------------

fn check_tile_multiple(
    width: usize,
    height: usize,
    tile_w: usize,
    tile_h: usize,
) -> DecodeResult<()> {
    if width == 0 || height == 0 || width % tile_w != 0 || height % tile_h != 0 {
        return Err(DecodeError::InvalidGeometry {
            width: width as u32,
            height: height as u32,
            reason: "dimensions are not a tile multiple",
        });
    }
    Ok(())
}

fn check_len(buf: &[u8], expected: usize) -> DecodeResult<()> {
    if buf.len() < expected {
        return Err(DecodeError::Truncated { expected, got: buf.len() });
    }
    Ok(())
}

// -------------------------------------------------------------------------------------------------

/// GameCube 16-bit texture in 4x4 tiles of big-endian pixels.
pub fn from_gcn16(
    px_format: PixelFormat,
    width: usize,
    height: usize,
    img_buf: &[u8],
) -> DecodeResult<Image> {
    check_tile_multiple(width, height, 4, 4)?;
    check_len(img_buf, width * height * 2)?;

    let (pxfunc, sbit): (fn(u16) -> u32, SBit) = match px_format {
        PixelFormat::Rgb5a3 => (convert::rgb5a3_to_argb32, SBit::new(5, 5, 5, 0, 4)),
        PixelFormat::Rgb565 => (convert::rgb565_to_argb32, SBit::new(5, 6, 5, 0, 0)),
        PixelFormat::Ia8 => (convert::ia8_to_argb32, SBit::new(8, 8, 8, 8, 8)),
        _ => return Err(DecodeError::InvalidPixelFormat(px_format as u32)),
    };

    let mut img = Image::new(width, height, ImageFormat::Argb32)?;
    let mut src = img_buf.chunks_exact(2);
    let mut tile = [0u32; 4 * 4];
    for ty in 0..height / 4 {
        for tx in 0..width / 4 {
            for px in tile.iter_mut() {
                let b = src.next().expect("length checked above");
                *px = pxfunc(u16::from_be_bytes([b[0], b[1]]));
            }
            blit_tile_argb32::<4, 4>(&mut img, &tile, tx, ty);
        }
    }
    img.set_sbit(sbit);
    Ok(img)
}

/// GameCube CI8 in 8x4 tiles with a 256-entry big-endian RGB5A3 palette.
pub fn from_gcn_ci8(
    width: usize,
    height: usize,
    img_buf: &[u8],
    pal_buf: &[u8],
) -> DecodeResult<Image> {
    check_tile_multiple(width, height, 8, 4)?;
    check_len(img_buf, width * height)?;

    let pal = palette::decode_palette_be16(PixelFormat::Rgb5a3, 256, pal_buf)?;
    let mut img = Image::new(width, height, ImageFormat::Ci8)?;
    img.palette_mut().unwrap()[..].copy_from_slice(&pal.colors[..]);
    img.set_tr_idx(pal.tr_idx);
    img.set_sbit(SBit::new(5, 5, 5, 0, 4));

    let mut tiles = img_buf.chunks_exact(8 * 4);
    for ty in 0..height / 4 {
        for tx in 0..width / 8 {
            let tile = tiles.next().expect("length checked above");
            blit_tile_ci8::<8, 4>(&mut img, tile, tx, ty);
        }
    }
    Ok(img)
}

/// GameCube I8 (grayscale, no palette on disk) in 8x4 tiles.
pub fn from_gcn_i8(width: usize, height: usize, img_buf: &[u8]) -> DecodeResult<Image> {
    check_tile_multiple(width, height, 8, 4)?;
    check_len(img_buf, width * height)?;

    let mut img = Image::new(width, height, ImageFormat::Ci8)?;
    let palette = img.palette_mut().unwrap();
    for (i, color) in palette.iter_mut().enumerate() {
        *color = 0xFF00_0000 | (i as u32 * 0x01_0101);
    }
    img.set_sbit(SBit::new(8, 8, 8, 0, 0));

    let mut tiles = img_buf.chunks_exact(8 * 4);
    for ty in 0..height / 4 {
        for tx in 0..width / 8 {
            let tile = tiles.next().expect("length checked above");
            blit_tile_ci8::<8, 4>(&mut img, tile, tx, ty);
        }
    }
    Ok(img)
}

/// GameCube CI4 in 8x8 tiles; the high nibble is the left pixel. Palette is
/// 16 big-endian RGB5A3 entries.
pub fn from_gcn_ci4(
    width: usize,
    height: usize,
    img_buf: &[u8],
    pal_buf: &[u8],
) -> DecodeResult<Image> {
    check_tile_multiple(width, height, 8, 8)?;
    check_len(img_buf, width * height / 2)?;

    let pal = palette::decode_palette_be16(PixelFormat::Rgb5a3, 16, pal_buf)?;
    let mut img = Image::new(width, height, ImageFormat::Ci8)?;
    img.palette_mut().unwrap()[..].copy_from_slice(&pal.colors[..]);
    img.set_tr_idx(pal.tr_idx);
    img.set_sbit(SBit::new(5, 5, 5, 0, 4));

    let mut tiles = img_buf.chunks_exact(8 * 8 / 2);
    for ty in 0..height / 8 {
        for tx in 0..width / 8 {
            let tile = tiles.next().expect("length checked above");
            blit_tile_ci4_left_msn::<8, 8>(&mut img, tile, tx, ty);
        }
    }
    Ok(img)
}

// -------------------------------------------------------------------------------------------------

/// Nintendo DS CI4 in 8x8 tiles; the low nibble is the left pixel. Palette
/// is 16 little-endian BGR555 entries; index 0 is always transparent.
pub fn from_nds_ci4(
    width: usize,
    height: usize,
    img_buf: &[u8],
    pal_buf: &[u8],
) -> DecodeResult<Image> {
    check_tile_multiple(width, height, 8, 8)?;
    check_len(img_buf, width * height / 2)?;

    let pal = palette::decode_palette(PixelFormat::Bgr555, 16, pal_buf)?;
    let mut img = Image::new(width, height, ImageFormat::Ci8)?;
    img.palette_mut().unwrap()[..].copy_from_slice(&pal.colors[..]);
    img.palette_mut().unwrap()[0] = 0;
    img.set_tr_idx(Some(0));
    img.set_sbit(SBit::new(5, 5, 5, 0, 1));

    let mut tiles = img_buf.chunks_exact(8 * 8 / 2);
    for ty in 0..height / 8 {
        for tx in 0..width / 8 {
            let tile = tiles.next().expect("length checked above");
            blit_tile_ci4_left_lsn::<8, 8>(&mut img, tile, tx, ty);
        }
    }
    Ok(img)
}

// -------------------------------------------------------------------------------------------------

/// Z-order position map for one 8x8 tile: `TILE_ORDER[i]` is where the
/// `i`-th stored pixel lands within the tile.
pub const N3DS_TILE_ORDER: [u8; 64] = [
    0, 1, 8, 9, 2, 3, 10, 11, 16, 17, 24, 25, 18, 19, 26, 27, //
    4, 5, 12, 13, 6, 7, 14, 15, 20, 21, 28, 29, 22, 23, 30, 31, //
    32, 33, 40, 41, 34, 35, 42, 43, 48, 49, 56, 57, 50, 51, 58, 59, //
    36, 37, 44, 45, 38, 39, 46, 47, 52, 53, 60, 61, 54, 55, 62, 63,
];

/// Nintendo 3DS Morton-tiled RGB565 (little-endian), 8x8 tiles.
pub fn from_n3ds_tiled_rgb565(
    width: usize,
    height: usize,
    img_buf: &[u8],
) -> DecodeResult<Image> {
    check_tile_multiple(width, height, 8, 8)?;
    check_len(img_buf, width * height * 2)?;

    let mut img = Image::new(width, height, ImageFormat::Argb32)?;
    let mut src = img_buf.chunks_exact(2);
    let mut tile = [0u32; 8 * 8];
    for ty in 0..height / 8 {
        for tx in 0..width / 8 {
            for &pos in N3DS_TILE_ORDER.iter() {
                let b = src.next().expect("length checked above");
                tile[pos as usize] = convert::rgb565_to_argb32(u16::from_le_bytes([b[0], b[1]]));
            }
            blit_tile_argb32::<8, 8>(&mut img, &tile, tx, ty);
        }
    }
    img.set_sbit(SBit::new(5, 6, 5, 0, 0));
    Ok(img)
}

/// Nintendo 3DS Morton-tiled RGB565 with a separate tiled A4 plane. Each
/// alpha byte carries two pixels, low nibble first.
pub fn from_n3ds_tiled_rgb565_a4(
    width: usize,
    height: usize,
    img_buf: &[u8],
    alpha_buf: &[u8],
) -> DecodeResult<Image> {
    check_tile_multiple(width, height, 8, 8)?;
    check_len(img_buf, width * height * 2)?;
    check_len(alpha_buf, width * height / 2)?;

    let mut img = Image::new(width, height, ImageFormat::Argb32)?;
    let mut src = img_buf.chunks_exact(2);
    let mut alphas = alpha_buf.iter();
    let mut tile = [0u32; 8 * 8];
    for ty in 0..height / 8 {
        for tx in 0..width / 8 {
            // A4 nybble order matches NDS CI4: low nibble first.
            let mut a4: SmallVec<[u8; 64]> = SmallVec::new();
            for _ in 0..32 {
                let b = *alphas.next().expect("length checked above");
                a4.push(b & 0x0F);
                a4.push(b >> 4);
            }
            for (i, &pos) in N3DS_TILE_ORDER.iter().enumerate() {
                let b = src.next().expect("length checked above");
                tile[pos as usize] =
                    convert::rgb565_a4_to_argb32(u16::from_le_bytes([b[0], b[1]]), a4[i]);
            }
            blit_tile_argb32::<8, 8>(&mut img, &tile, tx, ty);
        }
    }
    img.set_sbit(SBit::new(5, 6, 5, 0, 4));
    Ok(img)
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn n3ds_first_stored_pixel_is_top_left() {
        // 8x8 tile: stored pixel 0 lands at (0, 0); stored pixel 2 at (0, 1).
        let mut buf = vec![0u8; 8 * 8 * 2];
        buf[0..2].copy_from_slice(&0xFFFFu16.to_le_bytes());
        let img = from_n3ds_tiled_rgb565(8, 8, &buf).unwrap();
        assert_eq!(img.scanline_argb32(0)[0], 0xFFFFFFFF);
        for y in 0..8 {
            for x in 0..8 {
                if (x, y) != (0, 0) {
                    assert_eq!(img.scanline_argb32(y)[x], 0xFF000000);
                }
            }
        }
    }

    #[test]
    fn n3ds_tile_order_covers_all_positions() {
        let mut seen = [false; 64];
        for &pos in N3DS_TILE_ORDER.iter() {
            assert!(!seen[pos as usize]);
            seen[pos as usize] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn gcn_rgb5a3_4x4_tiles() {
        // 8x4 image: two 4x4 tiles. First word of tile 1 is pixel (4, 0).
        let mut buf = vec![0u8; 8 * 4 * 2];
        buf[0..2].copy_from_slice(&0xFFFFu16.to_be_bytes()); // tile 0, (0,0)
        buf[32..34].copy_from_slice(&0x801Fu16.to_be_bytes()); // tile 1, (4,0)
        let img = from_gcn16(PixelFormat::Rgb5a3, 8, 4, &buf).unwrap();
        assert_eq!(img.scanline_argb32(0)[0], 0xFFFFFFFF);
        assert_eq!(img.scanline_argb32(0)[4], 0xFF0000FF);
    }

    #[test]
    fn gcn_ci4_msn_left() {
        let mut pal = vec![0u8; 32];
        for (i, chunk) in pal.chunks_exact_mut(2).enumerate() {
            // Opaque ramp so indices survive as-is.
            chunk.copy_from_slice(&(0x8000u16 | i as u16).to_be_bytes());
        }
        let mut buf = vec![0u8; 8 * 8 / 2];
        buf[0] = 0x12;
        let img = from_gcn_ci4(8, 8, &buf, &pal).unwrap();
        assert_eq!(img.scanline(0)[0], 1);
        assert_eq!(img.scanline(0)[1], 2);
    }

    #[test]
    fn nds_ci4_forces_transparent_index_zero() {
        let pal: Vec<u8> =
            (0..16u16).flat_map(|i| (0x7FFF - i).to_le_bytes()).collect();
        let buf = vec![0x10u8; 8 * 8 / 2];
        let img = from_nds_ci4(8, 8, &buf, &pal).unwrap();
        assert_eq!(img.tr_idx(), Some(0));
        assert_eq!(img.palette().unwrap()[0], 0);
        assert_eq!(img.scanline(0)[0], 0);
        assert_eq!(img.scanline(0)[1], 1);
    }
}
