//! S3TC / BCn block decoders: DXT1 through DXT5, BC4, BC5.
//!
//! Blocks cover 4x4 tiles. Containers may cut off the last tile, so decode
//! targets the block-aligned physical size and crops afterwards; pixels
//! outside the declared region are unreachable to callers.

use crate::{
    error::{DecodeError, DecodeResult},
    image::{blit::blit_tile_argb32, Image, ImageFormat},
    pixel::{convert, Argb32, SBit},
};

// -------------------------------------------------------------------------------------------------

const fn align4(v: usize) -> usize {
    (v + 3) & !3
}

fn check_geometry(width: usize, height: usize) -> DecodeResult<()> {
    if width == 0 || height == 0 {
        return Err(DecodeError::InvalidGeometry {
            width: width as u32,
            height: height as u32,
            reason: "dimensions must be non-zero",
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

#[derive(Copy, Clone, Default)]
struct DxtPalFlags {
    big_endian: bool,
    /// Treat palette entry 3 as fully transparent in the c0 <= c1 case.
    color3_alpha: bool,
    /// DXT2/DXT3: the color block always behaves as if c0 > c1.
    color0_gt_color1: bool,
}

/// Decodes the 4-color palette of a DXT1-style color block.
fn dxt_tile_palette(block: &[u8], flags: DxtPalFlags) -> [Argb32; 4] {
    let read16 = if flags.big_endian { u16::from_be_bytes } else { u16::from_le_bytes };
    let c0 = read16([block[0], block[1]]);
    let c1 = read16([block[2], block[3]]);

    let p0 = Argb32(convert::rgb565_to_argb32(c0));
    let p1 = Argb32(convert::rgb565_to_argb32(c1));
    let mut pal = [p0, p1, Argb32(0), Argb32(0)];

    if flags.color0_gt_color1 || c0 > c1 {
        pal[2] = Argb32::from_channels(
            0xFF,
            ((2 * p0.r() as u32 + p1.r() as u32) / 3) as u8,
            ((2 * p0.g() as u32 + p1.g() as u32) / 3) as u8,
            ((2 * p0.b() as u32 + p1.b() as u32) / 3) as u8,
        );
        pal[3] = Argb32::from_channels(
            0xFF,
            ((2 * p1.r() as u32 + p0.r() as u32) / 3) as u8,
            ((2 * p1.g() as u32 + p0.g() as u32) / 3) as u8,
            ((2 * p1.b() as u32 + p0.b() as u32) / 3) as u8,
        );
    } else {
        pal[2] = Argb32::from_channels(
            0xFF,
            ((p0.r() as u32 + p1.r() as u32) / 2) as u8,
            ((p0.g() as u32 + p1.g() as u32) / 2) as u8,
            ((p0.b() as u32 + p1.b() as u32) / 2) as u8,
        );
        pal[3] = if flags.color3_alpha { Argb32::TRANSPARENT } else { Argb32::OPAQUE_BLACK };
    }
    pal
}

/// The 48-bit code stream of a DXT5-style alpha sub-block (bytes 2..8).
fn extract48(block: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&block[..8]);
    u64::from_le_bytes(raw) >> 16
}

/// One DXT5 alpha value: 3-bit selector against the (a0, a1) endpoint ramp.
fn dxt5_alpha(a3: u64, a0: u8, a1: u8) -> u8 {
    let (a0w, a1w) = (a0 as u32, a1 as u32);
    let v = if a0 > a1 {
        match a3 & 7 {
            0 => a0w,
            1 => a1w,
            2 => (6 * a0w + a1w) / 7,
            3 => (5 * a0w + 2 * a1w) / 7,
            4 => (4 * a0w + 3 * a1w) / 7,
            5 => (3 * a0w + 4 * a1w) / 7,
            6 => (2 * a0w + 5 * a1w) / 7,
            _ => (a0w + 6 * a1w) / 7,
        }
    } else {
        match a3 & 7 {
            0 => a0w,
            1 => a1w,
            2 => (4 * a0w + a1w) / 5,
            3 => (3 * a0w + 2 * a1w) / 5,
            4 => (2 * a0w + 3 * a1w) / 5,
            5 => (a0w + 4 * a1w) / 5,
            6 => 0,
            _ => 255,
        }
    };
    v.min(255) as u8
}

fn decode_dxt1_tile(block: &[u8], flags: DxtPalFlags, tile: &mut [u32; 16]) {
    let pal = dxt_tile_palette(block, flags);
    if flags.big_endian {
        // The big-endian index word stores the tile backwards: the low two
        // bits select pixel (3,3), walking up to pixel (0,0).
        let mut indexes = u32::from_be_bytes([block[4], block[5], block[6], block[7]]);
        for px in tile.iter_mut().rev() {
            *px = pal[(indexes & 3) as usize].0;
            indexes >>= 2;
        }
    } else {
        // Bit 0 is pixel (0,0), scanned row-major within the tile.
        let mut indexes = u32::from_le_bytes([block[4], block[5], block[6], block[7]]);
        for px in tile.iter_mut() {
            *px = pal[(indexes & 3) as usize].0;
            indexes >>= 2;
        }
    }
}

// -------------------------------------------------------------------------------------------------

fn from_dxt1_common(
    width: usize,
    height: usize,
    img_buf: &[u8],
    flags: DxtPalFlags,
) -> DecodeResult<Image> {
    check_geometry(width, height)?;
    let phys_w = align4(width);
    let phys_h = align4(height);
    check_len(img_buf, phys_w * phys_h / 2)?;

    let mut img = Image::new(phys_w, phys_h, ImageFormat::Argb32)?;
    let mut tile = [0u32; 16];
    let mut blocks = img_buf.chunks_exact(8);
    for ty in 0..phys_h / 4 {
        for tx in 0..phys_w / 4 {
            decode_dxt1_tile(blocks.next().expect("length checked above"), flags, &mut tile);
            blit_tile_argb32::<4, 4>(&mut img, &tile, tx, ty);
        }
    }

    if width < phys_w || height < phys_h {
        img.shrink(width, height)?;
    }
    img.set_sbit(SBit::new(8, 8, 8, 0, 1));
    Ok(img)
}

/// DXT1/BC1; in the c0 <= c1 case palette entry 3 is opaque black.
pub fn from_dxt1(width: usize, height: usize, img_buf: &[u8]) -> DecodeResult<Image> {
    from_dxt1_common(width, height, img_buf, DxtPalFlags::default())
}

/// DXT1 with 1-bit alpha; palette entry 3 is fully transparent.
pub fn from_dxt1_a1(width: usize, height: usize, img_buf: &[u8]) -> DecodeResult<Image> {
    from_dxt1_common(
        width,
        height,
        img_buf,
        DxtPalFlags { color3_alpha: true, ..DxtPalFlags::default() },
    )
}

/// GameCube DXT1: big-endian color/index words, palette entry 3 always
/// transparent, and blocks grouped into 2x2 macroblocks covering 8x8 pixels.
pub fn from_dxt1_gcn(width: usize, height: usize, img_buf: &[u8]) -> DecodeResult<Image> {
    check_geometry(width, height)?;
    if width % 8 != 0 || height % 8 != 0 {
        return Err(DecodeError::InvalidGeometry {
            width: width as u32,
            height: height as u32,
            reason: "GameCube DXT1 requires 8x8 alignment",
        });
    }
    check_len(img_buf, width * height / 2)?;

    let flags = DxtPalFlags { big_endian: true, color3_alpha: true, ..DxtPalFlags::default() };
    let mut img = Image::new(width, height, ImageFormat::Argb32)?;
    let tiles_x = width / 4;
    let tiles_y = height / 4;
    let mut blocks = img_buf.chunks_exact(8);
    let mut tile = [0u32; 16];
    for my in (0..tiles_y).step_by(2) {
        for mx in (0..tiles_x).step_by(2) {
            // Macroblock order: tile0 tile1 / tile2 tile3.
            for (dy, dx) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
                decode_dxt1_tile(blocks.next().expect("length checked above"), flags, &mut tile);
                blit_tile_argb32::<4, 4>(&mut img, &tile, mx + dx, my + dy);
            }
        }
    }
    img.set_sbit(SBit::new(8, 8, 8, 0, 1));
    Ok(img)
}

/// DXT3/BC2: 4-bit explicit alpha plus a DXT1 color block with c0 > c1
/// behavior forced.
pub fn from_dxt3(width: usize, height: usize, img_buf: &[u8]) -> DecodeResult<Image> {
    check_geometry(width, height)?;
    let phys_w = align4(width);
    let phys_h = align4(height);
    check_len(img_buf, phys_w * phys_h)?;

    let flags = DxtPalFlags { color0_gt_color1: true, ..DxtPalFlags::default() };
    let mut img = Image::new(phys_w, phys_h, ImageFormat::Argb32)?;
    let mut tile = [0u32; 16];
    let mut blocks = img_buf.chunks_exact(16);
    for ty in 0..phys_h / 4 {
        for tx in 0..phys_w / 4 {
            let block = blocks.next().expect("length checked above");
            decode_dxt1_tile(&block[8..], flags, &mut tile);

            // Pixel (0,0) alpha is the low nibble of the first alpha byte.
            let mut alpha = u64::from_le_bytes(block[..8].try_into().unwrap());
            for px in tile.iter_mut() {
                let a4 = (alpha & 0xF) as u32;
                *px = (*px & 0x00FF_FFFF) | (a4 << 24) | (a4 << 28);
                alpha >>= 4;
            }
            blit_tile_argb32::<4, 4>(&mut img, &tile, tx, ty);
        }
    }

    if width < phys_w || height < phys_h {
        img.shrink(width, height)?;
    }
    img.set_sbit(SBit::new(8, 8, 8, 0, 4));
    Ok(img)
}

/// DXT2/BC2 premultiplied: DXT3 followed by an un-premultiply pass.
pub fn from_dxt2(width: usize, height: usize, img_buf: &[u8]) -> DecodeResult<Image> {
    let mut img = from_dxt3(width, height, img_buf)?;
    img.un_premultiply();
    Ok(img)
}

/// DXT5/BC3: interpolated alpha sub-block plus a DXT1 color block.
pub fn from_dxt5(width: usize, height: usize, img_buf: &[u8]) -> DecodeResult<Image> {
    check_geometry(width, height)?;
    let phys_w = align4(width);
    let phys_h = align4(height);
    check_len(img_buf, phys_w * phys_h)?;

    let mut img = Image::new(phys_w, phys_h, ImageFormat::Argb32)?;
    let mut tile = [0u32; 16];
    let mut blocks = img_buf.chunks_exact(16);
    for ty in 0..phys_h / 4 {
        for tx in 0..phys_w / 4 {
            let block = blocks.next().expect("length checked above");
            decode_dxt1_tile(&block[8..], DxtPalFlags::default(), &mut tile);

            let (a0, a1) = (block[0], block[1]);
            let mut alpha48 = extract48(block);
            for px in tile.iter_mut() {
                let a = dxt5_alpha(alpha48 & 7, a0, a1) as u32;
                *px = (*px & 0x00FF_FFFF) | (a << 24);
                alpha48 >>= 3;
            }
            blit_tile_argb32::<4, 4>(&mut img, &tile, tx, ty);
        }
    }

    if width < phys_w || height < phys_h {
        img.shrink(width, height)?;
    }
    img.set_sbit(SBit::new(8, 8, 8, 0, 8));
    Ok(img)
}

/// DXT4/BC3 premultiplied: DXT5 followed by an un-premultiply pass.
pub fn from_dxt4(width: usize, height: usize, img_buf: &[u8]) -> DecodeResult<Image> {
    let mut img = from_dxt5(width, height, img_buf)?;
    img.un_premultiply();
    Ok(img)
}

/// BC4/ATI1: one DXT5-style sub-block driving the red channel.
pub fn from_bc4(width: usize, height: usize, img_buf: &[u8]) -> DecodeResult<Image> {
    check_geometry(width, height)?;
    let phys_w = align4(width);
    let phys_h = align4(height);
    check_len(img_buf, phys_w * phys_h / 2)?;

    let mut img = Image::new(phys_w, phys_h, ImageFormat::Argb32)?;
    let mut tile = [0u32; 16];
    let mut blocks = img_buf.chunks_exact(8);
    for ty in 0..phys_h / 4 {
        for tx in 0..phys_w / 4 {
            let block = blocks.next().expect("length checked above");
            let (r0, r1) = (block[0], block[1]);
            let mut red48 = extract48(block);
            for px in tile.iter_mut() {
                let r = dxt5_alpha(red48 & 7, r0, r1) as u32;
                *px = 0xFF00_0000 | (r << 16);
                red48 >>= 3;
            }
            blit_tile_argb32::<4, 4>(&mut img, &tile, tx, ty);
        }
    }

    if width < phys_w || height < phys_h {
        img.shrink(width, height)?;
    }
    img.set_sbit(SBit::new(8, 1, 1, 0, 0));
    Ok(img)
}

/// BC5/ATI2: two DXT5-style sub-blocks driving red and green.
pub fn from_bc5(width: usize, height: usize, img_buf: &[u8]) -> DecodeResult<Image> {
    check_geometry(width, height)?;
    let phys_w = align4(width);
    let phys_h = align4(height);
    check_len(img_buf, phys_w * phys_h)?;

    let mut img = Image::new(phys_w, phys_h, ImageFormat::Argb32)?;
    let mut tile = [0u32; 16];
    let mut blocks = img_buf.chunks_exact(16);
    for ty in 0..phys_h / 4 {
        for tx in 0..phys_w / 4 {
            let block = blocks.next().expect("length checked above");
            let (r0, r1) = (block[0], block[1]);
            let (g0, g1) = (block[8], block[9]);
            let mut red48 = extract48(&block[..8]);
            let mut green48 = extract48(&block[8..]);
            for px in tile.iter_mut() {
                let r = dxt5_alpha(red48 & 7, r0, r1) as u32;
                let g = dxt5_alpha(green48 & 7, g0, g1) as u32;
                *px = 0xFF00_0000 | (r << 16) | (g << 8);
                red48 >>= 3;
                green48 >>= 3;
            }
            blit_tile_argb32::<4, 4>(&mut img, &tile, tx, ty);
        }
    }

    if width < phys_w || height < phys_h {
        img.shrink(width, height)?;
    }
    img.set_sbit(SBit::new(8, 8, 1, 0, 0));
    Ok(img)
}

// -------------------------------------------------------------------------------------------------

/// Post pass for LATC1-style textures: copies red into green and blue.
pub fn red8_to_l8(img: &mut Image) {
    debug_assert_eq!(img.format(), ImageFormat::Argb32);
    for y in 0..img.height() {
        for px in img.scanline_argb32_mut(y) {
            let r = (*px >> 16) & 0xFF;
            *px = 0xFF00_0000 | (r << 16) | (r << 8) | r;
        }
    }
    img.set_sbit(SBit::new(8, 8, 8, 8, 0));
}

/// Post pass for LATC2-style textures: luminance from red, alpha from green.
pub fn rg8_to_la8(img: &mut Image) {
    debug_assert_eq!(img.format(), ImageFormat::Argb32);
    for y in 0..img.height() {
        for px in img.scanline_argb32_mut(y) {
            let r = (*px >> 16) & 0xFF;
            let g = (*px >> 8) & 0xFF;
            *px = (g << 24) | (r << 16) | (r << 8) | r;
        }
    }
    img.set_sbit(SBit::new(8, 8, 8, 8, 8));
}

// -------------------------------------------------------------------------------------------------
