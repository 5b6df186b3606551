//! ASTC 2D (LDR) decoding. The per-block transform is delegated to an
//! injected collaborator, matching the external-codec seam used for PNG;
//! this module owns block-shape validation, the tiled decode loop, and the
//! pad-then-crop geometry handling.

use crate::{
    error::{DecodeError, DecodeResult},
    image::{Image, ImageFormat},
    pixel::SBit,
};

// -------------------------------------------------------------------------------------------------

/// The fourteen standard ASTC 2D block shapes.
pub const ASTC_BLOCK_SIZES: [(u8, u8); 14] = [
    (4, 4),
    (5, 4),
    (5, 5),
    (6, 5),
    (6, 6),
    (8, 5),
    (8, 6),
    (8, 8),
    (10, 5),
    (10, 6),
    (10, 8),
    (10, 10),
    (12, 10),
    (12, 12),
];

pub fn is_valid_block_size(block_x: u8, block_y: u8) -> bool {
    ASTC_BLOCK_SIZES.contains(&(block_x, block_y))
}

/// One 16-byte ASTC block to ARGB32 pixels.
pub trait AstcBlockDecoder {
    /// Decodes `src` into `dst` (`block_w * block_h` row-major ARGB32
    /// pixels). Returns false on a malformed block.
    fn decompress(&self, dst: &mut [u32], src: &[u8; 16], srgb: bool, block_w: u8, block_h: u8)
        -> bool;
}

// -------------------------------------------------------------------------------------------------

/// ASTC 2D image to ARGB32. Physical dimensions round up to block-aligned
/// boundaries before decode; the final image is cropped.
pub fn from_astc<D: AstcBlockDecoder>(
    decoder: &D,
    width: usize,
    height: usize,
    img_buf: &[u8],
    block_x: u8,
    block_y: u8,
) -> DecodeResult<Image> {
    if width == 0 || height == 0 {
        return Err(DecodeError::InvalidGeometry {
            width: width as u32,
            height: height as u32,
            reason: "dimensions must be non-zero",
        });
    }
    if !is_valid_block_size(block_x, block_y) {
        return Err(DecodeError::InvalidPixelFormat(((block_x as u32) << 8) | block_y as u32));
    }

    let bx = block_x as usize;
    let by = block_y as usize;
    let tiles_x = (width + bx - 1) / bx;
    let tiles_y = (height + by - 1) / by;
    let phys_w = tiles_x * bx;
    let phys_h = tiles_y * by;

    let expected = tiles_x * tiles_y * 16;
    if img_buf.len() < expected {
        return Err(DecodeError::Truncated { expected, got: img_buf.len() });
    }

    let mut img = Image::new(phys_w, phys_h, ImageFormat::Argb32)?;
    // Largest standard block is 12x12.
    let mut tile = [0u32; 12 * 12];
    let mut blocks = img_buf.chunks_exact(16);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let src: &[u8; 16] =
                blocks.next().expect("length checked above").try_into().unwrap();
            if !decoder.decompress(&mut tile[..bx * by], src, false, block_x, block_y) {
                return Err(DecodeError::Corrupt("ASTC block decompression failed"));
            }
            for row in 0..by {
                let y = ty * by + row;
                let x0 = tx * bx;
                img.scanline_argb32_mut(y)[x0..x0 + bx]
                    .copy_from_slice(&tile[row * bx..(row + 1) * bx]);
            }
        }
    }

    if width < phys_w || height < phys_h {
        img.shrink(width, height)?;
    }
    img.set_sbit(SBit::new(8, 8, 8, 0, 8));
    Ok(img)
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Fills each block with a color derived from its first source byte.
    struct FlatDecoder;

    impl AstcBlockDecoder for FlatDecoder {
        fn decompress(
            &self,
            dst: &mut [u32],
            src: &[u8; 16],
            _srgb: bool,
            block_w: u8,
            block_h: u8,
        ) -> bool {
            debug_assert_eq!(dst.len(), block_w as usize * block_h as usize);
            let color = 0xFF00_0000 | src[0] as u32;
            dst.fill(color);
            true
        }
    }

    #[test]
    fn rejects_nonstandard_block_sizes() {
        assert!(is_valid_block_size(4, 4));
        assert!(is_valid_block_size(12, 12));
        assert!(!is_valid_block_size(4, 5));
        assert!(!is_valid_block_size(7, 7));
        assert!(from_astc(&FlatDecoder, 16, 16, &[0u8; 256], 3, 3).is_err());
    }

    #[test]
    fn pads_and_crops_to_requested_size() {
        // 13x13 at 10x10 blocks: 2x2 tiles, 20x20 physical.
        let mut buf = vec![0u8; 4 * 16];
        buf[0] = 0x11;
        buf[16] = 0x22;
        buf[32] = 0x33;
        buf[48] = 0x44;
        let img = from_astc(&FlatDecoder, 13, 13, &buf, 10, 10).unwrap();
        assert_eq!(img.width(), 13);
        assert_eq!(img.height(), 13);
        assert_eq!(img.scanline_argb32(0)[0], 0xFF000011);
        assert_eq!(img.scanline_argb32(0)[12], 0xFF000022);
        assert_eq!(img.scanline_argb32(12)[0], 0xFF000033);
        assert_eq!(img.scanline_argb32(12)[12], 0xFF000044);
    }

    #[test]
    fn failing_block_fails_the_decode() {
        struct FailingDecoder;
        impl AstcBlockDecoder for FailingDecoder {
            fn decompress(&self, _: &mut [u32], _: &[u8; 16], _: bool, _: u8, _: u8) -> bool {
                false
            }
        }
        let err = from_astc(&FailingDecoder, 4, 4, &[0u8; 16], 4, 4).unwrap_err();
        assert!(matches!(err, DecodeError::Corrupt(_)));
    }
}
