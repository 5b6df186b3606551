//! Tile blit kernels. A tile is a row-major `W x H` rectangle of pixels; it
//! lands in the image at `(tile_x * W, tile_y * H)`. Callers size the image
//! so every tile fits; the kernels do not re-check per pixel.

use super::{Image, ImageFormat};

/// Copies a `W x H` ARGB32 tile into an ARGB32 image.
pub fn blit_tile_argb32<const W: usize, const H: usize>(
    img: &mut Image,
    tile: &[u32],
    tile_x: usize,
    tile_y: usize,
) {
    debug_assert_eq!(img.format(), ImageFormat::Argb32);
    debug_assert_eq!(tile.len(), W * H);

    for (row, tile_row) in tile.chunks_exact(W).enumerate() {
        let y = tile_y * H + row;
        let x0 = tile_x * W;
        img.scanline_argb32_mut(y)[x0..x0 + W].copy_from_slice(tile_row);
    }
}

/// Copies a `W x H` CI8 tile into a CI8 image.
pub fn blit_tile_ci8<const W: usize, const H: usize>(
    img: &mut Image,
    tile: &[u8],
    tile_x: usize,
    tile_y: usize,
) {
    debug_assert_eq!(img.format(), ImageFormat::Ci8);
    debug_assert_eq!(tile.len(), W * H);

    for (row, tile_row) in tile.chunks_exact(W).enumerate() {
        let y = tile_y * H + row;
        let x0 = tile_x * W;
        img.scanline_mut(y)[x0..x0 + W].copy_from_slice(tile_row);
    }
}

/// Expands a `W x H` CI4 tile into a CI8 image. The low nibble of each input
/// byte is the left pixel (NDS, Dreamcast).
pub fn blit_tile_ci4_left_lsn<const W: usize, const H: usize>(
    img: &mut Image,
    tile: &[u8],
    tile_x: usize,
    tile_y: usize,
) {
    debug_assert_eq!(img.format(), ImageFormat::Ci8);
    debug_assert_eq!(W % 2, 0);
    debug_assert_eq!(tile.len(), W * H / 2);

    for (row, tile_row) in tile.chunks_exact(W / 2).enumerate() {
        let y = tile_y * H + row;
        let x0 = tile_x * W;
        let dest = &mut img.scanline_mut(y)[x0..x0 + W];
        for (pair, &b) in dest.chunks_exact_mut(2).zip(tile_row) {
            pair[0] = b & 0x0F;
            pair[1] = b >> 4;
        }
    }
}

/// Expands a `W x H` CI4 tile into a CI8 image. The high nibble of each input
/// byte is the left pixel (GameCube).
pub fn blit_tile_ci4_left_msn<const W: usize, const H: usize>(
    img: &mut Image,
    tile: &[u8],
    tile_x: usize,
    tile_y: usize,
) {
    debug_assert_eq!(img.format(), ImageFormat::Ci8);
    debug_assert_eq!(W % 2, 0);
    debug_assert_eq!(tile.len(), W * H / 2);

    for (row, tile_row) in tile.chunks_exact(W / 2).enumerate() {
        let y = tile_y * H + row;
        let x0 = tile_x * W;
        let dest = &mut img.scanline_mut(y)[x0..x0 + W];
        for (pair, &b) in dest.chunks_exact_mut(2).zip(tile_row) {
            pair[0] = b >> 4;
            pair[1] = b & 0x0F;
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::DecodeResult, image::ImageFormat};

    #[test]
    fn argb32_tile_lands_at_grid_position() -> DecodeResult<()> {
        let mut img = Image::new(8, 8, ImageFormat::Argb32)?;
        let tile: Vec<u32> = (0..16).map(|i| 0xFF000000 | i).collect();
        blit_tile_argb32::<4, 4>(&mut img, &tile, 1, 1);
        assert_eq!(img.scanline_argb32(4)[4], 0xFF000000);
        assert_eq!(img.scanline_argb32(7)[7], 0xFF00000F);
        assert_eq!(img.scanline_argb32(0)[0], 0);
        Ok(())
    }

    #[test]
    fn ci4_nibble_order() -> DecodeResult<()> {
        let tile = [0x21u8, 0x43];
        let mut lsn = Image::new(4, 1, ImageFormat::Ci8)?;
        blit_tile_ci4_left_lsn::<4, 1>(&mut lsn, &tile, 0, 0);
        assert_eq!(&lsn.scanline(0)[..4], &[1, 2, 3, 4]);

        let mut msn = Image::new(4, 1, ImageFormat::Ci8)?;
        blit_tile_ci4_left_msn::<4, 1>(&mut msn, &tile, 0, 0);
        assert_eq!(&msn.scanline(0)[..4], &[2, 1, 4, 3]);
        Ok(())
    }
}
