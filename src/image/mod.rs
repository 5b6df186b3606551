pub mod blit;

use std::sync::Arc;

use crate::{
    error::{DecodeError, DecodeResult},
    pixel::{Argb32, SBit},
};

// -------------------------------------------------------------------------------------------------

pub const MAX_DIMENSION: usize = 32768;

/// Row strides are padded to this boundary; fixed at image creation.
const STRIDE_ALIGN: usize = 16;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ImageFormat {
    Ci8,
    Argb32,
}

impl ImageFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            ImageFormat::Ci8 => 1,
            ImageFormat::Argb32 => 4,
        }
    }
}

/// Decoded images are shared by value; a decoder never mutates an image it
/// has already returned.
pub type SharedImage = Arc<Image>;

/// An owned rectangle of pixels: either 8-bit palette indices with a 256-entry
/// ARGB32 palette, or host-endian ARGB32.
#[derive(Debug)]
pub struct Image {
    width: usize,
    height: usize,
    format: ImageFormat,
    stride: usize,
    /// Backing store in 32-bit words so ARGB32 scanline views never have
    /// alignment trouble; CI8 images view it as bytes.
    bits: Vec<u32>,
    palette: Option<Box<[u32; 256]>>,
    tr_idx: Option<u8>,
    sbit: Option<SBit>,
}

impl Image {
    /// Allocates a zeroed image. The palette (CI8 only) starts zeroed and
    /// `tr_idx` unset.
    pub fn new(width: usize, height: usize, format: ImageFormat) -> DecodeResult<Self> {
        if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(DecodeError::InvalidGeometry {
                width: width as u32,
                height: height as u32,
                reason: "dimensions out of range",
            });
        }

        let row_bytes = width * format.bytes_per_pixel();
        let stride = (row_bytes + STRIDE_ALIGN - 1) / STRIDE_ALIGN * STRIDE_ALIGN;
        let total_words =
            stride.checked_mul(height).ok_or(DecodeError::AllocationFailed)? / 4;

        let mut bits = Vec::new();
        bits.try_reserve_exact(total_words).map_err(|_| DecodeError::AllocationFailed)?;
        bits.resize(total_words, 0u32);

        let palette = match format {
            ImageFormat::Ci8 => Some(Box::new([0u32; 256])),
            ImageFormat::Argb32 => None,
        };

        Ok(Self { width, height, format, stride, bits, palette, tr_idx: None, sbit: None })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// Bytes per row, including padding. Fixed at creation.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Bytes per row actually covered by pixels.
    pub fn row_bytes(&self) -> usize {
        self.width * self.format.bytes_per_pixel()
    }

    pub fn bits(&self) -> &[u8] {
        bytemuck::cast_slice(&self.bits)
    }

    pub fn bits_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(&mut self.bits)
    }

    /// Row `y`, `stride()` bytes long.
    pub fn scanline(&self, y: usize) -> &[u8] {
        &bytemuck::cast_slice(&self.bits)[y * self.stride..(y + 1) * self.stride]
    }

    pub fn scanline_mut(&mut self, y: usize) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut(&mut self.bits)[y * self.stride..(y + 1) * self.stride]
    }

    /// Row `y` of an ARGB32 image as host-endian words (`width()` entries).
    pub fn scanline_argb32(&self, y: usize) -> &[u32] {
        debug_assert_eq!(self.format, ImageFormat::Argb32);
        let words = self.stride / 4;
        &self.bits[y * words..y * words + self.width]
    }

    pub fn scanline_argb32_mut(&mut self, y: usize) -> &mut [u32] {
        debug_assert_eq!(self.format, ImageFormat::Argb32);
        let words = self.stride / 4;
        &mut self.bits[y * words..y * words + self.width]
    }

    pub fn palette(&self) -> Option<&[u32; 256]> {
        self.palette.as_deref()
    }

    pub fn palette_mut(&mut self) -> Option<&mut [u32; 256]> {
        self.palette.as_deref_mut()
    }

    pub fn palette_len(&self) -> usize {
        match self.palette {
            Some(_) => 256,
            None => 0,
        }
    }

    pub fn tr_idx(&self) -> Option<u8> {
        self.tr_idx
    }

    pub fn set_tr_idx(&mut self, tr_idx: Option<u8>) {
        debug_assert!(tr_idx.is_none() || self.format == ImageFormat::Ci8);
        self.tr_idx = tr_idx;
    }

    pub fn sbit(&self) -> Option<SBit> {
        self.sbit
    }

    pub fn set_sbit(&mut self, sbit: SBit) {
        self.sbit = sbit_clamped(sbit);
    }

    /// Returns a new image with rows in reverse vertical order. Palette,
    /// `tr_idx` and sBIT carry over.
    pub fn flip_vertical(&self) -> DecodeResult<Image> {
        let mut out = Image::new(self.width, self.height, self.format)?;
        for y in 0..self.height {
            let src = self.scanline(self.height - 1 - y);
            out.scanline_mut(y).copy_from_slice(src);
        }
        out.palette = self.palette.clone();
        out.tr_idx = self.tr_idx;
        out.sbit = self.sbit;
        Ok(out)
    }

    /// Crops in place to a smaller `(width, height)`. The stride is
    /// preserved, so the top-left region is untouched.
    pub fn shrink(&mut self, width: usize, height: usize) -> DecodeResult<()> {
        if width == 0 || height == 0 || width > self.width || height > self.height {
            return Err(DecodeError::InvalidGeometry {
                width: width as u32,
                height: height as u32,
                reason: "shrink target larger than image",
            });
        }
        self.width = width;
        self.height = height;
        self.bits.truncate(height * self.stride / 4);
        Ok(())
    }

    /// Resolves a CI8 image against its palette into a new ARGB32 image,
    /// honouring `tr_idx`. ARGB32 input is copied as-is.
    pub fn dup_argb32(&self) -> DecodeResult<Image> {
        let mut out = Image::new(self.width, self.height, ImageFormat::Argb32)?;
        match self.format {
            ImageFormat::Argb32 => {
                for y in 0..self.height {
                    let row = self.scanline_argb32(y).to_vec();
                    out.scanline_argb32_mut(y).copy_from_slice(&row);
                }
            }
            ImageFormat::Ci8 => {
                let palette = self.palette.as_deref().expect("CI8 image without palette");
                let mut resolved = *palette;
                if let Some(tr) = self.tr_idx {
                    resolved[tr as usize] = 0;
                }
                for y in 0..self.height {
                    let src = &self.scanline(y)[..self.width];
                    let dest = out.scanline_argb32_mut(y);
                    for (d, &idx) in dest.iter_mut().zip(src) {
                        *d = resolved[idx as usize];
                    }
                }
            }
        }
        out.sbit = self.sbit;
        Ok(out)
    }

    /// Converts premultiplied alpha back to straight alpha:
    /// `c = min(255, c * 255 / a)` for every pixel with non-zero alpha.
    pub fn un_premultiply(&mut self) {
        debug_assert_eq!(self.format, ImageFormat::Argb32);
        for y in 0..self.height {
            for px in self.scanline_argb32_mut(y) {
                let p = Argb32(*px);
                let a = p.a() as u32;
                if a == 0 || a == 255 {
                    continue;
                }
                let un = |c: u8| -> u8 { (((c as u32) * 255) / a).min(255) as u8 };
                *px = Argb32::from_channels(p.a(), un(p.r()), un(p.g()), un(p.b())).0;
            }
        }
    }

    /// Sets alpha to 0 for every pixel whose RGB equals the key's RGB.
    pub fn apply_chroma_key(&mut self, key: u32) {
        debug_assert_eq!(self.format, ImageFormat::Argb32);
        let key_rgb = key & 0x00FF_FFFF;
        for y in 0..self.height {
            for px in self.scanline_argb32_mut(y) {
                if *px & 0x00FF_FFFF == key_rgb {
                    *px = 0;
                }
            }
        }
    }
}

/// sBIT channels are capped at 8; an all-zero tuple is treated as unset.
fn sbit_clamped(sbit: SBit) -> Option<SBit> {
    let clamp = |v: u8| v.min(8);
    let s = SBit {
        r: clamp(sbit.r),
        g: clamp(sbit.g),
        b: clamp(sbit.b),
        gray: clamp(sbit.gray),
        alpha: clamp(sbit.alpha),
    };
    (s != SBit::default()).then_some(s)
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn checker(width: usize, height: usize) -> Image {
        let mut img = Image::new(width, height, ImageFormat::Argb32).unwrap();
        for y in 0..height {
            for (x, px) in img.scanline_argb32_mut(y).iter_mut().enumerate() {
                *px = if (x + y) % 2 == 0 { 0xFFFFFFFF } else { 0xFF000000 };
            }
        }
        img
    }

    #[test]
    fn rejects_invalid_geometry() {
        assert!(Image::new(0, 4, ImageFormat::Ci8).is_err());
        assert!(Image::new(4, MAX_DIMENSION + 1, ImageFormat::Ci8).is_err());
    }

    #[test]
    fn stride_covers_row_bytes() {
        let img = Image::new(10, 3, ImageFormat::Argb32).unwrap();
        assert!(img.stride() >= img.row_bytes());
        assert_eq!(img.stride() % 16, 0);
        assert_eq!(img.bits().len(), img.stride() * 3);
    }

    #[test]
    fn flip_twice_is_identity() {
        let img = checker(5, 4);
        let back = img.flip_vertical().unwrap().flip_vertical().unwrap();
        for y in 0..4 {
            assert_eq!(img.scanline_argb32(y), back.scanline_argb32(y));
        }
    }

    #[test]
    fn shrink_preserves_top_left() {
        let mut img = checker(8, 8);
        let expected: Vec<Vec<u32>> = (0..3).map(|y| img.scanline_argb32(y)[..5].to_vec()).collect();
        img.shrink(5, 3).unwrap();
        assert_eq!(img.width(), 5);
        assert_eq!(img.height(), 3);
        for (y, row) in expected.iter().enumerate() {
            assert_eq!(img.scanline_argb32(y), &row[..]);
        }
    }

    #[test]
    fn dup_argb32_honours_tr_idx() {
        let mut img = Image::new(4, 1, ImageFormat::Ci8).unwrap();
        img.palette_mut().unwrap()[0] = 0xFF102030;
        img.palette_mut().unwrap()[1] = 0xFFAABBCC;
        img.set_tr_idx(Some(1));
        img.scanline_mut(0)[..4].copy_from_slice(&[0, 1, 0, 1]);
        let dup = img.dup_argb32().unwrap();
        assert_eq!(dup.scanline_argb32(0), &[0xFF102030, 0, 0xFF102030, 0]);
        // The source image is untouched.
        assert_eq!(img.palette().unwrap()[1], 0xFFAABBCC);
    }

    #[test]
    fn un_premultiply_divides_by_alpha() {
        let mut img = Image::new(2, 1, ImageFormat::Argb32).unwrap();
        img.scanline_argb32_mut(0).copy_from_slice(&[0x80_40_40_40, 0x00_10_10_10]);
        img.un_premultiply();
        let row = img.scanline_argb32(0);
        assert_eq!(row[0], 0x80_7F_7F_7F);
        // Zero alpha stays untouched.
        assert_eq!(row[1], 0x00_10_10_10);
    }

    #[test]
    fn chroma_key_zeroes_matches() {
        let mut img = Image::new(3, 1, ImageFormat::Argb32).unwrap();
        img.scanline_argb32_mut(0).copy_from_slice(&[0xFF00FF00, 0xFF0000FF, 0x1200FF00]);
        img.apply_chroma_key(0xFF00FF00);
        assert_eq!(img.scanline_argb32(0), &[0, 0xFF0000FF, 0]);
    }
}
