//! Sega PVR-family textures: Dreamcast PVR, GameCube GVR, PlayStation 2 SVR.
//!
//! An optional GBIX/GCIX prefix carries a global texture index; the 16-byte
//! main header follows. PVRT files are little-endian (SVR is disambiguated
//! by its pixel-format and image-data-type ranges), GVRT is big-endian.

use num_enum::TryFromPrimitive;

use crate::{
    decode::{bcn, linear, swizzle, tiled, twiddle, PixelFormat},
    error::{DecodeError, DecodeResult},
    image::SharedImage,
    io::ImageFile,
    reader::{Field, FormatReader},
};

// -------------------------------------------------------------------------------------------------

pub const PVR_HEADER_SIZE: usize = 16;

const MAX_TEXTURE_FILE_SIZE: u64 = 16 * 1024 * 1024;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PvrType {
    Pvr,
    Gvr,
    Svr,
    Pvrx,
}

/// PVR/SVR pixel formats (header byte 8).
#[derive(Copy, Clone, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum PvrPixelFormat {
    Argb1555 = 0x00,
    Rgb565 = 0x01,
    Argb4444 = 0x02,
    Yuv422 = 0x03,
    Bump = 0x04,
    Pal4bpp = 0x05,
    Pal8bpp = 0x06,
    // PlayStation 2 (SVR) range.
    SvrBgr5a3 = 0x08,
    SvrBgr888Abgr7888 = 0x09,
}

const SVR_PX_MIN: u8 = 0x08;
const SVR_PX_MAX: u8 = 0x09;

/// PVR/SVR image data types (header byte 9).
#[derive(Copy, Clone, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum PvrImageDataType {
    SquareTwiddled = 0x01,
    SquareTwiddledMipmap = 0x02,
    Vq = 0x03,
    VqMipmap = 0x04,
    Pal4Twiddled = 0x05,
    Pal8Twiddled = 0x06,
    Twiddled8 = 0x07,
    Twiddled4 = 0x08,
    Rectangle = 0x09,
    RectangleStride = 0x0B,
    RectangleTwiddled = 0x0D,
    SmallVq = 0x10,
    SmallVqMipmap = 0x11,
    SquareTwiddledMipmapAlt = 0x12,
    // PlayStation 2 (SVR) range.
    SvrRectangle = 0x60,
    SvrRectangleSwizzled = 0x61,
    SvrIndex8ExtPalette1 = 0x62,
    SvrIndex8ExtPalette2 = 0x64,
    SvrIndex4Bgr5a3Rectangle = 0x66,
    SvrIndex4Bgr5a3Square = 0x67,
    SvrIndex4Abgr8Rectangle = 0x68,
    SvrIndex4Abgr8Square = 0x69,
    SvrIndex8Bgr5a3Rectangle = 0x6A,
    SvrIndex8Bgr5a3Square = 0x6B,
    SvrIndex8Abgr8Rectangle = 0x6C,
    SvrIndex8Abgr8Square = 0x6D,
}

const SVR_IMG_MIN: u8 = 0x60;
const SVR_IMG_MAX: u8 = 0x6D;

/// GVR image data types (header byte 11). For GameCube this doubles as the
/// pixel format.
#[derive(Copy, Clone, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum GvrImageDataType {
    I4 = 0x00,
    I8 = 0x01,
    Ia4 = 0x02,
    Ia8 = 0x03,
    Rgb565 = 0x04,
    Rgb5a3 = 0x05,
    Argb8888 = 0x06,
    Ci4 = 0x08,
    Ci8 = 0x09,
    Dxt1 = 0x0E,
}

// -------------------------------------------------------------------------------------------------

/// The 16-byte PVRT/GVRT header, normalized to host values.
pub struct PvrHeader {
    pub pvr_type: PvrType,
    pub length: u32,
    pub px_format: u8,
    pub img_data_type: u8,
    pub width: u16,
    pub height: u16,
}

impl PvrHeader {
    /// Parses the main header; the caller has already stripped any GBIX
    /// prefix. Field endianness follows the magic.
    pub fn from_bytes(buf: &[u8]) -> DecodeResult<Self> {
        if buf.len() < PVR_HEADER_SIZE {
            return Err(DecodeError::Truncated { expected: PVR_HEADER_SIZE, got: buf.len() });
        }

        let pvr_type = if buf[..4] == b"PVRT"[..] {
            // SVR reuses the PVRT magic; its pixel-format or image-data-
            // type ranges give it away.
            let px_format = buf[8];
            let img_data_type = buf[9];
            if (SVR_PX_MIN..=SVR_PX_MAX).contains(&px_format)
                || (SVR_IMG_MIN..=SVR_IMG_MAX).contains(&img_data_type)
            {
                PvrType::Svr
            } else {
                PvrType::Pvr
            }
        } else if buf[..4] == b"GVRT"[..] {
            PvrType::Gvr
        } else if buf[..4] == b"PVRX"[..] {
            PvrType::Pvrx
        } else {
            return Err(DecodeError::BadMagic("PVR"));
        };

        let (length, px_format, img_data_type, width, height) = if pvr_type == PvrType::Gvr {
            (
                u32::from_be_bytes(buf[4..8].try_into().unwrap()),
                buf[10],
                buf[11],
                u16::from_be_bytes(buf[12..14].try_into().unwrap()),
                u16::from_be_bytes(buf[14..16].try_into().unwrap()),
            )
        } else {
            (
                u32::from_le_bytes(buf[4..8].try_into().unwrap()),
                buf[8],
                buf[9],
                u16::from_le_bytes(buf[12..14].try_into().unwrap()),
                u16::from_le_bytes(buf[14..16].try_into().unwrap()),
            )
        };

        Ok(Self { pvr_type, length, px_format, img_data_type, width, height })
    }
}

// -------------------------------------------------------------------------------------------------

pub struct SegaPvr<F: ImageFile> {
    file: F,
    header: PvrHeader,
    /// Length of the GBIX/GCIX prefix (0 when absent).
    gbix_len: u32,
    global_index: Option<u32>,
    img: Option<SharedImage>,
}

impl<F: ImageFile> SegaPvr<F> {
    pub fn open(mut file: F) -> DecodeResult<Self> {
        let mut head = [0u8; 32 + 128];
        let got = file.seek_and_read(0, &mut head)?;
        if got < 32 {
            return Err(DecodeError::Truncated { expected: 32, got });
        }
        let head = &head[..got];

        let mut gbix_len = 0u32;
        let mut global_index = None;
        let mut hdr_start = 0usize;
        if head[..4] == b"GBIX"[..] || head[..4] == b"GCIX"[..] {
            // The prefix length field is always little-endian; the index
            // itself follows the platform (GVR is big-endian).
            let len = u32::from_le_bytes(head[4..8].try_into().unwrap());
            if !(4..=128).contains(&len) {
                return Err(DecodeError::Corrupt("invalid GBIX length"));
            }
            gbix_len = 8 + len;
            hdr_start = gbix_len as usize;
            if head.len() < hdr_start + PVR_HEADER_SIZE {
                return Err(DecodeError::Truncated {
                    expected: hdr_start + PVR_HEADER_SIZE,
                    got: head.len(),
                });
            }
        }

        let header = PvrHeader::from_bytes(&head[hdr_start..])?;

        if gbix_len != 0 {
            let raw: [u8; 4] = head[8..12].try_into().unwrap();
            global_index = Some(if header.pvr_type == PvrType::Gvr {
                u32::from_be_bytes(raw)
            } else {
                u32::from_le_bytes(raw)
            });
        }

        if header.width == 0
            || header.width > 32768
            || header.height == 0
            || header.height > 32768
        {
            return Err(DecodeError::InvalidGeometry {
                width: header.width as u32,
                height: header.height as u32,
                reason: "dimensions out of range",
            });
        }
        if file.size() > MAX_TEXTURE_FILE_SIZE {
            return Err(DecodeError::Corrupt("texture file too large"));
        }

        Ok(Self { file, header, gbix_len, global_index, img: None })
    }

    pub fn pvr_type(&self) -> PvrType {
        self.header.pvr_type
    }

    pub fn global_index(&self) -> Option<u32> {
        self.global_index
    }

    fn data_start(&self) -> u64 {
        self.gbix_len as u64 + PVR_HEADER_SIZE as u64
    }

    /// Size of the mipmap pyramid stored before the base image, plus any
    /// filler blocks, for the twiddled-with-mipmaps and VQ-mipmap types.
    fn mipmap_bytes(&self) -> DecodeResult<u64> {
        use PvrImageDataType as Idt;
        let idt = PvrImageDataType::try_from(self.header.img_data_type);
        let (bpp, filler): (u64, u64) = match idt {
            Ok(Idt::SquareTwiddledMipmap) => (16, 16 / 8),        // 1x1 takes a 2x1 slot
            Ok(Idt::SquareTwiddledMipmapAlt) => (16, 3 * 16 / 8), // 1x1 takes a 2x2 slot
            Ok(Idt::VqMipmap) | Ok(Idt::SmallVqMipmap) => (2, 0),
            _ => return Ok(0),
        };

        let width = self.header.width as u64;
        if width != self.header.height as u64 || !width.is_power_of_two() {
            return Err(DecodeError::InvalidGeometry {
                width: self.header.width as u32,
                height: self.header.height as u32,
                reason: "mipmapped textures must be square powers of two",
            });
        }

        let mut total = filler;
        let mut size = 1u64;
        while size < width {
            total += (size * size * bpp / 8).max(1);
            size <<= 1;
        }
        Ok(total)
    }

    fn px_format(&self) -> DecodeResult<PixelFormat> {
        match PvrPixelFormat::try_from(self.header.px_format) {
            Ok(PvrPixelFormat::Argb1555) => Ok(PixelFormat::Argb1555),
            Ok(PvrPixelFormat::Rgb565) => Ok(PixelFormat::Rgb565),
            Ok(PvrPixelFormat::Argb4444) => Ok(PixelFormat::Argb4444),
            Ok(PvrPixelFormat::SvrBgr5a3) => Ok(PixelFormat::Bgr5a3),
            Ok(PvrPixelFormat::SvrBgr888Abgr7888) => Ok(PixelFormat::Bgr888Abgr7888),
            _ => Err(DecodeError::InvalidPixelFormat(self.header.px_format as u32)),
        }
    }

    fn read_at(&mut self, offset: u64, len: usize) -> DecodeResult<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.file.read_exact_at(offset, &mut buf)?;
        Ok(buf)
    }

    fn decode_pvr_svr(&mut self) -> DecodeResult<SharedImage> {
        use PvrImageDataType as Idt;

        let idt = PvrImageDataType::try_from(self.header.img_data_type).map_err(|_| {
            DecodeError::UnsupportedVersion {
                what: "PVR image data type",
                version: self.header.img_data_type as u32,
            }
        })?;
        let width = self.header.width as usize;
        let height = self.header.height as usize;
        let px_format = self.px_format()?;
        let is_32bit = px_format == PixelFormat::Bgr888Abgr7888;
        let bytespp = if is_32bit { 4 } else { 2 };

        // SVR palette formats are tagged twice; when the image data type's
        // implied palette width disagrees with the pixel format, the pixel
        // format wins.
        let idt_says_abgr8 = matches!(
            idt,
            Idt::SvrIndex4Abgr8Rectangle
                | Idt::SvrIndex4Abgr8Square
                | Idt::SvrIndex8Abgr8Rectangle
                | Idt::SvrIndex8Abgr8Square
        );
        let idt_says_bgr5a3 = matches!(
            idt,
            Idt::SvrIndex4Bgr5a3Rectangle
                | Idt::SvrIndex4Bgr5a3Square
                | Idt::SvrIndex8Bgr5a3Rectangle
                | Idt::SvrIndex8Bgr5a3Square
        );
        if (idt_says_abgr8 && !is_32bit) || (idt_says_bgr5a3 && is_32bit) {
            log::warn!(
                "SVR image data type {:#04x} disagrees with pixel format {:#04x}; \
                 using the pixel format",
                self.header.img_data_type,
                self.header.px_format
            );
        }

        let mipmap_bytes = self.mipmap_bytes()?;
        let data_start = self.data_start();

        let img = match idt {
            Idt::SquareTwiddled | Idt::SquareTwiddledMipmap | Idt::SquareTwiddledMipmapAlt => {
                let buf =
                    self.read_at(data_start + mipmap_bytes, width * height * 2)?;
                twiddle::from_dreamcast_square_twiddled16(px_format, width, height, &buf)?
            }

            Idt::Rectangle | Idt::RectangleStride | Idt::SvrRectangle
            | Idt::SvrRectangleSwizzled => {
                let buf =
                    self.read_at(data_start, width * height * bytespp)?;
                let img = if is_32bit {
                    linear::from_linear32(px_format, width, height, &buf, 0)?
                } else {
                    linear::from_linear16(px_format, width, height, &buf, 0)?
                };
                if idt == Idt::SvrRectangleSwizzled
                    && px_format == PixelFormat::Bgr5a3
                    && width >= 64
                    && height >= 64
                {
                    swizzle::svr_unswizzle_argb32(&img)?
                } else {
                    img
                }
            }

            Idt::Vq => {
                let pal_bytes = 1024 * 2;
                let img_bytes = width * height / 4;
                let buf = self.read_at(data_start, pal_bytes + img_bytes)?;
                twiddle::from_dreamcast_vq16(
                    px_format,
                    false,
                    false,
                    width,
                    height,
                    &buf[pal_bytes..],
                    &buf[..pal_bytes],
                )?
            }

            Idt::VqMipmap => {
                // The palette precedes the mipmaps.
                let pal = self.read_at(data_start, 1024 * 2)?;
                let buf =
                    self.read_at(data_start + mipmap_bytes + 1024 * 2, width * height / 4)?;
                twiddle::from_dreamcast_vq16(px_format, false, true, width, height, &buf, &pal)?
            }

            Idt::SmallVq => {
                let pal_bytes = twiddle::small_vq_palette_entries_no_mipmaps(width) * 2;
                let img_bytes = width * height / 4;
                let buf = self.read_at(data_start, pal_bytes + img_bytes)?;
                twiddle::from_dreamcast_vq16(
                    px_format,
                    true,
                    false,
                    width,
                    height,
                    &buf[pal_bytes..],
                    &buf[..pal_bytes],
                )?
            }

            Idt::SmallVqMipmap => {
                let pal_bytes = twiddle::small_vq_palette_entries_with_mipmaps(width) * 2;
                let pal = self.read_at(data_start, pal_bytes)?;
                let buf = self.read_at(
                    data_start + mipmap_bytes + pal_bytes as u64,
                    width * height / 4,
                )?;
                twiddle::from_dreamcast_vq16(px_format, true, true, width, height, &buf, &pal)?
            }

            Idt::SvrIndex4Bgr5a3Rectangle | Idt::SvrIndex4Bgr5a3Square
            | Idt::SvrIndex4Abgr8Rectangle | Idt::SvrIndex4Abgr8Square => {
                let pal_bytes = 16 * bytespp;
                let img_bytes = width * height / 2;
                let buf = self.read_at(data_start, pal_bytes + img_bytes)?;
                let img = linear::from_linear_ci4(
                    px_format,
                    false,
                    width,
                    height,
                    &buf[pal_bytes..],
                    &buf[..pal_bytes],
                    0,
                )?;
                if width >= 128 && height >= 128 {
                    swizzle::svr_unswizzle_ci8(&img)?
                } else {
                    img
                }
            }

            Idt::SvrIndex8Bgr5a3Rectangle | Idt::SvrIndex8Bgr5a3Square
            | Idt::SvrIndex8Abgr8Rectangle | Idt::SvrIndex8Abgr8Square => {
                let pal_bytes = 256 * bytespp;
                let img_bytes = width * height;
                let mut buf = self.read_at(data_start, pal_bytes + img_bytes)?;
                // The image bytes carry palette indices with bits 3 and 4
                // transposed; swapping them here keeps the palette order.
                swizzle::svr_swap_index_bits(&mut buf[pal_bytes..]);
                let img = linear::from_linear_ci8(
                    px_format,
                    width,
                    height,
                    &buf[pal_bytes..],
                    &buf[..pal_bytes],
                    0,
                )?;
                if width >= 128 && height >= 64 {
                    swizzle::svr_unswizzle_ci8(&img)?
                } else {
                    img
                }
            }

            _ => {
                return Err(DecodeError::UnsupportedVersion {
                    what: "PVR image data type",
                    version: self.header.img_data_type as u32,
                })
            }
        };

        Ok(SharedImage::new(img))
    }

    fn decode_gvr(&mut self) -> DecodeResult<SharedImage> {
        use GvrImageDataType as Idt;

        let idt = GvrImageDataType::try_from(self.header.img_data_type).map_err(|_| {
            DecodeError::UnsupportedVersion {
                what: "GVR image data type",
                version: self.header.img_data_type as u32,
            }
        })?;
        let width = self.header.width as usize;
        let height = self.header.height as usize;

        let expected = match idt {
            Idt::I4 | Idt::Dxt1 | Idt::Ci4 => width * height / 2,
            Idt::I8 | Idt::Ia4 | Idt::Ci8 => width * height,
            Idt::Ia8 | Idt::Rgb565 | Idt::Rgb5a3 => width * height * 2,
            Idt::Argb8888 => width * height * 4,
        };
        let buf = self.read_at(self.data_start(), expected)?;

        let img = match idt {
            Idt::I8 => tiled::from_gcn_i8(width, height, &buf)?,
            Idt::Ia8 => tiled::from_gcn16(PixelFormat::Ia8, width, height, &buf)?,
            Idt::Rgb565 => tiled::from_gcn16(PixelFormat::Rgb565, width, height, &buf)?,
            Idt::Rgb5a3 => tiled::from_gcn16(PixelFormat::Rgb5a3, width, height, &buf)?,
            Idt::Dxt1 => bcn::from_dxt1_gcn(width, height, &buf)?,
            Idt::Ci4 => {
                // No palette in the file; fall back to a grayscale RGB5A3
                // ramp so the image structure is at least visible.
                let mut pal = [0u8; 16 * 2];
                for (i, chunk) in pal.chunks_exact_mut(2).enumerate() {
                    let v = (i * 2) as u16;
                    let px = 0x8000 | v | (v << 5) | (v << 10);
                    chunk.copy_from_slice(&px.to_be_bytes());
                }
                tiled::from_gcn_ci4(width, height, &buf, &pal)?
            }
            Idt::Ci8 => {
                let mut pal = vec![0u8; 256 * 2];
                for (i, chunk) in pal.chunks_exact_mut(2).enumerate() {
                    let v = (i >> 3) as u16;
                    let px = 0x8000 | v | (v << 5) | (v << 10);
                    chunk.copy_from_slice(&px.to_be_bytes());
                }
                tiled::from_gcn_ci8(width, height, &buf, &pal)?
            }
            _ => {
                return Err(DecodeError::UnsupportedVersion {
                    what: "GVR image data type",
                    version: self.header.img_data_type as u32,
                })
            }
        };

        Ok(SharedImage::new(img))
    }
}

impl<F: ImageFile> FormatReader for SegaPvr<F> {
    fn format_name(&self) -> &'static str {
        match self.header.pvr_type {
            PvrType::Pvr => "Sega Dreamcast PVR",
            PvrType::Gvr => "Sega GVR for GameCube",
            PvrType::Svr => "Sega SVR for PlayStation 2",
            PvrType::Pvrx => "Sega PVRX for Xbox",
        }
    }

    fn fields(&self) -> Vec<Field> {
        let mut fields = vec![
            Field::number("Width", self.header.width),
            Field::number("Height", self.header.height),
            Field::number("Pixel Format", self.header.px_format),
            Field::number("Image Data Type", self.header.img_data_type),
        ];
        if let Some(gbix) = self.global_index {
            fields.push(Field::number("Global Index", gbix));
        }
        fields
    }

    fn decode_image(&mut self) -> DecodeResult<SharedImage> {
        if let Some(img) = &self.img {
            return Ok(img.clone());
        }
        let img = match self.header.pvr_type {
            PvrType::Pvr | PvrType::Svr => self.decode_pvr_svr()?,
            PvrType::Gvr => self.decode_gvr()?,
            PvrType::Pvrx => {
                return Err(DecodeError::UnsupportedVersion {
                    what: "Xbox PVRX",
                    version: 0,
                })
            }
        };
        self.img = Some(img.clone());
        Ok(img)
    }
}

// -------------------------------------------------------------------------------------------------
