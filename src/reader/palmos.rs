//! Palm OS application resources (.prc) and the `tAIB` icon bitmaps.
//!
//! A PRC file is a big-endian resource directory; the application icon is a
//! chain of `BitmapType` structs (versions 0-3) at the `tAIB`/1000 resource,
//! one per depth/density. The best bitmap wins: newest version, then
//! deepest, then largest.

use std::collections::BTreeMap;

use nom::{
    bytes::complete::take,
    number::complete::{be_u16, be_u32, le_u8},
    IResult,
};

use crate::{
    compression,
    decode::{linear, palette::DecodedPalette, PixelFormat},
    error::{DecodeError, DecodeResult},
    image::{Image, SharedImage},
    io::ImageFile,
    pixel::{convert, SBit},
    reader::{Field, FormatReader},
};

// -------------------------------------------------------------------------------------------------

pub const PRC_HEADER_SIZE: usize = 0x4E;
pub const PRC_RES_HEADER_SIZE: usize = 10;

const RES_TYPE_ICON: u32 = u32::from_be_bytes(*b"tAIB");
const RES_TYPE_APP_NAME: u32 = u32::from_be_bytes(*b"tAIN");
const RES_TYPE_APP_VERSION: u32 = u32::from_be_bytes(*b"tver");
const LARGE_ICON_ID: u16 = 1000;

/// Header bytes before the pixel data, per BitmapType version.
const HEADER_SIZE_TBL: [u64; 4] = [16, 16, 24, 28];

// BitmapType flags (big-endian u16 on disk).
const FLAG_COMPRESSED: u16 = 0x8000;
const FLAG_HAS_COLOR_TABLE: u16 = 0x4000;
const FLAG_HAS_TRANSPARENCY: u16 = 0x2000;
const FLAG_INDIRECT: u16 = 0x1000;
const FLAG_DIRECT_COLOR: u16 = 0x0400;
const FLAG_INDIRECT_COLOR_TABLE: u16 = 0x0200;

// Compression types.
const COMPRESSION_SCANLINE: u8 = 0x00;
const COMPRESSION_RLE: u8 = 0x01;
const COMPRESSION_PACKBITS: u8 = 0x02;
const COMPRESSION_NONE: u8 = 0xFF;

// v3 pixel formats.
const PIXEL_FORMAT_RGB565_BE: u8 = 0x01;
const PIXEL_FORMAT_RGB565_LE: u8 = 0x02;

// -------------------------------------------------------------------------------------------------

/// The fixed 256-entry Palm OS system palette: the 6x6x6 color cube from
/// white down to black, ten off-ramp grays, the three dark primaries, and a
/// black-filled tail.
pub const PALM_SYSTEM_PALETTE: [u32; 256] = build_system_palette();

const fn build_system_palette() -> [u32; 256] {
    let mut pal = [0xFF00_0000u32; 256];
    let mut r = 0;
    while r < 6 {
        let mut g = 0;
        while g < 6 {
            let mut b = 0;
            while b < 6 {
                let rv = (255 - 51 * r) as u32;
                let gv = (255 - 51 * g) as u32;
                let bv = (255 - 51 * b) as u32;
                pal[(r * 36 + g * 6 + b) as usize] =
                    0xFF00_0000 | (rv << 16) | (gv << 8) | bv;
                b += 1;
            }
            g += 1;
        }
        r += 1;
    }

    // Grays the cube is missing, then the dark primaries.
    let grays = [0x11u32, 0x22, 0x44, 0x55, 0x77, 0x88, 0xAA, 0xBB, 0xDD, 0xEE];
    let mut i = 0;
    while i < 10 {
        pal[216 + i] = 0xFF00_0000 | (grays[i] << 16) | (grays[i] << 8) | grays[i];
        i += 1;
    }
    pal[226] = 0xFFC0_C0C0;
    pal[227] = 0xFF80_0000;
    pal[228] = 0xFF00_8000;
    pal[229] = 0xFF00_0080;
    pal
}

// -------------------------------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub enum BitmapVariant {
    V0,
    V1 { next_depth_offset: u16 },
    V2 { next_depth_offset: u16, transparent_index: u8, compression_type: u8 },
    V3 { pixel_format: u8, compression_type: u8, density: u16, transparent_value: u32, next_bitmap_offset: u32 },
}

/// One BitmapType struct out of a `tAIB` chain. All fields big-endian.
#[derive(Clone, Debug)]
pub struct BitmapType {
    pub width: u16,
    pub height: u16,
    pub row_bytes: u16,
    pub flags: u16,
    pub pixel_size: u8,
    pub version: u8,
    pub variant: BitmapVariant,
}

impl BitmapType {
    pub fn from_bytes(buf: &[u8]) -> DecodeResult<Self> {
        let (_, bmp) = Self::parse(buf).map_err(DecodeError::from_parse)?;
        Ok(bmp)
    }

    fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, width) = be_u16(input)?;
        let (input, height) = be_u16(input)?;
        let (input, row_bytes) = be_u16(input)?;
        let (input, flags) = be_u16(input)?;
        let (input, pixel_size) = le_u8(input)?;
        let (input, version) = le_u8(input)?;

        let (input, variant) = match version {
            0 => (input, BitmapVariant::V0),
            1 => {
                let (input, next_depth_offset) = be_u16(input)?;
                (input, BitmapVariant::V1 { next_depth_offset })
            }
            2 => {
                let (input, next_depth_offset) = be_u16(input)?;
                let (input, transparent_index) = le_u8(input)?;
                let (input, compression_type) = le_u8(input)?;
                (input, BitmapVariant::V2 { next_depth_offset, transparent_index, compression_type })
            }
            _ => {
                let (input, _size) = le_u8(input)?;
                let (input, pixel_format) = le_u8(input)?;
                let (input, _unused) = le_u8(input)?;
                let (input, compression_type) = le_u8(input)?;
                let (input, density) = be_u16(input)?;
                let (input, transparent_value) = be_u32(input)?;
                let (input, next_bitmap_offset) = be_u32(input)?;
                (input, BitmapVariant::V3 {
                    pixel_format,
                    compression_type,
                    density,
                    transparent_value,
                    next_bitmap_offset,
                })
            }
        };
        Ok((input, Self { width, height, row_bytes, flags, pixel_size, version, variant }))
    }

    fn compression_type(&self) -> u8 {
        if self.flags & FLAG_COMPRESSED == 0 || self.version < 2 {
            return COMPRESSION_NONE;
        }
        match &self.variant {
            BitmapVariant::V2 { compression_type, .. } => *compression_type,
            BitmapVariant::V3 { compression_type, .. } => *compression_type,
            _ => COMPRESSION_NONE,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Decodes one Palm OS bitmap given its BitmapType and the address of the
/// struct within `file`. Shared by the PRC reader and standalone Tbmp use.
pub fn decode_bitmap<F: ImageFile>(
    file: &mut F,
    bitmap: &BitmapType,
    bitmap_addr: u64,
) -> DecodeResult<Image> {
    let version = bitmap.version;
    if version as usize >= HEADER_SIZE_TBL.len() {
        return Err(DecodeError::UnsupportedVersion {
            what: "BitmapType",
            version: version as u32,
        });
    }
    let mut addr = bitmap_addr + HEADER_SIZE_TBL[version as usize];

    let width = bitmap.width as usize;
    let height = bitmap.height as usize;
    if width == 0 || width > 256 || height == 0 || height > 256 {
        return Err(DecodeError::InvalidGeometry {
            width: width as u32,
            height: height as u32,
            reason: "icon dimensions out of range",
        });
    }
    let row_bytes = bitmap.row_bytes as usize;
    let icon_data_len = row_bytes * height;

    // v2 direct-color bitmaps carry a BitmapDirectInfoType before the data.
    let mut transparent_color: Option<[u8; 3]> = None;
    if bitmap.flags & FLAG_DIRECT_COLOR != 0 {
        if version < 2 || bitmap.pixel_size != 16 {
            return Err(DecodeError::Corrupt("directColor flag on a non-16bpp bitmap"));
        }
        if version == 2 {
            let mut info = [0u8; 8];
            file.read_exact_at(addr, &mut info)?;
            // redBits/greenBits/blueBits, reserved, then RGBColorType
            // (index, r, g, b).
            transparent_color = Some([info[5], info[6], info[7]]);
            addr += 8;
        }
    }

    let compr_type = bitmap.compression_type();
    let compr_data_len = if compr_type != COMPRESSION_NONE {
        let mut size_buf = [0u8; 4];
        if version >= 3 {
            file.read_exact_at(addr, &mut size_buf)?;
            addr += 4;
            u32::from_be_bytes(size_buf) as usize
        } else {
            file.read_exact_at(addr, &mut size_buf[..2])?;
            addr += 2;
            u16::from_be_bytes([size_buf[0], size_buf[1]]) as usize
        }
    } else {
        icon_data_len
    };

    if compr_data_len > icon_data_len {
        return Err(DecodeError::Corrupt("compressed size exceeds uncompressed size"));
    }

    let mut icon_data = vec![0u8; compr_data_len];
    file.read_exact_at(addr, &mut icon_data)?;

    match compr_type {
        COMPRESSION_NONE => {}
        COMPRESSION_SCANLINE => {
            icon_data = compression::decompress_scanline(&icon_data, row_bytes, height)?;
        }
        COMPRESSION_PACKBITS if bitmap.pixel_size == 8 => {
            icon_data = compression::decompress_packbits8(&icon_data, row_bytes, height)?;
        }
        COMPRESSION_RLE if bitmap.pixel_size == 8 => {
            icon_data = compression::decompress_rle(&icon_data, row_bytes, height)?;
        }
        _ => {
            return Err(DecodeError::UnsupportedVersion {
                what: "bitmap compression type",
                version: compr_type as u32,
            });
        }
    }

    match bitmap.pixel_size {
        // pixel_size 0 appears in v0 bitmaps only.
        0 | 1 => linear::from_linear_mono(width, height, &icon_data, row_bytes),

        2 => linear::from_linear_gray_2bpp(width, height, &icon_data, row_bytes),

        4 => {
            // 16-step grayscale ramp, 0xFF down to 0x00 by 0x11.
            let mut ramp = [0u32; 16];
            for (i, c) in ramp.iter_mut().enumerate() {
                let v = 0xFF - 0x11 * i as u32;
                *c = 0xFF00_0000 | (v << 16) | (v << 8) | v;
            }
            let pal = DecodedPalette::from_argb32(&ramp, SBit::new(4, 4, 4, 4, 0));
            linear::from_linear_ci4_with(&pal, true, width, height, &icon_data, row_bytes)
        }

        8 => {
            if version < 1 {
                return Err(DecodeError::UnsupportedVersion {
                    what: "8-bpp BitmapType",
                    version: version as u32,
                });
            }
            if bitmap.flags
                & (FLAG_HAS_COLOR_TABLE | FLAG_DIRECT_COLOR | FLAG_INDIRECT_COLOR_TABLE)
                != 0
            {
                return Err(DecodeError::UnsupportedVersion {
                    what: "8-bpp BitmapType flags",
                    version: bitmap.flags as u32,
                });
            }

            let pal =
                DecodedPalette::from_argb32(&PALM_SYSTEM_PALETTE, SBit::new(8, 8, 8, 0, 0));
            let mut img =
                linear::from_linear_ci8_with(&pal, width, height, &icon_data, row_bytes)?;

            if bitmap.flags & FLAG_HAS_TRANSPARENCY != 0 {
                let tr_idx = match &bitmap.variant {
                    BitmapVariant::V2 { transparent_index, .. } => *transparent_index,
                    BitmapVariant::V3 { transparent_value, .. } => *transparent_value as u8,
                    _ => 0,
                };
                img.palette_mut().unwrap()[tr_idx as usize] = 0;
                img.set_tr_idx(Some(tr_idx));
                img.set_sbit(SBit::new(8, 8, 8, 0, 1));
            }
            Ok(img)
        }

        16 => {
            if version < 2 {
                return Err(DecodeError::UnsupportedVersion {
                    what: "16-bpp BitmapType",
                    version: version as u32,
                });
            }
            if bitmap.flags & (FLAG_HAS_COLOR_TABLE | FLAG_INDIRECT | FLAG_INDIRECT_COLOR_TABLE)
                != 0
            {
                return Err(DecodeError::UnsupportedVersion {
                    what: "16-bpp BitmapType flags",
                    version: bitmap.flags as u32,
                });
            }

            // v2 data is RGB565 big-endian; v3 names its byte order.
            let pixel_format = match &bitmap.variant {
                BitmapVariant::V3 { pixel_format, .. } => *pixel_format,
                _ => PIXEL_FORMAT_RGB565_BE,
            };
            match pixel_format {
                PIXEL_FORMAT_RGB565_BE => {
                    for px in icon_data.chunks_exact_mut(2) {
                        px.swap(0, 1);
                    }
                }
                PIXEL_FORMAT_RGB565_LE => {}
                _ => {
                    return Err(DecodeError::InvalidPixelFormat(pixel_format as u32));
                }
            }

            let mut img =
                linear::from_linear16(PixelFormat::Rgb565, width, height, &icon_data, row_bytes)?;

            if bitmap.flags & FLAG_HAS_TRANSPARENCY != 0 {
                let key = match &bitmap.variant {
                    BitmapVariant::V2 { .. } => {
                        let [r, g, b] = transparent_color
                            .ok_or(DecodeError::Corrupt("missing BitmapDirectInfoType"))?;
                        // Mask and extend to what the RGB565 pixels decode to.
                        0xFF00_0000u32
                            | ((((r & 0xF8) | (r >> 5)) as u32) << 16)
                            | ((((g & 0xFC) | (g >> 6)) as u32) << 8)
                            | ((b & 0xF8) | (b >> 5)) as u32
                    }
                    BitmapVariant::V3 { transparent_value, .. } => {
                        convert::rgb565_to_argb32(*transparent_value as u16)
                    }
                    _ => 0,
                };
                img.apply_chroma_key(key);
            }
            Ok(img)
        }

        other => Err(DecodeError::InvalidPixelFormat(other as u32)),
    }
}

// -------------------------------------------------------------------------------------------------

struct PrcResource {
    res_type: u32,
    id: u16,
    addr: u32,
}

pub struct PalmOs<F: ImageFile> {
    file: F,
    name: [u8; 32],
    prc_type: u32,
    creator: u32,
    resources: Vec<PrcResource>,
    icon: Option<SharedImage>,
}

impl<F: ImageFile> PalmOs<F> {
    pub fn open(mut file: F) -> DecodeResult<Self> {
        let mut header = [0u8; PRC_HEADER_SIZE];
        file.read_exact_at(0, &mut header)?;

        let name: [u8; 32] = header[..32].try_into().unwrap();
        let prc_type = u32::from_be_bytes(header[0x3C..0x40].try_into().unwrap());
        let creator = u32::from_be_bytes(header[0x40..0x44].try_into().unwrap());
        let num_records = u16::from_be_bytes(header[0x4C..0x4E].try_into().unwrap()) as usize;

        // The type and creator are printable four-character codes.
        if num_records == 0
            || !prc_type.to_be_bytes().iter().all(|&c| (0x20..0x7F).contains(&c))
        {
            return Err(DecodeError::BadMagic("Palm OS PRC"));
        }

        let mut res_buf = vec![0u8; num_records * PRC_RES_HEADER_SIZE];
        file.read_exact_at(PRC_HEADER_SIZE as u64, &mut res_buf)?;

        let mut resources = Vec::with_capacity(num_records);
        for chunk in res_buf.chunks_exact(PRC_RES_HEADER_SIZE) {
            let res_type = u32::from_be_bytes(chunk[..4].try_into().unwrap());
            let id = u16::from_be_bytes(chunk[4..6].try_into().unwrap());
            let addr = u32::from_be_bytes(chunk[6..10].try_into().unwrap());
            if (addr as u64) >= file.size() {
                return Err(DecodeError::Corrupt("resource address out of bounds"));
            }
            resources.push(PrcResource { res_type, id, addr });
        }

        Ok(Self { file, name, prc_type, creator, resources, icon: None })
    }

    fn find_resource(&self, res_type: u32, id: u16) -> Option<&PrcResource> {
        self.resources.iter().find(|r| r.res_type == res_type && r.id == id)
    }

    /// Walks the bitmap chain at the icon resource and collects every
    /// BitmapType with its address.
    fn collect_bitmaps(&mut self, start: u64) -> DecodeResult<BTreeMap<u64, BitmapType>> {
        let mut bitmaps = BTreeMap::new();
        let mut addr = start;
        // Chains are short in practice; the cap breaks corrupt loops.
        for _ in 0..16 {
            if addr == 0 || addr >= self.file.size() {
                break;
            }
            let mut buf = [0u8; 28];
            let got = self.file.seek_and_read(addr, &mut buf)?;
            if got < 16 {
                break;
            }
            let bitmap = BitmapType::from_bytes(&buf[..got])?;

            let cur_addr = addr;
            match &bitmap.variant {
                BitmapVariant::V0 => addr = 0,
                BitmapVariant::V1 { next_depth_offset } => {
                    if bitmap.pixel_size == 255 {
                        // A 16-byte stub precedes the next bitmap.
                        addr += 16;
                        continue;
                    }
                    addr = if *next_depth_offset != 0 {
                        addr + *next_depth_offset as u64 * 4
                    } else {
                        0
                    };
                }
                BitmapVariant::V2 { next_depth_offset, .. } => {
                    addr = if *next_depth_offset != 0 {
                        addr + *next_depth_offset as u64 * 4
                    } else {
                        0
                    };
                }
                BitmapVariant::V3 { next_bitmap_offset, .. } => {
                    addr = if *next_bitmap_offset != 0 {
                        addr + *next_bitmap_offset as u64
                    } else {
                        0
                    };
                }
            }
            if bitmap.version > 3 {
                return Err(DecodeError::UnsupportedVersion {
                    what: "BitmapType",
                    version: bitmap.version as u32,
                });
            }
            if bitmap.width > 0 && bitmap.height > 0 {
                bitmaps.insert(cur_addr, bitmap);
            }
            if addr <= cur_addr {
                // Never walk backwards.
                break;
            }
        }
        Ok(bitmaps)
    }

    /// Highest version wins, then highest depth, then the larger icon.
    fn select_best(bitmaps: &BTreeMap<u64, BitmapType>) -> Option<(u64, &BitmapType)> {
        let mut best: Option<(u64, &BitmapType)> = None;
        for (&addr, bmp) in bitmaps {
            let Some((_, cur)) = best else {
                best = Some((addr, bmp));
                continue;
            };
            if bmp.version > cur.version
                || bmp.pixel_size > cur.pixel_size
                || bmp.width > cur.width
                || bmp.height > cur.height
            {
                best = Some((addr, bmp));
            }
        }
        best
    }
}

impl<F: ImageFile> FormatReader for PalmOs<F> {
    fn format_name(&self) -> &'static str {
        "Palm OS"
    }

    fn fields(&self) -> Vec<Field> {
        let fourcc = |v: u32| String::from_utf8_lossy(&v.to_be_bytes()).into_owned();
        let mut fields = vec![
            Field::bytes("Internal Name", self.name.to_vec()),
            Field::string("Type", fourcc(self.prc_type)),
            Field::string("Creator", fourcc(self.creator)),
            Field::number("Resources", self.resources.len() as i64),
        ];
        if self.find_resource(RES_TYPE_APP_NAME, 0).is_some() {
            fields.push(Field::string("Has App Name", "yes"));
        }
        if self.find_resource(RES_TYPE_APP_VERSION, 1000).is_some() {
            fields.push(Field::string("Has Version", "yes"));
        }
        fields
    }

    fn decode_image(&mut self) -> DecodeResult<SharedImage> {
        if let Some(icon) = &self.icon {
            return Ok(icon.clone());
        }

        let start = self
            .find_resource(RES_TYPE_ICON, LARGE_ICON_ID)
            .map(|r| r.addr as u64)
            .ok_or(DecodeError::Corrupt("no tAIB icon resource"))?;

        let bitmaps = self.collect_bitmaps(start)?;
        let (addr, best) =
            Self::select_best(&bitmaps).ok_or(DecodeError::Corrupt("empty bitmap chain"))?;
        let best = best.clone();

        let img = decode_bitmap(&mut self.file, &best, addr)?;
        let icon = SharedImage::new(img);
        self.icon = Some(icon.clone());
        Ok(icon)
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemReader;

    #[test]
    fn system_palette_anchors() {
        assert_eq!(PALM_SYSTEM_PALETTE[0], 0xFFFFFFFF);
        assert_eq!(PALM_SYSTEM_PALETTE[215], 0xFF000000);
        assert_eq!(PALM_SYSTEM_PALETTE[226], 0xFFC0C0C0);
        assert_eq!(PALM_SYSTEM_PALETTE[229], 0xFF000080);
        assert_eq!(PALM_SYSTEM_PALETTE[255], 0xFF000000);
    }

    /// One-resource PRC with the given tAIB payload.
    fn build_prc(taib: &[u8]) -> Vec<u8> {
        let mut data = vec![0u8; PRC_HEADER_SIZE + PRC_RES_HEADER_SIZE];
        data[..8].copy_from_slice(b"TestApp\0");
        data[0x3C..0x40].copy_from_slice(b"appl");
        data[0x40..0x44].copy_from_slice(b"TEST");
        data[0x4C..0x4E].copy_from_slice(&1u16.to_be_bytes());
        let res_off = PRC_HEADER_SIZE;
        data[res_off..res_off + 4].copy_from_slice(b"tAIB");
        data[res_off + 4..res_off + 6].copy_from_slice(&LARGE_ICON_ID.to_be_bytes());
        let addr = (PRC_HEADER_SIZE + PRC_RES_HEADER_SIZE) as u32;
        data[res_off + 6..res_off + 10].copy_from_slice(&addr.to_be_bytes());
        data.extend_from_slice(taib);
        data
    }

    fn v2_header(
        width: u16,
        height: u16,
        row_bytes: u16,
        flags: u16,
        pixel_size: u8,
        transparent_index: u8,
    ) -> Vec<u8> {
        let mut h = Vec::new();
        h.extend_from_slice(&width.to_be_bytes());
        h.extend_from_slice(&height.to_be_bytes());
        h.extend_from_slice(&row_bytes.to_be_bytes());
        h.extend_from_slice(&flags.to_be_bytes());
        h.push(pixel_size);
        h.push(2); // version
        h.extend_from_slice(&0u16.to_be_bytes()); // nextDepthOffset
        h.push(transparent_index);
        h.push(COMPRESSION_NONE);
        h.resize(24, 0);
        h
    }

    #[test]
    fn v0_mono_bitmap_decodes() {
        let mut taib = Vec::new();
        taib.extend_from_slice(&8u16.to_be_bytes()); // width
        taib.extend_from_slice(&2u16.to_be_bytes()); // height
        taib.extend_from_slice(&2u16.to_be_bytes()); // rowBytes
        taib.extend_from_slice(&0u16.to_be_bytes()); // flags
        taib.push(1); // pixelSize
        taib.push(0); // version 0
        taib.resize(16, 0);
        taib.extend_from_slice(&[0b1000_0000, 0, 0b0000_0001, 0]);

        let mut prc = PalmOs::open(MemReader::new(build_prc(&taib))).unwrap();
        let icon = prc.decode_image().unwrap();
        assert_eq!(icon.width(), 8);
        assert_eq!(icon.scanline(0)[0], 1);
        assert_eq!(icon.scanline(1)[7], 1);
    }

    #[test]
    fn v2_indexed_bitmap_with_transparency() {
        let mut taib = v2_header(4, 1, 4, FLAG_HAS_TRANSPARENCY, 8, 2);
        taib.extend_from_slice(&[0, 215, 2, 226]);
        let mut prc = PalmOs::open(MemReader::new(build_prc(&taib))).unwrap();
        let icon = prc.decode_image().unwrap();
        assert_eq!(icon.tr_idx(), Some(2));
        assert_eq!(icon.palette().unwrap()[2], 0);
        assert_eq!(icon.palette().unwrap()[0], 0xFFFFFFFF);
        assert_eq!(icon.palette().unwrap()[215], 0xFF000000);
        assert_eq!(&icon.scanline(0)[..4], &[0, 215, 2, 226]);
    }

    #[test]
    fn v3_rgb565_with_chroma_key() {
        // 16x1 v3 16-bpp, transparentValue = 0x07E0 (pure green), BE pixels.
        let mut taib = Vec::new();
        taib.extend_from_slice(&16u16.to_be_bytes());
        taib.extend_from_slice(&1u16.to_be_bytes());
        taib.extend_from_slice(&32u16.to_be_bytes()); // rowBytes
        taib.extend_from_slice(&(FLAG_HAS_TRANSPARENCY | FLAG_DIRECT_COLOR).to_be_bytes());
        taib.push(16);
        taib.push(3); // version
        taib.push(0x18); // v3 header size field
        taib.push(PIXEL_FORMAT_RGB565_BE);
        taib.push(0); // unused
        taib.push(COMPRESSION_NONE);
        taib.extend_from_slice(&72u16.to_be_bytes()); // density
        taib.extend_from_slice(&0x07E0u32.to_be_bytes()); // transparentValue
        taib.extend_from_slice(&0u32.to_be_bytes()); // nextBitmapOffset
        taib.extend_from_slice(&[0u8; 4]); // pad to the v3 header size
        assert_eq!(taib.len(), 28);
        for x in 0..16u16 {
            let px = if x < 8 { 0x07E0u16 } else { 0xF800 };
            taib.extend_from_slice(&px.to_be_bytes());
        }

        let mut prc = PalmOs::open(MemReader::new(build_prc(&taib))).unwrap();
        let icon = prc.decode_image().unwrap();
        for x in 0..8 {
            assert_eq!(icon.scanline_argb32(0)[x], 0x00000000);
        }
        for x in 8..16 {
            assert_eq!(icon.scanline_argb32(0)[x], 0xFFFF0000);
        }
    }

    #[test]
    fn chain_selects_deepest_bitmap() {
        // v2 1-bpp bitmap chained to a v2 8-bpp bitmap; the deeper one wins.
        let mut first = v2_header(4, 1, 2, 0, 1, 0);
        // next_depth_offset counts 32-bit words from the struct start:
        // (24 header + 4 data + pad) / 4 = 7 words.
        first[10..12].copy_from_slice(&7u16.to_be_bytes());
        first.extend_from_slice(&[0b1010_0000, 0, 0, 0]); // padded to 4 bytes

        let mut second = v2_header(4, 1, 4, 0, 8, 0);
        second.extend_from_slice(&[215, 215, 215, 215]);

        let mut taib = first;
        taib.extend_from_slice(&second);

        let mut prc = PalmOs::open(MemReader::new(build_prc(&taib))).unwrap();
        let icon = prc.decode_image().unwrap();
        // The 8-bpp bitmap decodes: all pixels black (index 215).
        assert_eq!(icon.scanline(0)[0], 215);
    }

    #[test]
    fn scanline_compressed_bitmap() {
        // 8x2 8-bpp v2, scanline-compressed with a 16-bit size prefix.
        let mut taib = v2_header(8, 2, 8, FLAG_COMPRESSED, 8, 0);
        taib[13] = COMPRESSION_SCANLINE;
        let payload = [
            0xFFu8, 1, 2, 3, 4, 5, 6, 7, 8, // row 0: all literal
            0b1000_0000, 9, // row 1: first byte differs
        ];
        taib.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        taib.extend_from_slice(&payload);

        let mut prc = PalmOs::open(MemReader::new(build_prc(&taib))).unwrap();
        let icon = prc.decode_image().unwrap();
        assert_eq!(&icon.scanline(0)[..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(&icon.scanline(1)[..8], &[9, 2, 3, 4, 5, 6, 7, 8]);
    }
}
