//! Windows icons and cursors (.ico, .cur, and PE/NE resources).
//!
//! Two generations share the surface: Win1.x raw headers (1-bpp bitmap plus
//! mask, optionally both a DIB and a DDB back to back) and Win3.x icon
//! directories whose entries are BITMAPINFOHEADER-family bitmaps with a
//! trailing 1-bpp mask. Windows Vista PNG entries are identified and their
//! byte range exposed; PNG decoding itself is an external collaborator.

use nom::{number::complete::le_u16, IResult};

use crate::{
    decode::{linear, palette::DecodedPalette, PixelFormat},
    error::{DecodeError, DecodeResult},
    image::{Image, ImageFormat, SharedImage},
    io::{ImageFile, ResourceReader},
    pixel::SBit,
    reader::{Field, FormatReader},
};

// -------------------------------------------------------------------------------------------------

pub const ICONDIRENTRY_SIZE: usize = 16;
pub const GRPICONDIRENTRY_SIZE: usize = 14;
pub const BITMAPINFOHEADER_SIZE: u32 = 40;

pub const RT_CURSOR: u16 = 1;
pub const RT_ICON: u16 = 3;
pub const RT_GROUP_CURSOR: u16 = 12;
pub const RT_GROUP_ICON: u16 = 14;

const WIN1_HEADER_SIZE: u64 = 14;

// Win1.x format words.
const WIN1_FORMAT_MAYBE_WIN3: u16 = 0x0000;
const WIN1_FORMAT_ICON_DIB: u16 = 0x0001;
const WIN1_FORMAT_ICON_DDB: u16 = 0x0101;
const WIN1_FORMAT_ICON_BOTH: u16 = 0x0201;
const WIN1_FORMAT_CURSOR_DIB: u16 = 0x0003;
const WIN1_FORMAT_CURSOR_DDB: u16 = 0x0103;
const WIN1_FORMAT_CURSOR_BOTH: u16 = 0x0203;

const WIN3_TYPE_ICON: u16 = 1;
const WIN3_TYPE_CURSOR: u16 = 2;

const PNG_MAGIC_WORD: u32 = 0x474E5089; // "\x89PNG"

const fn align4(v: usize) -> usize {
    (v + 3) & !3
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IconType {
    IconWin1,
    CursorWin1,
    IconWin3,
    CursorWin3,
}

// -------------------------------------------------------------------------------------------------

/// Win1.x raw header. A BOTH-format file carries a second header (without
/// the format word) after the first bitmap pair.
#[derive(Copy, Clone, Debug, Default)]
pub struct Win1Header {
    pub format: u16,
    pub hot_x: u16,
    pub hot_y: u16,
    pub width: u16,
    pub height: u16,
    pub stride: u16,
    pub color: u16,
}

impl Win1Header {
    fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, format) = le_u16(input)?;
        let (input, rest) = Self::parse_after_format(input)?;
        Ok((input, Self { format, ..rest }))
    }

    /// The second header of a BOTH file has no format word.
    fn parse_after_format(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, hot_x) = le_u16(input)?;
        let (input, hot_y) = le_u16(input)?;
        let (input, width) = le_u16(input)?;
        let (input, height) = le_u16(input)?;
        let (input, stride) = le_u16(input)?;
        let (input, color) = le_u16(input)?;
        Ok((input, Self { format: 0, hot_x, hot_y, width, height, stride, color }))
    }

    fn has_both(&self) -> bool {
        self.format >> 8 == 2
    }
}

/// What an icon directory entry's bitmap turned out to be.
#[derive(Copy, Clone, Debug)]
pub enum BitmapHeader {
    Info {
        header_size: u32,
        width: u32,
        height: i32,
        planes: u16,
        bit_count: u16,
        compression: u32,
    },
    Png {
        width: u32,
        height: u32,
        bit_depth: u8,
        color_type: u8,
    },
}

impl BitmapHeader {
    fn from_bytes(buf: &[u8]) -> DecodeResult<Self> {
        if buf.len() < 16 {
            return Err(DecodeError::Truncated { expected: 16, got: buf.len() });
        }
        let size = u32::from_le_bytes(buf[..4].try_into().unwrap());
        match size {
            // BITMAPINFOHEADER and its V2/V3/V4/V5 extensions.
            40 | 52 | 56 | 108 | 124 => {
                if buf.len() < 20 {
                    return Err(DecodeError::Truncated { expected: 20, got: buf.len() });
                }
                Ok(BitmapHeader::Info {
                    header_size: size,
                    width: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
                    height: i32::from_le_bytes(buf[8..12].try_into().unwrap()),
                    planes: u16::from_le_bytes(buf[12..14].try_into().unwrap()),
                    bit_count: u16::from_le_bytes(buf[14..16].try_into().unwrap()),
                    compression: if buf.len() >= 20 {
                        u32::from_le_bytes(buf[16..20].try_into().unwrap())
                    } else {
                        0
                    },
                })
            }
            PNG_MAGIC_WORD => {
                // 8-byte signature, IHDR length + tag, then IHDR data.
                if buf.len() < 26 {
                    return Err(DecodeError::Truncated { expected: 26, got: buf.len() });
                }
                Ok(BitmapHeader::Png {
                    width: u32::from_be_bytes(buf[16..20].try_into().unwrap()),
                    height: u32::from_be_bytes(buf[20..24].try_into().unwrap()),
                    bit_depth: buf[24],
                    color_type: buf[25],
                })
            }
            _ => Err(DecodeError::UnsupportedVersion { what: "ICO bitmap header", version: size }),
        }
    }

    /// (width, logical height, effective bit count) for best-icon ranking.
    fn ranking(&self) -> (u32, u32, u32) {
        match *self {
            BitmapHeader::Info { width, height, bit_count, planes, .. } => {
                if planes > 1 {
                    return (0, 0, 0);
                }
                (width, height.unsigned_abs() / 2, bit_count as u32)
            }
            BitmapHeader::Png { width, height, bit_depth, color_type } => {
                let bitcount = match color_type {
                    3 => bit_depth as u32,          // palette
                    0 | 2 => bit_depth as u32 * 3,  // gray / RGB
                    _ => bit_depth as u32 * 4,      // + alpha
                };
                (width, height, bitcount)
            }
        }
    }
}

/// One directory entry plus where its bitmap lives. File entries carry an
/// absolute offset; resource entries carry the RT_ICON/RT_CURSOR id.
struct DirEntry {
    bytes_in_res: u32,
    location: BitmapLocation,
    header: BitmapHeader,
}

#[derive(Copy, Clone)]
enum BitmapLocation {
    FileOffset(u32),
    ResourceId(u16),
}

// -------------------------------------------------------------------------------------------------

enum Source<F: ImageFile, R: ResourceReader> {
    File(F),
    Resource { reader: R, res_type: u16, id: i32, lang: i32, bitmap_rt: u16 },
}

/// A never-constructed resource reader, so plain files can use [`Ico::open`]
/// without naming a resource type.
pub enum NoResource {}

impl ImageFile for NoResource {
    fn seek(&mut self, _: u64) -> std::io::Result<()> {
        match *self {}
    }

    fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
        match *self {}
    }

    fn size(&self) -> u64 {
        match *self {}
    }
}

impl ResourceReader for NoResource {
    fn open(&mut self, _: u16, _: i32, _: i32) -> DecodeResult<Box<dyn ImageFile>> {
        match *self {}
    }
}

pub struct Ico<F: ImageFile, R: ResourceReader = NoResource> {
    source: Source<F, R>,
    icon_type: IconType,
    win1: [Option<Win1Header>; 2],
    entries: Vec<DirEntry>,
    best_idx: Option<usize>,
    img: Option<SharedImage>,
}

impl<F: ImageFile> Ico<F, NoResource> {
    /// Reads a standalone .ico or .cur file.
    pub fn open(file: F) -> DecodeResult<Self> {
        Self::init(Source::File(file), None)
    }
}

impl<R: ResourceReader> Ico<crate::io::MemReader, R> {
    /// Reads an icon or cursor out of a PE/NE executable's resources.
    /// `res_type` is RT_ICON, RT_CURSOR, RT_GROUP_ICON, or RT_GROUP_CURSOR.
    pub fn from_resource(reader: R, res_type: u16, id: i32, lang: i32) -> DecodeResult<Self> {
        let bitmap_rt = match res_type {
            RT_ICON | RT_GROUP_ICON => RT_ICON,
            RT_CURSOR | RT_GROUP_CURSOR => RT_CURSOR,
            _ => {
                return Err(DecodeError::UnsupportedVersion {
                    what: "resource type",
                    version: res_type as u32,
                })
            }
        };
        // Individual RT_ICON/RT_CURSOR resources hold Win1.x-format bitmaps.
        let forced = match res_type {
            RT_ICON => Some(IconType::IconWin1),
            RT_CURSOR => Some(IconType::CursorWin1),
            _ => None,
        };
        Self::init(Source::Resource { reader, res_type, id, lang, bitmap_rt }, forced)
    }
}

impl<F: ImageFile, R: ResourceReader> Ico<F, R> {
    fn init(mut source: Source<F, R>, forced: Option<IconType>) -> DecodeResult<Self> {
        let mut header = [0u8; WIN1_HEADER_SIZE as usize];
        match &mut source {
            Source::File(f) => f.read_exact_at(0, &mut header)?,
            Source::Resource { reader, res_type, id, lang, .. } => {
                let mut dir = reader.open(*res_type, *id, *lang)?;
                dir.read_exact_at(0, &mut header)?;
            }
        }

        let (_, win1_hdr) = Win1Header::parse(&header).map_err(DecodeError::from_parse)?;

        let mut this = Self {
            source,
            icon_type: IconType::IconWin3,
            win1: [None, None],
            entries: Vec::new(),
            best_idx: None,
            img: None,
        };

        match win1_hdr.format {
            WIN1_FORMAT_MAYBE_WIN3 => {
                let idtype = win1_hdr.hot_x; // ICONDIR idType shares the offset
                this.icon_type = match (forced, idtype) {
                    (Some(t), _) => t,
                    (None, WIN3_TYPE_ICON) => IconType::IconWin3,
                    (None, WIN3_TYPE_CURSOR) => IconType::CursorWin3,
                    (None, other) => {
                        return Err(DecodeError::UnsupportedVersion {
                            what: "ICONDIR type",
                            version: other as u32,
                        })
                    }
                };
                let count = win1_hdr.hot_y; // ICONDIR idCount
                this.load_directory_win3(count)?;
            }

            WIN1_FORMAT_ICON_DIB | WIN1_FORMAT_ICON_DDB | WIN1_FORMAT_ICON_BOTH => {
                this.icon_type = forced.unwrap_or(IconType::IconWin1);
                this.win1[0] = Some(win1_hdr);
                this.load_second_win1_header(&win1_hdr)?;
            }

            WIN1_FORMAT_CURSOR_DIB | WIN1_FORMAT_CURSOR_DDB | WIN1_FORMAT_CURSOR_BOTH => {
                this.icon_type = forced.unwrap_or(IconType::CursorWin1);
                this.win1[0] = Some(win1_hdr);
                this.load_second_win1_header(&win1_hdr)?;
            }

            other => {
                return Err(DecodeError::UnsupportedVersion {
                    what: "Win1.x icon format",
                    version: other as u32,
                })
            }
        }

        Ok(this)
    }

    pub fn icon_type(&self) -> IconType {
        self.icon_type
    }

    fn is_win1(&self) -> bool {
        matches!(self.icon_type, IconType::IconWin1 | IconType::CursorWin1)
    }

    fn open_bitmap(&mut self, location: BitmapLocation) -> DecodeResult<(BitmapFile<'_, F>, u64)> {
        match (&mut self.source, location) {
            (Source::File(f), BitmapLocation::FileOffset(off)) => {
                Ok((BitmapFile::Borrowed(f), off as u64))
            }
            (Source::Resource { reader, lang, bitmap_rt, .. }, BitmapLocation::ResourceId(id)) => {
                let f = reader.open(*bitmap_rt, id as i32, *lang)?;
                Ok((BitmapFile::Owned(f), 0))
            }
            _ => Err(DecodeError::Corrupt("bitmap location does not match the source")),
        }
    }

    fn load_second_win1_header(&mut self, first: &Win1Header) -> DecodeResult<()> {
        if !first.has_both() {
            return Ok(());
        }
        // The DDB follows the DIB's bitmap + mask; its header has no format
        // word.
        let addr =
            WIN1_HEADER_SIZE + first.height as u64 * first.stride as u64 * 2;
        let mut buf = [0u8; 12];
        match &mut self.source {
            Source::File(f) => f.read_exact_at(addr, &mut buf)?,
            Source::Resource { reader, res_type, id, lang, .. } => {
                let mut res = reader.open(*res_type, *id, *lang)?;
                res.read_exact_at(addr, &mut buf)?;
            }
        }
        let (_, hdr) =
            Win1Header::parse_after_format(&buf).map_err(DecodeError::from_parse)?;
        self.win1[1] = Some(hdr);
        Ok(())
    }

    fn load_directory_win3(&mut self, count: u16) -> DecodeResult<()> {
        if count == 0 {
            return Err(DecodeError::Corrupt("icon directory is empty"));
        }

        let is_res = matches!(self.source, Source::Resource { .. });
        let entry_size = if is_res { GRPICONDIRENTRY_SIZE } else { ICONDIRENTRY_SIZE };
        let mut dir_buf = vec![0u8; count as usize * entry_size];
        match &mut self.source {
            Source::File(f) => f.read_exact_at(6, &mut dir_buf)?,
            Source::Resource { reader, res_type, id, lang, .. } => {
                let mut dir = reader.open(*res_type, *id, *lang)?;
                dir.read_exact_at(6, &mut dir_buf)?;
            }
        }

        // Directory entries themselves only hint at sizes; the authoritative
        // geometry comes from each bitmap's own header.
        let locations: Vec<(BitmapLocation, u32)> = dir_buf
            .chunks_exact(entry_size)
            .map(|chunk| {
                let bytes_in_res = u32::from_le_bytes(chunk[8..12].try_into().unwrap());
                let location = if is_res {
                    BitmapLocation::ResourceId(u16::from_le_bytes(
                        chunk[12..14].try_into().unwrap(),
                    ))
                } else {
                    BitmapLocation::FileOffset(u32::from_le_bytes(
                        chunk[12..16].try_into().unwrap(),
                    ))
                };
                (location, bytes_in_res)
            })
            .collect();

        for (location, bytes_in_res) in locations {
            let mut buf = [0u8; 26];
            {
                let (mut f, base) = self.open_bitmap(location)?;
                f.as_file().read_exact_at(base, &mut buf)?;
            }
            let header = BitmapHeader::from_bytes(&buf)?;
            self.entries.push(DirEntry { bytes_in_res, location, header });
        }

        // Pick the best icon: biggest, then deepest.
        let mut best: Option<(usize, (u32, u32, u32))> = None;
        for (i, entry) in self.entries.iter().enumerate() {
            let (w, h, bits) = entry.header.ranking();
            if bits == 0 {
                continue;
            }
            let better = match best {
                None => true,
                Some((_, (bw, bh, bbits))) => {
                    w > bw || h > bh || (w == bw && h == bh && bits > bbits)
                }
            };
            if better {
                best = Some((i, (w, h, bits)));
            }
        }
        self.best_idx = Some(best.ok_or(DecodeError::Corrupt("no decodable icon"))?.0);
        Ok(())
    }

    /// The byte range of a PNG-compressed entry (for the external PNG
    /// decoder), if the selected entry is one.
    pub fn png_entry(&self) -> Option<(u64, usize)> {
        let idx = self.best_idx?;
        let entry = &self.entries[idx];
        match (entry.header, entry.location) {
            (BitmapHeader::Png { .. }, BitmapLocation::FileOffset(off)) => {
                Some((off as u64, entry.bytes_in_res as usize))
            }
            (BitmapHeader::Png { .. }, BitmapLocation::ResourceId(_)) => {
                Some((0, entry.bytes_in_res as usize))
            }
            _ => None,
        }
    }

    fn decode_win1(&mut self, idx: usize) -> DecodeResult<Image> {
        let header = self.win1[idx].ok_or(DecodeError::Corrupt("no such Win1.x bitmap"))?;
        let width = header.width as usize;
        let height = header.height as usize;
        let stride = header.stride as usize;
        if width == 0 || height == 0 || stride * 8 < width {
            return Err(DecodeError::InvalidGeometry {
                width: width as u32,
                height: height as u32,
                reason: "bad Win1.x geometry",
            });
        }

        let mut addr = WIN1_HEADER_SIZE;
        if idx == 1 {
            let first = self.win1[0].unwrap();
            addr += first.height as u64 * first.stride as u64 * 2 + 12;
        }

        // Mask rows come first, then the image rows.
        let icon_size = height * stride;
        let mut data = vec![0u8; icon_size * 2];
        match &mut self.source {
            Source::File(f) => f.read_exact_at(addr, &mut data)?,
            Source::Resource { reader, lang, bitmap_rt, id, .. } => {
                let mut f = reader.open(*bitmap_rt, *id, *lang)?;
                f.read_exact_at(addr, &mut data)?;
            }
        }
        let (mask, bits) = data.split_at(icon_size);
        linear::from_linear_mono_win_icon(width, height, bits, mask, stride)
    }

    fn decode_win3(&mut self, idx: usize) -> DecodeResult<Image> {
        let entry_header = self.entries[idx].header;
        let location = self.entries[idx].location;
        let (header_size, width, raw_height, bit_count, compression) = match entry_header {
            BitmapHeader::Info { header_size, width, height, bit_count, compression, .. } => {
                (header_size, width as usize, height, bit_count as usize, compression)
            }
            BitmapHeader::Png { .. } => {
                return Err(DecodeError::UnsupportedVersion {
                    what: "PNG-compressed ICO bitmap (external decoder)",
                    version: 0,
                })
            }
        };

        // The stored height covers the bitmap and its mask; both halves are
        // upside-down when positive.
        let height = raw_height.unsigned_abs() as usize;
        let is_upside_down = raw_height > 0;
        if width == 0 || height == 0 || height % 2 != 0 {
            return Err(DecodeError::InvalidGeometry {
                width: width as u32,
                height: height as u32,
                reason: "bad ICO bitmap size",
            });
        }
        let half_height = height / 2;

        let stride = match bit_count {
            1 => align4((width + 7) / 8),
            4 => align4((width + 1) / 2),
            8 => align4(width),
            32 => width * 4,
            _ => {
                return Err(DecodeError::InvalidPixelFormat(bit_count as u32));
            }
        };
        let mask_stride = align4((width + 7) / 8);

        let (mut f, base) = self.open_bitmap(location)?;
        let f = f.as_file();
        let mut addr = base + header_size as u64;

        // Color table for indexed bitmaps; alpha comes up opaque.
        let mut pal_data = Vec::new();
        if bit_count <= 8 {
            let palette_count = 1usize << bit_count;
            let mut raw = vec![0u8; palette_count * 4];
            f.read_exact_at(addr, &mut raw)?;
            addr += raw.len() as u64;
            for chunk in raw.chunks_exact(4) {
                pal_data
                    .push(u32::from_le_bytes(chunk.try_into().unwrap()) | 0xFF00_0000);
            }
        }

        let icon_size = stride * half_height;
        let mask_size = mask_stride * half_height;
        let mut img_data = vec![0u8; icon_size + mask_size];
        f.read_exact_at(addr, &mut img_data)?;

        let (icon_data, mask_data) = if is_upside_down {
            (&img_data[..icon_size], &img_data[icon_size..])
        } else {
            (&img_data[mask_size..], &img_data[..mask_size])
        };

        let mut img = match bit_count {
            1 => linear::from_linear_mono_win_icon(
                width,
                half_height,
                icon_data,
                mask_data,
                stride,
            )?,
            4 => {
                let pal = DecodedPalette::from_argb32(&pal_data, SBit::new(8, 8, 8, 0, 0));
                linear::from_linear_ci4_with(&pal, true, width, half_height, icon_data, stride)?
            }
            8 => {
                let pal = DecodedPalette::from_argb32(&pal_data, SBit::new(8, 8, 8, 0, 0));
                linear::from_linear_ci8_with(&pal, width, half_height, icon_data, stride)?
            }
            _ => {
                if compression != 0 {
                    return Err(DecodeError::UnsupportedVersion {
                        what: "ICO biCompression",
                        version: compression,
                    });
                }
                linear::from_linear32(
                    PixelFormat::Argb8888,
                    width,
                    half_height,
                    icon_data,
                    stride,
                )?
            }
        };

        // Apply the 1-bpp mask (already folded in for 1-bpp icons).
        if bit_count == 4 {
            // Keep CI8 and add a dedicated transparent index.
            let tr_idx = 1u8 << bit_count;
            img.palette_mut().unwrap()[tr_idx as usize] = 0;
            img.set_tr_idx(Some(tr_idx));
            for y in 0..half_height {
                let mask_row = &mask_data[y * mask_stride..];
                let dest = &mut img.scanline_mut(y)[..width];
                for (x, px) in dest.iter_mut().enumerate() {
                    if (mask_row[x / 8] >> (7 - x % 8)) & 1 != 0 {
                        *px = tr_idx;
                    }
                }
            }
            img.set_sbit(SBit::new(8, 8, 8, 0, 1));
        } else if bit_count > 4 {
            if img.format() != ImageFormat::Argb32 {
                img = img.dup_argb32()?;
            }
            for y in 0..half_height {
                let mask_row = mask_data[y * mask_stride..(y + 1) * mask_stride].to_vec();
                let dest = img.scanline_argb32_mut(y);
                for (x, px) in dest.iter_mut().enumerate() {
                    if (mask_row[x / 8] >> (7 - x % 8)) & 1 != 0 {
                        // Fully transparent, RGB not retained.
                        *px = 0;
                    }
                }
            }
        }

        if is_upside_down {
            img = img.flip_vertical()?;
        }
        Ok(img)
    }
}

/// Either the container file itself or a just-opened resource blob.
enum BitmapFile<'a, F: ImageFile> {
    Borrowed(&'a mut F),
    Owned(Box<dyn ImageFile>),
}

impl<'a, F: ImageFile> BitmapFile<'a, F> {
    fn as_file(&mut self) -> &mut dyn ImageFile {
        match self {
            BitmapFile::Borrowed(f) => *f,
            BitmapFile::Owned(f) => f.as_mut(),
        }
    }
}

impl<F: ImageFile, R: ResourceReader> FormatReader for Ico<F, R> {
    fn format_name(&self) -> &'static str {
        match self.icon_type {
            IconType::IconWin1 => "Windows 1.x Icon",
            IconType::CursorWin1 => "Windows 1.x Cursor",
            IconType::IconWin3 => "Windows 3.x Icon",
            IconType::CursorWin3 => "Windows 3.x Cursor",
        }
    }

    fn fields(&self) -> Vec<Field> {
        let mut fields = Vec::new();
        if self.is_win1() {
            let header = self.win1[0].unwrap_or_default();
            fields.push(Field::number("Width", header.width));
            fields.push(Field::number("Height", header.height));
            fields.push(Field::string("Pixel Format", "Mono"));
            if matches!(self.icon_type, IconType::CursorWin1) {
                fields.push(Field::number("Hotspot X", header.hot_x));
                fields.push(Field::number("Hotspot Y", header.hot_y));
            }
        } else {
            fields.push(Field::number("Bitmap Count", self.entries.len() as i64));
            for entry in &self.entries {
                let (w, h, bits) = entry.header.ranking();
                let is_png = matches!(entry.header, BitmapHeader::Png { .. });
                fields.push(Field::string(
                    "Bitmap",
                    format!("{w}x{h} {bits}bpp{}", if is_png { " (PNG)" } else { "" }),
                ));
            }
        }
        fields
    }

    fn decode_image(&mut self) -> DecodeResult<SharedImage> {
        if let Some(img) = &self.img {
            return Ok(img.clone());
        }
        let img = if self.is_win1() {
            // DIB preferred when both are present; it is always first.
            self.decode_win1(0)?
        } else {
            let idx = self.best_idx.ok_or(DecodeError::Corrupt("no decodable icon"))?;
            self.decode_win3(idx)?
        };
        let img = SharedImage::new(img);
        self.img = Some(img.clone());
        Ok(img)
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemReader;

    fn push_u16(v: &mut Vec<u8>, x: u16) {
        v.extend_from_slice(&x.to_le_bytes());
    }

    fn push_u32(v: &mut Vec<u8>, x: u32) {
        v.extend_from_slice(&x.to_le_bytes());
    }

    /// A 16x16 32-bpp Win3.x icon, bottom-up, with a striped mask.
    fn build_win3_32bpp() -> Vec<u8> {
        let mut data = Vec::new();
        push_u16(&mut data, 0); // reserved
        push_u16(&mut data, WIN3_TYPE_ICON);
        push_u16(&mut data, 1); // count
        // ICONDIRENTRY
        data.push(16);
        data.push(16);
        data.push(0);
        data.push(0);
        push_u16(&mut data, 1);
        push_u16(&mut data, 32);
        let bitmap_offset = 6 + ICONDIRENTRY_SIZE;
        let bitmap_size = 40 + 16 * 16 * 4 + 16 * 4;
        push_u32(&mut data, bitmap_size as u32);
        push_u32(&mut data, bitmap_offset as u32);
        // BITMAPINFOHEADER
        push_u32(&mut data, 40);
        push_u32(&mut data, 16); // width
        push_u32(&mut data, 32); // height = 2x logical (bottom-up)
        push_u16(&mut data, 1); // planes
        push_u16(&mut data, 32); // bitcount
        push_u32(&mut data, 0); // BI_RGB
        data.extend_from_slice(&[0u8; 20]); // rest of the header
        // Pixel rows, bottom-up: row 15 first. Encode the row number in red.
        for row in (0..16u32).rev() {
            for _ in 0..16 {
                push_u32(&mut data, 0x80_000000 | (row << 16));
            }
        }
        // Mask: rows 0..16 bottom-up, alternating full/empty by source row.
        for row in (0..16u32).rev() {
            let byte = if row % 2 == 0 { 0xFFu8 } else { 0x00 };
            data.extend_from_slice(&[byte, byte, 0, 0]); // 32-bit aligned
        }
        data
    }

    #[test]
    fn win3_32bpp_mask_and_flip() {
        let mut ico = Ico::open(MemReader::new(build_win3_32bpp())).unwrap();
        assert_eq!(ico.icon_type(), IconType::IconWin3);
        let img = ico.decode_image().unwrap();
        assert_eq!(img.width(), 16);
        assert_eq!(img.height(), 16);
        // Logical row 0 is source row 0 (flip undone): red = 0, mask set
        // (row 0 is even) -> fully transparent.
        assert_eq!(img.scanline_argb32(0)[0], 0x00000000);
        // Row 1: mask clear, pixel keeps its source alpha 0x80.
        assert_eq!(img.scanline_argb32(1)[0], 0x80_010000);
        assert_eq!(img.scanline_argb32(14)[0], 0x00000000);
        assert_eq!(img.scanline_argb32(15)[0], 0x80_0F0000);
        assert_eq!(img.scanline_argb32(13)[3], 0x80_0D0000);
    }

    /// An 8x4 Win1.x icon: DIB only, stride 2 bytes.
    fn build_win1() -> Vec<u8> {
        let mut data = Vec::new();
        push_u16(&mut data, WIN1_FORMAT_ICON_DIB);
        push_u16(&mut data, 0); // hotX
        push_u16(&mut data, 0); // hotY
        push_u16(&mut data, 8); // width
        push_u16(&mut data, 4); // height
        push_u16(&mut data, 2); // stride (16-bit padded)
        push_u16(&mut data, 0); // color
        // Mask: all clear (opaque).
        data.extend_from_slice(&[0u8; 8]);
        // Image: first row white (bit 1), rest black.
        data.extend_from_slice(&[0xFF, 0xFF, 0, 0, 0, 0, 0, 0]);
        data
    }

    #[test]
    fn win1_dib_decodes_as_mono() {
        let mut ico = Ico::open(MemReader::new(build_win1())).unwrap();
        assert_eq!(ico.icon_type(), IconType::IconWin1);
        let img = ico.decode_image().unwrap();
        assert_eq!(img.width(), 8);
        assert_eq!(img.height(), 4);
        // Row 0 is white (palette index 1), row 1 black (index 0).
        assert_eq!(img.scanline(0)[0], 1);
        assert_eq!(img.scanline(1)[0], 0);
        assert_eq!(img.tr_idx(), Some(2));
    }

    #[test]
    fn directory_picks_largest_then_deepest() {
        // Two entries: 16x16 4bpp and 32x32 4bpp; the larger wins.
        let mut data = Vec::new();
        push_u16(&mut data, 0);
        push_u16(&mut data, WIN3_TYPE_ICON);
        push_u16(&mut data, 2);

        let entry_base = 6 + 2 * ICONDIRENTRY_SIZE;
        // header + palette + pixel rows + mask rows for the 16x16 entry
        let bmp16_size = 40 + 16 * 4 + 8 * 16 + 4 * 16;
        for (dim, offset) in [(16u8, entry_base), (32, entry_base + bmp16_size)] {
            data.push(dim);
            data.push(dim);
            data.push(16);
            data.push(0);
            push_u16(&mut data, 1);
            push_u16(&mut data, 4);
            push_u32(&mut data, 0);
            push_u32(&mut data, offset as u32);
        }

        for dim in [16usize, 32] {
            push_u32(&mut data, 40);
            push_u32(&mut data, dim as u32);
            push_u32(&mut data, (dim * 2) as u32);
            push_u16(&mut data, 1);
            push_u16(&mut data, 4);
            push_u32(&mut data, 0);
            data.extend_from_slice(&[0u8; 20]);
            data.extend_from_slice(&vec![0u8; 16 * 4]); // palette
            data.extend_from_slice(&vec![0u8; align4(dim / 2) * dim]); // pixels
            data.extend_from_slice(&vec![0u8; align4((dim + 7) / 8) * dim]); // mask
        }

        let mut ico = Ico::open(MemReader::new(data)).unwrap();
        let img = ico.decode_image().unwrap();
        assert_eq!(img.width(), 32);
        assert_eq!(img.height(), 32);
    }

    #[test]
    fn png_entry_is_identified_not_decoded() {
        let mut data = Vec::new();
        push_u16(&mut data, 0);
        push_u16(&mut data, WIN3_TYPE_ICON);
        push_u16(&mut data, 1);
        data.push(0); // 256
        data.push(0);
        data.push(0);
        data.push(0);
        push_u16(&mut data, 1);
        push_u16(&mut data, 32);
        push_u32(&mut data, 64); // bytes_in_res
        push_u32(&mut data, (6 + ICONDIRENTRY_SIZE) as u32);
        // PNG signature + IHDR.
        data.extend_from_slice(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
        push_u32(&mut data, 13u32.swap_bytes()); // IHDR length, big-endian
        data.extend_from_slice(b"IHDR");
        data.extend_from_slice(&256u32.to_be_bytes());
        data.extend_from_slice(&256u32.to_be_bytes());
        data.push(8); // bit depth
        data.push(6); // RGBA
        data.extend_from_slice(&[0u8; 32]);

        let mut ico = Ico::open(MemReader::new(data)).unwrap();
        assert!(ico.png_entry().is_some());
        assert!(matches!(
            ico.decode_image(),
            Err(DecodeError::UnsupportedVersion { .. })
        ));
    }
}
