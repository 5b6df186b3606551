//! Nintendo 3DS SMDH icon extraction (.smdh, .3dsx, .cia; .cci detected).
//!
//! The SMDH block carries sixteen localized titles plus a 24x24 and a 48x48
//! Morton-tiled RGB565 icon. 3DSX homebrew stores it behind the extended
//! header's `smdh_offset`; CIA archives append it as the meta section.
//! CCI card images are encrypted and only identified.

use nom::{
    bytes::complete::{tag, take},
    number::complete::{le_u16, le_u32},
    IResult,
};

use crate::{
    decode::tiled,
    error::{DecodeError, DecodeResult},
    image::SharedImage,
    io::ImageFile,
    reader::{Field, FormatReader},
};

// -------------------------------------------------------------------------------------------------

pub const SMDH_MAGIC: &[u8; 4] = b"SMDH";
pub const SMDH_HEADER_SIZE: usize = 8256;
pub const SMDH_TITLE_SIZE: usize = 512;
pub const SMDH_ICON_SIZE: usize = 0x1680;
pub const THREEDSX_HEADER_SIZE: usize = 44;
pub const THREEDSX_STANDARD_HEADER_SIZE: u16 = 32;
pub const CIA_HEADER_SIZE: usize = 0x2020;
pub const CIA_META_HEADER_SIZE: u32 = 0x400;
pub const NCSD_MAGIC_OFFSET: u64 = 0x100;

const SMALL_ICON_DIM: usize = 24;
const LARGE_ICON_DIM: usize = 48;
const SMALL_ICON_BYTES: usize = SMALL_ICON_DIM * SMALL_ICON_DIM * 2;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RomType {
    Smdh,
    ThreeDsx,
    Cia,
    /// Card image; encrypted, icon extraction unsupported.
    Cci,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum IconSize {
    Small,
    #[default]
    Large,
}

// -------------------------------------------------------------------------------------------------

/// One of the sixteen 512-byte localized title slots: UTF-16LE short
/// description, long description, and publisher.
pub struct SmdhTitle {
    pub desc_short: [u8; 0x80],
    pub desc_long: [u8; 0x100],
    pub publisher: [u8; 0x80],
}

impl SmdhTitle {
    fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, desc_short) = take(0x80usize)(input)?;
        let (input, desc_long) = take(0x100usize)(input)?;
        let (input, publisher) = take(0x80usize)(input)?;
        Ok((input, Self {
            desc_short: desc_short.try_into().unwrap(),
            desc_long: desc_long.try_into().unwrap(),
            publisher: publisher.try_into().unwrap(),
        }))
    }

    fn utf16_field(raw: &[u8]) -> String {
        let units: Vec<u16> =
            raw.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
        let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
        String::from_utf16_lossy(&units[..end])
    }
}

/// SMDH header: magic, version, sixteen title slots, settings, reserved.
pub struct SmdhHeader {
    pub version: u16,
    /// Title slot 1 is English; the usual display source.
    pub english_title: SmdhTitle,
    pub region_lockout: u32,
}

impl SmdhHeader {
    fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, _magic) = tag(SMDH_MAGIC)(input)?;
        let (input, version) = le_u16(input)?;
        let (input, _reserved) = le_u16(input)?;
        // Skip the Japanese slot, keep English, skip the rest.
        let (input, _jp) = take(SMDH_TITLE_SIZE)(input)?;
        let (input, english_title) = SmdhTitle::parse(input)?;
        let (input, _rest) = take(SMDH_TITLE_SIZE * 14)(input)?;
        // Settings block: ratings(16), region lockout, matchmaker ids(12),
        // flags, eula, reserved, banner frame, CEC id.
        let (input, _ratings) = take(16usize)(input)?;
        let (input, region_lockout) = le_u32(input)?;
        let (input, _rest2) = take(28usize)(input)?;
        let (input, _reserved2) = take(8usize)(input)?;
        Ok((input, Self { version, english_title, region_lockout }))
    }
}

/// 3DSX header; the extended form (header_size > 32) locates the SMDH.
struct ThreeDsxHeader {
    header_size: u16,
    smdh_offset: u32,
}

impl ThreeDsxHeader {
    fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, _magic) = tag(b"3DSX")(input)?;
        let (input, header_size) = le_u16(input)?;
        let (input, _reloc_header_size) = le_u16(input)?;
        let (input, _format_version) = le_u32(input)?;
        let (input, _flags) = le_u32(input)?;
        let (input, _code_size) = le_u32(input)?;
        let (input, _rodata_size) = le_u32(input)?;
        let (input, _data_size) = le_u32(input)?;
        let (input, _bss_size) = le_u32(input)?;
        let (input, smdh_offset) = le_u32(input)?;
        let (input, _smdh_size) = le_u32(input)?;
        let (input, _romfs_offset) = le_u32(input)?;
        Ok((input, Self { header_size, smdh_offset }))
    }
}

/// CIA header section sizes; each section is aligned to the next 64 bytes.
struct CiaHeader {
    header_size: u32,
    cert_chain_size: u32,
    ticket_size: u32,
    tmd_size: u32,
    meta_size: u32,
    content_size: u64,
}

impl CiaHeader {
    fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, header_size) = le_u32(input)?;
        let (input, _type) = le_u16(input)?;
        let (input, _version) = le_u16(input)?;
        let (input, cert_chain_size) = le_u32(input)?;
        let (input, ticket_size) = le_u32(input)?;
        let (input, tmd_size) = le_u32(input)?;
        let (input, meta_size) = le_u32(input)?;
        let (input, content_size) = nom::number::complete::le_u64(input)?;
        Ok((input, Self {
            header_size,
            cert_chain_size,
            ticket_size,
            tmd_size,
            meta_size,
            content_size,
        }))
    }

    const fn to_next_64(v: u32) -> u64 {
        ((v as u64) + 63) & !63
    }

    /// Offset of the SMDH inside the meta section.
    fn smdh_offset(&self) -> u64 {
        Self::to_next_64(self.header_size)
            + Self::to_next_64(self.cert_chain_size)
            + Self::to_next_64(self.ticket_size)
            + Self::to_next_64(self.tmd_size)
            + Self::to_next_64(self.content_size as u32)
            + CIA_META_HEADER_SIZE as u64
    }
}

// -------------------------------------------------------------------------------------------------

pub struct Nintendo3ds<F: ImageFile> {
    file: F,
    rom_type: RomType,
    smdh_offset: u64,
    smdh: Option<SmdhHeader>,
    icons: [Option<SharedImage>; 2],
}

impl<F: ImageFile> Nintendo3ds<F> {
    pub fn open(mut file: F) -> DecodeResult<Self> {
        let mut head = [0u8; 0x120];
        let got = file.seek_and_read(0, &mut head)?;
        let head = &head[..got];

        let (rom_type, smdh_offset) = if head.len() >= 4 && head[..4] == SMDH_MAGIC[..] {
            if file.size() < (SMDH_HEADER_SIZE + SMDH_ICON_SIZE) as u64 {
                return Err(DecodeError::Truncated {
                    expected: SMDH_HEADER_SIZE + SMDH_ICON_SIZE,
                    got: file.size() as usize,
                });
            }
            (RomType::Smdh, 0)
        } else if head.len() >= THREEDSX_HEADER_SIZE && head[..4] == b"3DSX"[..] {
            let (_, hdr) =
                ThreeDsxHeader::parse(head).map_err(DecodeError::from_parse)?;
            if hdr.header_size <= THREEDSX_STANDARD_HEADER_SIZE {
                return Err(DecodeError::UnsupportedVersion {
                    what: "3DSX header (no SMDH)",
                    version: hdr.header_size as u32,
                });
            }
            (RomType::ThreeDsx, hdr.smdh_offset as u64)
        } else if head.len() >= NCSD_MAGIC_OFFSET as usize + 4 {
            let is_ncsd = head[0x100..0x104] == b"NCSD"[..];
            if is_ncsd {
                (RomType::Cci, 0)
            } else {
                Self::try_cia(head, file.size())?
            }
        } else {
            Self::try_cia(head, file.size())?
        };

        Ok(Self { file, rom_type, smdh_offset, smdh: None, icons: [None, None] })
    }

    fn try_cia(head: &[u8], file_size: u64) -> DecodeResult<(RomType, u64)> {
        if head.len() < 0x20 {
            return Err(DecodeError::BadMagic("Nintendo 3DS"));
        }
        let (_, cia) = CiaHeader::parse(head).map_err(DecodeError::from_parse)?;
        if cia.header_size as usize != CIA_HEADER_SIZE {
            return Err(DecodeError::BadMagic("Nintendo 3DS"));
        }
        // The meta section must hold at least an SMDH and its icon block.
        if cia.meta_size < (SMDH_HEADER_SIZE + SMDH_ICON_SIZE) as u32 {
            return Err(DecodeError::UnsupportedVersion {
                what: "CIA meta section",
                version: cia.meta_size,
            });
        }
        let smdh_offset = cia.smdh_offset();
        if smdh_offset + (SMDH_HEADER_SIZE + SMDH_ICON_SIZE) as u64 > file_size {
            return Err(DecodeError::Truncated {
                expected: (smdh_offset as usize) + SMDH_HEADER_SIZE + SMDH_ICON_SIZE,
                got: file_size as usize,
            });
        }
        Ok((RomType::Cia, smdh_offset))
    }

    pub fn rom_type(&self) -> RomType {
        self.rom_type
    }

    fn load_smdh(&mut self) -> DecodeResult<&SmdhHeader> {
        if self.smdh.is_none() {
            if self.rom_type == RomType::Cci {
                return Err(DecodeError::UnsupportedVersion {
                    what: "CCI (encrypted card image)",
                    version: 0,
                });
            }
            let mut buf = vec![0u8; SMDH_HEADER_SIZE];
            self.file.read_exact_at(self.smdh_offset, &mut buf)?;
            let (_, smdh) =
                SmdhHeader::parse(&buf).map_err(|_| DecodeError::BadMagic("SMDH"))?;
            self.smdh = Some(smdh);
        }
        Ok(self.smdh.as_ref().unwrap())
    }

    /// Decodes the requested icon. The icon block sits immediately after
    /// the SMDH header: 24x24 tiles first, then 48x48.
    pub fn decode_icon(&mut self, size: IconSize) -> DecodeResult<SharedImage> {
        let slot = match size {
            IconSize::Small => 0,
            IconSize::Large => 1,
        };
        if let Some(icon) = &self.icons[slot] {
            return Ok(icon.clone());
        }

        self.load_smdh()?;

        let icon_base = self.smdh_offset + SMDH_HEADER_SIZE as u64;
        let (offset, dim, bytes) = match size {
            IconSize::Small => (icon_base, SMALL_ICON_DIM, SMALL_ICON_BYTES),
            IconSize::Large => (
                icon_base + SMALL_ICON_BYTES as u64,
                LARGE_ICON_DIM,
                LARGE_ICON_DIM * LARGE_ICON_DIM * 2,
            ),
        };

        let mut buf = vec![0u8; bytes];
        self.file.read_exact_at(offset, &mut buf)?;
        let img = tiled::from_n3ds_tiled_rgb565(dim, dim, &buf)?;
        let icon = SharedImage::new(img);
        self.icons[slot] = Some(icon.clone());
        Ok(icon)
    }
}

impl<F: ImageFile> FormatReader for Nintendo3ds<F> {
    fn format_name(&self) -> &'static str {
        match self.rom_type {
            RomType::Smdh => "Nintendo 3DS SMDH",
            RomType::ThreeDsx => "Nintendo 3DS Homebrew (3DSX)",
            RomType::Cia => "Nintendo 3DS Installable Archive (CIA)",
            RomType::Cci => "Nintendo 3DS Card Image (CCI)",
        }
    }

    fn fields(&self) -> Vec<Field> {
        let Some(smdh) = &self.smdh else {
            return Vec::new();
        };
        let title = &smdh.english_title;
        vec![
            Field::string("Title", SmdhTitle::utf16_field(&title.desc_short)),
            Field::string("Full Title", SmdhTitle::utf16_field(&title.desc_long)),
            Field::string("Publisher", SmdhTitle::utf16_field(&title.publisher)),
            Field::number("Region Lockout", smdh.region_lockout),
            Field::number("SMDH Version", smdh.version),
        ]
    }

    fn decode_image(&mut self) -> DecodeResult<SharedImage> {
        self.decode_icon(IconSize::default())
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemReader;

    fn utf16_bytes(s: &str) -> Vec<u8> {
        s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
    }

    /// SMDH header + icon block with pixel (0,0) of the small icon set.
    fn build_smdh() -> Vec<u8> {
        let mut data = vec![0u8; SMDH_HEADER_SIZE + SMDH_ICON_SIZE];
        data[..4].copy_from_slice(SMDH_MAGIC);
        // English title slot starts at 8 + 512.
        let title = 8 + SMDH_TITLE_SIZE;
        let short = utf16_bytes("Test App");
        data[title..title + short.len()].copy_from_slice(&short);
        let publisher = utf16_bytes("Test Pub");
        data[title + 0x180..title + 0x180 + publisher.len()].copy_from_slice(&publisher);
        // Small icon pixel (0,0) = 0xFFFF (first stored word of tile 0).
        data[SMDH_HEADER_SIZE..SMDH_HEADER_SIZE + 2].copy_from_slice(&0xFFFFu16.to_le_bytes());
        data
    }

    #[test]
    fn smdh_small_icon_detiles_correctly() {
        let mut rom = Nintendo3ds::open(MemReader::new(build_smdh())).unwrap();
        assert_eq!(rom.rom_type(), RomType::Smdh);
        let icon = rom.decode_icon(IconSize::Small).unwrap();
        assert_eq!(icon.width(), 24);
        assert_eq!(icon.height(), 24);
        assert_eq!(icon.scanline_argb32(0)[0], 0xFFFFFFFF);
        for y in 0..24 {
            for x in 0..24 {
                if (x, y) != (0, 0) {
                    assert_eq!(icon.scanline_argb32(y)[x], 0xFF000000);
                }
            }
        }
    }

    #[test]
    fn default_icon_is_the_large_one() {
        let mut rom = Nintendo3ds::open(MemReader::new(build_smdh())).unwrap();
        let icon = rom.decode_image().unwrap();
        assert_eq!(icon.width(), 48);
        assert_eq!(icon.height(), 48);
    }

    #[test]
    fn titles_come_from_the_english_slot() {
        let mut rom = Nintendo3ds::open(MemReader::new(build_smdh())).unwrap();
        rom.decode_image().unwrap();
        let fields = rom.fields();
        assert!(fields
            .iter()
            .any(|f| f.name == "Title" && f.value == crate::reader::FieldValue::String("Test App".into())));
    }

    #[test]
    fn threedsx_extended_header_locates_smdh() {
        let mut data = vec![0u8; 256];
        data[..4].copy_from_slice(b"3DSX");
        data[4..6].copy_from_slice(&44u16.to_le_bytes()); // extended header
        data[32..36].copy_from_slice(&256u32.to_le_bytes()); // smdh_offset
        data.extend_from_slice(&build_smdh());
        let mut rom = Nintendo3ds::open(MemReader::new(data)).unwrap();
        assert_eq!(rom.rom_type(), RomType::ThreeDsx);
        let icon = rom.decode_image().unwrap();
        assert_eq!(icon.width(), 48);
    }

    #[test]
    fn standard_3dsx_header_has_no_icon() {
        let mut data = vec![0u8; 64];
        data[..4].copy_from_slice(b"3DSX");
        data[4..6].copy_from_slice(&32u16.to_le_bytes());
        assert!(Nintendo3ds::open(MemReader::new(data)).is_err());
    }

    #[test]
    fn cia_meta_section_smdh() {
        // Minimal CIA: all sections empty except header and meta.
        let mut data = vec![0u8; CIA_HEADER_SIZE];
        data[0..4].copy_from_slice(&(CIA_HEADER_SIZE as u32).to_le_bytes());
        let meta_size = (SMDH_HEADER_SIZE + SMDH_ICON_SIZE) as u32;
        data[0x14..0x18].copy_from_slice(&meta_size.to_le_bytes());
        // Sections: header aligns to 0x2040; meta header; then SMDH.
        data.resize(0x2040 + CIA_META_HEADER_SIZE as usize, 0);
        data.extend_from_slice(&build_smdh());
        let mut rom = Nintendo3ds::open(MemReader::new(data)).unwrap();
        assert_eq!(rom.rom_type(), RomType::Cia);
        let icon = rom.decode_image().unwrap();
        assert_eq!(icon.width(), 48);
    }

    #[test]
    fn cci_is_identified_but_not_decoded() {
        let mut data = vec![0u8; 0x200];
        data[0x100..0x104].copy_from_slice(b"NCSD");
        let mut rom = Nintendo3ds::open(MemReader::new(data)).unwrap();
        assert_eq!(rom.rom_type(), RomType::Cci);
        assert!(matches!(
            rom.decode_image(),
            Err(DecodeError::UnsupportedVersion { .. })
        ));
    }
}
