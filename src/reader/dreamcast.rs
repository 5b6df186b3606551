//! Sega Dreamcast VMU save files (.vms, .dci).
//!
//! A VMS file is the raw data area; DCI (Nexus) files prepend a 32-byte
//! directory entry and store the data area 32-bit byte-swapped. The VMS
//! header lives at offset 0 for regular saves and 0x200 for game files.

use nom::{
    bytes::complete::take,
    number::complete::{le_u16, le_u32, le_u8},
    IResult,
};

use crate::{
    anim::{FrameDelay, IconAnimData},
    decode::{linear, PixelFormat},
    error::{DecodeError, DecodeResult},
    image::SharedImage,
    io::{file_extension, ImageFile},
    reader::{from_bcd, unix_from_ymd_hms, Field, FormatReader},
};

// -------------------------------------------------------------------------------------------------

pub const VMS_HEADER_SIZE: usize = 96;
pub const VMI_HEADER_SIZE: usize = 108;
pub const DIRENT_SIZE: usize = 32;

const BLOCK_SIZE: u64 = 512;
const ICON_W: usize = 32;
const ICON_H: usize = 32;
const ICON_DATA_SIZE: usize = ICON_W * ICON_H / 2;
const EYECATCH_W: usize = 72;
const EYECATCH_H: usize = 56;

/// Byte size of each eyecatch type's payload (palette included).
const EYECATCH_SIZES: [usize; 4] = [0, 8064, 4544, 2048];

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SaveType {
    Vms,
    Dci,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DcFileType {
    None,
    Data,
    Game,
}

impl DcFileType {
    fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0x00 => Some(DcFileType::None),
            0x33 => Some(DcFileType::Data),
            0xCC => Some(DcFileType::Game),
            _ => None,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// The 96-byte VMS header at the start of the save's data area.
pub struct VmsHeader {
    pub vms_description: [u8; 16],
    pub dc_description: [u8; 32],
    pub application: [u8; 16],
    pub icon_count: u16,
    pub icon_anim_speed: u16,
    pub eyecatch_type: u16,
    pub crc: u16,
    pub data_size: u32,
}

impl VmsHeader {
    fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, vms_description) = take(16usize)(input)?;
        let (input, dc_description) = take(32usize)(input)?;
        let (input, application) = take(16usize)(input)?;
        let (input, icon_count) = le_u16(input)?;
        let (input, icon_anim_speed) = le_u16(input)?;
        let (input, eyecatch_type) = le_u16(input)?;
        let (input, crc) = le_u16(input)?;
        let (input, data_size) = le_u32(input)?;
        let (input, _reserved) = take(20usize)(input)?;
        Ok((input, Self {
            vms_description: vms_description.try_into().unwrap(),
            dc_description: dc_description.try_into().unwrap(),
            application: application.try_into().unwrap(),
            icon_count,
            icon_anim_speed,
            eyecatch_type,
            crc,
            data_size,
        }))
    }

    /// The description fields cannot contain control characters; the first
    /// eight bytes of each must also be non-NUL. A game file's first block
    /// is program code, so this rejects reading code as a header.
    fn descriptions_are_plausible(&self) -> bool {
        let check = |field: &[u8]| {
            field[..8].iter().all(|&c| c >= 0x20)
                && field[8..].iter().all(|&c| c >= 0x20 || c == 0)
        };
        check(&self.vms_description) && check(&self.dc_description)
    }
}

/// BCD timestamp inside the directory entry.
#[derive(Copy, Clone, Debug, Default)]
pub struct BcdTimestamp {
    pub century: u8,
    pub year: u8,
    pub month: u8,
    pub mday: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub weekday: u8,
}

impl BcdTimestamp {
    /// Unpacks to a Unix timestamp. Dreamcast clocks carry no timezone;
    /// the value is taken as UTC.
    pub fn to_unix(self) -> i64 {
        let year = (from_bcd(self.century) * 100 + from_bcd(self.year)) as i64;
        unix_from_ymd_hms(
            year,
            from_bcd(self.month),
            from_bcd(self.mday),
            from_bcd(self.hour),
            from_bcd(self.minute),
            from_bcd(self.second),
        )
    }
}

/// The 32-byte VMU filesystem directory entry (present in DCI files).
pub struct DirEntry {
    pub filetype: u8,
    pub protect: u8,
    pub address: u16,
    pub filename: [u8; 12],
    pub ctime: BcdTimestamp,
    pub size: u16,
    pub header_addr: u16,
}

impl DirEntry {
    fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, filetype) = le_u8(input)?;
        let (input, protect) = le_u8(input)?;
        let (input, address) = le_u16(input)?;
        let (input, filename) = take(12usize)(input)?;
        let (input, century) = le_u8(input)?;
        let (input, year) = le_u8(input)?;
        let (input, month) = le_u8(input)?;
        let (input, mday) = le_u8(input)?;
        let (input, hour) = le_u8(input)?;
        let (input, minute) = le_u8(input)?;
        let (input, second) = le_u8(input)?;
        let (input, weekday) = le_u8(input)?;
        let (input, size) = le_u16(input)?;
        let (input, header_addr) = le_u16(input)?;
        let (input, _reserved) = take(4usize)(input)?;
        Ok((input, Self {
            filetype,
            protect,
            address,
            filename: filename.try_into().unwrap(),
            ctime: BcdTimestamp { century, year, month, mday, hour, minute, second, weekday },
            size,
            header_addr,
        }))
    }
}

/// The 108-byte VMI sidecar header (.vmi files describe a matching .vms).
pub struct VmiHeader {
    pub checksum: [u8; 4],
    pub description: [u8; 32],
    pub copyright: [u8; 32],
    pub year: u16,
    pub month: u8,
    pub mday: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub weekday: u8,
    pub vmi_version: u16,
    pub file_number: u16,
    pub vms_resource_name: [u8; 8],
    pub vms_filename: [u8; 12],
    pub mode: u16,
    pub file_size: u32,
}

impl VmiHeader {
    pub fn from_bytes(buf: &[u8]) -> DecodeResult<Self> {
        if buf.len() < VMI_HEADER_SIZE {
            return Err(DecodeError::Truncated { expected: VMI_HEADER_SIZE, got: buf.len() });
        }
        let (_, hdr) = Self::parse(buf).map_err(DecodeError::from_parse)?;
        Ok(hdr)
    }

    fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, checksum) = take(4usize)(input)?;
        let (input, description) = take(32usize)(input)?;
        let (input, copyright) = take(32usize)(input)?;
        let (input, year) = le_u16(input)?;
        let (input, month) = le_u8(input)?;
        let (input, mday) = le_u8(input)?;
        let (input, hour) = le_u8(input)?;
        let (input, minute) = le_u8(input)?;
        let (input, second) = le_u8(input)?;
        let (input, weekday) = le_u8(input)?;
        let (input, vmi_version) = le_u16(input)?;
        let (input, file_number) = le_u16(input)?;
        let (input, vms_resource_name) = take(8usize)(input)?;
        let (input, vms_filename) = take(12usize)(input)?;
        let (input, mode) = le_u16(input)?;
        let (input, _unknown) = le_u16(input)?;
        let (input, file_size) = le_u32(input)?;
        Ok((input, Self {
            checksum: checksum.try_into().unwrap(),
            description: description.try_into().unwrap(),
            copyright: copyright.try_into().unwrap(),
            year,
            month,
            mday,
            hour,
            minute,
            second,
            weekday,
            vmi_version,
            file_number,
            vms_resource_name: vms_resource_name.try_into().unwrap(),
            vms_filename: vms_filename.try_into().unwrap(),
            mode,
            file_size,
        }))
    }
}

// -------------------------------------------------------------------------------------------------

/// Dreamcast CI8 with a 256-entry ARGB4444 palette (ICONDATA_VMS color
/// icons).
pub fn from_dreamcast_ci8(
    width: usize,
    height: usize,
    img_buf: &[u8],
    pal_buf: &[u8],
) -> DecodeResult<crate::image::Image> {
    linear::from_linear_ci8(PixelFormat::Argb4444, width, height, img_buf, pal_buf, 0)
}

/// Dreamcast 1-bpp icon (ICONDATA_VMS monochrome icons).
pub fn from_dreamcast_mono(
    width: usize,
    height: usize,
    img_buf: &[u8],
) -> DecodeResult<crate::image::Image> {
    linear::from_linear_mono(width, height, img_buf, 0)
}

// -------------------------------------------------------------------------------------------------

pub struct DreamcastSave<F: ImageFile> {
    file: F,
    save_type: SaveType,
    /// Offset of the VMU data area (0 for VMS, 32 for DCI).
    data_area_offset: u64,
    /// Offset of the VMS header within the data area.
    header_offset: u64,
    header: VmsHeader,
    dirent: Option<DirEntry>,
    is_game_file: bool,
    anim: Option<IconAnimData>,
}

impl<F: ImageFile> DreamcastSave<F> {
    /// Identifies and parses a VMS or DCI save. The save type comes from
    /// the file size: VMS files are block multiples, DCI adds 32 bytes.
    pub fn open(mut file: F) -> DecodeResult<Self> {
        let size = file.size();
        let (save_type, data_area_offset) = if size > 0 && size % BLOCK_SIZE == 0 {
            (SaveType::Vms, 0)
        } else if size > 32 && (size - 32) % BLOCK_SIZE == 0 {
            (SaveType::Dci, 32)
        } else {
            return Err(DecodeError::BadMagic("Dreamcast save"));
        };

        if let Some(ext) = file_extension(file.filename()) {
            let expected = match save_type {
                SaveType::Vms => "vms",
                SaveType::Dci => "dci",
            };
            if ext != expected {
                log::debug!("extension .{ext} does not match the detected {expected} container");
            }
        }

        let mut dirent = None;
        if save_type == SaveType::Dci {
            let mut buf = [0u8; DIRENT_SIZE];
            file.read_exact_at(0, &mut buf)?;
            if DcFileType::from_raw(buf[0]).is_none() {
                return Err(DecodeError::BadMagic("DCI directory entry"));
            }
            let (_, de) = DirEntry::parse(&buf).map_err(DecodeError::from_parse)?;
            dirent = Some(de);
        }

        let mut this = Self {
            file,
            save_type,
            data_area_offset,
            header_offset: 0,
            header: VmsHeader {
                vms_description: [0; 16],
                dc_description: [0; 32],
                application: [0; 16],
                icon_count: 0,
                icon_anim_speed: 0,
                eyecatch_type: 0,
                crc: 0,
                data_size: 0,
            },
            dirent,
            is_game_file: false,
            anim: None,
        };

        if let Some(header_addr) = this.dirent.as_ref().map(|d| d.header_addr) {
            // The directory entry names the header block.
            let offset = header_addr as u64 * BLOCK_SIZE;
            if !this.try_header_at(offset)? {
                return Err(DecodeError::Corrupt("VMS header failed validation"));
            }
            this.is_game_file =
                this.dirent.as_ref().map(|d| d.filetype) == Some(0xCC);
        } else {
            // No directory entry: probe the standard-save offset, then the
            // game-file offset.
            if this.try_header_at(0)? {
                this.is_game_file = false;
            } else if this.try_header_at(0x200)? {
                this.is_game_file = true;
            } else {
                return Err(DecodeError::Corrupt("VMS header failed validation"));
            }
        }

        Ok(this)
    }

    pub fn save_type(&self) -> SaveType {
        self.save_type
    }

    pub fn is_game_file(&self) -> bool {
        self.is_game_file
    }

    fn try_header_at(&mut self, offset: u64) -> DecodeResult<bool> {
        let buf = match self.read_data(offset, VMS_HEADER_SIZE) {
            Ok(buf) => buf,
            Err(DecodeError::Truncated { .. }) => return Ok(false),
            Err(e) => return Err(e),
        };
        let (_, header) = VmsHeader::parse(&buf).map_err(DecodeError::from_parse)?;
        if !header.descriptions_are_plausible() {
            return Ok(false);
        }
        self.header = header;
        self.header_offset = offset;
        Ok(true)
    }

    /// Reads from the data area, undoing DCI's per-word byte swap.
    fn read_data(&mut self, offset: u64, len: usize) -> DecodeResult<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.file.read_exact_at(self.data_area_offset + offset, &mut buf)?;
        if self.save_type == SaveType::Dci {
            debug_assert_eq!(len % 4, 0);
            for word in buf.chunks_exact_mut(4) {
                word.reverse();
            }
        }
        Ok(buf)
    }

    /// Decodes all icon frames. Each frame is 32x32 CI4 against one shared
    /// 16-entry ARGB4444 palette stored right after the header.
    fn load_icons(&mut self) -> DecodeResult<()> {
        if self.anim.is_some() {
            return Ok(());
        }

        let icon_count = (self.header.icon_count as usize).min(crate::anim::MAX_FRAMES);
        if icon_count == 0 {
            return Err(DecodeError::Corrupt("save has no icon"));
        }

        let pal_buf = self.read_data(self.header_offset + VMS_HEADER_SIZE as u64, 32)?;

        let mut anim = IconAnimData::new();
        for i in 0..icon_count {
            let icon_offset = self.header_offset
                + (VMS_HEADER_SIZE + 32 + i * ICON_DATA_SIZE) as u64;
            let icon_buf = self.read_data(icon_offset, ICON_DATA_SIZE)?;
            let img = linear::from_linear_ci4(
                PixelFormat::Argb4444,
                false,
                ICON_W,
                ICON_H,
                &icon_buf,
                &pal_buf,
                0,
            )?;
            anim.push_frame(Some(SharedImage::new(img)));
            // The VMU's actual frame timing is not stored here; 250 ms is
            // the conventional default.
            anim.push_seq(i as u8, FrameDelay::new(1, 4));
        }

        self.anim = Some(anim);
        Ok(())
    }

    /// Decodes the eyecatch (a 72x56 banner), if the save carries one.
    pub fn decode_eyecatch(&mut self) -> DecodeResult<SharedImage> {
        let ec_type = self.header.eyecatch_type as usize;
        if ec_type == 0 || ec_type >= EYECATCH_SIZES.len() {
            return Err(DecodeError::UnsupportedVersion {
                what: "eyecatch type",
                version: self.header.eyecatch_type as u32,
            });
        }

        let icon_count = (self.header.icon_count as usize).min(crate::anim::MAX_FRAMES);
        let offset = self.header_offset
            + (VMS_HEADER_SIZE + 32 + icon_count * ICON_DATA_SIZE) as u64;
        let buf = self.read_data(offset, EYECATCH_SIZES[ec_type])?;

        let img = match ec_type {
            1 => linear::from_linear16(
                PixelFormat::Argb4444,
                EYECATCH_W,
                EYECATCH_H,
                &buf,
                0,
            )?,
            2 => linear::from_linear_ci8(
                PixelFormat::Argb4444,
                EYECATCH_W,
                EYECATCH_H,
                &buf[512..],
                &buf[..512],
                0,
            )?,
            _ => linear::from_linear_ci4(
                PixelFormat::Argb4444,
                false,
                EYECATCH_W,
                EYECATCH_H,
                &buf[32..],
                &buf[..32],
                0,
            )?,
        };
        Ok(SharedImage::new(img))
    }
}

impl<F: ImageFile> FormatReader for DreamcastSave<F> {
    fn format_name(&self) -> &'static str {
        match self.save_type {
            SaveType::Vms => "Dreamcast VMS",
            SaveType::Dci => "Dreamcast DCI",
        }
    }

    fn fields(&self) -> Vec<Field> {
        let mut fields = Vec::new();
        if let Some(dirent) = &self.dirent {
            let filetype = match DcFileType::from_raw(dirent.filetype) {
                Some(DcFileType::None) => "None",
                Some(DcFileType::Data) => "Save Data",
                Some(DcFileType::Game) => "VMU Game",
                None => "Unknown",
            };
            fields.push(Field::string("File Type", filetype));
            fields.push(Field::string("Copy Protect", match dirent.protect {
                0x00 => "Copy OK",
                0xFF => "Copy Protected",
                _ => "Unknown",
            }));
            fields.push(Field::bytes("Filename", dirent.filename.to_vec()));
            fields.push(Field::datetime("Creation Time", dirent.ctime.to_unix()));
        } else {
            fields.push(Field::string(
                "File Type",
                if self.is_game_file { "VMU Game" } else { "Save Data" },
            ));
        }
        fields.push(Field::bytes("VMS Description", self.header.vms_description.to_vec()));
        fields.push(Field::bytes("DC Description", self.header.dc_description.to_vec()));
        fields.push(Field::bytes("Application", self.header.application.to_vec()));
        fields.push(Field::number("Icon Count", self.header.icon_count));
        fields.push(Field::string("CRC", format!("{:04X}", self.header.crc)));
        fields
    }

    fn decode_image(&mut self) -> DecodeResult<SharedImage> {
        self.load_icons()?;
        let anim = self.anim.as_ref().expect("set by load_icons");
        anim.first_frame().cloned().ok_or(DecodeError::Corrupt("save has no icon"))
    }

    fn icon_anim_data(&self) -> Option<&IconAnimData> {
        self.anim.as_ref()
    }
}

// -------------------------------------------------------------------------------------------------
