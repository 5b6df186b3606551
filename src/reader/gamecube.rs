//! Nintendo GameCube memory card saves (.gci, .gcs, .sav).
//!
//! All three containers wrap the same 64-byte CARD directory entry followed
//! by the save's data area:
//! - GCI: directory entry at 0.
//! - GCS (GameShark): 0x110-byte header starting with "GCSAVE".
//! - SAV (MaxDrive): 0x80-byte header starting with "DATELGC_SAVE\0\0\0\0";
//!   the 16-bit units at 0x06 and 0x2C..0x40 of the entry are byte-swapped.

use nom::{
    bytes::complete::take,
    number::complete::{be_u16, be_u32, le_u8},
    IResult,
};

use crate::{
    anim::{FrameDelay, IconAnimData},
    decode::tiled,
    error::{DecodeError, DecodeResult},
    image::SharedImage,
    io::ImageFile,
    reader::{Field, FormatReader},
};

// -------------------------------------------------------------------------------------------------

pub const CARD_DIRENTRY_SIZE: usize = 64;

const CARD_MAXICONS: usize = 8;
const CARD_ICON_W: usize = 32;
const CARD_ICON_H: usize = 32;
const CARD_BANNER_W: usize = 96;
const CARD_BANNER_H: usize = 32;
const BLOCK_SIZE: u64 = 8192;

// bannerfmt bits
const CARD_BANNER_MASK: u8 = 0x03;
const CARD_BANNER_CI: u8 = 0x01;
const CARD_BANNER_RGB: u8 = 0x02;
const CARD_ANIM_MASK: u8 = 0x04;

// 2-bit icon format lanes
const CARD_ICON_MASK: u16 = 0x03;
const CARD_ICON_CI_SHARED: u16 = 0x01;
const CARD_ICON_RGB: u16 = 0x02;
const CARD_ICON_CI_UNIQUE: u16 = 0x03;

// 2-bit icon speed lanes
const CARD_SPEED_MASK: u16 = 0x03;
const CARD_SPEED_END: u16 = 0x00;

const GCS_MAGIC: &[u8; 6] = b"GCSAVE";
const SAV_MAGIC: &[u8; 16] = b"DATELGC_SAVE\0\0\0\0";

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SaveType {
    Gci,
    Gcs,
    Sav,
}

impl SaveType {
    /// Offset of the CARD directory entry within the container.
    fn direntry_offset(self) -> u64 {
        match self {
            SaveType::Gci => 0,
            SaveType::Gcs => 0x110,
            SaveType::Sav => 0x80,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// The CARD filesystem directory entry. All fields big-endian on disk
/// (after the MaxDrive pre-swap).
pub struct CardDirEntry {
    pub id6: [u8; 6],
    pub bannerfmt: u8,
    pub filename: [u8; 32],
    pub lastmodified: u32,
    pub iconaddr: u32,
    pub iconfmt: u16,
    pub iconspeed: u16,
    pub permission: u8,
    pub copytimes: u8,
    pub block: u16,
    pub length: u16,
    pub commentaddr: u32,
}

impl CardDirEntry {
    /// Parses the entry. For SAV, the 16-bit units at 0x06 and 0x2C..0x40
    /// are byte-swapped first; 32-bit fields in that span then come out of
    /// their PDP-like mixed order automatically.
    pub fn from_bytes(buf: &[u8; CARD_DIRENTRY_SIZE], save_type: SaveType) -> DecodeResult<Self> {
        let mut raw = *buf;
        if save_type == SaveType::Sav {
            raw.swap(0x06, 0x07);
            for off in (0x2C..0x40).step_by(2) {
                raw.swap(off, off + 1);
            }
        }
        let (_, entry) = Self::parse(&raw).map_err(DecodeError::from_parse)?;
        Ok(entry)
    }

    fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, id6) = take(6usize)(input)?;
        let (input, pad_00) = le_u8(input)?;
        let (input, bannerfmt) = le_u8(input)?;
        let (input, filename) = take(32usize)(input)?;
        let (input, lastmodified) = be_u32(input)?;
        let (input, iconaddr) = be_u32(input)?;
        let (input, iconfmt) = be_u16(input)?;
        let (input, iconspeed) = be_u16(input)?;
        let (input, permission) = le_u8(input)?;
        let (input, copytimes) = le_u8(input)?;
        let (input, block) = be_u16(input)?;
        let (input, length) = be_u16(input)?;
        let (input, pad_01) = be_u16(input)?;
        let (input, commentaddr) = be_u32(input)?;
        let _ = (pad_00, pad_01);
        Ok((input, Self {
            id6: id6.try_into().unwrap(),
            bannerfmt,
            filename: filename.try_into().unwrap(),
            lastmodified,
            iconaddr,
            iconfmt,
            iconspeed,
            permission,
            copytimes,
            block,
            length,
            commentaddr,
        }))
    }

    /// Plausibility checks shared by container detection.
    fn validate(buf: &[u8; CARD_DIRENTRY_SIZE], data_size: u64, save_type: SaveType) -> bool {
        // Game ID must be alphanumeric.
        if !buf[..6].iter().all(|c| c.is_ascii_alphanumeric()) {
            return false;
        }

        // Padding byte must be 0xFF. MaxDrive swaps pad_00 and bannerfmt.
        let pad_00 = if save_type == SaveType::Sav { buf[0x07] } else { buf[0x06] };
        if pad_00 != 0xFF {
            return false;
        }
        if buf[0x3A] != 0xFF || buf[0x3B] != 0xFF {
            return false;
        }

        // Block count must match the data area. GCS files written outside
        // the GameSaves software always record 1, so only require >= 1.
        let length = match save_type {
            SaveType::Sav => u16::from_le_bytes([buf[0x38], buf[0x39]]),
            _ => u16::from_be_bytes([buf[0x38], buf[0x39]]),
        };
        match save_type {
            SaveType::Gcs => {
                if length == 0 {
                    return false;
                }
            }
            _ => {
                if length as u64 * BLOCK_SIZE != data_size {
                    return false;
                }
            }
        }

        // Icon and comment addresses must land inside the data area.
        let read_addr = |off: usize| -> u32 {
            if save_type == SaveType::Sav {
                // PDP-like order: each 16-bit half is independently swapped.
                u32::from_be_bytes([buf[off + 1], buf[off], buf[off + 3], buf[off + 2]])
            } else {
                u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
            }
        };
        let iconaddr = read_addr(0x2C) as u64;
        let commentaddr = read_addr(0x3C) as u64;
        iconaddr < data_size && commentaddr < data_size
    }
}

// -------------------------------------------------------------------------------------------------

pub struct GameCubeSave<F: ImageFile> {
    file: F,
    save_type: SaveType,
    direntry: CardDirEntry,
    /// Offset of the save's data area (directory entry + 64).
    data_offset: u64,
    anim: Option<IconAnimData>,
    banner: Option<SharedImage>,
}

impl<F: ImageFile> GameCubeSave<F> {
    pub fn open(mut file: F) -> DecodeResult<Self> {
        let size = file.size();
        // 2043 blocks is the largest memory card; anything bigger cannot be
        // a real save.
        if size > 2043 * BLOCK_SIZE + 0x110 {
            return Err(DecodeError::BadMagic("GameCube save"));
        }

        let mut header = [0u8; 0x150];
        let got = file.seek_and_read(0, &mut header)?;
        if got < CARD_DIRENTRY_SIZE {
            return Err(DecodeError::Truncated { expected: CARD_DIRENTRY_SIZE, got });
        }
        let header = &header[..got];

        let save_type = Self::detect(header, size)
            .ok_or(DecodeError::BadMagic("GameCube save"))?;
        let dir_off = save_type.direntry_offset() as usize;
        let buf: [u8; CARD_DIRENTRY_SIZE] =
            header[dir_off..dir_off + CARD_DIRENTRY_SIZE].try_into().unwrap();
        let direntry = CardDirEntry::from_bytes(&buf, save_type)?;

        Ok(Self {
            file,
            save_type,
            direntry,
            data_offset: save_type.direntry_offset() + CARD_DIRENTRY_SIZE as u64,
            anim: None,
            banner: None,
        })
    }

    fn detect(header: &[u8], size: u64) -> Option<SaveType> {
        // GCS: 0x110-byte header; data area is the remainder.
        if header.len() >= 0x150 && header[..6] == GCS_MAGIC[..] {
            let data_size = size.checked_sub(0x110 + CARD_DIRENTRY_SIZE as u64)?;
            if data_size % BLOCK_SIZE == 0 {
                let buf: [u8; CARD_DIRENTRY_SIZE] =
                    header[0x110..0x150].try_into().ok()?;
                if CardDirEntry::validate(&buf, data_size, SaveType::Gcs) {
                    return Some(SaveType::Gcs);
                }
            }
        }

        // SAV: 0x80-byte header.
        if header.len() >= 0xC0 && header[..16] == SAV_MAGIC[..] {
            let data_size = size.checked_sub(0x80 + CARD_DIRENTRY_SIZE as u64)?;
            if data_size % BLOCK_SIZE == 0 {
                let buf: [u8; CARD_DIRENTRY_SIZE] = header[0x80..0xC0].try_into().ok()?;
                if CardDirEntry::validate(&buf, data_size, SaveType::Sav) {
                    return Some(SaveType::Sav);
                }
            }
        }

        // GCI: bare directory entry.
        let data_size = size.checked_sub(CARD_DIRENTRY_SIZE as u64)?;
        if data_size % BLOCK_SIZE == 0 {
            let buf: [u8; CARD_DIRENTRY_SIZE] = header[..CARD_DIRENTRY_SIZE].try_into().ok()?;
            if CardDirEntry::validate(&buf, data_size, SaveType::Gci) {
                return Some(SaveType::Gci);
            }
        }

        None
    }

    pub fn save_type(&self) -> SaveType {
        self.save_type
    }

    fn banner_size(&self) -> usize {
        match self.direntry.bannerfmt & CARD_BANNER_MASK {
            CARD_BANNER_CI => CARD_BANNER_W * CARD_BANNER_H,
            CARD_BANNER_RGB => CARD_BANNER_W * CARD_BANNER_H * 2,
            _ => 0,
        }
    }

    /// Decodes the 96x32 banner, if present.
    pub fn decode_banner(&mut self) -> DecodeResult<SharedImage> {
        if let Some(banner) = &self.banner {
            return Ok(banner.clone());
        }

        let fmt = self.direntry.bannerfmt & CARD_BANNER_MASK;
        let banner_size = self.banner_size();
        if banner_size == 0 {
            return Err(DecodeError::Corrupt("save has no banner"));
        }

        let mut buf = vec![0u8; banner_size];
        self.file
            .read_exact_at(self.data_offset + self.direntry.iconaddr as u64, &mut buf)?;

        let img = if fmt == CARD_BANNER_RGB {
            tiled::from_gcn16(
                crate::decode::PixelFormat::Rgb5a3,
                CARD_BANNER_W,
                CARD_BANNER_H,
                &buf,
            )?
        } else {
            // CI8 banner: palette follows the banner pixels.
            let mut pal = vec![0u8; 256 * 2];
            self.file.read_exact_at(
                self.data_offset + self.direntry.iconaddr as u64 + banner_size as u64,
                &mut pal,
            )?;
            tiled::from_gcn_ci8(CARD_BANNER_W, CARD_BANNER_H, &buf, &pal)?
        };

        let banner = SharedImage::new(img);
        self.banner = Some(banner.clone());
        Ok(banner)
    }

    /// Decodes every icon frame and builds the display sequence.
    fn load_icons(&mut self) -> DecodeResult<()> {
        if self.anim.is_some() {
            return Ok(());
        }

        // The icons start right after the banner.
        let mut iconaddr = self.direntry.iconaddr as u64 + self.banner_size() as u64;
        if self.direntry.bannerfmt & CARD_BANNER_MASK == CARD_BANNER_CI {
            iconaddr += 256 * 2;
        }

        // First pass: total size and the shared-palette flag.
        let mut total = 0usize;
        let mut frame_count = 0usize;
        let mut has_shared_palette = false;
        let mut iconfmt = self.direntry.iconfmt;
        let mut iconspeed = self.direntry.iconspeed;
        for _ in 0..CARD_MAXICONS {
            if iconspeed & CARD_SPEED_MASK == CARD_SPEED_END {
                break;
            }
            match iconfmt & CARD_ICON_MASK {
                CARD_ICON_RGB => total += CARD_ICON_W * CARD_ICON_H * 2,
                CARD_ICON_CI_UNIQUE => total += CARD_ICON_W * CARD_ICON_H + 256 * 2,
                CARD_ICON_CI_SHARED => {
                    total += CARD_ICON_W * CARD_ICON_H;
                    has_shared_palette = true;
                }
                _ => {}
            }
            frame_count += 1;
            iconfmt >>= 2;
            iconspeed >>= 2;
        }
        if frame_count == 0 {
            return Err(DecodeError::Corrupt("save has no icon"));
        }
        if has_shared_palette {
            total += 256 * 2;
        }

        let mut icondata = vec![0u8; total];
        self.file.read_exact_at(self.data_offset + iconaddr, &mut icondata)?;
        let shared_palette = has_shared_palette.then(|| icondata[total - 256 * 2..].to_vec());

        // Second pass: decode each frame in place.
        let mut anim = IconAnimData::new();
        let mut cur = 0usize;
        let mut iconfmt = self.direntry.iconfmt;
        let mut iconspeed = self.direntry.iconspeed;
        for i in 0..frame_count {
            let delay = iconspeed & CARD_SPEED_MASK;
            // Fastest speed is 4 frames at 60 Hz, i.e. delay/8 of a second.
            anim.push_seq(i as u8, FrameDelay::new(delay, 8));

            let frame = match iconfmt & CARD_ICON_MASK {
                CARD_ICON_RGB => {
                    let size = CARD_ICON_W * CARD_ICON_H * 2;
                    let img = tiled::from_gcn16(
                        crate::decode::PixelFormat::Rgb5a3,
                        CARD_ICON_W,
                        CARD_ICON_H,
                        &icondata[cur..cur + size],
                    )?;
                    cur += size;
                    Some(SharedImage::new(img))
                }
                CARD_ICON_CI_UNIQUE => {
                    let size = CARD_ICON_W * CARD_ICON_H;
                    let img = tiled::from_gcn_ci8(
                        CARD_ICON_W,
                        CARD_ICON_H,
                        &icondata[cur..cur + size],
                        &icondata[cur + size..cur + size + 256 * 2],
                    )?;
                    cur += size + 256 * 2;
                    Some(SharedImage::new(img))
                }
                CARD_ICON_CI_SHARED => {
                    let size = CARD_ICON_W * CARD_ICON_H;
                    let pal = shared_palette.as_ref().expect("flag set in first pass");
                    let img = tiled::from_gcn_ci8(
                        CARD_ICON_W,
                        CARD_ICON_H,
                        &icondata[cur..cur + size],
                        pal,
                    )?;
                    cur += size;
                    Some(SharedImage::new(img))
                }
                // An empty lane mid-sequence means "reuse previous frame".
                _ => None,
            };
            anim.push_frame(frame);

            iconfmt >>= 2;
            iconspeed >>= 2;
        }

        // Bounce animation: append n-2..1 after 0..n-1.
        if self.direntry.bannerfmt & CARD_ANIM_MASK != 0 && frame_count > 2 {
            for i in (1..frame_count - 1).rev() {
                let delay = anim.delay(i);
                anim.push_seq(i as u8, delay);
            }
        }

        self.anim = Some(anim);
        Ok(())
    }
}

impl<F: ImageFile> FormatReader for GameCubeSave<F> {
    fn format_name(&self) -> &'static str {
        match self.save_type {
            SaveType::Gci => "GameCube GCI",
            SaveType::Gcs => "GameCube GCS (GameShark)",
            SaveType::Sav => "GameCube SAV (MaxDrive)",
        }
    }

    fn fields(&self) -> Vec<Field> {
        let de = &self.direntry;
        // lastmodified counts seconds from 2000-01-01 00:00:00 UTC.
        let mtime = de.lastmodified as i64 + 946_684_800;
        vec![
            Field::string("Game ID", String::from_utf8_lossy(&de.id6).into_owned()),
            Field::bytes("Filename", de.filename.to_vec()),
            Field::datetime("Last Modified", mtime),
            Field::number("Permission", de.permission),
            Field::number("Copy Count", de.copytimes),
            Field::number("Blocks", de.length),
        ]
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemReader;

    /// A one-block GCI with an RGB5A3 banner and `icons` RGB5A3 icon frames.
    fn build_gci(icons: usize, bounce: bool) -> Vec<u8> {
        let mut entry = [0u8; CARD_DIRENTRY_SIZE];
        entry[..6].copy_from_slice(b"GTEST0");
        entry[0x06] = 0xFF; // pad_00
        let mut bannerfmt = CARD_BANNER_RGB;
        if bounce {
            bannerfmt |= CARD_ANIM_MASK;
        }
        entry[0x07] = bannerfmt;
        entry[0x08..0x0C].copy_from_slice(b"TEST");
        // iconaddr = 0
        let mut iconfmt = 0u16;
        let mut iconspeed = 0u16;
        for i in 0..icons {
            iconfmt |= CARD_ICON_RGB << (2 * i);
            iconspeed |= 2 << (2 * i); // middle speed
        }
        entry[0x30..0x32].copy_from_slice(&iconfmt.to_be_bytes());
        entry[0x32..0x34].copy_from_slice(&iconspeed.to_be_bytes());
        // Two blocks: banner + three RGB icons need more than one.
        entry[0x38..0x3A].copy_from_slice(&2u16.to_be_bytes()); // length
        entry[0x3A] = 0xFF;
        entry[0x3B] = 0xFF;
        entry[0x3C..0x40].copy_from_slice(&0x1000u32.to_be_bytes()); // commentaddr

        let mut file = entry.to_vec();
        file.resize(CARD_DIRENTRY_SIZE + 2 * BLOCK_SIZE as usize, 0);
        // Banner pixels at 0: opaque white RGB5A3.
        for px in file[CARD_DIRENTRY_SIZE..CARD_DIRENTRY_SIZE + 96 * 32 * 2].chunks_exact_mut(2)
        {
            px.copy_from_slice(&0xFFFFu16.to_be_bytes());
        }
        file
    }

    #[test]
    fn gci_identifies_and_decodes_banner() {
        let mut save = GameCubeSave::open(MemReader::new(build_gci(1, false))).unwrap();
        assert_eq!(save.save_type(), SaveType::Gci);
        let banner = save.decode_banner().unwrap();
        assert_eq!(banner.width(), 96);
        assert_eq!(banner.height(), 32);
        assert_eq!(banner.scanline_argb32(0)[0], 0xFFFFFFFF);
    }

    #[test]
    fn icon_sequence_and_delays() {
        let mut save = GameCubeSave::open(MemReader::new(build_gci(3, false))).unwrap();
        save.decode_image().unwrap();
        let anim = save.icon_anim_data().unwrap();
        assert_eq!(anim.count(), 3);
        assert_eq!(anim.seq_count(), 3);
        assert_eq!(anim.delay(0), FrameDelay::new(2, 8));
        assert_eq!(anim.delay(0).ms, 250);
    }

    #[test]
    fn bounce_animation_reflects_sequence() {
        let mut save = GameCubeSave::open(MemReader::new(build_gci(3, true))).unwrap();
        save.decode_image().unwrap();
        let anim = save.icon_anim_data().unwrap();
        // 0 1 2 1
        assert_eq!(anim.seq_count(), 4);
        assert_eq!(anim.seq_index(2), Some(2));
        assert_eq!(anim.seq_index(3), Some(1));
    }

    #[test]
    fn non_alphanumeric_id_is_rejected() {
        let mut data = build_gci(1, false);
        data[0] = 0x00;
        assert!(GameCubeSave::open(MemReader::new(data)).is_err());
    }

    #[test]
    fn sav_pre_swap_restores_field_order() {
        let mut entry = [0u8; CARD_DIRENTRY_SIZE];
        entry[..6].copy_from_slice(b"GTEST0");
        // MaxDrive stores pad_00/bannerfmt swapped:
        entry[0x06] = CARD_BANNER_RGB;
        entry[0x07] = 0xFF;
        // iconaddr 0x00000400 in PDP order: halves swapped independently.
        let iconaddr = 0x0000_0400u32.to_be_bytes();
        entry[0x2C] = iconaddr[1];
        entry[0x2D] = iconaddr[0];
        entry[0x2E] = iconaddr[3];
        entry[0x2F] = iconaddr[2];
        // length (LE within the swapped span means plain LE here)
        entry[0x38..0x3A].copy_from_slice(&1u16.to_le_bytes());
        entry[0x3A] = 0xFF;
        entry[0x3B] = 0xFF;

        let mut file = vec![0u8; 0x80];
        file[..16].copy_from_slice(SAV_MAGIC);
        file.extend_from_slice(&entry);
        file.resize(0x80 + CARD_DIRENTRY_SIZE + BLOCK_SIZE as usize, 0);

        let save = GameCubeSave::open(MemReader::new(file)).unwrap();
        assert_eq!(save.save_type(), SaveType::Sav);
        assert_eq!(save.direntry.iconaddr, 0x400);
        assert_eq!(save.direntry.bannerfmt, CARD_BANNER_RGB);
        assert_eq!(save.direntry.length, 1);
    }
}
