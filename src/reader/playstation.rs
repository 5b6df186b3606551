//! PlayStation 1 saves in the PS3 PSV wrapper (.psv).
//!
//! A PSV file wraps one PS1 memory card save; the "SC" block at 0x84 holds
//! the title, the 16-entry BGR555 palette (a raw 0x0000 entry means
//! transparent), and up to three 16x16 CI4 icon frames.

use nom::{
    bytes::complete::{tag, take},
    number::complete::{le_u16, le_u8},
    IResult,
};

use crate::{
    anim::{FrameDelay, IconAnimData},
    decode::{linear, PixelFormat},
    error::{DecodeError, DecodeResult},
    image::SharedImage,
    io::ImageFile,
    reader::{Field, FormatReader},
};

// -------------------------------------------------------------------------------------------------

pub const PSV_MAGIC: &[u8; 8] = b"\x00VSP\x00\x00\x00\x00";
pub const SC_STRUCT_SIZE: usize = 512;
pub const PSV_HEADER_SIZE: usize = 0x84 + SC_STRUCT_SIZE;

const SC_OFFSET: u64 = 0x84;
const ICON_W: usize = 16;
const ICON_H: usize = 16;
const ICON_FRAME_SIZE: usize = ICON_W * ICON_H / 2;

/// Icon display flag. The 0x16..0x18 alternates behave like 0x11..0x13.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum IconFlag {
    None,
    Static,
    Anim2,
    Anim3,
}

impl IconFlag {
    fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0x00 => Some(IconFlag::None),
            0x11 | 0x16 => Some(IconFlag::Static),
            0x12 | 0x17 => Some(IconFlag::Anim2),
            0x13 | 0x18 => Some(IconFlag::Anim3),
            _ => None,
        }
    }

    /// (frame count, delay in PAL frames at 50 Hz)
    fn frames_and_delay(self) -> (usize, u16) {
        match self {
            IconFlag::None => (0, 0),
            IconFlag::Static => (1, 0),
            IconFlag::Anim2 => (2, 16),
            IconFlag::Anim3 => (3, 11),
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// The 512-byte "SC" block.
pub struct ScStruct {
    pub icon_flag: u8,
    pub blocks: u8,
    /// Shift-JIS title bytes; transcoding is external.
    pub title: [u8; 64],
    pub pocket_mcicon: u16,
    pub pocket_magic: [u8; 4],
    pub pocket_apicon: u16,
    pub icon_pal: [u8; 32],
    pub icon_data: [[u8; ICON_FRAME_SIZE]; 3],
}

impl ScStruct {
    fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, _magic) = tag(b"SC")(input)?;
        let (input, icon_flag) = le_u8(input)?;
        let (input, blocks) = le_u8(input)?;
        let (input, title) = take(64usize)(input)?;
        let (input, _reserved1) = take(12usize)(input)?;
        let (input, pocket_mcicon) = le_u16(input)?;
        let (input, pocket_magic) = take(4usize)(input)?;
        let (input, pocket_apicon) = le_u16(input)?;
        let (input, _reserved2) = take(8usize)(input)?;
        let (input, icon_pal) = take(32usize)(input)?;
        let (input, frame0) = take(ICON_FRAME_SIZE)(input)?;
        let (input, frame1) = take(ICON_FRAME_SIZE)(input)?;
        let (input, frame2) = take(ICON_FRAME_SIZE)(input)?;
        Ok((input, Self {
            icon_flag,
            blocks,
            title: title.try_into().unwrap(),
            pocket_mcicon,
            pocket_magic: pocket_magic.try_into().unwrap(),
            pocket_apicon,
            icon_pal: icon_pal.try_into().unwrap(),
            icon_data: [
                frame0.try_into().unwrap(),
                frame1.try_into().unwrap(),
                frame2.try_into().unwrap(),
            ],
        }))
    }
}

// -------------------------------------------------------------------------------------------------

/// The SC block is fully resident after `open`, so the reader does not
/// hold on to the file.
pub struct PlayStationSave {
    sc: ScStruct,
    filename: [u8; 20],
    anim: Option<IconAnimData>,
}

impl PlayStationSave {
    pub fn open<F: ImageFile>(mut file: F) -> DecodeResult<Self> {
        let mut header = [0u8; PSV_HEADER_SIZE];
        file.read_exact_at(0, &mut header)?;

        if header[..8] != PSV_MAGIC[..] {
            return Err(DecodeError::BadMagic("PSV"));
        }

        let mut filename = [0u8; 20];
        filename.copy_from_slice(&header[0x64..0x78]);

        let (_, sc) = ScStruct::parse(&header[SC_OFFSET as usize..])
            .map_err(|_| DecodeError::BadMagic("PS1 SC block"))?;
        if IconFlag::from_raw(sc.icon_flag).is_none() {
            return Err(DecodeError::UnsupportedVersion {
                what: "PS1 icon flag",
                version: sc.icon_flag as u32,
            });
        }

        Ok(Self { sc, filename, anim: None })
    }

    /// True when the wrapped save is a PocketStation executable.
    pub fn is_pocketstation(&self) -> bool {
        self.filename.get(6) == Some(&b'P')
    }

    fn load_icons(&mut self) -> DecodeResult<()> {
        if self.anim.is_some() {
            return Ok(());
        }

        let flag = IconFlag::from_raw(self.sc.icon_flag).expect("validated in open");
        let (frames, delay) = flag.frames_and_delay();
        if frames == 0 {
            return Err(DecodeError::Corrupt("save has no icon"));
        }

        let mut anim = IconAnimData::new();
        for i in 0..frames {
            let img = linear::from_linear_ci4(
                PixelFormat::Bgr555Ps1,
                false,
                ICON_W,
                ICON_H,
                &self.sc.icon_data[i],
                &self.sc.icon_pal,
                0,
            )?;
            anim.push_frame(Some(SharedImage::new(img)));
            anim.push_seq(i as u8, FrameDelay::new(delay, 50));
        }
        self.anim = Some(anim);
        Ok(())
    }
}

impl FormatReader for PlayStationSave {
    fn format_name(&self) -> &'static str {
        "PlayStation PSV"
    }

    fn fields(&self) -> Vec<Field> {
        let mut fields = vec![
            Field::bytes("Title", self.sc.title.to_vec()),
            Field::bytes("Filename", self.filename.to_vec()),
            Field::number("Blocks", self.sc.blocks),
        ];
        if self.is_pocketstation() {
            fields.push(Field::bytes("PocketStation Magic", self.sc.pocket_magic.to_vec()));
            fields.push(Field::number("PocketStation MCicon Frames", self.sc.pocket_mcicon));
            fields.push(Field::number("PocketStation APicon Frames", self.sc.pocket_apicon));
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemReader;

    fn build_psv(icon_flag: u8) -> Vec<u8> {
        let mut data = vec![0u8; PSV_HEADER_SIZE];
        data[..8].copy_from_slice(PSV_MAGIC);
        let sc = SC_OFFSET as usize;
        data[sc..sc + 2].copy_from_slice(b"SC");
        data[sc + 2] = icon_flag;
        data[sc + 3] = 1; // blocks
        data[sc + 4..sc + 14].copy_from_slice(b"TEST TITLE");
        // Palette at sc + 0x60: entry 0 = 0x0000, entries 1..16 = 0x7FFF.
        for i in 1..16usize {
            let off = sc + 0x60 + i * 2;
            data[off..off + 2].copy_from_slice(&0x7FFFu16.to_le_bytes());
        }
        data
    }

    #[test]
    fn static_icon_palette_and_transparency() {
        let mut reader = PlayStationSave::open(MemReader::new(build_psv(0x11))).unwrap();
        let icon = reader.decode_image().unwrap();
        assert_eq!(icon.width(), 16);
        assert_eq!(icon.height(), 16);
        assert_eq!(icon.tr_idx(), Some(0));
        let pal = icon.palette().unwrap();
        assert_eq!(pal[0], 0x00000000);
        for &c in &pal[1..16] {
            assert_eq!(c, 0xFFFFFFFF);
        }
        let anim = reader.icon_anim_data().unwrap();
        assert_eq!(anim.count(), 1);
        assert_eq!(anim.delay(0).ms, 0);
    }

    #[test]
    fn three_frame_animation_delay_is_11_pal_frames() {
        let mut reader = PlayStationSave::open(MemReader::new(build_psv(0x13))).unwrap();
        reader.decode_image().unwrap();
        let anim = reader.icon_anim_data().unwrap();
        assert_eq!(anim.count(), 3);
        assert_eq!(anim.delay(0), FrameDelay::new(11, 50));
        assert_eq!(anim.delay(0).ms, 220);
    }

    #[test]
    fn alternate_flag_values_map_to_frame_counts() {
        let mut reader = PlayStationSave::open(MemReader::new(build_psv(0x17))).unwrap();
        reader.decode_image().unwrap();
        assert_eq!(reader.icon_anim_data().unwrap().count(), 2);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut data = build_psv(0x11);
        data[1] = b'X';
        assert!(PlayStationSave::open(MemReader::new(data)).is_err());
        let mut data = build_psv(0x42);
        data[SC_OFFSET as usize + 2] = 0x42;
        assert!(PlayStationSave::open(MemReader::new(data)).is_err());
    }
}
