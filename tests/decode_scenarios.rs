//! End-to-end decode scenarios over synthetic in-memory files.

use itertools::Itertools;
use retrotex::{
    decode::{bcn, linear, PixelFormat},
    io::MemReader,
    reader::{dreamcast::DreamcastSave, n3ds::Nintendo3ds, playstation::PlayStationSave},
    FormatReader,
};

// -------------------------------------------------------------------------------------------------

/// Dreamcast VMS: one frame, ARGB4444 palette with entry 0 transparent.
#[test]
fn vms_static_icon() {
    let mut vms = vec![0u8; 1024];
    vms[..16].copy_from_slice(b"SCENARIO ONE    ");
    vms[16..48].copy_from_slice(b"SCENARIO ONE LONG DESCRIPTION   ");
    vms[64..66].copy_from_slice(&1u16.to_le_bytes()); // icon_count
    for i in 1..16usize {
        vms[96 + i * 2..98 + i * 2].copy_from_slice(&0xF000u16.to_le_bytes());
    }

    let mut reader = DreamcastSave::open(MemReader::new(vms)).unwrap();
    let icon = reader.decode_image().unwrap();
    assert_eq!((icon.width(), icon.height()), (32, 32));
    assert_eq!(icon.tr_idx(), Some(0));
    let pal = icon.palette().unwrap();
    assert_eq!(pal[0], 0x00000000);
    assert!(pal[1..16].iter().all(|&c| c == 0xFF000000));
    assert!((0..32).all(|y| icon.scanline(y)[..32].iter().all(|&p| p == 0)));
}

/// PS1 PSV: static icon, palette entry 0 transparent, the rest white.
#[test]
fn psv_static_icon() {
    let mut psv = vec![0u8; 0x84 + 512];
    psv[..8].copy_from_slice(b"\x00VSP\x00\x00\x00\x00");
    psv[0x84..0x86].copy_from_slice(b"SC");
    psv[0x86] = 0x11;
    for i in 1..16usize {
        let off = 0x84 + 0x60 + i * 2;
        psv[off..off + 2].copy_from_slice(&0x7FFFu16.to_le_bytes());
    }

    let mut reader = PlayStationSave::open(MemReader::new(psv)).unwrap();
    let icon = reader.decode_image().unwrap();
    assert_eq!((icon.width(), icon.height()), (16, 16));
    assert_eq!(icon.tr_idx(), Some(0));
    let pal = icon.palette().unwrap();
    assert_eq!(pal[0], 0x00000000);
    assert!(pal[1..16].iter().all(|&c| c == 0xFFFFFFFF));
}

/// 3DS SMDH: tile ordering puts the first stored pixel at (0, 0).
#[test]
fn smdh_small_icon_tile_order() {
    let mut smdh = vec![0u8; 8256 + 0x1680];
    smdh[..4].copy_from_slice(b"SMDH");
    smdh[8256..8258].copy_from_slice(&0xFFFFu16.to_le_bytes());

    let mut reader = Nintendo3ds::open(MemReader::new(smdh)).unwrap();
    let icon = reader.decode_icon(retrotex::reader::n3ds::IconSize::Small).unwrap();
    assert_eq!(icon.scanline_argb32(0)[0], 0xFFFFFFFF);
    for (y, x) in (0..24).cartesian_product(0..24).skip(1) {
        assert_eq!(icon.scanline_argb32(y)[x], 0xFF000000);
    }
}

// -------------------------------------------------------------------------------------------------

/// A CI8 image with a transparent index resolves to alpha 0 exactly there.
#[test]
fn dup_argb32_respects_transparency() {
    let pal: Vec<u8> = (0..256u16)
        .flat_map(|i| if i == 7 { 0x0000u16 } else { 0xFFFF }.to_le_bytes())
        .collect();
    let pixels: Vec<u8> = (0..64).map(|i| if i % 8 == 0 { 7 } else { 1 }).collect();
    let img =
        linear::from_linear_ci8(PixelFormat::Argb1555, 8, 8, &pixels, &pal, 0).unwrap();
    assert_eq!(img.tr_idx(), Some(7));

    let argb = img.dup_argb32().unwrap();
    for y in 0..8 {
        for x in 0..8 {
            let expected = if (y * 8 + x) % 8 == 0 { 0x00000000 } else { 0xFFFFFFFF };
            assert_eq!(argb.scanline_argb32(y)[x], expected);
        }
    }
}

/// 7x7 DXT1 decodes by padding to 8x8 and cropping; the declared geometry
/// is what comes back.
#[test]
fn dxt1_non_aligned_geometry() {
    let mut block = [0u8; 8];
    block[..2].copy_from_slice(&0x07E0u16.to_le_bytes());
    let buf: Vec<u8> = std::iter::repeat(block).take(4).flatten().collect();
    let img = bcn::from_dxt1(7, 7, &buf).unwrap();
    assert_eq!((img.width(), img.height()), (7, 7));
    assert!((0..7).all(|y| img.scanline_argb32(y).iter().all(|&p| p == 0xFF00FF00)));
}

/// Flip is an involution and shrink preserves the top-left region, through
/// a real decoded image.
#[test]
fn post_processing_laws() {
    let data: Vec<u8> = (0..32u32 * 32).flat_map(|i| i.to_le_bytes()).collect();
    let img = linear::from_linear32(PixelFormat::Xrgb8888, 32, 32, &data, 0).unwrap();

    let flipped_twice = img.flip_vertical().unwrap().flip_vertical().unwrap();
    for y in 0..32 {
        assert_eq!(img.scanline_argb32(y), flipped_twice.scanline_argb32(y));
    }

    let mut cropped = linear::from_linear32(PixelFormat::Xrgb8888, 32, 32, &data, 0).unwrap();
    cropped.shrink(5, 3).unwrap();
    for y in 0..3 {
        assert_eq!(&img.scanline_argb32(y)[..5], cropped.scanline_argb32(y));
    }
}
