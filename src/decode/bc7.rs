//! BC7 block decoder.
//!
//! A block is 128 bits, treated as a little-endian bit stream: a unary mode
//! code, then rotation/index-selection bits, partition number, endpoint
//! components packed RRRR/GGGG/BBBB (then AAAA), p-bits, and index streams.

use crate::{
    error::{DecodeError, DecodeResult},
    image::{blit::blit_tile_argb32, Image, ImageFormat},
    pixel::SBit,
};

// -------------------------------------------------------------------------------------------------

const AWEIGHT2: [u8; 4] = [0, 21, 43, 64];
const AWEIGHT3: [u8; 8] = [0, 9, 18, 27, 37, 46, 55, 64];
const AWEIGHT4: [u8; 16] = [0, 4, 9, 13, 17, 21, 26, 30, 34, 38, 43, 47, 51, 55, 60, 64];

// Each partition word packs 16 two-bit subset indices, pixel 0 in the low bits.
#[rustfmt::skip]
const BC7_2SUB: [u32; 64] = [
    0x50505050, 0x40404040, 0x54545454, 0x54505040,
    0x50404000, 0x55545450, 0x55545040, 0x54504000,
    0x50400000, 0x55555450, 0x55544000, 0x54400000,
    0x55555440, 0x55550000, 0x55555500, 0x55000000,
    0x55150100, 0x00004054, 0x15010000, 0x00405054,
    0x00004050, 0x15050100, 0x05010000, 0x40505054,
    0x00404050, 0x05010100, 0x14141414, 0x05141450,
    0x01155440, 0x00555500, 0x15014054, 0x05414150,
    0x44444444, 0x55005500, 0x11441144, 0x05055050,
    0x05500550, 0x11114444, 0x41144114, 0x44111144,
    0x15055054, 0x01055040, 0x05041050, 0x05455150,
    0x14414114, 0x50050550, 0x41411414, 0x00141400,
    0x00041504, 0x00105410, 0x10541000, 0x04150400,
    0x50410514, 0x41051450, 0x05415014, 0x14054150,
    0x41050514, 0x41505014, 0x40011554, 0x54150140,
    0x50505500, 0x00555050, 0x15151010, 0x54540404,
];

#[rustfmt::skip]
const BC7_3SUB: [u32; 64] = [
    0xAA685050, 0x6A5A5040, 0x5A5A4200, 0x5450A0A8,
    0xA5A50000, 0xA0A05050, 0x5555A0A0, 0x5A5A5050,
    0xAA550000, 0xAA555500, 0xAAAA5500, 0x90909090,
    0x94949494, 0xA4A4A4A4, 0xA9A59450, 0x2A0A4250,
    0xA5945040, 0x0A425054, 0xA5A5A500, 0x55A0A0A0,
    0xA8A85454, 0x6A6A4040, 0xA4A45000, 0x1A1A0500,
    0x0050A4A4, 0xAAA59090, 0x14696914, 0x69691400,
    0xA08585A0, 0xAA821414, 0x50A4A450, 0x6A5A0200,
    0xA9A58000, 0x5090A0A8, 0xA8A09050, 0x24242424,
    0x00AA5500, 0x24924924, 0x24499224, 0x50A50A50,
    0x500AA550, 0xAAAA4444, 0x66660000, 0xA5A0A5A0,
    0x50A050A0, 0x69286928, 0x44AAAA44, 0x66666600,
    0xAA444444, 0x54A854A8, 0x95809580, 0x96969600,
    0xA85454A8, 0x80959580, 0xAA141414, 0x96960000,
    0xAAAA1414, 0xA05050A0, 0xA0A5A5A0, 0x96000000,
    0x40804080, 0xA9A8A9A8, 0xAAAAAA44, 0x2A4A5254,
];

#[rustfmt::skip]
const ANCHOR_2OF2: [u8; 64] = [
    15, 15, 15, 15, 15, 15, 15, 15,
    15, 15, 15, 15, 15, 15, 15, 15,
    15,  2,  8,  2,  2,  8,  8, 15,
     2,  8,  2,  2,  8,  8,  2,  2,
    15, 15,  6,  8,  2,  8, 15, 15,
     2,  8,  2,  2,  2, 15, 15,  6,
     6,  2,  6,  8, 15, 15,  2,  2,
    15, 15, 15, 15, 15,  2,  2, 15,
];

#[rustfmt::skip]
const ANCHOR_2OF3: [u8; 64] = [
     3,  3, 15, 15,  8,  3, 15, 15,
     8,  8,  6,  6,  6,  5,  3,  3,
     3,  3,  8, 15,  3,  3,  6, 10,
     5,  8,  8,  6,  8,  5, 15, 15,
     8, 15,  3,  5,  6, 10,  8, 15,
    15,  3, 15,  5, 15, 15, 15, 15,
     3, 15,  5,  5,  5,  8,  5, 10,
     5, 10,  8, 13, 15, 12,  3,  3,
];

#[rustfmt::skip]
const ANCHOR_3OF3: [u8; 64] = [
    15,  8,  8,  3, 15, 15,  3,  8,
    15, 15, 15, 15, 15, 15, 15,  8,
    15,  8, 15,  3, 15,  8, 15,  8,
     3, 15,  6, 10, 15, 15, 10,  8,
    15,  3, 15, 10, 10,  8,  9, 10,
     6, 15,  8, 15,  3,  6,  6,  8,
    15,  3, 15, 15, 15, 15, 15, 15,
    15, 15, 15, 15,  3, 15, 15,  8,
];

const SUBSET_COUNT: [u8; 8] = [3, 2, 3, 2, 1, 1, 1, 2];
const PARTITION_BITS: [u8; 8] = [4, 6, 6, 6, 0, 0, 0, 6];
const ENDPOINT_COUNT: [u8; 8] = [6, 4, 6, 4, 2, 2, 2, 4];
const ENDPOINT_BITS: [u8; 8] = [4, 6, 5, 7, 5, 7, 7, 5];
const ALPHA_BITS: [u8; 8] = [0, 0, 0, 0, 6, 8, 7, 5];
const PBIT_COUNT: [u8; 8] = [1, 1, 0, 1, 0, 0, 1, 1];
const INDEX_BITS: [u8; 8] = [3, 3, 2, 2, 0, 2, 4, 2];

// -------------------------------------------------------------------------------------------------

fn interpolate_component(bits: u32, index: u32, e0: u8, e1: u8) -> u8 {
    debug_assert!((2..=4).contains(&bits));
    debug_assert!(index < (1 << bits));

    if index == 0 {
        return e0;
    } else if index == (1 << bits) - 1 {
        return e1;
    }

    let weight = match bits {
        2 => AWEIGHT2[index as usize],
        3 => AWEIGHT3[index as usize],
        _ => AWEIGHT4[index as usize],
    } as u32;
    ((((64 - weight) * e0 as u32) + (weight * e1 as u32) + 32) >> 6) as u8
}

fn anchor_index(partition: u8, subset: u8, subset_count: u8) -> u8 {
    if subset == 0 {
        return 0;
    }
    match subset_count {
        2 => ANCHOR_2OF2[partition as usize],
        3 => {
            if subset == 1 {
                ANCHOR_2OF3[partition as usize]
            } else {
                ANCHOR_3OF3[partition as usize]
            }
        }
        _ => 0,
    }
}

/// The 128-bit block as two 64-bit halves, consumed from the LSB up.
struct Bc7Bits {
    lsb: u64,
    msb: u64,
}

impl Bc7Bits {
    fn new(block: &[u8]) -> Self {
        Self {
            lsb: u64::from_le_bytes(block[..8].try_into().unwrap()),
            msb: u64::from_le_bytes(block[8..16].try_into().unwrap()),
        }
    }

    /// Shifts the 128-bit value right by `shamt` (< 64) bits.
    fn rshift128(&mut self, shamt: u32) {
        debug_assert!(shamt < 64);
        if shamt == 0 {
            return;
        }
        self.lsb >>= shamt;
        self.lsb |= self.msb << (64 - shamt);
        self.msb >>= shamt;
    }
}

fn decode_bc7_block(block_bytes: &[u8], tile: &mut [u32; 16]) -> DecodeResult<()> {
    let mut block = Bc7Bits::new(block_bytes);

    // Mode is unary-coded in the low bits of the first 32-bit word.
    let dword0 = block.lsb as u32;
    if dword0 == 0 {
        return Err(DecodeError::Corrupt("BC7 block has an invalid mode"));
    }
    let mode = dword0.trailing_zeros() as usize;
    if mode >= 8 {
        return Err(DecodeError::Corrupt("BC7 block has an invalid mode"));
    }
    block.rshift128(mode as u32 + 1);

    // Rotation: 0 = none, 1 = swap(A,R), 2 = swap(A,G), 3 = swap(A,B).
    let rotation_mode = if mode == 4 || mode == 5 {
        let r = (block.lsb & 3) as u8;
        block.rshift128(2);
        r
    } else {
        0
    };

    // Mode 4 carries both 2-bit and 3-bit index streams; this bit picks
    // which one drives color and which drives alpha.
    let idx_mode_m4 = if mode == 4 {
        let b = (block.lsb & 1) as u8;
        block.rshift128(1);
        b
    } else {
        0
    };

    let mut partition = 0u8;
    let subset = if PARTITION_BITS[mode] != 0 {
        partition = (block.lsb & ((1u64 << PARTITION_BITS[mode]) - 1)) as u8;
        block.rshift128(PARTITION_BITS[mode] as u32);
        match SUBSET_COUNT[mode] {
            2 => BC7_2SUB[partition as usize],
            3 => BC7_3SUB[partition as usize],
            _ => 0,
        }
    } else {
        0
    };

    // Endpoint components arrive RRRR/GGGG/BBBB, one component per endpoint
    // at a time, left-aligned into 8 bits.
    let mut endpoint_bits = ENDPOINT_BITS[mode] as u32;
    let endpoint_count = ENDPOINT_COUNT[mode] as usize;
    let endpoint_mask = (1u64 << endpoint_bits) - 1;
    let endpoint_shamt = 8 - endpoint_bits;
    let mut endpoints = [[0u8; 4]; 8];
    for comp in 0..3 {
        for ep in endpoints.iter_mut().take(endpoint_count) {
            ep[comp] = ((block.lsb & endpoint_mask) << endpoint_shamt) as u8;
            block.rshift128(endpoint_bits);
        }
    }

    let mut alpha_bits = ALPHA_BITS[mode] as u32;
    let mut alpha = [255u8; 4];
    if alpha_bits != 0 {
        let alpha_mask = (1u64 << alpha_bits) - 1;
        let alpha_shamt = 8 - alpha_bits;
        for a in alpha.iter_mut().take(endpoint_count) {
            *a = ((block.lsb & alpha_mask) << alpha_shamt) as u8;
            block.rshift128(alpha_bits);
        }
    }

    // P-bits extend every endpoint component by one low bit.
    if PBIT_COUNT[mode] != 0 {
        if mode == 1 {
            // Two p-bits shared by endpoint pairs.
            if block.lsb & 1 != 0 {
                for ep in endpoints.iter_mut().take(2) {
                    for c in ep.iter_mut() {
                        *c |= 0x02;
                    }
                }
            }
            if block.lsb & 2 != 0 {
                for ep in endpoints[2..4].iter_mut() {
                    for c in ep.iter_mut() {
                        *c |= 0x02;
                    }
                }
            }
            block.rshift128(2);
        } else {
            let p_ep_shamt = 7 - endpoint_bits;
            let mut lsb8 = block.lsb & 0xFF;
            for ep in endpoints.iter_mut().take(endpoint_count) {
                if lsb8 & 1 != 0 {
                    for c in ep.iter_mut() {
                        *c |= 1 << p_ep_shamt;
                    }
                }
                lsb8 >>= 1;
            }

            if alpha_bits > 0 {
                let p_a_shamt = 7 - alpha_bits;
                let mut lsb8 = block.lsb & 0xFF;
                for a in alpha.iter_mut().take(endpoint_count) {
                    *a |= ((lsb8 & 1) << p_a_shamt) as u8;
                    lsb8 >>= 1;
                }
                alpha_bits += 1;
            }

            block.rshift128(endpoint_count as u32);
        }
        endpoint_bits += 1;
    }

    // Expand from N bits to 8 by MSB replication.
    if endpoint_bits < 8 {
        for ep in endpoints.iter_mut().take(endpoint_count) {
            for c in ep.iter_mut().take(3) {
                *c |= *c >> endpoint_bits;
            }
        }
    }
    if alpha_bits != 0 && alpha_bits < 8 {
        for a in alpha.iter_mut().take(endpoint_count) {
            *a |= *a >> alpha_bits;
        }
    }

    // From here on everything left fits in the LSB word, except mode 4's
    // 3-bit stream which straddles the halves.
    let mut index_bits = INDEX_BITS[mode] as u32;
    let mut idx_data: u64;
    let mut index_mask: u32;
    if mode == 4 {
        if idx_mode_m4 != 0 {
            // 3-bit indexes drive color. 50 bits are consumed by now, so the
            // stream sits across the boundary.
            idx_data = (block.msb << 33) | (block.lsb >> 31);
            index_bits = 3;
            index_mask = (1 << 3) - 1;
        } else {
            idx_data = block.lsb & ((1u64 << 31) - 1);
            index_bits = 2;
            index_mask = (1 << 2) - 1;
        }
    } else {
        idx_data = block.lsb;
        index_mask = (1 << index_bits) - 1;
    }

    let subset_count = SUBSET_COUNT[mode];
    let mut anchors = [0u8; 4];
    for (i, a) in anchors.iter_mut().enumerate().take(subset_count as usize).skip(1) {
        *a = anchor_index(partition, i as u8, subset_count);
    }

    // Color channels.
    let mut subset_data = subset;
    for (i, px) in tile.iter_mut().enumerate() {
        let subset_idx = (subset_data & 3) as usize;
        subset_data >>= 2;

        let data_idx = if i as u8 == anchors[subset_idx] {
            let d = (idx_data as u32) & (index_mask >> 1);
            idx_data >>= index_bits - 1;
            d
        } else {
            let d = (idx_data as u32) & index_mask;
            idx_data >>= index_bits;
            d
        };

        let ep = subset_idx * 2;
        let r = interpolate_component(index_bits, data_idx, endpoints[ep][0], endpoints[ep + 1][0]);
        let g = interpolate_component(index_bits, data_idx, endpoints[ep][1], endpoints[ep + 1][1]);
        let b = interpolate_component(index_bits, data_idx, endpoints[ep][2], endpoints[ep + 1][2]);
        *px = ((r as u32) << 16) | ((g as u32) << 8) | b as u32;
    }

    // Alpha channel.
    if mode == 4 {
        let (mut idx_data, a_bits, a_mask) = if idx_mode_m4 != 0 {
            (block.lsb & ((1u64 << 31) - 1), 2u32, (1u32 << 2) - 1)
        } else {
            ((block.msb << 33) | (block.lsb >> 31), 3u32, (1u32 << 3) - 1)
        };
        let mut subset_data = subset;
        for (i, px) in tile.iter_mut().enumerate() {
            let subset_idx = (subset_data & 3) as usize;
            subset_data >>= 2;

            let data_idx = if i as u8 == anchors[subset_idx] {
                let d = (idx_data as u32) & (a_mask >> 1);
                idx_data >>= a_bits - 1;
                d
            } else {
                let d = (idx_data as u32) & a_mask;
                idx_data >>= a_bits;
                d
            };
            let a = interpolate_component(a_bits, data_idx, alpha[0], alpha[1]);
            *px |= (a as u32) << 24;
        }
    } else if alpha_bits == 0 {
        for px in tile.iter_mut() {
            *px |= 0xFF00_0000;
        }
    } else {
        // Mode 5 has a dedicated 2-bit alpha stream after the color indexes;
        // other alpha modes reuse the color indexes.
        let mut idx_data = if mode == 5 { block.lsb >> 31 } else { block.lsb };
        let mut subset_data = subset;
        for (i, px) in tile.iter_mut().enumerate() {
            let subset_idx = (subset_data & 3) as usize;
            subset_data >>= 2;

            let data_idx = if i as u8 == anchors[subset_idx] {
                let d = (idx_data as u32) & (index_mask >> 1);
                idx_data >>= index_bits - 1;
                d
            } else {
                let d = (idx_data as u32) & index_mask;
                idx_data >>= index_bits;
                d
            };
            let ep = subset_idx * 2;
            let a = interpolate_component(index_bits, data_idx, alpha[ep], alpha[ep + 1]);
            *px |= (a as u32) << 24;
        }
    }

    match rotation_mode & 3 {
        1 => {
            for px in tile.iter_mut() {
                let (a, r) = (*px >> 24, (*px >> 16) & 0xFF);
                *px = (*px & 0x0000_FFFF) | (r << 24) | (a << 16);
            }
        }
        2 => {
            for px in tile.iter_mut() {
                let (a, g) = (*px >> 24, (*px >> 8) & 0xFF);
                *px = (*px & 0x00FF_00FF) | (g << 24) | (a << 8);
            }
        }
        3 => {
            for px in tile.iter_mut() {
                let (a, b) = (*px >> 24, *px & 0xFF);
                *px = (*px & 0x00FF_FF00) | (b << 24) | a;
            }
        }
        _ => {}
    }

    Ok(())
}

// -------------------------------------------------------------------------------------------------

/// BC7 image to ARGB32. Non-block-aligned dimensions decode into a padded
/// physical buffer and crop afterwards. The first bad block fails the whole
/// decode; no partial image escapes.
pub fn from_bc7(width: usize, height: usize, img_buf: &[u8]) -> DecodeResult<Image> {
    if width == 0 || height == 0 {
        return Err(DecodeError::InvalidGeometry {
            width: width as u32,
            height: height as u32,
            reason: "dimensions must be non-zero",
        });
    }
    let phys_w = (width + 3) & !3;
    let phys_h = (height + 3) & !3;
    let expected = phys_w * phys_h;
    if img_buf.len() < expected {
        return Err(DecodeError::Truncated { expected, got: img_buf.len() });
    }

    let mut img = Image::new(phys_w, phys_h, ImageFormat::Argb32)?;
    let mut tile = [0u32; 16];
    let mut blocks = img_buf.chunks_exact(16);
    for ty in 0..phys_h / 4 {
        for tx in 0..phys_w / 4 {
            decode_bc7_block(blocks.next().expect("length checked above"), &mut tile)?;
            blit_tile_argb32::<4, 4>(&mut img, &tile, tx, ty);
        }
    }

    if width < phys_w || height < phys_h {
        img.shrink(width, height)?;
    }
    img.set_sbit(SBit::new(8, 8, 8, 0, 8));
    Ok(img)
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_mode_word_is_invalid() {
        let block = [0u8; 16];
        let mut tile = [0u32; 16];
        assert!(decode_bc7_block(&block, &mut tile).is_err());
        assert!(from_bc7(4, 4, &block).is_err());
    }

    #[test]
    fn weight_tables_interpolate_endpoints_exactly() {
        assert_eq!(interpolate_component(2, 0, 10, 200), 10);
        assert_eq!(interpolate_component(2, 3, 10, 200), 200);
        assert_eq!(interpolate_component(3, 7, 10, 200), 200);
        assert_eq!(interpolate_component(4, 15, 10, 200), 200);
        // Midpoint of aWeight2: w = 43.
        assert_eq!(interpolate_component(2, 2, 0, 255), ((43 * 255 + 32) >> 6) as u8);
    }

    #[test]
    fn mode5_solid_color_block() {
        // Mode 5: bit 5 set. Rotation 0. Endpoints 7-bit: R0 = 0x7F,
        // R1 = 0x7F, G/B = 0, alpha bytes 0xFF/0xFF, indexes all zero.
        // Pixel 0 uses endpoint 0 everywhere -> opaque red.
        let mut bits = 0u128;
        let mut pos = 0;
        let mut put = |val: u128, n: u32| {
            bits |= val << pos;
            pos += n;
        };
        put(1 << 5, 6); // mode 5 (five zeros then a one)
        put(0, 2); // rotation
        put(0x7F, 7); // R0
        put(0x7F, 7); // R1
        put(0, 7); // G0
        put(0, 7); // G1
        put(0, 7); // B0
        put(0, 7); // B1
        put(0xFF, 8); // A0
        put(0xFF, 8); // A1
        // Color indexes (31 bits) and alpha indexes (31 bits) stay zero.

        let block = bits.to_le_bytes();
        let mut tile = [0u32; 16];
        decode_bc7_block(&block, &mut tile).unwrap();
        for px in tile {
            // 7-bit endpoints expand to 8 by MSB replication: 0x7F -> 0xFF.
            assert_eq!(px, 0xFFFF0000);
        }
    }

    #[test]
    fn mode5_rotation_swaps_alpha_into_red() {
        let mut bits = 0u128;
        let mut pos = 0;
        let mut put = |val: u128, n: u32| {
            bits |= val << pos;
            pos += n;
        };
        put(1 << 5, 6); // mode 5
        put(1, 2); // rotation 1: swap A and R
        put(0x7F, 7); // R0
        put(0x7F, 7);
        put(0, 7 * 4); // G0 G1 B0 B1
        put(0x80, 8); // A0
        put(0x80, 8); // A1

        let block = bits.to_le_bytes();
        let mut tile = [0u32; 16];
        decode_bc7_block(&block, &mut tile).unwrap();
        for px in tile {
            assert_eq!(px >> 24, 0xFF);
            assert_eq!((px >> 16) & 0xFF, 0x80);
        }
    }

    #[test]
    fn non_aligned_bc7_crops() {
        // 5x5 -> 2x2 blocks. Use a valid mode 5 solid block.
        let mut bits = 0u128;
        let mut pos = 0;
        let mut put = |val: u128, n: u32| {
            bits |= val << pos;
            pos += n;
        };
        put(1 << 5, 6);
        put(0, 2);
        put(0x7F, 7 * 2);
        put(0, 7 * 4);
        put(0xFF, 8);
        put(0xFF, 8);
        let block = bits.to_le_bytes();
        let buf: Vec<u8> = std::iter::repeat(block).take(4).flatten().collect();
        let img = from_bc7(5, 5, &buf).unwrap();
        assert_eq!(img.width(), 5);
        assert_eq!(img.height(), 5);
    }
}
