//! Palm OS bitmap decompressors. Each one expands a compressed payload into
//! an uncompressed `row_bytes * height` buffer and fails deterministically
//! on truncated input, impossible runs, or output overflow.

use crate::error::{DecodeError, DecodeResult};

// -------------------------------------------------------------------------------------------------

/// Scanline compression: each row starts with per-8-byte-group diff masks.
/// A clear mask bit copies the byte from the previous row; a set bit takes
/// the next input byte. The first row behaves as if every mask were 0xFF.
pub fn decompress_scanline(
    compr_data: &[u8],
    row_bytes: usize,
    height: usize,
) -> DecodeResult<Vec<u8>> {
    let total = row_bytes * height;
    let mut out = Vec::with_capacity(total);
    let mut input = compr_data.iter().copied();
    let mut next = |out_len: usize| {
        input.next().ok_or(DecodeError::Truncated { expected: out_len + 1, got: out_len })
    };

    for y in 0..height {
        let row_start = out.len();
        let mut x = 0;
        while x < row_bytes {
            let mut diffmask = next(out.len())?;
            if y == 0 {
                diffmask = 0xFF;
            }

            let group = (row_bytes - x).min(8);
            for b in 0..group {
                let px = if diffmask & (0x80 >> b) == 0 {
                    // Same position in the previous row.
                    out[row_start - row_bytes + x + b]
                } else {
                    next(out.len())?
                };
                out.push(px);
            }
            x += group;
        }
    }

    debug_assert_eq!(out.len(), total);
    Ok(out)
}

/// Run-length pairs `(count, value)`. A zero count is illegal, and a run
/// must not cross a scanline boundary.
pub fn decompress_rle(compr_data: &[u8], row_bytes: usize, height: usize) -> DecodeResult<Vec<u8>> {
    let total = row_bytes * height;
    let mut out = Vec::with_capacity(total);
    let mut input = compr_data.iter().copied();

    for _ in 0..height {
        let mut x = 0;
        while x < row_bytes {
            let count = input
                .next()
                .ok_or(DecodeError::Truncated { expected: out.len() + 1, got: out.len() })?
                as usize;
            if count == 0 {
                return Err(DecodeError::Corrupt("RLE run count of 0"));
            }
            if x + count > row_bytes {
                return Err(DecodeError::Corrupt("RLE run crosses a scanline boundary"));
            }
            let value = input
                .next()
                .ok_or(DecodeError::Truncated { expected: out.len() + 1, got: out.len() })?;
            out.resize(out.len() + count, value);
            x += count;
        }
    }

    debug_assert_eq!(out.len(), total);
    Ok(out)
}

/// PackBits, 8-bpp flavor. Control byte `c`: -128 is a no-op; `c < 0` means
/// the next byte repeated `1 - c` times; `c >= 0` means `c + 1` literal
/// bytes. Both run kinds clamp to the end of the current row.
pub fn decompress_packbits8(
    compr_data: &[u8],
    row_bytes: usize,
    height: usize,
) -> DecodeResult<Vec<u8>> {
    let total = row_bytes * height;
    let mut out = Vec::with_capacity(total);
    let mut pos = 0usize;

    let mut take = |pos: &mut usize, n: usize, out_len: usize| -> DecodeResult<usize> {
        if *pos + n > compr_data.len() {
            return Err(DecodeError::Truncated { expected: out_len + n, got: out_len });
        }
        let at = *pos;
        *pos += n;
        Ok(at)
    };

    for _ in 0..height {
        let mut x = 0;
        while x < row_bytes {
            let at = take(&mut pos, 1, out.len())?;
            let cbyte = compr_data[at] as i8;

            if cbyte == -128 {
                // No-op; consumes no data byte.
                continue;
            } else if cbyte < 0 {
                let mut reps = 1 - cbyte as isize as usize;
                if x + reps >= row_bytes {
                    reps = row_bytes - x;
                }
                let at = take(&mut pos, 1, out.len())?;
                out.resize(out.len() + reps, compr_data[at]);
                x += reps;
            } else {
                let reps = 1 + cbyte as usize;
                let at = take(&mut pos, reps, out.len())?;
                let to_copy = reps.min(row_bytes - x);
                out.extend_from_slice(&compr_data[at..at + to_copy]);
                x += to_copy;
            }
        }
    }

    debug_assert_eq!(out.len(), total);
    Ok(out)
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scanline_first_row_is_all_literal() {
        // 4-byte rows. Row 0: mask ignored (forced 0xFF), 4 literals.
        // Row 1: mask 0b1010_0000 -> bytes 0 and 2 literal, 1 and 3 copied.
        let compressed = [0x00, 1, 2, 3, 4, 0b1010_0000, 9, 8];
        let out = decompress_scanline(&compressed, 4, 2).unwrap();
        assert_eq!(out, vec![1, 2, 3, 4, 9, 2, 8, 4]);
    }

    #[test]
    fn scanline_truncation_fails() {
        assert!(matches!(
            decompress_scanline(&[0x00, 1, 2], 4, 1),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn rle_rejects_zero_count_and_row_crossing() {
        assert!(matches!(
            decompress_rle(&[0, 7], 4, 1),
            Err(DecodeError::Corrupt("RLE run count of 0"))
        ));
        assert!(matches!(decompress_rle(&[5, 7], 4, 1), Err(DecodeError::Corrupt(_))));
        let out = decompress_rle(&[4, 7, 2, 1, 2, 2], 4, 2).unwrap();
        assert_eq!(out, vec![7, 7, 7, 7, 1, 1, 2, 2]);
    }

    #[test]
    fn packbits_minus_128_is_a_noop() {
        // -128 consumes no data byte; the following literal run still decodes.
        let compressed = [0x80u8, 3, 10, 11, 12, 13];
        let out = decompress_packbits8(&compressed, 4, 1).unwrap();
        assert_eq!(out, vec![10, 11, 12, 13]);
    }

    #[test]
    fn packbits_repeat_and_literal_clamp_to_row_end() {
        // -2 -> 3 repeats of 0xAA, then literal run of 1.
        let compressed = [0xFEu8, 0xAA, 0x00, 0xBB];
        let out = decompress_packbits8(&compressed, 4, 1).unwrap();
        assert_eq!(out, vec![0xAA, 0xAA, 0xAA, 0xBB]);

        // A repeat that would overrun the row is clamped.
        let compressed = [0xF9u8, 0xCC]; // 8 repeats into a 4-byte row
        let out = decompress_packbits8(&compressed, 4, 1).unwrap();
        assert_eq!(out, vec![0xCC; 4]);
    }
}
