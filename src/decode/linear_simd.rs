//! Runtime-dispatched row kernels for the 32-bit byte-reorder formats.
//!
//! The scalar path is the canonical implementation; every accelerated path
//! must produce byte-identical output for the same input. The implementation
//! is probed once and cached as a function pointer.

use std::sync::OnceLock;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum RowOp {
    /// xRGB: force alpha to 0xFF.
    OrAlpha,
    /// Byte-swapped ARGB: reverse the bytes of each word.
    Swap,
    /// Byte-swapped xRGB: reverse bytes, then force alpha.
    SwapOrAlpha,
}

type RowFn = fn(RowOp, &[u8], &mut [u32]);

fn row_impl() -> RowFn {
    static SELECTED: OnceLock<RowFn> = OnceLock::new();
    *SELECTED.get_or_init(|| {
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        {
            if is_x86_feature_detected!("ssse3") {
                return x86::process_row_ssse3;
            }
            if is_x86_feature_detected!("sse2") {
                return x86::process_row_sse2;
            }
        }
        #[cfg(target_arch = "aarch64")]
        {
            if std::arch::is_aarch64_feature_detected!("neon") {
                return aarch64::process_row_neon;
            }
        }
        process_row_scalar
    })
}

/// Converts one row of `dst.len()` little-endian source words.
pub(crate) fn process_row(op: RowOp, src: &[u8], dst: &mut [u32]) {
    debug_assert_eq!(src.len(), dst.len() * 4);
    row_impl()(op, src, dst)
}

pub(crate) fn process_row_scalar(op: RowOp, src: &[u8], dst: &mut [u32]) {
    for (px, chunk) in dst.iter_mut().zip(src.chunks_exact(4)) {
        let v = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        *px = match op {
            RowOp::OrAlpha => v | 0xFF00_0000,
            RowOp::Swap => v.swap_bytes(),
            RowOp::SwapOrAlpha => v.swap_bytes() | 0xFF00_0000,
        };
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
mod x86 {
    #[cfg(target_arch = "x86")]
    use std::arch::x86::*;
    #[cfg(target_arch = "x86_64")]
    use std::arch::x86_64::*;

    use super::{process_row_scalar, RowOp};

    pub(crate) fn process_row_sse2(op: RowOp, src: &[u8], dst: &mut [u32]) {
        if op != RowOp::OrAlpha {
            // Byte shuffles need SSSE3; only the alpha fill runs on bare SSE2.
            return process_row_scalar(op, src, dst);
        }
        // SAFETY: reached only after is_x86_feature_detected!("sse2").
        unsafe { or_alpha_sse2(src, dst) }
    }

    #[target_feature(enable = "sse2")]
    unsafe fn or_alpha_sse2(src: &[u8], dst: &mut [u32]) {
        let alpha = _mm_set1_epi32(0xFF00_0000u32 as i32);
        let mut i = 0;
        while i + 4 <= dst.len() {
            // SAFETY: i + 4 <= dst.len() and src covers 4 bytes per pixel;
            // loadu/storeu have no alignment requirement.
            let v = _mm_loadu_si128(src.as_ptr().add(i * 4) as *const __m128i);
            _mm_storeu_si128(dst.as_mut_ptr().add(i) as *mut __m128i, _mm_or_si128(v, alpha));
            i += 4;
        }
        process_row_scalar(RowOp::OrAlpha, &src[i * 4..], &mut dst[i..]);
    }

    pub(crate) fn process_row_ssse3(op: RowOp, src: &[u8], dst: &mut [u32]) {
        // SAFETY: reached only after is_x86_feature_detected!("ssse3").
        unsafe { row_ssse3(op, src, dst) }
    }

    #[target_feature(enable = "ssse3")]
    unsafe fn row_ssse3(op: RowOp, src: &[u8], dst: &mut [u32]) {
        let alpha = _mm_set1_epi32(0xFF00_0000u32 as i32);
        let swap_mask = _mm_setr_epi8(3, 2, 1, 0, 7, 6, 5, 4, 11, 10, 9, 8, 15, 14, 13, 12);
        let mut i = 0;
        while i + 4 <= dst.len() {
            // SAFETY: same bounds argument as or_alpha_sse2.
            let v = _mm_loadu_si128(src.as_ptr().add(i * 4) as *const __m128i);
            let out = match op {
                RowOp::OrAlpha => _mm_or_si128(v, alpha),
                RowOp::Swap => _mm_shuffle_epi8(v, swap_mask),
                RowOp::SwapOrAlpha => _mm_or_si128(_mm_shuffle_epi8(v, swap_mask), alpha),
            };
            _mm_storeu_si128(dst.as_mut_ptr().add(i) as *mut __m128i, out);
            i += 4;
        }
        process_row_scalar(op, &src[i * 4..], &mut dst[i..]);
    }
}

#[cfg(target_arch = "aarch64")]
mod aarch64 {
    use std::arch::aarch64::*;

    use super::{process_row_scalar, RowOp};

    pub(crate) fn process_row_neon(op: RowOp, src: &[u8], dst: &mut [u32]) {
        // SAFETY: reached only after is_aarch64_feature_detected!("neon").
        unsafe { row_neon(op, src, dst) }
    }

    #[target_feature(enable = "neon")]
    unsafe fn row_neon(op: RowOp, src: &[u8], dst: &mut [u32]) {
        let alpha = vdupq_n_u32(0xFF00_0000);
        let mut i = 0;
        while i + 4 <= dst.len() {
            // SAFETY: i + 4 <= dst.len(); unaligned loads are allowed.
            let v = vld1q_u8(src.as_ptr().add(i * 4));
            let out = match op {
                RowOp::OrAlpha => vorrq_u32(vreinterpretq_u32_u8(v), alpha),
                RowOp::Swap => vreinterpretq_u32_u8(vrev32q_u8(v)),
                RowOp::SwapOrAlpha => vorrq_u32(vreinterpretq_u32_u8(vrev32q_u8(v)), alpha),
            };
            vst1q_u32(dst.as_mut_ptr().add(i), out);
            i += 4;
        }
        process_row_scalar(op, &src[i * 4..], &mut dst[i..]);
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accelerated_paths_match_scalar() {
        // Odd length exercises the scalar tail of the vector loops.
        let src: Vec<u8> = (0..41 * 4).map(|i| (i * 7 + 3) as u8).collect();
        for op in [RowOp::OrAlpha, RowOp::Swap, RowOp::SwapOrAlpha] {
            let mut expected = vec![0u32; 41];
            process_row_scalar(op, &src, &mut expected);
            let mut got = vec![0u32; 41];
            process_row(op, &src, &mut got);
            assert_eq!(expected, got, "{op:?}");
        }
    }
}
