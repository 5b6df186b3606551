pub mod astc;
pub mod bc7;
pub mod bcn;
pub mod linear;
mod linear_simd;
pub mod palette;
pub mod swizzle;
pub mod tiled;
pub mod twiddle;

// -------------------------------------------------------------------------------------------------

/// Source pixel layouts understood by the linear and palette decoders.
///
/// 8/16/24-bit formats name their bit layout directly. 32-bit formats name
/// the channel order from the high byte of the little-endian word down, so
/// `Argb8888` is host ARGB32 on disk and `Bgra8888` is its byte-swapped twin.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PixelFormat {
    // 16-bit RGB
    Rgb565,
    Bgr565,
    Argb1555,
    Abgr1555,
    Rgba5551,
    Bgra5551,
    Argb4444,
    Abgr4444,
    Rgba4444,
    Bgra4444,
    Xrgb4444,
    Xbgr4444,
    Rgbx4444,
    Bgrx4444,
    Argb8332,

    // 15-bit RGB
    Rgb555,
    Bgr555,
    /// PS1 quirk: a raw 0x0000 is transparent.
    Bgr555Ps1,

    // Console-specific 16-bit
    Rgb5a3,
    Bgr5a3,
    Ia8,

    // Luminance / alpha
    L8,
    L16,
    A8l8,
    L8a8,
    A4l4,
    A8,

    // Channel subsets
    R8,
    Rg88,
    Gr88,
    Rgb332,

    // 24-bit
    Rgb888,
    Bgr888,

    // 32-bit
    Argb8888,
    Abgr8888,
    Rgba8888,
    Bgra8888,
    Xrgb8888,
    Xbgr8888,
    Rgbx8888,
    Bgrx8888,
    G16r16,
    A2r10g10b10,
    A2b10g10r10,
    Rgb9E5,
    /// PS2 quirk: MSB-set pixels are opaque BGR888, others carry 7-bit alpha.
    Bgr888Abgr7888,
}
