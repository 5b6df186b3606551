use thiserror::Error;

// -------------------------------------------------------------------------------------------------

/// Everything a decoder can report to its caller. A decoder returns either a
/// complete image or one of these; partial images are never surfaced.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Bad magic for {0}")]
    BadMagic(&'static str),

    #[error("Unsupported {what} version {version}")]
    UnsupportedVersion { what: &'static str, version: u32 },

    #[error("Invalid image geometry {width}x{height}: {reason}")]
    InvalidGeometry { width: u32, height: u32, reason: &'static str },

    #[error("Pixel format {0:#x} is not valid here")]
    InvalidPixelFormat(u32),

    #[error("Truncated input: needed {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    #[error("Corrupt data: {0}")]
    Corrupt(&'static str),

    #[error("Image buffer allocation failed")]
    AllocationFailed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DecodeResult<T> = Result<T, DecodeError>;

pub type ParseErr<'a> = nom::Err<nom::error::Error<&'a [u8]>>;

impl DecodeError {
    /// Maps a nom failure on header bytes to the corruption category.
    pub fn from_parse(_: ParseErr<'_>) -> Self {
        DecodeError::Corrupt("header parse failed")
    }
}
