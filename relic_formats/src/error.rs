use std::io;

use thiserror::Error;

/// Failures raised while decoding container, database and table data.
#[derive(Debug, Error)]
pub enum Error {
    #[error("format error: {0}")]
    Format(String),
    #[error("unsupported pixel depth {0}")]
    UnsupportedPixelDepth(u16),
    #[error("unsupported executable container (bad magic, architecture or version)")]
    UnsupportedContainer,
    #[error("unsupported PEF section kind {0}")]
    UnsupportedSegmentKind(u8),
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),
    #[error("segment index {index} out of range ({count} sections)")]
    SegmentIndexOutOfRange { index: usize, count: usize },
    #[error("corrupt segment: {0}")]
    CorruptSegment(String),
    #[error("unexpected end of stream")]
    UnexpectedEndOfStream,
    #[error("no {kind} with id {id}")]
    MissingResource { kind: &'static str, id: u32 },
    #[error("i/o error: {0}")]
    Io(#[source] io::Error),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Error::UnexpectedEndOfStream
        } else {
            Error::Io(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Shorthand for `Err(Error::Format(..))` with `format!` arguments.
macro_rules! format_err {
    ($($arg:tt)*) => {
        $crate::error::Error::Format(format!($($arg)*))
    };
}

pub(crate) use format_err;
