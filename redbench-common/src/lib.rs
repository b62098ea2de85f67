use thiserror::Error;

pub mod encode;
pub mod scan;
pub mod telemetry;

pub use encode::append_command;
pub use scan::{FrameScanner, Scanned};

/// Longest header or simple-string line accepted before a CRLF must appear.
pub const MAX_LINE_LEN: usize = 1 << 20;

/// Largest bulk payload a frame may announce.
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Default limit on how deeply aggregate frames may nest.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Framing errors raised while scanning a stream of frames.
///
/// None of these can be recovered from mid-stream: once framing is lost the
/// remaining bytes of a pipelined connection cannot be attributed to requests.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Unexpected type byte {0:#04x} at start of frame")]
    UnexpectedType(u8),

    #[error("Invalid length in frame header: {0:?}")]
    InvalidLength(String),

    #[error("Frame header exceeds {0} bytes without a CRLF terminator")]
    LineTooLong(usize),

    #[error("Header line is not terminated by CRLF")]
    MalformedLine,

    #[error("Missing CRLF terminator after bulk payload")]
    MissingTerminator,

    #[error("Aggregate nesting exceeds maximum depth of {0}")]
    TooDeep(usize),
}

/// Result type for frame scanning
pub type Result<T> = std::result::Result<T, ProtocolError>;
