//! Error types for the audio host

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Host refused request: {0}")]
    Refused(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wire framing errors
///
/// `Incomplete` is the only non-terminal variant: the caller keeps the
/// bytes it has and waits for the next readiness notification. Every other
/// variant is a protocol violation that closes the connection.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrameError {
    #[error("Incomplete frame: need {needed} more bytes")]
    Incomplete { needed: usize },

    #[error("Header length {0} out of range")]
    BadHeaderLength(usize),

    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    #[error("Payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: u64, max: u64 },

    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),
}

impl FrameError {
    pub fn is_incomplete(&self) -> bool {
        matches!(self, FrameError::Incomplete { .. })
    }
}

/// Audio subsystem errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AudioError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Decode failed: {0}")]
    DecodeFailed(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Clipping: peak {peak:.3} after applying level")]
    Clipping { peak: f32 },

    #[error("Audio worker unavailable")]
    WorkerGone,
}

/// Argument validation errors reported back to the controller
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Device id {id} not available (known ids: {known:?})")]
    DeviceOutOfRange { id: i64, known: Vec<u32> },
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
