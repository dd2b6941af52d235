//! Error types for container writing and recording control

use thiserror::Error;

use crate::storage::StorageError;

/// Errors in the binary layout of a container
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// File is too short to contain the fixed header
    #[error("Header too short: expected at least {expected} bytes, got {actual}")]
    HeaderTooShort { expected: usize, actual: usize },

    /// A fourcc tag doesn't match the fixed layout
    #[error("Invalid tag at offset {offset}: expected {expected:?}, got {actual:?}")]
    InvalidTag {
        offset: u64,
        expected: String,
        actual: String,
    },

    /// A value doesn't fit the 32-bit field it has to be stored in
    #[error("Value {value} too large for field '{field}'")]
    TooLarge { field: &'static str, value: u64 },

    /// Frame dimensions the header cannot describe
    #[error("Invalid frame dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    /// Frame appended or container finalized before the header was written
    #[error("Container header has not been written")]
    HeaderNotWritten,

    /// Header written twice
    #[error("Container header already written")]
    HeaderAlreadyWritten,

    /// Finalize called on a container without frames
    #[error("Container has no frames")]
    EmptyContainer,
}

/// Errors surfaced by the recording session and the recorder facade
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordingError {
    #[error("Storage is not available")]
    StorageUnavailable,
    #[error("A recording is already active")]
    AlreadyActive,
    #[error("No recording is active")]
    NotActive,
    #[error("Cannot capture a frame from the source")]
    CaptureFailed,
    #[error("Insufficient free space: {free} bytes free, {required} required")]
    InsufficientSpace { free: u64, required: u64 },
    #[error("Invalid recording name '{0}'")]
    InvalidName(String),
    #[error("Recording '{0}' not found")]
    NotFound(String),
    #[error("Recording '{0}' is in use")]
    InUse(String),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Container format error: {0}")]
    Format(#[from] FormatError),
}
