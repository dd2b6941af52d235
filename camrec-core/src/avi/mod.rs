//! RIFF/AVI container for single-stream MJPEG recordings.
//!
//! - [`layout`]: fixed 224-byte header and the placeholder offsets
//! - [`writer`]: incremental writer with two-phase finalize
//! - [`scan`]: forward chunk scanner used by repair
//! - [`inspect`]: read back header fields of an existing container

pub mod bytes;
pub mod inspect;
pub mod layout;
pub mod scan;
pub mod writer;

pub use inspect::ContainerSummary;
pub use layout::{build_header, HeaderPatch, PatchOffsets, StreamParams, DATA_START, HEADER_SIZE};
pub use scan::{scan_buffer, scan_frames, ScanOutcome, ScanStop};
pub use writer::{apply_patch, ContainerWriter, FinalizeSummary, FrameIndexEntry};
