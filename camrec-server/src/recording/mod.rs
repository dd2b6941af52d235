//! Recording on the native host.
//!
//! - [`recorder`]: the recording task, driving a core
//!   [`Recorder`](camrec_core::Recorder) from a tokio interval
//! - [`manager`]: listing, inspection, deletion and repair of finished files
//!
//! ## File Format
//!
//! One RIFF/AVI file per recording, MJPEG video only:
//!
//! ```text
//! ┌──────────────────────────┐
//! │ Header (224 bytes)       │  RIFF, hdrl (avih, strl), LIST movi opening
//! ├──────────────────────────┤
//! │ 00dc chunk, frame 0      │  tag + length + JPEG (+ pad byte)
//! │ 00dc chunk, frame 1      │
//! │ ...                      │
//! ├──────────────────────────┤
//! │ idx1 (clean stop only)   │  tag, key frame flag, offset, length
//! └──────────────────────────┘
//! ```

pub mod manager;
pub mod recorder;

pub use manager::{RecordingInfo, RecordingManager};
pub use recorder::{HostRecorder, RecordTask};
