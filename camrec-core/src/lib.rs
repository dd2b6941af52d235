//! # Camrec Core
//!
//! Platform-independent crash-safe MJPEG recorder.
//!
//! This crate contains the container layout, writer, session state machine
//! and repair logic with **zero I/O dependencies**. It never touches a file
//! system or a camera itself.
//!
//! ## Architecture
//!
//! `camrec-core` is the shared foundation for any host that can provide
//! block storage and a frame source, e.g. `camrec-server` on a desktop or a
//! firmware build on a camera board. Platform specifics are abstracted
//! through three traits:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  camrec-core (platform-independent, no tokio/fs deps)        │
//! │  ├── avi/      (header layout, writer, scanner, inspection)  │
//! │  ├── session   (Idle/Active state machine, pacing)           │
//! │  ├── repair    (startup recovery of unfinished files)        │
//! │  ├── catalog   (listing and deletion)                        │
//! │  ├── recorder  (facade for the command layer)                │
//! │  └── StorageProvider / FrameSource / Clock                   │
//! └──────────────────────────────────────────────────────────────┘
//!                 ▲
//!    ┌────────────┴────────────────────────────┐
//!    │  camrec-server                          │
//!    │  (FsStorage, MjpegStreamSource,         │
//!    │   SystemClock, camrec binary)           │
//!    └─────────────────────────────────────────┘
//! ```
//!
//! ## Crash safety
//!
//! Total size and frame count are only known when a recording ends, but the
//! container stores them near the start of the file. They are written as
//! zero placeholders and patched on finalize, after closing and reopening
//! the file. A recording cut short by a reset keeps its zeros; the
//! [`repair`] pass finds those files on the next start, counts the complete
//! frame chunks and patches the same fields.
//!
//! ## Example: Record and finalize
//!
//! ```rust
//! use camrec_core::{
//!     CapturedFrame, ManualClock, MemoryStorage, Recorder, RecorderConfig, ScriptedSource,
//! };
//!
//! let frame = CapturedFrame::new(vec![0xFF, 0xD8, 0xFF, 0xD9], 320, 240);
//! let clock = ManualClock::new();
//! let mut recorder = Recorder::new(
//!     MemoryStorage::new(),
//!     ScriptedSource::repeating(frame),
//!     clock.clone(),
//!     RecorderConfig::default(),
//! );
//!
//! assert!(recorder.start(10));
//! for _ in 0..9 {
//!     clock.advance(100);
//!     recorder.update();
//! }
//! assert_eq!(recorder.frame_count(), 10);
//! assert!(recorder.stop());
//! assert_eq!(recorder.list_finished_files().len(), 1);
//! ```

pub mod avi;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod error;
pub mod recorder;
pub mod repair;
pub mod session;
pub mod source;
pub mod storage;

// Re-export commonly used types
pub use avi::{ContainerSummary, ContainerWriter, FinalizeSummary, PatchOffsets, StreamParams};
pub use catalog::RecordingEntry;
pub use clock::{Clock, LocalTimestamp, ManualClock};
pub use config::RecorderConfig;
pub use error::{FormatError, RecordingError};
pub use recorder::{Recorder, RecordingStatus};
pub use repair::{repair_file, run_repair_pass, RepairOutcome, RepairReport};
pub use session::{Disposition, RecordingSession, StopReason, StopSummary, UpdateOutcome};
pub use source::{CapturedFrame, FrameSource, ScriptedSource};
pub use storage::{FileHandle, MemoryStorage, OpenMode, StorageError, StorageProvider};
