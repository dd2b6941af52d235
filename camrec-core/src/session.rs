//! Recording session state machine.
//!
//! The session owns the injected collaborators (storage, frame source,
//! clock) and at most one [`ContainerWriter`]. It is driven from the host's
//! poll loop: [`RecordingSession::update`] is called once per tick and
//! returns promptly after at most one capture and one chunk write.
//!
//! ```text
//!          start(fps)
//!   Idle ─────────────▶ Active ──┐ update(): pace, capture, append
//!    ▲                    │  ▲   │
//!    │ stop() / auto-stop │  └───┘
//!    └────────────────────┘
//! ```

use log::{debug, error, info, warn};

use crate::avi::layout::{PatchOffsets, StreamParams};
use crate::avi::writer::{ContainerWriter, FinalizeSummary};
use crate::clock::Clock;
use crate::config::RecorderConfig;
use crate::error::RecordingError;
use crate::source::FrameSource;
use crate::storage::{join_path, StorageProvider};

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
}

/// Why a recording ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `stop()` was called
    Requested,
    /// Maximum duration reached
    MaxDuration,
    /// Free space dropped below the configured minimum
    LowSpace { free: u64 },
    /// A frame could not be written
    WriteFailed,
}

/// What happened to the file when the recording ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Finalized(FinalizeSummary),
    /// No frames: the file was removed
    Deleted,
    /// Finalize failed or was skipped; the repair pass recovers it on next start
    LeftForRepair,
}

/// Summary of a finished recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopSummary {
    pub filename: String,
    pub path: String,
    pub reason: StopReason,
    pub frames: u32,
    pub duration_ms: u64,
    pub disposition: Disposition,
}

/// Result of one [`RecordingSession::update`] tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// No recording active
    Idle,
    /// Frame interval not yet elapsed
    Waiting,
    FrameWritten,
    /// The source returned nothing; retried on the next tick
    CaptureSkipped,
    /// The recording ended on this tick
    Stopped(StopSummary),
}

#[derive(Debug)]
struct ActiveRecording {
    writer: ContainerWriter,
    filename: String,
    fps: u32,
    frame_interval_ms: u64,
    start_ms: u64,
    last_frame_ms: u64,
    width: u32,
    height: u32,
    offsets: PatchOffsets,
}

/// One recording at a time, paced by the caller's tick.
pub struct RecordingSession<S, F, C> {
    storage: S,
    source: F,
    clock: C,
    config: RecorderConfig,
    active: Option<ActiveRecording>,
}

impl<S, F, C> RecordingSession<S, F, C>
where
    S: StorageProvider,
    F: FrameSource,
    C: Clock,
{
    pub fn new(storage: S, source: F, clock: C, config: RecorderConfig) -> Self {
        Self {
            storage,
            source,
            clock,
            config,
            active: None,
        }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn source_mut(&mut self) -> &mut F {
        &mut self.source
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn state(&self) -> SessionState {
        if self.active.is_some() {
            SessionState::Active
        } else {
            SessionState::Idle
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Seconds since start, 0 when idle.
    pub fn elapsed_seconds(&self) -> u32 {
        self.active
            .as_ref()
            .map(|a| (self.clock.now_ms().saturating_sub(a.start_ms) / 1000) as u32)
            .unwrap_or(0)
    }

    /// Frames written so far, 0 when idle.
    pub fn frame_count(&self) -> u32 {
        self.active
            .as_ref()
            .map(|a| a.writer.frame_count())
            .unwrap_or(0)
    }

    /// File name (without directory) of the recording being written.
    pub fn current_filename(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.filename.as_str())
    }

    /// Full storage path of the recording being written.
    pub fn current_path(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.writer.path())
    }

    /// Clamped frame rate of the active recording.
    pub fn fps(&self) -> Option<u32> {
        self.active.as_ref().map(|a| a.fps)
    }

    /// Frame dimensions learned from the first capture.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.active.as_ref().map(|a| (a.width, a.height))
    }

    pub fn patch_offsets(&self) -> Option<PatchOffsets> {
        self.active.as_ref().map(|a| a.offsets)
    }

    /// Start recording at `fps` (clamped to the configured range).
    ///
    /// Captures one frame to learn the dimensions; that frame becomes the
    /// first frame of the file. Any failure leaves the session idle and
    /// removes a partially created file.
    pub fn start(&mut self, fps: u32) -> Result<(), RecordingError> {
        if self.active.is_some() {
            return Err(RecordingError::AlreadyActive);
        }
        if !self.storage.is_available() {
            return Err(RecordingError::StorageUnavailable);
        }
        let free = self.storage.free_bytes();
        if free < self.config.min_free_bytes {
            return Err(RecordingError::InsufficientSpace {
                free,
                required: self.config.min_free_bytes,
            });
        }

        let fps = self.config.clamp_fps(fps);
        let frame = self
            .source
            .capture(self.config.illumination)
            .filter(|f| !f.is_empty())
            .ok_or(RecordingError::CaptureFailed)?;

        let dir = self.config.recordings_dir.clone();
        if !self.storage.exists(&dir) {
            self.storage.create_dir(&dir)?;
        }
        let filename = self.generate_filename(&dir);
        let path = join_path(&dir, &filename);

        let mut writer =
            ContainerWriter::create(&mut self.storage, &path, self.config.index_capacity(fps))?;
        let params = StreamParams {
            bytes_per_second_per_fps: self.config.bytes_per_second_per_fps,
            ..StreamParams::new(frame.width, frame.height, fps)
        };
        let written = writer
            .write_header(&mut self.storage, &params)
            .and_then(|offsets| {
                writer
                    .append_frame(&mut self.storage, &frame.data)
                    .map(|_| offsets)
            });
        let offsets = match written {
            Ok(offsets) => offsets,
            Err(e) => {
                writer.discard(&mut self.storage);
                return Err(e);
            }
        };

        let now = self.clock.now_ms();
        info!(
            "Recording started: {} ({}x{} @ {} fps)",
            path, frame.width, frame.height, fps
        );
        self.active = Some(ActiveRecording {
            writer,
            filename,
            fps,
            frame_interval_ms: self.config.frame_interval_ms(fps),
            start_ms: now,
            last_frame_ms: now,
            width: frame.width,
            height: frame.height,
            offsets,
        });
        Ok(())
    }

    /// `REC_<local time>.avi`, or `REC_<uptime ms>.avi` when the wall clock
    /// is not set, with a counter suffix if the name is taken.
    fn generate_filename(&self, dir: &str) -> String {
        let base_name = match self.clock.local_time() {
            Some(ts) => format!("REC_{}", ts),
            None => format!("REC_{}", self.clock.now_ms()),
        };

        let mut name = format!("{}.avi", base_name);
        let mut counter = 1;
        while self.storage.exists(&join_path(dir, &name)) {
            name = format!("{}_{}.avi", base_name, counter);
            counter += 1;
        }
        name
    }

    /// Advance the session by one tick.
    ///
    /// Order of checks: maximum duration, free space, frame interval.
    pub fn update(&mut self) -> UpdateOutcome {
        let now = self.clock.now_ms();
        let (start_ms, last_frame_ms, frame_interval_ms) = match &self.active {
            Some(a) => (a.start_ms, a.last_frame_ms, a.frame_interval_ms),
            None => return UpdateOutcome::Idle,
        };

        if now.saturating_sub(start_ms) >= self.config.max_duration_ms() {
            info!(
                "Maximum duration of {}s reached",
                self.config.max_duration_seconds
            );
            return UpdateOutcome::Stopped(self.finish(StopReason::MaxDuration));
        }

        let free = self.storage.free_bytes();
        if free < self.config.min_free_bytes {
            warn!(
                "Free space {} below minimum {}, stopping recording",
                free, self.config.min_free_bytes
            );
            return UpdateOutcome::Stopped(self.finish(StopReason::LowSpace { free }));
        }

        if now.saturating_sub(last_frame_ms) < frame_interval_ms {
            return UpdateOutcome::Waiting;
        }

        let illumination = self.config.illumination;
        let Some(active) = self.active.as_mut() else {
            return UpdateOutcome::Idle;
        };
        // Set before capturing so a slow or failed capture doesn't cause a burst
        active.last_frame_ms = now;

        let frame = match self.source.capture(illumination) {
            Some(frame) if !frame.is_empty() => frame,
            _ => {
                warn!("Frame capture failed, retrying next tick");
                return UpdateOutcome::CaptureSkipped;
            }
        };
        if (frame.width, frame.height) != (active.width, active.height) {
            debug!(
                "Frame size {}x{} differs from stream size {}x{}",
                frame.width, frame.height, active.width, active.height
            );
        }

        match active.writer.append_frame(&mut self.storage, &frame.data) {
            Ok(()) => UpdateOutcome::FrameWritten,
            Err(e) => {
                error!("Failed to write frame to {}: {}", active.writer.path(), e);
                UpdateOutcome::Stopped(self.finish(StopReason::WriteFailed))
            }
        }
    }

    /// Stop the active recording and finalize its file.
    pub fn stop(&mut self) -> Result<StopSummary, RecordingError> {
        if self.active.is_none() {
            return Err(RecordingError::NotActive);
        }
        Ok(self.finish(StopReason::Requested))
    }

    fn finish(&mut self, reason: StopReason) -> StopSummary {
        let now = self.clock.now_ms();
        // Callers check `active` first
        let Some(active) = self.active.take() else {
            return StopSummary {
                filename: String::new(),
                path: String::new(),
                reason,
                frames: 0,
                duration_ms: 0,
                disposition: Disposition::LeftForRepair,
            };
        };

        let path = active.writer.path().to_string();
        let frames = active.writer.frame_count();
        let duration_ms = now.saturating_sub(active.start_ms);

        let disposition = if reason == StopReason::WriteFailed {
            active.writer.abandon(&mut self.storage);
            Disposition::LeftForRepair
        } else if frames == 0 {
            active.writer.discard(&mut self.storage);
            Disposition::Deleted
        } else {
            match active.writer.finalize(&mut self.storage) {
                Ok(summary) => Disposition::Finalized(summary),
                Err(e) => {
                    error!("Failed to finalize {}: {}, left for repair", path, e);
                    Disposition::LeftForRepair
                }
            }
        };

        info!(
            "Recording stopped ({:?}): {}, {} frames in {} ms",
            reason, path, frames, duration_ms
        );
        StopSummary {
            filename: active.filename,
            path,
            reason,
            frames,
            duration_ms,
            disposition,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avi::bytes::read_u32_le;
    use crate::avi::inspect::ContainerSummary;
    use crate::clock::{LocalTimestamp, ManualClock};
    use crate::repair::{repair_file, RepairOutcome};
    use crate::source::{CapturedFrame, ScriptedSource};
    use crate::storage::MemoryStorage;

    type TestSession = RecordingSession<MemoryStorage, ScriptedSource, ManualClock>;

    fn frame() -> CapturedFrame {
        CapturedFrame::new(vec![0xFF, 0xD8, 1, 2, 3, 0xFF, 0xD9], 640, 480)
    }

    fn session_with(config: RecorderConfig) -> (TestSession, ManualClock) {
        let clock = ManualClock::with_local_time(LocalTimestamp {
            year: 2024,
            month: 5,
            day: 1,
            hour: 12,
            minute: 30,
            second: 0,
        });
        let session = RecordingSession::new(
            MemoryStorage::new(),
            ScriptedSource::repeating(frame()),
            clock.clone(),
            config,
        );
        (session, clock)
    }

    fn session() -> (TestSession, ManualClock) {
        session_with(RecorderConfig::default())
    }

    #[test]
    fn test_start_writes_header_and_first_frame() {
        let (mut session, _) = session();
        session.start(10).unwrap();

        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.frame_count(), 1);
        assert_eq!(session.dimensions(), Some((640, 480)));
        assert_eq!(session.current_filename(), Some("REC_2024-05-01_12-30-00.avi"));
        assert_eq!(
            session.current_path(),
            Some("/recordings/REC_2024-05-01_12-30-00.avi")
        );
        let data = session
            .storage()
            .file("/recordings/REC_2024-05-01_12-30-00.avi")
            .unwrap();
        assert_eq!(data.len(), 224 + 8 + 8);
    }

    #[test]
    fn test_fps_is_clamped() {
        let (mut session, _) = session();
        session.start(100).unwrap();
        assert_eq!(session.fps(), Some(15));
        session.stop().unwrap();
        session.start(0).unwrap();
        assert_eq!(session.fps(), Some(1));
    }

    #[test]
    fn test_pacing() {
        let (mut session, clock) = session();
        session.start(10).unwrap();

        assert_eq!(session.update(), UpdateOutcome::Waiting);
        clock.advance(99);
        assert_eq!(session.update(), UpdateOutcome::Waiting);
        clock.advance(1);
        assert_eq!(session.update(), UpdateOutcome::FrameWritten);
        assert_eq!(session.update(), UpdateOutcome::Waiting);
        assert_eq!(session.frame_count(), 2);
    }

    #[test]
    fn test_stop_finalizes() {
        let (mut session, clock) = session();
        session.start(10).unwrap();
        for _ in 0..4 {
            clock.advance(100);
            session.update();
        }
        let summary = session.stop().unwrap();

        assert_eq!(summary.frames, 5);
        assert_eq!(summary.reason, StopReason::Requested);
        assert_eq!(summary.duration_ms, 400);
        assert!(matches!(
            summary.disposition,
            Disposition::Finalized(FinalizeSummary { frame_count: 5, indexed_frames: 5, .. })
        ));
        assert!(!session.is_active());
        assert_eq!(session.storage().open_handles(), 0);

        let info = ContainerSummary::read(session.storage_mut(), &summary.path).unwrap();
        assert_eq!(info.frame_count(), 5);
        assert_eq!(info.fps(), 10);
        assert!(info.has_index);
    }

    #[test]
    fn test_auto_stop_at_max_duration() {
        let (mut session, clock) = session_with(RecorderConfig {
            max_duration_seconds: 2,
            ..Default::default()
        });
        session.start(10).unwrap();

        let mut stopped = None;
        for _ in 0..100 {
            clock.advance(100);
            if let UpdateOutcome::Stopped(summary) = session.update() {
                stopped = Some(summary);
                break;
            }
        }
        let summary = stopped.unwrap();
        assert_eq!(summary.reason, StopReason::MaxDuration);
        assert_eq!(summary.frames, 20);
        assert!(matches!(summary.disposition, Disposition::Finalized(_)));
        assert_eq!(session.update(), UpdateOutcome::Idle);
    }

    #[test]
    fn test_refused_on_low_space() {
        let (mut session, _) = session();
        session.storage_mut().set_free_bytes(10 * 1024 * 1024);
        assert!(matches!(
            session.start(10),
            Err(RecordingError::InsufficientSpace { .. })
        ));
        assert!(!session.is_active());
        assert_eq!(session.source_mut().captures(), 0);
    }

    #[test]
    fn test_auto_stop_on_low_space() {
        let (mut session, clock) = session();
        session.start(10).unwrap();
        session.storage_mut().set_free_bytes(1024);
        clock.advance(100);

        match session.update() {
            UpdateOutcome::Stopped(summary) => {
                assert_eq!(summary.reason, StopReason::LowSpace { free: 1024 });
                assert!(matches!(summary.disposition, Disposition::Finalized(_)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_single_session() {
        let (mut session, clock) = session();
        session.start(10).unwrap();
        clock.advance(100);
        session.update();

        assert_eq!(session.start(5), Err(RecordingError::AlreadyActive));
        assert_eq!(session.frame_count(), 2);
        assert_eq!(session.fps(), Some(10));
    }

    #[test]
    fn test_start_failures_leave_idle() {
        let (mut session, _) = session();
        session.storage_mut().set_available(false);
        assert_eq!(session.start(10), Err(RecordingError::StorageUnavailable));

        let mut session = RecordingSession::new(
            MemoryStorage::new(),
            ScriptedSource::failing(),
            ManualClock::new(),
            RecorderConfig::default(),
        );
        assert_eq!(session.start(10), Err(RecordingError::CaptureFailed));
        assert!(!session.is_active());
    }

    #[test]
    fn test_failed_first_frame_removes_file() {
        let (mut session, _) = session();
        session.storage_mut().create_dir("/recordings").unwrap();
        session.storage_mut().set_fail_writes(true);
        assert!(matches!(
            session.start(10),
            Err(RecordingError::Storage(_))
        ));
        assert!(!session.is_active());
        let entries = session.storage().list_directory("/recordings").unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_capture_failure_is_skipped() {
        let (mut session, clock) = session();
        session.start(10).unwrap();
        session.source_mut().push(None);

        clock.advance(100);
        assert_eq!(session.update(), UpdateOutcome::CaptureSkipped);
        assert!(session.is_active());
        clock.advance(50);
        assert_eq!(session.update(), UpdateOutcome::Waiting);
        clock.advance(50);
        assert_eq!(session.update(), UpdateOutcome::FrameWritten);
        assert_eq!(session.frame_count(), 2);
    }

    #[test]
    fn test_write_failure_leaves_file_for_repair() {
        let (mut session, clock) = session();
        session.start(10).unwrap();
        clock.advance(100);
        session.update();
        session.storage_mut().set_fail_writes(true);
        clock.advance(100);

        let summary = match session.update() {
            UpdateOutcome::Stopped(summary) => summary,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(summary.reason, StopReason::WriteFailed);
        assert_eq!(summary.disposition, Disposition::LeftForRepair);
        assert!(!session.is_active());

        session.storage_mut().set_fail_writes(false);
        assert_eq!(
            repair_file(session.storage_mut(), &summary.path),
            Ok(RepairOutcome::Repaired {
                frames: 2,
                dropped_bytes: 0
            })
        );
    }

    #[test]
    fn test_failed_finalize_leaves_file_for_repair() {
        let (mut session, clock) = session();
        session.start(10).unwrap();
        clock.advance(100);
        session.update();
        session.storage_mut().set_fail_reopen(true);

        let summary = session.stop().unwrap();
        assert_eq!(summary.disposition, Disposition::LeftForRepair);
        let data = session.storage().file(&summary.path).unwrap();
        assert_eq!(read_u32_le(data, 48), Some(0));

        session.storage_mut().set_fail_reopen(false);
        // The index written before the failed reopen is ignored by the scan
        assert!(matches!(
            repair_file(session.storage_mut(), &summary.path),
            Ok(RepairOutcome::Repaired { frames: 2, .. })
        ));
    }

    #[test]
    fn test_stop_when_idle() {
        let (mut session, _) = session();
        assert_eq!(session.stop(), Err(RecordingError::NotActive));
        assert_eq!(session.update(), UpdateOutcome::Idle);
    }

    #[test]
    fn test_filename_fallback_and_uniqueness() {
        let (mut session, clock) = session();
        session.start(10).unwrap();
        session.stop().unwrap();
        session.start(10).unwrap();
        assert_eq!(
            session.current_filename(),
            Some("REC_2024-05-01_12-30-00_1.avi")
        );
        session.stop().unwrap();

        clock.set_local_time(None);
        clock.set(123_456);
        session.start(10).unwrap();
        assert_eq!(session.current_filename(), Some("REC_123456.avi"));
    }

    #[test]
    fn test_illumination_is_forwarded() {
        let (mut session, clock) = session_with(RecorderConfig {
            illumination: true,
            ..Default::default()
        });
        session.start(10).unwrap();
        clock.advance(100);
        session.update();
        assert_eq!(session.source_mut().illuminated_captures(), 2);
    }

    #[test]
    fn test_elapsed_seconds() {
        let (mut session, clock) = session();
        assert_eq!(session.elapsed_seconds(), 0);
        session.start(1).unwrap();
        clock.advance(2_500);
        assert_eq!(session.elapsed_seconds(), 2);
    }
}
