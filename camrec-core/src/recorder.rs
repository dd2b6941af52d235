//! Recorder facade for the command layer.
//!
//! Wraps a [`RecordingSession`] with the operations a chat bot or HTTP
//! handler needs: start/stop with boolean results, status, listing and
//! deletion of finished files, and the startup repair pass. The repair pass
//! always completes before the first recording starts.

use log::{info, warn};
use serde::Serialize;

use crate::catalog::{self, RecordingEntry};
use crate::clock::Clock;
use crate::config::RecorderConfig;
use crate::error::RecordingError;
use crate::repair::{self, RepairReport};
use crate::session::{RecordingSession, StopSummary, UpdateOutcome};
use crate::source::FrameSource;
use crate::storage::StorageProvider;

/// Snapshot of the recorder for status replies.
///
/// `elapsed`, `frames` and `filename` are only present while recording.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingStatus {
    pub recording: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frames: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

pub struct Recorder<S, F, C> {
    session: RecordingSession<S, F, C>,
    repaired: bool,
    last_stop: Option<StopSummary>,
}

impl<S, F, C> Recorder<S, F, C>
where
    S: StorageProvider,
    F: FrameSource,
    C: Clock,
{
    pub fn new(storage: S, source: F, clock: C, config: RecorderConfig) -> Self {
        Self {
            session: RecordingSession::new(storage, source, clock, config),
            repaired: false,
            last_stop: None,
        }
    }

    pub fn session(&self) -> &RecordingSession<S, F, C> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut RecordingSession<S, F, C> {
        &mut self.session
    }

    pub fn config(&self) -> &RecorderConfig {
        self.session.config()
    }

    /// Summary of the most recent recording that ended.
    pub fn last_stop(&self) -> Option<&StopSummary> {
        self.last_stop.as_ref()
    }

    /// Repair every unfinished recording.
    ///
    /// `None` while recording or when the pass could not run; the pass is
    /// then retried by the next start.
    pub fn run_repair_pass(&mut self) -> Option<RepairReport> {
        if self.session.is_active() {
            warn!("Repair pass refused while a recording is active");
            return None;
        }
        let dir = self.session.config().recordings_dir.clone();
        match repair::run_repair_pass(self.session.storage_mut(), &dir) {
            Ok(report) => {
                self.repaired = true;
                Some(report)
            }
            Err(e) => {
                warn!("Repair pass did not run: {}", e);
                None
            }
        }
    }

    /// Start recording, with the reason on failure.
    ///
    /// Runs the repair pass first if it has not run yet.
    pub fn try_start(&mut self, fps: u32) -> Result<(), RecordingError> {
        if !self.repaired && !self.session.is_active() {
            self.run_repair_pass();
        }
        self.session.start(fps)
    }

    pub fn start(&mut self, fps: u32) -> bool {
        match self.try_start(fps) {
            Ok(()) => true,
            Err(e) => {
                warn!("Cannot start recording: {}", e);
                false
            }
        }
    }

    /// Stop recording, with the summary of the finished file.
    pub fn try_stop(&mut self) -> Result<StopSummary, RecordingError> {
        let summary = self.session.stop()?;
        self.last_stop = Some(summary.clone());
        Ok(summary)
    }

    pub fn stop(&mut self) -> bool {
        self.try_stop().is_ok()
    }

    /// Drive the session; call once per tick.
    pub fn update(&mut self) -> UpdateOutcome {
        let outcome = self.session.update();
        if let UpdateOutcome::Stopped(summary) = &outcome {
            self.last_stop = Some(summary.clone());
        }
        outcome
    }

    pub fn is_active(&self) -> bool {
        self.session.is_active()
    }

    pub fn elapsed_seconds(&self) -> u32 {
        self.session.elapsed_seconds()
    }

    pub fn frame_count(&self) -> u32 {
        self.session.frame_count()
    }

    /// Name of the file being written, empty when idle.
    pub fn current_filename(&self) -> String {
        self.session
            .current_filename()
            .map(str::to_string)
            .unwrap_or_default()
    }

    pub fn status(&self) -> RecordingStatus {
        if !self.session.is_active() {
            return RecordingStatus::default();
        }
        RecordingStatus {
            recording: true,
            elapsed: Some(self.elapsed_seconds()),
            frames: Some(self.frame_count()),
            filename: Some(self.current_filename()),
        }
    }

    /// Finished recordings, newest first. Empty if storage can't be listed.
    pub fn list_finished_files(&self) -> Vec<RecordingEntry> {
        let config = self.session.config();
        match catalog::list_recordings(
            self.session.storage(),
            &config.recordings_dir,
            self.session.current_filename(),
            config.max_listed,
        ) {
            Ok(list) => list,
            Err(e) => {
                warn!("Cannot list recordings: {}", e);
                Vec::new()
            }
        }
    }

    /// Delete a finished recording, with the reason on failure.
    pub fn try_delete(&mut self, name: &str) -> Result<(), RecordingError> {
        let dir = self.session.config().recordings_dir.clone();
        let active = self.session.current_filename().map(str::to_string);
        catalog::delete_recording(
            self.session.storage_mut(),
            &dir,
            name,
            active.as_deref(),
        )
    }

    pub fn delete(&mut self, name: &str) -> bool {
        match self.try_delete(name) {
            Ok(()) => true,
            Err(e) => {
                info!("Delete of '{}' refused: {}", name, e);
                false
            }
        }
    }
}
