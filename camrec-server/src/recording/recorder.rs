//! Recording task for the native host.
//!
//! Owns a core [`Recorder`] and drives it from a tokio interval until the
//! recording auto-stops, the source runs dry, or shutdown is requested.

use std::time::{Duration, Instant};

use camrec_core::{
    Clock, Disposition, FrameSource, Recorder, StopReason, StopSummary, StorageProvider,
    UpdateOutcome,
};
use log::{debug, error, info, warn};
use tokio::time::{interval, MissedTickBehavior};
use tokio_graceful_shutdown::SubsystemHandle;

use crate::clock::SystemClock;
use crate::fs_storage::FsStorage;
use crate::ServerError;

/// Recorder with the host's storage, clock and a boxed frame source.
pub type HostRecorder = Recorder<FsStorage, Box<dyn FrameSource + Send>, SystemClock>;

/// Poll period; short compared to the fastest frame interval
const DEFAULT_TICK: Duration = Duration::from_millis(10);

/// Consecutive failed captures after which the source counts as gone
const DEFAULT_MAX_FAILED_CAPTURES: u32 = 50;

const STATUS_INTERVAL: Duration = Duration::from_secs(10);

/// One recording, from start to finalize.
pub struct RecordTask<S, F, C> {
    recorder: Recorder<S, F, C>,
    fps: u32,
    tick: Duration,
    max_failed_captures: u32,
    failed_captures: u32,
}

impl<S, F, C> RecordTask<S, F, C>
where
    S: StorageProvider,
    F: FrameSource,
    C: Clock,
{
    pub fn new(recorder: Recorder<S, F, C>, fps: u32) -> Self {
        Self {
            recorder,
            fps,
            tick: DEFAULT_TICK,
            max_failed_captures: DEFAULT_MAX_FAILED_CAPTURES,
            failed_captures: 0,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn with_max_failed_captures(mut self, max: u32) -> Self {
        self.max_failed_captures = max.max(1);
        self
    }

    pub fn recorder(&self) -> &Recorder<S, F, C> {
        &self.recorder
    }

    /// Start recording (running the repair pass first).
    pub fn start(&mut self) -> Result<(), ServerError> {
        self.recorder.try_start(self.fps)?;
        self.failed_captures = 0;
        Ok(())
    }

    /// One poll of the recorder. Returns the summary once the recording ended.
    pub fn step(&mut self) -> Option<StopSummary> {
        match self.recorder.update() {
            UpdateOutcome::Stopped(summary) => Some(summary),
            UpdateOutcome::CaptureSkipped => {
                self.failed_captures += 1;
                if self.failed_captures < self.max_failed_captures {
                    return None;
                }
                warn!(
                    "{} consecutive captures failed, source is gone",
                    self.failed_captures
                );
                self.stop()
            }
            UpdateOutcome::FrameWritten => {
                self.failed_captures = 0;
                None
            }
            UpdateOutcome::Waiting => None,
            UpdateOutcome::Idle => self.recorder.last_stop().cloned(),
        }
    }

    /// Stop the recording, if it is still active.
    pub fn stop(&mut self) -> Option<StopSummary> {
        if self.recorder.is_active() {
            self.recorder.try_stop().ok()
        } else {
            self.recorder.last_stop().cloned()
        }
    }

    fn log_status(&self) {
        match serde_json::to_string(&self.recorder.status()) {
            Ok(status) => info!("Recording status: {}", status),
            Err(e) => debug!("Cannot serialize status: {}", e),
        }
    }
}

impl<S, F, C> RecordTask<S, F, C>
where
    S: StorageProvider + Send,
    F: FrameSource + Send,
    C: Clock + Send,
{
    /// Run the recording as a subsystem.
    ///
    /// Requests a global shutdown when the recording ends on its own, so
    /// the binary exits after an auto-stop.
    pub async fn run(mut self, subsys: SubsystemHandle) -> Result<(), ServerError> {
        self.start()?;
        info!(
            "Recorder: writing {}",
            self.recorder.session().current_path().unwrap_or_default()
        );

        let mut poll_timer = interval(self.tick);
        poll_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_status = Instant::now();

        let summary = loop {
            tokio::select! {
                _ = subsys.on_shutdown_requested() => {
                    info!("Recorder: Shutdown requested");
                    break self.stop();
                }
                _ = poll_timer.tick() => {
                    if let Some(summary) = self.step() {
                        subsys.request_shutdown();
                        break Some(summary);
                    }
                    if last_status.elapsed() >= STATUS_INTERVAL {
                        self.log_status();
                        last_status = Instant::now();
                    }
                }
            }
        };

        if let Some(summary) = summary {
            report(&summary);
        }
        info!("Recorder: task finished");
        Ok(())
    }
}

fn report(summary: &StopSummary) {
    let reason = match summary.reason {
        StopReason::Requested => "stopped".to_string(),
        StopReason::MaxDuration => "maximum duration reached".to_string(),
        StopReason::LowSpace { free } => format!("low space ({} bytes free)", free),
        StopReason::WriteFailed => "write failed".to_string(),
    };
    match summary.disposition {
        Disposition::Finalized(f) => info!(
            "{} ({}): {} frames, {} indexed, {} bytes, {:.1}s",
            summary.filename,
            reason,
            f.frame_count,
            f.indexed_frames,
            f.file_size,
            summary.duration_ms as f64 / 1000.0
        ),
        Disposition::Deleted => warn!("{} ({}): no frames, deleted", summary.filename, reason),
        Disposition::LeftForRepair => error!(
            "{} ({}): not finalized, will be repaired on next start",
            summary.filename, reason
        ),
    }
}
