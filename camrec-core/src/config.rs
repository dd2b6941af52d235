//! Recorder configuration.
//!
//! All limits the session enforces live here, so the host can load them from
//! a settings file and tests can shrink them.

use serde::{Deserialize, Serialize};

/// Default recordings directory, relative to the storage root
pub const DEFAULT_RECORDINGS_DIR: &str = "/recordings";

/// Stop (or refuse to start) when less than this is free: 50 MiB
pub const DEFAULT_MIN_FREE_BYTES: u64 = 50 * 1024 * 1024;

/// Maximum recording length: 5 minutes
pub const DEFAULT_MAX_DURATION_SECONDS: u32 = 300;

/// Settings for the recording session and the recording store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderConfig {
    /// Directory holding one container per recording
    pub recordings_dir: String,
    /// Auto-stop after this many seconds
    pub max_duration_seconds: u32,
    /// Auto-stop when free space drops below this
    pub min_free_bytes: u64,
    /// Frame rate used when the caller doesn't ask for one
    pub default_fps: u32,
    pub min_fps: u32,
    pub max_fps: u32,
    /// Extra frame index entries beyond `max_duration_seconds * fps`
    pub index_slack_frames: u32,
    /// Maximum number of entries returned when listing recordings
    pub max_listed: usize,
    /// Ask the frame source for illumination on every capture
    pub illumination: bool,
    /// Bytes/second estimate per frame/second, written to the header
    pub bytes_per_second_per_fps: u32,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            recordings_dir: DEFAULT_RECORDINGS_DIR.to_string(),
            max_duration_seconds: DEFAULT_MAX_DURATION_SECONDS,
            min_free_bytes: DEFAULT_MIN_FREE_BYTES,
            default_fps: 10,
            min_fps: 1,
            max_fps: 15,
            index_slack_frames: 32,
            max_listed: 50,
            illumination: false,
            bytes_per_second_per_fps: 15_000,
        }
    }
}

impl RecorderConfig {
    /// Clamp a requested frame rate into `min_fps..=max_fps`.
    pub fn clamp_fps(&self, fps: u32) -> u32 {
        let min = self.min_fps.max(1);
        let max = self.max_fps.max(min);
        fps.clamp(min, max)
    }

    /// Milliseconds between two captures at `fps`.
    pub fn frame_interval_ms(&self, fps: u32) -> u64 {
        1000 / u64::from(self.clamp_fps(fps))
    }

    pub fn max_duration_ms(&self) -> u64 {
        u64::from(self.max_duration_seconds) * 1000
    }

    /// Number of frame index entries to reserve for a recording at `fps`.
    pub fn index_capacity(&self, fps: u32) -> usize {
        let frames = u64::from(self.max_duration_seconds) * u64::from(self.clamp_fps(fps))
            + u64::from(self.index_slack_frames);
        usize::try_from(frames).unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_fps() {
        let config = RecorderConfig::default();
        assert_eq!(config.clamp_fps(0), 1);
        assert_eq!(config.clamp_fps(10), 10);
        assert_eq!(config.clamp_fps(60), 15);
        assert_eq!(config.frame_interval_ms(10), 100);
        assert_eq!(config.frame_interval_ms(0), 1000);
    }

    #[test]
    fn test_index_capacity() {
        let config = RecorderConfig {
            max_duration_seconds: 2,
            index_slack_frames: 5,
            ..Default::default()
        };
        assert_eq!(config.index_capacity(10), 25);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RecorderConfig =
            serde_json::from_str(r#"{"maxDurationSeconds": 60, "illumination": true}"#).unwrap();
        assert_eq!(config.max_duration_seconds, 60);
        assert!(config.illumination);
        assert_eq!(config.max_fps, 15);
        assert_eq!(config.recordings_dir, DEFAULT_RECORDINGS_DIR);
    }
}
