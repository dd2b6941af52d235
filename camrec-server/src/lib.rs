//! # Camrec Server
//!
//! Native host for the crash-safe MJPEG recorder.
//!
//! This crate provides the pieces [`camrec_core`] leaves to the platform and
//! the `camrec` command line tool that ties them together:
//! - Stores recordings on a local directory standing in for the SD card
//! - Reads frames from an MJPEG stream (file, FIFO or stdin) on a reader
//!   thread, so a stalled camera never blocks the recording loop
//! - Runs the recording as a graceful-shutdown subsystem, so Ctrl-C
//!   finalizes the file
//! - Repairs, lists, inspects and deletes recordings
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    camrec-server                        │
//! │  ┌─────────────┐  ┌──────────────┐  ┌─────────────────┐ │
//! │  │ camrec CLI  │  │ RecordTask   │  │ RecordingManager│ │
//! │  │ (clap)      │  │ (tokio loop) │  │ (list/inspect)  │ │
//! │  └──────┬──────┘  └──────┬───────┘  └────────┬────────┘ │
//! │         │                │                   │          │
//! │         ▼                ▼                   ▼          │
//! │  ┌─────────────────────────────────────────────────────┐│
//! │  │     camrec_core::Recorder / repair / catalog        ││
//! │  └─────────────────────────────────────────────────────┘│
//! │         │                │                              │
//! │         ▼                ▼                              │
//! │  ┌──────────────┐  ┌───────────────────┐  ┌───────────┐ │
//! │  │ FsStorage    │  │ MjpegStreamSource │  │SystemClock│ │
//! │  └──────────────┘  └───────────────────┘  └───────────┘ │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example: Recording from a file
//!
//! ```rust,no_run
//! use clap::Parser;
//! use camrec_server::{Cli, Command};
//!
//! let args = Cli::parse_from(["camrec", "--root", "/mnt/sdcard", "record", "cam.mjpeg"]);
//! assert!(matches!(args.command, Command::Record { .. }));
//! ```
//!
//! ## Command-Line Interface
//!
//! See [`Cli`] for all available options. Key options:
//!
//! - `--root` - Directory that plays the role of the storage medium
//! - `--config` - Settings file (JSON, camelCase keys)
//! - `-v` - Increase verbosity (use multiple times)

use std::io;
use std::path::PathBuf;

use camrec_core::{FrameSource, RecorderConfig, RecordingError};
use clap::{Parser, Subcommand};
use thiserror::Error;

pub mod capture_thread;
pub mod clock;
pub mod config;
pub mod fs_storage;
pub mod mjpeg;
pub mod recording;

use capture_thread::ThreadedSource;
use mjpeg::MjpegStreamSource;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Clone, Debug)]
#[command(version, about)]
pub struct Cli {
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,

    /// Storage root; recordings are kept in its recordings directory
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Settings file, instead of the one in the user's config directory
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Clone, Debug, PartialEq)]
pub enum Command {
    /// Record from an MJPEG stream until stopped or a limit is reached
    Record {
        /// MJPEG file or FIFO, `-` for stdin
        source: String,

        /// Frames per second (clamped to the configured range)
        #[arg(short, long)]
        fps: Option<u32>,

        /// Stop after this many seconds
        #[arg(short, long)]
        max_duration: Option<u32>,

        /// Ask the camera to switch on its light for each capture
        #[arg(long, default_value_t = false)]
        illumination: bool,
    },
    /// Repair recordings left unfinished by a crash or power loss
    Repair,
    /// List recordings, newest first
    List {
        /// Print JSON instead of a table
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Show the header fields of a recording
    Inspect { name: String },
    /// Delete a recording
    Delete { name: String },
}

impl Cli {
    /// Storage root from the command line or the platform data directory.
    pub fn storage_root(&self) -> PathBuf {
        self.root
            .clone()
            .unwrap_or_else(config::default_storage_root)
    }

    /// Settings with the command line overrides applied.
    pub fn recorder_config(&self) -> Result<RecorderConfig, ServerError> {
        let mut settings = config::load_config(self.config.as_deref())?;
        if let Command::Record {
            max_duration,
            illumination,
            ..
        } = &self.command
        {
            if let Some(seconds) = max_duration {
                settings.max_duration_seconds = *seconds;
            }
            settings.illumination |= *illumination;
        }
        Ok(settings)
    }
}

/// Open the frame source named on the command line.
///
/// The stream is read on its own thread, see [`ThreadedSource`].
pub fn open_source(source: &str) -> Result<Box<dyn FrameSource + Send>, ServerError> {
    let source_error = |e| ServerError::Source {
        path: PathBuf::from(source),
        source: e,
    };
    let threaded = if source == "-" {
        ThreadedSource::spawn("mjpeg-stdin", MjpegStreamSource::new(io::stdin()))
    } else {
        let reader = MjpegStreamSource::from_path(source).map_err(source_error)?;
        ThreadedSource::spawn("mjpeg-reader", reader)
    };
    Ok(Box::new(threaded.map_err(source_error)?))
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid settings file {path}: {message}")]
    Config { path: PathBuf, message: String },
    #[error("Storage root {0} is not available")]
    StorageUnavailable(PathBuf),
    #[error("Cannot open frame source {path}")]
    Source {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Recording(#[from] RecordingError),
    #[error("I/O error")]
    Io(#[from] io::Error),
    #[error("JSON error")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_record() {
        let args = Cli::parse_from(["camrec", "-r", "/tmp/sd", "record", "-", "-f", "5"]);
        assert_eq!(args.storage_root(), PathBuf::from("/tmp/sd"));
        assert_eq!(
            args.command,
            Command::Record {
                source: "-".to_string(),
                fps: Some(5),
                max_duration: None,
                illumination: false,
            }
        );
    }

    #[test]
    fn test_overrides_apply_to_settings() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, r#"{"maxDurationSeconds": 60}"#).unwrap();
        let path = path.to_string_lossy().into_owned();

        let args = Cli::parse_from(["camrec", "-c", &path, "record", "cam.mjpeg"]);
        assert_eq!(args.recorder_config().unwrap().max_duration_seconds, 60);

        let args = Cli::parse_from([
            "camrec",
            "-c",
            &path,
            "record",
            "cam.mjpeg",
            "-m",
            "10",
            "--illumination",
        ]);
        let settings = args.recorder_config().unwrap();
        assert_eq!(settings.max_duration_seconds, 10);
        assert!(settings.illumination);
    }

    #[test]
    fn test_missing_source() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("none.mjpeg");
        assert!(matches!(
            open_source(&missing.to_string_lossy()),
            Err(ServerError::Source { .. })
        ));
    }
}
