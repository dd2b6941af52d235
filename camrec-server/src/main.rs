use std::time::Duration;

use camrec_core::Recorder;
use camrec_server::clock::SystemClock;
use camrec_server::fs_storage::FsStorage;
use camrec_server::recording::{HostRecorder, RecordTask, RecordingManager};
use camrec_server::{open_source, Cli, Command, ServerError, VERSION};
use clap::Parser;
use log::info;
use miette::{IntoDiagnostic, Result};
use tokio_graceful_shutdown::{SubsystemBuilder, Toplevel};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    env_logger::Builder::new()
        .filter_level(args.verbose.log_level_filter())
        .init();

    info!("camrec {} starting", VERSION);

    let root = args.storage_root();
    let settings = args.recorder_config().into_diagnostic()?;
    let storage = FsStorage::new(&root);
    if !root.is_dir() {
        return Err(ServerError::StorageUnavailable(root)).into_diagnostic();
    }

    match args.command {
        Command::Record { source, fps, .. } => {
            let fps = fps.unwrap_or(settings.default_fps);
            let source = open_source(&source).into_diagnostic()?;
            let recorder: HostRecorder =
                Recorder::new(storage, source, SystemClock::new(), settings);
            let task = RecordTask::new(recorder, fps);

            Toplevel::new(|s| async move {
                s.start(SubsystemBuilder::new("Recorder", |a| task.run(a)));
            })
            .catch_signals()
            .handle_shutdown_requests(Duration::from_secs(5))
            .await
            .into_diagnostic()?;
        }
        Command::Repair => {
            let mut manager = RecordingManager::new(storage, settings);
            let report = manager.repair().into_diagnostic()?;
            println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
        }
        Command::List { json } => {
            let mut manager = RecordingManager::new(storage, settings);
            let recordings = manager.list().into_diagnostic()?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&recordings).into_diagnostic()?
                );
            } else {
                for r in &recordings {
                    println!(
                        "{:<32} {:>10} {:>6} frames {:>8.1}s {}x{}@{}{}",
                        r.filename,
                        r.size,
                        r.frame_count,
                        r.duration_ms as f64 / 1000.0,
                        r.width,
                        r.height,
                        r.fps,
                        if r.finalized { "" } else { " (unfinished)" }
                    );
                }
                println!(
                    "{} recordings, {} bytes",
                    recordings.len(),
                    manager.total_storage_used()
                );
            }
        }
        Command::Inspect { name } => {
            let mut manager = RecordingManager::new(storage, settings);
            let summary = manager.inspect(&name).into_diagnostic()?;
            println!("{:#?}", summary);
        }
        Command::Delete { name } => {
            let mut manager = RecordingManager::new(storage, settings);
            manager.delete(&name).into_diagnostic()?;
            println!("Deleted {}", name);
        }
    }
    Ok(())
}
