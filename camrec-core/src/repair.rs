//! Startup repair of recordings that were never finalized.
//!
//! A recording interrupted by a reset or power loss keeps zero placeholders
//! in its header. For every container in the recordings directory:
//!
//! 1. smaller than the fixed header: deleted
//! 2. header frame count nonzero: already finalized, left alone
//! 3. otherwise the frame chunks are scanned forward; without a single
//!    complete frame the file is deleted, else the four placeholder fields
//!    are patched from the scan. No index chunk is written.
//!
//! A storage error on one file is logged and that file is left untouched;
//! the pass continues with the next one.

use log::{debug, info, warn};
use serde::Serialize;

use crate::avi::layout::{HeaderPatch, PatchOffsets, CHUNK_HEADER_SIZE, DATA_START, HEADER_SIZE};
use crate::avi::scan::{scan_frames, ScanOutcome};
use crate::avi::writer::apply_patch;
use crate::error::FormatError;
use crate::storage::{join_path, FileHandle, OpenMode, StorageError, StorageProvider};

/// Why a file was deleted instead of repaired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Shorter than the fixed header
    TooSmall { size: u64 },
    /// Header present but not a single complete frame
    NoFrames,
}

/// What happened to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairOutcome {
    AlreadyFinalized,
    Repaired {
        frames: u32,
        /// Bytes after the last complete frame (partial chunk, foreign data)
        dropped_bytes: u64,
    },
    Deleted(DiscardReason),
}

/// Totals of one repair pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairReport {
    /// Container files looked at
    pub checked: usize,
    pub finalized: usize,
    pub repaired: usize,
    pub deleted: usize,
    /// Files skipped because of a storage error
    pub failed: usize,
}

impl RepairReport {
    fn record(&mut self, outcome: &RepairOutcome) {
        match outcome {
            RepairOutcome::AlreadyFinalized => self.finalized += 1,
            RepairOutcome::Repaired { .. } => self.repaired += 1,
            RepairOutcome::Deleted(_) => self.deleted += 1,
        }
    }
}

/// Whether `name` looks like a container file (`.avi`, any case).
pub fn is_container_name(name: &str) -> bool {
    name.len() > 4
        && name
            .get(name.len() - 4..)
            .is_some_and(|ext| ext.eq_ignore_ascii_case(".avi"))
}

/// What the read-only inspection of a file decided.
enum Inspection {
    TooSmall(u64),
    Finalized,
    Scanned { file_size: u64, scan: ScanOutcome },
}

fn inspect<S: StorageProvider>(
    storage: &mut S,
    file: &FileHandle,
    offsets: &PatchOffsets,
) -> Result<Inspection, StorageError> {
    let file_size = storage.size(file)?;
    if file_size < HEADER_SIZE as u64 {
        return Ok(Inspection::TooSmall(file_size));
    }
    if storage.read_u32_at(file, offsets.header_frame_count)? != 0 {
        return Ok(Inspection::Finalized);
    }

    let scan = scan_frames(file_size, DATA_START, |offset| {
        let mut header = [0u8; CHUNK_HEADER_SIZE as usize];
        storage.seek(file, offset)?;
        storage.read_exact(file, &mut header)?;
        Ok::<_, StorageError>(header)
    })?;
    Ok(Inspection::Scanned { file_size, scan })
}

fn remove_file<S: StorageProvider>(storage: &mut S, path: &str) -> Result<(), StorageError> {
    if storage.remove(path) {
        Ok(())
    } else {
        Err(StorageError::io(path, "cannot remove file"))
    }
}

/// Check one container file and finalize, repair or delete it.
pub fn repair_file<S: StorageProvider>(
    storage: &mut S,
    path: &str,
) -> Result<RepairOutcome, StorageError> {
    let offsets = PatchOffsets::standard();

    let file = storage.open(path, OpenMode::Read)?;
    let inspection = inspect(storage, &file, &offsets);
    storage.close(file);

    let (file_size, scan) = match inspection? {
        Inspection::TooSmall(size) => {
            remove_file(storage, path)?;
            info!("{}: {} bytes, smaller than a header, deleted", path, size);
            return Ok(RepairOutcome::Deleted(DiscardReason::TooSmall { size }));
        }
        Inspection::Finalized => {
            debug!("{}: already finalized", path);
            return Ok(RepairOutcome::AlreadyFinalized);
        }
        Inspection::Scanned { file_size, scan } => (file_size, scan),
    };

    if scan.frame_count == 0 {
        remove_file(storage, path)?;
        info!("{}: no complete frame ({}), deleted", path, scan.stop);
        return Ok(RepairOutcome::Deleted(DiscardReason::NoFrames));
    }

    let patch = HeaderPatch::compute(&offsets, file_size, scan.end_offset, scan.frame_count)
        .map_err(|e: FormatError| StorageError::io(path, e))?;

    let file = storage.open(path, OpenMode::ReadWrite)?;
    let patched = apply_patch(storage, &file, &offsets, &patch);
    storage.close(file);
    patched?;

    let dropped_bytes = file_size - scan.end_offset;
    info!(
        "{}: repaired, {} frames recovered, scan stopped at {} ({} trailing bytes ignored)",
        path, scan.frame_count, scan.stop, dropped_bytes
    );
    Ok(RepairOutcome::Repaired {
        frames: scan.frame_count,
        dropped_bytes,
    })
}

/// Repair every container in `dir`.
///
/// A missing directory is not an error: there is nothing to repair. An
/// unavailable medium or an unreadable directory is, since the pass did not
/// run and must be retried. Failures on single files are counted instead.
pub fn run_repair_pass<S: StorageProvider>(
    storage: &mut S,
    dir: &str,
) -> Result<RepairReport, StorageError> {
    let mut report = RepairReport::default();

    if !storage.is_available() {
        warn!("Storage not available, skipping repair pass");
        return Err(StorageError::Unavailable);
    }
    let entries = match storage.list_directory(dir) {
        Ok(entries) => entries,
        Err(StorageError::NotFound(_)) => {
            debug!("No recordings directory {}, nothing to repair", dir);
            return Ok(report);
        }
        Err(e) => {
            warn!("Cannot list {}: {}", dir, e);
            return Err(e);
        }
    };

    for entry in entries
        .iter()
        .filter(|e| !e.is_dir && is_container_name(&e.name))
    {
        report.checked += 1;
        let path = join_path(dir, &entry.name);
        match repair_file(storage, &path) {
            Ok(outcome) => report.record(&outcome),
            Err(e) => {
                warn!("{}: left untouched: {}", path, e);
                report.failed += 1;
            }
        }
    }

    info!(
        "Repair pass over {}: {} checked, {} finalized, {} repaired, {} deleted, {} failed",
        dir, report.checked, report.finalized, report.repaired, report.deleted, report.failed
    );
    Ok(report)
}
