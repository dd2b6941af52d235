//! Recording file manager.
//!
//! Handles listing with header metadata, inspection, deletion and repair of
//! recordings while no recording task is running.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use camrec_core::catalog::{self, RecordingEntry};
use camrec_core::storage::join_path;
use camrec_core::{
    run_repair_pass, ContainerSummary, RecorderConfig, RecordingError, RepairReport,
    StorageProvider,
};

use crate::fs_storage::FsStorage;

/// Information about a recording file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingInfo {
    /// Filename (without path)
    pub filename: String,
    /// File size in bytes
    pub size: u64,
    pub frame_count: u32,
    pub duration_ms: u64,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// The file carries a frame index
    pub has_index: bool,
    /// Header counts are patched; false means it needs the repair pass
    pub finalized: bool,
}

impl RecordingInfo {
    fn unreadable(entry: RecordingEntry) -> Self {
        Self {
            filename: entry.name,
            size: entry.size,
            frame_count: 0,
            duration_ms: 0,
            width: 0,
            height: 0,
            fps: 0,
            has_index: false,
            finalized: false,
        }
    }

    fn from_summary(entry: RecordingEntry, summary: &ContainerSummary) -> Self {
        Self {
            filename: entry.name,
            size: entry.size,
            frame_count: summary.frame_count(),
            duration_ms: summary.duration_ms(),
            width: summary.width,
            height: summary.height,
            fps: summary.fps(),
            has_index: summary.has_index,
            finalized: summary.is_finalized(),
        }
    }
}

/// Manager for recording files
pub struct RecordingManager {
    storage: FsStorage,
    config: RecorderConfig,
}

impl RecordingManager {
    pub fn new(storage: FsStorage, config: RecorderConfig) -> Self {
        Self { storage, config }
    }

    pub fn storage(&self) -> &FsStorage {
        &self.storage
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    fn path_of(&self, filename: &str) -> Result<String, RecordingError> {
        catalog::validate_name(filename)?;
        Ok(join_path(&self.config.recordings_dir, filename))
    }

    /// All recordings, newest first, with their header metadata.
    pub fn list(&mut self) -> Result<Vec<RecordingInfo>, RecordingError> {
        let entries = catalog::list_recordings(
            &self.storage,
            &self.config.recordings_dir,
            None,
            self.config.max_listed,
        )?;

        let mut recordings = Vec::with_capacity(entries.len());
        for entry in entries {
            let path = join_path(&self.config.recordings_dir, &entry.name);
            let info = match ContainerSummary::read(&mut self.storage, &path) {
                Ok(summary) => RecordingInfo::from_summary(entry, &summary),
                Err(e) => {
                    debug!("Cannot read header of {}: {}", path, e);
                    RecordingInfo::unreadable(entry)
                }
            };
            recordings.push(info);
        }
        Ok(recordings)
    }

    /// Header fields of one recording.
    pub fn inspect(&mut self, filename: &str) -> Result<ContainerSummary, RecordingError> {
        let path = self.path_of(filename)?;
        if !self.storage.exists(&path) {
            return Err(RecordingError::NotFound(filename.to_string()));
        }
        ContainerSummary::read(&mut self.storage, &path)
    }

    pub fn delete(&mut self, filename: &str) -> Result<(), RecordingError> {
        catalog::delete_recording(
            &mut self.storage,
            &self.config.recordings_dir,
            filename,
            None,
        )
    }

    /// Repair every unfinished recording.
    pub fn repair(&mut self) -> Result<RepairReport, RecordingError> {
        if !self.storage.is_available() {
            warn!(
                "Storage root {} is not available",
                self.storage.root().display()
            );
        }
        Ok(run_repair_pass(
            &mut self.storage,
            &self.config.recordings_dir,
        )?)
    }

    /// Total size of all recordings in bytes.
    pub fn total_storage_used(&self) -> u64 {
        catalog::list_recordings(&self.storage, &self.config.recordings_dir, None, usize::MAX)
            .map(|entries| entries.iter().map(|e| e.size).sum())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camrec_core::avi::{ContainerWriter, StreamParams};
    use std::fs;
    use tempfile::TempDir;

    fn create_test_manager() -> (RecordingManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("recordings")).unwrap();
        let manager = RecordingManager::new(
            FsStorage::new(temp_dir.path()),
            RecorderConfig::default(),
        );
        (manager, temp_dir)
    }

    fn write_recording(manager: &mut RecordingManager, name: &str, frames: usize, finalize: bool) {
        let path = join_path("/recordings", name);
        let storage = &mut manager.storage;
        let mut writer = ContainerWriter::create(storage, &path, 64).unwrap();
        writer
            .write_header(storage, &StreamParams::new(640, 480, 5))
            .unwrap();
        for i in 0..frames {
            writer.append_frame(storage, &[i as u8; 101]).unwrap();
        }
        if finalize {
            writer.finalize(storage).unwrap();
        } else {
            writer.abandon(storage);
        }
    }

    #[test]
    fn test_list_empty_directory() {
        let (mut manager, _temp_dir) = create_test_manager();
        assert!(manager.list().unwrap().is_empty());
        assert_eq!(manager.total_storage_used(), 0);
    }

    #[test]
    fn test_list_with_metadata() {
        let (mut manager, temp_dir) = create_test_manager();
        write_recording(&mut manager, "REC_2024-01-01_10-00-00.avi", 10, true);
        write_recording(&mut manager, "REC_2024-01-02_10-00-00.avi", 3, false);
        fs::write(temp_dir.path().join("recordings/notes.txt"), "x").unwrap();

        let list = manager.list().unwrap();
        assert_eq!(list.len(), 2);

        assert_eq!(list[0].filename, "REC_2024-01-02_10-00-00.avi");
        assert!(!list[0].finalized);
        assert_eq!(list[0].frame_count, 0);

        let done = &list[1];
        assert!(done.finalized);
        assert!(done.has_index);
        assert_eq!(done.frame_count, 10);
        assert_eq!((done.width, done.height, done.fps), (640, 480, 5));
        assert_eq!(done.duration_ms, 2_000);
        assert_eq!(
            manager.total_storage_used(),
            list.iter().map(|r| r.size).sum::<u64>()
        );
    }

    #[test]
    fn test_unreadable_file_is_listed() {
        let (mut manager, temp_dir) = create_test_manager();
        fs::write(temp_dir.path().join("recordings/broken.avi"), [0u8; 10]).unwrap();

        let list = manager.list().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].size, 10);
        assert!(!list[0].finalized);
        assert!(manager.inspect("broken.avi").is_err());
    }

    #[test]
    fn test_repair_then_inspect() {
        let (mut manager, _temp_dir) = create_test_manager();
        write_recording(&mut manager, "REC_crashed.avi", 4, false);

        let report = manager.repair().unwrap();
        assert_eq!(report.checked, 1);
        assert_eq!(report.repaired, 1);

        let summary = manager.inspect("REC_crashed.avi").unwrap();
        assert_eq!(summary.frame_count(), 4);
        assert!(summary.is_finalized());
        assert!(!summary.has_index);
    }

    #[test]
    fn test_delete() {
        let (mut manager, temp_dir) = create_test_manager();
        write_recording(&mut manager, "REC_a.avi", 1, true);

        assert_eq!(
            manager.delete("../REC_a.avi"),
            Err(RecordingError::InvalidName("../REC_a.avi".to_string()))
        );
        assert_eq!(
            manager.delete("REC_b.avi"),
            Err(RecordingError::NotFound("REC_b.avi".to_string()))
        );
        manager.delete("REC_a.avi").unwrap();
        assert!(!temp_dir.path().join("recordings/REC_a.avi").exists());
        assert!(matches!(
            manager.inspect("REC_a.avi"),
            Err(RecordingError::NotFound(_))
        ));
    }
}
