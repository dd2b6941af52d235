//! Listing and deletion of finished recordings.

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::RecordingError;
use crate::repair::is_container_name;
use crate::storage::{join_path, StorageError, StorageProvider};

/// A finished recording as shown to the command layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingEntry {
    /// File name without directory
    pub name: String,
    pub size: u64,
}

/// Container files in `dir`, newest first (by name), at most `max` entries.
///
/// `exclude` names the file currently being written. A missing directory
/// lists as empty.
pub fn list_recordings<S: StorageProvider>(
    storage: &S,
    dir: &str,
    exclude: Option<&str>,
    max: usize,
) -> Result<Vec<RecordingEntry>, StorageError> {
    let entries = match storage.list_directory(dir) {
        Ok(entries) => entries,
        Err(StorageError::NotFound(_)) => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut recordings: Vec<RecordingEntry> = entries
        .into_iter()
        .filter(|e| !e.is_dir && is_container_name(&e.name))
        .filter(|e| exclude != Some(e.name.as_str()))
        .map(|e| RecordingEntry {
            name: e.name,
            size: e.size,
        })
        .collect();

    // Names embed the start time, so descending name order is newest first
    recordings.sort_by(|a, b| b.name.cmp(&a.name));
    recordings.truncate(max);
    Ok(recordings)
}

/// Reject names that could address anything outside the recordings directory.
pub fn validate_name(name: &str) -> Result<(), RecordingError> {
    if name.is_empty() || name.contains("..") || name.contains('/') || name.contains('\\') {
        return Err(RecordingError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Delete the recording `name` from `dir`.
///
/// `active` is the name of the file currently being written, which cannot
/// be deleted.
pub fn delete_recording<S: StorageProvider>(
    storage: &mut S,
    dir: &str,
    name: &str,
    active: Option<&str>,
) -> Result<(), RecordingError> {
    validate_name(name)?;
    if active == Some(name) {
        return Err(RecordingError::InUse(name.to_string()));
    }

    let path = join_path(dir, name);
    if !storage.exists(&path) {
        return Err(RecordingError::NotFound(name.to_string()));
    }
    if !storage.remove(&path) {
        return Err(StorageError::io(path, "cannot remove file").into());
    }
    info!("Deleted recording: {}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn storage_with(names: &[&str]) -> MemoryStorage {
        let mut storage = MemoryStorage::new();
        for (i, name) in names.iter().enumerate() {
            storage.insert_file(&join_path("/recordings", name), vec![0; i + 1]);
        }
        storage
    }

    #[test]
    fn test_list_newest_first() {
        let storage = storage_with(&[
            "REC_2024-01-01_10-00-00.avi",
            "REC_2024-01-02_10-00-00.AVI",
            "notes.txt",
            "REC_2023-12-31_23-59-59.avi",
        ]);
        let list = list_recordings(&storage, "/recordings", None, 50).unwrap();
        let names: Vec<&str> = list.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "REC_2024-01-02_10-00-00.AVI",
                "REC_2024-01-01_10-00-00.avi",
                "REC_2023-12-31_23-59-59.avi",
            ]
        );
        assert_eq!(list[0].size, 2);
    }

    #[test]
    fn test_list_excludes_active_and_caps() {
        let storage = storage_with(&["REC_1.avi", "REC_2.avi", "REC_3.avi"]);
        let list = list_recordings(&storage, "/recordings", Some("REC_3.avi"), 1).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name, "REC_2.avi");
    }

    #[test]
    fn test_list_missing_dir() {
        let storage = MemoryStorage::new();
        assert!(list_recordings(&storage, "/recordings", None, 50)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_delete() {
        let mut storage = storage_with(&["REC_1.avi", "REC_2.avi"]);
        delete_recording(&mut storage, "/recordings", "REC_1.avi", None).unwrap();
        assert!(!storage.exists("/recordings/REC_1.avi"));

        assert_eq!(
            delete_recording(&mut storage, "/recordings", "REC_1.avi", None),
            Err(RecordingError::NotFound("REC_1.avi".to_string()))
        );
        assert_eq!(
            delete_recording(&mut storage, "/recordings", "REC_2.avi", Some("REC_2.avi")),
            Err(RecordingError::InUse("REC_2.avi".to_string()))
        );
    }

    #[test]
    fn test_delete_rejects_traversal() {
        let mut storage = storage_with(&["REC_1.avi"]);
        storage.insert_file("/secret", vec![1]);
        for name in ["../secret", "..", "sub/REC_1.avi", "a\\b", ""] {
            assert_eq!(
                delete_recording(&mut storage, "/recordings", name, None),
                Err(RecordingError::InvalidName(name.to_string()))
            );
        }
        assert!(storage.exists("/secret"));
    }
}
