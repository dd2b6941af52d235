//! File system implementation of StorageProvider for the native host.
//!
//! This module provides `FsStorage` which implements
//! `camrec_core::storage::StorageProvider` on top of `std::fs`, rooted at a
//! directory that plays the role of the mounted medium.
//!
//! Storage paths (`/recordings/REC_….avi`) are resolved relative to the
//! root; paths with `..` components are rejected.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};

use camrec_core::storage::{DirEntry, FileHandle, OpenMode, StorageError, StorageProvider};
use log::{debug, warn};

/// Internal state for an open file
struct OpenFile {
    file: File,
    path: String,
}

/// `std::fs` implementation of StorageProvider.
///
/// # Usage
///
/// ```rust,no_run
/// use camrec_core::{run_repair_pass, RecorderConfig};
/// use camrec_server::fs_storage::FsStorage;
///
/// let mut storage = FsStorage::new("/mnt/sdcard");
/// if let Ok(report) = run_repair_pass(&mut storage, &RecorderConfig::default().recordings_dir) {
///     println!("{} repaired", report.repaired);
/// }
/// ```
pub struct FsStorage {
    root: PathBuf,
    /// Next file handle ID
    next_handle: i32,
    /// Open files by handle
    files: HashMap<i32, OpenFile>,
}

impl FsStorage {
    /// Create a provider rooted at `root`. The directory is not created.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            next_handle: 1,
            files: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a storage path.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(StorageError::io(path, "path escapes the storage root"));
        }
        Ok(self.root.join(relative))
    }

    fn alloc_handle(&mut self) -> i32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn open_file(&mut self, file: &FileHandle) -> Result<&mut OpenFile, StorageError> {
        self.files
            .get_mut(&file.0)
            .ok_or(StorageError::InvalidHandle(file.0))
    }
}

fn map_io_error(path: &str, e: std::io::Error) -> StorageError {
    match e.kind() {
        ErrorKind::NotFound => StorageError::NotFound(path.to_string()),
        _ => StorageError::io(path, e),
    }
}

/// Bytes available to unprivileged users on the file system holding `path`.
#[cfg(unix)]
fn available_space(path: &Path) -> Option<u64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes()).ok()?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let ret = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if ret != 0 {
        return None;
    }
    #[allow(clippy::unnecessary_cast)]
    Some((stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64))
}

#[cfg(not(unix))]
fn available_space(_path: &Path) -> Option<u64> {
    Some(u64::MAX)
}

impl StorageProvider for FsStorage {
    fn is_available(&self) -> bool {
        self.root.is_dir()
    }

    fn open(&mut self, path: &str, mode: OpenMode) -> Result<FileHandle, StorageError> {
        if !self.is_available() {
            return Err(StorageError::Unavailable);
        }
        let full_path = self.resolve(path)?;
        let file = match mode {
            OpenMode::Create => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(&full_path),
            OpenMode::Read => File::open(&full_path),
            OpenMode::ReadWrite => OpenOptions::new().read(true).write(true).open(&full_path),
        }
        .map_err(|e| map_io_error(path, e))?;

        let handle = self.alloc_handle();
        debug!("Opened {} ({:?}) as handle {}", full_path.display(), mode, handle);
        self.files.insert(
            handle,
            OpenFile {
                file,
                path: path.to_string(),
            },
        );
        Ok(FileHandle(handle))
    }

    fn write(&mut self, file: &FileHandle, data: &[u8]) -> Result<usize, StorageError> {
        let open = self.open_file(file)?;
        open.file
            .write_all(data)
            .map_err(|e| StorageError::io(open.path.clone(), e))?;
        Ok(data.len())
    }

    fn seek(&mut self, file: &FileHandle, offset: u64) -> Result<(), StorageError> {
        let open = self.open_file(file)?;
        open.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| StorageError::io(open.path.clone(), e))?;
        Ok(())
    }

    fn read(&mut self, file: &FileHandle, buf: &mut [u8]) -> Result<usize, StorageError> {
        let open = self.open_file(file)?;
        loop {
            match open.file.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(StorageError::io(open.path.clone(), e)),
            }
        }
    }

    fn size(&mut self, file: &FileHandle) -> Result<u64, StorageError> {
        let open = self.open_file(file)?;
        open.file
            .metadata()
            .map(|m| m.len())
            .map_err(|e| StorageError::io(open.path.clone(), e))
    }

    fn flush(&mut self, file: &FileHandle) -> Result<(), StorageError> {
        let open = self.open_file(file)?;
        open.file
            .flush()
            .and_then(|_| open.file.sync_data())
            .map_err(|e| StorageError::io(open.path.clone(), e))
    }

    fn close(&mut self, file: FileHandle) {
        if self.files.remove(&file.0).is_none() {
            debug!("Close of unknown handle {}", file.0);
        }
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.exists()).unwrap_or(false)
    }

    fn remove(&mut self, path: &str) -> bool {
        let Ok(full_path) = self.resolve(path) else {
            return false;
        };
        match fs::remove_file(&full_path) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to remove {}: {}", full_path.display(), e);
                false
            }
        }
    }

    fn create_dir(&mut self, path: &str) -> Result<(), StorageError> {
        if !self.is_available() {
            return Err(StorageError::Unavailable);
        }
        let full_path = self.resolve(path)?;
        fs::create_dir_all(&full_path).map_err(|e| map_io_error(path, e))
    }

    fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>, StorageError> {
        if !self.is_available() {
            return Err(StorageError::Unavailable);
        }
        let full_path = self.resolve(path)?;
        let entries = fs::read_dir(&full_path).map_err(|e| map_io_error(path, e))?;

        let mut result = Vec::new();
        for entry in entries.flatten() {
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            result.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: if metadata.is_dir() { 0 } else { metadata.len() },
                is_dir: metadata.is_dir(),
            });
        }
        Ok(result)
    }

    fn free_bytes(&self) -> u64 {
        if !self.is_available() {
            return 0;
        }
        available_space(&self.root).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_storage() -> (FsStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        (FsStorage::new(temp_dir.path()), temp_dir)
    }

    #[test]
    fn test_write_patch_read() {
        let (mut storage, temp_dir) = create_test_storage();
        storage.create_dir("/recordings").unwrap();

        let file = storage.open("/recordings/a.avi", OpenMode::Create).unwrap();
        storage.write_all(&file, &[0u8; 16]).unwrap();
        storage.flush(&file).unwrap();
        storage.close(file);

        let file = storage.open("/recordings/a.avi", OpenMode::ReadWrite).unwrap();
        storage.write_u32_at(&file, 4, 0x0102_0304).unwrap();
        assert_eq!(storage.read_u32_at(&file, 4).unwrap(), 0x0102_0304);
        assert_eq!(storage.size(&file).unwrap(), 16);
        storage.close(file);

        let data = fs::read(temp_dir.path().join("recordings/a.avi")).unwrap();
        assert_eq!(&data[4..8], &[4, 3, 2, 1]);
        assert_eq!(data.len(), 16);
    }

    #[test]
    fn test_open_missing() {
        let (mut storage, _temp_dir) = create_test_storage();
        assert_eq!(
            storage.open("/nope.avi", OpenMode::Read),
            Err(StorageError::NotFound("/nope.avi".to_string()))
        );
        assert!(matches!(
            storage.open("/recordings/new.avi", OpenMode::Create),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn test_list_and_remove() {
        let (mut storage, temp_dir) = create_test_storage();
        fs::create_dir_all(temp_dir.path().join("recordings/sub")).unwrap();
        fs::write(temp_dir.path().join("recordings/a.avi"), [1, 2, 3]).unwrap();

        let mut entries = storage.list_directory("/recordings").unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(
            entries,
            vec![
                DirEntry {
                    name: "a.avi".to_string(),
                    size: 3,
                    is_dir: false
                },
                DirEntry {
                    name: "sub".to_string(),
                    size: 0,
                    is_dir: true
                },
            ]
        );

        assert!(storage.exists("/recordings/a.avi"));
        assert!(storage.remove("/recordings/a.avi"));
        assert!(!storage.remove("/recordings/a.avi"));
        assert!(!storage.exists("/recordings/a.avi"));
    }

    #[test]
    fn test_rejects_escaping_paths() {
        let (mut storage, _temp_dir) = create_test_storage();
        assert!(storage.resolve("/../etc/passwd").is_err());
        assert!(!storage.exists("/../etc/passwd"));
        assert!(storage.open("/a/../../b", OpenMode::Create).is_err());
    }

    #[test]
    fn test_unavailable_root() {
        let temp_dir = TempDir::new().unwrap();
        let mut storage = FsStorage::new(temp_dir.path().join("not-mounted"));
        assert!(!storage.is_available());
        assert_eq!(storage.free_bytes(), 0);
        assert_eq!(
            storage.open("/a.avi", OpenMode::Create),
            Err(StorageError::Unavailable)
        );
    }

    #[test]
    fn test_free_bytes() {
        let (storage, _temp_dir) = create_test_storage();
        assert!(storage.free_bytes() > 0);
    }

    #[test]
    fn test_invalid_handle() {
        let (mut storage, _temp_dir) = create_test_storage();
        assert_eq!(
            storage.write(&FileHandle(42), &[1]),
            Err(StorageError::InvalidHandle(42))
        );
        storage.close(FileHandle(42));
    }
}
