//! In-memory storage provider.
//!
//! Used by tests and tooling to run the writer, session and repair logic
//! without a filesystem. Supports a few fault switches so crash and
//! write-failure paths can be exercised.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::{DirEntry, FileHandle, OpenMode, StorageError, StorageProvider};

#[derive(Debug)]
struct OpenFile {
    path: String,
    position: u64,
    mode: OpenMode,
}

/// Storage provider backed by a map of path to bytes.
#[derive(Debug)]
pub struct MemoryStorage {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    open_files: HashMap<i32, OpenFile>,
    next_handle: i32,
    free_bytes: u64,
    available: bool,
    fail_writes: bool,
    fail_reopen: bool,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(i) => &path[..i],
    }
}

fn normalize_dir(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

impl MemoryStorage {
    /// Empty, available storage with 1 GiB reported free.
    pub fn new() -> Self {
        let mut dirs = BTreeSet::new();
        dirs.insert("/".to_string());
        Self {
            files: BTreeMap::new(),
            dirs,
            open_files: HashMap::new(),
            next_handle: 1,
            free_bytes: 1 << 30,
            available: true,
            fail_writes: false,
            fail_reopen: false,
        }
    }

    /// Put a file (and its parent directories) directly into storage.
    pub fn insert_file(&mut self, path: &str, data: Vec<u8>) {
        let mut dir = parent_of(path).to_string();
        while dir != "/" {
            self.dirs.insert(dir.clone());
            dir = parent_of(&dir).to_string();
        }
        self.files.insert(path.to_string(), data);
    }

    /// Contents of a file, if present.
    pub fn file(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(|v| v.as_slice())
    }

    /// Truncate a stored file, simulating a write that never reached the medium.
    pub fn truncate(&mut self, path: &str, len: usize) {
        if let Some(data) = self.files.get_mut(path) {
            data.truncate(len);
        }
    }

    pub fn set_free_bytes(&mut self, free: u64) {
        self.free_bytes = free;
    }

    pub fn set_available(&mut self, available: bool) {
        self.available = available;
    }

    /// Make every subsequent write fail.
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Make opening an existing file for in-place update fail.
    pub fn set_fail_reopen(&mut self, fail: bool) {
        self.fail_reopen = fail;
    }

    /// Number of handles not yet closed.
    pub fn open_handles(&self) -> usize {
        self.open_files.len()
    }

    fn alloc_handle(&mut self) -> i32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn open_file(&self, file: &FileHandle) -> Result<&OpenFile, StorageError> {
        self.open_files
            .get(&file.0)
            .ok_or(StorageError::InvalidHandle(file.0))
    }
}

impl StorageProvider for MemoryStorage {
    fn is_available(&self) -> bool {
        self.available
    }

    fn open(&mut self, path: &str, mode: OpenMode) -> Result<FileHandle, StorageError> {
        if !self.available {
            return Err(StorageError::Unavailable);
        }
        match mode {
            OpenMode::Create => {
                if !self.dirs.contains(parent_of(path)) {
                    return Err(StorageError::NotFound(parent_of(path).to_string()));
                }
                self.files.insert(path.to_string(), Vec::new());
            }
            OpenMode::Read | OpenMode::ReadWrite => {
                if !self.files.contains_key(path) {
                    return Err(StorageError::NotFound(path.to_string()));
                }
                if mode == OpenMode::ReadWrite && self.fail_reopen {
                    return Err(StorageError::io(path, "simulated reopen failure"));
                }
            }
        }

        let handle = self.alloc_handle();
        self.open_files.insert(
            handle,
            OpenFile {
                path: path.to_string(),
                position: 0,
                mode,
            },
        );
        Ok(FileHandle(handle))
    }

    fn write(&mut self, file: &FileHandle, data: &[u8]) -> Result<usize, StorageError> {
        let (path, position, mode) = {
            let open = self.open_file(file)?;
            (open.path.clone(), open.position as usize, open.mode)
        };
        if mode == OpenMode::Read {
            return Err(StorageError::io(path, "file opened read-only"));
        }
        if self.fail_writes {
            return Err(StorageError::io(path, "simulated write failure"));
        }

        let contents = self
            .files
            .get_mut(&path)
            .ok_or_else(|| StorageError::NotFound(path.clone()))?;
        let end = position + data.len();
        if contents.len() < end {
            contents.resize(end, 0);
        }
        contents[position..end].copy_from_slice(data);

        if let Some(open) = self.open_files.get_mut(&file.0) {
            open.position = end as u64;
        }
        Ok(data.len())
    }

    fn seek(&mut self, file: &FileHandle, offset: u64) -> Result<(), StorageError> {
        let open = self
            .open_files
            .get_mut(&file.0)
            .ok_or(StorageError::InvalidHandle(file.0))?;
        open.position = offset;
        Ok(())
    }

    fn read(&mut self, file: &FileHandle, buf: &mut [u8]) -> Result<usize, StorageError> {
        let (path, position) = {
            let open = self.open_file(file)?;
            (open.path.clone(), open.position as usize)
        };
        let contents = self
            .files
            .get(&path)
            .ok_or_else(|| StorageError::NotFound(path.clone()))?;
        if position >= contents.len() {
            return Ok(0);
        }
        let n = buf.len().min(contents.len() - position);
        buf[..n].copy_from_slice(&contents[position..position + n]);

        if let Some(open) = self.open_files.get_mut(&file.0) {
            open.position += n as u64;
        }
        Ok(n)
    }

    fn size(&mut self, file: &FileHandle) -> Result<u64, StorageError> {
        let path = self.open_file(file)?.path.clone();
        self.files
            .get(&path)
            .map(|c| c.len() as u64)
            .ok_or(StorageError::NotFound(path))
    }

    fn close(&mut self, file: FileHandle) {
        self.open_files.remove(&file.0);
    }

    fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path) || self.dirs.contains(&normalize_dir(path))
    }

    fn remove(&mut self, path: &str) -> bool {
        self.files.remove(path).is_some()
    }

    fn create_dir(&mut self, path: &str) -> Result<(), StorageError> {
        if !self.available {
            return Err(StorageError::Unavailable);
        }
        let mut dir = normalize_dir(path);
        while dir != "/" {
            self.dirs.insert(dir.clone());
            dir = parent_of(&dir).to_string();
        }
        Ok(())
    }

    fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>, StorageError> {
        if !self.available {
            return Err(StorageError::Unavailable);
        }
        let dir = normalize_dir(path);
        if !self.dirs.contains(&dir) {
            return Err(StorageError::NotFound(dir));
        }

        let files = self
            .files
            .iter()
            .filter(|(p, _)| parent_of(p) == dir)
            .map(|(p, data)| DirEntry {
                name: super::file_name(p).to_string(),
                size: data.len() as u64,
                is_dir: false,
            });
        let subdirs = self
            .dirs
            .iter()
            .filter(|d| d.as_str() != "/" && parent_of(d) == dir)
            .map(|d| DirEntry {
                name: super::file_name(d).to_string(),
                size: 0,
                is_dir: true,
            });
        Ok(files.chain(subdirs).collect())
    }

    fn free_bytes(&self) -> u64 {
        if self.available {
            self.free_bytes
        } else {
            0
        }
    }
}
