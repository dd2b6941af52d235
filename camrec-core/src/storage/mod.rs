//! Storage abstraction for platform-independent recording code.
//!
//! This module defines the trait that abstracts the block storage a recording
//! is written to, allowing the same writer, session and repair logic to run
//! against a real filesystem, an SD card driver, or an in-memory fake.
//!
//! # Design
//!
//! The trait uses opaque **handles** (not `std::fs::File`) because:
//! - Embedded flash layers hand out file descriptors, not Rust objects
//! - A handle can outlive a borrow of the provider, so a writer can keep its
//!   file open while the session keeps ownership of the provider
//!
//! Paths are `/`-separated strings relative to the storage root, e.g.
//! `/recordings/REC_2024-01-01_12-00-00.avi`.
//!
//! # Example
//!
//! ```rust
//! use camrec_core::storage::{MemoryStorage, OpenMode, StorageProvider};
//!
//! let mut storage = MemoryStorage::new();
//! let file = storage.open("/clip.avi", OpenMode::Create).unwrap();
//! storage.write_all(&file, b"RIFF").unwrap();
//! storage.close(file);
//! assert!(storage.exists("/clip.avi"));
//! ```

use thiserror::Error;

mod memory;

pub use memory::MemoryStorage;

// =============================================================================
// Error Types
// =============================================================================

/// Errors reported by a storage provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The medium is not mounted or not initialized
    #[error("Storage is not available")]
    Unavailable,
    /// Path doesn't exist
    #[error("File not found: {0}")]
    NotFound(String),
    /// Handle was never opened or has been closed
    #[error("Invalid file handle {0}")]
    InvalidHandle(i32),
    /// Fewer bytes written than requested
    #[error("Short write: expected {expected} bytes, wrote {written}")]
    ShortWrite { expected: usize, written: usize },
    /// End of file reached before the requested bytes were read
    #[error("Unexpected end of file: expected {expected} bytes, read {read}")]
    UnexpectedEof { expected: usize, read: usize },
    /// Any other failure, with the platform's message
    #[error("I/O error on '{path}': {message}")]
    Io { path: String, message: String },
}

impl StorageError {
    pub fn io(path: impl Into<String>, message: impl ToString) -> Self {
        StorageError::Io {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

// =============================================================================
// Handle & Entry Types
// =============================================================================

/// Opaque handle to an open file.
///
/// The actual file object lives inside the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle(pub i32);

/// How a file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Create (or truncate) for writing, positioned at 0
    Create,
    /// Existing file, read only
    Read,
    /// Existing file, read and overwrite in place without truncating
    ReadWrite,
}

/// One entry returned by [`StorageProvider::list_directory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Name without the directory part
    pub name: String,
    /// Size in bytes (0 for directories)
    pub size: u64,
    pub is_dir: bool,
}

// =============================================================================
// StorageProvider Trait
// =============================================================================

/// Platform-independent storage provider.
///
/// All operations are synchronous and assumed bounded; there is no timeout
/// handling at this level.
pub trait StorageProvider {
    /// Whether the medium is mounted and usable.
    fn is_available(&self) -> bool;

    /// Open a file.
    fn open(&mut self, path: &str, mode: OpenMode) -> Result<FileHandle, StorageError>;

    /// Write at the current position, returning the number of bytes written.
    fn write(&mut self, file: &FileHandle, data: &[u8]) -> Result<usize, StorageError>;

    /// Move the position to an absolute byte offset.
    fn seek(&mut self, file: &FileHandle, offset: u64) -> Result<(), StorageError>;

    /// Read at the current position, returning the number of bytes read (0 at end of file).
    fn read(&mut self, file: &FileHandle, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Current size of an open file.
    fn size(&mut self, file: &FileHandle) -> Result<u64, StorageError>;

    /// Push buffered data to the medium.
    ///
    /// Default implementation does nothing (unbuffered providers).
    fn flush(&mut self, _file: &FileHandle) -> Result<(), StorageError> {
        Ok(())
    }

    /// Close a file. Unknown handles are ignored.
    fn close(&mut self, file: FileHandle);

    fn exists(&self, path: &str) -> bool;

    /// Delete a file, returning `true` if it was removed.
    fn remove(&mut self, path: &str) -> bool;

    /// Create a directory (and missing parents).
    fn create_dir(&mut self, path: &str) -> Result<(), StorageError>;

    /// List the entries of a directory.
    fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>, StorageError>;

    /// Free bytes left on the medium.
    fn free_bytes(&self) -> u64;

    /// Write the whole buffer or fail.
    fn write_all(&mut self, file: &FileHandle, data: &[u8]) -> Result<(), StorageError> {
        let written = self.write(file, data)?;
        if written != data.len() {
            return Err(StorageError::ShortWrite {
                expected: data.len(),
                written,
            });
        }
        Ok(())
    }

    /// Fill the whole buffer or fail.
    fn read_exact(&mut self, file: &FileHandle, buf: &mut [u8]) -> Result<(), StorageError> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(file, &mut buf[filled..])?;
            if n == 0 {
                return Err(StorageError::UnexpectedEof {
                    expected: buf.len(),
                    read: filled,
                });
            }
            filled += n;
        }
        Ok(())
    }

    /// Seek then write a little-endian `u32`, used to patch placeholder fields.
    fn write_u32_at(&mut self, file: &FileHandle, offset: u64, value: u32) -> Result<(), StorageError> {
        self.seek(file, offset)?;
        self.write_all(file, &value.to_le_bytes())
    }

    /// Seek then read a little-endian `u32`.
    fn read_u32_at(&mut self, file: &FileHandle, offset: u64) -> Result<u32, StorageError> {
        let mut buf = [0u8; 4];
        self.seek(file, offset)?;
        self.read_exact(file, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }
}

/// Join a directory and a file name with a single `/`.
pub fn join_path(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    if dir.is_empty() {
        format!("/{}", name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// The last `/`-separated component of a path.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
