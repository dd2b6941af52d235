//! Incremental AVI writer.
//!
//! Writes the fixed header with zero placeholders, appends one `00dc` chunk
//! per frame, and on finalize appends the `idx1` index, closes the file,
//! reopens it for in-place update and patches the placeholders.
//!
//! The writer keeps its file handle but not the storage provider; every
//! operation borrows the provider, so the session can keep ownership of it.

use log::{debug, info, warn};

use super::layout::{
    build_header, HeaderPatch, PatchOffsets, StreamParams, AVIIF_KEYFRAME, CHUNK_HEADER_SIZE,
    DATA_START, FRAME_CHUNK_TAG, INDEX_CHUNK_TAG, INDEX_ENTRY_SIZE,
};
use crate::error::{FormatError, RecordingError};
use crate::storage::{FileHandle, OpenMode, StorageError, StorageProvider};

/// Position of one frame for the trailing index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameIndexEntry {
    /// Chunk offset relative to the first frame chunk
    pub offset: u32,
    /// Payload length without chunk header and padding
    pub length: u32,
}

/// What a successful finalize wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalizeSummary {
    pub frame_count: u32,
    /// Frames listed in the `idx1` chunk (0 if none was written)
    pub indexed_frames: u32,
    pub file_size: u64,
}

/// Writer for one container file.
#[derive(Debug)]
pub struct ContainerWriter {
    path: String,
    file: Option<FileHandle>,
    offsets: Option<PatchOffsets>,
    /// Bytes written so far, i.e. the current file size
    total_bytes: u64,
    frame_count: u32,
    index: Vec<FrameIndexEntry>,
    index_capacity: usize,
    index_full_logged: bool,
}

impl ContainerWriter {
    /// Create (or truncate) `path` and reserve room for `index_capacity` index entries.
    ///
    /// Failure to reserve the index is not fatal: the recording goes on
    /// without a seek index.
    pub fn create<S: StorageProvider>(
        storage: &mut S,
        path: &str,
        index_capacity: usize,
    ) -> Result<Self, StorageError> {
        let file = storage.open(path, OpenMode::Create)?;

        let mut index = Vec::new();
        let index_capacity = match index.try_reserve_exact(index_capacity) {
            Ok(()) => index_capacity,
            Err(e) => {
                warn!(
                    "Cannot allocate frame index for {} entries ({}), recording without index",
                    index_capacity, e
                );
                0
            }
        };

        Ok(Self {
            path: path.to_string(),
            file: Some(file),
            offsets: None,
            total_bytes: 0,
            frame_count: 0,
            index,
            index_capacity,
            index_full_logged: false,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn indexed_frames(&self) -> usize {
        self.index.len()
    }

    pub fn patch_offsets(&self) -> Option<PatchOffsets> {
        self.offsets
    }

    fn handle(&self) -> Result<FileHandle, RecordingError> {
        self.file
            .ok_or_else(|| StorageError::io(self.path.clone(), "file already closed").into())
    }

    /// Write the fixed header. Must be called once, before any frame.
    pub fn write_header<S: StorageProvider>(
        &mut self,
        storage: &mut S,
        params: &StreamParams,
    ) -> Result<PatchOffsets, RecordingError> {
        if self.offsets.is_some() {
            return Err(FormatError::HeaderAlreadyWritten.into());
        }
        let file = self.handle()?;
        let (header, offsets) = build_header(params)?;

        storage.write_all(&file, &header)?;
        storage.flush(&file)?;
        self.total_bytes += header.len() as u64;
        self.offsets = Some(offsets);

        debug!(
            "{}: header written ({}x{} @ {} fps)",
            self.path, params.width, params.height, params.fps
        );
        Ok(offsets)
    }

    /// Append one frame chunk, padded to an even size.
    pub fn append_frame<S: StorageProvider>(
        &mut self,
        storage: &mut S,
        data: &[u8],
    ) -> Result<(), RecordingError> {
        if self.offsets.is_none() {
            return Err(FormatError::HeaderNotWritten.into());
        }
        let file = self.handle()?;
        let length = u32::try_from(data.len()).map_err(|_| FormatError::TooLarge {
            field: "frame length",
            value: data.len() as u64,
        })?;
        let chunk_start = self.total_bytes;

        let mut chunk_header = [0u8; CHUNK_HEADER_SIZE as usize];
        chunk_header[0..4].copy_from_slice(&FRAME_CHUNK_TAG);
        chunk_header[4..8].copy_from_slice(&length.to_le_bytes());
        storage.write_all(&file, &chunk_header)?;
        storage.write_all(&file, data)?;
        let padding = u64::from(length & 1);
        if padding == 1 {
            storage.write_all(&file, &[0u8])?;
        }

        self.total_bytes += CHUNK_HEADER_SIZE + u64::from(length) + padding;
        self.frame_count += 1;
        self.record_index(chunk_start, length);
        Ok(())
    }

    fn record_index(&mut self, chunk_start: u64, length: u32) {
        if self.index.len() >= self.index_capacity {
            if !self.index_full_logged && self.index_capacity > 0 {
                warn!(
                    "{}: frame index full at {} entries, later frames are not indexed",
                    self.path, self.index_capacity
                );
                self.index_full_logged = true;
            }
            return;
        }
        match u32::try_from(chunk_start - DATA_START) {
            Ok(offset) => self.index.push(FrameIndexEntry { offset, length }),
            Err(_) => {
                // Past 4 GiB the index can't address frames any more
                self.index_capacity = self.index.len();
            }
        }
    }

    /// Write the index, close, reopen in place and patch the placeholders.
    ///
    /// On error the file is closed and left as written; the repair scanner
    /// recovers it on the next start.
    pub fn finalize<S: StorageProvider>(
        mut self,
        storage: &mut S,
    ) -> Result<FinalizeSummary, RecordingError> {
        let file = self.handle()?;
        let offsets = match self.offsets {
            Some(offsets) => offsets,
            None => {
                storage.close(file);
                return Err(FormatError::HeaderNotWritten.into());
            }
        };
        if self.frame_count == 0 {
            storage.close(file);
            return Err(FormatError::EmptyContainer.into());
        }

        let frame_list_end = self.total_bytes;
        let written = self
            .write_index(storage, &file)
            .and_then(|indexed| storage.flush(&file).map(|_| indexed));
        self.file = None;
        storage.close(file);
        let indexed_frames = written?;

        let file_size = self.total_bytes;
        let patch = HeaderPatch::compute(&offsets, file_size, frame_list_end, self.frame_count)?;

        // Reopen rather than seeking back on the append handle: flash
        // layers only guarantee backward seek + write on a fresh handle.
        let file = storage.open(&self.path, OpenMode::ReadWrite)?;
        let patched = apply_patch(storage, &file, &offsets, &patch);
        storage.close(file);
        patched?;

        info!(
            "{}: finalized {} frames ({} indexed), {} bytes",
            self.path, self.frame_count, indexed_frames, file_size
        );
        Ok(FinalizeSummary {
            frame_count: self.frame_count,
            indexed_frames,
            file_size,
        })
    }

    fn write_index<S: StorageProvider>(
        &mut self,
        storage: &mut S,
        file: &FileHandle,
    ) -> Result<u32, StorageError> {
        if self.index.is_empty() {
            return Ok(0);
        }

        let size = self.index.len() * INDEX_ENTRY_SIZE;
        let mut buf = Vec::with_capacity(CHUNK_HEADER_SIZE as usize + size);
        buf.extend_from_slice(&INDEX_CHUNK_TAG);
        buf.extend_from_slice(&(size as u32).to_le_bytes());
        for entry in &self.index {
            buf.extend_from_slice(&FRAME_CHUNK_TAG);
            buf.extend_from_slice(&AVIIF_KEYFRAME.to_le_bytes());
            buf.extend_from_slice(&entry.offset.to_le_bytes());
            buf.extend_from_slice(&entry.length.to_le_bytes());
        }

        storage.write_all(file, &buf)?;
        self.total_bytes += buf.len() as u64;
        Ok(self.index.len() as u32)
    }

    /// Close the file without finalizing, leaving it for repair.
    pub fn abandon<S: StorageProvider>(mut self, storage: &mut S) {
        if let Some(file) = self.file.take() {
            let _ = storage.flush(&file);
            storage.close(file);
        }
        warn!(
            "{}: abandoned after {} frames, left for repair",
            self.path, self.frame_count
        );
    }

    /// Close and delete the file.
    pub fn discard<S: StorageProvider>(mut self, storage: &mut S) -> bool {
        if let Some(file) = self.file.take() {
            storage.close(file);
        }
        let removed = storage.remove(&self.path);
        if !removed {
            warn!("{}: cannot remove discarded recording", self.path);
        }
        removed
    }
}

/// Overwrite the four placeholder fields of an open container.
///
/// Sizes are flushed before the frame counts are written, so a file never
/// carries a nonzero header frame count next to a zero frame list size.
pub fn apply_patch<S: StorageProvider>(
    storage: &mut S,
    file: &FileHandle,
    offsets: &PatchOffsets,
    patch: &HeaderPatch,
) -> Result<(), StorageError> {
    for (offset, value) in patch.size_writes(offsets) {
        storage.write_u32_at(file, offset, value)?;
    }
    storage.flush(file)?;
    for (offset, value) in patch.count_writes(offsets) {
        storage.write_u32_at(file, offset, value)?;
    }
    storage.flush(file)
}
