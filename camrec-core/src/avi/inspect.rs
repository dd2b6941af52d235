//! Read back the header of an existing container.

use super::bytes::{fourcc_str, read_fourcc, read_u32_le, FourCc};
use super::layout::{PatchOffsets, HEADER_SIZE, INDEX_CHUNK_TAG};
use crate::error::{FormatError, RecordingError};
use crate::storage::{FileHandle, OpenMode, StorageProvider};

const MICROS_PER_FRAME_OFFSET: usize = 32;
const WIDTH_OFFSET: usize = 64;
const HEIGHT_OFFSET: usize = 68;
const SCALE_OFFSET: usize = 128;
const RATE_OFFSET: usize = 132;

/// Header fields of a container, as stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerSummary {
    pub file_size: u64,
    pub width: u32,
    pub height: u32,
    pub micros_per_frame: u32,
    pub rate: u32,
    pub scale: u32,
    pub riff_size: u32,
    pub header_frame_count: u32,
    pub stream_frame_count: u32,
    pub frame_list_size: u32,
    /// An `idx1` chunk follows the frame list
    pub has_index: bool,
}

fn expect_tag(header: &[u8], offset: usize, expected: &FourCc) -> Result<(), FormatError> {
    let actual = read_fourcc(header, offset).unwrap_or_default();
    if &actual != expected {
        return Err(FormatError::InvalidTag {
            offset: offset as u64,
            expected: fourcc_str(expected),
            actual: fourcc_str(&actual),
        });
    }
    Ok(())
}

impl ContainerSummary {
    /// Parse the fixed header. `has_index` is left `false`.
    pub fn parse(header: &[u8], file_size: u64) -> Result<Self, FormatError> {
        if header.len() < HEADER_SIZE {
            return Err(FormatError::HeaderTooShort {
                expected: HEADER_SIZE,
                actual: header.len(),
            });
        }
        expect_tag(header, 0, b"RIFF")?;
        expect_tag(header, 8, b"AVI ")?;
        expect_tag(header, 12, b"LIST")?;
        expect_tag(header, HEADER_SIZE - 4, b"movi")?;

        let offsets = PatchOffsets::standard();
        // Length was checked above, every fixed offset is in range
        let field = |offset: usize| read_u32_le(header, offset).unwrap_or(0);

        Ok(Self {
            file_size,
            width: field(WIDTH_OFFSET),
            height: field(HEIGHT_OFFSET),
            micros_per_frame: field(MICROS_PER_FRAME_OFFSET),
            rate: field(RATE_OFFSET),
            scale: field(SCALE_OFFSET),
            riff_size: field(offsets.riff_size as usize),
            header_frame_count: field(offsets.header_frame_count as usize),
            stream_frame_count: field(offsets.stream_frame_count as usize),
            frame_list_size: field(offsets.frame_list_size as usize),
            has_index: false,
        })
    }

    /// Open `path`, parse its header and look for a trailing index.
    pub fn read<S: StorageProvider>(storage: &mut S, path: &str) -> Result<Self, RecordingError> {
        let file = storage.open(path, OpenMode::Read)?;
        let result = Self::read_open(storage, &file);
        storage.close(file);
        result
    }

    fn read_open<S: StorageProvider>(
        storage: &mut S,
        file: &FileHandle,
    ) -> Result<Self, RecordingError> {
        let file_size = storage.size(file)?;
        if file_size < HEADER_SIZE as u64 {
            return Err(FormatError::HeaderTooShort {
                expected: HEADER_SIZE,
                actual: file_size as usize,
            }
            .into());
        }
        let mut header = [0u8; HEADER_SIZE];
        storage.seek(file, 0)?;
        storage.read_exact(file, &mut header)?;
        let mut summary = Self::parse(&header, file_size)?;

        let index_offset = summary.index_offset();
        if index_offset + 8 <= file_size {
            let mut tag = [0u8; 4];
            storage.seek(file, index_offset)?;
            storage.read_exact(file, &mut tag)?;
            summary.has_index = tag == INDEX_CHUNK_TAG;
        }
        Ok(summary)
    }

    /// Both frame counts are set only by a finalize or a repair.
    pub fn is_finalized(&self) -> bool {
        self.header_frame_count != 0
    }

    pub fn frame_count(&self) -> u32 {
        self.header_frame_count
    }

    /// Frames per second as stored (rate / scale).
    pub fn fps(&self) -> u32 {
        self.rate / self.scale.max(1)
    }

    pub fn duration_ms(&self) -> u64 {
        u64::from(self.header_frame_count) * u64::from(self.micros_per_frame) / 1000
    }

    /// Offset just past the frame list, where an index chunk would start.
    pub fn index_offset(&self) -> u64 {
        PatchOffsets::standard().frame_list_start() + u64::from(self.frame_list_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avi::layout::{build_header, StreamParams};
    use crate::avi::writer::ContainerWriter;
    use crate::storage::MemoryStorage;

    #[test]
    fn test_parse_fresh_header() {
        let (header, _) = build_header(&StreamParams::new(640, 480, 5)).unwrap();
        let summary = ContainerSummary::parse(&header, header.len() as u64).unwrap();
        assert_eq!(summary.width, 640);
        assert_eq!(summary.height, 480);
        assert_eq!(summary.fps(), 5);
        assert_eq!(summary.micros_per_frame, 200_000);
        assert!(!summary.is_finalized());
    }

    #[test]
    fn test_parse_rejects_foreign_file() {
        let mut data = vec![0u8; HEADER_SIZE];
        data[0..4].copy_from_slice(b"RIFX");
        assert!(matches!(
            ContainerSummary::parse(&data, HEADER_SIZE as u64),
            Err(FormatError::InvalidTag { offset: 0, .. })
        ));
        assert!(matches!(
            ContainerSummary::parse(&data[..10], 10),
            Err(FormatError::HeaderTooShort { actual: 10, .. })
        ));
    }

    #[test]
    fn test_read_finalized() {
        let mut storage = MemoryStorage::new();
        let mut writer = ContainerWriter::create(&mut storage, "/a.avi", 16).unwrap();
        writer
            .write_header(&mut storage, &StreamParams::new(320, 240, 10))
            .unwrap();
        for _ in 0..4 {
            writer.append_frame(&mut storage, &[0x55; 21]).unwrap();
        }
        writer.finalize(&mut storage).unwrap();

        let summary = ContainerSummary::read(&mut storage, "/a.avi").unwrap();
        assert!(summary.is_finalized());
        assert_eq!(summary.frame_count(), 4);
        assert_eq!(summary.stream_frame_count, 4);
        assert_eq!(summary.frame_list_size, 4 + 4 * (8 + 22));
        assert_eq!(u64::from(summary.riff_size), summary.file_size - 8);
        assert_eq!(summary.duration_ms(), 400);
        assert!(summary.has_index);
        assert_eq!(storage.open_handles(), 0);
    }
}
