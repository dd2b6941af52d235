//! Forward chunk scanner used to recover unfinalized recordings.
//!
//! Walks the frame chunks that follow the fixed header until the data stops
//! making sense: a foreign tag, a chunk whose declared payload runs past the
//! end of the file, or too few bytes left for another chunk header. The
//! scanner is independent of any storage: the caller supplies a function
//! that returns the 8-byte chunk header at a given offset.

use super::bytes::{fourcc_str, FourCc};
use super::layout::{CHUNK_HEADER_SIZE, FRAME_CHUNK_TAG};

/// Why the scan stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStop {
    /// Every byte up to the end of the file belonged to a complete chunk
    EndOfFile,
    /// A chunk header with an unexpected tag (e.g. a trailing `idx1`)
    ForeignTag(FourCc),
    /// The chunk at `offset` declares a payload longer than the file
    TruncatedChunk { offset: u64, declared: u32 },
    /// Fewer than 8 bytes left after the last complete chunk
    PartialHeader { offset: u64 },
}

impl std::fmt::Display for ScanStop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanStop::EndOfFile => write!(f, "end of file"),
            ScanStop::ForeignTag(tag) => write!(f, "foreign tag '{}'", fourcc_str(tag)),
            ScanStop::TruncatedChunk { offset, declared } => {
                write!(f, "chunk at {} truncated ({} bytes declared)", offset, declared)
            }
            ScanStop::PartialHeader { offset } => write!(f, "partial chunk header at {}", offset),
        }
    }
}

/// Result of a forward scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Number of complete frame chunks
    pub frame_count: u32,
    /// Offset just past the last complete chunk (its padding included when present)
    pub end_offset: u64,
    pub stop: ScanStop,
}

/// Scan frame chunks from `data_start` in a file of `file_size` bytes.
///
/// A chunk counts when its whole payload is present. A missing trailing
/// pad byte is tolerated; `end_offset` never exceeds `file_size`.
pub fn scan_frames<E, F>(
    file_size: u64,
    data_start: u64,
    mut read_chunk_header: F,
) -> Result<ScanOutcome, E>
where
    F: FnMut(u64) -> Result<[u8; 8], E>,
{
    let mut position = data_start;
    let mut frame_count = 0u32;

    let stop = loop {
        if position >= file_size {
            break ScanStop::EndOfFile;
        }
        if file_size - position < CHUNK_HEADER_SIZE {
            break ScanStop::PartialHeader { offset: position };
        }

        let header = read_chunk_header(position)?;
        let tag: FourCc = [header[0], header[1], header[2], header[3]];
        let declared = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        if tag != FRAME_CHUNK_TAG {
            break ScanStop::ForeignTag(tag);
        }

        let payload_end = position + CHUNK_HEADER_SIZE + u64::from(declared);
        if payload_end > file_size {
            break ScanStop::TruncatedChunk {
                offset: position,
                declared,
            };
        }

        frame_count = frame_count.saturating_add(1);
        position = (payload_end + u64::from(declared & 1)).min(file_size);
    };

    Ok(ScanOutcome {
        frame_count,
        end_offset: position,
        stop,
    })
}

/// Scan an in-memory copy of a whole file.
pub fn scan_buffer(data: &[u8], data_start: u64) -> ScanOutcome {
    let result: Result<ScanOutcome, std::convert::Infallible> =
        scan_frames(data.len() as u64, data_start, |offset| {
            let start = offset as usize;
            let mut header = [0u8; 8];
            header.copy_from_slice(&data[start..start + 8]);
            Ok(header)
        });
    match result {
        Ok(outcome) => outcome,
        Err(never) => match never {},
    }
}
