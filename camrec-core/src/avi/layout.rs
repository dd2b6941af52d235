//! Fixed RIFF/AVI header layout for single-stream MJPEG recordings.
//!
//! The header is always 224 bytes. Four of its fields cannot be known until
//! the recording ends and are written as zero placeholders; their byte
//! offsets are captured while the header is laid out and returned as
//! [`PatchOffsets`], so finalize and repair patch exactly the positions the
//! builder wrote.

use std::sync::OnceLock;

use super::bytes::{ByteWriter, FourCc};
use crate::error::FormatError;

/// Size of the fixed header; frame chunks start here
pub const HEADER_SIZE: usize = 224;

/// Offset of the first frame chunk
pub const DATA_START: u64 = HEADER_SIZE as u64;

/// Chunk header: tag (4) + little-endian size (4)
pub const CHUNK_HEADER_SIZE: u64 = 8;

/// Tag of a compressed video frame chunk in stream 0
pub const FRAME_CHUNK_TAG: FourCc = *b"00dc";

/// Tag of the trailing frame index chunk
pub const INDEX_CHUNK_TAG: FourCc = *b"idx1";

/// Index entry size: tag + flags + offset + size
pub const INDEX_ENTRY_SIZE: usize = 16;

/// Index entry flag marking a key frame (every MJPEG frame is one)
pub const AVIIF_KEYFRAME: u32 = 0x10;

const HDRL_LIST_SIZE: u32 = 192;
const STRL_LIST_SIZE: u32 = 116;
const AVIH_SIZE: u32 = 56;
const STRH_SIZE: u32 = 56;
const STRF_SIZE: u32 = 40;
const BITS_PER_PIXEL: u16 = 24;

/// Stream parameters written into the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParams {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Multiplied by fps for the max bytes/second estimate
    pub bytes_per_second_per_fps: u32,
}

impl StreamParams {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            fps,
            bytes_per_second_per_fps: 15_000,
        }
    }

    pub fn micros_per_frame(&self) -> u32 {
        1_000_000 / self.fps.max(1)
    }

    pub fn max_bytes_per_second(&self) -> u32 {
        self.fps.saturating_mul(self.bytes_per_second_per_fps)
    }
}

/// Byte offsets of the four placeholder fields, relative to file start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchOffsets {
    /// RIFF size: file size - 8
    pub riff_size: u64,
    /// `movi` LIST size
    pub frame_list_size: u64,
    /// `avih` dwTotalFrames
    pub header_frame_count: u64,
    /// `strh` dwLength
    pub stream_frame_count: u64,
}

impl PatchOffsets {
    /// Offsets of the fixed layout, taken from the header builder itself.
    pub fn standard() -> PatchOffsets {
        static OFFSETS: OnceLock<PatchOffsets> = OnceLock::new();
        *OFFSETS.get_or_init(|| lay_out(&StreamParams::new(1, 1, 1)).1)
    }

    /// Where the bytes counted by the frame list size begin (the `movi` tag).
    pub fn frame_list_start(&self) -> u64 {
        self.frame_list_size + 4
    }
}

/// Final values for the placeholder fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderPatch {
    pub riff_size: u32,
    pub frame_list_size: u32,
    pub frame_count: u32,
}

impl HeaderPatch {
    /// Compute the patch for a file of `file_size` bytes whose frame list
    /// ends (exclusive) at `frame_list_end`.
    pub fn compute(
        offsets: &PatchOffsets,
        file_size: u64,
        frame_list_end: u64,
        frame_count: u32,
    ) -> Result<Self, FormatError> {
        let riff_size = file_size.saturating_sub(8);
        let frame_list_size = frame_list_end.saturating_sub(offsets.frame_list_start());
        Ok(Self {
            riff_size: u32::try_from(riff_size).map_err(|_| FormatError::TooLarge {
                field: "riff size",
                value: riff_size,
            })?,
            frame_list_size: u32::try_from(frame_list_size).map_err(|_| {
                FormatError::TooLarge {
                    field: "frame list size",
                    value: frame_list_size,
                }
            })?,
            frame_count,
        })
    }

    /// Size fields, written (and flushed) before any frame count.
    pub fn size_writes(&self, offsets: &PatchOffsets) -> [(u64, u32); 2] {
        [
            (offsets.riff_size, self.riff_size),
            (offsets.frame_list_size, self.frame_list_size),
        ]
    }

    /// Frame count fields. The header count marks the file finalized, so
    /// it is the last write of a patch.
    pub fn count_writes(&self, offsets: &PatchOffsets) -> [(u64, u32); 2] {
        [
            (offsets.stream_frame_count, self.frame_count),
            (offsets.header_frame_count, self.frame_count),
        ]
    }

    /// All `(offset, value)` pairs in the order they must reach the medium.
    pub fn field_writes(&self, offsets: &PatchOffsets) -> [(u64, u32); 4] {
        let [riff, list] = self.size_writes(offsets);
        let [stream, header] = self.count_writes(offsets);
        [riff, list, stream, header]
    }
}

/// Build the fixed header for `params`.
pub fn build_header(params: &StreamParams) -> Result<(Vec<u8>, PatchOffsets), FormatError> {
    if params.width == 0
        || params.height == 0
        || params.width > u32::from(u16::MAX)
        || params.height > u32::from(u16::MAX)
    {
        return Err(FormatError::InvalidDimensions {
            width: params.width,
            height: params.height,
        });
    }
    Ok(lay_out(params))
}

fn lay_out(params: &StreamParams) -> (Vec<u8>, PatchOffsets) {
    let width = params.width;
    let height = params.height;
    let fps = params.fps.max(1);
    let max_bytes_per_sec = params.max_bytes_per_second();
    let image_size = u32::try_from(u64::from(width) * u64::from(height) * 3).unwrap_or(u32::MAX);

    let mut w = ByteWriter::with_capacity(HEADER_SIZE);

    // RIFF header
    w.put_fourcc(b"RIFF");
    let riff_size = w.position(); // 4
    w.put_u32(0);
    w.put_fourcc(b"AVI ");

    // LIST hdrl
    w.put_fourcc(b"LIST");
    w.put_u32(HDRL_LIST_SIZE);
    w.put_fourcc(b"hdrl");

    // avih
    w.put_fourcc(b"avih");
    w.put_u32(AVIH_SIZE);
    w.put_u32(params.micros_per_frame()); // 32
    w.put_u32(max_bytes_per_sec);
    w.put_u32(0); // padding granularity
    w.put_u32(0); // flags
    let header_frame_count = w.position(); // 48
    w.put_u32(0);
    w.put_u32(0); // initial frames
    w.put_u32(1); // streams
    w.put_u32(max_bytes_per_sec); // suggested buffer size
    w.put_u32(width); // 64
    w.put_u32(height);
    for _ in 0..4 {
        w.put_u32(0); // reserved
    }

    // LIST strl
    w.put_fourcc(b"LIST"); // 88
    w.put_u32(STRL_LIST_SIZE);
    w.put_fourcc(b"strl");

    // strh
    w.put_fourcc(b"strh"); // 100
    w.put_u32(STRH_SIZE);
    w.put_fourcc(b"vids"); // 108
    w.put_fourcc(b"MJPG");
    w.put_u32(0); // flags
    w.put_u16(0); // priority
    w.put_u16(0); // language
    w.put_u32(0); // initial frames
    w.put_u32(1); // scale, 128
    w.put_u32(fps); // rate
    w.put_u32(0); // start
    let stream_frame_count = w.position(); // 140
    w.put_u32(0);
    w.put_u32(max_bytes_per_sec); // suggested buffer size
    w.put_u32(0xFFFF_FFFF); // quality
    w.put_u32(0); // sample size
    w.put_u16(0); // rcFrame, 156
    w.put_u16(0);
    w.put_u16(width as u16);
    w.put_u16(height as u16);

    // strf: BITMAPINFOHEADER
    w.put_fourcc(b"strf"); // 164
    w.put_u32(STRF_SIZE);
    w.put_u32(STRF_SIZE); // biSize, 172
    w.put_u32(width);
    w.put_u32(height);
    w.put_u16(1); // planes
    w.put_u16(BITS_PER_PIXEL);
    w.put_fourcc(b"MJPG"); // 188
    w.put_u32(image_size);
    for _ in 0..4 {
        w.put_u32(0); // resolution, colors used/important
    }

    // LIST movi
    w.put_fourcc(b"LIST"); // 212
    let frame_list_size = w.position(); // 216
    w.put_u32(0);
    w.put_fourcc(b"movi");

    debug_assert_eq!(w.position(), DATA_START);

    (
        w.into_inner(),
        PatchOffsets {
            riff_size,
            frame_list_size,
            header_frame_count,
            stream_frame_count,
        },
    )
}
