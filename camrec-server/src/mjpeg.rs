//! MJPEG stream frame source.
//!
//! Splits a byte stream of concatenated JPEG images (an `.mjpeg` file, a
//! pipe from a camera tool, or the body of a `multipart/x-mixed-replace`
//! HTTP stream) into frames on the SOI (`FF D8`) and EOI (`FF D9`) markers.
//! Bytes between images, such as multipart boundaries, are skipped. The
//! marker segments ahead of the scan data are stepped over by their length,
//! so an EXIF thumbnail's own EOI does not end the frame.
//!
//! The unparsed buffer is bounded: when it grows past the limit without
//! yielding a frame, the older half is discarded.

use std::fs::File;
use std::io::{self, BufReader, ErrorKind, Read};
use std::path::Path;

use camrec_core::source::{CapturedFrame, FrameSource};
use log::{debug, warn};

/// Maximum unparsed bytes kept between captures (2 MiB)
pub const MAX_BUFFER_BYTES: usize = 2 * 1024 * 1024;

const READ_CHUNK_SIZE: usize = 16 * 1024;
const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

fn find_marker(haystack: &[u8], marker: &[u8; 2], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(2)
        .position(|w| w == marker)
        .map(|p| p + from)
}

/// Where the EOI search for the image at `soi` may begin: the first byte
/// after the marker segments that precede the scan data.
///
/// `None` while the segment headers are not all buffered yet.
fn scan_data_start(buffer: &[u8], soi: usize) -> Option<usize> {
    let mut i = soi + 2;
    loop {
        let marker = *buffer.get(i + 1)?;
        if buffer[i] != 0xFF {
            return Some(i);
        }
        match marker {
            0xFF => i += 1,
            0x01 | 0xD0..=0xD7 => i += 2,
            0xD8 | 0xD9 | 0xDA => return Some(i),
            _ => {
                let len = u16::from_be_bytes([*buffer.get(i + 2)?, *buffer.get(i + 3)?]);
                i += 2 + usize::from(len);
            }
        }
    }
}

/// Width and height from the first SOF marker of a JPEG image.
pub fn jpeg_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    if data.get(0..2)? != SOI {
        return None;
    }
    let mut i = 2;
    while i + 4 <= data.len() {
        if data[i] != 0xFF {
            return None;
        }
        let marker = data[i + 1];
        match marker {
            // Fill byte
            0xFF => {
                i += 1;
                continue;
            }
            // Markers without a length field
            0x01 | 0xD0..=0xD7 => {
                i += 2;
                continue;
            }
            0xD9 | 0xDA => return None,
            _ => {}
        }

        let segment_len = usize::from(u16::from_be_bytes([data[i + 2], data[i + 3]]));
        let is_sof = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_sof {
            let sof = data.get(i + 4..i + 9)?;
            let height = u32::from(u16::from_be_bytes([sof[1], sof[2]]));
            let width = u32::from(u16::from_be_bytes([sof[3], sof[4]]));
            if width == 0 || height == 0 {
                return None;
            }
            return Some((width, height));
        }
        i += 2 + segment_len;
    }
    None
}

/// Frame source over any byte stream of JPEG images.
pub struct MjpegStreamSource<R> {
    reader: R,
    buffer: Vec<u8>,
    max_buffer: usize,
    eof: bool,
    frames: u64,
    skipped: u64,
}

impl MjpegStreamSource<BufReader<File>> {
    /// Open an MJPEG file (or a FIFO a camera tool writes to).
    pub fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: Read> MjpegStreamSource<R> {
    pub fn new(reader: R) -> Self {
        Self::with_max_buffer(reader, MAX_BUFFER_BYTES)
    }

    pub fn with_max_buffer(reader: R, max_buffer: usize) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(READ_CHUNK_SIZE),
            max_buffer: max_buffer.max(4),
            eof: false,
            frames: 0,
            skipped: 0,
        }
    }

    /// The stream has ended and no complete image is left.
    pub fn is_exhausted(&self) -> bool {
        self.eof && find_marker(&self.buffer, &SOI, 0).is_none()
    }

    /// Frames returned so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Images dropped because their dimensions could not be read.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Take the next complete image out of the buffer, if there is one.
    fn next_image(&mut self) -> Option<Vec<u8>> {
        let Some(soi) = find_marker(&self.buffer, &SOI, 0) else {
            // Keep a trailing 0xFF, it may start the next SOI
            let keep = usize::from(self.buffer.last() == Some(&0xFF));
            let len = self.buffer.len();
            self.buffer.drain(..len - keep);
            return None;
        };
        let eoi = scan_data_start(&self.buffer, soi)
            .and_then(|from| find_marker(&self.buffer, &EOI, from));
        let Some(eoi) = eoi else {
            self.buffer.drain(..soi);
            return None;
        };
        let image = self.buffer[soi..eoi + 2].to_vec();
        self.buffer.drain(..eoi + 2);
        Some(image)
    }

    fn fill(&mut self) -> io::Result<()> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let n = loop {
            match self.reader.read(&mut chunk) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        };
        if n == 0 {
            self.eof = true;
            return Ok(());
        }
        self.buffer.extend_from_slice(&chunk[..n]);

        if self.buffer.len() > self.max_buffer {
            warn!(
                "MJPEG buffer exceeds {} bytes without a complete image, discarding old data",
                self.max_buffer
            );
            let keep_from = self.buffer.len() - self.max_buffer / 2;
            self.buffer.drain(..keep_from);
        }
        Ok(())
    }
}

impl<R: Read> FrameSource for MjpegStreamSource<R> {
    fn capture(&mut self, illumination: bool) -> Option<CapturedFrame> {
        if illumination {
            debug!("MJPEG stream has no light to switch on");
        }
        loop {
            while let Some(image) = self.next_image() {
                match jpeg_dimensions(&image) {
                    Some((width, height)) => {
                        self.frames += 1;
                        return Some(CapturedFrame::new(image, width, height));
                    }
                    None => {
                        self.skipped += 1;
                        debug!("Skipping {} byte image without frame header", image.len());
                    }
                }
            }
            if self.eof {
                return None;
            }
            if let Err(e) = self.fill() {
                warn!("Failed to read MJPEG stream: {}", e);
                return None;
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;

    /// Minimal JPEG: SOI, APP0 stub, SOF0 with the given size, payload, EOI.
    pub(crate) fn jpeg(width: u16, height: u16, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![0xFF, 0xD8];
        out.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x04, b'J', b'F']);
        out.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x0B, 0x08]);
        out.extend_from_slice(&height.to_be_bytes());
        out.extend_from_slice(&width.to_be_bytes());
        out.extend_from_slice(&[0x01, 0x01, 0x11, 0x00]);
        out.extend_from_slice(payload);
        out.extend_from_slice(&[0xFF, 0xD9]);
        out
    }

    #[test]
    fn test_jpeg_dimensions() {
        assert_eq!(jpeg_dimensions(&jpeg(640, 480, &[1, 2, 3])), Some((640, 480)));
        assert_eq!(jpeg_dimensions(&[0xFF, 0xD8, 0xFF, 0xD9]), None);
        assert_eq!(jpeg_dimensions(b"not a jpeg"), None);

        // DHT before SOF is skipped
        let mut data = vec![0xFF, 0xD8, 0xFF, 0xC4, 0x00, 0x03, 0x00];
        data.extend_from_slice(&jpeg(32, 16, &[])[2..]);
        assert_eq!(jpeg_dimensions(&data), Some((32, 16)));
    }

    #[test]
    fn test_split_multipart_stream() {
        let mut stream = Vec::new();
        for (i, size) in [(1u8, (320, 240)), (2, (800, 600))] {
            stream.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n");
            stream.extend_from_slice(&jpeg(size.0, size.1, &[i; 100]));
            stream.extend_from_slice(b"\r\n");
        }

        let mut source = MjpegStreamSource::new(Cursor::new(stream));
        let first = source.capture(false).unwrap();
        assert_eq!((first.width, first.height), (320, 240));
        assert_eq!(&first.data[..2], &SOI);
        assert_eq!(&first.data[first.len() - 2..], &EOI);

        let second = source.capture(false).unwrap();
        assert_eq!((second.width, second.height), (800, 600));
        assert_eq!(source.capture(false), None);
        assert!(source.is_exhausted());
        assert_eq!(source.frames(), 2);
    }

    #[test]
    fn test_exif_thumbnail_does_not_end_frame() {
        let thumbnail = jpeg(16, 12, &[0x44; 20]);
        let mut image = vec![0xFF, 0xD8, 0xFF, 0xE1];
        image.extend_from_slice(&(2 + 6 + thumbnail.len() as u16).to_be_bytes());
        image.extend_from_slice(b"Exif\0\0");
        image.extend_from_slice(&thumbnail);
        image.extend_from_slice(&jpeg(640, 480, &[])[8..21]);
        // SOS header, scan data, EOI
        image.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F, 0x00]);
        image.extend_from_slice(&[0x55; 50]);
        image.extend_from_slice(&EOI);

        let mut stream = image.clone();
        stream.extend_from_slice(&jpeg(8, 8, &[]));
        let mut source = MjpegStreamSource::new(Cursor::new(stream));
        let frame = source.capture(false).unwrap();
        assert_eq!(frame.data, image);
        assert_eq!((frame.width, frame.height), (640, 480));
        assert_eq!(source.capture(false).map(|f| f.width), Some(8));
    }

    #[test]
    fn test_image_split_across_reads() {
        let image = jpeg(64, 48, &vec![0x11; READ_CHUNK_SIZE * 2]);
        let mut source = MjpegStreamSource::new(Cursor::new(image.clone()));
        assert_eq!(source.capture(false).map(|f| f.data), Some(image));
    }

    #[test]
    fn test_undecodable_image_is_skipped() {
        let mut stream = vec![0xFF, 0xD8, 0x00, 0x00, 0xFF, 0xD9];
        stream.extend_from_slice(&jpeg(10, 10, &[]));
        let mut source = MjpegStreamSource::new(Cursor::new(stream));
        assert_eq!(source.capture(true).map(|f| f.width), Some(10));
        assert_eq!(source.skipped(), 1);
    }

    #[test]
    fn test_buffer_is_bounded() {
        // An SOI that never ends, followed by a real image
        let mut stream = vec![0xFF, 0xD8];
        stream.extend_from_slice(&vec![0x22; 200_000]);
        stream.extend_from_slice(&jpeg(8, 8, &[]));

        let mut source = MjpegStreamSource::with_max_buffer(Cursor::new(stream), 64 * 1024);
        let frame = source.capture(false).unwrap();
        assert_eq!((frame.width, frame.height), (8, 8));
        assert!(source.buffer.len() <= 64 * 1024);
    }
}
