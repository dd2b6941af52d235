//! Little-endian binary helpers shared by the header builder, the writer
//! and the scanner.

/// Four-character code used as RIFF chunk/list tag.
pub type FourCc = [u8; 4];

/// Growable little-endian byte buffer that knows its own write position.
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Offset the next byte will be written at.
    pub fn position(&self) -> u64 {
        self.buf.len() as u64
    }

    pub fn put_fourcc(&mut self, tag: &FourCc) {
        self.buf.extend_from_slice(tag);
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

pub fn read_u32_le(buf: &[u8], offset: usize) -> Option<u32> {
    let bytes = buf.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub fn read_u16_le(buf: &[u8], offset: usize) -> Option<u16> {
    let bytes = buf.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

pub fn read_fourcc(buf: &[u8], offset: usize) -> Option<FourCc> {
    let bytes = buf.get(offset..offset + 4)?;
    Some([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Printable form of a tag for log and error messages.
pub fn fourcc_str(tag: &[u8]) -> String {
    String::from_utf8_lossy(tag).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_layout() {
        let mut w = ByteWriter::with_capacity(16);
        w.put_fourcc(b"RIFF");
        assert_eq!(w.position(), 4);
        w.put_u32(0x0102_0304);
        w.put_u16(0xABCD);
        assert_eq!(w.as_slice(), &[b'R', b'I', b'F', b'F', 4, 3, 2, 1, 0xCD, 0xAB]);
    }

    #[test]
    fn test_readers_bounds() {
        let buf = [1u8, 0, 0, 0, 2, 0];
        assert_eq!(read_u32_le(&buf, 0), Some(1));
        assert_eq!(read_u16_le(&buf, 4), Some(2));
        assert_eq!(read_u32_le(&buf, 4), None);
        assert_eq!(read_fourcc(&buf, 3), None);
    }
}
