//! Frame source abstraction.
//!
//! A frame source is the capture device: every call yields one independently
//! encoded still image (JPEG for MJPEG recordings) together with its pixel
//! dimensions, or nothing when the capture failed. Failures are transient;
//! the caller decides whether to retry.

/// One captured, already-compressed image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    /// Compressed image bytes
    pub data: Vec<u8>,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl CapturedFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Capture device.
pub trait FrameSource {
    /// Capture one image.
    ///
    /// `illumination` asks the device to switch on its light (flash LED)
    /// for this capture, if it has one.
    fn capture(&mut self, illumination: bool) -> Option<CapturedFrame>;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn capture(&mut self, illumination: bool) -> Option<CapturedFrame> {
        (**self).capture(illumination)
    }
}

/// Frame source replaying a fixed script, for tests and dry runs.
///
/// Each call pops the next scripted result; an exhausted script repeats
/// the fallback frame (or fails, if there is none).
#[derive(Debug, Default)]
pub struct ScriptedSource {
    script: std::collections::VecDeque<Option<CapturedFrame>>,
    fallback: Option<CapturedFrame>,
    captures: usize,
    illuminated: usize,
}

impl ScriptedSource {
    /// Source that always yields `frame`.
    pub fn repeating(frame: CapturedFrame) -> Self {
        Self {
            fallback: Some(frame),
            ..Default::default()
        }
    }

    /// Source that never yields a frame.
    pub fn failing() -> Self {
        Self::default()
    }

    /// Queue one result ahead of the fallback.
    pub fn push(&mut self, result: Option<CapturedFrame>) -> &mut Self {
        self.script.push_back(result);
        self
    }

    /// Number of capture calls so far.
    pub fn captures(&self) -> usize {
        self.captures
    }

    /// Number of capture calls that asked for illumination.
    pub fn illuminated_captures(&self) -> usize {
        self.illuminated
    }
}

impl FrameSource for ScriptedSource {
    fn capture(&mut self, illumination: bool) -> Option<CapturedFrame> {
        self.captures += 1;
        if illumination {
            self.illuminated += 1;
        }
        match self.script.pop_front() {
            Some(result) => result,
            None => self.fallback.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_source() {
        let frame = CapturedFrame::new(vec![0xFF, 0xD8, 0xFF, 0xD9], 320, 240);
        let mut source = ScriptedSource::repeating(frame.clone());
        source.push(None);

        assert_eq!(source.capture(true), None);
        assert_eq!(source.capture(false), Some(frame));
        assert_eq!(source.captures(), 2);
        assert_eq!(source.illuminated_captures(), 1);
        assert_eq!(ScriptedSource::failing().capture(false), None);
    }
}
