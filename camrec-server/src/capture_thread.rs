//! Frame source running on its own thread.
//!
//! Reading a pipe or stdin blocks for as long as the camera stalls. The
//! recording loop polls its source from a tokio worker and must stay
//! responsive to shutdown, so the blocking reads happen on a dedicated
//! thread that hands complete frames over a bounded channel. `capture` then
//! waits at most a short, fixed time.
//!
//! The reader thread is detached: a read that never returns cannot hold up
//! process exit.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use camrec_core::source::{CapturedFrame, FrameSource};
use log::{debug, info};

/// Frames buffered between the reader thread and the recorder
const CHANNEL_CAPACITY: usize = 2;

/// Wait for a frame once recording runs; short compared to a frame interval
const DEFAULT_FRAME_WAIT: Duration = Duration::from_millis(20);

/// Wait for the first frame, while the camera starts up
const DEFAULT_FIRST_FRAME_WAIT: Duration = Duration::from_secs(2);

/// [`FrameSource`] adapter that captures from `inner` on a reader thread.
pub struct ThreadedSource {
    frames: Receiver<CapturedFrame>,
    illumination: Arc<AtomicBool>,
    frame_wait: Duration,
    first_frame_wait: Duration,
    received: u64,
    finished: bool,
}

impl ThreadedSource {
    /// Start the reader thread. It runs until `inner` stops yielding frames
    /// or this source is dropped.
    pub fn spawn<F>(name: &str, mut inner: F) -> io::Result<Self>
    where
        F: FrameSource + Send + 'static,
    {
        let (tx, rx) = sync_channel(CHANNEL_CAPACITY);
        let illumination = Arc::new(AtomicBool::new(false));
        let thread_illumination = illumination.clone();
        let thread_name = name.to_string();

        thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                let mut sent = 0u64;
                while let Some(frame) = inner.capture(thread_illumination.load(Ordering::Relaxed)) {
                    if tx.send(frame).is_err() {
                        debug!("{}: receiver gone", thread_name);
                        return;
                    }
                    sent += 1;
                }
                info!("{}: source ended after {} frames", thread_name, sent);
            })?;

        Ok(Self {
            frames: rx,
            illumination,
            frame_wait: DEFAULT_FRAME_WAIT,
            first_frame_wait: DEFAULT_FIRST_FRAME_WAIT,
            received: 0,
            finished: false,
        })
    }

    pub fn with_waits(mut self, first_frame: Duration, frame: Duration) -> Self {
        self.first_frame_wait = first_frame;
        self.frame_wait = frame;
        self
    }

    /// The reader thread has exited; no more frames will arrive.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl FrameSource for ThreadedSource {
    fn capture(&mut self, illumination: bool) -> Option<CapturedFrame> {
        self.illumination.store(illumination, Ordering::Relaxed);
        let wait = if self.received == 0 {
            self.first_frame_wait
        } else {
            self.frame_wait
        };
        match self.frames.recv_timeout(wait) {
            Ok(frame) => {
                self.received += 1;
                Some(frame)
            }
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                self.finished = true;
                None
            }
        }
    }
}
