use std::io::Read;
use std::time::Duration;

use image::RgbImage;
use log::{debug, info, warn};

use crate::config::constants;
use crate::error::SourceError;
use crate::pacing::{Sleeper, ThreadSleeper};

/// A pull-based camera connection.
pub trait FrameSource {
    /// Human-readable location of the stream, for logging.
    fn endpoint(&self) -> &str;

    /// Connect to the stream.
    fn open(&mut self) -> Result<(), SourceError>;

    /// Read the next decoded frame.
    fn read(&mut self) -> Result<RgbImage, SourceError>;

    /// Drop the connection. Safe to call when already closed.
    fn release(&mut self);

    fn is_open(&self) -> bool;
}

/// MJPEG-over-HTTP camera stream, as served by mjpg-streamer or OctoPrint's webcam proxy.
///
/// Frames are cut out of the multipart body by their JPEG start and end
/// markers, so boundary headers never need to be parsed.
pub struct MjpegSource {
    url: String,
    client: reqwest::blocking::Client,
    response: Option<reqwest::blocking::Response>,
    buffer: Vec<u8>,
}

impl MjpegSource {
    /// Create a source for `url`. No connection is made until `open`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>) -> Result<Self, SourceError> {
        let url = url.into();
        // The body never ends, so only the connect phase is bounded.
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(constants::STREAM_CONNECT_TIMEOUT)
            .timeout(None)
            .build()
            .map_err(|e| SourceError::OpenFailed {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            url,
            client,
            response: None,
            buffer: Vec::new(),
        })
    }
}

impl FrameSource for MjpegSource {
    fn endpoint(&self) -> &str {
        &self.url
    }

    fn open(&mut self) -> Result<(), SourceError> {
        let open_err = |reason: String| SourceError::OpenFailed {
            url: self.url.clone(),
            reason,
        };

        let response = self
            .client
            .get(&self.url)
            .send()
            .map_err(|e| open_err(e.to_string()))?;

        if !response.status().is_success() {
            return Err(open_err(format!("HTTP {}", response.status())));
        }

        self.buffer.clear();
        self.response = Some(response);
        Ok(())
    }

    fn read(&mut self) -> Result<RgbImage, SourceError> {
        let response = self.response.as_mut().ok_or(SourceError::NotOpen)?;
        let jpeg = next_jpeg(response, &mut self.buffer, constants::MAX_FRAME_BUFFER)?;

        let frame = image::load_from_memory(&jpeg).map_err(|e| SourceError::ReadFailed {
            reason: e.to_string(),
        })?;
        Ok(frame.to_rgb8())
    }

    fn release(&mut self) {
        self.response = None;
        self.buffer.clear();
    }

    fn is_open(&self) -> bool {
        self.response.is_some()
    }
}

/// Pull bytes from `reader` until `buffer` holds a complete JPEG and return it.
///
/// Bytes before the start marker are discarded. If `max_buffer` bytes pile
/// up without a complete frame the read fails.
pub fn next_jpeg<R: Read>(
    reader: &mut R,
    buffer: &mut Vec<u8>,
    max_buffer: usize,
) -> Result<Vec<u8>, SourceError> {
    let mut chunk = [0u8; 16 * 1024];
    loop {
        if let Some(start) = find_marker(buffer, 0, [0xFF, 0xD8]) {
            if let Some(end) = find_marker(buffer, start + 2, [0xFF, 0xD9]) {
                let frame = buffer[start..end + 2].to_vec();
                buffer.drain(..end + 2);
                return Ok(frame);
            }
            if start > 0 {
                buffer.drain(..start);
            }
        } else if buffer.len() > 1 {
            // Keep a trailing 0xFF in case the marker straddles two reads.
            let keep_from = buffer.len() - 1;
            buffer.drain(..keep_from);
        }

        if buffer.len() > max_buffer {
            buffer.clear();
            return Err(SourceError::ReadFailed {
                reason: format!("no complete frame within {} bytes", max_buffer),
            });
        }

        let read = reader
            .read(&mut chunk)
            .map_err(|e| SourceError::ReadFailed {
                reason: e.to_string(),
            })?;
        if read == 0 {
            return Err(SourceError::EndOfStream);
        }
        buffer.extend_from_slice(&chunk[..read]);
    }
}

fn find_marker(haystack: &[u8], from: usize, marker: [u8; 2]) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(2)
        .position(|w| w == marker)
        .map(|pos| pos + from)
}

/// Connection state of the camera stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Open,
}

/// Result of asking the supervisor for a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    Frame(RgbImage),
    /// No frame this time; the supervisor already waited as needed.
    Retry,
}

/// Keeps a [`FrameSource`] connected, reconnecting with exponential backoff.
///
/// Open failures back off 1s, 2s, 4s ... up to 10s; a read failure closes the
/// stream and pauses a fixed 500ms. The backoff returns to 1s only after the
/// next successful open. Faults never escape `next_frame`.
pub struct FrameSupervisor<S: FrameSource, P: Sleeper = ThreadSleeper> {
    source: S,
    sleeper: P,
    state: ConnectionState,
    backoff: Duration,
    initial_backoff: Duration,
    max_backoff: Duration,
    read_failure_pause: Duration,
}

impl<S: FrameSource, P: Sleeper> FrameSupervisor<S, P> {
    pub fn new(source: S, sleeper: P) -> Self {
        Self {
            source,
            sleeper,
            state: ConnectionState::Closed,
            backoff: constants::INITIAL_BACKOFF,
            initial_backoff: constants::INITIAL_BACKOFF,
            max_backoff: constants::MAX_BACKOFF,
            read_failure_pause: constants::READ_FAILURE_PAUSE,
        }
    }

    /// Fetch the next frame, opening the stream first if it is closed.
    pub fn next_frame(&mut self) -> FrameOutcome {
        if self.state == ConnectionState::Closed {
            info!("[Camera] Opening {}", self.source.endpoint());
            if let Err(e) = self.source.open() {
                warn!(
                    "[Camera] Failed, retry in {:.1}s: {}",
                    self.backoff.as_secs_f64(),
                    e
                );
                self.sleeper.sleep(self.backoff);
                self.backoff = (self.backoff * 2).min(self.max_backoff);
                return FrameOutcome::Retry;
            }
            self.state = ConnectionState::Open;
            self.backoff = self.initial_backoff;
        }

        match self.source.read() {
            Ok(frame) => FrameOutcome::Frame(frame),
            Err(e) => {
                warn!("[Camera] Read failed, reopening... ({})", e);
                self.close();
                self.sleeper.sleep(self.read_failure_pause);
                FrameOutcome::Retry
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Delay that the next open failure will wait.
    pub fn current_backoff(&self) -> Duration {
        self.backoff
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Release the stream if it is open.
    pub fn close(&mut self) {
        if self.state == ConnectionState::Open || self.source.is_open() {
            debug!("[Camera] Releasing {}", self.source.endpoint());
            self.source.release();
        }
        self.state = ConnectionState::Closed;
    }
}

impl<S: FrameSource, P: Sleeper> Drop for FrameSupervisor<S, P> {
    fn drop(&mut self) {
        self.close();
    }
}
