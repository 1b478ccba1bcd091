//! Recording session: chunked MJPEG stream, elapsed timer and trim window.

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{Error, Result};

/// Default snapshot rate.
pub const DEFAULT_FRAME_RATE: u32 = 5;

/// Default interval at which pending frames are flushed into a chunk.
pub const DEFAULT_CHUNK_INTERVAL: Duration = Duration::from_secs(1);

/// Tolerance when comparing a trim window to the clip duration.
const TRIM_EPSILON: f64 = 0.05;

/// Portion of a clip to keep, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrimWindow {
    pub start: f64,
    pub end: f64,
}

impl TrimWindow {
    /// Window covering a whole clip of `duration` seconds.
    pub fn full(duration: f64) -> Self {
        Self {
            start: 0.0,
            end: duration.max(0.0),
        }
    }

    /// Whether this window cuts anything from a clip of `duration` seconds.
    pub fn is_narrower_than(&self, duration: f64) -> bool {
        self.start > TRIM_EPSILON || self.end < duration - TRIM_EPSILON
    }

    pub fn length(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// A closed-out recording ready for transcoding.
#[derive(Debug, Clone)]
pub struct RawClip {
    /// Concatenated JPEG frames.
    pub data: Bytes,
    pub frame_rate: u32,
    pub frame_count: u64,
}

impl RawClip {
    /// Playback duration in seconds at the clip's frame rate.
    pub fn duration(&self) -> f64 {
        if self.frame_rate == 0 {
            return 0.0;
        }
        self.frame_count as f64 / self.frame_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.frame_count == 0
    }
}

/// One recording from start to artifact.
///
/// Frames are appended as encoded JPEG images to a pending buffer which is
/// flushed into `video_chunks` on every chunk interval. After [`close`] no
/// more frames are accepted and the trim window may be adjusted.
///
/// [`close`]: RecordingSession::close
#[derive(Debug)]
pub struct RecordingSession {
    video_chunks: Vec<Bytes>,
    pending: BytesMut,
    last_frame: Option<Bytes>,
    frame_rate: u32,
    frame_count: u64,
    elapsed_seconds: u64,
    trim: Option<TrimWindow>,
}

impl RecordingSession {
    pub fn new(frame_rate: u32) -> Self {
        Self {
            video_chunks: Vec::new(),
            pending: BytesMut::new(),
            last_frame: None,
            frame_rate: frame_rate.max(1),
            frame_count: 0,
            elapsed_seconds: 0,
            trim: None,
        }
    }

    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed_seconds
    }

    pub fn chunk_count(&self) -> usize {
        self.video_chunks.len()
    }

    pub fn is_closed(&self) -> bool {
        self.trim.is_some()
    }

    /// Bytes recorded so far, flushed or pending.
    pub fn total_bytes(&self) -> usize {
        self.video_chunks.iter().map(Bytes::len).sum::<usize>() + self.pending.len()
    }

    /// Append one encoded frame. Ignored once the session is closed.
    pub fn push_frame(&mut self, jpeg: Bytes) {
        if self.is_closed() {
            return;
        }
        self.pending.extend_from_slice(&jpeg);
        self.last_frame = Some(jpeg);
        self.frame_count += 1;
    }

    /// Append the previous frame again to keep the timeline steady.
    ///
    /// Returns `false` if no frame has been captured yet.
    pub fn repeat_last_frame(&mut self) -> bool {
        match self.last_frame.clone() {
            Some(frame) if !self.is_closed() => {
                self.push_frame(frame);
                true
            }
            _ => false,
        }
    }

    /// Move pending frames into a new chunk. Returns the chunk size, if any.
    pub fn flush_chunk(&mut self) -> Option<usize> {
        if self.pending.is_empty() {
            return None;
        }
        let chunk = self.pending.split().freeze();
        let len = chunk.len();
        self.video_chunks.push(chunk);
        Some(len)
    }

    /// Advance the elapsed timer by one second.
    pub fn tick(&mut self) {
        if !self.is_closed() {
            self.elapsed_seconds += 1;
        }
    }

    /// Flush the partial chunk and set the trim window to the whole clip.
    pub fn close(&mut self) -> TrimWindow {
        if let Some(trim) = self.trim {
            return trim;
        }
        self.flush_chunk();
        let trim = TrimWindow::full(self.duration());
        self.trim = Some(trim);
        tracing::debug!(
            "Recording closed: {} frames, {} chunks, {:.1}s",
            self.frame_count,
            self.video_chunks.len(),
            trim.end
        );
        trim
    }

    /// Clip duration in seconds at the session frame rate.
    pub fn duration(&self) -> f64 {
        self.frame_count as f64 / self.frame_rate as f64
    }

    /// Current trim window; `None` until closed.
    pub fn trim(&self) -> Option<TrimWindow> {
        self.trim
    }

    /// Change the trim window of a closed session.
    ///
    /// `end` is clamped to the clip duration.
    pub fn set_trim(&mut self, start: f64, end: f64) -> Result<TrimWindow> {
        if !self.is_closed() {
            return Err(Error::InvalidInput(
                "trim window can only be set after recording stops".to_string(),
            ));
        }
        let duration = self.duration();
        let end = end.min(duration);
        if !start.is_finite() || !end.is_finite() || start < 0.0 || start >= end {
            return Err(Error::InvalidInput(format!(
                "invalid trim window [{start}, {end}] for a {duration:.2}s clip"
            )));
        }
        let trim = TrimWindow { start, end };
        self.trim = Some(trim);
        Ok(trim)
    }

    /// Assemble the raw MJPEG clip from all flushed chunks.
    pub fn raw_clip(&self) -> RawClip {
        let mut data = BytesMut::with_capacity(self.total_bytes());
        for chunk in &self.video_chunks {
            data.extend_from_slice(chunk);
        }
        data.extend_from_slice(&self.pending);
        RawClip {
            data: data.freeze(),
            frame_rate: self.frame_rate,
            frame_count: self.frame_count,
        }
    }
}
