//! Recording of the rendering surface.
//!
//! A [`Recorder`] samples the surface at a fixed rate into a
//! [`RecordingSession`], and on demand turns the closed session into an MP4
//! preview or falls back to the raw MJPEG clip.
//!
//! ```text
//! Idle -> Capturing -> Stopped -> Converting -> PreviewReady -> Saved | Discarded
//!                                           \-> RawFallback  -> Saved | Discarded
//! ```

use crate::config::CaptureConfig;
use crate::surface::RenderSurface;
use parking_lot::Mutex;
use scormcast_av::{
    todays_file_name, DrawingSurface, RecordingSession, TranscodeReport, Transcoder, TrimWindow,
    Workspace,
};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const RAW_CLIP_NAME: &str = "capture.mjpeg";
const PREVIEW_NAME: &str = "preview.mp4";

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("recorder is {state}, cannot {action}")]
    InvalidState {
        state: RecorderState,
        action: &'static str,
    },

    #[error("capture could not start: {0}")]
    Start(String),

    #[error("failed to write recording: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Av(#[from] scormcast_av::Error),
}

pub type Result<T> = std::result::Result<T, CaptureError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecorderState {
    Idle,
    Capturing,
    Stopped,
    Converting,
    PreviewReady,
    RawFallback,
    Discarded,
    Saved,
}

impl fmt::Display for RecorderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecorderState::Idle => "idle",
            RecorderState::Capturing => "capturing",
            RecorderState::Stopped => "stopped",
            RecorderState::Converting => "converting",
            RecorderState::PreviewReady => "preview-ready",
            RecorderState::RawFallback => "raw-fallback",
            RecorderState::Discarded => "discarded",
            RecorderState::Saved => "saved",
        };
        f.write_str(name)
    }
}

/// Sampling parameters.
#[derive(Debug, Clone, Copy)]
pub struct CaptureSettings {
    pub fps: u32,
    pub chunk_interval: Duration,
    pub jpeg_quality: u8,
}

impl From<&CaptureConfig> for CaptureSettings {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            fps: config.fps.max(1),
            chunk_interval: Duration::from_millis(config.chunk_interval_ms),
            jpeg_quality: config.jpeg_quality,
        }
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self::from(&CaptureConfig::default())
    }
}

type SharedSession = Arc<Mutex<RecordingSession>>;

/// Owns the single live recording.
pub struct Recorder {
    settings: CaptureSettings,
    transcoder: Arc<Transcoder>,
    state: RecorderState,
    session: Option<SharedSession>,
    cancel: Option<CancellationToken>,
    tasks: Vec<JoinHandle<()>>,
    workspace: Option<Workspace>,
    preview: Option<TranscodeReport>,
    fallback_reason: Option<String>,
}

impl Recorder {
    pub fn new(settings: CaptureSettings, transcoder: Arc<Transcoder>) -> Self {
        Self {
            settings,
            transcoder,
            state: RecorderState::Idle,
            session: None,
            cancel: None,
            tasks: Vec::new(),
            workspace: None,
            preview: None,
            fallback_reason: None,
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn is_capturing(&self) -> bool {
        self.state == RecorderState::Capturing
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.with_session(|s| s.elapsed_seconds()).unwrap_or(0)
    }

    pub fn frame_count(&self) -> u64 {
        self.with_session(|s| s.frame_count()).unwrap_or(0)
    }

    /// Bytes recorded by the live session.
    pub fn recorded_bytes(&self) -> usize {
        self.with_session(|s| s.total_bytes()).unwrap_or(0)
    }

    pub fn trim(&self) -> Option<TrimWindow> {
        self.with_session(|s| s.trim()).flatten()
    }

    pub fn duration(&self) -> f64 {
        self.with_session(|s| s.duration()).unwrap_or(0.0)
    }

    pub fn preview(&self) -> Option<&TranscodeReport> {
        self.preview.as_ref()
    }

    /// Why the last conversion fell back to the raw clip.
    pub fn fallback_reason(&self) -> Option<&str> {
        self.fallback_reason.as_deref()
    }

    fn with_session<T>(&self, f: impl FnOnce(&RecordingSession) -> T) -> Option<T> {
        self.session.as_ref().map(|s| f(&s.lock()))
    }

    fn expect_state(&self, allowed: &[RecorderState], action: &'static str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(CaptureError::InvalidState {
                state: self.state,
                action,
            })
        }
    }

    fn release(&mut self) {
        self.halt_tasks();
        self.session = None;
        self.workspace = None;
        self.preview = None;
        self.fallback_reason = None;
    }

    fn halt_tasks(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    /// Start sampling `surface`. A previous recording is released first.
    ///
    /// The first frame is captured before returning; if that fails nothing
    /// is started.
    pub async fn start(&mut self, surface: Arc<dyn RenderSurface>) -> Result<()> {
        if matches!(
            self.state,
            RecorderState::Capturing | RecorderState::Converting
        ) {
            return Err(CaptureError::InvalidState {
                state: self.state,
                action: "start",
            });
        }
        self.release();

        let first = surface
            .capture_frame()
            .await
            .map_err(|e| CaptureError::Start(e.to_string()))?;
        let mut canvas = DrawingSurface::new(
            first.viewport.width,
            first.viewport.height,
            self.settings.jpeg_quality,
        )
        .map_err(|e| CaptureError::Start(e.to_string()))?;
        canvas
            .draw(&first.image, first.viewport)
            .map_err(|e| CaptureError::Start(e.to_string()))?;
        let jpeg = canvas
            .encode_jpeg()
            .map_err(|e| CaptureError::Start(e.to_string()))?;

        let mut session = RecordingSession::new(self.settings.fps);
        session.push_frame(jpeg);
        let session = Arc::new(Mutex::new(session));
        let cancel = CancellationToken::new();

        self.tasks.push(tokio::spawn(snapshot_loop(
            surface,
            canvas,
            session.clone(),
            self.settings.fps,
            cancel.clone(),
        )));
        self.tasks.push(tokio::spawn(timer_loop(
            session.clone(),
            self.settings.chunk_interval,
            cancel.clone(),
        )));

        self.session = Some(session);
        self.cancel = Some(cancel);
        self.state = RecorderState::Capturing;
        tracing::info!(
            "Recording started at {} fps ({}x{})",
            self.settings.fps,
            first.viewport.width,
            first.viewport.height
        );
        Ok(())
    }

    /// Stop sampling and close the session. Returns the default trim window.
    pub fn stop(&mut self) -> Result<TrimWindow> {
        self.expect_state(&[RecorderState::Capturing], "stop")?;
        self.halt_tasks();

        let session = self.session.as_ref().ok_or(CaptureError::InvalidState {
            state: self.state,
            action: "stop",
        })?;
        let trim = session.lock().close();
        self.state = RecorderState::Stopped;
        tracing::info!(
            "Recording stopped: {:.1}s, {} frames",
            trim.end,
            self.frame_count()
        );
        Ok(trim)
    }

    /// Adjust the trim window of a stopped recording.
    ///
    /// Setting it after a conversion returns the recorder to `Stopped` so
    /// the clip can be converted again.
    pub fn set_trim(&mut self, start: f64, end: f64) -> Result<TrimWindow> {
        self.expect_state(
            &[
                RecorderState::Stopped,
                RecorderState::PreviewReady,
                RecorderState::RawFallback,
            ],
            "trim",
        )?;
        let session = self.session.as_ref().ok_or(CaptureError::InvalidState {
            state: self.state,
            action: "trim",
        })?;
        let trim = session.lock().set_trim(start, end)?;
        self.preview = None;
        self.fallback_reason = None;
        self.state = RecorderState::Stopped;
        Ok(trim)
    }

    /// Transcode the stopped recording into a preview.
    ///
    /// Ends in `PreviewReady`, or `RawFallback` if the engine is unavailable
    /// or the conversion failed. The raw clip is kept either way.
    pub async fn convert(&mut self) -> Result<RecorderState> {
        self.expect_state(&[RecorderState::Stopped], "convert")?;
        let Some(session) = self.session.clone() else {
            return Err(CaptureError::InvalidState {
                state: self.state,
                action: "convert",
            });
        };

        let (clip, trim) = {
            let session = session.lock();
            (session.raw_clip(), session.trim().unwrap_or_else(|| TrimWindow::full(session.duration())))
        };

        self.state = RecorderState::Converting;
        tracing::info!(
            "Converting {:.1}s recording (trim {:.2}-{:.2})",
            clip.duration(),
            trim.start,
            trim.end
        );

        let outcome: std::result::Result<TranscodeReport, scormcast_av::Error> = async {
            if self.workspace.is_none() {
                self.workspace = Some(Workspace::new()?);
            }
            let workspace = self
                .workspace
                .as_ref()
                .ok_or_else(|| scormcast_av::Error::Workspace("workspace missing".to_string()))?;
            let input = workspace.temp_file(RAW_CLIP_NAME);
            let output = workspace.temp_file(PREVIEW_NAME);
            tokio::fs::write(&input, &clip.data).await?;
            self.transcoder.transcode(&input, &clip, trim, &output).await
        }
        .await;

        match outcome {
            Ok(report) => {
                tracing::info!(
                    "Preview ready (audio: {}, trimmed: {})",
                    report.with_audio,
                    report.trimmed
                );
                self.preview = Some(report);
                self.state = RecorderState::PreviewReady;
            }
            Err(e) => {
                tracing::warn!("Conversion failed, raw clip kept: {}", e);
                self.fallback_reason = Some(e.to_string());
                self.state = RecorderState::RawFallback;
            }
        }
        Ok(self.state)
    }

    /// Copy the preview into `dir` as a dated MP4.
    pub fn save(&mut self, dir: &Path) -> Result<PathBuf> {
        self.expect_state(&[RecorderState::PreviewReady], "save")?;
        let (Some(workspace), Some(preview)) = (&self.workspace, &self.preview) else {
            return Err(CaptureError::InvalidState {
                state: self.state,
                action: "save",
            });
        };
        let path = workspace.export(&preview.output, dir, &todays_file_name("mp4"))?;
        self.state = RecorderState::Saved;
        Ok(path)
    }

    /// Write the raw MJPEG clip into `dir` as a dated file.
    pub async fn save_raw(&mut self, dir: &Path) -> Result<PathBuf> {
        self.expect_state(
            &[
                RecorderState::Stopped,
                RecorderState::PreviewReady,
                RecorderState::RawFallback,
            ],
            "save the raw clip",
        )?;
        let Some(session) = &self.session else {
            return Err(CaptureError::InvalidState {
                state: self.state,
                action: "save the raw clip",
            });
        };
        let clip = session.lock().raw_clip();

        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(todays_file_name("mjpeg"));
        tokio::fs::write(&path, &clip.data).await?;
        tracing::info!("Saved raw clip {} ({} bytes)", path.display(), clip.data.len());
        self.state = RecorderState::Saved;
        Ok(path)
    }

    /// Drop the recording and any artifact.
    pub fn discard(&mut self) {
        self.release();
        self.state = RecorderState::Discarded;
        tracing::info!("Recording discarded");
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.halt_tasks();
    }
}

async fn snapshot_loop(
    surface: Arc<dyn RenderSurface>,
    mut canvas: DrawingSurface,
    session: SharedSession,
    fps: u32,
    cancel: CancellationToken,
) {
    let period = Duration::from_secs_f64(1.0 / fps as f64);
    let started = Instant::now();
    let mut ticker = tokio::time::interval_at(started + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut failures: u32 = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let encoded = match surface.capture_frame().await {
            Ok(frame) => canvas
                .draw(&frame.image, frame.viewport)
                .and_then(|_| canvas.encode_jpeg())
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        if cancel.is_cancelled() {
            break;
        }

        let mut session = session.lock();
        match encoded {
            Ok(jpeg) => {
                failures = 0;
                session.push_frame(jpeg);
            }
            Err(e) => {
                failures += 1;
                if failures == 1 {
                    tracing::warn!("Snapshot failed, repeating last frame: {}", e);
                } else {
                    tracing::debug!("Snapshot failed ({}x): {}", failures, e);
                }
                session.repeat_last_frame();
            }
        }

        // Pad slow captures so the clip keeps wall-clock timing.
        let expected = (started.elapsed().as_secs_f64() * fps as f64).floor() as u64 + 1;
        while session.frame_count() < expected {
            if !session.repeat_last_frame() {
                break;
            }
        }
    }
}

async fn timer_loop(session: SharedSession, chunk_interval: Duration, cancel: CancellationToken) {
    let start = Instant::now();
    let mut chunks = tokio::time::interval_at(start + chunk_interval, chunk_interval);
    let mut seconds = tokio::time::interval_at(start + Duration::from_secs(1), Duration::from_secs(1));

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = chunks.tick() => {
                if let Some(len) = session.lock().flush_chunk() {
                    tracing::trace!("Flushed {} byte chunk", len);
                }
            }
            _ = seconds.tick() => session.lock().tick(),
        }
    }
}
