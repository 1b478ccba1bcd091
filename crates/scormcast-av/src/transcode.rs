//! MJPEG to MP4 transcoding with ffmpeg.
//!
//! The encoder is located and probed the first time a conversion runs and the
//! result, success or failure, is kept for the life of the [`Transcoder`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::OnceCell;

use crate::command::ToolCommand;
use crate::recording::{RawClip, TrimWindow};
use crate::{Error, Result};

/// Encoder settings for exported recordings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeSettings {
    /// x264 constant rate factor (default: 23).
    pub video_crf: u32,
    /// x264 preset (default: veryfast).
    pub preset: String,
    /// AAC bitrate of the silent audio track (default: 128k).
    pub audio_bitrate: String,
    /// Largest output width (default: 1920).
    pub max_width: u32,
    /// Largest output height (default: 1080).
    pub max_height: u32,
    /// Bound on the one-time engine probe.
    pub engine_probe_timeout_secs: u64,
    /// Bound on one transcode run.
    pub transcode_timeout_secs: u64,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            video_crf: 23,
            preset: "veryfast".to_string(),
            audio_bitrate: "128k".to_string(),
            max_width: 1920,
            max_height: 1080,
            engine_probe_timeout_secs: 10,
            transcode_timeout_secs: 1800,
        }
    }
}

/// A probed, usable encoder.
#[derive(Debug, Clone)]
pub struct TranscodeEngine {
    pub path: PathBuf,
    pub version: String,
}

/// Outcome of a successful transcode.
#[derive(Debug, Clone, Serialize)]
pub struct TranscodeReport {
    pub output: PathBuf,
    /// Whether the silent audio track made it into the output.
    pub with_audio: bool,
    /// Whether a trim window was applied.
    pub trimmed: bool,
}

/// Lazily-initialized ffmpeg front end.
#[derive(Debug)]
pub struct Transcoder {
    ffmpeg: Option<PathBuf>,
    settings: EncodeSettings,
    engine: OnceCell<std::result::Result<TranscodeEngine, String>>,
}

impl Transcoder {
    /// Create a transcoder for the given ffmpeg location.
    ///
    /// `None` means the encoder is not installed; every conversion then fails
    /// with [`Error::ToolNotFound`].
    pub fn new(ffmpeg: Option<PathBuf>, settings: EncodeSettings) -> Self {
        Self {
            ffmpeg,
            settings,
            engine: OnceCell::new(),
        }
    }

    pub fn settings(&self) -> &EncodeSettings {
        &self.settings
    }

    /// Load the engine on first use and return it.
    pub async fn engine(&self) -> Result<&TranscodeEngine> {
        let loaded = self
            .engine
            .get_or_init(|| async {
                match self.probe().await {
                    Ok(engine) => {
                        tracing::info!("Transcoding engine ready: {}", engine.version);
                        Ok(engine)
                    }
                    Err(e) => {
                        tracing::error!("Transcoding engine unavailable: {}", e);
                        Err(e.to_string())
                    }
                }
            })
            .await;

        match loaded {
            Ok(engine) => Ok(engine),
            Err(_) if self.ffmpeg.is_none() => Err(Error::tool_not_found(crate::tools::FFMPEG)),
            Err(message) => Err(Error::tool_failed(crate::tools::FFMPEG, message.clone())),
        }
    }

    async fn probe(&self) -> Result<TranscodeEngine> {
        let path = self
            .ffmpeg
            .clone()
            .ok_or_else(|| Error::tool_not_found(crate::tools::FFMPEG))?;

        let output = ToolCommand::new(path.clone())
            .args(["-hide_banner", "-version"])
            .timeout(Duration::from_secs(self.settings.engine_probe_timeout_secs))
            .execute()
            .await?;

        let version = output
            .stdout
            .lines()
            .next()
            .unwrap_or("ffmpeg")
            .trim()
            .to_string();

        Ok(TranscodeEngine { path, version })
    }

    /// Transcode the MJPEG file at `input` into an MP4 at `output`.
    ///
    /// A failure caused by the audio track is retried once without audio.
    pub async fn transcode(
        &self,
        input: &Path,
        clip: &RawClip,
        trim: TrimWindow,
        output: &Path,
    ) -> Result<TranscodeReport> {
        if clip.is_empty() {
            return Err(Error::InvalidInput("recording has no frames".to_string()));
        }

        let engine = self.engine().await?;
        let trimmed = trim.is_narrower_than(clip.duration());

        match self.run(engine, input, clip, trim, output, true).await {
            Ok(()) => Ok(TranscodeReport {
                output: output.to_path_buf(),
                with_audio: true,
                trimmed,
            }),
            Err(Error::ToolFailed { message, .. }) if is_audio_failure(&message) => {
                tracing::warn!("Audio muxing failed, retrying without audio: {}", message);
                self.run(engine, input, clip, trim, output, false)
                    .await
                    .map_err(|e| Error::Transcode {
                        message: e.to_string(),
                        audio_related: false,
                    })?;
                Ok(TranscodeReport {
                    output: output.to_path_buf(),
                    with_audio: false,
                    trimmed,
                })
            }
            Err(Error::ToolFailed { message, .. }) => Err(Error::Transcode {
                message,
                audio_related: false,
            }),
            Err(e) => Err(e),
        }
    }

    async fn run(
        &self,
        engine: &TranscodeEngine,
        input: &Path,
        clip: &RawClip,
        trim: TrimWindow,
        output: &Path,
        with_audio: bool,
    ) -> Result<()> {
        let args = build_args(input, output, clip, trim, with_audio, &self.settings);
        tracing::debug!("FFmpeg args: {:?}", args);

        ToolCommand::new(engine.path.clone())
            .args(args)
            .timeout(Duration::from_secs(self.settings.transcode_timeout_secs))
            .execute()
            .await?;

        if !output.exists() {
            return Err(Error::file_not_found(output));
        }
        Ok(())
    }
}

/// Build the ffmpeg argument list for one conversion.
pub fn build_args(
    input: &Path,
    output: &Path,
    clip: &RawClip,
    trim: TrimWindow,
    with_audio: bool,
    settings: &EncodeSettings,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-f".into(),
        "mjpeg".into(),
        "-framerate".into(),
        clip.frame_rate.to_string(),
        "-i".into(),
        input.to_string_lossy().to_string(),
    ];

    if with_audio {
        args.extend([
            "-f".to_string(),
            "lavfi".to_string(),
            "-i".to_string(),
            "anullsrc=channel_layout=stereo:sample_rate=44100".to_string(),
        ]);
    }

    if trim.is_narrower_than(clip.duration()) {
        args.extend([
            "-ss".to_string(),
            format!("{:.3}", trim.start),
            "-to".to_string(),
            format!("{:.3}", trim.end),
        ]);
    }

    args.extend(["-map".to_string(), "0:v:0".to_string()]);
    if with_audio {
        args.extend(["-map".to_string(), "1:a:0".to_string()]);
    }

    // Scale down if needed, keeping dimensions even for yuv420p
    args.extend([
        "-vf".to_string(),
        format!(
            "scale='min({},iw)':'min({},ih)':force_original_aspect_ratio=decrease:force_divisible_by=2",
            settings.max_width, settings.max_height
        ),
    ]);

    args.extend([
        "-c:v".to_string(),
        "libx264".to_string(),
        "-crf".to_string(),
        settings.video_crf.to_string(),
        "-preset".to_string(),
        settings.preset.clone(),
        "-profile:v".to_string(),
        "high".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
    ]);

    if with_audio {
        args.extend([
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            settings.audio_bitrate.clone(),
            "-shortest".to_string(),
        ]);
    } else {
        args.push("-an".to_string());
    }

    args.extend([
        "-movflags".to_string(),
        "+faststart".to_string(),
        "-y".to_string(),
        output.to_string_lossy().to_string(),
    ]);

    args
}

/// Whether an ffmpeg error message points at the audio track.
pub fn is_audio_failure(message: &str) -> bool {
    const MARKERS: &[&str] = &["anullsrc", "lavfi", "aac", "audio", "stream #1:"];
    let lower = message.to_ascii_lowercase();
    MARKERS.iter().any(|m| lower.contains(m))
}
