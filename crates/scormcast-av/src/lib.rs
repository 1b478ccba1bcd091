//! # scormcast-av
//!
//! Recording and transcoding support for scormcast.
//!
//! This crate provides:
//! - [`DrawingSurface`]: an offscreen canvas that captured viewport frames are
//!   drawn onto and encoded as JPEG
//! - [`RecordingSession`]: the chunked MJPEG stream, elapsed timer and trim
//!   window of one recording
//! - [`Transcoder`]: a lazily probed ffmpeg front end producing H.264/AAC MP4
//! - [`ToolRegistry`] and [`ToolCommand`]: discovery and timed execution of
//!   external programs
//! - [`Workspace`]: temporary storage for artifacts until they are saved
//!
//! ## Example
//!
//! ```no_run
//! use scormcast_av::{EncodeSettings, RecordingSession, Transcoder, Workspace};
//!
//! # async fn example(frames: Vec<bytes::Bytes>) -> scormcast_av::Result<()> {
//! let mut session = RecordingSession::new(5);
//! for frame in frames {
//!     session.push_frame(frame);
//! }
//! let trim = session.close();
//! let clip = session.raw_clip();
//!
//! let workspace = Workspace::new()?;
//! let raw = workspace.temp_file("capture.mjpeg");
//! std::fs::write(&raw, &clip.data)?;
//!
//! let transcoder = Transcoder::new(which::which("ffmpeg").ok(), EncodeSettings::default());
//! let report = transcoder
//!     .transcode(&raw, &clip, trim, &workspace.temp_file("recording.mp4"))
//!     .await?;
//! println!("{}", report.output.display());
//! # Ok(())
//! # }
//! ```

pub mod command;
mod error;
pub mod frame;
pub mod recording;
pub mod tools;
pub mod transcode;
pub mod workspace;

pub use command::{ToolCommand, ToolOutput};
pub use error::{Error, Result};
pub use frame::{decode_frame, DrawingSurface, Viewport, DEFAULT_JPEG_QUALITY};
pub use recording::{
    RawClip, RecordingSession, TrimWindow, DEFAULT_CHUNK_INTERVAL, DEFAULT_FRAME_RATE,
};
pub use tools::{ToolInfo, ToolPaths, ToolRegistry, CHROME, FFMPEG};
pub use transcode::{EncodeSettings, TranscodeEngine, TranscodeReport, Transcoder};
pub use workspace::{dated_file_name, todays_file_name, Workspace};
