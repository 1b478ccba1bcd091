//! Rendering context abstraction.
//!
//! The player drives content through a [`RenderSurface`]: navigate it, read
//! the accessible documents, click elements, press keys and grab viewport
//! frames. [`cdp::CdpSurface`] implements it over the Chrome DevTools
//! Protocol.

pub mod cdp;
pub mod launch;
mod scripts;

use crate::navigation::model::{DocumentSnapshot, ElementRef, Key};
use async_trait::async_trait;
use image::RgbaImage;
use scormcast_av::Viewport;
use tokio::sync::broadcast;

pub use cdp::CdpSurface;
pub use launch::{connect, BrowserProcess};

pub type SurfaceResult<T> = std::result::Result<T, SurfaceError>;

/// Errors from the rendering context.
#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("script error: {0}")]
    Script(String),

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("frame capture failed: {0}")]
    Frame(String),

    #[error("rendering context closed")]
    Closed,
}

/// Notification from the rendering context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// A document finished loading.
    Loaded { frame_id: String, root: bool },
    /// The DOM of an accessible document changed.
    Mutated,
    Closed,
}

/// One captured viewport image.
#[derive(Debug, Clone)]
pub struct SurfaceFrame {
    pub image: RgbaImage,
    pub viewport: Viewport,
}

#[async_trait]
pub trait RenderSurface: Send + Sync {
    /// Load `url` in the root document.
    async fn navigate(&self, url: &str) -> SurfaceResult<()>;

    /// Collect the root document and every accessible nested document.
    ///
    /// Documents that cannot be read (cross-origin frames) are left out.
    async fn documents(&self) -> SurfaceResult<Vec<DocumentSnapshot>>;

    /// Dispatch the pointer/mouse/click sequence on an element and call its
    /// native `click()`. Returns `false` if the element no longer exists.
    async fn activate(&self, target: &ElementRef) -> SurfaceResult<bool>;

    /// Start a paused media element. Returns `false` if it did not start.
    async fn play_media(&self, target: &ElementRef) -> SurfaceResult<bool>;

    /// Send key presses to the root document.
    async fn press_keys(&self, keys: &[Key]) -> SurfaceResult<()>;

    /// Capture the visible viewport.
    async fn capture_frame(&self) -> SurfaceResult<SurfaceFrame>;

    /// Load and mutation notifications.
    fn subscribe(&self) -> broadcast::Receiver<SurfaceEvent>;

    async fn close(&self) -> SurfaceResult<()> {
        Ok(())
    }
}
