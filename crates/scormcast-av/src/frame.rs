//! Offscreen drawing surface for captured frames.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgb, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default JPEG quality for captured frames.
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Rendered size and scroll offset of the playback surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub scroll_x: u32,
    pub scroll_y: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            scroll_x: 0,
            scroll_y: 0,
        }
    }
}

/// Decode a PNG or JPEG screenshot into RGBA pixels.
pub fn decode_frame(bytes: &[u8]) -> Result<RgbaImage> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

/// Canvas that captured frames are drawn onto before encoding.
///
/// The canvas follows the playback surface's rendered size; a frame with a
/// different viewport size reallocates it.
#[derive(Debug)]
pub struct DrawingSurface {
    canvas: RgbImage,
    quality: u8,
    resizes: u32,
}

impl DrawingSurface {
    /// Create a surface of the given size.
    pub fn new(width: u32, height: u32, quality: u8) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidInput(format!(
                "drawing surface must be non-empty, got {width}x{height}"
            )));
        }
        Ok(Self {
            canvas: RgbImage::from_pixel(width, height, Rgb([255, 255, 255])),
            quality: quality.clamp(1, 100),
            resizes: 0,
        })
    }

    pub fn width(&self) -> u32 {
        self.canvas.width()
    }

    pub fn height(&self) -> u32 {
        self.canvas.height()
    }

    /// Number of times the canvas followed a viewport resize.
    pub fn resizes(&self) -> u32 {
        self.resizes
    }

    /// Draw the visible part of `frame` onto the canvas.
    ///
    /// When `frame` is larger than the viewport (a full-page screenshot), the
    /// region at the viewport's scroll offset is used. Otherwise the frame is
    /// drawn from its origin.
    pub fn draw(&mut self, frame: &RgbaImage, viewport: Viewport) -> Result<()> {
        if viewport.width == 0 || viewport.height == 0 {
            return Err(Error::InvalidInput("viewport has zero size".to_string()));
        }

        if (viewport.width, viewport.height) != self.canvas.dimensions() {
            tracing::debug!(
                "Drawing surface resized {}x{} -> {}x{}",
                self.canvas.width(),
                self.canvas.height(),
                viewport.width,
                viewport.height
            );
            self.canvas = RgbImage::new(viewport.width, viewport.height);
            self.resizes += 1;
        }

        for pixel in self.canvas.pixels_mut() {
            *pixel = Rgb([255, 255, 255]);
        }

        let fits_scrolled = frame.width() >= viewport.scroll_x + viewport.width
            && frame.height() >= viewport.scroll_y + viewport.height
            && (frame.width() > viewport.width || frame.height() > viewport.height);
        let (x, y) = if fits_scrolled {
            (viewport.scroll_x, viewport.scroll_y)
        } else {
            (0, 0)
        };

        let w = viewport.width.min(frame.width().saturating_sub(x));
        let h = viewport.height.min(frame.height().saturating_sub(y));
        if w == 0 || h == 0 {
            return Ok(());
        }

        let region = image::imageops::crop_imm(frame, x, y, w, h).to_image();
        let region = DynamicImage::ImageRgba8(region).to_rgb8();
        image::imageops::replace(&mut self.canvas, &region, 0, 0);
        Ok(())
    }

    /// Encode the current canvas as one JPEG image.
    pub fn encode_jpeg(&self) -> Result<Bytes> {
        let mut buf = Vec::with_capacity(64 * 1024);
        self.canvas
            .write_with_encoder(JpegEncoder::new_with_quality(&mut buf, self.quality))?;
        Ok(Bytes::from(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(width: u32, height: u32, color: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba(color))
    }

    #[test]
    fn rejects_empty_surface() {
        assert!(DrawingSurface::new(0, 10, 80).is_err());
    }

    #[test]
    fn draw_and_encode_jpeg() {
        let mut surface = DrawingSurface::new(32, 16, 80).unwrap();
        surface
            .draw(&solid(32, 16, [200, 10, 10, 255]), Viewport::new(32, 16))
            .unwrap();
        let jpeg = surface.encode_jpeg().unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let decoded = decode_frame(&jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (32, 16));
        let px = decoded.get_pixel(16, 8);
        assert!(px[0] > 150 && px[1] < 60);
    }

    #[test]
    fn canvas_tracks_viewport_resize() {
        let mut surface = DrawingSurface::new(32, 16, 80).unwrap();
        surface
            .draw(&solid(48, 24, [0, 0, 0, 255]), Viewport::new(48, 24))
            .unwrap();
        assert_eq!((surface.width(), surface.height()), (48, 24));
        assert_eq!(surface.resizes(), 1);
    }

    #[test]
    fn full_page_frame_cropped_at_scroll_offset() {
        // Top half black, bottom half white.
        let mut page = solid(20, 40, [0, 0, 0, 255]);
        for y in 20..40 {
            for x in 0..20 {
                page.put_pixel(x, y, Rgba([255, 255, 255, 255]));
            }
        }

        let mut surface = DrawingSurface::new(20, 20, 90).unwrap();
        let viewport = Viewport {
            width: 20,
            height: 20,
            scroll_x: 0,
            scroll_y: 20,
        };
        surface.draw(&page, viewport).unwrap();
        assert_eq!(surface.canvas.get_pixel(10, 10), &Rgb([255, 255, 255]));

        surface.draw(&page, Viewport::new(20, 20)).unwrap();
        assert_eq!(surface.canvas.get_pixel(10, 10), &Rgb([0, 0, 0]));
    }

    #[test]
    fn smaller_frame_leaves_background() {
        let mut surface = DrawingSurface::new(20, 20, 90).unwrap();
        surface
            .draw(&solid(10, 10, [0, 0, 0, 255]), Viewport::new(20, 20))
            .unwrap();
        assert_eq!(surface.canvas.get_pixel(5, 5), &Rgb([0, 0, 0]));
        assert_eq!(surface.canvas.get_pixel(15, 15), &Rgb([255, 255, 255]));
    }
}
