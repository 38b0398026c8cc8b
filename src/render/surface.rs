//! Drawable surfaces

use image::{Rgba, RgbaImage};

/// Something a rendered page can be drawn onto
pub trait Surface: Send + 'static {
    /// Resize to the viewport; previous contents are discarded
    fn resize(&mut self, width: u32, height: u32);

    fn size(&self) -> (u32, u32);

    /// Replace the surface contents with a finished raster
    fn commit(&mut self, pixels: RgbaImage);
}

/// In-memory RGBA surface
#[derive(Debug, Clone)]
pub struct PixelSurface {
    image: RgbaImage,
    commits: u64,
}

impl PixelSurface {
    pub fn new() -> Self {
        Self {
            image: RgbaImage::new(1, 1),
            commits: 0,
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        self.image.get_pixel_checked(x, y).copied()
    }

    /// Number of rasters committed so far
    pub fn commits(&self) -> u64 {
        self.commits
    }
}

impl Default for PixelSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl Surface for PixelSurface {
    fn resize(&mut self, width: u32, height: u32) {
        if self.image.dimensions() != (width, height) {
            self.image = RgbaImage::new(width, height);
        }
    }

    fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn commit(&mut self, pixels: RgbaImage) {
        if pixels.dimensions() == self.image.dimensions() {
            self.image = pixels;
        } else {
            // Clip or pad to the surface size
            let mut target = RgbaImage::new(self.image.width(), self.image.height());
            image::imageops::replace(&mut target, &pixels, 0, 0);
            self.image = target;
        }
        self.commits += 1;
    }
}
