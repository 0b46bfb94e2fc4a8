//! Atlas raster surface and normalized UV rectangles

use image::RgbaImage;

use crate::core::types::Vec2;
use super::packer::PackedRect;

/// The composited atlas: one square power-of-two RGBA raster
#[derive(Clone, Debug)]
pub struct AtlasSurface {
    size_px: u32,
    raster: RgbaImage,
}

impl AtlasSurface {
    /// Allocate a transparent surface
    pub fn new(size_px: u32) -> Self {
        Self {
            size_px,
            raster: RgbaImage::new(size_px, size_px),
        }
    }

    pub fn size_px(&self) -> u32 {
        self.size_px
    }

    pub fn raster(&self) -> &RgbaImage {
        &self.raster
    }

    pub(crate) fn raster_mut(&mut self) -> &mut RgbaImage {
        &mut self.raster
    }

    /// Bytes held by the raster
    pub fn byte_size(&self) -> usize {
        self.raster.as_raw().len()
    }
}

/// Normalized [0,1] rectangle locating one tile inside the atlas.
///
/// `v_min` is the top edge in raster row order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UvRect {
    pub u_min: f32,
    pub v_min: f32,
    pub u_max: f32,
    pub v_max: f32,
}

impl UvRect {
    /// Normalize a packed pixel rectangle by the surface size
    pub fn from_packed(rect: &PackedRect, surface_size: u32) -> Self {
        let size = surface_size as f32;
        Self {
            u_min: rect.x as f32 / size,
            v_min: rect.y as f32 / size,
            u_max: (rect.x + rect.width) as f32 / size,
            v_max: (rect.y + rect.height) as f32 / size,
        }
    }

    /// Whole-texture rectangle
    pub const FULL: UvRect = UvRect { u_min: 0.0, v_min: 0.0, u_max: 1.0, v_max: 1.0 };

    pub fn width(&self) -> f32 {
        self.u_max - self.u_min
    }

    pub fn height(&self) -> f32 {
        self.v_max - self.v_min
    }

    /// Per-instance shader attribute: `[u_min, v_min, width, height]`
    pub fn to_offset(&self) -> [f32; 4] {
        [self.u_min, self.v_min, self.width(), self.height()]
    }

    /// Map a mesh-local uv (v up) into atlas space (v down).
    ///
    /// Mirrors the vertex shader: `u' = u_min + u * w`, `v' = v_min + (1 - v) * h`.
    pub fn remap(&self, local: Vec2) -> Vec2 {
        Vec2::new(
            self.u_min + local.x * self.width(),
            self.v_min + (1.0 - local.y) * self.height(),
        )
    }

    /// Back to pixel space: `(x, y, width, height)`
    pub fn to_pixels(&self, surface_size: u32) -> [f32; 4] {
        let size = surface_size as f32;
        [self.u_min * size, self.v_min * size, self.width() * size, self.height() * size]
    }
}
