//! Per-card instance state and its GPU-side layouts

use bytemuck::{Pod, Zeroable};

use crate::atlas::UvRect;
use crate::card::CardMetadata;
use crate::core::types::{Mat4, Vec3};
use crate::lod::LodLevel;

/// CPU-side record for one card in the batch
#[derive(Clone, Debug, PartialEq)]
pub struct CardInstance {
    /// Stable slot in the instance buffers
    pub index: usize,
    /// Model matrix as last written (layout pose times LOD scale)
    pub transform: Mat4,
    pub uv: UvRect,
    pub lod_level: LodLevel,
    pub culled: bool,
    pub metadata: CardMetadata,
}

impl CardInstance {
    pub fn new(index: usize, uv: UvRect) -> Self {
        Self {
            index,
            transform: Mat4::IDENTITY,
            uv,
            lod_level: LodLevel::High,
            culled: false,
            metadata: CardMetadata::default(),
        }
    }

    /// World position (translation column)
    pub fn position(&self) -> Vec3 {
        self.transform.w_axis.truncate()
    }
}

/// Per-instance model matrix, column-major (64 bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct InstanceTransform {
    pub model: [[f32; 4]; 4],
}

impl InstanceTransform {
    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.model)
    }
}

impl From<Mat4> for InstanceTransform {
    fn from(matrix: Mat4) -> Self {
        Self { model: matrix.to_cols_array_2d() }
    }
}

/// Per-instance atlas rectangle: `[u_min, v_min, width, height]` (16 bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct InstanceUv {
    pub offset: [f32; 4],
}

impl From<UvRect> for InstanceUv {
    fn from(uv: UvRect) -> Self {
        Self { offset: uv.to_offset() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_layout_sizes() {
        assert_eq!(std::mem::size_of::<InstanceTransform>(), 64);
        assert_eq!(std::mem::size_of::<InstanceUv>(), 16);
    }

    #[test]
    fn test_transform_round_trip() {
        let m = Mat4::from_scale_rotation_translation(
            Vec3::splat(0.9),
            glam::Quat::from_rotation_y(1.0),
            Vec3::new(-3.0, 1.6, -8.0),
        );
        let raw = InstanceTransform::from(m);
        assert_eq!(raw.to_mat4(), m);
    }

    #[test]
    fn test_position_reads_translation() {
        let mut instance = CardInstance::new(0, UvRect::FULL);
        instance.transform = Mat4::from_translation(Vec3::new(3.0, 1.6, -12.0)) * Mat4::from_scale(Vec3::ZERO);
        assert_eq!(instance.position(), Vec3::new(3.0, 1.6, -12.0));
    }
}
