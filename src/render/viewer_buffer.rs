//! GPU uniform buffer for viewer data

use bytemuck::{Pod, Zeroable};
use crate::core::Viewer;

/// Viewer uniform data for GPU (must match shader struct exactly)
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ViewerUniform {
    /// View-projection matrix (64 bytes, offset 0)
    pub view_proj: [[f32; 4]; 4],
    /// Viewer position in world space (12 bytes, offset 64)
    pub position: [f32; 3],
    /// Padding to 80 bytes for vec3 alignment (4 bytes, offset 76)
    pub _pad: f32,
}

impl ViewerUniform {
    pub fn from_viewer<V: Viewer>(viewer: &V) -> Self {
        Self {
            view_proj: viewer.view_projection().to_cols_array_2d(),
            position: viewer.position().to_array(),
            _pad: 0.0,
        }
    }
}

impl Default for ViewerUniform {
    fn default() -> Self {
        Self {
            view_proj: glam::Mat4::IDENTITY.to_cols_array_2d(),
            position: [0.0; 3],
            _pad: 0.0,
        }
    }
}

/// GPU buffer for the viewer uniform
pub struct ViewerBuffer {
    buffer: wgpu::Buffer,
    bind_group_layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
}

impl ViewerBuffer {
    pub fn new(device: &wgpu::Device) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("viewer_uniform"),
            size: std::mem::size_of::<ViewerUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("viewer_bind_group_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("viewer_bind_group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });

        Self {
            buffer,
            bind_group_layout,
            bind_group,
        }
    }

    /// Upload the viewer's current matrices
    pub fn update<V: Viewer>(&self, queue: &wgpu::Queue, viewer: &V) {
        let uniform = ViewerUniform::from_viewer(viewer);
        queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(&uniform));
    }

    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Camera;

    #[test]
    fn test_uniform_size() {
        // Must be exactly 80 bytes to match WGSL struct layout
        let size = std::mem::size_of::<ViewerUniform>();
        assert_eq!(size, 80, "ViewerUniform must be exactly 80 bytes, got {} bytes", size);
    }

    #[test]
    fn test_from_viewer() {
        let camera = Camera::default();
        let uniform = ViewerUniform::from_viewer(&camera);
        assert_eq!(uniform.position, camera.position.to_array());
        assert_eq!(uniform.view_proj, camera.view_projection().to_cols_array_2d());
    }
}
