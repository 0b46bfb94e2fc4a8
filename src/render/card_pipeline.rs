//! Instanced card pipeline and the GPU mirror of a render group
//!
//! One pipeline, one atlas texture, one draw call per batch. The CPU side
//! ([`InstancedRenderGroup`]) owns the truth; [`CardBatchGpu::sync`] copies
//! only the ranges it has flushed since the last frame.

use std::ops::Range;

use crate::core::{Error, Result};
use crate::geometry::Vertex;
use crate::instancing::{DirtyRange, InstanceTransform, InstanceUv, InstancedRenderGroup};
use super::viewer_buffer::ViewerBuffer;

/// Per-vertex attributes, locations 0-2
const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
    0 => Float32x3,
    1 => Float32x3,
    2 => Float32x2,
];

/// Model matrix columns, locations 3-6
const TRANSFORM_ATTRIBUTES: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
    3 => Float32x4,
    4 => Float32x4,
    5 => Float32x4,
    6 => Float32x4,
];

/// Atlas rectangle, location 7
const UV_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![7 => Float32x4];

/// Vertex buffer layouts in slot order: mesh, transforms, uv rects
pub fn vertex_layouts() -> [wgpu::VertexBufferLayout<'static>; 3] {
    [
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &VERTEX_ATTRIBUTES,
        },
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<InstanceTransform>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &TRANSFORM_ATTRIBUTES,
        },
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<InstanceUv>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &UV_ATTRIBUTES,
        },
    ]
}

/// Byte offset and element range for one dirty span of a `T` buffer
fn byte_span<T>(range: &DirtyRange) -> (wgpu::BufferAddress, Range<usize>) {
    let offset = (range.start * std::mem::size_of::<T>()) as wgpu::BufferAddress;
    (offset, range.as_range())
}

/// Index data padded to the 4-byte copy alignment
fn aligned_indices(indices: &[u16]) -> Vec<u16> {
    let mut padded = indices.to_vec();
    if padded.len() % 2 != 0 {
        padded.push(0);
    }
    padded
}

/// Render pipeline for instanced card quads
pub struct CardPipeline {
    pipeline: wgpu::RenderPipeline,
    atlas_bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
}

impl CardPipeline {
    pub fn new(
        device: &wgpu::Device,
        viewer: &ViewerBuffer,
        surface_format: wgpu::TextureFormat,
        depth_format: wgpu::TextureFormat,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("card_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../shaders/card.wgsl").into()),
        });

        let atlas_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("atlas_bind_group_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("card_pipeline_layout"),
            bind_group_layouts: &[viewer.bind_group_layout(), &atlas_bind_group_layout],
            immediate_size: 0,
        });

        // Clamp so neighbouring tiles never bleed in at rect edges
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("atlas_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let buffers = vertex_layouts();
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("card_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &buffers,
                compilation_options: Default::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                // Cards are visible from both sides of the corridor
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: depth_format,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            multiview_mask: None,
            cache: None,
        });

        Self {
            pipeline,
            atlas_bind_group_layout,
            sampler,
        }
    }

    /// Clear `target` and draw `batch` into it
    pub fn render(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        depth: &wgpu::TextureView,
        viewer: &ViewerBuffer,
        batch: &CardBatchGpu,
        clear: wgpu::Color,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("card_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        batch.draw(&mut pass, self, viewer);
    }
}

/// GPU copy of one [`InstancedRenderGroup`]
pub struct CardBatchGpu {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    transform_buffer: wgpu::Buffer,
    uv_buffer: wgpu::Buffer,
    instance_count: u32,
    atlas_bind_group: wgpu::BindGroup,
    atlas_size: u32,
}

impl CardBatchGpu {
    /// Upload mesh, atlas texture and both instance buffers of `group`
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        pipeline: &CardPipeline,
        group: &mut InstancedRenderGroup,
    ) -> Result<Self> {
        let (Some(geometry), Some(atlas)) = (group.geometry(), group.atlas()) else {
            return Err(Error::NotInitialized);
        };
        let mesh = geometry.mesh();

        let max_texture = device.limits().max_texture_dimension_2d;
        if atlas.size_px() > max_texture {
            return Err(Error::Gpu(format!(
                "Atlas is {}px but the device allows {}px",
                atlas.size_px(),
                max_texture
            )));
        }

        let vertex_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("card_vertices"),
            size: std::mem::size_of_val(mesh.vertices()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        queue.write_buffer(&vertex_buffer, 0, bytemuck::cast_slice(mesh.vertices()));

        let indices = aligned_indices(mesh.indices());
        let index_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("card_indices"),
            size: std::mem::size_of_val(indices.as_slice()) as u64,
            usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        queue.write_buffer(&index_buffer, 0, bytemuck::cast_slice(&indices));

        let count = group.count().max(1);
        let transform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("card_instance_transforms"),
            size: (count * std::mem::size_of::<InstanceTransform>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uv_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("card_instance_uvs"),
            size: (count * std::mem::size_of::<InstanceUv>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let size = atlas.size_px();
        let extent = wgpu::Extent3d {
            width: size,
            height: size,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("card_atlas"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            atlas.raster().as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(size * 4),
                rows_per_image: Some(size),
            },
            extent,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let atlas_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("atlas_bind_group"),
            layout: &pipeline.atlas_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&pipeline.sampler),
                },
            ],
        });

        log::info!(
            "Uploaded card batch: {} instances, {} indices, {}px atlas",
            group.count(),
            mesh.indices().len(),
            size
        );

        let mut batch = Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices().len() as u32,
            transform_buffer,
            uv_buffer,
            instance_count: group.count() as u32,
            atlas_bind_group,
            atlas_size: size,
        };
        // Creation queued a full upload; anything flushed since rides along
        batch.sync(queue, group);
        Ok(batch)
    }

    /// Copy the ranges `group` flushed since the last sync.
    /// Returns the number of bytes written.
    pub fn sync(&mut self, queue: &wgpu::Queue, group: &mut InstancedRenderGroup) -> u64 {
        if group.is_disposed() {
            self.instance_count = 0;
            return 0;
        }

        let uploads = group.take_uploads();
        let mut written = 0;

        if let Some(range) = uploads.transforms {
            let (offset, span) = byte_span::<InstanceTransform>(&range);
            let data: &[u8] = bytemuck::cast_slice(&group.transform_buffer()[span]);
            queue.write_buffer(&self.transform_buffer, offset, data);
            written += data.len() as u64;
        }
        if let Some(range) = uploads.uvs {
            let (offset, span) = byte_span::<InstanceUv>(&range);
            let data: &[u8] = bytemuck::cast_slice(&group.uv_buffer()[span]);
            queue.write_buffer(&self.uv_buffer, offset, data);
            written += data.len() as u64;
        }

        if written > 0 {
            log::trace!("Card batch sync: {} bytes", written);
        }
        written
    }

    /// Record the batch's single draw call
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>, pipeline: &CardPipeline, viewer: &ViewerBuffer) {
        if self.instance_count == 0 {
            return;
        }
        pass.set_pipeline(&pipeline.pipeline);
        pass.set_bind_group(0, viewer.bind_group(), &[]);
        pass.set_bind_group(1, &self.atlas_bind_group, &[]);
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_vertex_buffer(1, self.transform_buffer.slice(..));
        pass.set_vertex_buffer(2, self.uv_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
        pass.draw_indexed(0..self.index_count, 0, 0..self.instance_count);
    }

    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    pub fn atlas_size(&self) -> u32 {
        self.atlas_size
    }
}
