//! GPU instancing of card quads

pub mod instance;
pub mod group;

pub use instance::{CardInstance, InstanceTransform, InstanceUv};
pub use group::{DirtyRange, InstanceHit, InstancedRenderGroup, PendingUploads, RenderGroupBuilder};

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::atlas::{AtlasSurface, BuiltAtlas, TileSize, UvRect};
    use crate::geometry::GeometryPool;
    use super::InstancedRenderGroup;

    /// Tiny atlas with one distinct rectangle per instance
    pub(crate) fn test_atlas(count: usize) -> BuiltAtlas {
        let uv_map = (0..count)
            .map(|i| {
                let u = i as f32 / count as f32;
                (i, UvRect { u_min: u, v_min: 0.0, u_max: u + 0.5 / count as f32, v_max: 0.5 })
            })
            .collect();
        BuiltAtlas {
            surface: AtlasSurface::new(16),
            uv_map,
            tile_size: TileSize::new(8, 4),
            scale: 1.0,
            placeholder_count: 0,
        }
    }

    pub(crate) fn test_group(count: usize) -> InstancedRenderGroup {
        let mut pool = GeometryPool::new();
        InstancedRenderGroup::create(count, pool.card_quad(3.0, 2.0), test_atlas(count))
    }
}
