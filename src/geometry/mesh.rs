//! CPU mesh data shared by instanced batches

use bytemuck::{Pod, Zeroable};

use crate::core::types::Vec3;
use crate::math::Aabb;

/// Mesh vertex (must match the card shader's vertex inputs)
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    /// Mesh-local uv, (0,0) at the bottom-left corner
    pub uv: [f32; 2],
}

/// Immutable indexed triangle mesh
#[derive(Clone, Debug)]
pub struct Mesh {
    vertices: Vec<Vertex>,
    indices: Vec<u16>,
    bounds: Aabb,
}

impl Mesh {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u16>) -> Self {
        let bounds = Aabb::from_points(vertices.iter().map(|v| Vec3::from_array(v.position)))
            .unwrap_or_default();
        Self { vertices, indices, bounds }
    }

    /// Upright `width x height` quad centered on the origin, facing +Z
    pub fn quad(width: f32, height: f32) -> Self {
        let (hw, hh) = (width * 0.5, height * 0.5);
        let normal = [0.0, 0.0, 1.0];
        let vertices = vec![
            Vertex { position: [-hw, -hh, 0.0], normal, uv: [0.0, 0.0] },
            Vertex { position: [hw, -hh, 0.0], normal, uv: [1.0, 0.0] },
            Vertex { position: [hw, hh, 0.0], normal, uv: [1.0, 1.0] },
            Vertex { position: [-hw, hh, 0.0], normal, uv: [0.0, 1.0] },
        ];
        Self::new(vertices, vec![0, 1, 2, 0, 2, 3])
    }

    /// Flat `width x depth` plane on y = 0, facing +Y
    pub fn floor_plane(width: f32, depth: f32) -> Self {
        let (hw, hd) = (width * 0.5, depth * 0.5);
        let normal = [0.0, 1.0, 0.0];
        let vertices = vec![
            Vertex { position: [-hw, 0.0, hd], normal, uv: [0.0, 0.0] },
            Vertex { position: [hw, 0.0, hd], normal, uv: [1.0, 0.0] },
            Vertex { position: [hw, 0.0, -hd], normal, uv: [1.0, 1.0] },
            Vertex { position: [-hw, 0.0, -hd], normal, uv: [0.0, 1.0] },
        ];
        Self::new(vertices, vec![0, 1, 2, 0, 2, 3])
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u16] {
        &self.indices
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Triangles as world-space-free corner triples
    pub fn triangles(&self) -> impl Iterator<Item = [Vec3; 3]> + '_ {
        self.indices.chunks_exact(3).map(|tri| {
            let p = |i: u16| Vec3::from_array(self.vertices[i as usize].position);
            [p(tri[0]), p(tri[1]), p(tri[2])]
        })
    }
}
