//! Shared mesh geometry

pub mod mesh;
pub mod pool;

pub use mesh::{Mesh, Vertex};
pub use pool::{GeometryHandle, GeometryPool, card_quad_key, floor_plane_key};
