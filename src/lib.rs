//! Cardpalace - atlas packing, GPU instancing and LOD for a 3D card corridor

pub mod core;
pub mod math;
pub mod card;
pub mod atlas;
pub mod geometry;
pub mod instancing;
pub mod lod;
pub mod coordinator;
pub mod render;
