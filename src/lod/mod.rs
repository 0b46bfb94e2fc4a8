//! Distance-based level of detail and frustum culling for instanced cards

pub mod config;
pub mod system;

pub use config::{LodConfig, LodLevel, LOD_DISTANCES, LOD_SCALES};
pub use system::{LodStats, LodSystem};
