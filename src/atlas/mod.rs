//! Texture atlas: many card tiles packed into one power-of-two surface

pub mod packer;
pub mod surface;
pub mod tile;
pub mod manager;

pub use packer::{
    AtlasPacker, PackItem, PackResult, PackedRect, PackerConfig,
    choose_surface_size, next_power_of_two, shelf_pack,
};
pub use surface::{AtlasSurface, UvRect};
pub use tile::{
    ImageFileTileSource, ProceduralTileSource, TileError, TileSize, TileSource,
    placeholder_tile,
};
pub use manager::{AtlasConfig, AtlasManager, BuiltAtlas};
