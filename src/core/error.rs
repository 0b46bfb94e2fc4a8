//! Error types for the card corridor renderer

use thiserror::Error;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    /// Tiles cannot fit even the largest allowed atlas after the shrink pass
    #[error(
        "atlas capacity exceeded: {item_count} tiles of {item_width}x{item_height} do not fit a {surface_size}x{surface_size} surface"
    )]
    CapacityExceeded {
        surface_size: u32,
        item_count: usize,
        item_width: u32,
        item_height: u32,
    },

    #[error("instance index {index} out of range (batch has {count} instances)")]
    InstanceOutOfRange { index: usize, count: usize },

    #[error("tile size {width}x{height} has a zero edge")]
    InvalidTileSize { width: u32, height: u32 },

    #[error("card list is empty")]
    EmptyCardList,

    #[error("coordinator is not initialized")]
    NotInitialized,

    #[error("coordinator is already initialized")]
    AlreadyInitialized,

    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}
