//! Top-level configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::atlas::AtlasConfig;
use crate::core::Result;
use crate::lod::LodConfig;

/// Corridor placement of the cards
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Card quad width in world units
    pub card_width: f32,
    /// Card quad height in world units
    pub card_height: f32,
    /// Distance of each wall from the corridor centre line
    pub side_offset: f32,
    /// Distance along -Z between consecutive pairs
    pub spacing: f32,
    /// Height of the card centres
    pub height: f32,
    /// Z of the first pair
    pub start_z: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            card_width: 3.0,
            card_height: 2.0,
            side_offset: 3.0,
            spacing: 4.0,
            height: 1.6,
            start_z: -4.0,
        }
    }
}

/// Everything the coordinator needs
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PalaceConfig {
    pub atlas: AtlasConfig,
    pub lod: LodConfig,
    pub layout: LayoutConfig,
    /// Tile size multiplier for the single retry after an atlas overflow
    pub retry_tile_scale: f32,
}

impl Default for PalaceConfig {
    fn default() -> Self {
        Self {
            atlas: AtlasConfig::default(),
            lod: LodConfig::default(),
            layout: LayoutConfig::default(),
            retry_tile_scale: 0.5,
        }
    }
}

impl PalaceConfig {
    /// Parse a JSON document; missing fields keep their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a JSON file (sync)
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Save as pretty JSON (sync)
    pub fn save_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Error;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = PalaceConfig::from_json_str(
            r#"{ "atlas": { "tile_width": 512 }, "lod": { "update_interval": 2 } }"#,
        )
        .unwrap();
        assert_eq!(config.atlas.tile_width, 512);
        assert_eq!(config.atlas.tile_height, 384);
        assert_eq!(config.atlas.packer.max_size, 8192);
        assert_eq!(config.lod.update_interval, 2);
        assert_eq!(config.lod.distances, [5.0, 15.0]);
        assert_eq!(config.layout, LayoutConfig::default());
        assert_eq!(config.retry_tile_scale, 0.5);
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("palace.json");

        let mut config = PalaceConfig::default();
        config.layout.spacing = 6.0;
        config.atlas.packer.allow_shrink = false;
        config.save_json_file(&path).unwrap();

        assert_eq!(PalaceConfig::from_json_file(&path).unwrap(), config);
    }

    #[test]
    fn test_bad_input_errors() {
        assert!(matches!(PalaceConfig::from_json_str("{ nope"), Err(Error::Config(_))));
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            PalaceConfig::from_json_file(dir.path().join("missing.json")),
            Err(Error::Io(_))
        ));
    }
}
