//! Atlas build: render tiles, pack them, composite one surface

use std::collections::BTreeMap;
use std::time::Duration;

use image::{RgbaImage, imageops};
use serde::{Deserialize, Serialize};

use crate::card::CardSource;
use crate::core::{Error, Result};
use super::packer::{AtlasPacker, PackItem, PackerConfig};
use super::surface::{AtlasSurface, UvRect};
use super::tile::{TileError, TileSize, TileSource, conform_tile, placeholder_tile};

/// Atlas build settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasConfig {
    /// Requested tile width in pixels
    pub tile_width: u32,
    /// Requested tile height in pixels
    pub tile_height: u32,
    /// Per-tile render budget in milliseconds; 0 waits forever
    pub tile_timeout_ms: u64,
    pub packer: PackerConfig,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            tile_width: 768,
            tile_height: 384,
            tile_timeout_ms: 5000,
            packer: PackerConfig::default(),
        }
    }
}

impl AtlasConfig {
    pub fn tile_size(&self) -> TileSize {
        TileSize::new(self.tile_width, self.tile_height)
    }
}

/// Result of a completed build, ready to hand to a render group
#[derive(Debug)]
pub struct BuiltAtlas {
    pub surface: AtlasSurface,
    /// Card index -> tile rectangle
    pub uv_map: BTreeMap<usize, UvRect>,
    /// Tile size that was requested from the source
    pub tile_size: TileSize,
    /// Shrink applied by the packer (1.0 if none)
    pub scale: f32,
    /// Number of tiles replaced by placeholders
    pub placeholder_count: usize,
}

/// Builds card atlases.
///
/// A build takes `&self` and owns all of its intermediate state, so two
/// builds never share a surface.
#[derive(Clone, Debug, Default)]
pub struct AtlasManager {
    config: AtlasConfig,
    packer: AtlasPacker,
}

impl AtlasManager {
    pub fn new(config: AtlasConfig) -> Self {
        let packer = AtlasPacker::new(config.packer.clone());
        Self { config, packer }
    }

    pub fn config(&self) -> &AtlasConfig {
        &self.config
    }

    /// Build with the configured tile size
    pub async fn build_atlas<S: TileSource>(&self, source: &S, cards: &[CardSource]) -> Result<BuiltAtlas> {
        self.build_atlas_with_tile_size(source, cards, self.config.tile_size()).await
    }

    /// Build with an explicit tile size.
    ///
    /// Tiles that fail or time out become placeholders. Fails only when the
    /// card list is empty, a tile edge is zero, or the packer runs out of room.
    pub async fn build_atlas_with_tile_size<S: TileSource>(
        &self,
        source: &S,
        cards: &[CardSource],
        tile_size: TileSize,
    ) -> Result<BuiltAtlas> {
        if cards.is_empty() {
            return Err(Error::EmptyCardList);
        }
        if tile_size.width == 0 || tile_size.height == 0 {
            return Err(Error::InvalidTileSize { width: tile_size.width, height: tile_size.height });
        }

        let mut tiles = Vec::with_capacity(cards.len());
        let mut placeholder_count = 0;
        for (index, card) in cards.iter().enumerate() {
            match self.render_one(source, card, tile_size).await {
                Ok(tile) => tiles.push(conform_tile(tile, tile_size)),
                Err(e) => {
                    log::warn!("Tile {} ('{}') unavailable, using placeholder: {}", index, card.word, e);
                    placeholder_count += 1;
                    tiles.push(placeholder_tile(tile_size));
                }
            }
        }

        let items: Vec<PackItem> = tiles
            .iter()
            .enumerate()
            .map(|(index, tile)| PackItem::new(index, tile.width(), tile.height()))
            .collect();

        // On failure the tiles are dropped with this frame
        let packed = self.packer.pack(&items)?;

        let mut surface = AtlasSurface::new(packed.surface_size);
        for rect in &packed.rects {
            let tile = &tiles[rect.index];
            if tile.dimensions() == (rect.width, rect.height) {
                imageops::replace(surface.raster_mut(), tile, rect.x as i64, rect.y as i64);
            } else {
                let shrunk: RgbaImage =
                    imageops::resize(tile, rect.width, rect.height, imageops::FilterType::Triangle);
                imageops::replace(surface.raster_mut(), &shrunk, rect.x as i64, rect.y as i64);
            }
        }
        drop(tiles);

        let uv_map = packed
            .rects
            .iter()
            .map(|rect| (rect.index, UvRect::from_packed(rect, packed.surface_size)))
            .collect();

        log::info!(
            "Built atlas: {} cards, {}px surface, scale {:.3}, {} placeholders",
            cards.len(),
            packed.surface_size,
            packed.scale,
            placeholder_count
        );

        Ok(BuiltAtlas {
            surface,
            uv_map,
            tile_size,
            scale: packed.scale,
            placeholder_count,
        })
    }

    async fn render_one<S: TileSource>(
        &self,
        source: &S,
        card: &CardSource,
        size: TileSize,
    ) -> std::result::Result<RgbaImage, TileError> {
        if self.config.tile_timeout_ms == 0 {
            return source.render_tile(card, size).await;
        }
        let budget = Duration::from_millis(self.config.tile_timeout_ms);
        match tokio::time::timeout(budget, source.render_tile(card, size)).await {
            Ok(result) => result,
            Err(_) => Err(TileError::Timeout(budget)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;

    use image::Rgba;

    use super::*;
    use crate::atlas::tile::ProceduralTileSource;

    fn cards(count: usize) -> Vec<CardSource> {
        (0..count).map(|i| CardSource::new(format!("word{}", i), format!("слово{}", i))).collect()
    }

    fn small_config() -> AtlasConfig {
        AtlasConfig {
            tile_width: 64,
            tile_height: 32,
            tile_timeout_ms: 50,
            packer: PackerConfig { target_size: 128, max_size: 1024, ..Default::default() },
        }
    }

    /// Fails every odd card
    struct FlakySource;

    impl TileSource for FlakySource {
        fn render_tile(&self, card: &CardSource, size: TileSize) -> impl Future<Output = std::result::Result<RgbaImage, TileError>> {
            let odd = card.word.ends_with(['1', '3', '5', '7', '9']);
            let tile = ProceduralTileSource::draw(card, size);
            async move {
                if odd { Err(TileError::Unavailable("render failed".into())) } else { Ok(tile) }
            }
        }
    }

    struct HangingSource;

    impl TileSource for HangingSource {
        fn render_tile(&self, _card: &CardSource, _size: TileSize) -> impl Future<Output = std::result::Result<RgbaImage, TileError>> {
            std::future::pending()
        }
    }

    /// Ignores the requested size
    struct OversizeSource;

    impl TileSource for OversizeSource {
        fn render_tile(&self, _card: &CardSource, _size: TileSize) -> impl Future<Output = std::result::Result<RgbaImage, TileError>> {
            std::future::ready(Ok(RgbaImage::from_pixel(200, 200, Rgba([0, 0, 255, 255]))))
        }
    }

    #[tokio::test]
    async fn test_twenty_five_full_size_cards() {
        let manager = AtlasManager::default();
        let atlas = manager.build_atlas(&ProceduralTileSource, &cards(25)).await.unwrap();
        assert_eq!(atlas.surface.size_px(), 4096);
        assert_eq!(atlas.uv_map.len(), 25);
        assert_eq!(atlas.scale, 1.0);
        assert_eq!(atlas.placeholder_count, 0);
        for uv in atlas.uv_map.values() {
            assert!(uv.u_min < uv.u_max && uv.v_min < uv.v_max);
            assert!(uv.u_max <= 1.0 && uv.v_max <= 1.0);
        }
    }

    #[tokio::test]
    async fn test_tiles_land_where_uv_points() {
        let config = small_config();
        let manager = AtlasManager::new(config.clone());
        let deck = cards(6);
        let atlas = manager.build_atlas(&ProceduralTileSource, &deck).await.unwrap();
        let size = atlas.surface.size_px();

        for (index, uv) in &atlas.uv_map {
            let expected = ProceduralTileSource::draw(&deck[*index], config.tile_size());
            let [x, y, _, _] = uv.to_pixels(size);
            // A pixel inside the accent band and the top-left frame pixel
            for (tx, ty) in [(10, 2), (0, 0), (32, 20)] {
                assert_eq!(
                    atlas.surface.raster().get_pixel(x as u32 + tx, y as u32 + ty),
                    expected.get_pixel(tx, ty)
                );
            }
        }
    }

    #[tokio::test]
    async fn test_failed_tiles_become_placeholders() {
        let manager = AtlasManager::new(small_config());
        let atlas = manager.build_atlas(&FlakySource, &cards(6)).await.unwrap();
        assert_eq!(atlas.uv_map.len(), 6);
        assert_eq!(atlas.placeholder_count, 3);
    }

    #[tokio::test]
    async fn test_hanging_tiles_time_out() {
        let manager = AtlasManager::new(small_config());
        let atlas = manager.build_atlas(&HangingSource, &cards(2)).await.unwrap();
        assert_eq!(atlas.placeholder_count, 2);
        assert_eq!(atlas.uv_map.len(), 2);
    }

    #[tokio::test]
    async fn test_wrong_sized_tiles_are_conformed() {
        let manager = AtlasManager::new(small_config());
        let atlas = manager.build_atlas(&OversizeSource, &cards(3)).await.unwrap();
        let size = atlas.surface.size_px();
        for uv in atlas.uv_map.values() {
            let [_, _, w, h] = uv.to_pixels(size);
            assert!((w - 64.0).abs() < 1e-3 && (h - 32.0).abs() < 1e-3);
        }
    }

    #[tokio::test]
    async fn test_empty_card_list() {
        let manager = AtlasManager::default();
        let result = manager.build_atlas(&ProceduralTileSource, &[]).await;
        assert!(matches!(result, Err(Error::EmptyCardList)));
    }

    #[tokio::test]
    async fn test_zero_tile_edge_is_rejected() {
        let manager = AtlasManager::new(AtlasConfig { tile_width: 0, ..small_config() });
        let result = manager.build_atlas(&ProceduralTileSource, &cards(1)).await;
        assert!(matches!(result, Err(Error::InvalidTileSize { width: 0, height: 32 })));

        let manager = AtlasManager::new(small_config());
        let result = manager
            .build_atlas_with_tile_size(&ProceduralTileSource, &cards(1), TileSize::new(64, 0))
            .await;
        assert!(matches!(result, Err(Error::InvalidTileSize { width: 64, height: 0 })));
    }

    #[tokio::test]
    async fn test_capacity_failure_is_descriptive() {
        let manager = AtlasManager::new(AtlasConfig {
            tile_width: 200,
            tile_height: 200,
            tile_timeout_ms: 0,
            packer: PackerConfig { target_size: 256, max_size: 256, allow_shrink: false, ..Default::default() },
        });
        match manager.build_atlas(&ProceduralTileSource, &cards(4)).await {
            Err(Error::CapacityExceeded { surface_size, item_count, item_width, item_height }) => {
                assert_eq!((surface_size, item_count, item_width, item_height), (256, 4, 200, 200));
            }
            other => panic!("expected CapacityExceeded, got {:?}", other.map(|a| a.uv_map.len())),
        }
    }

    #[tokio::test]
    async fn test_shrunk_atlas_scales_placements() {
        let manager = AtlasManager::new(AtlasConfig {
            tile_width: 200,
            tile_height: 200,
            tile_timeout_ms: 0,
            packer: PackerConfig { padding: 0, target_size: 256, max_size: 256, allow_shrink: true, ..Default::default() },
        });
        let atlas = manager.build_atlas(&ProceduralTileSource, &cards(4)).await.unwrap();
        assert!(atlas.scale < 1.0);
        assert_eq!(atlas.surface.size_px(), 256);
        assert_eq!(atlas.uv_map.len(), 4);
    }
}
