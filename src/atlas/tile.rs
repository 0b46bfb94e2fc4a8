//! Per-card tile rasters and the sources that produce them

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::card::CardSource;

const PAPER: Rgba<u8> = Rgba([244, 239, 230, 255]);
const FRAME: Rgba<u8> = Rgba([120, 112, 100, 255]);

/// Pixel size of one card tile
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileSize {
    pub width: u32,
    pub height: u32,
}

impl TileSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Multiply both sides, keeping at least one pixel
    pub fn scaled(self, factor: f32) -> Self {
        Self {
            width: ((self.width as f32 * factor).floor() as u32).max(1),
            height: ((self.height as f32 * factor).floor() as u32).max(1),
        }
    }
}

impl Default for TileSize {
    fn default() -> Self {
        Self::new(768, 384)
    }
}

/// Why a tile could not be produced. Never fatal: the atlas substitutes a
/// placeholder.
#[derive(Debug, Error)]
pub enum TileError {
    #[error("tile render timed out after {0:?}")]
    Timeout(Duration),

    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tile unavailable: {0}")]
    Unavailable(String),
}

/// Produces the raster face of a card.
///
/// Implementations should return an image of exactly `size`; anything else
/// is resized by the atlas builder.
pub trait TileSource {
    fn render_tile(
        &self,
        card: &CardSource,
        size: TileSize,
    ) -> impl Future<Output = Result<RgbaImage, TileError>>;
}

/// Blank card face used when a tile fails or times out
pub fn placeholder_tile(size: TileSize) -> RgbaImage {
    card_background(size, PAPER, FRAME)
}

fn card_background(size: TileSize, fill: Rgba<u8>, frame: Rgba<u8>) -> RgbaImage {
    let border = (size.width.min(size.height) / 48).max(1);
    RgbaImage::from_fn(size.width, size.height, |x, y| {
        let on_frame = x < border
            || y < border
            || x >= size.width.saturating_sub(border)
            || y >= size.height.saturating_sub(border);
        if on_frame { frame } else { fill }
    })
}

/// Resize a tile that came back at the wrong size
pub fn conform_tile(tile: RgbaImage, size: TileSize) -> RgbaImage {
    if tile.dimensions() == (size.width, size.height) {
        tile
    } else {
        imageops::resize(&tile, size.width, size.height, FilterType::Triangle)
    }
}

/// Colour cards derived from the word itself; needs no assets
#[derive(Clone, Copy, Debug, Default)]
pub struct ProceduralTileSource;

impl ProceduralTileSource {
    fn accent(word: &str) -> Rgba<u8> {
        // FNV-1a
        let hash = word.bytes().fold(0x811c_9dc5u32, |h, b| (h ^ b as u32).wrapping_mul(0x0100_0193));
        let [r, g, b, _] = hash.to_le_bytes();
        // Keep accents mid-range so the frame stays visible
        Rgba([64 + r / 2, 64 + g / 2, 64 + b / 2, 255])
    }

    pub fn draw(card: &CardSource, size: TileSize) -> RgbaImage {
        let accent = Self::accent(&card.word);
        let mut tile = card_background(size, PAPER, accent);
        let band = size.height / 4;
        let border = (size.width.min(size.height) / 48).max(1);
        for y in border..band.max(border) {
            for x in border..size.width.saturating_sub(border) {
                tile.put_pixel(x, y, accent);
            }
        }
        tile
    }
}

impl TileSource for ProceduralTileSource {
    fn render_tile(
        &self,
        card: &CardSource,
        size: TileSize,
    ) -> impl Future<Output = Result<RgbaImage, TileError>> {
        std::future::ready(Ok(Self::draw(card, size)))
    }
}

/// Card faces built from picture files on disk.
///
/// The picture is letterboxed into the upper three quarters of a paper card.
#[derive(Clone, Debug)]
pub struct ImageFileTileSource {
    root: PathBuf,
}

impl ImageFileTileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn compose(picture: &RgbaImage, size: TileSize) -> RgbaImage {
        let mut tile = placeholder_tile(size);
        let margin = (size.width.min(size.height) / 16).max(1);
        let area_w = size.width.saturating_sub(margin * 2).max(1);
        let area_h = (size.height * 3 / 4).saturating_sub(margin).max(1);

        let (pw, ph) = picture.dimensions();
        let fit = (area_w as f32 / pw.max(1) as f32).min(area_h as f32 / ph.max(1) as f32);
        let w = ((pw as f32 * fit) as u32).clamp(1, area_w);
        let h = ((ph as f32 * fit) as u32).clamp(1, area_h);
        let scaled = imageops::resize(picture, w, h, FilterType::Triangle);

        let x = margin + (area_w - w) / 2;
        let y = margin + (area_h - h) / 2;
        imageops::overlay(&mut tile, &scaled, x as i64, y as i64);
        tile
    }
}

impl TileSource for ImageFileTileSource {
    fn render_tile(
        &self,
        card: &CardSource,
        size: TileSize,
    ) -> impl Future<Output = Result<RgbaImage, TileError>> {
        let path = card.image_path.as_ref().map(|p| self.root.join(p));
        let word = card.word.clone();
        async move {
            let path = path.ok_or_else(|| TileError::Unavailable(format!("'{}' has no image", word)))?;
            let bytes = tokio::fs::read(&path).await?;
            let picture = image::load_from_memory(&bytes)?.to_rgba8();
            Ok(Self::compose(&picture, size))
        }
    }
}
