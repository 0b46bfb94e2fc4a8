//! Row-based shelf packing of rectangular tiles into a power-of-two atlas
//!
//! Items are sorted tallest-first (stable, so equal heights keep their input
//! order) and laid out left to right in rows. The surface starts at the
//! configured target size, grows by powers of two while the padded item area
//! is above the fill-efficiency threshold or the shelves overflow, and stops
//! at the maximum. If the maximum still cannot hold everything, every item is
//! shrunk once by a common factor and packed again before giving up.

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

/// Shrink factor used when the area budget says the items fit but shelf
/// waste still overflowed the largest surface.
const FALLBACK_SHRINK: f32 = 0.75;

/// Packer settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackerConfig {
    /// Gap in pixels kept right of and below every tile
    pub padding: u32,
    /// Starting surface size; rounded up to a power of two
    pub target_size: u32,
    /// Hard cap on the surface size; rounded down to a power of two
    pub max_size: u32,
    /// Largest share of the surface the padded tiles may cover before the
    /// surface is doubled (0.0-1.0)
    pub fill_efficiency: f32,
    /// Whether to shrink items once when even the largest surface overflows
    pub allow_shrink: bool,
}

impl Default for PackerConfig {
    fn default() -> Self {
        Self {
            padding: 4,
            target_size: 4096,
            max_size: 8192,
            fill_efficiency: 0.75,
            allow_shrink: true,
        }
    }
}

impl PackerConfig {
    /// Largest power of two not above `max_size`
    pub fn max_surface_size(&self) -> u32 {
        previous_power_of_two(self.max_size.max(1))
    }
}

/// One tile to place
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PackItem {
    pub index: usize,
    pub width: u32,
    pub height: u32,
}

impl PackItem {
    pub fn new(index: usize, width: u32, height: u32) -> Self {
        Self { index, width, height }
    }
}

/// A placed tile, in pixels, top-left origin
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PackedRect {
    pub index: usize,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PackedRect {
    /// Whether the two rectangles share any pixel
    pub fn overlaps(&self, other: &PackedRect) -> bool {
        self.x < other.x + other.width
            && other.x < self.x + self.width
            && self.y < other.y + other.height
            && other.y < self.y + self.height
    }
}

/// Successful packing
#[derive(Clone, Debug, PartialEq)]
pub struct PackResult {
    /// Side length of the square surface, always a power of two
    pub surface_size: u32,
    /// Placements in packing order
    pub rects: Vec<PackedRect>,
    /// Factor applied to every item's size; 1.0 unless the shrink pass ran
    pub scale: f32,
}

impl PackResult {
    pub fn shrunk(&self) -> bool {
        self.scale < 1.0
    }
}

/// Smallest power of two >= n (1 for 0)
pub fn next_power_of_two(n: u32) -> u32 {
    n.max(1).next_power_of_two()
}

/// Largest power of two <= n (n must be non-zero)
fn previous_power_of_two(n: u32) -> u32 {
    1 << (31 - n.leading_zeros())
}

/// Total area of the items including their padding gutters
pub fn padded_area(items: &[PackItem], padding: u32) -> u64 {
    items
        .iter()
        .map(|item| (item.width as u64 + padding as u64) * (item.height as u64 + padding as u64))
        .sum()
}

/// Pick the starting surface size for `total_area` worth of padded tiles.
///
/// Rounds `target` up to a power of two, then doubles while the tiles would
/// cover more than `fill_efficiency` of the surface, never past the cap.
pub fn choose_surface_size(target: u32, total_area: u64, config: &PackerConfig) -> u32 {
    let max = config.max_surface_size();
    let mut size = next_power_of_two(target).min(max);
    while size < max && total_area as f64 > config.fill_efficiency as f64 * (size as f64).powi(2) {
        size *= 2;
    }
    size
}

/// Shelf-pack `items` into a `surface_size` square.
///
/// Returns `None` as soon as an item cannot be placed; nothing is ever
/// dropped silently.
pub fn shelf_pack(items: &[PackItem], surface_size: u32, padding: u32) -> Option<Vec<PackedRect>> {
    let mut order: Vec<&PackItem> = items.iter().collect();
    // sort_by is stable: equal heights keep input order
    order.sort_by(|a, b| b.height.cmp(&a.height));

    let size = surface_size as u64;
    let pad = padding as u64;
    let (mut x, mut y, mut row_height) = (0u64, 0u64, 0u64);
    let mut rects = Vec::with_capacity(items.len());

    for item in order {
        let (w, h) = (item.width as u64, item.height as u64);

        if x + w + pad > size {
            // Start a new row
            y += row_height + pad;
            x = 0;
            row_height = 0;
            if w + pad > size {
                return None;
            }
        }
        if y + h + pad > size {
            return None;
        }

        rects.push(PackedRect {
            index: item.index,
            x: x as u32,
            y: y as u32,
            width: item.width,
            height: item.height,
        });
        x += w + pad;
        row_height = row_height.max(h);
    }

    Some(rects)
}

/// Shelf packer with surface escalation and a single shrink pass
#[derive(Clone, Debug, Default)]
pub struct AtlasPacker {
    config: PackerConfig,
}

impl AtlasPacker {
    pub fn new(config: PackerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PackerConfig {
        &self.config
    }

    /// Pack every item or fail with [`Error::CapacityExceeded`]
    pub fn pack(&self, items: &[PackItem]) -> Result<PackResult> {
        if let Some(result) = self.pack_escalating(items, 1.0) {
            return Ok(result);
        }

        let max = self.config.max_surface_size();
        let (item_width, item_height) = largest_item(items);

        if self.config.allow_shrink {
            let scale = self.shrink_factor(items);
            let shrunk: Vec<PackItem> = items
                .iter()
                .map(|item| PackItem {
                    index: item.index,
                    width: scale_dimension(item.width, scale),
                    height: scale_dimension(item.height, scale),
                })
                .collect();

            log::info!(
                "Atlas overflow at {}px for {} items, retrying with items scaled by {:.3}",
                max,
                items.len(),
                scale
            );

            if let Some(result) = self.pack_escalating(&shrunk, scale) {
                return Ok(result);
            }
        }

        Err(Error::CapacityExceeded {
            surface_size: max,
            item_count: items.len(),
            item_width,
            item_height,
        })
    }

    fn pack_escalating(&self, items: &[PackItem], scale: f32) -> Option<PackResult> {
        let max = self.config.max_surface_size();
        let area = padded_area(items, self.config.padding);
        let mut size = choose_surface_size(self.config.target_size, area, &self.config);

        loop {
            if let Some(rects) = shelf_pack(items, size, self.config.padding) {
                log::debug!("Packed {} items into {}px surface", rects.len(), size);
                return Some(PackResult { surface_size: size, rects, scale });
            }
            if size >= max {
                return None;
            }
            size *= 2;
        }
    }

    /// Common factor that brings the padded area under the fill threshold of
    /// the largest surface and every item inside its edge.
    fn shrink_factor(&self, items: &[PackItem]) -> f32 {
        let max = self.config.max_surface_size() as f64;
        let pad = self.config.padding as f64;
        let area = padded_area(items, self.config.padding) as f64;
        let (widest, tallest) = largest_item(items);

        let mut scale = 1.0f64;
        if area > 0.0 {
            scale = scale.min((self.config.fill_efficiency as f64 * max * max / area).sqrt());
        }
        if widest > 0 {
            scale = scale.min((max - pad) / widest as f64);
        }
        if tallest > 0 {
            scale = scale.min((max - pad) / tallest as f64);
        }

        let scale = scale as f32;
        if scale >= 1.0 { FALLBACK_SHRINK } else { scale.max(0.0) }
    }
}

fn largest_item(items: &[PackItem]) -> (u32, u32) {
    items.iter().fold((0, 0), |(w, h), item| (w.max(item.width), h.max(item.height)))
}

fn scale_dimension(value: u32, scale: f32) -> u32 {
    ((value as f32 * scale).floor() as u32).max(1)
}
