//! LOD levels and thresholds
//!
//! Three levels picked by viewer distance. Thresholds are exclusive upper
//! bounds checked in ascending order; the last level has no bound:
//! - High: d < 5
//! - Medium: 5 <= d < 15
//! - Low: d >= 15
//!
//! A level changes the instance scale, not its mesh: every card shares one
//! quad.

use serde::{Deserialize, Serialize};

/// Default distance thresholds (High, Medium)
pub const LOD_DISTANCES: [f32; 2] = [5.0, 15.0];

/// Default per-level scale (High, Medium, Low)
pub const LOD_SCALES: [f32; 3] = [1.0, 0.9, 0.7];

/// Discrete detail tier
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LodLevel {
    #[default]
    High,
    Medium,
    Low,
}

impl LodLevel {
    pub const ALL: [LodLevel; 3] = [LodLevel::High, LodLevel::Medium, LodLevel::Low];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Configuration for LOD behavior
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodConfig {
    /// Upper distance bound for High and Medium
    pub distances: [f32; 2],
    /// Instance scale for High, Medium and Low
    pub scales: [f32; 3],
    /// Full scan every N update ticks
    pub update_interval: u32,
    /// Collapse instances whose position leaves the view frustum
    pub frustum_culling: bool,
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            distances: LOD_DISTANCES,
            scales: LOD_SCALES,
            update_interval: 5,
            frustum_culling: true,
        }
    }
}

impl LodConfig {
    /// Level for a viewer distance
    ///
    /// # Examples
    /// ```
    /// use cardpalace::lod::{LodConfig, LodLevel};
    ///
    /// let config = LodConfig::default();
    /// assert_eq!(config.level_for_distance(4.9), LodLevel::High);
    /// assert_eq!(config.level_for_distance(5.0), LodLevel::Medium);
    /// assert_eq!(config.level_for_distance(15.0), LodLevel::Low);
    /// ```
    pub fn level_for_distance(&self, distance: f32) -> LodLevel {
        for (level, &max_dist) in LodLevel::ALL.iter().zip(self.distances.iter()) {
            if distance < max_dist {
                return *level;
            }
        }
        LodLevel::Low
    }

    pub fn scale_for(&self, level: LodLevel) -> f32 {
        self.scales[level.index()]
    }
}
