//! Deterministic corridor placement
//!
//! Cards alternate walls by list index: even indices on the left (-X) wall,
//! odd on the right. Each pair shares a Z slot, walking down -Z from
//! `start_z`. Both walls face the centre line.

use std::f32::consts::FRAC_PI_2;

use crate::core::types::{Mat4, Quat, Vec3};
use super::config::LayoutConfig;

/// Wall a card hangs on
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wall {
    Left,
    Right,
}

impl Wall {
    pub fn for_index(index: usize) -> Self {
        if index % 2 == 0 { Wall::Left } else { Wall::Right }
    }

    /// Yaw that turns the card's +Z face toward the centre line
    pub fn yaw(self) -> f32 {
        match self {
            Wall::Left => FRAC_PI_2,
            Wall::Right => -FRAC_PI_2,
        }
    }
}

/// Centre of card `index`
pub fn corridor_position(index: usize, layout: &LayoutConfig) -> Vec3 {
    let x = match Wall::for_index(index) {
        Wall::Left => -layout.side_offset,
        Wall::Right => layout.side_offset,
    };
    let z = layout.start_z - (index / 2) as f32 * layout.spacing;
    Vec3::new(x, layout.height, z)
}

/// Model matrix of card `index` before any LOD scaling
pub fn corridor_transform(index: usize, layout: &LayoutConfig) -> Mat4 {
    let rotation = Quat::from_rotation_y(Wall::for_index(index).yaw());
    Mat4::from_rotation_translation(rotation, corridor_position(index, layout))
}

/// Z range covered by `count` cards, from the entrance to the last pair
pub fn corridor_extent(count: usize, layout: &LayoutConfig) -> (f32, f32) {
    let pairs = count.div_ceil(2).max(1);
    let last = layout.start_z - (pairs - 1) as f32 * layout.spacing;
    (layout.start_z, last)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alternating_walls() {
        let layout = LayoutConfig::default();
        assert_eq!(corridor_position(0, &layout), Vec3::new(-3.0, 1.6, -4.0));
        assert_eq!(corridor_position(1, &layout), Vec3::new(3.0, 1.6, -4.0));
        assert_eq!(corridor_position(2, &layout), Vec3::new(-3.0, 1.6, -8.0));
        assert_eq!(corridor_position(5, &layout), Vec3::new(3.0, 1.6, -12.0));
    }

    #[test]
    fn test_cards_face_centre_line() {
        let layout = LayoutConfig::default();
        for index in 0..4 {
            let transform = corridor_transform(index, &layout);
            let normal = transform.transform_vector3(Vec3::Z);
            let to_centre = Vec3::new(-corridor_position(index, &layout).x, 0.0, 0.0).normalize();
            assert!(normal.dot(to_centre) > 0.999, "card {} faces {:?}", index, normal);
        }
    }

    #[test]
    fn test_transform_is_rigid() {
        let transform = corridor_transform(3, &LayoutConfig::default());
        let (scale, _, translation) = transform.to_scale_rotation_translation();
        assert!((scale - Vec3::ONE).abs().max_element() < 1e-5);
        assert_eq!(translation, corridor_position(3, &LayoutConfig::default()));
    }

    #[test]
    fn test_extent() {
        let layout = LayoutConfig::default();
        assert_eq!(corridor_extent(1, &layout), (-4.0, -4.0));
        assert_eq!(corridor_extent(25, &layout), (-4.0, -52.0));
    }
}
