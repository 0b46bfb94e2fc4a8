//! Pickable per-card stand-ins for the UI layer

use crate::card::CardSource;
use crate::core::types::{Mat4, Vec3};
use crate::math::{Aabb, Ray};

/// Lightweight object carrying a card's text, placed where its instance is.
///
/// Proxies are never drawn. The UI raycasts against them (or resolves a
/// batch hit through [`index`](Self::index)) for quiz interactions.
#[derive(Clone, Debug, PartialEq)]
pub struct InteractionProxy {
    pub index: usize,
    pub word: String,
    pub translation: String,
    pub transcription: String,
    pub example: String,
    /// Image path the tile was rendered from, if any
    pub image: Option<String>,
    /// Layout pose of the matching instance
    pub transform: Mat4,
    /// World-space bounds of the card quad
    pub bounds: Aabb,
}

impl InteractionProxy {
    /// Proxy for `card`, given its layout pose and the quad's local bounds
    pub fn new(index: usize, card: &CardSource, transform: Mat4, local_bounds: &Aabb) -> Self {
        Self {
            index,
            word: card.word.clone(),
            translation: card.translation.clone(),
            transcription: card.transcription.clone(),
            example: card.example.clone(),
            image: card.image_path.clone(),
            transform,
            bounds: local_bounds.transformed(&transform),
        }
    }

    pub fn position(&self) -> Vec3 {
        self.transform.w_axis.truncate()
    }

    /// Entry distance along `ray` into the proxy's bounds
    pub fn intersect(&self, ray: &Ray) -> Option<f32> {
        ray.intersects_aabb(&self.bounds.padded(1e-3)).map(|(near, _)| near)
    }
}
