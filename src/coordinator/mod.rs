//! Orchestration of atlas, geometry, instancing and LOD
//!
//! Order matters and is carried by the types: the atlas is built first and
//! consumed by [`RenderGroupBuilder`], the group is laid out and flushed, and
//! only then does the [`LodSystem`] start writing to it.

pub mod config;
pub mod layout;
pub mod proxy;

pub use config::{LayoutConfig, PalaceConfig};
pub use layout::{Wall, corridor_extent, corridor_position, corridor_transform};
pub use proxy::InteractionProxy;

use crate::atlas::{AtlasManager, BuiltAtlas, TileSource};
use crate::card::CardSource;
use crate::core::{Error, Result, Viewer};
use crate::geometry::GeometryPool;
use crate::instancing::{InstanceHit, InstancedRenderGroup, RenderGroupBuilder};
use crate::lod::{LodStats, LodSystem};
use crate::math::Ray;

/// Resource counters for the whole corridor
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Metrics {
    pub draw_calls: u32,
    pub texture_count: u32,
    pub geometry_count: u32,
    pub instance_count: usize,
    /// Atlas edge in pixels, 0 when none is live
    pub atlas_size: u32,
    /// Tiles that fell back to the placeholder
    pub placeholder_count: usize,
}

/// What [`OptimizationCoordinator::initialize`] hands back
#[derive(Debug)]
pub struct Initialized<'a> {
    pub render_group: &'a InstancedRenderGroup,
    pub proxies: &'a [InteractionProxy],
    pub metrics: Metrics,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Ready,
    Disposed,
}

/// Builds the single-batch corridor and keeps it current each frame
#[derive(Debug)]
pub struct OptimizationCoordinator {
    config: PalaceConfig,
    atlas_manager: AtlasManager,
    group: Option<InstancedRenderGroup>,
    lod: LodSystem,
    proxies: Vec<InteractionProxy>,
    placeholder_count: usize,
    state: Lifecycle,
}

impl OptimizationCoordinator {
    pub fn new(config: PalaceConfig) -> Self {
        let atlas_manager = AtlasManager::new(config.atlas.clone());
        let lod = LodSystem::new(config.lod.clone());
        Self {
            config,
            atlas_manager,
            group: None,
            lod,
            proxies: Vec::new(),
            placeholder_count: 0,
            state: Lifecycle::Idle,
        }
    }

    pub fn config(&self) -> &PalaceConfig {
        &self.config
    }

    /// Build the atlas, the instanced batch and one proxy per card.
    ///
    /// An atlas overflow is retried once with the tile size scaled by
    /// `retry_tile_scale`; a second overflow is returned. Calling this again
    /// before [`dispose`](Self::dispose) is an error.
    pub async fn initialize<S: TileSource>(
        &mut self,
        pool: &mut GeometryPool,
        source: &S,
        cards: &[CardSource],
    ) -> Result<Initialized<'_>> {
        if self.state == Lifecycle::Ready {
            return Err(Error::AlreadyInitialized);
        }
        if cards.is_empty() {
            return Err(Error::EmptyCardList);
        }

        let atlas = self.build_atlas_with_retry(source, cards).await?;
        let placeholder_count = atlas.placeholder_count;

        let layout = &self.config.layout;
        let geometry = pool.card_quad(layout.card_width, layout.card_height);
        let local_bounds = geometry.mesh().bounds();
        let mut group = RenderGroupBuilder::new(atlas).build(geometry);

        // Initial layout is the only write before LOD takes over
        let mut proxies = Vec::with_capacity(cards.len());
        for (index, card) in cards.iter().enumerate() {
            let transform = corridor_transform(index, layout);
            group.set_instance_transform(index, transform)?;
            group.set_instance_metadata(index, card.metadata())?;
            proxies.push(InteractionProxy::new(index, card, transform, &local_bounds));
        }
        group.flush();
        self.lod.initialize(&group);

        log::info!(
            "Corridor ready: {} cards in one batch, {}px atlas",
            cards.len(),
            group.atlas().map_or(0, |a| a.size_px())
        );

        self.group = Some(group);
        self.proxies = proxies;
        self.placeholder_count = placeholder_count;
        self.state = Lifecycle::Ready;

        let metrics = self.metrics();
        let render_group = self.group.as_ref().ok_or(Error::NotInitialized)?;
        Ok(Initialized { render_group, proxies: &self.proxies, metrics })
    }

    async fn build_atlas_with_retry<S: TileSource>(&self, source: &S, cards: &[CardSource]) -> Result<BuiltAtlas> {
        match self.atlas_manager.build_atlas(source, cards).await {
            Err(Error::CapacityExceeded { surface_size, item_count, .. }) => {
                let smaller = self.config.atlas.tile_size().scaled(self.config.retry_tile_scale);
                log::warn!(
                    "{} cards overflow a {}px atlas, retrying with {}x{} tiles",
                    item_count,
                    surface_size,
                    smaller.width,
                    smaller.height
                );
                self.atlas_manager.build_atlas_with_tile_size(source, cards, smaller).await
            }
            other => other,
        }
    }

    /// Per-frame tick. A no-op before initialize and after dispose.
    pub fn update<V: Viewer>(&mut self, dt: f32, viewer: &V) -> Result<Option<LodStats>> {
        if self.state != Lifecycle::Ready {
            log::trace!("update ignored in state {:?}", self.state);
            return Ok(None);
        }
        match self.group.as_mut() {
            Some(group) => self.lod.update(dt, viewer, group),
            None => Ok(None),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.state == Lifecycle::Ready
    }

    pub fn is_disposed(&self) -> bool {
        self.state == Lifecycle::Disposed
    }

    pub fn render_group(&self) -> Option<&InstancedRenderGroup> {
        self.group.as_ref()
    }

    /// Mutable access for the GPU hand-off (`take_uploads`)
    pub fn render_group_mut(&mut self) -> Option<&mut InstancedRenderGroup> {
        self.group.as_mut()
    }

    pub fn proxies(&self) -> &[InteractionProxy] {
        &self.proxies
    }

    pub fn lod(&self) -> &LodSystem {
        &self.lod
    }

    /// Pick through the batch and resolve the hit to its card proxy
    pub fn intersect(&self, ray: &Ray) -> Option<(&InteractionProxy, InstanceHit)> {
        let hit = self.group.as_ref()?.intersect(ray)?;
        self.proxies.get(hit.instance_index).map(|proxy| (proxy, hit))
    }

    pub fn metrics(&self) -> Metrics {
        let Some(group) = self.group.as_ref().filter(|g| !g.is_disposed()) else {
            return Metrics::default();
        };
        Metrics {
            draw_calls: group.draw_calls(),
            texture_count: u32::from(group.atlas().is_some()),
            geometry_count: u32::from(group.geometry().is_some()),
            instance_count: group.count(),
            atlas_size: group.atlas().map_or(0, |a| a.size_px()),
            placeholder_count: self.placeholder_count,
        }
    }

    /// Release the render group (geometry, then atlas), then the proxies.
    /// Safe to call repeatedly; the coordinator can be initialized again.
    pub fn dispose(&mut self) {
        if self.state == Lifecycle::Disposed {
            return;
        }
        if let Some(mut group) = self.group.take() {
            group.dispose();
        }
        self.proxies.clear();
        self.placeholder_count = 0;
        self.lod = LodSystem::new(self.config.lod.clone());
        self.state = Lifecycle::Disposed;
        log::info!("Coordinator disposed");
    }
}
