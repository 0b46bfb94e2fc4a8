//! Per-frame LOD and culling pass over an instanced batch

use crate::core::types::{Mat4, Vec3};
use crate::core::{Error, Result, Viewer};
use crate::instancing::InstancedRenderGroup;
use crate::math::Frustum;
use super::config::{LodConfig, LodLevel};

/// Outcome of one full scan
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LodStats {
    /// Visible instances per level (High, Medium, Low)
    pub per_level: [usize; 3],
    pub culled: usize,
    /// Instances whose transform was rewritten
    pub changed: usize,
}

/// Assigns LOD levels and culls instances, throttled to every Nth tick.
///
/// Captures each instance's layout pose at [`initialize`](Self::initialize)
/// and rewrites transforms as `layout * scale` through the group's
/// setters, flushing once per scan. Distances are measured from that
/// captured pose; LOD scaling never moves the translation column.
///
/// The system is the only writer of instance transforms after layout.
/// Moving an instance through the group directly is overwritten at its
/// next level change; call `initialize` again after re-laying out.
#[derive(Debug)]
pub struct LodSystem {
    config: LodConfig,
    layout: Vec<Mat4>,
    /// State last written per instance, `None` until the first scan
    applied: Vec<Option<(LodLevel, bool)>>,
    initialized: bool,
    ticks: u64,
    scans: u64,
    frustum: Option<Frustum>,
    last_stats: LodStats,
}

impl LodSystem {
    pub fn new(config: LodConfig) -> Self {
        Self {
            config,
            layout: Vec::new(),
            applied: Vec::new(),
            initialized: false,
            ticks: 0,
            scans: 0,
            frustum: None,
            last_stats: LodStats::default(),
        }
    }

    pub fn config(&self) -> &LodConfig {
        &self.config
    }

    /// Capture the layout poses of `group`. Call after initial placement
    /// has been flushed.
    pub fn initialize(&mut self, group: &InstancedRenderGroup) {
        self.layout = group.instances().iter().map(|i| i.transform).collect();
        self.applied = vec![None; self.layout.len()];
        self.initialized = true;
        self.ticks = 0;
        self.scans = 0;
        self.frustum = None;
        self.last_stats = LodStats::default();
        log::debug!("LOD system tracking {} instances", self.layout.len());
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Frustum built on the most recent tick
    pub fn frustum(&self) -> Option<&Frustum> {
        self.frustum.as_ref()
    }

    pub fn last_stats(&self) -> LodStats {
        self.last_stats
    }

    /// Number of full scans run so far
    pub fn scans(&self) -> u64 {
        self.scans
    }

    /// Advance one tick. Runs a full scan on the first tick and then every
    /// `update_interval` ticks; returns its stats when it ran.
    pub fn update<V: Viewer>(
        &mut self,
        _dt: f32,
        viewer: &V,
        group: &mut InstancedRenderGroup,
    ) -> Result<Option<LodStats>> {
        if group.is_disposed() {
            return Ok(None);
        }
        if !self.initialized {
            return Err(Error::NotInitialized);
        }

        let frustum = Frustum::from_view_projection(&viewer.view_projection());
        self.frustum = Some(frustum);

        let interval = u64::from(self.config.update_interval.max(1));
        let due = self.ticks % interval == 0;
        self.ticks += 1;
        if !due {
            return Ok(None);
        }

        self.scan(viewer.position(), &frustum, group).map(Some)
    }

    /// Run a full scan now, ignoring the throttle
    pub fn force_scan<V: Viewer>(&mut self, viewer: &V, group: &mut InstancedRenderGroup) -> Result<LodStats> {
        if !self.initialized {
            return Err(Error::NotInitialized);
        }
        let frustum = Frustum::from_view_projection(&viewer.view_projection());
        self.frustum = Some(frustum);
        self.scan(viewer.position(), &frustum, group)
    }

    fn scan(&mut self, eye: Vec3, frustum: &Frustum, group: &mut InstancedRenderGroup) -> Result<LodStats> {
        if group.count() != self.layout.len() {
            log::warn!(
                "LOD layout tracks {} instances but group has {}",
                self.layout.len(),
                group.count()
            );
            return Err(Error::NotInitialized);
        }

        let mut stats = LodStats::default();
        for (index, layout) in self.layout.iter().enumerate() {
            let position = layout.w_axis.truncate();
            let level = self.config.level_for_distance(position.distance(eye));
            let culled = self.config.frustum_culling && !frustum.contains_point(position);

            if culled {
                stats.culled += 1;
            } else {
                stats.per_level[level.index()] += 1;
            }

            if self.applied[index] == Some((level, culled)) {
                continue;
            }

            let scale = if culled { 0.0 } else { self.config.scale_for(level) };
            group.set_instance_transform(index, *layout * Mat4::from_scale(Vec3::splat(scale)))?;
            group.set_instance_lod_state(index, level, culled)?;
            self.applied[index] = Some((level, culled));
            stats.changed += 1;
        }

        if stats.changed > 0 {
            group.flush();
        }

        self.scans += 1;
        self.last_stats = stats;
        log::trace!(
            "LOD scan {}: high={} medium={} low={} culled={} changed={}",
            self.scans,
            stats.per_level[LodLevel::High.index()],
            stats.per_level[LodLevel::Medium.index()],
            stats.per_level[LodLevel::Low.index()],
            stats.culled,
            stats.changed
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Camera;
    use crate::instancing::fixtures::test_group;

    /// Group with instances at the given world positions, flushed
    fn placed_group(positions: &[Vec3]) -> InstancedRenderGroup {
        let mut group = test_group(positions.len());
        for (i, p) in positions.iter().enumerate() {
            group.set_instance_transform(i, Mat4::from_translation(*p)).unwrap();
        }
        group.flush();
        group
    }

    /// Camera at the origin looking down -Z
    fn viewer() -> Camera {
        Camera::look_at(Vec3::ZERO, -Vec3::Z, Vec3::Y)
    }

    fn scale_of(group: &InstancedRenderGroup, index: usize) -> f32 {
        group.transform_buffer()[index].to_mat4().x_axis.length()
    }

    #[test]
    fn test_levels_and_scales_applied() {
        let mut group = placed_group(&[
            Vec3::new(0.0, 0.0, -2.0),
            Vec3::new(0.0, 0.0, -10.0),
            Vec3::new(0.0, 0.0, -40.0),
        ]);
        let mut lod = LodSystem::new(LodConfig::default());
        lod.initialize(&group);

        let stats = lod.update(0.016, &viewer(), &mut group).unwrap().unwrap();
        assert_eq!(stats.per_level, [1, 1, 1]);
        assert_eq!(stats.culled, 0);

        assert_eq!(group.instance(0).unwrap().lod_level, LodLevel::High);
        assert_eq!(group.instance(1).unwrap().lod_level, LodLevel::Medium);
        assert_eq!(group.instance(2).unwrap().lod_level, LodLevel::Low);
        assert!((scale_of(&group, 0) - 1.0).abs() < 1e-6);
        assert!((scale_of(&group, 1) - 0.9).abs() < 1e-6);
        assert!((scale_of(&group, 2) - 0.7).abs() < 1e-6);
        // Position survives the rescale
        assert_eq!(group.transform_buffer()[2].to_mat4().w_axis.truncate(), Vec3::new(0.0, 0.0, -40.0));
    }

    #[test]
    fn test_first_scan_applies_configured_high_scale() {
        let mut group = placed_group(&[Vec3::new(0.0, 0.0, -2.0), Vec3::new(0.0, 0.0, -10.0)]);
        let config = LodConfig { scales: [0.5, 0.4, 0.3], ..Default::default() };
        let mut lod = LodSystem::new(config);
        lod.initialize(&group);

        let stats = lod.force_scan(&viewer(), &mut group).unwrap();
        assert_eq!(stats.changed, 2);
        assert_eq!(group.instance(0).unwrap().lod_level, LodLevel::High);
        assert!((scale_of(&group, 0) - 0.5).abs() < 1e-6);
        assert!((scale_of(&group, 1) - 0.4).abs() < 1e-6);

        // Nothing left to rewrite from the same spot
        assert_eq!(lod.force_scan(&viewer(), &mut group).unwrap().changed, 0);
    }

    #[test]
    fn test_boundary_distance_is_medium() {
        let mut group = placed_group(&[Vec3::new(0.0, 0.0, -5.0)]);
        let mut lod = LodSystem::new(LodConfig::default());
        lod.initialize(&group);
        lod.force_scan(&viewer(), &mut group).unwrap();
        assert_eq!(group.instance(0).unwrap().lod_level, LodLevel::Medium);
    }

    #[test]
    fn test_culling_collapses_scale() {
        let mut group = placed_group(&[
            Vec3::new(0.0, 0.0, -3.0),    // frustum center, High distance
            Vec3::new(500.0, 0.0, 40.0),  // far outside, behind and to the side
        ]);
        let mut lod = LodSystem::new(LodConfig::default());
        lod.initialize(&group);
        let stats = lod.force_scan(&viewer(), &mut group).unwrap();

        assert_eq!(stats.culled, 1);
        let visible = group.instance(0).unwrap();
        assert!(!visible.culled);
        assert_eq!(visible.lod_level, LodLevel::High);
        assert!((scale_of(&group, 0) - 1.0).abs() < 1e-6);

        assert!(group.instance(1).unwrap().culled);
        assert_eq!(scale_of(&group, 1), 0.0);
    }

    #[test]
    fn test_culling_can_be_disabled() {
        let mut group = placed_group(&[Vec3::new(0.0, 0.0, 40.0)]);
        let config = LodConfig { frustum_culling: false, ..Default::default() };
        let mut lod = LodSystem::new(config);
        lod.initialize(&group);
        let stats = lod.force_scan(&viewer(), &mut group).unwrap();
        assert_eq!(stats.culled, 0);
        assert!(!group.instance(0).unwrap().culled);
    }

    #[test]
    fn test_scan_throttled_to_interval() {
        let mut group = placed_group(&[Vec3::new(0.0, 0.0, -2.0)]);
        let mut lod = LodSystem::new(LodConfig { update_interval: 5, ..Default::default() });
        lod.initialize(&group);
        let camera = viewer();

        let ran: Vec<bool> = (0..11)
            .map(|_| lod.update(0.016, &camera, &mut group).unwrap().is_some())
            .collect();
        assert_eq!(
            ran,
            vec![true, false, false, false, false, true, false, false, false, false, true]
        );
        assert_eq!(lod.scans(), 3);
        // Frustum is rebuilt every tick even when the scan is skipped
        assert!(lod.frustum().is_some());
    }

    #[test]
    fn test_scan_is_idempotent_and_flushes() {
        let mut group = placed_group(&[Vec3::new(0.0, 0.0, -10.0), Vec3::new(0.0, 0.0, -1.0)]);
        group.take_uploads();
        let mut lod = LodSystem::new(LodConfig::default());
        lod.initialize(&group);

        let first = lod.force_scan(&viewer(), &mut group).unwrap();
        // The first scan writes every instance
        assert_eq!(first.changed, 2);
        assert!(!group.has_unflushed_writes());
        assert!(group.needs_upload());
        group.take_uploads();

        let second = lod.force_scan(&viewer(), &mut group).unwrap();
        assert_eq!(second.changed, 0);
        assert!(!group.needs_upload());
    }

    #[test]
    fn test_moving_viewer_restores_scale() {
        let mut group = placed_group(&[Vec3::new(0.0, 0.0, -20.0)]);
        let mut lod = LodSystem::new(LodConfig::default());
        lod.initialize(&group);
        lod.force_scan(&viewer(), &mut group).unwrap();
        assert!((scale_of(&group, 0) - 0.7).abs() < 1e-6);

        let close = Camera::look_at(Vec3::new(0.0, 0.0, -17.0), Vec3::new(0.0, 0.0, -30.0), Vec3::Y);
        lod.force_scan(&close, &mut group).unwrap();
        assert_eq!(group.instance(0).unwrap().lod_level, LodLevel::High);
        assert!((scale_of(&group, 0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_update_before_initialize() {
        let mut group = placed_group(&[Vec3::ZERO]);
        let mut lod = LodSystem::new(LodConfig::default());
        assert!(matches!(lod.update(0.016, &viewer(), &mut group), Err(Error::NotInitialized)));
    }

    #[test]
    fn test_update_on_disposed_group_is_noop() {
        let mut group = placed_group(&[Vec3::ZERO]);
        let mut lod = LodSystem::new(LodConfig::default());
        lod.initialize(&group);
        group.dispose();
        assert_eq!(lod.update(0.016, &viewer(), &mut group).unwrap(), None);
    }
}
