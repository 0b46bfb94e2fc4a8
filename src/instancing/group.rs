//! One GPU-instanced draw batch: shared geometry, atlas, per-instance buffers
//!
//! Writes go to the CPU-side [`CardInstance`] records and are copied into the
//! dense transform/uv buffers only on [`InstancedRenderGroup::flush`]. Flushed
//! ranges are then handed to the GPU mirror through
//! [`InstancedRenderGroup::take_uploads`].

use std::collections::BTreeMap;
use std::ops::Range;

use crate::atlas::{AtlasSurface, BuiltAtlas, UvRect};
use crate::card::CardMetadata;
use crate::core::types::{Mat4, Vec3};
use crate::core::{Error, Result};
use crate::geometry::GeometryHandle;
use crate::lod::LodLevel;
use crate::math::Ray;
use super::instance::{CardInstance, InstanceTransform, InstanceUv};

/// Flat meshes get this much depth for the broad-phase box test
const PICK_PADDING: f32 = 1e-3;

/// Determinants below this mean a collapsed (culled) instance
const MIN_PICK_DETERMINANT: f32 = 1e-12;

/// Half-open span of instance indices touched since the last hand-off
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirtyRange {
    pub start: usize,
    pub end: usize,
}

impl DirtyRange {
    fn single(index: usize) -> Self {
        Self { start: index, end: index + 1 }
    }

    fn include(range: &mut Option<DirtyRange>, other: DirtyRange) {
        *range = Some(match *range {
            Some(r) => DirtyRange { start: r.start.min(other.start), end: r.end.max(other.end) },
            None => other,
        });
    }

    pub fn as_range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Flushed spans the GPU copy still has to receive
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PendingUploads {
    pub transforms: Option<DirtyRange>,
    pub uvs: Option<DirtyRange>,
}

impl PendingUploads {
    pub fn is_empty(&self) -> bool {
        self.transforms.is_none() && self.uvs.is_none()
    }
}

/// Result of a ray pick against the batch
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InstanceHit {
    pub instance_index: usize,
    /// World-space hit point
    pub point: Vec3,
    /// World-space distance from the ray origin
    pub distance: f32,
}

/// Typed step between a finished atlas and its render group.
///
/// Holding a [`BuiltAtlas`] is the only way to get one, so creating a
/// group before its atlas exists does not compile.
#[derive(Debug)]
pub struct RenderGroupBuilder {
    atlas: BuiltAtlas,
}

impl RenderGroupBuilder {
    pub fn new(atlas: BuiltAtlas) -> Self {
        Self { atlas }
    }

    /// One instance per packed tile
    pub fn instance_count(&self) -> usize {
        self.atlas.uv_map.len()
    }

    pub fn atlas(&self) -> &BuiltAtlas {
        &self.atlas
    }

    pub fn build(self, geometry: GeometryHandle) -> InstancedRenderGroup {
        let count = self.instance_count();
        InstancedRenderGroup::create(count, geometry, self.atlas)
    }
}

impl From<BuiltAtlas> for RenderGroupBuilder {
    fn from(atlas: BuiltAtlas) -> Self {
        Self::new(atlas)
    }
}

/// Instanced batch of cards drawn with a single call
#[derive(Debug)]
pub struct InstancedRenderGroup {
    geometry: Option<GeometryHandle>,
    atlas: Option<AtlasSurface>,
    uv_map: BTreeMap<usize, UvRect>,
    instances: Vec<CardInstance>,
    transforms: Vec<InstanceTransform>,
    uv_offsets: Vec<InstanceUv>,
    pending_transforms: Option<DirtyRange>,
    pending_uvs: Option<DirtyRange>,
    upload: PendingUploads,
    disposed: bool,
}

impl InstancedRenderGroup {
    /// Create a batch of `count` instances sharing `geometry`.
    ///
    /// Takes the finished atlas by value, so a group can only exist once an
    /// atlas has been built. Instance `i` starts with `uv_map[i]`, identity
    /// transform, and both buffers queued for a full upload.
    pub fn create(count: usize, geometry: GeometryHandle, atlas: BuiltAtlas) -> Self {
        let BuiltAtlas { surface, uv_map, .. } = atlas;

        let instances: Vec<CardInstance> = (0..count)
            .map(|index| {
                let uv = uv_map.get(&index).copied().unwrap_or_else(|| {
                    log::warn!("No atlas rectangle for instance {}, sampling whole atlas", index);
                    UvRect::FULL
                });
                CardInstance::new(index, uv)
            })
            .collect();

        let transforms = instances.iter().map(|i| InstanceTransform::from(i.transform)).collect();
        let uv_offsets = instances.iter().map(|i| InstanceUv::from(i.uv)).collect();
        let full = (count > 0).then_some(DirtyRange { start: 0, end: count });

        log::debug!("Render group created: {} instances on '{}'", count, geometry.key());

        Self {
            geometry: Some(geometry),
            atlas: Some(surface),
            uv_map,
            instances,
            transforms,
            uv_offsets,
            pending_transforms: None,
            pending_uvs: None,
            upload: PendingUploads { transforms: full, uvs: full },
            disposed: false,
        }
    }

    pub fn count(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn instances(&self) -> &[CardInstance] {
        &self.instances
    }

    pub fn instance(&self, index: usize) -> Option<&CardInstance> {
        self.instances.get(index)
    }

    pub fn geometry(&self) -> Option<&GeometryHandle> {
        self.geometry.as_ref()
    }

    pub fn atlas(&self) -> Option<&AtlasSurface> {
        self.atlas.as_ref()
    }

    /// Atlas rectangle originally assigned to `index`
    pub fn atlas_uv(&self, index: usize) -> Option<UvRect> {
        self.uv_map.get(&index).copied()
    }

    /// Draw calls this batch costs per frame
    pub fn draw_calls(&self) -> u32 {
        u32::from(!self.disposed && !self.instances.is_empty())
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.instances.len() {
            Ok(())
        } else {
            Err(Error::InstanceOutOfRange { index, count: self.instances.len() })
        }
    }

    /// Record a new model matrix. Not visible to the GPU until [`flush`](Self::flush).
    pub fn set_instance_transform(&mut self, index: usize, transform: Mat4) -> Result<()> {
        if self.disposed {
            log::debug!("set_instance_transform({}) on disposed group ignored", index);
            return Ok(());
        }
        self.check_index(index)?;
        self.instances[index].transform = transform;
        DirtyRange::include(&mut self.pending_transforms, DirtyRange::single(index));
        Ok(())
    }

    /// Record a new atlas rectangle. Not visible to the GPU until [`flush`](Self::flush).
    pub fn set_instance_uv(&mut self, index: usize, uv: UvRect) -> Result<()> {
        if self.disposed {
            log::debug!("set_instance_uv({}) on disposed group ignored", index);
            return Ok(());
        }
        self.check_index(index)?;
        self.instances[index].uv = uv;
        DirtyRange::include(&mut self.pending_uvs, DirtyRange::single(index));
        Ok(())
    }

    /// Attach card text to an instance (CPU only)
    pub fn set_instance_metadata(&mut self, index: usize, metadata: CardMetadata) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        self.check_index(index)?;
        self.instances[index].metadata = metadata;
        Ok(())
    }

    /// Record the LOD bookkeeping for an instance (CPU only)
    pub fn set_instance_lod_state(&mut self, index: usize, level: LodLevel, culled: bool) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        self.check_index(index)?;
        let instance = &mut self.instances[index];
        instance.lod_level = level;
        instance.culled = culled;
        Ok(())
    }

    /// Whether CPU-side writes are waiting for [`flush`](Self::flush)
    pub fn has_unflushed_writes(&self) -> bool {
        self.pending_transforms.is_some() || self.pending_uvs.is_some()
    }

    /// Copy pending CPU-side writes into the dense buffers and mark the
    /// touched ranges for upload. Returns the number of slots copied.
    pub fn flush(&mut self) -> usize {
        let mut copied = 0;

        if let Some(range) = self.pending_transforms.take() {
            for i in range.as_range() {
                self.transforms[i] = self.instances[i].transform.into();
            }
            copied += range.len();
            DirtyRange::include(&mut self.upload.transforms, range);
        }

        if let Some(range) = self.pending_uvs.take() {
            for i in range.as_range() {
                self.uv_offsets[i] = self.instances[i].uv.into();
            }
            copied += range.len();
            DirtyRange::include(&mut self.upload.uvs, range);
        }

        copied
    }

    /// Dense per-instance model matrices, as the GPU reads them
    pub fn transform_buffer(&self) -> &[InstanceTransform] {
        &self.transforms
    }

    /// Dense per-instance uv offsets, as the GPU reads them
    pub fn uv_buffer(&self) -> &[InstanceUv] {
        &self.uv_offsets
    }

    /// Whether flushed data is waiting for the GPU
    pub fn needs_upload(&self) -> bool {
        !self.upload.is_empty()
    }

    /// Hand the flushed ranges to the GPU copy and reset them.
    ///
    /// Writing without flushing first is a programming error: the GPU
    /// would draw the stale pose.
    pub fn take_uploads(&mut self) -> PendingUploads {
        debug_assert!(
            !self.has_unflushed_writes(),
            "instance writes must be followed by flush() before upload"
        );
        std::mem::take(&mut self.upload)
    }

    /// Closest instance hit by `ray`, using the flushed transforms.
    ///
    /// Culled (zero-scale) instances cannot be hit.
    pub fn intersect(&self, ray: &Ray) -> Option<InstanceHit> {
        let mesh = self.geometry.as_ref()?.mesh();
        let local_bounds = mesh.bounds().padded(PICK_PADDING);
        let ray_length = ray.direction.length();

        let mut best: Option<InstanceHit> = None;
        for (index, raw) in self.transforms.iter().enumerate() {
            if self.instances[index].culled {
                continue;
            }
            let model = raw.to_mat4();
            if model.determinant().abs() < MIN_PICK_DETERMINANT {
                continue;
            }

            let local = ray.transform(&model.inverse());
            if local.intersects_aabb(&local_bounds).is_none() {
                continue;
            }

            let nearest = mesh
                .triangles()
                .filter_map(|[a, b, c]| local.intersects_triangle(a, b, c))
                .fold(None, |acc: Option<f32>, t| Some(acc.map_or(t, |m| m.min(t))));

            if let Some(t) = nearest {
                let distance = t * ray_length;
                if best.is_none_or(|hit| distance < hit.distance) {
                    best = Some(InstanceHit { instance_index: index, point: ray.at(t), distance });
                }
            }
        }
        best
    }

    /// Release geometry, atlas and buffers. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        let atlas_bytes = self.atlas.as_ref().map_or(0, AtlasSurface::byte_size);
        log::info!(
            "Disposing render group: {} instances, {} KiB atlas",
            self.instances.len(),
            atlas_bytes / 1024
        );
        // Geometry first, then the atlas, then instance storage
        self.geometry = None;
        self.atlas = None;
        self.uv_map.clear();
        self.instances = Vec::new();
        self.transforms = Vec::new();
        self.uv_offsets = Vec::new();
        self.pending_transforms = None;
        self.pending_uvs = None;
        self.upload = PendingUploads::default();
        self.disposed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::GeometryPool;
    use crate::instancing::fixtures::{test_atlas, test_group};

    #[test]
    fn test_builder_sizes_group_from_atlas() {
        let mut pool = GeometryPool::new();
        let builder = RenderGroupBuilder::from(test_atlas(5));
        assert_eq!(builder.instance_count(), 5);
        let group = builder.build(pool.card_quad(3.0, 2.0));
        assert_eq!(group.count(), 5);
        assert_eq!(group.atlas_uv(4), group.instance(4).map(|i| i.uv));
    }

    #[test]
    fn test_create_fills_buffers_and_queues_upload() {
        let mut group = test_group(4);
        assert_eq!(group.count(), 4);
        assert_eq!(group.transform_buffer().len(), 4);
        assert_eq!(group.uv_buffer().len(), 4);
        assert_eq!(group.uv_buffer()[1].offset, [0.25, 0.0, 0.125, 0.5]);
        assert_eq!(group.draw_calls(), 1);

        let uploads = group.take_uploads();
        assert_eq!(uploads.transforms, Some(DirtyRange { start: 0, end: 4 }));
        assert_eq!(uploads.uvs, Some(DirtyRange { start: 0, end: 4 }));
        assert!(!group.needs_upload());
    }

    #[test]
    fn test_writes_are_stale_until_flush() {
        let mut group = test_group(3);
        group.take_uploads();

        let pose = Mat4::from_translation(Vec3::new(-3.0, 1.6, -4.0));
        group.set_instance_transform(1, pose).unwrap();

        // CPU record updated, GPU buffer still holds the old pose
        assert_eq!(group.instance(1).unwrap().transform, pose);
        assert_eq!(group.transform_buffer()[1].to_mat4(), Mat4::IDENTITY);
        assert!(group.has_unflushed_writes());
        assert!(!group.needs_upload());

        assert_eq!(group.flush(), 1);
        assert_eq!(group.transform_buffer()[1].to_mat4(), pose);
        assert!(!group.has_unflushed_writes());
        assert_eq!(
            group.take_uploads().transforms,
            Some(DirtyRange { start: 1, end: 2 })
        );
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "flush")]
    fn test_upload_without_flush_is_caught() {
        let mut group = test_group(2);
        group.set_instance_transform(0, Mat4::from_translation(Vec3::X)).unwrap();
        group.take_uploads();
    }

    #[test]
    fn test_dirty_ranges_merge() {
        let mut group = test_group(10);
        group.take_uploads();
        group.set_instance_transform(7, Mat4::IDENTITY).unwrap();
        group.set_instance_transform(2, Mat4::IDENTITY).unwrap();
        group.set_instance_uv(5, UvRect::FULL).unwrap();
        group.flush();

        let uploads = group.take_uploads();
        assert_eq!(uploads.transforms, Some(DirtyRange { start: 2, end: 8 }));
        assert_eq!(uploads.uvs, Some(DirtyRange { start: 5, end: 6 }));
        assert_eq!(group.uv_buffer()[5].offset, [0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_out_of_range_write() {
        let mut group = test_group(2);
        assert!(matches!(
            group.set_instance_transform(2, Mat4::IDENTITY),
            Err(Error::InstanceOutOfRange { index: 2, count: 2 })
        ));
        assert!(group.set_instance_uv(9, UvRect::FULL).is_err());
    }

    #[test]
    fn test_intersect_returns_nearest_instance() {
        let mut group = test_group(2);
        group.set_instance_transform(0, Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0))).unwrap();
        group.set_instance_transform(1, Mat4::from_translation(Vec3::new(0.0, 0.0, -10.0))).unwrap();
        group.flush();

        let ray = Ray::new(Vec3::ZERO, -Vec3::Z);
        let hit = group.intersect(&ray).unwrap();
        assert_eq!(hit.instance_index, 0);
        assert!((hit.distance - 5.0).abs() < 1e-4);
        assert!((hit.point - Vec3::new(0.0, 0.0, -5.0)).length() < 1e-4);
    }

    #[test]
    fn test_intersect_respects_rotation_and_scale() {
        let mut group = test_group(1);
        // Card on the left wall facing +X, scaled down to 0.7
        let model = Mat4::from_translation(Vec3::new(-3.0, 1.6, -8.0))
            * Mat4::from_rotation_y(std::f32::consts::FRAC_PI_2)
            * Mat4::from_scale(Vec3::splat(0.7));
        group.set_instance_transform(0, model).unwrap();
        group.flush();

        // Card spans z in [-9.05, -6.95] after scaling
        let hit = group.intersect(&Ray::new(Vec3::new(0.0, 1.6, -8.9), -Vec3::X)).unwrap();
        assert!((hit.distance - 3.0).abs() < 1e-4);
        assert!(group.intersect(&Ray::new(Vec3::new(0.0, 1.6, -9.2), -Vec3::X)).is_none());
    }

    #[test]
    fn test_intersect_skips_culled_and_unflushed() {
        let mut group = test_group(1);
        group.set_instance_transform(0, Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0))).unwrap();
        // Not flushed: the drawn pose is still the identity at the origin
        let ray = Ray::new(Vec3::new(0.0, 0.0, 2.0), -Vec3::Z);
        assert!((group.intersect(&ray).unwrap().distance - 2.0).abs() < 1e-4);

        group.flush();
        group.set_instance_lod_state(0, LodLevel::Low, true).unwrap();
        assert!(group.intersect(&ray).is_none());
    }

    #[test]
    fn test_zero_scale_instance_is_not_pickable() {
        let mut group = test_group(1);
        group.set_instance_transform(0, Mat4::from_scale(Vec3::ZERO)).unwrap();
        group.flush();
        assert!(group.intersect(&Ray::new(Vec3::new(0.0, 0.0, 2.0), -Vec3::Z)).is_none());
    }

    #[test]
    fn test_dispose_is_idempotent_and_guards_writes() {
        let mut group = test_group(3);
        group.dispose();
        assert!(group.is_disposed());
        assert!(group.atlas().is_none());
        assert!(group.geometry().is_none());
        assert_eq!(group.draw_calls(), 0);

        group.dispose();
        assert!(group.set_instance_transform(0, Mat4::IDENTITY).is_ok());
        assert_eq!(group.flush(), 0);
        assert!(group.intersect(&Ray::new(Vec3::ZERO, -Vec3::Z)).is_none());
    }

    #[test]
    fn test_dispose_releases_pool_handle() {
        let mut pool = GeometryPool::new();
        let key = crate::geometry::card_quad_key(3.0, 2.0);
        let mut group = InstancedRenderGroup::create(2, pool.card_quad(3.0, 2.0), test_atlas(2));
        assert_eq!(pool.ref_count(&key), 1);
        group.dispose();
        assert_eq!(pool.ref_count(&key), 0);
    }
}
