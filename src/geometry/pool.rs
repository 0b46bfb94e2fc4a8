//! Shared geometry cache
//!
//! One physical mesh per key for the pool's lifetime. Handles are cheap
//! clones of an `Arc`; the reference count is the number of live handles.
//! The pool is an ordinary value: build one at startup and pass it to
//! whatever needs geometry.

use std::collections::HashMap;
use std::sync::Arc;

use super::mesh::Mesh;

/// Cache key for a card quad of the given size
pub fn card_quad_key(width: f32, height: f32) -> String {
    format!("card_quad:{}x{}", width, height)
}

/// Cache key for a floor plane of the given size
pub fn floor_plane_key(width: f32, depth: f32) -> String {
    format!("floor_plane:{}x{}", width, depth)
}

/// Shared, read-only reference to a pooled mesh
#[derive(Clone, Debug)]
pub struct GeometryHandle {
    key: Arc<str>,
    mesh: Arc<Mesh>,
}

impl GeometryHandle {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    /// Whether both handles refer to the same physical mesh
    pub fn same_geometry(&self, other: &GeometryHandle) -> bool {
        Arc::ptr_eq(&self.mesh, &other.mesh)
    }
}

#[derive(Debug)]
struct PoolEntry {
    key: Arc<str>,
    mesh: Arc<Mesh>,
}

/// Keyed mesh cache
#[derive(Debug, Default)]
pub struct GeometryPool {
    entries: HashMap<String, PoolEntry>,
    /// Meshes built over the pool's lifetime (factory calls)
    created: usize,
}

impl GeometryPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the mesh for `key`, building it with `factory` on first use
    pub fn get(&mut self, key: &str, factory: impl FnOnce() -> Mesh) -> GeometryHandle {
        let created = &mut self.created;
        let entry = self.entries.entry(key.to_string()).or_insert_with(|| {
            log::debug!("Geometry pool: building '{}'", key);
            *created += 1;
            PoolEntry { key: Arc::from(key), mesh: Arc::new(factory()) }
        });
        GeometryHandle { key: entry.key.clone(), mesh: entry.mesh.clone() }
    }

    /// Meshes built over the pool's lifetime, including disposed ones
    pub fn created(&self) -> usize {
        self.created
    }

    /// Shared 3x2 (or other size) card quad
    pub fn card_quad(&mut self, width: f32, height: f32) -> GeometryHandle {
        self.get(&card_quad_key(width, height), || Mesh::quad(width, height))
    }

    /// Shared floor plane
    pub fn floor_plane(&mut self, width: f32, depth: f32) -> GeometryHandle {
        self.get(&floor_plane_key(width, depth), || Mesh::floor_plane(width, depth))
    }

    /// Live handles for `key` (0 if absent)
    pub fn ref_count(&self, key: &str) -> usize {
        self.entries
            .get(key)
            .map(|entry| Arc::strong_count(&entry.mesh) - 1)
            .unwrap_or(0)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of cached geometries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Release every cached mesh. Safe to call repeatedly.
    ///
    /// Handles still held elsewhere keep their mesh alive until dropped.
    pub fn dispose(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        let outstanding: usize = self.entries.values().map(|e| Arc::strong_count(&e.mesh) - 1).sum();
        log::info!(
            "Geometry pool: disposing {} geometries ({} handles outstanding)",
            self.entries.len(),
            outstanding
        );
        self.entries.clear();
    }
}
