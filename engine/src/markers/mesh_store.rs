use ahash::AHashMap;
use anyhow::bail;
use glam::IVec3;

use crate::{
    geometry::{MarkerMesh, MarkerVertex, buffer::BOX_OUTLINE_VERTICES},
    limits::REGION_VOLUME,
    markers::region::RegionPos,
};

/// Largest mesh a single region can produce: an outline around every block.
pub const MAX_REGION_MESH_BYTES: usize =
    REGION_VOLUME * BOX_OUTLINE_VERTICES * size_of::<MarkerVertex>();

/// Receives finished region meshes on the render thread.
pub trait MarkerUploadTarget: 'static {
    fn upload_region(&mut self, region: RegionPos, mesh: MarkerMesh) -> anyhow::Result<()>;

    /// Returns `true` if the region had a mesh.
    fn remove_region(&mut self, region: RegionPos) -> bool;
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadedRegion {
    /// Vertex positions are relative to this block.
    pub origin: IVec3,
    pub vertex_count: usize,
    pub bytes: Vec<u8>,
}

/// CPU-side stand-in for the GPU vertex buffers marker meshes end up in.
pub struct MarkerMeshStore {
    regions: AHashMap<RegionPos, UploadedRegion>,
    max_region_bytes: usize,
    total_bytes: usize,
    upload_count: u64,
}

impl Default for MarkerMeshStore {
    fn default() -> Self {
        Self::new(MAX_REGION_MESH_BYTES)
    }
}

impl MarkerMeshStore {
    pub fn new(max_region_bytes: usize) -> Self {
        MarkerMeshStore {
            regions: AHashMap::new(),
            max_region_bytes,
            total_bytes: 0,
            upload_count: 0,
        }
    }

    pub fn get(&self, region: RegionPos) -> Option<&UploadedRegion> {
        self.regions.get(&region)
    }

    pub fn contains(&self, region: RegionPos) -> bool {
        self.regions.contains_key(&region)
    }

    pub fn regions(&self) -> impl Iterator<Item = (&RegionPos, &UploadedRegion)> {
        self.regions.iter()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn total_vertices(&self) -> usize {
        self.regions.values().map(|region| region.vertex_count).sum()
    }

    /// Number of successful uploads since the store was created.
    pub fn upload_count(&self) -> u64 {
        self.upload_count
    }

    pub fn clear(&mut self) {
        self.regions.clear();
        self.total_bytes = 0;
    }
}

impl MarkerUploadTarget for MarkerMeshStore {
    fn upload_region(&mut self, region: RegionPos, mesh: MarkerMesh) -> anyhow::Result<()> {
        let bytes = mesh.as_bytes();
        if bytes.len() > self.max_region_bytes {
            bail!(
                "Marker mesh for region {:?} is {} bytes, the limit is {}",
                region.0,
                bytes.len(),
                self.max_region_bytes
            );
        }

        let uploaded = UploadedRegion {
            origin: region.min_block(),
            vertex_count: mesh.vertex_count(),
            bytes: bytes.to_vec(),
        };

        self.total_bytes += uploaded.bytes.len();
        if let Some(previous) = self.regions.insert(region, uploaded) {
            self.total_bytes -= previous.bytes.len();
        }
        self.upload_count += 1;

        Ok(())
    }

    fn remove_region(&mut self, region: RegionPos) -> bool {
        match self.regions.remove(&region) {
            Some(removed) => {
                self.total_bytes -= removed.bytes.len();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::geometry::{BufferPool, Color};

    fn mesh_with_boxes(count: usize) -> MarkerMesh {
        let mut pool = BufferPool::new(1, 16);
        let mut buffer = pool.acquire().unwrap();
        for i in 0..count {
            let min = Vec3::splat(i as f32);
            buffer.push_box_outline(min, min + Vec3::ONE, Color::WHITE);
        }
        buffer.finish()
    }

    #[test]
    fn test_upload_replaces_previous_mesh() {
        let mut store = MarkerMeshStore::default();
        let region = RegionPos::new(1, 0, -1);

        store.upload_region(region, mesh_with_boxes(2)).unwrap();
        assert_eq!(store.total_vertices(), 2 * BOX_OUTLINE_VERTICES);
        assert_eq!(store.total_bytes(), 2 * BOX_OUTLINE_VERTICES * 16);

        store.upload_region(region, mesh_with_boxes(1)).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.total_bytes(), BOX_OUTLINE_VERTICES * 16);
        assert_eq!(store.upload_count(), 2);

        let uploaded = store.get(region).unwrap();
        assert_eq!(uploaded.origin, IVec3::new(16, 0, -16));
        assert_eq!(uploaded.vertex_count, BOX_OUTLINE_VERTICES);
    }

    #[test]
    fn test_remove_region() {
        let mut store = MarkerMeshStore::default();
        let region = RegionPos::new(0, 0, 0);

        assert!(!store.remove_region(region));
        store.upload_region(region, mesh_with_boxes(1)).unwrap();
        assert!(store.remove_region(region));
        assert!(store.is_empty());
        assert_eq!(store.total_bytes(), 0);
    }

    #[test]
    fn test_oversized_mesh_is_rejected() {
        let mut store = MarkerMeshStore::new(BOX_OUTLINE_VERTICES * 16);
        let region = RegionPos::new(0, 0, 0);

        assert!(store.upload_region(region, mesh_with_boxes(2)).is_err());
        assert!(!store.contains(region));
        assert_eq!(store.upload_count(), 0);
    }
}
