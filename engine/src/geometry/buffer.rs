use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::geometry::color::Color;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
/// A line-list vertex, 16 bytes.
///
/// Layout:
/// - Bytes 0-11: position (3 x f32), relative to the origin of whatever the mesh
///   was built for
/// - Bytes 12-15: RGBA colour
pub struct MarkerVertex {
    pub position: [f32; 3],
    pub color: [u8; 4],
}

impl MarkerVertex {
    pub fn new(position: Vec3, color: Color) -> Self {
        MarkerVertex {
            position: position.to_array(),
            color: color.to_array(),
        }
    }
}

/// Vertices emitted by [`GeometryBuffer::push_box_outline`].
pub const BOX_OUTLINE_VERTICES: usize = 24;

// Corner indices, bottom face first, counter-clockwise seen from above
const BOX_EDGES: [(usize, usize); 12] = [
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 0),
    (4, 5),
    (5, 6),
    (6, 7),
    (7, 4),
    (0, 4),
    (1, 5),
    (2, 6),
    (3, 7),
];

// Pooled buffers that grew past this multiple of their hint are shrunk on reset
const SHRINK_FACTOR: usize = 16;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BufferId {
    pub(crate) pool: u32,
    pub(crate) slot: u32,
}

impl BufferId {
    pub fn slot(&self) -> u32 {
        self.slot
    }
}

pub struct GeometryBuffer {
    id: BufferId,
    vertices: Vec<MarkerVertex>,
    capacity_hint: usize,
}

impl GeometryBuffer {
    pub(crate) fn new(id: BufferId, capacity_hint: usize) -> Self {
        GeometryBuffer {
            id,
            vertices: Vec::with_capacity(capacity_hint),
            capacity_hint,
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn capacity_hint(&self) -> usize {
        self.capacity_hint
    }

    pub fn is_dirty(&self) -> bool {
        !self.vertices.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn vertices(&self) -> &[MarkerVertex] {
        &self.vertices
    }

    pub fn push_vertex(&mut self, position: Vec3, color: Color) {
        self.vertices.push(MarkerVertex::new(position, color));
    }

    pub fn push_line(&mut self, from: Vec3, to: Vec3, color: Color) {
        self.push_vertex(from, color);
        self.push_vertex(to, color);
    }

    pub fn push_box_outline(&mut self, min: Vec3, max: Vec3, color: Color) {
        let corners = [
            Vec3::new(min.x, min.y, min.z),
            Vec3::new(max.x, min.y, min.z),
            Vec3::new(max.x, min.y, max.z),
            Vec3::new(min.x, min.y, max.z),
            Vec3::new(min.x, max.y, min.z),
            Vec3::new(max.x, max.y, min.z),
            Vec3::new(max.x, max.y, max.z),
            Vec3::new(min.x, max.y, max.z),
        ];

        self.vertices.reserve(BOX_OUTLINE_VERTICES);
        for (from, to) in BOX_EDGES {
            self.push_line(corners[from], corners[to], color);
        }
    }

    pub fn finish(&self) -> MarkerMesh {
        MarkerMesh {
            vertices: self.vertices.to_vec(),
        }
    }

    pub(crate) fn reset(&mut self) {
        self.vertices.clear();
        if self.vertices.capacity() > self.capacity_hint.max(1) * SHRINK_FACTOR {
            self.vertices.shrink_to(self.capacity_hint);
        }
    }
}

/// Finished marker geometry, ready to be copied into a GPU buffer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MarkerMesh {
    vertices: Vec<MarkerVertex>,
}

impl MarkerMesh {
    pub fn vertices(&self) -> &[MarkerVertex] {
        &self.vertices
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer() -> GeometryBuffer {
        GeometryBuffer::new(BufferId { pool: 0, slot: 0 }, 8)
    }

    #[test]
    fn test_vertex_layout() {
        assert_eq!(std::mem::size_of::<MarkerVertex>(), 16);

        let mut buffer = buffer();
        buffer.push_vertex(Vec3::new(1.0, 2.0, 3.0), Color::rgba(1, 2, 3, 4));
        let mesh = buffer.finish();
        let bytes = mesh.as_bytes();

        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[0..4], &1.0f32.to_ne_bytes());
        assert_eq!(&bytes[12..16], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_box_outline_edges() {
        let mut buffer = buffer();
        buffer.push_box_outline(Vec3::ZERO, Vec3::ONE, Color::WHITE);
        assert_eq!(buffer.vertex_count(), BOX_OUTLINE_VERTICES);

        // Every edge of a unit cube is axis aligned and has length 1
        for line in buffer.vertices().chunks(2) {
            let from = Vec3::from_array(line[0].position);
            let to = Vec3::from_array(line[1].position);
            assert_eq!(from.distance(to), 1.0);
        }

        // Each corner is shared by exactly three edges
        let min_corner = buffer
            .vertices()
            .iter()
            .filter(|v| v.position == [0.0, 0.0, 0.0])
            .count();
        assert_eq!(min_corner, 3);
    }

    #[test]
    fn test_finish_keeps_buffer_dirty_until_reset() {
        let mut buffer = buffer();
        assert!(!buffer.is_dirty());

        buffer.push_line(Vec3::ZERO, Vec3::X, Color::RED);
        let mesh = buffer.finish();
        assert_eq!(mesh.vertex_count(), 2);
        assert!(buffer.is_dirty());

        buffer.reset();
        assert!(!buffer.is_dirty());
        // The snapshot is independent of the buffer
        assert_eq!(mesh.vertex_count(), 2);
    }

    #[test]
    fn test_reset_shrinks_oversized_buffers() {
        let mut buffer = buffer();
        for _ in 0..100 {
            buffer.push_box_outline(Vec3::ZERO, Vec3::ONE, Color::WHITE);
        }
        assert!(buffer.vertices.capacity() > 8 * SHRINK_FACTOR);

        buffer.reset();
        assert!(buffer.vertices.capacity() <= 8 * SHRINK_FACTOR);
    }
}
