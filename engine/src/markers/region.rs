use glam::{IVec3, Vec3};

use crate::limits::{REGION_SIZE, REGION_SIZE_LOG2};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Coordinates identifying a marker region (block coordinates divided by
/// region size and floored)
pub struct RegionPos(pub IVec3);

impl RegionPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        RegionPos(IVec3 { x, y, z })
    }

    pub fn from_block(block: IVec3) -> Self {
        // Arithmetic shift floors for negative coordinates too
        RegionPos(IVec3::new(
            block.x >> REGION_SIZE_LOG2,
            block.y >> REGION_SIZE_LOG2,
            block.z >> REGION_SIZE_LOG2,
        ))
    }

    pub fn from_world(pos: Vec3) -> Self {
        Self::from_block(pos.floor().as_ivec3())
    }

    pub fn x(&self) -> i32 {
        self.0.x
    }

    pub fn y(&self) -> i32 {
        self.0.y
    }

    pub fn z(&self) -> i32 {
        self.0.z
    }

    pub fn min_block(&self) -> IVec3 {
        self.0 * IVec3::splat(REGION_SIZE)
    }

    pub fn center(&self) -> Vec3 {
        self.min_block().as_vec3() + Vec3::splat(REGION_SIZE as f32 / 2.0)
    }

    pub fn distance_squared_to(&self, point: Vec3) -> f32 {
        self.center().distance_squared(point)
    }

    pub fn contains_block(&self, block: IVec3) -> bool {
        Self::from_block(block) == *self
    }

    pub fn is_within(&self, center: RegionPos, radius: u32, vertical_radius: u32) -> bool {
        let delta = (self.0 - center.0).abs();
        delta.x as u32 <= radius && delta.z as u32 <= radius && delta.y as u32 <= vertical_radius
    }

    /// Every region for which [`RegionPos::is_within`] holds, in X/Z/Y order.
    pub fn neighborhood(self, radius: u32, vertical_radius: u32) -> impl Iterator<Item = RegionPos> {
        let center = self;
        let radius = radius as i32;
        let vertical_radius = vertical_radius as i32;

        (-vertical_radius..=vertical_radius).flat_map(move |dy| {
            (-radius..=radius).flat_map(move |dz| {
                (-radius..=radius).map(move |dx| RegionPos(center.0 + IVec3::new(dx, dy, dz)))
            })
        })
    }
}

/// Region-local block offsets, X fastest.
pub fn region_local_blocks() -> impl Iterator<Item = IVec3> {
    (0..REGION_SIZE).flat_map(|y| {
        (0..REGION_SIZE).flat_map(move |z| (0..REGION_SIZE).map(move |x| IVec3::new(x, y, z)))
    })
}
