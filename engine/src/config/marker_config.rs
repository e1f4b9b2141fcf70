use serde::{Deserialize, Serialize};

use crate::{
    geometry::color::Color,
    limits::{MAX_REGION_RADIUS, MAX_VERTICAL_REGION_RADIUS},
    markers::world::BlockId,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BlockColorEntry {
    pub block: BlockId,
    pub color: Color,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MarkerConfig {
    /// Horizontal distance in regions around the player that gets markers.
    pub region_radius: u32,
    pub vertical_radius: u32,
    pub block_colors: Vec<BlockColorEntry>,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        MarkerConfig {
            region_radius: 2,
            vertical_radius: 1,
            block_colors: vec![
                BlockColorEntry {
                    block: BlockId(14),
                    color: Color::rgb(250, 200, 40),
                },
                BlockColorEntry {
                    block: BlockId(15),
                    color: Color::rgb(216, 175, 147),
                },
                BlockColorEntry {
                    block: BlockId(56),
                    color: Color::rgb(90, 230, 225),
                },
            ],
        }
    }
}

impl MarkerConfig {
    pub fn is_valid(&self) -> bool {
        self.region_radius <= MAX_REGION_RADIUS
            && self.vertical_radius <= MAX_VERTICAL_REGION_RADIUS
            && self.block_colors.iter().all(|entry| !entry.block.is_air())
    }
}
