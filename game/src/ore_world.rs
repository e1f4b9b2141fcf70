use glam::{DVec2, IVec3};
use marker_engine::markers::{BlockId, MarkerWorld};
use noise::{NoiseFn, SuperSimplex};

pub const STONE: BlockId = BlockId(1);
pub const DIRT: BlockId = BlockId(3);
pub const GOLD_ORE: BlockId = BlockId(14);
pub const IRON_ORE: BlockId = BlockId(15);
pub const DIAMOND_ORE: BlockId = BlockId(56);

const TERRAIN_SCALE: f64 = 0.01;
const TERRAIN_AMPLITUDE: f64 = 32.0;
const ORE_SCALE: f64 = 0.15;
const DIRT_DEPTH: i32 = 3;
const DIAMOND_MIN_DEPTH: i32 = 24;

/// Procedural terrain with ore veins, generated on demand per block.
pub struct OreWorld {
    terrain: SuperSimplex,
    ores: SuperSimplex,
}

impl OreWorld {
    pub fn new(seed: u32) -> Self {
        OreWorld {
            terrain: SuperSimplex::new(seed),
            ores: SuperSimplex::new(seed.wrapping_add(1)),
        }
    }

    /// Y of the topmost solid block in the column.
    pub fn surface_height(&self, x: i32, z: i32) -> i32 {
        let pos = DVec2::new(x as f64, z as f64) * TERRAIN_SCALE;
        (self.terrain.get(pos.to_array()) * TERRAIN_AMPLITUDE) as i32
    }
}

impl MarkerWorld for OreWorld {
    fn block(&self, pos: IVec3) -> BlockId {
        let surface = self.surface_height(pos.x, pos.z);
        if pos.y > surface {
            return BlockId::AIR;
        }

        let depth = surface - pos.y;
        if depth < DIRT_DEPTH {
            return DIRT;
        }

        let vein = self.ores.get((pos.as_dvec3() * ORE_SCALE).to_array());
        match vein {
            v if v > 0.8 && depth >= DIAMOND_MIN_DEPTH => DIAMOND_ORE,
            v if v > 0.7 => GOLD_ORE,
            v if v > 0.6 => IRON_ORE,
            _ => STONE,
        }
    }
}
