use dashmap::DashMap;
use glam::IVec3;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub u16);

impl BlockId {
    pub const AIR: BlockId = BlockId(0);

    pub fn is_air(&self) -> bool {
        *self == BlockId::AIR
    }
}

/// Read-only view of the host's world, queried from marker worker threads.
pub trait MarkerWorld: Send + Sync {
    fn block(&self, pos: IVec3) -> BlockId;
}

impl<F> MarkerWorld for F
where
    F: Fn(IVec3) -> BlockId + Send + Sync,
{
    fn block(&self, pos: IVec3) -> BlockId {
        self(pos)
    }
}

// Sparse world, anything not in the map is air
impl MarkerWorld for DashMap<IVec3, BlockId> {
    fn block(&self, pos: IVec3) -> BlockId {
        self.get(&pos).map(|block| *block).unwrap_or(BlockId::AIR)
    }
}
