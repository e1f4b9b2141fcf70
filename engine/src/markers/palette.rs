use std::sync::Arc;

use ahash::AHashMap;

use crate::{config::MarkerConfig, geometry::Color, markers::world::BlockId};

pub type BlockColorFn = Arc<dyn Fn(BlockId) -> Option<Color> + Send + Sync>;

/// Which blocks get a marker, and in what colour.
#[derive(Clone, Debug, Default)]
pub struct MarkerPalette {
    colors: AHashMap<BlockId, Color>,
}

impl MarkerPalette {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &MarkerConfig) -> Self {
        let mut palette = MarkerPalette::new();
        for entry in &config.block_colors {
            palette.insert(entry.block, entry.color);
        }
        palette
    }

    /// Air is never marked, inserting it does nothing.
    pub fn insert(&mut self, block: BlockId, color: Color) -> Option<Color> {
        if block.is_air() {
            return None;
        }
        self.colors.insert(block, color)
    }

    pub fn remove(&mut self, block: BlockId) -> Option<Color> {
        self.colors.remove(&block)
    }

    pub fn color(&self, block: BlockId) -> Option<Color> {
        self.colors.get(&block).copied()
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn into_color_fn(self) -> BlockColorFn {
        Arc::new(move |block: BlockId| self.color(block))
    }
}
