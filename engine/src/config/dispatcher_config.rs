use std::{num::NonZeroUsize, thread};

use serde::{Deserialize, Serialize};

/// Vertex capacity each pooled geometry buffer starts with.
pub const DEFAULT_BUFFER_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Number of pooled geometry buffers. `None` derives it from the hardware.
    pub buffer_count: Option<usize>,
    pub buffer_capacity: usize,
    /// Worker threads used to run marker jobs. `None` lets rayon decide.
    pub worker_threads: Option<usize>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        DispatcherConfig {
            buffer_count: None,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            worker_threads: None,
        }
    }
}

impl DispatcherConfig {
    pub fn is_valid(&self) -> bool {
        self.buffer_count != Some(0) && self.worker_threads != Some(0)
    }

    pub fn resolved_buffer_count(&self) -> usize {
        self.buffer_count
            .map(|count| count.max(1))
            .unwrap_or_else(default_buffer_count)
    }
}

/// Half the hardware concurrency, at least one.
pub fn default_buffer_count() -> usize {
    let parallelism = thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1);
    (parallelism / 2).max(1)
}
