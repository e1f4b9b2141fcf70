use std::sync::atomic::{AtomicU32, Ordering};

use thiserror::Error;

use crate::geometry::buffer::{BufferId, GeometryBuffer};

static NEXT_POOL_ID: AtomicU32 = AtomicU32::new(0);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("buffer {slot} was released while already in the pool")]
    DoubleRelease { slot: u32 },
    #[error("buffer belongs to pool {buffer_pool}, not pool {pool}")]
    ForeignBuffer { pool: u32, buffer_pool: u32 },
    #[error("the buffer pool has been retired")]
    Retired,
}

/// A fixed-size pool of geometry buffers, all created up front.
pub struct BufferPool {
    id: u32,
    free: Vec<GeometryBuffer>,
    is_free: Vec<bool>,
    retired: bool,
}

impl BufferPool {
    pub fn new(capacity: usize, buffer_capacity: usize) -> Self {
        let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);
        let capacity = capacity.max(1);

        let free = (0..capacity)
            .rev()
            .map(|slot| {
                GeometryBuffer::new(
                    BufferId {
                        pool: id,
                        slot: slot as u32,
                    },
                    buffer_capacity,
                )
            })
            .collect();

        BufferPool {
            id,
            free,
            is_free: vec![true; capacity],
            retired: false,
        }
    }

    pub fn acquire(&mut self) -> Option<GeometryBuffer> {
        let buffer = self.free.pop()?;
        self.is_free[buffer.id().slot as usize] = false;
        Some(buffer)
    }

    pub fn release(&mut self, mut buffer: GeometryBuffer) -> Result<(), PoolError> {
        let id = buffer.id();
        if id.pool != self.id {
            return Err(PoolError::ForeignBuffer {
                pool: self.id,
                buffer_pool: id.pool,
            });
        }

        if self.retired {
            return Err(PoolError::Retired);
        }

        let slot = id.slot as usize;
        if self.is_free[slot] {
            return Err(PoolError::DoubleRelease { slot: id.slot });
        }

        buffer.reset();
        self.is_free[slot] = true;
        self.free.push(buffer);
        Ok(())
    }

    /// Drops every free buffer and rejects further releases. Returns the number
    /// of buffers dropped.
    pub fn clear(&mut self) -> usize {
        self.retired = true;
        let dropped = self.free.len();
        self.free.clear();
        dropped
    }

    pub fn capacity(&self) -> usize {
        self.is_free.len()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn checked_out_count(&self) -> usize {
        self.is_free.iter().filter(|is_free| !**is_free).count()
    }

    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }
}
