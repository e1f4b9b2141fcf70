pub mod buffer;
pub mod color;
pub mod pool;

pub use buffer::{BufferId, GeometryBuffer, MarkerMesh, MarkerVertex};
pub use color::Color;
pub use pool::{BufferPool, PoolError};
