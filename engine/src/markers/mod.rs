//! Block markers: outlines around interesting blocks near the player.
//!
//! The world is split into cubic regions. [`RegionMarkerTracker`] schedules a
//! [`RegionMarkerJob`] for every region in range on the marker dispatcher, and
//! the finished meshes land in a [`MarkerUploadTarget`] on the render thread.

pub mod live_regions;
pub mod mesh_store;
pub mod palette;
pub mod region;
pub mod region_job;
pub mod tracker;
pub mod world;

pub use live_regions::LiveRegions;
pub use mesh_store::{MarkerMeshStore, MarkerUploadTarget, UploadedRegion};
pub use palette::{BlockColorFn, MarkerPalette};
pub use region::RegionPos;
pub use region_job::{MarkerScene, RegionMarkerJob};
pub use tracker::{RegionMarkerTracker, TrackerUpdate};
pub use world::{BlockId, MarkerWorld};
