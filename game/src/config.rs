use marker_engine::{
    config::{Config, DispatcherConfig, MarkerConfig},
    markers::mesh_store::MAX_REGION_MESH_BYTES,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HostConfig {
    pub updates_per_s: u32,
    pub frames_per_s: u32,
    pub max_frame_time_s: f64,
    /// How many frames to run before shutting down.
    pub frame_count: u64,
    pub world_seed: u32,
    /// Blocks per second along +X.
    pub player_speed: f32,
    /// Log marker stats every this many frames, 0 disables.
    pub stats_interval_frames: u64,
    pub max_region_mesh_bytes: usize,
    pub dispatcher: DispatcherConfig,
    pub markers: MarkerConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        HostConfig {
            updates_per_s: 20,
            frames_per_s: 60,
            max_frame_time_s: 0.25,
            frame_count: 600,
            world_seed: 123_456,
            player_speed: 12.0,
            stats_interval_frames: 120,
            max_region_mesh_bytes: MAX_REGION_MESH_BYTES,
            dispatcher: DispatcherConfig::default(),
            markers: MarkerConfig::default(),
        }
    }
}

impl Config for HostConfig {
    fn file_name() -> &'static str {
        "marker_game.ron"
    }

    fn is_valid(&self) -> bool {
        self.updates_per_s > 0
            && self.frames_per_s > 0
            && self.max_frame_time_s > 0.0
            && self.player_speed.is_finite()
            && self.dispatcher.is_valid()
            && self.markers.is_valid()
    }
}
