use std::{sync::Arc, time::Duration};

use bytesize::ByteSize;
use glam::Vec3;
use log::{info, warn};
use marker_engine::{
    MarkerContext,
    dispatch::DispatchError,
    host_loop::{Host, LoopTime},
    init_markers,
    markers::{MarkerMeshStore, MarkerUploadTarget},
};

use crate::{config::HostConfig, ore_world::OreWorld};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Headless marker client: walks a player through an ore world and keeps
/// marker meshes for the regions around it.
pub struct MarkerHost {
    markers: MarkerContext<MarkerMeshStore>,
    store: MarkerMeshStore,
    player: Vec3,
    player_velocity: Vec3,
    frame: u64,
    stats_interval_frames: u64,
    uploads_applied: u64,
    upload_failures: u64,
}

impl MarkerHost {
    pub fn new(config: &HostConfig) -> anyhow::Result<Self> {
        let world = Arc::new(OreWorld::new(config.world_seed));
        let spawn_height = world.surface_height(0, 0) + 2;

        let markers = init_markers(world, &config.dispatcher, &config.markers)?;
        info!(
            "Marker host started with {} marker buffers, tracking {} regions around the player",
            markers.dispatcher.buffer_count(),
            (config.markers.region_radius * 2 + 1).pow(2) * (config.markers.vertical_radius * 2 + 1)
        );

        Ok(MarkerHost {
            markers,
            store: MarkerMeshStore::new(config.max_region_mesh_bytes),
            player: Vec3::new(0.5, spawn_height as f32, 0.5),
            player_velocity: Vec3::X * config.player_speed,
            frame: 0,
            stats_interval_frames: config.stats_interval_frames,
            uploads_applied: 0,
            upload_failures: 0,
        })
    }

    pub fn player(&self) -> Vec3 {
        self.player
    }

    pub fn store(&self) -> &MarkerMeshStore {
        &self.store
    }

    pub fn uploads_applied(&self) -> u64 {
        self.uploads_applied
    }

    pub fn upload_failures(&self) -> u64 {
        self.upload_failures
    }

    /// Blocks until the dispatcher has no outstanding jobs.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.markers.dispatcher.wait_idle(timeout)
    }

    /// Stops marker generation and applies whatever was already queued.
    pub fn shutdown(&mut self) {
        self.markers.dispatcher.kill();
        if !self.wait_idle(SHUTDOWN_TIMEOUT) {
            warn!("Marker jobs were still running after {SHUTDOWN_TIMEOUT:?}");
        }

        self.apply_uploads();
        self.log_stats();
    }

    fn apply_uploads(&mut self) {
        let report = self.markers.dispatcher.drain_uploads(&mut self.store);
        self.uploads_applied += report.executed as u64;

        if !report.is_clean() {
            self.upload_failures += report.failures.len() as u64;
            warn!(
                "{} of {} marker uploads failed this frame",
                report.failures.len(),
                report.attempted()
            );
        }
    }

    fn log_stats(&self) {
        let stats = self.markers.dispatcher.stats();
        info!(
            "Markers: {} regions, {} vertices, {} | jobs {} pending, {} running, {} done, {} failed, {} cancelled | buffers {}/{} free",
            self.store.len(),
            self.store.total_vertices(),
            ByteSize(self.store.total_bytes() as u64),
            stats.pending,
            stats.in_flight,
            stats.executed,
            stats.failed,
            stats.cancelled,
            stats.free_buffers,
            stats.buffer_count,
        );
    }
}

impl Host for MarkerHost {
    fn update(&mut self, time: &LoopTime) -> anyhow::Result<()> {
        self.player += self.player_velocity * time.delta_time_s as f32;

        let update = self
            .markers
            .tracker
            .update(self.player, &self.markers.dispatcher);

        for region in update.departed {
            self.store.remove_region(region);
        }

        if update.dispatcher_closed {
            anyhow::bail!(DispatchError::Closed);
        }
        Ok(())
    }

    fn render(&mut self, _time: &LoopTime) -> anyhow::Result<()> {
        self.apply_uploads();

        self.frame += 1;
        if self.stats_interval_frames > 0 && self.frame % self.stats_interval_frames == 0 {
            self.log_stats();
        }

        profiling::finish_frame!();
        Ok(())
    }
}
