use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use glam::Vec3;
use log::debug;

use crate::{
    config::MarkerConfig,
    dispatch::MarkerDispatcher,
    limits::{MAX_REGION_RADIUS, MAX_VERTICAL_REGION_RADIUS},
    markers::{
        live_regions::LiveRegions,
        mesh_store::MarkerUploadTarget,
        palette::MarkerPalette,
        region::RegionPos,
        region_job::{MarkerScene, RegionMarkerJob},
        world::MarkerWorld,
    },
};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TrackerUpdate {
    pub scheduled: usize,
    /// Regions that fell out of range. Their meshes should be dropped.
    pub departed: Vec<RegionPos>,
    /// The dispatcher is shut down and refused a job. Scheduling stopped
    /// there, `departed` is still complete.
    pub dispatcher_closed: bool,
}

/// Keeps marker jobs scheduled for every region around the player.
pub struct RegionMarkerTracker {
    live: Arc<LiveRegions>,
    refresh: Arc<AtomicBool>,
    scene: MarkerScene,
    radius: u32,
    vertical_radius: u32,
    last_center: Option<RegionPos>,
}

impl RegionMarkerTracker {
    pub fn new(scene: MarkerScene, radius: u32, vertical_radius: u32) -> Self {
        RegionMarkerTracker {
            live: Arc::new(LiveRegions::new()),
            refresh: Arc::new(AtomicBool::new(false)),
            scene,
            radius: radius.min(MAX_REGION_RADIUS),
            vertical_radius: vertical_radius.min(MAX_VERTICAL_REGION_RADIUS),
            last_center: None,
        }
    }

    pub fn from_config(world: Arc<dyn MarkerWorld>, config: &MarkerConfig) -> Self {
        let scene = MarkerScene::new(world, MarkerPalette::from_config(config));
        Self::new(scene, config.region_radius, config.vertical_radius)
    }

    /// Does nothing while the player stays in the same region, unless a job
    /// was lost or a region was invalidated since the last call.
    #[profiling::function]
    pub fn update<C: MarkerUploadTarget>(
        &mut self,
        player: Vec3,
        dispatcher: &MarkerDispatcher<C>,
    ) -> TrackerUpdate {
        let center = RegionPos::from_world(player);
        let refresh = self.refresh.swap(false, Ordering::AcqRel);
        if self.last_center == Some(center) && !refresh {
            return TrackerUpdate::default();
        }
        self.last_center = Some(center);

        let mut departed = Vec::new();
        self.live.retain(|region| {
            let keep = region.is_within(center, self.radius, self.vertical_radius);
            if !keep {
                departed.push(region);
            }
            keep
        });

        let mut scheduled = 0;
        let mut dispatcher_closed = false;
        for region in center.neighborhood(self.radius, self.vertical_radius) {
            let Some(generation) = self.live.claim(region) else {
                continue;
            };

            let job = RegionMarkerJob::new(
                region,
                generation,
                player,
                self.scene.clone(),
                self.live.clone(),
                self.refresh.clone(),
            );
            if dispatcher.schedule(job).is_err() {
                // The dropped job gave its region back
                dispatcher_closed = true;
                break;
            }
            scheduled += 1;
        }

        if scheduled > 0 || !departed.is_empty() {
            debug!(
                "Marker regions around {:?}: {} scheduled, {} departed",
                center.0,
                scheduled,
                departed.len()
            );
        }

        TrackerUpdate {
            scheduled,
            departed,
            dispatcher_closed,
        }
    }

    /// Forces `region` to be rebuilt on the next update. Returns `false` if the
    /// region is not live.
    pub fn invalidate(&self, region: RegionPos) -> bool {
        let removed = self.live.remove(region);
        if removed {
            self.refresh.store(true, Ordering::Release);
        }
        removed
    }

    pub fn clear(&mut self) -> Vec<RegionPos> {
        let cleared = self.live.regions();
        self.live.clear();
        self.last_center = None;
        cleared
    }

    pub fn is_live(&self, region: RegionPos) -> bool {
        self.live.contains(region)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn radius(&self) -> u32 {
        self.radius
    }

    pub fn vertical_radius(&self) -> u32 {
        self.vertical_radius
    }
}
