use std::{
    marker::PhantomData,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use glam::Vec3;

use crate::{
    dispatch::{JobPriority, MarkerJob, UploadQueue},
    geometry::{Color, GeometryBuffer},
    markers::{
        live_regions::LiveRegions,
        mesh_store::MarkerUploadTarget,
        palette::{BlockColorFn, MarkerPalette},
        region::{RegionPos, region_local_blocks},
        world::{BlockId, MarkerWorld},
    },
};

#[derive(Clone)]
pub struct MarkerScene {
    pub world: Arc<dyn MarkerWorld>,
    pub block_color: BlockColorFn,
}

impl MarkerScene {
    pub fn new(world: Arc<dyn MarkerWorld>, palette: MarkerPalette) -> Self {
        MarkerScene {
            world,
            block_color: palette.into_color_fn(),
        }
    }

    pub fn with_color_fn(
        world: Arc<dyn MarkerWorld>,
        block_color: impl Fn(BlockId) -> Option<Color> + Send + Sync + 'static,
    ) -> Self {
        MarkerScene {
            world,
            block_color: Arc::new(block_color),
        }
    }
}

/// Builds the marker outlines for one region. Output is discarded once the
/// region is removed or rebuilt under a newer generation.
pub struct RegionMarkerJob<C> {
    region: RegionPos,
    generation: u64,
    priority: JobPriority,
    scene: MarkerScene,
    live: Arc<LiveRegions>,
    refresh: Arc<AtomicBool>,
    handed_off: bool,
    _target: PhantomData<fn(&mut C)>,
}

impl<C> RegionMarkerJob<C> {
    pub fn new(
        region: RegionPos,
        generation: u64,
        origin: Vec3,
        scene: MarkerScene,
        live: Arc<LiveRegions>,
        refresh: Arc<AtomicBool>,
    ) -> Self {
        // Whole blocks, nearest region first
        let priority = JobPriority(region.distance_squared_to(origin) as u64);

        RegionMarkerJob {
            region,
            generation,
            priority,
            scene,
            live,
            refresh,
            handed_off: false,
            _target: PhantomData,
        }
    }

    pub fn region(&self) -> RegionPos {
        self.region
    }
}

impl<C: MarkerUploadTarget> MarkerJob<C> for RegionMarkerJob<C> {
    fn priority(&self) -> JobPriority {
        self.priority
    }

    #[profiling::function]
    fn execute(
        &mut self,
        buffer: &mut GeometryBuffer,
        uploads: &UploadQueue<C>,
    ) -> anyhow::Result<()> {
        if !self.live.is_current(self.region, self.generation) {
            // Left the tracked area or was rebuilt before we got a buffer
            self.handed_off = true;
            return Ok(());
        }

        let origin = self.region.min_block();
        for local in region_local_blocks() {
            let block = self.scene.world.block(origin + local);
            if block.is_air() {
                continue;
            }

            let Some(color) = (self.scene.block_color)(block) else {
                continue;
            };

            let min = local.as_vec3();
            buffer.push_box_outline(min, min + Vec3::ONE, color);
        }

        let mesh = buffer.finish();
        let region = self.region;
        let generation = self.generation;
        let live = self.live.clone();

        uploads.enqueue_upload(move |target: &mut C| {
            if !live.is_current(region, generation) {
                return Ok(());
            }

            if mesh.is_empty() {
                target.remove_region(region);
                Ok(())
            } else {
                target.upload_region(region, mesh)
            }
        })?;

        self.handed_off = true;
        Ok(())
    }
}

impl<C> Drop for RegionMarkerJob<C> {
    fn drop(&mut self) {
        // Lost before hand-off, the tracker schedules the region again
        if !self.handed_off && self.live.release(self.region, self.generation) {
            self.refresh.store(true, Ordering::Release);
        }
    }
}
