use std::sync::Arc;

use anyhow::Context;

use crate::{
    config::{DispatcherConfig, MarkerConfig},
    dispatch::MarkerDispatcher,
    markers::{MarkerUploadTarget, MarkerWorld, RegionMarkerTracker},
};

pub mod config;
pub mod dispatch;
pub mod geometry;
pub mod host_loop;
pub mod limits;
pub mod markers;

pub struct MarkerContext<C: 'static> {
    pub dispatcher: MarkerDispatcher<C>,
    pub tracker: RegionMarkerTracker,
}

pub fn init_markers<C: MarkerUploadTarget>(
    world: Arc<dyn MarkerWorld>,
    dispatcher_config: &DispatcherConfig,
    marker_config: &MarkerConfig,
) -> anyhow::Result<MarkerContext<C>> {
    anyhow::ensure!(dispatcher_config.is_valid(), "Invalid dispatcher config");
    anyhow::ensure!(marker_config.is_valid(), "Invalid marker config");

    let dispatcher = MarkerDispatcher::with_worker_threads(dispatcher_config)
        .context("Failed to start the marker dispatcher")?;
    let tracker = RegionMarkerTracker::from_config(world, marker_config);

    Ok(MarkerContext {
        dispatcher,
        tracker,
    })
}
