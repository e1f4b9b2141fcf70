use std::time::Duration;

use marker_engine::{
    config::Config,
    host_loop::{HostLoop, HostLoopConfig},
};

use crate::{config::HostConfig, host::MarkerHost};

mod config;
mod host;
mod ore_world;

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init_timed();
    log::info!("Starting marker host...");

    let config_manager = HostConfig::create_manager()?;
    if !config_manager.path().exists() {
        config_manager.save_now()?;
    }
    let config = config_manager.snapshot();

    let host = MarkerHost::new(&config)?;
    let mut host_loop = HostLoop::new(
        host,
        HostLoopConfig {
            updates_per_s: config.updates_per_s,
            max_frame_time_s: config.max_frame_time_s,
        },
    );

    let frame_interval = Duration::from_secs_f64(1.0 / config.frames_per_s as f64);
    let result = host_loop.run_frames(config.frame_count, frame_interval);

    host_loop.host.shutdown();
    let host = &host_loop.host;
    log::info!(
        "Ran {} updates and {} frames, ended at {} with {} marked regions ({} uploads, {} failed)",
        host_loop.number_of_updates(),
        host_loop.number_of_renders(),
        host.player(),
        host.store().len(),
        host.uploads_applied(),
        host.upload_failures()
    );

    result
}
