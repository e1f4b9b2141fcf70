use std::{
    thread,
    time::{Duration, Instant},
};

// Fixed timestep as described in https://gafferongames.com/post/fix_your_timestep/

/// Something driven by a [`HostLoop`]: fixed-rate updates, one render per frame.
pub trait Host {
    fn update(&mut self, time: &LoopTime) -> anyhow::Result<()>;

    fn render(&mut self, _time: &LoopTime) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HostLoopConfig {
    pub updates_per_s: u32,
    /// Frame time is clamped to this, so a stall does not turn into a burst
    /// of catch-up updates.
    pub max_frame_time_s: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopTime {
    pub delta_time_s: f64,
    pub elapsed_time_s: f64,
    pub blending_factor: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStatus {
    Continue,
    Exit,
}

pub struct HostLoop<H: Host> {
    pub host: H,
    exit_next_frame: bool,

    previous_instant: Instant,
    accumulated_time_s: f64,
    fixed_time_step_s: f64,
    max_frame_time_s: f64,
    running_time_s: f64,
    last_frame_time_s: f64,
    blending_factor: f64,
    number_of_updates: u64,
    number_of_renders: u64,
}

impl<H: Host> HostLoop<H> {
    pub fn new(host: H, config: HostLoopConfig) -> Self {
        HostLoop {
            host,
            exit_next_frame: false,

            previous_instant: Instant::now(),
            accumulated_time_s: 0.0,
            fixed_time_step_s: 1.0 / config.updates_per_s.max(1) as f64,
            max_frame_time_s: config.max_frame_time_s,
            running_time_s: 0.0,
            last_frame_time_s: 0.0,
            blending_factor: 0.0,
            number_of_updates: 0,
            number_of_renders: 0,
        }
    }

    /// Runs one frame using the wall-clock time since the previous frame.
    pub fn next_frame(&mut self) -> anyhow::Result<LoopStatus> {
        let now = Instant::now();
        let elapsed_s = now.duration_since(self.previous_instant).as_secs_f64();
        self.previous_instant = now;
        self.step(elapsed_s)
    }

    /// Runs one frame as if `elapsed_s` seconds had passed since the previous
    /// one: as many fixed updates as fit, then a render.
    pub fn step(&mut self, elapsed_s: f64) -> anyhow::Result<LoopStatus> {
        if self.exit_next_frame {
            return Ok(LoopStatus::Exit);
        }

        let elapsed_s = elapsed_s.clamp(0.0, self.max_frame_time_s);
        self.last_frame_time_s = elapsed_s;
        self.running_time_s += elapsed_s;
        self.accumulated_time_s += elapsed_s;

        while self.accumulated_time_s >= self.fixed_time_step_s {
            let time = LoopTime {
                delta_time_s: self.fixed_time_step_s,
                elapsed_time_s: self.running_time_s,
                blending_factor: 0.0,
            };
            self.host.update(&time)?;
            self.accumulated_time_s -= self.fixed_time_step_s;
            self.number_of_updates += 1;
        }

        self.blending_factor = self.accumulated_time_s / self.fixed_time_step_s;

        let time = LoopTime {
            delta_time_s: self.last_frame_time_s,
            elapsed_time_s: self.running_time_s,
            blending_factor: self.blending_factor,
        };
        self.host.render(&time)?;
        self.number_of_renders += 1;

        Ok(LoopStatus::Continue)
    }

    /// Drives the loop without a window: `frames` frames, sleeping so each
    /// frame takes at least `frame_interval`.
    pub fn run_frames(&mut self, frames: u64, frame_interval: Duration) -> anyhow::Result<()> {
        for _ in 0..frames {
            let frame_start = Instant::now();
            if self.next_frame()? == LoopStatus::Exit {
                break;
            }

            if let Some(remaining) = frame_interval.checked_sub(frame_start.elapsed()) {
                thread::sleep(remaining);
            }
        }

        Ok(())
    }

    pub fn exit(&mut self) {
        self.exit_next_frame = true;
    }

    pub fn last_frame_time_s(&self) -> f64 {
        self.last_frame_time_s
    }

    pub fn running_time_s(&self) -> f64 {
        self.running_time_s
    }

    pub fn blending_factor(&self) -> f64 {
        self.blending_factor
    }

    pub fn number_of_updates(&self) -> u64 {
        self.number_of_updates
    }

    pub fn number_of_renders(&self) -> u64 {
        self.number_of_renders
    }
}
