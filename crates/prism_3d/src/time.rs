//! Frame timing

use std::time::Instant;

use crate::config::RenderConfig;

/// Frame clock
///
/// Deltas come from the wall clock, or from a fixed step when one is
/// configured. Each delta is clamped to `max_delta_time` before `time_scale`
/// is applied, so a stall does not produce a huge simulation step.
#[derive(Debug, Clone)]
pub struct Time {
    last_frame: Instant,
    fixed_step: Option<f32>,
    max_delta_time: f32,
    time_scale: f32,
    delta_time: f32,
    unscaled_delta_time: f32,
    elapsed: f32,
    frame_count: u64,
}

impl Default for Time {
    fn default() -> Self {
        Self::from_config(&RenderConfig::default())
    }
}

impl Time {
    pub fn from_config(config: &RenderConfig) -> Self {
        Self {
            last_frame: Instant::now(),
            fixed_step: config.fixed_time_step,
            max_delta_time: config.max_delta_time,
            time_scale: config.time_scale,
            delta_time: 0.0,
            unscaled_delta_time: 0.0,
            elapsed: 0.0,
            frame_count: 0,
        }
    }

    /// Advance to the next frame and return its scaled delta in seconds
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let raw = match self.fixed_step {
            Some(step) => step,
            None => (now - self.last_frame).as_secs_f32(),
        };
        self.last_frame = now;

        self.unscaled_delta_time = raw.clamp(0.0, self.max_delta_time);
        self.delta_time = self.unscaled_delta_time * self.time_scale;
        self.elapsed += self.delta_time;
        self.frame_count += 1;
        self.delta_time
    }

    /// Restart the clock so the next delta does not include idle time
    pub fn reset(&mut self) {
        self.last_frame = Instant::now();
    }

    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    pub fn unscaled_delta_time(&self) -> f32 {
        self.unscaled_delta_time
    }

    /// Scaled seconds since the clock started
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    pub fn set_time_scale(&mut self, scale: f32) {
        self.time_scale = scale.max(0.0);
    }

    pub fn set_fixed_step(&mut self, step: Option<f32>) {
        self.fixed_step = step;
    }
}
