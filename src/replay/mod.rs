pub mod persistence;

use crate::track::segment::orthonormal_basis;
use glam::{Affine3A, Mat3, Vec3};
use serde::{Deserialize, Serialize};

/// One recorded car transform. The axes are stored as recorded and only
/// normalized when the sample is used.
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
pub struct ReplaySample {
    /// Seconds since the lap start.
    pub time: f32,
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
}

/// Interpolated car transform returned by replay sampling.
#[derive(Debug, Copy, Clone)]
pub struct CarTransform {
    pub position: Vec3,
    pub forward: Vec3,
    pub right: Vec3,
    pub up: Vec3,
}

impl CarTransform {
    pub fn matrix(&self) -> Affine3A {
        Affine3A::from_mat3_translation(
            Mat3::from_cols(self.right, self.forward, self.up),
            self.position,
        )
    }
}

/// Time-indexed recording of one lap, used for the ghost car and the menu
/// background. Playback wraps modulo the lap time so it can loop forever.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Replay {
    samples: Vec<ReplaySample>,
    checkpoint_times: Vec<f32>,
    lap_time: f32,
}

impl Default for Replay {
    fn default() -> Self {
        Self::new()
    }
}

impl Replay {
    /// Fresh, empty recording. The infinite lap time makes sure any
    /// completed lap beats it.
    pub fn new() -> Self {
        Self {
            samples: Vec::new(),
            checkpoint_times: Vec::new(),
            lap_time: f32::INFINITY,
        }
    }

    pub fn lap_time(&self) -> f32 {
        self.lap_time
    }

    pub fn set_lap_time(&mut self, lap_time: f32) {
        self.lap_time = lap_time;
    }

    pub fn samples(&self) -> &[ReplaySample] {
        &self.samples
    }

    pub fn checkpoint_times(&self) -> &[f32] {
        &self.checkpoint_times
    }

    /// Append a sample during an active lap. Samples arriving out of order
    /// (clock reset) are dropped instead of corrupting the binary search.
    pub fn record(&mut self, time: f32, position: Vec3, forward: Vec3, up: Vec3) {
        if let Some(last) = self.samples.last()
            && time <= last.time
        {
            return;
        }

        self.samples.push(ReplaySample {
            time,
            position,
            forward,
            up,
        });
    }

    /// Append a checkpoint crossing time; times increase monotonically
    /// as checkpoints are passed in order.
    pub fn add_checkpoint_time(&mut self, time: f32) {
        self.checkpoint_times.push(time);
    }

    /// Signed difference in milliseconds between `current_time_ms` and
    /// this replay's time at `checkpoint_num`. Negative means ahead of
    /// this replay, positive behind. Unknown checkpoints compare as 0.
    pub fn compare_checkpoint_time(&self, checkpoint_num: usize, current_time_ms: f32) -> i32 {
        let Some(checkpoint_time) = self.checkpoint_times.get(checkpoint_num) else {
            return 0;
        };

        (current_time_ms - checkpoint_time * 1000.0) as i32
    }

    /// Interpolated car transform at `time` seconds, wrapped modulo the lap
    /// time for looping playback. `None` if nothing was recorded yet.
    pub fn car_transform_at_time(&self, time: f32) -> Option<CarTransform> {
        let first = self.samples.first()?;
        let last = self.samples.last()?;

        let time = if self.lap_time.is_finite() && self.lap_time > 0.0 {
            time.rem_euclid(self.lap_time)
        } else {
            time.max(0.0)
        };

        if time <= first.time {
            return Some(Self::interpolate(first, first, 0.0));
        }

        if time >= last.time {
            // Between the final sample and the loop restart: blend back
            // towards the first sample over the remaining lap time.
            let gap = if self.lap_time.is_finite() {
                (self.lap_time - last.time) + first.time
            } else {
                0.0
            };
            let percent = if gap > f32::EPSILON {
                ((time - last.time) / gap).clamp(0.0, 1.0)
            } else {
                0.0
            };
            return Some(Self::interpolate(last, first, percent));
        }

        // First sample strictly after `time`; its predecessor exists because
        // time > first.time was handled above.
        let upper = self.samples.partition_point(|sample| sample.time <= time);
        let a = &self.samples[upper - 1];
        let b = &self.samples[upper];

        let span = b.time - a.time;
        let percent = if span > f32::EPSILON {
            (time - a.time) / span
        } else {
            0.0
        };

        Some(Self::interpolate(a, b, percent))
    }

    /// Linear position blend, normalized-linear axis blend, then
    /// re-orthogonalization of the frame.
    fn interpolate(a: &ReplaySample, b: &ReplaySample, percent: f32) -> CarTransform {
        let (forward, right, up) = orthonormal_basis(
            a.forward.lerp(b.forward, percent),
            a.up.lerp(b.up, percent),
        );

        CarTransform {
            position: a.position.lerp(b.position, percent),
            forward,
            right,
            up,
        }
    }
}
