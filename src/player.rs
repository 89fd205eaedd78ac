use crate::landscape::Landscape;
use crate::track::segment::orthonormal_basis;
use crate::track::{TrackFrame, TrackPositionTracker};
use glam::Vec3;
use log::{debug, info};

/// How long the camera zooms in onto the car before the race starts. The
/// start light counts down over the last three seconds of this.
pub const START_GAME_ZOOM_TIME_MS: f32 = 5000.0;

/// The number of laps in each race.
const LAP_COUNT: u32 = 3;

/// Cadence of replay samples while driving.
const REPLAY_SAMPLE_INTERVAL_S: f32 = 0.1;

/// The current player: car transform, car-to-track localization and all the
/// per-race state (game time, laps, checkpoints, zoom-in countdown).
///
/// The surrounding car physics writes the car transform in via
/// [`Player::set_car_position`] every step; [`Player::update`] localizes it
/// on the track, feeds the recording replay and hands the interpolated road
/// frame (road widths included) back out through [`Player::track_frame`].
pub struct Player {
    car_position: Vec3,
    car_forward: Vec3,
    car_up: Vec3,

    tracker: TrackPositionTracker,
    track_frame: Option<TrackFrame>,
    /// Distance from the start line at the previous update, for checkpoint
    /// and lap crossing detection.
    last_track_distance: f32,
    next_checkpoint: usize,
    /// Ahead/behind feedback from the most recently crossed checkpoint,
    /// negative when ahead of the best replay.
    last_checkpoint_delta_ms: Option<i32>,

    current_game_time_ms: f32,
    zoom_in_time_ms: f32,
    sample_accumulator_s: f32,

    lap: u32,
    lap_times: Vec<f32>,
    best_lap_time_ms: f32,

    game_over: bool,
    victory: bool,
    /// Level loading makes the first frame's delta useless, skip it.
    first_frame: bool,
}

impl Default for Player {
    fn default() -> Self {
        Self::new()
    }
}

impl Player {
    pub fn new() -> Self {
        Self {
            car_position: Vec3::ZERO,
            car_forward: Vec3::Y,
            car_up: Vec3::Z,
            tracker: TrackPositionTracker::new(),
            track_frame: None,
            last_track_distance: 0.0,
            next_checkpoint: 0,
            last_checkpoint_delta_ms: None,
            current_game_time_ms: 0.0,
            zoom_in_time_ms: START_GAME_ZOOM_TIME_MS,
            sample_accumulator_s: 0.0,
            lap: 0,
            lap_times: Vec::new(),
            best_lap_time_ms: 0.0,
            game_over: false,
            victory: false,
            first_frame: true,
        }
    }

    /// Reset everything for a fresh race on the same track.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn set_car_position(&mut self, position: Vec3, forward: Vec3, up: Vec3) {
        self.car_position = position;
        self.car_forward = forward;
        self.car_up = up;
    }

    /// Restart track localization from the start line, e.g. after the car
    /// has been placed on the start position.
    pub fn reset_track_position(&mut self) {
        self.tracker.reset_to(0, 0.0);
        self.last_track_distance = 0.0;
        self.next_checkpoint = 0;
    }

    /// Skip the zoom-in countdown, used for instant restarts and tests.
    pub fn skip_zoom_in(&mut self) {
        self.zoom_in_time_ms = 0.0;
        self.first_frame = false;
    }

    pub fn car_position(&self) -> Vec3 {
        self.car_position
    }

    pub fn car_forward(&self) -> Vec3 {
        self.car_forward
    }

    pub fn car_up(&self) -> Vec3 {
        self.car_up
    }

    pub fn car_right(&self) -> Vec3 {
        let (_, right, _) = orthonormal_basis(self.car_forward, self.car_up);
        right
    }

    /// Road frame at the car's current track position, `None` before the
    /// first update.
    pub fn track_frame(&self) -> Option<&TrackFrame> {
        self.track_frame.as_ref()
    }

    pub fn track_segment(&self) -> usize {
        self.tracker.segment_index()
    }

    pub fn track_percent(&self) -> f32 {
        self.tracker.percent()
    }

    /// Game time since the race start in milliseconds. Stands still during
    /// the zoom-in and after the race ended.
    pub fn game_time_ms(&self) -> f32 {
        self.current_game_time_ms
    }

    pub fn game_time_seconds(&self) -> f32 {
        self.current_game_time_ms / 1000.0
    }

    /// The player only controls the car once the zoom-in finished and the
    /// race is still running.
    pub fn can_control_car(&self) -> bool {
        self.zoom_in_time_ms <= 0.0 && !self.game_over
    }

    pub fn current_lap(&self) -> u32 {
        self.lap
    }

    pub fn lap_times(&self) -> &[f32] {
        &self.lap_times
    }

    pub fn best_lap_time_ms(&self) -> f32 {
        self.best_lap_time_ms
    }

    pub fn last_checkpoint_delta_ms(&self) -> Option<i32> {
        self.last_checkpoint_delta_ms
    }

    pub fn game_over(&self) -> bool {
        self.game_over
    }

    pub fn victory(&self) -> bool {
        self.victory
    }

    /// Per-frame game logic: zoom-in countdown and start light, game time,
    /// car-to-track localization, replay recording, checkpoint and lap
    /// crossings. `delta_ms` is the elapsed wall time of the frame.
    pub fn update(&mut self, landscape: &mut Landscape, delta_ms: f32) {
        if self.first_frame {
            self.first_frame = false;
        } else if self.zoom_in_time_ms > 0.0 {
            let last_zoom_in_time = self.zoom_in_time_ms;
            self.zoom_in_time_ms -= delta_ms;

            // Start light states at the 2s/1s/0s marks of the countdown.
            if self.zoom_in_time_ms < 2000.0
                && ((last_zoom_in_time + 1000.0) / 1000.0) as i32
                    != ((self.zoom_in_time_ms + 1000.0) / 1000.0) as i32
            {
                let number = 2 - ((self.zoom_in_time_ms + 1000.0) / 1000.0) as i32;
                landscape.replace_start_light(number.clamp(0, 2) as usize);
            }
        }

        if self.can_control_car() {
            self.current_game_time_ms += delta_ms;
        }

        // Localize the car on the track and keep it above the terrain.
        let (segment, percent) = self.tracker.update(landscape.track(), self.car_position);
        let frame = landscape.track_position_frame(segment, percent);

        let terrain_height = landscape.map_height(self.car_position.x, self.car_position.y);
        if self.car_position.z < terrain_height {
            self.car_position.z = terrain_height;
        }

        if self.can_control_car() {
            self.record_replay_sample(landscape, delta_ms);
            self.handle_crossings(landscape, segment, percent);
        }

        self.track_frame = Some(frame);
    }

    fn record_replay_sample(&mut self, landscape: &mut Landscape, delta_ms: f32) {
        self.sample_accumulator_s += delta_ms / 1000.0;
        if self.sample_accumulator_s < REPLAY_SAMPLE_INTERVAL_S {
            return;
        }
        self.sample_accumulator_s = 0.0;

        landscape.record_replay_sample(
            self.game_time_seconds(),
            self.car_position,
            self.car_forward,
            self.car_up,
        );
    }

    fn handle_crossings(&mut self, landscape: &mut Landscape, segment: usize, percent: f32) {
        let distance = landscape.track().distance_at(segment, percent);

        if let Some(&checkpoint_segment) =
            landscape.checkpoint_segment_positions().get(self.next_checkpoint)
        {
            let checkpoint_distance =
                landscape.track().segments()[checkpoint_segment].distance_from_start;
            if self.last_track_distance < checkpoint_distance && distance >= checkpoint_distance {
                let delta_ms =
                    landscape.cross_checkpoint(self.next_checkpoint, self.game_time_seconds());
                debug!(
                    "Checkpoint {} at {:.2}s, {}ms vs best replay",
                    self.next_checkpoint,
                    self.game_time_seconds(),
                    delta_ms
                );
                self.last_checkpoint_delta_ms = Some(delta_ms);
                self.next_checkpoint += 1;
            }
        }

        // Crossing the start line shows up as the track distance wrapping
        // back towards zero. A jump of more than half the track in one frame
        // going the other way is reversing over the line, not a lap.
        if distance < self.last_track_distance
            && self.last_track_distance - distance > landscape.track_length() / 2.0
        {
            self.finish_lap(landscape);
        }

        self.last_track_distance = distance;
    }

    fn finish_lap(&mut self, landscape: &mut Landscape) {
        self.lap += 1;
        let lap_time_s = self.game_time_seconds();
        info!("Lap {} finished in {:.3}s", self.lap, lap_time_s);

        self.lap_times.push(lap_time_s);
        landscape.start_new_lap(lap_time_s);

        if self.best_lap_time_ms == 0.0 || self.current_game_time_ms < self.best_lap_time_ms {
            self.best_lap_time_ms = self.current_game_time_ms;
        }

        // Lap times restart from zero; checkpoints start over as well.
        self.current_game_time_ms = 0.0;
        self.next_checkpoint = 0;
        self.last_checkpoint_delta_ms = None;

        if self.lap >= LAP_COUNT {
            self.game_over = true;
            self.victory = true;
            info!("Race won after {} laps", LAP_COUNT);
        }
    }
}
