pub mod combos;

use crate::assets::{LoadedModel, ModelLoader};
use crate::landscape::combos::ComboGroup;
use crate::player::Player;
use crate::replay::{Replay, persistence};
use crate::terrain::TerrainHeight;
use crate::track::{TrackFrame, TrackSpline};
use anyhow::{Context, Result};
use glam::{Affine3A, Vec3};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Start light model for each countdown state, 0=red, 1=yellow, 2=green.
const START_LIGHT_MODELS: [&str; 3] = ["StartLight", "StartLight2", "StartLight3"];

/// Signage is allowed to overlap other scenery, everything else gets the
/// proximity dedup treatment.
const DEDUP_EXEMPT_PREFIXES: [&str; 3] = ["Banner", "Sign", "StartLight"];

/// One checkpoint roughly every this many meters of track.
const CHECKPOINT_SPACING: f32 = 250.0;

/// Scenery near the road is pushed at least this far off the road center
/// before its own size is taken into account.
const ROADSIDE_CLEARANCE: f32 = 10.0;

/// A static scenery object placed into the level.
#[derive(Debug, Clone)]
pub struct LandscapeObject {
    pub name: String,
    pub model: LoadedModel,
    pub transform: Affine3A,
}

impl LandscapeObject {
    pub fn position(&self) -> Vec3 {
        self.transform.translation.into()
    }

    /// Swap the renderable without creating a new object. Only the start
    /// light uses this, driven by the countdown.
    pub fn change_model(&mut self, name: impl Into<String>, model: LoadedModel) {
        self.name = name.into();
        self.model = model;
    }
}

/// The loaded level: track spline, placed scenery and the two replays
/// (best lap for the ghost car, plus the one currently being recorded).
///
/// Created at level load, dropped at teardown; all state that used to live
/// in global singletons in comparable engines is owned here explicitly.
pub struct Landscape {
    track_name: String,
    track: TrackSpline,
    checkpoint_segments: Vec<usize>,

    terrain: Arc<dyn TerrainHeight>,
    model_loader: Arc<dyn ModelLoader>,

    combos: Vec<ComboGroup>,
    objects: Vec<LandscapeObject>,
    /// Index of the start light in `objects`, tracked by name prefix.
    start_light: Option<usize>,

    best_replay: Replay,
    new_replay: Replay,
    replay_path: PathBuf,
    /// Most recent background save, joinable for teardown and tests.
    pending_save: Option<JoinHandle<()>>,
}

impl Landscape {
    pub fn new(
        track_name: impl Into<String>,
        track: TrackSpline,
        combos: Vec<ComboGroup>,
        terrain: Arc<dyn TerrainHeight>,
        model_loader: Arc<dyn ModelLoader>,
        replay_dir: PathBuf,
    ) -> Self {
        let track_name = track_name.into();
        let replay_path = replay_dir.join(format!("{}.replay", track_name));

        // A missing or unreadable best replay is normal on a fresh
        // installation; start from an empty one that any lap beats.
        let best_replay = match persistence::load_replay(&replay_path) {
            Ok(replay) => {
                info!(
                    "Loaded best replay for {} (lap time {:.2}s)",
                    track_name,
                    replay.lap_time()
                );
                replay
            }
            Err(cause) => {
                debug!("No best replay for {} yet: {:#}", track_name, cause);
                Replay::new()
            }
        };

        let checkpoint_segments = track.checkpoint_segment_positions(CHECKPOINT_SPACING);

        Self {
            track_name,
            track,
            checkpoint_segments,
            terrain,
            model_loader,
            combos,
            objects: Vec::new(),
            start_light: None,
            best_replay,
            new_replay: Replay::new(),
            replay_path,
            pending_save: None,
        }
    }

    pub fn track_name(&self) -> &str {
        &self.track_name
    }

    pub fn track(&self) -> &TrackSpline {
        &self.track
    }

    pub fn track_length(&self) -> f32 {
        self.track.length()
    }

    /// Checkpoint segment indices, in driving order.
    pub fn checkpoint_segment_positions(&self) -> &[usize] {
        &self.checkpoint_segments
    }

    pub fn objects(&self) -> &[LandscapeObject] {
        &self.objects
    }

    pub fn best_replay(&self) -> &Replay {
        &self.best_replay
    }

    pub fn new_replay(&self) -> &Replay {
        &self.new_replay
    }

    /// Terrain height at an XY position.
    pub fn map_height(&self, x: f32, y: f32) -> f32 {
        self.terrain.height_at(x, y)
    }

    /// Road frame for a `(segment, percent)` reference, with road widths.
    pub fn track_position_frame(&self, segment_index: usize, percent: f32) -> TrackFrame {
        self.track.evaluate(segment_index, percent)
    }

    /// Road frame at a distance from start, used for the menu background.
    pub fn track_position_frame_at(&self, track_distance: f32) -> TrackFrame {
        self.track.frame_at_distance(track_distance)
    }

    /// Place the car on the start finish line, facing down the track.
    pub fn set_car_to_start_position(&self, player: &mut Player) {
        let start = self.track.start_frame();
        player.set_car_position(start.position, start.forward, start.up);
        player.reset_track_position();
    }

    pub fn kill_all_loaded_objects(&mut self) {
        self.objects.clear();
        self.start_light = None;
    }

    /// Place scenery into the level. `model_name` either names a combo
    /// group, which expands into all of its sub-placements, or a single
    /// model. The object is lifted to terrain height (never lowered) and
    /// non-signage placements too close to an existing object are skipped.
    pub fn add_object_to_render(&mut self, model_name: &str, transform: Affine3A) {
        // Combos expand through this method again, one call per sub-model.
        if let Some(combo) = self.combos.iter().find(|combo| combo.name() == model_name) {
            for (name, sub_transform) in combo.expanded_transforms(transform) {
                self.add_object_to_render(&name, sub_transform);
            }
            return;
        }

        let mut transform = transform;
        let mut position: Vec3 = transform.translation.into();

        // Never sink scenery below the terrain.
        let terrain_height = self.map_height(position.x, position.y);
        if position.z < terrain_height {
            position.z = terrain_height;
            transform.translation = position.into();
        }

        // A missing model is a level data problem, not a reason to abort
        // loading the rest of the level.
        let model = match self.model_loader.load_model(model_name) {
            Ok(model) => model,
            Err(cause) => {
                warn!("Skipping landscape object {}: {:#}", model_name, cause);
                return;
            }
        };

        if !Self::is_dedup_exempt(model_name) {
            let size = model.bounding_radius * 2.0;
            let too_close = self
                .objects
                .iter()
                .any(|other| other.position().distance_squared(position) < size * size / 4.0);
            if too_close {
                debug!("Skipping {} at {:?}, too close to existing object", model_name, position);
                return;
            }
        }

        self.objects.push(LandscapeObject {
            name: model_name.to_string(),
            model,
            transform,
        });

        if model_name.starts_with("StartLight") {
            self.start_light = Some(self.objects.len() - 1);
        }
    }

    /// Place scenery relative to the road frame: rotated around Z and
    /// pushed `distance` meters along the track's right vector, far enough
    /// out that the object clears the road.
    pub fn add_object_near_track(
        &mut self,
        model_name: &str,
        rotation: f32,
        track_position: Vec3,
        track_right: Vec3,
        distance: f32,
    ) {
        let object_size = self.object_size(model_name);

        let mut distance = distance;
        if distance > 0.0 && distance - ROADSIDE_CLEARANCE < object_size {
            distance += object_size;
        }
        if distance < 0.0 && distance + ROADSIDE_CLEARANCE > -object_size {
            distance -= object_size;
        }

        // Start far below ground; the terrain clamp lifts it to the surface.
        let translation = track_position + track_right * distance + Vec3::new(0.0, 0.0, -100.0);
        let transform = Affine3A::from_translation(translation) * Affine3A::from_rotation_z(rotation);

        self.add_object_to_render(model_name, transform);
    }

    /// Scatter scenery along the roadside to fill the level up. The seed
    /// makes the layout reproducible per track.
    pub fn generate_roadside_objects(&mut self, seed: u64, model_names: &[&str], count: usize) {
        if model_names.is_empty() || self.track.length() <= 0.0 {
            return;
        }

        let mut rng = StdRng::seed_from_u64(seed);

        for _ in 0..count {
            let name = model_names[rng.random_range(0..model_names.len())];
            let frame = self.track.frame_at_distance(rng.random_range(0.0..self.track.length()));

            let side = if rng.random_bool(0.5) { 1.0 } else { -1.0 };
            let distance = side * rng.random_range(15.0..40.0);
            let rotation = rng.random_range(0.0..std::f32::consts::TAU);

            self.add_object_near_track(name, rotation, frame.position, frame.right, distance);
        }
    }

    /// Swap the start light model, 0=red, 1=yellow, 2=green. Out-of-range
    /// states fall back to red. Does nothing before the light is placed.
    pub fn replace_start_light(&mut self, number: usize) {
        let number = if number < START_LIGHT_MODELS.len() { number } else { 0 };

        let Some(index) = self.start_light else {
            return;
        };

        let name = START_LIGHT_MODELS[number];
        match self.model_loader.load_model(name) {
            Ok(model) => self.objects[index].change_model(name, model),
            Err(cause) => warn!("Start light model {} unavailable: {:#}", name, cause),
        }
    }

    /// Append a car transform sample to the actively recorded replay.
    pub fn record_replay_sample(&mut self, time: f32, position: Vec3, forward: Vec3, up: Vec3) {
        self.new_replay.record(time, position, forward, up);
    }

    /// Record the crossing time of the given checkpoint in the actively
    /// recorded replay and return the signed delta in milliseconds against
    /// the best replay (negative = ahead of the best lap).
    pub fn cross_checkpoint(&mut self, checkpoint_num: usize, time_seconds: f32) -> i32 {
        self.new_replay.add_checkpoint_time(time_seconds);
        self.best_replay
            .compare_checkpoint_time(checkpoint_num, time_seconds * 1000.0)
    }

    /// Signed ahead/behind delta in ms versus the best replay's checkpoint.
    pub fn compare_checkpoint_time(&self, checkpoint_num: usize, current_time_ms: f32) -> i32 {
        self.best_replay
            .compare_checkpoint_time(checkpoint_num, current_time_ms)
    }

    /// Finish the current lap. A strictly faster lap becomes the new best
    /// replay and a clone of it is saved on a worker thread; either way a
    /// fresh recording starts for the next lap. Returns whether the lap
    /// became the new best.
    pub fn start_new_lap(&mut self, lap_time_seconds: f32) -> bool {
        if lap_time_seconds < self.best_replay.lap_time() {
            info!(
                "New best lap on {}: {:.3}s (previous {:.3}s)",
                self.track_name,
                lap_time_seconds,
                self.best_replay.lap_time()
            );

            // Final checkpoint is the finish line itself.
            self.new_replay.add_checkpoint_time(lap_time_seconds);
            self.new_replay.set_lap_time(lap_time_seconds);

            // The worker only touches its private clone; the simulation
            // thread keeps recording into the fresh replay meanwhile.
            self.pending_save = Some(persistence::save_replay_async(
                self.replay_path.clone(),
                self.new_replay.clone(),
            ));

            self.best_replay = std::mem::take(&mut self.new_replay);
            true
        } else {
            self.new_replay = Replay::new();
            false
        }
    }

    /// Join the most recent background replay save, for teardown and tests.
    pub fn wait_for_pending_save(&mut self) -> Result<()> {
        if let Some(handle) = self.pending_save.take() {
            handle
                .join()
                .ok()
                .context("Replay save thread panicked")?;
        }
        Ok(())
    }

    fn is_dedup_exempt(model_name: &str) -> bool {
        DEDUP_EXEMPT_PREFIXES
            .iter()
            .any(|prefix| model_name.starts_with(prefix))
    }

    /// Footprint of a combo group or single model, for roadside clearance.
    /// Unknown models count as size 0 and get rejected later in placement.
    fn object_size(&self, model_name: &str) -> f32 {
        if let Some(combo) = self.combos.iter().find(|combo| combo.name() == model_name) {
            return combo.size();
        }

        match self.model_loader.load_model(model_name) {
            Ok(model) => model.bounding_radius * 2.0,
            Err(_) => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Landscape;
    use crate::assets::{LoadedModel, ModelHandle, ModelLoader};
    use crate::landscape::combos::{ComboEntry, ComboGroup};
    use crate::terrain::{FlatTerrain, TerrainHeight};
    use anyhow::{Result, bail};
    use approx::assert_relative_eq;
    use glam::{Affine3A, Vec3};
    use std::sync::Arc;

    struct StubLoader {
        known: Vec<(&'static str, f32)>,
    }

    impl StubLoader {
        fn with_all_defaults() -> Self {
            Self { known: Vec::new() }
        }
    }

    impl ModelLoader for StubLoader {
        fn load_model(&self, name: &str) -> Result<LoadedModel> {
            if name == "Missing" {
                bail!("Model {} not found in asset pack", name);
            }

            let bounding_radius = self
                .known
                .iter()
                .find(|(known, _)| *known == name)
                .map(|(_, radius)| *radius)
                .unwrap_or(2.0);

            Ok(LoadedModel {
                name: name.to_string(),
                bounding_radius,
                handle: ModelHandle(name.len() as u64),
            })
        }
    }

    /// Terrain that is raised to 5.0 around (100, 100), flat 0 elsewhere.
    struct SteppedTerrain;

    impl TerrainHeight for SteppedTerrain {
        fn height_at(&self, x: f32, y: f32) -> f32 {
            if (x - 100.0).abs() < 10.0 && (y - 100.0).abs() < 10.0 {
                5.0
            } else {
                0.0
            }
        }
    }

    fn square_track() -> crate::track::TrackSpline {
        crate::track::TrackSpline::from_points(
            &[
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(200.0, 0.0, 0.0),
                Vec3::new(200.0, 200.0, 0.0),
                Vec3::new(0.0, 200.0, 0.0),
            ],
            &[10.0; 4],
        )
        .unwrap()
    }

    /// The TempDir keeps the replay directory alive for the test's duration.
    fn landscape_with(
        combos: Vec<ComboGroup>,
        terrain: Arc<dyn TerrainHeight>,
    ) -> (Landscape, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let landscape = Landscape::new(
            "TrackBeginner",
            square_track(),
            combos,
            terrain,
            Arc::new(StubLoader::with_all_defaults()),
            dir.path().to_path_buf(),
        );
        (landscape, dir)
    }

    fn place_at(landscape: &mut Landscape, name: &str, position: Vec3) {
        landscape.add_object_to_render(name, Affine3A::from_translation(position));
    }

    #[test]
    fn object_below_terrain_is_raised_never_lowered() {
        let (mut landscape, _dir) = landscape_with(vec![], Arc::new(SteppedTerrain));

        place_at(&mut landscape, "Kaktus", Vec3::new(100.0, 100.0, 2.0));
        assert_relative_eq!(landscape.objects()[0].position().z, 5.0, epsilon = 1e-5);

        place_at(&mut landscape, "Windmill", Vec3::new(100.0, 100.0, 7.5));
        assert_relative_eq!(landscape.objects()[1].position().z, 7.5, epsilon = 1e-5);
    }

    #[test]
    fn duplicate_placement_is_deduplicated() {
        let (mut landscape, _dir) = landscape_with(vec![], Arc::new(FlatTerrain::default()));

        place_at(&mut landscape, "Stone4", Vec3::new(50.0, 50.0, 0.0));
        place_at(&mut landscape, "Stone4", Vec3::new(50.0, 50.0, 0.0));

        assert_eq!(landscape.objects().len(), 1);
    }

    #[test]
    fn signage_is_exempt_from_deduplication() {
        let (mut landscape, _dir) = landscape_with(vec![], Arc::new(FlatTerrain::default()));

        place_at(&mut landscape, "Sign2", Vec3::new(50.0, 50.0, 0.0));
        place_at(&mut landscape, "Sign2", Vec3::new(50.0, 50.0, 0.0));

        assert_eq!(landscape.objects().len(), 2);
    }

    #[test]
    fn objects_outside_each_others_radius_both_stay() {
        let (mut landscape, _dir) = landscape_with(vec![], Arc::new(FlatTerrain::default()));

        // Stub radius 2.0 means size 4.0, dedup within sqrt(16/4) = 2 meters.
        place_at(&mut landscape, "Stone4", Vec3::new(50.0, 50.0, 0.0));
        place_at(&mut landscape, "Stone5", Vec3::new(53.0, 50.0, 0.0));

        assert_eq!(landscape.objects().len(), 2);
    }

    #[test]
    fn missing_model_is_skipped_not_fatal() {
        let (mut landscape, _dir) = landscape_with(vec![], Arc::new(FlatTerrain::default()));

        place_at(&mut landscape, "Missing", Vec3::new(10.0, 10.0, 0.0));
        place_at(&mut landscape, "Kaktus", Vec3::new(10.0, 10.0, 0.0));

        assert_eq!(landscape.objects().len(), 1);
        assert_eq!(landscape.objects()[0].name, "Kaktus");
    }

    #[test]
    fn combo_expands_into_its_sub_placements() {
        let combo = ComboGroup::new(
            "CombiStones",
            vec![
                ComboEntry {
                    model_name: "Stone4".to_string(),
                    relative_transform: Affine3A::from_translation(Vec3::new(10.0, 0.0, 0.0)),
                },
                ComboEntry {
                    model_name: "Stone5".to_string(),
                    relative_transform: Affine3A::from_translation(Vec3::new(-10.0, 0.0, 0.0)),
                },
                ComboEntry {
                    model_name: "SharpRock".to_string(),
                    relative_transform: Affine3A::from_translation(Vec3::new(0.0, 10.0, 0.0)),
                },
            ],
        );
        let (mut landscape, _dir) = landscape_with(vec![combo], Arc::new(FlatTerrain::default()));

        place_at(&mut landscape, "CombiStones", Vec3::new(100.0, 50.0, 0.0));

        assert_eq!(landscape.objects().len(), 3);
    }

    #[test]
    fn start_light_is_tracked_and_swappable() {
        let (mut landscape, _dir) = landscape_with(vec![], Arc::new(FlatTerrain::default()));

        place_at(&mut landscape, "StartLight", Vec3::new(0.0, 0.0, 0.0));
        assert_eq!(landscape.objects()[0].name, "StartLight");

        landscape.replace_start_light(2);
        assert_eq!(landscape.objects()[0].name, "StartLight3");

        // Out of range falls back to red.
        landscape.replace_start_light(7);
        assert_eq!(landscape.objects()[0].name, "StartLight");
    }

    #[test]
    fn roadside_objects_clear_the_road() {
        let (mut landscape, _dir) = landscape_with(vec![], Arc::new(FlatTerrain::default()));
        let frame = landscape.track().frame_at_distance(100.0);

        landscape.add_object_near_track("Kaktus", 0.0, frame.position, frame.right, 5.0);

        assert_eq!(landscape.objects().len(), 1);
        let placed = landscape.objects()[0].position();
        // 5m requested, pushed out by the object size (radius 2 -> size 4).
        assert!(placed.distance(frame.position) >= 9.0 - 1e-3);
        // And lifted from z = -100 back onto the terrain.
        assert_relative_eq!(placed.z, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn roadside_generation_is_reproducible() {
        let (mut first, _dir_a) = landscape_with(vec![], Arc::new(FlatTerrain::default()));
        let (mut second, _dir_b) = landscape_with(vec![], Arc::new(FlatTerrain::default()));
        let names = ["Kaktus", "AlphaPalm", "Stone4"];

        first.generate_roadside_objects(1234, &names, 20);
        second.generate_roadside_objects(1234, &names, 20);

        assert_eq!(first.objects().len(), second.objects().len());
        for (a, b) in first.objects().iter().zip(second.objects()) {
            assert_eq!(a.name, b.name);
            assert_relative_eq!(a.position().x, b.position().x, epsilon = 1e-5);
            assert_relative_eq!(a.position().y, b.position().y, epsilon = 1e-5);
        }
    }

    #[test]
    fn faster_lap_replaces_best_replay() {
        let (mut landscape, _dir) = landscape_with(vec![], Arc::new(FlatTerrain::default()));
        landscape.start_new_lap(90.0);
        landscape.wait_for_pending_save().ok();
        assert_relative_eq!(landscape.best_replay().lap_time(), 90.0);

        assert!(landscape.start_new_lap(85.0));
        landscape.wait_for_pending_save().ok();
        assert_relative_eq!(landscape.best_replay().lap_time(), 85.0);

        assert!(!landscape.start_new_lap(95.0));
        assert_relative_eq!(landscape.best_replay().lap_time(), 85.0);
    }

    #[test]
    fn best_replay_survives_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut landscape = Landscape::new(
            "TrackExpert",
            square_track(),
            vec![],
            Arc::new(FlatTerrain::default()),
            Arc::new(StubLoader::with_all_defaults()),
            dir.path().to_path_buf(),
        );

        landscape.record_replay_sample(0.0, Vec3::ZERO, Vec3::Y, Vec3::Z);
        landscape.record_replay_sample(1.0, Vec3::Y, Vec3::Y, Vec3::Z);
        assert!(landscape.start_new_lap(72.5));
        landscape.wait_for_pending_save().unwrap();

        let reloaded = Landscape::new(
            "TrackExpert",
            square_track(),
            vec![],
            Arc::new(FlatTerrain::default()),
            Arc::new(StubLoader::with_all_defaults()),
            dir.path().to_path_buf(),
        );

        assert_relative_eq!(reloaded.best_replay().lap_time(), 72.5);
        assert_eq!(reloaded.best_replay().samples().len(), 2);
    }

    #[test]
    fn checkpoint_crossing_records_and_compares() {
        let (mut landscape, _dir) = landscape_with(vec![], Arc::new(FlatTerrain::default()));

        // Establish a best replay with known checkpoint times.
        landscape.cross_checkpoint(0, 30.0);
        landscape.start_new_lap(60.0);

        // Next lap reaches checkpoint 0 two seconds earlier.
        let delta = landscape.cross_checkpoint(0, 28.0);
        assert_eq!(delta, -2000);
    }
}
