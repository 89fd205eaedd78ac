use crate::assets::ModelLoader;
use crate::landscape::Landscape;
use crate::landscape::combos::ComboGroup;
use crate::player::Player;
use crate::terrain::TerrainHeight;
use crate::track::TrackSpline;
use anyhow::Result;
use glam::Vec3;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

/// Everything needed to load a level.
pub struct LevelDescriptor {
    pub track_name: String,
    /// Ordered control points of the closed track loop.
    pub control_points: Vec<Vec3>,
    /// Road width at each control point.
    pub road_widths: Vec<f32>,
    pub combos: Vec<ComboGroup>,
    /// Directory the best replay is loaded from and saved to.
    pub replay_dir: PathBuf,
}

/// Owns the simulation state of one race: the landscape (track, scenery,
/// replays) and the player. Created at level load, dropped at teardown;
/// the simulation and rendering entry points receive it explicitly instead
/// of reaching for globals.
pub struct RaceContext {
    landscape: Landscape,
    player: Player,
}

impl RaceContext {
    pub fn load(
        level: LevelDescriptor,
        terrain: Arc<dyn TerrainHeight>,
        model_loader: Arc<dyn ModelLoader>,
    ) -> Result<Self> {
        info!("Loading level {}", level.track_name);

        let track = TrackSpline::from_points(&level.control_points, &level.road_widths)?;
        let mut landscape = Landscape::new(
            level.track_name,
            track,
            level.combos,
            terrain,
            model_loader,
            level.replay_dir,
        );

        let mut player = Player::new();
        landscape.set_car_to_start_position(&mut player);

        Ok(Self { landscape, player })
    }

    pub fn landscape(&self) -> &Landscape {
        &self.landscape
    }

    pub fn landscape_mut(&mut self) -> &mut Landscape {
        &mut self.landscape
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut Player {
        &mut self.player
    }

    /// One simulation step. The car physics outside this crate has already
    /// written the car transform into the player for this frame.
    pub fn update(&mut self, delta_ms: f32) {
        self.player.update(&mut self.landscape, delta_ms);
    }

    /// Restart the race on the same landscape.
    pub fn restart(&mut self) {
        self.player.reset();
        self.landscape.set_car_to_start_position(&mut self.player);
    }
}

impl Drop for RaceContext {
    fn drop(&mut self) {
        // Don't tear the level down in the middle of a replay write.
        if let Err(cause) = self.landscape.wait_for_pending_save() {
            log::warn!("{:#}", cause);
        }
    }
}
