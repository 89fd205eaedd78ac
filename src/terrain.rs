/// Deterministic heightmap query. Implemented by the terrain renderer
/// outside of this crate; used to keep placed scenery and the car above
/// ground level.
pub trait TerrainHeight {
    fn height_at(&self, x: f32, y: f32) -> f32;
}

/// Flat world, mostly useful for tests and the menu background.
#[derive(Debug, Default, Copy, Clone)]
pub struct FlatTerrain {
    pub height: f32,
}

impl TerrainHeight for FlatTerrain {
    fn height_at(&self, _x: f32, _y: f32) -> f32 {
        self.height
    }
}
