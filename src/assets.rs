use anyhow::Result;

/// Opaque handle into whatever renderer the surrounding game uses. The core
/// only carries it around so the scene composition can find the renderable
/// for a placed object again.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ModelHandle(pub u64);

/// Result of resolving a model name against the asset pipeline.
#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub name: String,
    /// Bounding sphere radius of the mesh, used for placement deduplication.
    /// The core never interprets the mesh data itself.
    pub bounding_radius: f32,
    pub handle: ModelHandle,
}

/// Abstraction over the game's asset loader.
pub trait ModelLoader {
    fn load_model(&self, name: &str) -> Result<LoadedModel>;
}
