use glam::Affine3A;
use itertools::Itertools;

/// One sub-placement of a combo group: a model name plus its offset
/// relative to the group anchor.
#[derive(Debug, Clone)]
pub struct ComboEntry {
    pub model_name: String,
    pub relative_transform: Affine3A,
}

/// Named group of scenery models placed together, e.g. a palm cluster or a
/// ruin arrangement. Level files reference the group by name; placement
/// expands it into its 5-15 sub-placements.
#[derive(Debug, Clone)]
pub struct ComboGroup {
    name: String,
    /// Rough footprint of the whole group, used to push it away from the
    /// road. The largest entry offset from the anchor, at least 1.
    size: f32,
    entries: Vec<ComboEntry>,
}

impl ComboGroup {
    pub fn new(name: impl Into<String>, entries: Vec<ComboEntry>) -> Self {
        let size = entries
            .iter()
            .map(|entry| entry.relative_transform.translation.length())
            .fold(1.0f32, f32::max);

        Self {
            name: name.into(),
            size,
            entries,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> f32 {
        self.size
    }

    pub fn entries(&self) -> &[ComboEntry] {
        &self.entries
    }

    /// World transforms of all sub-placements for a given group anchor.
    pub fn expanded_transforms(&self, anchor: Affine3A) -> Vec<(String, Affine3A)> {
        self.entries
            .iter()
            .map(|entry| (entry.model_name.clone(), anchor * entry.relative_transform))
            .collect_vec()
    }
}
