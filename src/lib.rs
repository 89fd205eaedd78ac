//! Track positioning, replay sampling and landscape placement core for an
//! arcade racing game.
//!
//! The crate is an in-process library: the surrounding game loop feeds car
//! positions in and gets the local road frame (forward/right/up, road widths)
//! back every simulation step. Rendering, input, UI and audio live outside;
//! they are reached through the [`assets::ModelLoader`] and
//! [`terrain::TerrainHeight`] traits.

pub mod assets;
pub mod context;
pub mod landscape;
pub mod player;
pub mod replay;
pub mod terrain;
pub mod track;
