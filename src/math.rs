//! Math types for PetalMix
//!
//! The mixer works in a 2D world plane; positions handed to the playback backend are
//! lifted into 3D so the backend can apply its own distance model.

pub use glam::{DVec2, DVec3};
