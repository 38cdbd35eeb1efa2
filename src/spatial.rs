//! Listener-relative weighting of play requests.
//!
//! Every request for a sound within one frame contributes a position weighted by an
//! inverse-square falloff. Summing the weighted positions gives an energy-weighted
//! centroid, so the closest emitters dominate the perceived direction while distant
//! ones still add loudness.

use crate::math::{DVec2, DVec3};

/// Falloff weight of a request at `offset` (listener-relative world units).
///
/// The distance is scaled by `distance_scale` first. The `1 +` term keeps a sound at
/// the listener from becoming infinitely loud: the weight there is exactly 1.
pub fn weight_at(offset: DVec2, distance_scale: f64) -> f64 {
    let scaled = offset * distance_scale;
    1.0 / (1.0 + scaled.length_squared())
}

/// Accumulated weighted position of all requests for one sound in one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpatialWeight {
    sum: DVec2,
    weight: f64,
}

impl SpatialWeight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulator holding a single request at `offset`.
    pub fn at(offset: DVec2, distance_scale: f64) -> Self {
        let mut weight = Self::new();
        weight.add_position(offset, distance_scale);
        weight
    }

    /// Adds one request at `offset` from the listener.
    pub fn add_position(&mut self, offset: DVec2, distance_scale: f64) {
        let w = weight_at(offset, distance_scale);
        self.sum += w * offset * distance_scale;
        self.weight += w;
    }

    /// Folds another accumulator for the same sound into this one.
    pub fn merge(&mut self, other: &SpatialWeight) {
        self.sum += other.sum;
        self.weight += other.weight;
    }

    pub fn sum(&self) -> DVec2 {
        self.sum
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// True when the accumulator would produce an audible source.
    pub fn is_audible(&self) -> bool {
        self.weight > 0.0
    }

    /// Resolves the accumulated requests into a backend placement.
    ///
    /// Returns `None` when nothing was accumulated.
    pub fn placement(&self) -> Option<Placement> {
        if !self.is_audible() {
            return None;
        }

        let angle = self.sum / self.weight;
        let scale = (1.0 / (self.weight * (angle.length_squared() + 1.0))).sqrt();
        Some(Placement {
            direction: DVec3::new(angle.x, angle.y, 1.0),
            scale,
        })
    }
}

/// Where a voice should sit relative to the listener.
///
/// The source lies along `direction`, at a distance of `scale` times the direction's
/// length, i.e. `sqrt(1 / weight)` normalised units away. Louder (heavier) entries end
/// up closer to the listener.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub direction: DVec3,
    pub scale: f64,
}

impl Placement {
    /// Position to hand to the backend's positional call.
    pub fn position(&self) -> DVec3 {
        self.direction * self.scale
    }

    /// Distance from the listener in normalised units.
    pub fn distance(&self) -> f64 {
        self.position().length()
    }
}
