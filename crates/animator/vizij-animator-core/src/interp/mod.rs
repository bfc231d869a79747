//! Keyframe interpolation modes and helpers.
//!
//! Quaternion tracks always slerp (shortest arc) unless stepped.

pub mod functions;

use serde::{Deserialize, Serialize};

/// How a curve segment moves from its left key to its right key.
#[derive(Copy, Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Interpolation {
    /// Hold the left key.
    Step,
    #[default]
    Linear,
    /// Cubic Hermite using the keys' tangents (per second).
    Hermite,
    /// Cubic-bezier timing (x1, y1, x2, y2) followed by a linear value blend.
    Bezier { ctrl: [f32; 4] },
}
