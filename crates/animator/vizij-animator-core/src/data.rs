//! Clip data model: keyframed curves grouped into per-target tracks.
//!
//! Key times are in seconds. A clip's `duration` is authoritative for mapping a state's
//! normalized time onto its tracks.

use serde::{Deserialize, Serialize};

use crate::error::{AnimatorError, Result};
use crate::ids::ClipId;
use crate::interp::Interpolation;

/// Keyed value carried by a curve.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum CurveValue {
    Float(f32),
    Vec3([f32; 3]),
    /// Quaternion (x, y, z, w)
    Quat([f32; 4]),
}

impl CurveValue {
    #[inline]
    pub fn as_float(&self) -> Option<f32> {
        match self {
            CurveValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

/// A single key on a curve.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Keyframe {
    /// Seconds from the start of the clip.
    pub time: f32,
    pub value: CurveValue,
    /// Incoming tangent (units per second), Hermite only.
    #[serde(default)]
    pub in_tangent: Option<CurveValue>,
    /// Outgoing tangent (units per second), Hermite only.
    #[serde(default)]
    pub out_tangent: Option<CurveValue>,
}

impl Keyframe {
    pub fn new(time: f32, value: CurveValue) -> Self {
        Self {
            time,
            value,
            in_tangent: None,
            out_tangent: None,
        }
    }
}

/// Ordered keys plus the interpolation used between them.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Curve {
    pub keys: Vec<Keyframe>,
    #[serde(default)]
    pub interpolation: Interpolation,
}

impl Curve {
    pub fn new(keys: Vec<Keyframe>, interpolation: Interpolation) -> Self {
        Self {
            keys,
            interpolation,
        }
    }

    pub fn linear(keys: Vec<Keyframe>) -> Self {
        Self::new(keys, Interpolation::Linear)
    }

    #[inline]
    pub fn start_time(&self) -> f32 {
        self.keys.first().map(|k| k.time).unwrap_or(0.0)
    }

    #[inline]
    pub fn end_time(&self) -> f32 {
        self.keys.last().map(|k| k.time).unwrap_or(0.0)
    }

    /// Time spanned by the keys (0 for fewer than two keys).
    #[inline]
    pub fn span(&self) -> f32 {
        (self.end_time() - self.start_time()).max(0.0)
    }

    /// Keys must be finite and non-decreasing in time.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let mut last = f32::NEG_INFINITY;
        for k in &self.keys {
            if !k.time.is_finite() {
                return Err("key time must be finite".into());
            }
            if k.time < last {
                return Err("key times must be non-decreasing".into());
            }
            last = k.time;
        }
        Ok(())
    }
}

/// Property a track drives on its target.
#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TrackProperty {
    Position,
    Rotation,
    Scale,
    /// Morph-target influence (scalar).
    Influence,
}

/// One animated property of one target.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Track {
    /// Transform path of the target (e.g. "Hips/Spine").
    pub target: String,
    pub property: TrackProperty,
    pub curve: Curve,
}

/// Authoring settings exported alongside a clip.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClipSettings {
    /// The clip loops when it reaches its end.
    pub loop_time: bool,
    /// Loop seam is blended (enables root-motion seam smoothing).
    pub loop_blend: bool,
    /// Bake root yaw into the pose instead of extracting it as root motion.
    pub loop_blend_orientation: bool,
    /// Bake root height into the pose.
    pub loop_blend_position_y: bool,
    /// Bake root horizontal translation into the pose.
    pub loop_blend_position_xz: bool,
    /// Yaw offset in degrees, authored with inverted sign.
    pub orientation_offset_y: f32,
    /// Height offset added to a baked root Y.
    pub level: f32,
    /// Average root velocity over the clip, as exported.
    pub average_speed: [f32; 3],
}

impl Default for ClipSettings {
    fn default() -> Self {
        Self {
            loop_time: true,
            loop_blend: false,
            loop_blend_orientation: false,
            loop_blend_position_y: false,
            loop_blend_position_xz: false,
            orientation_offset_y: 0.0,
            level: 0.0,
            average_speed: [0.0; 3],
        }
    }
}

/// A named animation group: tracks for many targets sharing one timeline.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AnimationClip {
    /// Assigned when loaded into a controller.
    #[serde(skip)]
    pub id: Option<ClipId>,
    pub name: String,
    /// Seconds.
    pub duration: f32,
    #[serde(default)]
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub settings: ClipSettings,
}

impl AnimationClip {
    pub fn new(name: impl Into<String>, duration: f32, tracks: Vec<Track>) -> Self {
        Self {
            id: None,
            name: name.into(),
            duration,
            tracks,
            settings: ClipSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ClipSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Normalized progress per second (1 / duration). Zero-length clips do not advance.
    #[inline]
    pub fn time_ratio(&self) -> f32 {
        if self.duration > 0.0 && self.duration.is_finite() {
            1.0 / self.duration
        } else {
            0.0
        }
    }

    /// Validate basic invariants (finite non-negative duration, ordered keys).
    pub fn validate_basic(&self) -> Result<()> {
        if !self.duration.is_finite() || self.duration < 0.0 {
            return Err(AnimatorError::InvalidClip {
                name: self.name.clone(),
                reason: "duration must be finite and >= 0".into(),
            });
        }
        for track in &self.tracks {
            track
                .curve
                .validate()
                .map_err(|reason| AnimatorError::InvalidClip {
                    name: self.name.clone(),
                    reason: format!("track '{}': {reason}", track.target),
                })?;
        }
        Ok(())
    }
}

/// Clips owned by a controller, addressed by dense ClipId.
#[derive(Default, Debug)]
pub struct ClipLibrary {
    items: Vec<AnimationClip>,
}

impl ClipLibrary {
    pub fn insert(&mut self, id: ClipId, mut clip: AnimationClip) {
        clip.id = Some(id);
        debug_assert_eq!(id.index(), self.items.len());
        self.items.push(clip);
    }

    #[inline]
    pub fn get(&self, id: ClipId) -> Option<&AnimationClip> {
        self.items.get(id.index())
    }

    pub fn find(&self, name: &str) -> Option<(ClipId, &AnimationClip)> {
        self.items
            .iter()
            .enumerate()
            .find(|(_, c)| c.name == name)
            .map(|(i, c)| (ClipId(i as u32), c))
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnimationClip> {
        self.items.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
