//! Output contracts from the controller.
//!
//! Outputs carry only the pose changes for this tick, keyed by the stable target handle the
//! host supplied at binding time, and a separate list of notifications.
//! Hosts apply changes to their scene graph and forward events as they see fit.

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::math::Transform;

/// Value written to one target this tick.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum PoseValue {
    Transform(Transform),
    Influence(f32),
}

/// One changed target value this tick.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Change {
    pub key: String, // TargetHandle
    pub value: PoseValue,
}

/// Root-motion delta extracted this tick.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RootMotionSample {
    pub delta_position: Vector3<f32>,
    pub delta_rotation: UnitQuaternion<f32>,
    pub speed: f32,
    /// Euler angles (radians) of the delta rotation.
    pub angular_velocity: Vector3<f32>,
}

/// Notifications fired by the controller.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[non_exhaustive]
pub enum AnimatorEvent {
    Awake,
    Init,
    Update {
        delta_time: f32,
    },
    /// About to switch the active state of a layer.
    Transition {
        layer: usize,
        from: Option<String>,
        to: String,
    },
    Loop {
        layer: usize,
        state: String,
        count: u32,
    },
    End {
        layer: usize,
        state: String,
    },
    /// Authored timed callback.
    Event {
        layer: usize,
        state: String,
        function: String,
        time: f32,
        data: serde_json::Value,
    },
    Ik {
        layer: usize,
        state: String,
    },
}

/// Outputs returned by `Controller::update()`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Outputs {
    #[serde(default)]
    pub changes: Vec<Change>,
    #[serde(default)]
    pub events: Vec<AnimatorEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_motion: Option<RootMotionSample>,
}

impl Outputs {
    #[inline]
    pub fn clear(&mut self) {
        self.changes.clear();
        self.events.clear();
        self.root_motion = None;
    }

    #[inline]
    pub fn push_change(&mut self, change: Change) {
        self.changes.push(change);
    }

    #[inline]
    pub fn push_event(&mut self, event: AnimatorEvent) {
        self.events.push(event);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.events.is_empty() && self.root_motion.is_none()
    }

    /// Latest change for a target handle, if any.
    pub fn change_for(&self, key: &str) -> Option<&PoseValue> {
        self.changes.iter().rev().find(|c| c.key == key).map(|c| &c.value)
    }
}
