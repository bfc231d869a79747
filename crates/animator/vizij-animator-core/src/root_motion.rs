//! Root-motion extraction: per-tick delta of the root bone's motion channels.

use nalgebra::{UnitQuaternion, Vector3};

use crate::math::quat_to_euler;
use crate::outputs::RootMotionSample;

/// Where the active state is within its cycle this tick.
#[derive(Copy, Clone, Debug, Default)]
pub struct FrameFlags {
    pub first_frame: bool,
    pub last_frame: bool,
    /// Clip both loops and blends its loop seam.
    pub loop_blend_seam: bool,
}

#[derive(Clone, Debug)]
pub struct RootMotion {
    pub delta_position: Vector3<f32>,
    pub delta_rotation: UnitQuaternion<f32>,
    pub speed: f32,
    pub angular_velocity: Vector3<f32>,

    last_position: Vector3<f32>,
    last_rotation: UnitQuaternion<f32>,
    last_speed: f32,
    loop_start_speed: f32,
    loop_start_angular: Vector3<f32>,
}

impl Default for RootMotion {
    fn default() -> Self {
        Self {
            delta_position: Vector3::zeros(),
            delta_rotation: UnitQuaternion::identity(),
            speed: 0.0,
            angular_velocity: Vector3::zeros(),
            last_position: Vector3::zeros(),
            last_rotation: UnitQuaternion::identity(),
            last_speed: 0.0,
            loop_start_speed: 0.0,
            loop_start_angular: Vector3::zeros(),
        }
    }
}

impl RootMotion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget deltas and snapshots (state switch or stop).
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Zero the emitted delta without touching the snapshots.
    pub fn clear_delta(&mut self) {
        self.delta_position = Vector3::zeros();
        self.delta_rotation = UnitQuaternion::identity();
        self.speed = 0.0;
        self.angular_velocity = Vector3::zeros();
    }

    /// Difference the current root pose against last tick's snapshot.
    pub fn extract(
        &mut self,
        position: &Vector3<f32>,
        rotation: &UnitQuaternion<f32>,
        flags: FrameFlags,
        delta_time: f32,
    ) {
        if flags.first_frame {
            self.delta_position = *position;
            self.delta_rotation = *rotation;
        } else {
            self.delta_position = position - self.last_position;
            self.delta_rotation = self.last_rotation.inverse() * rotation;
        }

        let mut speed = if delta_time > 0.0 {
            self.delta_position.norm() / delta_time
        } else {
            0.0
        };
        let mut angular = quat_to_euler(&self.delta_rotation);

        if flags.first_frame {
            self.loop_start_speed = speed;
            self.loop_start_angular = angular;
        } else if flags.last_frame && flags.loop_blend_seam {
            speed = (speed + self.loop_start_speed) * 0.5;
            angular = (angular + self.loop_start_angular) * 0.5;
        }

        self.speed = if speed.is_finite() { speed } else { 0.0 };
        self.angular_velocity = angular;
        self.last_position = *position;
        self.last_rotation = *rotation;
        self.last_speed = self.speed;
    }

    /// Speed emitted on the previous tick.
    #[inline]
    pub fn last_speed(&self) -> f32 {
        self.last_speed
    }

    pub fn sample(&self) -> RootMotionSample {
        RootMotionSample {
            delta_position: self.delta_position,
            delta_rotation: self.delta_rotation,
            speed: self.speed,
            angular_velocity: self.angular_velocity,
        }
    }
}
