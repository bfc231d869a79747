//! Transform (TRS) type and rotation helpers shared by the mixer, finalizer and root motion.
//!
//! Euler angles follow the yaw-pitch-roll convention: `R = Ry(y) * Rx(x) * Rz(z)`.

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::interp::functions::{lerp_f32, lerp_vec3, slerp_quat};

/// Decomposed local transform of an animated target.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub scale: Vector3<f32>,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub fn identity() -> Transform {
        Transform {
            position: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }

    pub fn new(
        position: Vector3<f32>,
        rotation: UnitQuaternion<f32>,
        scale: Vector3<f32>,
    ) -> Self {
        Self {
            position,
            rotation,
            scale,
        }
    }

    /// Blend two transforms: translation and scale lerp, rotation slerps.
    pub fn lerp(&self, other: &Transform, t: f32) -> Transform {
        Transform {
            position: lerp_vec3(&self.position, &other.position, t),
            rotation: slerp_quat(&self.rotation, &other.rotation, t),
            scale: lerp_vec3(&self.scale, &other.scale, t),
        }
    }

    pub fn approx_eq(&self, other: &Transform, eps: f32) -> bool {
        (self.position - other.position).norm() <= eps
            && self.rotation.angle_to(&other.rotation) <= eps
            && (self.scale - other.scale).norm() <= eps
    }
}

/// Euler angles (radians) of a rotation in yaw-pitch-roll order.
pub fn quat_to_euler(q: &UnitQuaternion<f32>) -> Vector3<f32> {
    let (qx, qy, qz, qw) = (q.i, q.j, q.k, q.w);
    let z_axis_y = qy * qz - qx * qw;
    const LIMIT: f32 = 0.499_999_9;

    if z_axis_y < -LIMIT {
        Vector3::new(
            std::f32::consts::FRAC_PI_2,
            2.0 * qy.atan2(qw),
            0.0,
        )
    } else if z_axis_y > LIMIT {
        Vector3::new(
            -std::f32::consts::FRAC_PI_2,
            2.0 * qy.atan2(qw),
            0.0,
        )
    } else {
        let sqw = qw * qw;
        let sqz = qz * qz;
        let sqx = qx * qx;
        let sqy = qy * qy;
        Vector3::new(
            (-2.0 * z_axis_y).asin(),
            (2.0 * (qz * qx + qy * qw)).atan2(sqz - sqx - sqy + sqw),
            (2.0 * (qx * qy + qz * qw)).atan2(-sqz - sqx + sqy + sqw),
        )
    }
}

/// Rotation from yaw-pitch-roll Euler angles (radians).
pub fn quat_from_euler(euler: &Vector3<f32>) -> UnitQuaternion<f32> {
    UnitQuaternion::from_axis_angle(&Vector3::y_axis(), euler.y)
        * UnitQuaternion::from_axis_angle(&Vector3::x_axis(), euler.x)
        * UnitQuaternion::from_axis_angle(&Vector3::z_axis(), euler.z)
}

/// Rotation about the up axis only.
#[inline]
pub fn yaw_rotation(yaw: f32) -> UnitQuaternion<f32> {
    UnitQuaternion::from_axis_angle(&Vector3::y_axis(), yaw)
}

/// Scalar blend used for morph-target influences.
#[inline]
pub fn lerp_influence(a: f32, b: f32, t: f32) -> f32 {
    lerp_f32(a, b, t)
}
