//! Interpolation helpers:
//! - lerp_f32 / lerp_vec3 (component-wise)
//! - slerp_quat (shortest arc, never panics on near-identical inputs)
//! - hermite_f32 (cubic Hermite with authored tangents)
//! - bezier_ease_t (cubic-bezier timing, control points in the normalized segment)
//! - step/linear/hermite over CurveValue

use nalgebra::{Quaternion, UnitQuaternion, Vector3};

use crate::data::CurveValue;

/// Linear interpolation of scalars.
#[inline]
pub fn lerp_f32(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[inline]
pub fn lerp_vec3(a: &Vector3<f32>, b: &Vector3<f32>, t: f32) -> Vector3<f32> {
    Vector3::new(
        lerp_f32(a.x, b.x, t),
        lerp_f32(a.y, b.y, t),
        lerp_f32(a.z, b.z, t),
    )
}

#[inline]
fn lerp_array3(a: [f32; 3], b: [f32; 3], t: f32) -> [f32; 3] {
    [
        lerp_f32(a[0], b[0], t),
        lerp_f32(a[1], b[1], t),
        lerp_f32(a[2], b[2], t),
    ]
}

/// Build a unit quaternion from (x, y, z, w); a zero quaternion maps to identity.
#[inline]
pub fn quat_from_array(q: [f32; 4]) -> UnitQuaternion<f32> {
    let len2 = q[0] * q[0] + q[1] * q[1] + q[2] * q[2] + q[3] * q[3];
    if len2 <= f32::EPSILON {
        return UnitQuaternion::identity();
    }
    UnitQuaternion::new_normalize(Quaternion::new(q[3], q[0], q[1], q[2]))
}

/// (x, y, z, w) view of a unit quaternion.
#[inline]
pub fn quat_to_array(q: &UnitQuaternion<f32>) -> [f32; 4] {
    [q.i, q.j, q.k, q.w]
}

/// Slerp between two unit quaternions along the shortest arc.
/// Falls back to normalized lerp when the inputs are nearly parallel.
pub fn slerp_quat(a: &UnitQuaternion<f32>, b: &UnitQuaternion<f32>, t: f32) -> UnitQuaternion<f32> {
    let qa = quat_to_array(a);
    let mut qb = quat_to_array(b);

    let mut dot = qa[0] * qb[0] + qa[1] * qb[1] + qa[2] * qb[2] + qa[3] * qb[3];

    // If the dot product is negative, slerp won't take the short path.
    if dot < 0.0 {
        qb = [-qb[0], -qb[1], -qb[2], -qb[3]];
        dot = -dot;
    }

    const DOT_THRESHOLD: f32 = 0.9995;
    if dot > DOT_THRESHOLD {
        return quat_from_array([
            lerp_f32(qa[0], qb[0], t),
            lerp_f32(qa[1], qb[1], t),
            lerp_f32(qa[2], qb[2], t),
            lerp_f32(qa[3], qb[3], t),
        ]);
    }

    let theta_0 = dot.clamp(-1.0, 1.0).acos();
    let theta = theta_0 * t;
    let sin_theta_0 = theta_0.sin();
    let s0 = (theta_0 - theta).sin() / sin_theta_0;
    let s1 = theta.sin() / sin_theta_0;

    quat_from_array([
        s0 * qa[0] + s1 * qb[0],
        s0 * qa[1] + s1 * qb[1],
        s0 * qa[2] + s1 * qb[2],
        s0 * qa[3] + s1 * qb[3],
    ])
}

/// Cubic Hermite between (v0, out-tangent m0) and (v1, in-tangent m1).
/// Tangents are already scaled to the segment length.
#[inline]
pub fn hermite_f32(v0: f32, m0: f32, v1: f32, m1: f32, t: f32) -> f32 {
    let t2 = t * t;
    let t3 = t2 * t;
    let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
    let h10 = t3 - 2.0 * t2 + t;
    let h01 = -2.0 * t3 + 3.0 * t2;
    let h11 = t3 - t2;
    h00 * v0 + h10 * m0 + h01 * v1 + h11 * m1
}

/// Cubic Bezier basis function
#[inline]
fn cubic_bezier(p0: f32, p1: f32, p2: f32, p3: f32, t: f32) -> f32 {
    let u = 1.0 - t;
    u * u * u * p0 + 3.0 * u * u * t * p1 + 3.0 * u * t * t * p2 + t * t * t * p3
}

/// Given control points (x1, y1, x2, y2) and an input t in [0,1],
/// compute the eased y by inverting the x bezier via binary search.
pub fn bezier_ease_t(t: f32, ctrl: [f32; 4]) -> f32 {
    let [x1, y1, x2, y2] = ctrl;
    let t = t.clamp(0.0, 1.0);
    // Bezier(0,0,1,1) is exactly linear
    if x1 == 0.0 && y1 == 0.0 && x2 == 1.0 && y2 == 1.0 {
        return t;
    }
    let mut lo = 0.0f32;
    let mut hi = 1.0f32;
    let mut mid = t;
    for _ in 0..24 {
        let x = cubic_bezier(0.0, x1, x2, 1.0, mid);
        if (x - t).abs() < 1e-6 {
            break;
        }
        if x < t {
            lo = mid;
        } else {
            hi = mid;
        }
        mid = 0.5 * (lo + hi);
    }
    cubic_bezier(0.0, y1, y2, 1.0, mid)
}

/// Step interpolation: hold the left value.
#[inline]
pub fn step_value(a: &CurveValue) -> CurveValue {
    a.clone()
}

/// Linear interpolation across curve kinds (quaternions slerp).
pub fn linear_value(a: &CurveValue, b: &CurveValue, t: f32) -> CurveValue {
    match (a, b) {
        (CurveValue::Float(va), CurveValue::Float(vb)) => CurveValue::Float(lerp_f32(*va, *vb, t)),
        (CurveValue::Vec3(va), CurveValue::Vec3(vb)) => CurveValue::Vec3(lerp_array3(*va, *vb, t)),
        (CurveValue::Quat(qa), CurveValue::Quat(qb)) => {
            let q = slerp_quat(&quat_from_array(*qa), &quat_from_array(*qb), t);
            CurveValue::Quat(quat_to_array(&q))
        }
        // Mismatched kinds: prefer left (fail-soft).
        _ => a.clone(),
    }
}

/// Hermite interpolation across curve kinds. Missing tangents count as flat.
/// Quaternions have no meaningful component-wise Hermite here and slerp instead.
pub fn hermite_value(
    a: &CurveValue,
    out_tangent: Option<&CurveValue>,
    b: &CurveValue,
    in_tangent: Option<&CurveValue>,
    t: f32,
    segment: f32,
) -> CurveValue {
    match (a, b) {
        (CurveValue::Float(va), CurveValue::Float(vb)) => {
            let m0 = match out_tangent {
                Some(CurveValue::Float(m)) => *m * segment,
                _ => 0.0,
            };
            let m1 = match in_tangent {
                Some(CurveValue::Float(m)) => *m * segment,
                _ => 0.0,
            };
            CurveValue::Float(hermite_f32(*va, m0, *vb, m1, t))
        }
        (CurveValue::Vec3(va), CurveValue::Vec3(vb)) => {
            let m0 = match out_tangent {
                Some(CurveValue::Vec3(m)) => [m[0] * segment, m[1] * segment, m[2] * segment],
                _ => [0.0; 3],
            };
            let m1 = match in_tangent {
                Some(CurveValue::Vec3(m)) => [m[0] * segment, m[1] * segment, m[2] * segment],
                _ => [0.0; 3],
            };
            CurveValue::Vec3([
                hermite_f32(va[0], m0[0], vb[0], m1[0], t),
                hermite_f32(va[1], m0[1], vb[1], m1[1], t),
                hermite_f32(va[2], m0[2], vb[2], m1[2], t),
            ])
        }
        _ => linear_value(a, b, t),
    }
}
