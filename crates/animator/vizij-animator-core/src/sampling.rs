//! Curve sampling at arbitrary continuous time.
//!
//! Model:
//! - Keys carry absolute times in seconds, ordered ascending.
//! - `WrapMode::Cycle` maps times outside the key range back into it modulo the span.
//! - `WrapMode::Clamp` holds the first/last key outside the range.
//! - Curves with fewer than two keys degrade to their nearest (only) key.
//!
//! The curve is never mutated; callers either receive a fresh value or provide storage.

use serde::{Deserialize, Serialize};

use crate::data::{Curve, CurveValue, Keyframe};
use crate::interp::functions::{bezier_ease_t, hermite_value, linear_value, step_value};
use crate::interp::Interpolation;

/// Behavior for times outside the curve's key range.
#[derive(Copy, Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum WrapMode {
    #[default]
    Cycle,
    Clamp,
}

fn fmod(a: f32, b: f32) -> f32 {
    if b == 0.0 {
        return 0.0;
    }
    let m = a % b;
    if (m < 0.0 && b > 0.0) || (m > 0.0 && b < 0.0) {
        m + b
    } else {
        m
    }
}

/// Map a time onto the curve's key range according to the wrap mode.
fn wrap_time(curve: &Curve, time: f32, wrap: WrapMode) -> f32 {
    let start = curve.start_time();
    let end = curve.end_time();
    match wrap {
        WrapMode::Clamp => time.clamp(start, end),
        WrapMode::Cycle => {
            let span = end - start;
            if span <= 0.0 {
                return start;
            }
            if time >= start && time <= end {
                time
            } else {
                start + fmod(time - start, span)
            }
        }
    }
}

/// Find the segment [i, i+1] containing `t`, and the local parameter within it.
/// Edge cases:
/// - If t <= first.time, returns (0, 0, 0).
/// - If t >= last.time, returns (last, last, 0).
fn find_segment(keys: &[Keyframe], t: f32) -> (usize, usize, f32) {
    let n = keys.len();
    if n == 0 {
        return (0, 0, 0.0);
    }
    if n == 1 || t <= keys[0].time {
        return (0, 0, 0.0);
    }
    if t >= keys[n - 1].time {
        return (n - 1, n - 1, 0.0);
    }
    // First key strictly after t; keys are sorted so binary search is valid.
    let right = keys.partition_point(|k| k.time <= t).min(n - 1);
    let left = right - 1;
    let t0 = keys[left].time;
    let t1 = keys[right].time;
    let denom = (t1 - t0).max(f32::EPSILON);
    (left, right, ((t - t0) / denom).clamp(0.0, 1.0))
}

fn interpolate(curve: &Curve, t: f32) -> CurveValue {
    let keys = &curve.keys;
    let (i0, i1, lt) = find_segment(keys, t);
    if i0 == i1 {
        return keys[i0].value.clone();
    }
    let left = &keys[i0];
    let right = &keys[i1];
    match curve.interpolation {
        Interpolation::Step => step_value(&left.value),
        Interpolation::Linear => linear_value(&left.value, &right.value, lt),
        Interpolation::Hermite => hermite_value(
            &left.value,
            left.out_tangent.as_ref(),
            &right.value,
            right.in_tangent.as_ref(),
            lt,
            right.time - left.time,
        ),
        Interpolation::Bezier { ctrl } => {
            linear_value(&left.value, &right.value, bezier_ease_t(lt, ctrl))
        }
    }
}

/// Sample a curve at `time` seconds. Returns `None` only for a curve without keys.
pub fn sample_curve(curve: &Curve, time: f32, wrap: WrapMode) -> Option<CurveValue> {
    match curve.keys.len() {
        0 => None,
        1 => Some(curve.keys[0].value.clone()),
        _ => Some(interpolate(curve, wrap_time(curve, time, wrap))),
    }
}

/// Sample into caller-owned storage. Returns false (leaving `out` untouched) for an empty curve.
pub fn sample_curve_into(curve: &Curve, time: f32, wrap: WrapMode, out: &mut CurveValue) -> bool {
    match sample_curve(curve, time, wrap) {
        Some(v) => {
            *out = v;
            true
        }
        None => false,
    }
}

/// Convenience for scalar tracks (parameter curves, morph influences).
pub fn sample_float(curve: &Curve, time: f32, wrap: WrapMode) -> Option<f32> {
    sample_curve(curve, time, wrap).and_then(|v| v.as_float())
}
