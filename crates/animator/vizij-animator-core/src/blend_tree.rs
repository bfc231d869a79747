//! Blend-tree weight solving.
//!
//! Every solver is a pure function of the current parameter value(s) and the children's static
//! thresholds/positions; nothing is carried between ticks. Weights of the 1D and 2D solvers sum
//! to one. `Direct` trees take each child's weight verbatim from its own parameter.
//!
//! `SimpleDirectional2D` shares the freeform directional solver: no separate polar-sector
//! restriction is applied.

use serde::{Deserialize, Serialize};

use crate::ids::ClipId;
use crate::params::ParameterStore;

/// Angular distance counts this many times more than radial distance in directional spaces.
pub const DIRECTIONAL_ANGLE_SCALE: f32 = 2.0;

/// Weights at or below this are treated as absent.
pub const WEIGHT_EPSILON: f32 = 1e-5;

const DEGENERATE_SUM: f32 = 1e-6;

#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum BlendType {
    Simple1D,
    SimpleDirectional2D,
    FreeformDirectional2D,
    FreeformCartesian2D,
    Direct,
    Clip,
}

/// What a blend-tree child plays.
#[derive(Clone, Debug, PartialEq)]
pub enum ChildMotion {
    /// `ratio` is the clip's normalized progress per second (1 / length).
    Clip { clip: ClipId, ratio: f32 },
    Tree(Box<BlendTree>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct BlendChild {
    pub motion: ChildMotion,
    pub threshold: f32,
    pub position: [f32; 2],
    pub time_scale: f32,
    pub direct_parameter: Option<String>,
}

/// One clip contribution after flattening a tree for the current tick.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct WeightedClip {
    pub clip: ClipId,
    pub weight: f32,
    /// Normalized progress per second, including the child's time scale.
    pub ratio: f32,
}

/// Validated blend tree. Children of a `Simple1D` tree are kept sorted by threshold.
#[derive(Clone, Debug, PartialEq)]
pub struct BlendTree {
    pub name: String,
    pub blend_type: BlendType,
    pub parameter_x: String,
    pub parameter_y: String,
    pub children: Vec<BlendChild>,
    thresholds: Vec<f32>,
    positions: Vec<[f32; 2]>,
}

impl BlendTree {
    pub fn new(
        name: impl Into<String>,
        blend_type: BlendType,
        parameter_x: impl Into<String>,
        parameter_y: impl Into<String>,
        mut children: Vec<BlendChild>,
    ) -> Self {
        if blend_type == BlendType::Simple1D {
            children.sort_by(|a, b| a.threshold.total_cmp(&b.threshold));
        }
        let thresholds = children.iter().map(|c| c.threshold).collect();
        let positions = children.iter().map(|c| c.position).collect();
        Self {
            name: name.into(),
            blend_type,
            parameter_x: parameter_x.into(),
            parameter_y: parameter_y.into(),
            children,
            thresholds,
            positions,
        }
    }

    /// Per-child weights for the current parameters, written into `out` (one slot per child).
    pub fn solve_into(&self, params: &ParameterStore, out: &mut [f32]) {
        debug_assert_eq!(out.len(), self.children.len());
        out.fill(0.0);
        match self.blend_type {
            BlendType::Simple1D => {
                simple_1d_weights(params.get_float(&self.parameter_x), &self.thresholds, out)
            }
            BlendType::SimpleDirectional2D | BlendType::FreeformDirectional2D => {
                let input = [
                    params.get_float(&self.parameter_x),
                    params.get_float(&self.parameter_y),
                ];
                freeform_directional_weights(input, &self.positions, out)
            }
            BlendType::FreeformCartesian2D => {
                let input = [
                    params.get_float(&self.parameter_x),
                    params.get_float(&self.parameter_y),
                ];
                freeform_cartesian_weights(input, &self.positions, out)
            }
            BlendType::Direct => {
                for (slot, child) in out.iter_mut().zip(&self.children) {
                    *slot = child
                        .direct_parameter
                        .as_deref()
                        .map(|p| params.get_float(p).max(0.0))
                        .unwrap_or(0.0);
                }
            }
            BlendType::Clip => {
                if let Some(first) = out.first_mut() {
                    *first = 1.0;
                }
            }
        }
    }

    /// Convenience for tooling and tests: per-child weights in child order.
    pub fn solve(&self, params: &ParameterStore) -> Vec<f32> {
        let mut out = vec![0.0; self.children.len()];
        self.solve_into(params, &mut out);
        out
    }

    /// Walk the tree, appending every clip with non-zero effective weight to `out`.
    /// `stack` is caller-owned scratch reused across ticks; it is restored to its entry length.
    pub fn collect_weighted(
        &self,
        params: &ParameterStore,
        parent_weight: f32,
        out: &mut Vec<WeightedClip>,
        stack: &mut Vec<f32>,
    ) {
        let base = stack.len();
        let n = self.children.len();
        stack.resize(base + n, 0.0);
        self.solve_into(params, &mut stack[base..base + n]);

        for i in 0..n {
            let weight = stack[base + i] * parent_weight;
            if weight <= WEIGHT_EPSILON {
                continue;
            }
            let child = &self.children[i];
            match &child.motion {
                ChildMotion::Clip { clip, ratio } => out.push(WeightedClip {
                    clip: *clip,
                    weight,
                    ratio: ratio * child.time_scale,
                }),
                ChildMotion::Tree(sub) => sub.collect_weighted(params, weight, out, stack),
            }
        }
        stack.truncate(base);
    }

    /// Longest clip length reachable from this tree (seconds), given a length lookup.
    pub fn max_clip_length(&self, length_of: &dyn Fn(ClipId) -> f32) -> f32 {
        self.children
            .iter()
            .map(|c| match &c.motion {
                ChildMotion::Clip { clip, .. } => length_of(*clip),
                ChildMotion::Tree(sub) => sub.max_clip_length(length_of),
            })
            .fold(0.0, f32::max)
    }
}

/// 1D linear blend between the two thresholds bracketing `x`. `thresholds` must be ascending.
pub fn simple_1d_weights(x: f32, thresholds: &[f32], out: &mut [f32]) {
    let n = thresholds.len();
    if n == 0 {
        return;
    }
    out[..n].fill(0.0);
    if n == 1 || x.is_nan() || x <= thresholds[0] {
        out[0] = 1.0;
        return;
    }
    if x >= thresholds[n - 1] {
        out[n - 1] = 1.0;
        return;
    }
    for i in 0..n - 1 {
        let (lo, hi) = (thresholds[i], thresholds[i + 1]);
        if x >= lo && x <= hi {
            let range = hi - lo;
            if range <= f32::EPSILON {
                out[i + 1] = 1.0;
            } else {
                let t = (x - lo) / range;
                out[i] = 1.0 - t;
                out[i + 1] = t;
            }
            return;
        }
    }
}

#[inline]
fn dot2(a: [f32; 2], b: [f32; 2]) -> f32 {
    a[0] * b[0] + a[1] * b[1]
}

#[inline]
fn sub2(a: [f32; 2], b: [f32; 2]) -> [f32; 2] {
    [a[0] - b[0], a[1] - b[1]]
}

#[inline]
fn mag2(a: [f32; 2]) -> f32 {
    dot2(a, a).sqrt()
}

/// Signed angle from `a` to `b`; zero when either vector is degenerate.
#[inline]
fn signed_angle(a: [f32; 2], b: [f32; 2]) -> f32 {
    if mag2(a) <= f32::EPSILON || mag2(b) <= f32::EPSILON {
        return 0.0;
    }
    let cross = a[0] * b[1] - a[1] * b[0];
    cross.atan2(dot2(a, b))
}

/// Normalize in place; returns false when the weights are (numerically) all zero.
fn normalize_weights(out: &mut [f32]) -> bool {
    let sum: f32 = out.iter().sum();
    if sum <= DEGENERATE_SUM {
        return false;
    }
    for w in out.iter_mut() {
        *w /= sum;
    }
    true
}

/// Weight 1 on the child nearest the input, 0 elsewhere.
fn nearest_fallback(input: [f32; 2], positions: &[[f32; 2]], out: &mut [f32]) {
    out.fill(0.0);
    let mut best = 0usize;
    let mut best_d = f32::INFINITY;
    for (i, p) in positions.iter().enumerate() {
        let d = mag2(sub2(input, *p));
        if d < best_d {
            best_d = d;
            best = i;
        }
    }
    if let Some(slot) = out.get_mut(best) {
        *slot = 1.0;
    }
}

/// Gradient-band interpolation in polar space (radial distance vs. scaled angle).
pub fn freeform_directional_weights(input: [f32; 2], positions: &[[f32; 2]], out: &mut [f32]) {
    let n = positions.len();
    if n == 0 {
        return;
    }
    if n == 1 {
        out[0] = 1.0;
        return;
    }
    let input_mag = mag2(input);

    for i in 0..n {
        let pi = positions[i];
        let mag_i = mag2(pi);
        let mut weight = 1.0f32;

        for (j, &pj) in positions.iter().enumerate() {
            if j == i {
                continue;
            }
            let mag_j = mag2(pj);
            let avg = (mag_i + mag_j) * 0.5;
            if avg <= f32::EPSILON {
                continue;
            }
            // A child at the origin has no direction of its own; measure against the other.
            let reference = if mag_i > f32::EPSILON { pi } else { pj };
            let ij = [
                (mag_j - mag_i) / avg,
                signed_angle(pi, pj) * DIRECTIONAL_ANGLE_SCALE,
            ];
            let ip = [
                (input_mag - mag_i) / avg,
                signed_angle(reference, input) * DIRECTIONAL_ANGLE_SCALE,
            ];
            let len2 = dot2(ij, ij);
            if len2 <= f32::EPSILON {
                continue;
            }
            let h = (1.0 - dot2(ip, ij) / len2).clamp(0.0, 1.0);
            weight = weight.min(h);
        }
        out[i] = weight;
    }

    if !normalize_weights(&mut out[..n]) {
        nearest_fallback(input, positions, &mut out[..n]);
    }
}

/// Gradient-band interpolation in Cartesian space.
pub fn freeform_cartesian_weights(input: [f32; 2], positions: &[[f32; 2]], out: &mut [f32]) {
    let n = positions.len();
    if n == 0 {
        return;
    }
    if n == 1 {
        out[0] = 1.0;
        return;
    }

    for i in 0..n {
        let pi = positions[i];
        let ip = sub2(input, pi);
        let mut weight = 1.0f32;
        for (j, &pj) in positions.iter().enumerate() {
            if j == i {
                continue;
            }
            let ij = sub2(pj, pi);
            let len2 = dot2(ij, ij);
            if len2 <= f32::EPSILON {
                continue;
            }
            let h = 1.0 - (dot2(ip, ij) / len2).clamp(0.0, 1.0);
            weight = weight.min(h);
        }
        out[i] = weight;
    }

    if !normalize_weights(&mut out[..n]) {
        nearest_fallback(input, positions, &mut out[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum(w: &[f32]) -> f32 {
        w.iter().sum()
    }

    #[test]
    fn simple_1d_brackets_and_clamps() {
        let t = [0.0, 1.0, 2.0];
        let mut w = [0.0; 3];
        simple_1d_weights(0.5, &t, &mut w);
        assert_eq!(w, [0.5, 0.5, 0.0]);
        simple_1d_weights(1.5, &t, &mut w);
        assert_eq!(w, [0.0, 0.5, 0.5]);
        simple_1d_weights(-3.0, &t, &mut w);
        assert_eq!(w, [1.0, 0.0, 0.0]);
        simple_1d_weights(9.0, &t, &mut w);
        assert_eq!(w, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn simple_1d_exact_threshold_is_exclusive() {
        let t = [0.0, 1.0, 2.0];
        let mut w = [0.0; 3];
        simple_1d_weights(1.0, &t, &mut w);
        assert_eq!(w, [0.0, 1.0, 0.0]);
        simple_1d_weights(2.0, &t, &mut w);
        assert_eq!(w, [0.0, 0.0, 1.0]);
    }

    fn cross() -> Vec<[f32; 2]> {
        vec![[0.0, 0.0], [0.0, 1.0], [0.0, -1.0], [-1.0, 0.0], [1.0, 0.0]]
    }

    #[test]
    fn directional_on_a_motion_selects_it() {
        let p = cross();
        let mut w = vec![0.0; p.len()];
        freeform_directional_weights([0.0, 1.0], &p, &mut w);
        assert!((w[1] - 1.0).abs() < 1e-5, "{w:?}");
        assert!((sum(&w) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn directional_halfway_blends_center_and_forward() {
        let p = cross();
        let mut w = vec![0.0; p.len()];
        freeform_directional_weights([0.0, 0.5], &p, &mut w);
        assert!((w[0] - 0.5).abs() < 1e-4, "{w:?}");
        assert!((w[1] - 0.5).abs() < 1e-4, "{w:?}");
        assert!(w[4] < 1e-4);
    }

    #[test]
    fn directional_diagonal_sums_to_one_and_is_idempotent() {
        let p = cross();
        let mut a = vec![0.0; p.len()];
        let mut b = vec![0.0; p.len()];
        freeform_directional_weights([0.7, 0.7], &p, &mut a);
        freeform_directional_weights([0.7, 0.7], &p, &mut b);
        assert!((sum(&a) - 1.0).abs() < 1e-5);
        assert_eq!(a, b);
        assert!(a[1] > 0.0 && a[4] > 0.0);
        assert!(a[2] < 1e-5 && a[3] < 1e-5);
    }

    #[test]
    fn cartesian_corners_interpolate() {
        let p = vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];
        let mut w = vec![0.0; 4];
        freeform_cartesian_weights([1.0, 0.0], &p, &mut w);
        assert!((w[1] - 1.0).abs() < 1e-5, "{w:?}");
        freeform_cartesian_weights([0.5, 0.5], &p, &mut w);
        assert!((sum(&w) - 1.0).abs() < 1e-5);
        for x in &w {
            assert!((*x - 0.25).abs() < 1e-4, "{w:?}");
        }
    }

    #[test]
    fn cartesian_coincident_positions_fall_back_to_nearest() {
        let p = vec![[1.0, 1.0], [1.0, 1.0]];
        let mut w = vec![0.0; 2];
        freeform_cartesian_weights([3.0, 3.0], &p, &mut w);
        assert!((sum(&w) - 1.0).abs() < 1e-6);
    }
}
