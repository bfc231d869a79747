//! Per-target, per-layer pose buffers and the sampling pass that fills them.
//!
//! A mixer cell lives in a controller-owned side-table indexed by `(TargetId, layer slot)`.
//! Sample buffers are cleared every tick; the blend-in state (`blending_factor`,
//! `blending_speed`, `original`) survives until the layer switches state again.

use log::warn;
use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::binding::{BindingTable, TargetTable};
use crate::blend_tree::WeightedClip;
use crate::data::{ClipLibrary, ClipSettings, CurveValue, TrackProperty};
use crate::error::{AnimatorError, Result};
use crate::ids::{ClipId, TargetId};
use crate::interp::functions::{lerp_f32, lerp_vec3, quat_from_array, slerp_quat};
use crate::machine::AvatarMask;
use crate::math::{quat_from_euler, quat_to_euler, yaw_rotation, Transform};
use crate::sampling::{sample_curve, WrapMode};

/// How successive samples of one tick combine in a mixer buffer.
#[derive(Copy, Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum SampleBlend {
    /// Lerp toward each sample by its own weight; the first sample seeds the buffer.
    /// Order-dependent once three or more samples contribute.
    #[default]
    Sequential,
    /// Lerp by `w / (accumulated + w)`, giving the weighted average of all samples.
    Normalized,
}

#[derive(Clone, Debug, Default)]
pub struct AnimationMixer {
    pub position: Option<Vector3<f32>>,
    pub rotation: Option<UnitQuaternion<f32>>,
    pub scale: Option<Vector3<f32>>,
    pub influence: Option<f32>,
    pub root_position: Option<Vector3<f32>>,
    pub root_rotation: Option<UnitQuaternion<f32>>,

    pub blending_factor: f32,
    pub blending_speed: f32,
    /// Pose captured when a blend-in starts; dropped once the factor reaches 1.
    pub original: Option<Transform>,
    pub original_influence: Option<f32>,

    // Accumulated sample weight per channel.
    w_position: f32,
    w_rotation: f32,
    w_scale: f32,
    w_influence: f32,
    w_root_position: f32,
    w_root_rotation: f32,
}

#[inline]
fn step_t(mode: SampleBlend, acc: &mut f32, w: f32) -> f32 {
    // First contribution seeds the buffer outright.
    let t = if *acc <= 0.0 {
        1.0
    } else {
        match mode {
            SampleBlend::Sequential => w.clamp(0.0, 1.0),
            SampleBlend::Normalized => w / (*acc + w),
        }
    };
    *acc += w;
    t
}

impl AnimationMixer {
    /// Clear this tick's sample buffers.
    pub fn clear_buffers(&mut self) {
        self.position = None;
        self.rotation = None;
        self.scale = None;
        self.influence = None;
        self.root_position = None;
        self.root_rotation = None;
        self.w_position = 0.0;
        self.w_rotation = 0.0;
        self.w_scale = 0.0;
        self.w_influence = 0.0;
        self.w_root_position = 0.0;
        self.w_root_rotation = 0.0;
    }

    /// Start a new blend-in (state switch on this layer).
    pub fn reset_blend(&mut self, blending_speed: f32) {
        self.blending_factor = 0.0;
        self.blending_speed = blending_speed.max(0.0);
        self.original = None;
        self.original_influence = None;
    }

    #[inline]
    pub fn has_pose(&self) -> bool {
        self.position.is_some() || self.rotation.is_some() || self.scale.is_some()
    }

    #[inline]
    pub fn has_root_motion(&self) -> bool {
        self.root_position.is_some() || self.root_rotation.is_some()
    }

    pub fn add_position(&mut self, v: Vector3<f32>, w: f32, mode: SampleBlend) {
        let t = step_t(mode, &mut self.w_position, w);
        self.position = Some(match self.position {
            Some(cur) => lerp_vec3(&cur, &v, t),
            None => v,
        });
    }

    pub fn add_rotation(&mut self, q: UnitQuaternion<f32>, w: f32, mode: SampleBlend) {
        let t = step_t(mode, &mut self.w_rotation, w);
        self.rotation = Some(match self.rotation {
            Some(cur) => slerp_quat(&cur, &q, t),
            None => q,
        });
    }

    pub fn add_scale(&mut self, v: Vector3<f32>, w: f32, mode: SampleBlend) {
        let t = step_t(mode, &mut self.w_scale, w);
        self.scale = Some(match self.scale {
            Some(cur) => lerp_vec3(&cur, &v, t),
            None => v,
        });
    }

    pub fn add_influence(&mut self, v: f32, w: f32, mode: SampleBlend) {
        let t = step_t(mode, &mut self.w_influence, w);
        self.influence = Some(match self.influence {
            Some(cur) => lerp_f32(cur, v, t),
            None => v,
        });
    }

    pub fn add_root_position(&mut self, v: Vector3<f32>, w: f32, mode: SampleBlend) {
        let t = step_t(mode, &mut self.w_root_position, w);
        self.root_position = Some(match self.root_position {
            Some(cur) => lerp_vec3(&cur, &v, t),
            None => v,
        });
    }

    pub fn add_root_rotation(&mut self, q: UnitQuaternion<f32>, w: f32, mode: SampleBlend) {
        let t = step_t(mode, &mut self.w_root_rotation, w);
        self.root_rotation = Some(match self.root_rotation {
            Some(cur) => slerp_quat(&cur, &q, t),
            None => q,
        });
    }
}

/// Side-table of mixer cells, `layers` cells per target.
#[derive(Debug, Default)]
pub struct MixerTable {
    layers: usize,
    cells: Vec<AnimationMixer>,
}

impl MixerTable {
    pub fn new(targets: usize, layers: usize) -> Self {
        Self {
            layers,
            cells: vec![AnimationMixer::default(); targets * layers],
        }
    }

    #[inline]
    pub fn layers(&self) -> usize {
        self.layers
    }

    #[inline]
    pub fn get(&self, target: TargetId, slot: usize) -> Option<&AnimationMixer> {
        if slot >= self.layers {
            return None;
        }
        self.cells.get(target.index() * self.layers + slot)
    }

    #[inline]
    pub fn get_mut(&mut self, target: TargetId, slot: usize) -> Option<&mut AnimationMixer> {
        if slot >= self.layers {
            return None;
        }
        self.cells.get_mut(target.index() * self.layers + slot)
    }

    /// Reset the blend-in state of every target on one layer.
    pub fn reset_layer(&mut self, slot: usize, blending_speed: f32) {
        if slot >= self.layers {
            return;
        }
        for cell in self.cells.iter_mut().skip(slot).step_by(self.layers) {
            cell.reset_blend(blending_speed);
        }
    }

    pub fn clear_buffers(&mut self) {
        for cell in &mut self.cells {
            cell.clear_buffers();
        }
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.layers = 0;
    }
}

/// Everything the sampling pass needs about the layer being baked.
pub struct BakeContext<'a> {
    /// Position of the layer in the sorted layer list (mixer slot).
    pub slot: usize,
    /// Authored layer index; index 0 ignores masks.
    pub layer_index: usize,
    pub mask: Option<&'a AvatarMask>,
    /// Normalized state time.
    pub normal: f32,
    pub apply_root_motion: bool,
    pub sample_blend: SampleBlend,
}

/// Sample every weighted clip of a layer into the mixer side-table.
pub fn bake_layer(
    ctx: &BakeContext<'_>,
    weighted: &[WeightedClip],
    clips: &ClipLibrary,
    bindings: &BindingTable,
    targets: &TargetTable,
    mixers: &mut MixerTable,
) -> Result<()> {
    for wc in weighted {
        bake_clip(ctx, wc.clip, wc.weight, clips, bindings, targets, mixers)?;
    }
    Ok(())
}

fn bake_clip(
    ctx: &BakeContext<'_>,
    clip_id: ClipId,
    weight: f32,
    clips: &ClipLibrary,
    bindings: &BindingTable,
    targets: &TargetTable,
    mixers: &mut MixerTable,
) -> Result<()> {
    let clip = clips.get(clip_id).ok_or_else(|| AnimatorError::ClipNotFound {
        name: format!("#{}", clip_id.0),
    })?;
    let frame_time = ctx.normal.clamp(0.0, 1.0) * clip.duration;

    for (ti, track) in clip.tracks.iter().enumerate() {
        let Some(target) = bindings.get(clip_id, ti) else {
            continue;
        };
        let Some(row) = targets.get(target) else {
            continue;
        };
        if ctx.layer_index != 0 {
            if let Some(mask) = ctx.mask {
                if !mask.allows(&row.path) {
                    continue;
                }
            }
        }
        let Some(value) = sample_curve(&track.curve, frame_time, WrapMode::Clamp) else {
            continue;
        };
        let Some(cell) = mixers.get_mut(target, ctx.slot) else {
            continue;
        };
        let root = ctx.apply_root_motion && row.root_bone;
        let mode = ctx.sample_blend;

        match (track.property, value) {
            (TrackProperty::Position, CurveValue::Vec3(p)) => {
                let p = Vector3::new(p[0], p[1], p[2]);
                if root {
                    let (baked, motion) = split_root_position(&p, &row.rest.position, &clip.settings);
                    cell.add_position(baked, weight, mode);
                    cell.add_root_position(motion, weight, mode);
                } else {
                    cell.add_position(p, weight, mode);
                }
            }
            (TrackProperty::Rotation, CurveValue::Quat(q)) => {
                let q = quat_from_array(q);
                if root {
                    let (baked, motion) = split_root_rotation(&q, &clip.settings);
                    cell.add_rotation(baked, weight, mode);
                    cell.add_root_rotation(motion, weight, mode);
                } else {
                    cell.add_rotation(q, weight, mode);
                }
            }
            (TrackProperty::Scale, CurveValue::Vec3(s)) => {
                cell.add_scale(Vector3::new(s[0], s[1], s[2]), weight, mode);
            }
            (TrackProperty::Influence, CurveValue::Float(v)) => {
                cell.add_influence(v, weight, mode)
            }
            _ => {
                warn!(
                    "clip '{}' track '{}' carries a value of the wrong shape for {:?}",
                    clip.name,
                    track.target,
                    track.property
                );
            }
        }
    }
    Ok(())
}

/// Split a root-bone position into (baked into pose, kept as root motion).
///
/// Baked components stay on the bone; the rest move the character instead and leave the bone
/// at its rest value. Baked Y is raised by the clip's `level`.
pub fn split_root_position(
    p: &Vector3<f32>,
    rest: &Vector3<f32>,
    settings: &ClipSettings,
) -> (Vector3<f32>, Vector3<f32>) {
    let mut baked = *rest;
    let mut motion = Vector3::zeros();
    if settings.loop_blend_position_xz {
        baked.x = p.x;
        baked.z = p.z;
    } else {
        motion.x = p.x;
        motion.z = p.z;
    }
    if settings.loop_blend_position_y {
        baked.y = p.y + settings.level;
    } else {
        motion.y = p.y;
    }
    (baked, motion)
}

/// Split a root-bone rotation into (baked into pose, kept as root motion).
///
/// With orientation baked the full rotation stays on the bone. Otherwise yaw becomes root
/// motion (shifted by the clip's orientation offset) and pitch/roll stay baked.
pub fn split_root_rotation(
    q: &UnitQuaternion<f32>,
    settings: &ClipSettings,
) -> (UnitQuaternion<f32>, UnitQuaternion<f32>) {
    if settings.loop_blend_orientation {
        return (*q, UnitQuaternion::identity());
    }
    let euler = quat_to_euler(q);
    let offset = -settings.orientation_offset_y.to_radians();
    let baked = quat_from_euler(&Vector3::new(euler.x, 0.0, euler.z));
    (baked, yaw_rotation(euler.y + offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn three_samples(mode: SampleBlend) -> f32 {
        let mut m = AnimationMixer::default();
        m.add_position(Vector3::new(0.0, 0.0, 0.0), 0.2, mode);
        m.add_position(Vector3::new(10.0, 0.0, 0.0), 0.3, mode);
        m.add_position(Vector3::new(20.0, 0.0, 0.0), 0.5, mode);
        m.position.unwrap().x
    }

    #[test]
    fn sequential_lerp_steps_toward_each_sample_by_its_weight() {
        // 0 -> lerp(0, 10, 0.3) = 3 -> lerp(3, 20, 0.5) = 11.5
        assert_relative_eq!(three_samples(SampleBlend::Sequential), 11.5, epsilon = 1e-4);
        assert_eq!(SampleBlend::default(), SampleBlend::Sequential);
    }

    #[test]
    fn normalized_lerp_is_a_weighted_average() {
        assert_relative_eq!(three_samples(SampleBlend::Normalized), 13.0, epsilon = 1e-4);
    }

    #[test]
    fn two_samples_agree_in_both_modes() {
        for mode in [SampleBlend::Sequential, SampleBlend::Normalized] {
            let mut m = AnimationMixer::default();
            m.add_influence(0.0, 0.25, mode);
            m.add_influence(1.0, 0.75, mode);
            assert_relative_eq!(m.influence.unwrap(), 0.75, epsilon = 1e-6);
        }
    }

    #[test]
    fn first_sample_seeds_regardless_of_weight() {
        let mut m = AnimationMixer::default();
        m.add_influence(0.8, 0.1, SampleBlend::Sequential);
        assert_eq!(m.influence, Some(0.8));
        m.clear_buffers();
        assert!(m.influence.is_none());
        m.add_influence(0.2, 0.5, SampleBlend::Sequential);
        assert_eq!(m.influence, Some(0.2));
    }

    #[test]
    fn reset_layer_touches_one_slot_only() {
        let mut table = MixerTable::new(3, 2);
        for t in 0..3 {
            table.get_mut(TargetId(t), 0).unwrap().blending_factor = 1.0;
            table.get_mut(TargetId(t), 1).unwrap().blending_factor = 1.0;
        }
        table.reset_layer(1, 0.25);
        for t in 0..3 {
            assert_eq!(table.get(TargetId(t), 0).unwrap().blending_factor, 1.0);
            let cell = table.get(TargetId(t), 1).unwrap();
            assert_eq!(cell.blending_factor, 0.0);
            assert_eq!(cell.blending_speed, 0.25);
        }
        assert!(table.get(TargetId(0), 2).is_none());
    }

    #[test]
    fn root_position_split_follows_loop_blend_flags() {
        let mut s = ClipSettings::default();
        s.loop_blend_position_y = true;
        s.level = 0.5;
        let (baked, motion) =
            split_root_position(&Vector3::new(1.0, 2.0, 3.0), &Vector3::zeros(), &s);
        assert_eq!(baked, Vector3::new(0.0, 2.5, 0.0));
        assert_eq!(motion, Vector3::new(1.0, 0.0, 3.0));
    }

    #[test]
    fn root_rotation_split_extracts_yaw() {
        let s = ClipSettings::default();
        let q = quat_from_euler(&Vector3::new(0.0, 0.7, 0.0));
        let (baked, motion) = split_root_rotation(&q, &s);
        assert!(baked.angle() < 1e-4);
        assert_relative_eq!(motion.angle(), 0.7, epsilon = 1e-4);

        let mut s = ClipSettings::default();
        s.loop_blend_orientation = true;
        let (baked, motion) = split_root_rotation(&q, &s);
        assert_relative_eq!(baked.angle(), 0.7, epsilon = 1e-4);
        assert!(motion.angle() < 1e-4);
    }
}
