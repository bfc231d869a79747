//! Cross-layer composition of the mixer buffers into live target poses.
//!
//! Layers are applied in ascending index order on top of the target's current pose, each
//! lerp-blended by its default weight, so later layers override earlier ones in proportion to
//! their weight. A layer that just switched state eases in from the pose captured when the
//! switch happened.

use nalgebra::{UnitQuaternion, Vector3};

use crate::binding::TargetTable;
use crate::ids::TargetId;
use crate::machine::LayerDef;
use crate::math::{lerp_influence, Transform};
use crate::mixer::{AnimationMixer, MixerTable};
use crate::outputs::{Change, Outputs, PoseValue};

/// Factor at which a blend-in counts as complete.
pub const BLEND_COMPLETE_EPSILON: f32 = 1e-4;

/// Root-bone motion channels gathered during finalization.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RootPose {
    pub position: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
}

/// Advance a cell's blend-in. Returns the factor to ease with, or `None` once blending is done.
pub fn step_blend(cell: &mut AnimationMixer, live: &Transform, live_influence: f32) -> Option<f32> {
    if cell.blending_speed <= 0.0 || cell.blending_factor >= 1.0 {
        cell.blending_factor = 1.0;
        cell.original = None;
        cell.original_influence = None;
        return None;
    }
    if cell.original.is_none() {
        cell.original = Some(*live);
        cell.original_influence = Some(live_influence);
    }
    cell.blending_factor += cell.blending_speed;
    if cell.blending_factor >= 1.0 - BLEND_COMPLETE_EPSILON {
        cell.blending_factor = 1.0;
        cell.original = None;
        cell.original_influence = None;
        return None;
    }
    Some(cell.blending_factor)
}

/// Compose every target's layers, write live poses and push changes.
/// Returns the root-bone motion pose when any layer produced one.
pub fn finalize(
    layers: &[LayerDef],
    targets: &mut TargetTable,
    mixers: &mut MixerTable,
    outputs: &mut Outputs,
) -> Option<RootPose> {
    let mut root: Option<RootPose> = None;

    for i in 0..targets.len() {
        let id = TargetId(i as u32);
        let Some(row) = targets.get_mut(id) else {
            continue;
        };
        let live = row.pose;
        let live_influence = row.influence;

        // Layers compose over the rest pose, never over last tick's output.
        let mut accum = row.rest;
        let mut influence = row.rest_influence;
        let mut wrote_pose = false;
        let mut wrote_influence = false;
        let mut root_accum: Option<RootPose> = None;

        for (slot, def) in layers.iter().enumerate() {
            let Some(cell) = mixers.get_mut(id, slot) else {
                continue;
            };
            let has_pose = cell.has_pose();
            if !has_pose && cell.influence.is_none() && !cell.has_root_motion() {
                continue;
            }
            let weight = def.default_weight.clamp(0.0, 1.0);

            let factor = if has_pose || cell.influence.is_some() {
                step_blend(cell, &live, live_influence)
            } else {
                None
            };

            if has_pose {
                let mut pose = Transform::new(
                    cell.position.unwrap_or(accum.position),
                    cell.rotation.unwrap_or(accum.rotation),
                    cell.scale.unwrap_or(accum.scale),
                );
                if let (Some(f), Some(original)) = (factor, cell.original) {
                    pose = original.lerp(&pose, f);
                }
                accum = accum.lerp(&pose, weight);
                wrote_pose = true;
            }

            if let Some(mut v) = cell.influence {
                if let (Some(f), Some(original)) = (factor, cell.original_influence) {
                    v = lerp_influence(original, v, f);
                }
                influence = lerp_influence(influence, v, weight);
                wrote_influence = true;
            }

            if cell.has_root_motion() {
                let contribution = Transform::new(
                    cell.root_position.unwrap_or_else(Vector3::zeros),
                    cell.root_rotation.unwrap_or_else(UnitQuaternion::identity),
                    Vector3::new(1.0, 1.0, 1.0),
                );
                let base = root_accum
                    .map(|r| Transform::new(r.position, r.rotation, Vector3::new(1.0, 1.0, 1.0)))
                    .unwrap_or_default();
                let blended = if root_accum.is_none() {
                    contribution
                } else {
                    base.lerp(&contribution, weight)
                };
                root_accum = Some(RootPose {
                    position: blended.position,
                    rotation: blended.rotation,
                });
            }
        }

        if wrote_pose {
            row.pose = accum;
            outputs.push_change(Change {
                key: row.handle.clone(),
                value: PoseValue::Transform(accum),
            });
        }
        if wrote_influence {
            row.influence = influence;
            outputs.push_change(Change {
                key: row.handle.clone(),
                value: PoseValue::Influence(influence),
            });
        }
        if root.is_none() {
            root = root_accum;
        }
    }

    mixers.clear_buffers();
    root
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blend_in_completes_after_reciprocal_ticks() {
        let mut cell = AnimationMixer::default();
        cell.reset_blend(0.1);
        let live = Transform::identity();
        let mut ticks = 0;
        while step_blend(&mut cell, &live, 0.0).is_some() {
            ticks += 1;
            assert!(cell.original.is_some());
        }
        // Nine easing ticks, the tenth completes.
        assert_eq!(ticks, 9);
        assert_eq!(cell.blending_factor, 1.0);
        assert!(cell.original.is_none());
    }

    #[test]
    fn zero_speed_switches_immediately() {
        let mut cell = AnimationMixer::default();
        cell.reset_blend(0.0);
        assert!(step_blend(&mut cell, &Transform::identity(), 0.0).is_none());
        assert_eq!(cell.blending_factor, 1.0);
    }
}
