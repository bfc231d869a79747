//! Per-layer playback state and the time advance of its active state.
//!
//! A layer is idle (no state), playing a clip, or playing a blend tree. Time is normalized:
//! `time` runs 0..=1 over one cycle and `normal` is the value sampled (reversed for negative
//! state speeds). The tick after entering a state or wrapping a loop samples time as-is so the
//! first frame of every cycle is observed exactly once.

use hashbrown::HashSet;
use log::trace;

use crate::blend_tree::WeightedClip;
use crate::data::ClipLibrary;
use crate::error::{AnimatorError, Result};
use crate::ids::StateId;
use crate::interp::functions::lerp_f32;
use crate::machine::{LayerDef, MachineState, Motion};
use crate::outputs::AnimatorEvent;
use crate::params::ParameterStore;
use crate::sampling::{sample_float, WrapMode};

/// Controller-wide values a layer needs to advance.
#[derive(Copy, Clone, Debug)]
pub struct AdvanceContext {
    pub delta_time: f32,
    pub speed_ratio: f32,
    pub global_speed: f32,
    pub last_frame_threshold: f32,
    pub event_window: f32,
}

#[derive(Clone, Debug)]
pub struct LayerRuntime {
    /// Authored layer index.
    pub index: usize,
    pub state: Option<StateId>,
    pub time: f32,
    pub normal: f32,
    /// Seconds since the state was entered (drives exit times).
    pub state_timer: f32,
    pub loop_count: u32,
    pub first_frame: bool,
    pub last_frame: bool,
    pub ik_frame: bool,
    /// Normalized progress per second of the active motion.
    pub frame_ratio: f32,
    /// Clips contributing this tick, with their effective weights.
    pub weighted: Vec<WeightedClip>,
    fresh: bool,
    reset_pending: bool,
    end_fired: bool,
    fired_events: HashSet<(String, i32)>,
}

impl LayerRuntime {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            state: None,
            time: 0.0,
            normal: 0.0,
            state_timer: 0.0,
            loop_count: 0,
            first_frame: false,
            last_frame: false,
            ik_frame: false,
            frame_ratio: 0.0,
            weighted: Vec::new(),
            fresh: false,
            reset_pending: false,
            end_fired: false,
            fired_events: HashSet::new(),
        }
    }

    /// Make `state` active, starting at normalized `offset`.
    pub fn enter(&mut self, state: StateId, offset: f32) {
        self.reset_timing();
        let offset = offset.clamp(0.0, 1.0);
        self.state = Some(state);
        self.time = offset;
        self.normal = offset;
        self.fresh = true;
    }

    pub fn stop(&mut self) {
        self.reset_timing();
        self.state = None;
    }

    /// Zero time, timers and per-cycle flags, keeping the active state.
    pub fn reset_timing(&mut self) {
        self.time = 0.0;
        self.normal = 0.0;
        self.state_timer = 0.0;
        self.loop_count = 0;
        self.first_frame = false;
        self.last_frame = false;
        self.ik_frame = false;
        self.frame_ratio = 0.0;
        self.weighted.clear();
        self.fresh = true;
        self.reset_pending = false;
        self.end_fired = false;
        self.fired_events.clear();
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.state.is_some()
    }

    /// Clip with the largest weight this tick.
    pub fn heaviest_clip(&self) -> Option<&WeightedClip> {
        self.weighted
            .iter()
            .fold(None, |best: Option<&WeightedClip>, wc| match best {
                Some(b) if b.weight >= wc.weight => Some(b),
                _ => Some(wc),
            })
    }

    /// Flatten the active motion into `weighted` and derive the frame ratio.
    pub fn resolve_weights(
        &mut self,
        state: &MachineState,
        params: &ParameterStore,
        stack: &mut Vec<f32>,
    ) {
        self.weighted.clear();
        match &state.motion {
            Motion::Empty => self.frame_ratio = 0.0,
            Motion::Clip { clip, ratio } => {
                self.weighted.push(WeightedClip {
                    clip: *clip,
                    weight: 1.0,
                    ratio: *ratio,
                });
                self.frame_ratio = *ratio;
            }
            Motion::Tree(tree) => {
                tree.collect_weighted(params, 1.0, &mut self.weighted, stack);
                self.frame_ratio = blended_ratio(&self.weighted);
            }
        }
    }

    /// Advance one tick: weights, time, loop/end, events, parameter curves and IK.
    #[allow(clippy::too_many_arguments)]
    pub fn tick(
        &mut self,
        state: &MachineState,
        def: &LayerDef,
        clips: &ClipLibrary,
        ctx: &AdvanceContext,
        params: &mut ParameterStore,
        stack: &mut Vec<f32>,
        events: &mut Vec<AnimatorEvent>,
    ) -> Result<()> {
        let loops = match &state.motion {
            Motion::Empty => false,
            Motion::Clip { clip, .. } => {
                clips
                    .get(*clip)
                    .ok_or_else(|| AnimatorError::ClipNotFound {
                        name: format!("#{}", clip.0),
                    })?
                    .settings
                    .loop_time
            }
            Motion::Tree(_) => true,
        };

        self.resolve_weights(state, params, stack);

        let speed = state.speed
            * state
                .speed_parameter
                .as_deref()
                .map(|p| params.get_float(p))
                .unwrap_or(1.0);

        self.first_frame = false;
        if self.fresh {
            self.fresh = false;
            self.first_frame = self.time <= 0.0;
        } else if self.reset_pending {
            self.reset_pending = false;
            self.time = 0.0;
            self.end_fired = false;
            self.fired_events.clear();
            self.first_frame = true;
        } else if !matches!(state.motion, Motion::Empty) {
            let advance = ctx.delta_time
                * self.frame_ratio
                * speed.abs()
                * ctx.speed_ratio.abs()
                * ctx.global_speed;
            self.time = (self.time + advance).clamp(0.0, 1.0);
        }

        self.normal = self.time.clamp(0.0, 1.0);
        if speed < 0.0 {
            self.normal = 1.0 - self.normal;
        }
        self.last_frame = self.time >= ctx.last_frame_threshold;

        if matches!(state.motion, Motion::Empty) {
            return Ok(());
        }

        if self.time >= 1.0 {
            if loops {
                if !self.reset_pending {
                    self.loop_count = self.loop_count.wrapping_add(1);
                    self.reset_pending = true;
                    events.push(AnimatorEvent::Loop {
                        layer: self.index,
                        state: state.name.clone(),
                        count: self.loop_count,
                    });
                }
            } else if !self.end_fired {
                self.end_fired = true;
                events.push(AnimatorEvent::End {
                    layer: self.index,
                    state: state.name.clone(),
                });
            }
        }

        self.fire_events(state, ctx.event_window, events);

        for curve in &state.curves {
            if let Some(v) = sample_float(&curve.curve, self.normal, WrapMode::Clamp) {
                params.set_float(&curve.property, v);
            }
        }

        self.ik_frame = def.ik_pass;
        if def.ik_pass {
            events.push(AnimatorEvent::Ik {
                layer: self.index,
                state: state.name.clone(),
            });
        }
        trace!(
            "layer {} '{}' time={:.4} normal={:.4}",
            self.index,
            state.name,
            self.time,
            self.normal
        );
        Ok(())
    }

    fn fire_events(&mut self, state: &MachineState, window: f32, events: &mut Vec<AnimatorEvent>) {
        let now = (self.normal * 1000.0).round() / 1000.0;
        for ev in &state.events {
            if (now - ev.time).abs() > window {
                continue;
            }
            let key = (ev.function.clone(), (ev.time * 1000.0).round() as i32);
            if self.fired_events.contains(&key) {
                continue;
            }
            self.fired_events.insert(key);
            events.push(AnimatorEvent::Event {
                layer: self.index,
                state: state.name.clone(),
                function: ev.function.clone(),
                time: ev.time,
                data: ev.data.clone(),
            });
        }
    }
}

/// Frame ratio of a blended motion: the two heaviest clips' ratios, lerped by the heaviest
/// weight. A heaviest clip at full weight uses its own ratio.
pub fn blended_ratio(weighted: &[WeightedClip]) -> f32 {
    let mut primary: Option<&WeightedClip> = None;
    let mut secondary: Option<&WeightedClip> = None;
    for wc in weighted {
        if primary.map_or(true, |p| wc.weight > p.weight) {
            secondary = primary;
            primary = Some(wc);
        } else if secondary.map_or(true, |s| wc.weight > s.weight) {
            secondary = Some(wc);
        }
    }
    match (primary, secondary) {
        (None, _) => 0.0,
        (Some(p), Some(s)) if p.weight < 1.0 => {
            lerp_f32(s.ratio, p.ratio, p.weight.clamp(0.0, 1.0))
        }
        (Some(p), _) => p.ratio,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ClipId;

    fn wc(clip: u32, weight: f32, ratio: f32) -> WeightedClip {
        WeightedClip {
            clip: ClipId(clip),
            weight,
            ratio,
        }
    }

    #[test]
    fn blended_ratio_uses_two_heaviest() {
        assert_eq!(blended_ratio(&[]), 0.0);
        assert_eq!(blended_ratio(&[wc(0, 1.0, 0.5)]), 0.5);
        let r = blended_ratio(&[wc(0, 0.25, 1.0), wc(1, 0.75, 0.5)]);
        assert!((r - (1.0 + (0.5 - 1.0) * 0.75)).abs() < 1e-6);
        // The lightest of three is ignored.
        let r = blended_ratio(&[wc(0, 0.1, 100.0), wc(1, 0.5, 1.0), wc(2, 0.4, 2.0)]);
        assert!((r - (2.0 + (1.0 - 2.0) * 0.5)).abs() < 1e-6);
    }

    #[test]
    fn enter_resets_timing_and_applies_offset() {
        let mut l = LayerRuntime::new(0);
        l.loop_count = 4;
        l.state_timer = 3.0;
        l.enter(StateId(2), 0.25);
        assert_eq!(l.state, Some(StateId(2)));
        assert_eq!(l.time, 0.25);
        assert_eq!(l.loop_count, 0);
        assert_eq!(l.state_timer, 0.0);
        l.stop();
        assert!(!l.is_playing());
        assert_eq!(l.time, 0.0);
    }

    #[test]
    fn heaviest_clip_picks_max_weight() {
        let mut l = LayerRuntime::new(0);
        l.weighted = vec![wc(0, 0.2, 1.0), wc(1, 0.7, 1.0), wc(2, 0.1, 1.0)];
        assert_eq!(l.heaviest_clip().map(|w| w.clip), Some(ClipId(1)));
    }
}
