//! Transition evaluation for one layer.
//!
//! Local transitions of the active state are checked before the machine-wide any-state list.
//! The first passing transition wins. Triggers it tested are queued for reset on the parameter
//! store; the controller flushes them once every layer has been evaluated.

use crate::machine::{
    Condition, ConditionMode, Destination, InterruptionSource, Machine, MachineState, Transition,
};
use crate::params::{ParamValue, ParameterStore};

/// Per-layer inputs for one evaluation.
#[derive(Copy, Clone, Debug)]
pub struct TransitionContext {
    /// `LayerDef::index` of the layer being evaluated.
    pub layer: usize,
    /// Active state length in seconds.
    pub state_length: f32,
    /// Seconds since the active state was entered.
    pub state_timer: f32,
    pub speed_ratio: f32,
    pub frame_rate: f32,
}

/// Outcome of a passing transition.
#[derive(Clone, Debug, PartialEq)]
pub struct TransitionChoice {
    pub name: String,
    pub destination: Destination,
    /// Normalized start offset in the destination.
    pub offset: f32,
    /// Blend factor increment per tick (0 switches without easing).
    pub blending_speed: f32,
    /// The transition fired on an expired exit time.
    pub fire_end: bool,
}

#[inline]
fn round2(v: f32) -> f32 {
    (v * 100.0).round() / 100.0
}

/// Per-tick blend factor increment for a crossfade of `duration_secs`.
#[inline]
pub fn blending_speed(frame_rate: f32, duration_secs: f32) -> f32 {
    let frames = frame_rate * duration_secs;
    if frames > 0.0 && frames.is_finite() {
        1.0 / frames
    } else {
        0.0
    }
}

/// Exit time converted to seconds. A stopped controller (`speed_ratio == 0`) never reaches it.
pub fn exit_time_secs(t: &Transition, state_length: f32, speed_ratio: f32) -> f32 {
    if t.exit_time <= 0.0 {
        return 0.0;
    }
    if speed_ratio == 0.0 {
        return f32::INFINITY;
    }
    state_length * t.exit_time / speed_ratio.abs()
}

pub fn condition_passes(c: &Condition, params: &ParameterStore) -> bool {
    let value = params.get(&c.parameter);
    match c.mode {
        ConditionMode::If => value.map(|v| v.as_bool()).unwrap_or(false),
        ConditionMode::IfNot => !value.map(|v| v.as_bool()).unwrap_or(false),
        mode => {
            let lhs = match value {
                Some(v @ (ParamValue::Float(_) | ParamValue::Int(_))) => round2(v.as_f32()),
                // Comparisons only read numeric parameters.
                _ => return false,
            };
            let rhs = round2(c.threshold);
            match mode {
                ConditionMode::Greater => lhs > rhs,
                ConditionMode::Less => lhs < rhs,
                ConditionMode::Equals => lhs == rhs,
                ConditionMode::NotEqual => lhs != rhs,
                ConditionMode::If | ConditionMode::IfNot => false,
            }
        }
    }
}

/// Check one transition list in declared order.
pub fn check_list(
    list: &[Transition],
    ctx: &TransitionContext,
    params: &mut ParameterStore,
) -> Option<TransitionChoice> {
    let solo = list.iter().position(|t| t.solo && !t.mute);
    let eligible: &[Transition] = match solo {
        Some(i) => &list[i..=i],
        None => list,
    };

    for t in eligible {
        if t.layer != ctx.layer || t.mute {
            continue;
        }
        let exit_secs = exit_time_secs(t, ctx.state_length, ctx.speed_ratio);
        let expired = !t.has_exit_time || ctx.state_timer >= exit_secs;
        if t.has_exit_time && t.interruption_source == InterruptionSource::None && !expired {
            continue;
        }

        let passed = if t.conditions.is_empty() {
            t.has_exit_time && expired
        } else {
            t.conditions.iter().all(|c| condition_passes(c, params))
        };
        if !passed {
            continue;
        }

        for c in &t.conditions {
            if params.has_trigger(&c.parameter) {
                params.consume_trigger(&c.parameter);
            }
        }

        let duration_secs = if t.has_fixed_duration {
            t.duration
        } else {
            t.duration * ctx.state_length
        };
        return Some(TransitionChoice {
            name: t.name.clone(),
            destination: t.destination,
            offset: t.offset,
            blending_speed: blending_speed(ctx.frame_rate, duration_secs),
            fire_end: t.has_exit_time && expired,
        });
    }
    None
}

/// Local transitions first, then any-state transitions.
pub fn evaluate(
    machine: &Machine,
    state: Option<&MachineState>,
    ctx: &TransitionContext,
    params: &mut ParameterStore,
) -> Option<TransitionChoice> {
    if let Some(state) = state {
        if let Some(choice) = check_list(&state.transitions, ctx, params) {
            return Some(choice);
        }
    }
    check_list(&machine.any_state, ctx, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::StateId;

    fn transition(dest: u32) -> Transition {
        Transition {
            name: format!("to{dest}"),
            destination: Destination::State(StateId(dest)),
            layer: 0,
            conditions: Vec::new(),
            has_exit_time: false,
            exit_time: 0.0,
            has_fixed_duration: true,
            duration: 0.0,
            offset: 0.0,
            mute: false,
            solo: false,
            interruption_source: InterruptionSource::None,
        }
    }

    fn cond(parameter: &str, mode: ConditionMode, threshold: f32) -> Condition {
        Condition {
            parameter: parameter.into(),
            mode,
            threshold,
        }
    }

    fn ctx(timer: f32) -> TransitionContext {
        TransitionContext {
            layer: 0,
            state_length: 2.0,
            state_timer: timer,
            speed_ratio: 1.0,
            frame_rate: 60.0,
        }
    }

    #[test]
    fn only_the_solo_transition_is_eligible() {
        let mut params = ParameterStore::new();
        params.set_bool("Go", true);
        let mut list = vec![transition(1), transition(2), transition(3)];
        for t in &mut list {
            t.conditions.push(cond("Go", ConditionMode::If, 0.0));
        }
        list[1].solo = true;
        let choice = check_list(&list, &ctx(0.0), &mut params).unwrap();
        assert_eq!(choice.destination, Destination::State(StateId(2)));
    }

    #[test]
    fn conditionless_transition_waits_for_exit_time() {
        let mut params = ParameterStore::new();
        let mut t = transition(1);
        t.has_exit_time = true;
        t.exit_time = 1.0;
        let list = vec![t];
        assert!(check_list(&list, &ctx(1.99), &mut params).is_none());
        let choice = check_list(&list, &ctx(2.0), &mut params).unwrap();
        assert!(choice.fire_end);
    }

    #[test]
    fn conditionless_transition_without_exit_time_never_fires() {
        let mut params = ParameterStore::new();
        assert!(check_list(&[transition(1)], &ctx(5.0), &mut params).is_none());
    }

    #[test]
    fn comparisons_round_to_two_decimals() {
        let mut params = ParameterStore::new();
        params.set_float("Speed", 0.504);
        assert!(condition_passes(&cond("Speed", ConditionMode::Equals, 0.5), &params));
        assert!(!condition_passes(&cond("Speed", ConditionMode::Greater, 0.5), &params));
        params.set_int("Count", 3);
        assert!(condition_passes(&cond("Count", ConditionMode::Greater, 2.0), &params));
        assert!(condition_passes(&cond("Count", ConditionMode::NotEqual, 2.0), &params));
        assert!(!condition_passes(&cond("Missing", ConditionMode::Less, 1.0), &params));
    }

    #[test]
    fn passing_transition_consumes_its_triggers() {
        let mut params = ParameterStore::new();
        params.set_trigger("Jump");
        let mut t = transition(1);
        t.conditions.push(cond("Jump", ConditionMode::If, 0.0));
        assert!(check_list(&[t], &ctx(0.0), &mut params).is_some());
        assert!(params.get_trigger("Jump"));
        params.flush_trigger_resets();
        assert!(!params.get_trigger("Jump"));
    }

    #[test]
    fn blending_speed_uses_normalized_or_fixed_duration() {
        let mut params = ParameterStore::new();
        params.set_bool("Go", true);
        let mut t = transition(1);
        t.conditions.push(cond("Go", ConditionMode::If, 0.0));
        t.has_fixed_duration = false;
        t.duration = 0.25;
        let choice = check_list(&[t.clone()], &ctx(0.0), &mut params).unwrap();
        // 0.25 * 2s = 0.5s at 60 fps
        assert!((choice.blending_speed - 1.0 / 30.0).abs() < 1e-6);

        t.has_fixed_duration = true;
        t.duration = 0.0;
        let choice = check_list(&[t], &ctx(0.0), &mut params).unwrap();
        assert_eq!(choice.blending_speed, 0.0);
    }

    #[test]
    fn exit_time_scales_with_speed_ratio() {
        let mut t = transition(1);
        t.exit_time = 0.5;
        assert_eq!(exit_time_secs(&t, 2.0, 2.0), 0.5);
        assert!(exit_time_secs(&t, 2.0, 0.0).is_infinite());
        t.exit_time = 0.0;
        assert_eq!(exit_time_secs(&t, 2.0, 1.0), 0.0);
    }

    #[test]
    fn mismatched_layer_and_muted_are_skipped() {
        let mut params = ParameterStore::new();
        params.set_bool("Go", true);
        let mut a = transition(1);
        a.layer = 1;
        a.conditions.push(cond("Go", ConditionMode::If, 0.0));
        let mut b = transition(2);
        b.mute = true;
        b.conditions.push(cond("Go", ConditionMode::If, 0.0));
        let mut c = transition(3);
        c.conditions.push(cond("Go", ConditionMode::If, 0.0));
        let choice = check_list(&[a, b, c], &ctx(0.0), &mut params).unwrap();
        assert_eq!(choice.destination, Destination::State(StateId(3)));
    }
}
