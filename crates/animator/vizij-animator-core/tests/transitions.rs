mod common;

use common::{clip_state, const_clip, fixture_controller, looping, RigResolver};
use serde_json::json;
use vizij_animator_core::{
    AnimatorError, AnimatorEvent, ConditionDesc, ConditionMode, Config, Controller, LayerDesc,
    MachineDescription, ParameterDesc, ParameterType, TransitionDesc, EXIT_STATE,
};

fn on(parameter: &str, mode: ConditionMode) -> ConditionDesc {
    ConditionDesc {
        parameter: parameter.into(),
        mode,
        threshold: 0.0,
    }
}

fn to(dest: &str, layer: usize, conditions: Vec<ConditionDesc>) -> TransitionDesc {
    TransitionDesc {
        name: format!("to {dest}"),
        destination: Some(dest.into()),
        layer: Some(layer),
        conditions,
        ..Default::default()
    }
}

fn controller(desc: &MachineDescription, cfg: Config) -> Controller {
    let mut ctrl = Controller::new(cfg);
    ctrl.load_clip(looping(const_clip("Hold", 1.0, &[("spine", [0.0; 3])]), false))
        .unwrap();
    ctrl.load_clip(const_clip("Loop", 1.0, &[("spine", [1.0, 0.0, 0.0])]))
        .unwrap();
    ctrl.initialize(desc, &mut RigResolver::new(&["spine"]))
        .unwrap();
    ctrl
}

/// it should let every layer see a trigger in the tick it was set, then clear it
#[test]
fn trigger_visible_to_all_layers_then_reset() {
    let mut a0 = clip_state("A0", 0, "Loop");
    a0.transitions
        .push(to("B0", 0, vec![on("Go", ConditionMode::If)]));
    let mut a1 = clip_state("A1", 1, "Loop");
    a1.transitions
        .push(to("B1", 1, vec![on("Go", ConditionMode::If)]));
    let desc = MachineDescription {
        name: "triggers".into(),
        parameters: vec![ParameterDesc::new("Go", ParameterType::Trigger)],
        layers: vec![LayerDesc::new(0, Some("A0")), LayerDesc::new(1, Some("A1"))],
        states: vec![
            a0,
            clip_state("B0", 0, "Loop"),
            a1,
            clip_state("B1", 1, "Loop"),
        ],
        ..Default::default()
    };
    let mut ctrl = controller(&desc, Config::default());
    ctrl.update(0.1);
    assert_eq!(ctrl.current_state(0), Some("A0"));

    ctrl.set_trigger("Go");
    assert!(ctrl.get_trigger("Go"));
    let out = ctrl.update(0.1);
    let switched = out
        .events
        .iter()
        .filter(|e| matches!(e, AnimatorEvent::Transition { .. }))
        .count();
    assert_eq!(switched, 2);
    assert_eq!(ctrl.current_state(0), Some("B0"));
    assert_eq!(ctrl.current_state(1), Some("B1"));
    assert!(!ctrl.get_trigger("Go"));
}

/// it should only fire the solo transition when one is flagged
#[test]
fn solo_transition_wins() {
    let mut s = clip_state("S", 0, "Loop");
    for dest in ["A", "B", "C"] {
        s.transitions
            .push(to(dest, 0, vec![on("Go", ConditionMode::If)]));
    }
    s.transitions[1].solo = true;
    let desc = MachineDescription {
        parameters: vec![ParameterDesc::new("Go", ParameterType::Bool)],
        layers: vec![LayerDesc::new(0, Some("S"))],
        states: vec![
            s,
            clip_state("A", 0, "Loop"),
            clip_state("B", 0, "Loop"),
            clip_state("C", 0, "Loop"),
        ],
        ..Default::default()
    };
    let mut ctrl = controller(&desc, Config::default());
    ctrl.set_bool("Go", true);
    ctrl.update(0.1);
    assert_eq!(ctrl.current_state(0), Some("B"));
}

fn exit_time_machine() -> MachineDescription {
    let mut a = clip_state("A", 0, "Hold");
    a.transitions.push(TransitionDesc {
        name: "done".into(),
        destination: Some("B".into()),
        has_exit_time: true,
        exit_time: 1.0,
        has_fixed_duration: true,
        ..Default::default()
    });
    MachineDescription {
        layers: vec![LayerDesc::new(0, Some("A"))],
        states: vec![a, clip_state("B", 0, "Loop")],
        ..Default::default()
    }
}

/// it should fire a conditionless exit-time transition exactly when the state timer reaches the length
#[test]
fn exit_time_transition_fires_at_state_length() {
    let mut ctrl = controller(&exit_time_machine(), Config::default());
    for _ in 0..3 {
        ctrl.update(0.25);
        assert_eq!(ctrl.current_state(0), Some("A"));
    }
    let out = ctrl.update(0.25);
    let ends: Vec<_> = out
        .events
        .iter()
        .filter(|e| matches!(e, AnimatorEvent::End { .. }))
        .collect();
    assert_eq!(ends.len(), 1);
    assert_eq!(
        ends[0],
        &AnimatorEvent::End {
            layer: 0,
            state: "A".into()
        }
    );
    assert_eq!(ctrl.current_state(0), Some("B"));
}

/// it should shorten the exit time in proportion to the speed ratio
#[test]
fn exit_time_accounts_for_speed_ratio() {
    let cfg = Config {
        speed_ratio: 2.0,
        ..Config::default()
    };
    let mut ctrl = controller(&exit_time_machine(), cfg);
    ctrl.update(0.25);
    assert_eq!(ctrl.current_state(0), Some("A"));
    ctrl.update(0.25);
    assert_eq!(ctrl.current_state(0), Some("B"));
}

/// it should evaluate any-state transitions after local ones and leave EXIT as a no-op
#[test]
fn any_state_and_exit() {
    let mut idle = clip_state("Idle", 0, "Loop");
    idle.transitions.push(TransitionDesc {
        destination: Some(EXIT_STATE.into()),
        conditions: vec![on("Leave", ConditionMode::If)],
        ..Default::default()
    });
    let desc = MachineDescription {
        parameters: vec![
            ParameterDesc::new("Hit", ParameterType::Trigger),
            ParameterDesc::new("Leave", ParameterType::Bool),
        ],
        layers: vec![LayerDesc::new(0, Some("Idle"))],
        states: vec![idle, clip_state("Hurt", 0, "Loop")],
        any_state_transitions: vec![to("Hurt", 0, vec![on("Hit", ConditionMode::If)])],
        ..Default::default()
    };
    let mut ctrl = controller(&desc, Config::default());

    ctrl.set_bool("Leave", true);
    ctrl.update(0.1);
    assert_eq!(ctrl.current_state(0), Some("Idle"));
    ctrl.set_bool("Leave", false);

    ctrl.set_trigger("Hit");
    ctrl.update(0.1);
    assert_eq!(ctrl.current_state(0), Some("Hurt"));
    assert!(!ctrl.get_trigger("Hit"));
}

/// it should check a state's own transitions on the layer that state plays on
#[test]
fn local_transitions_run_on_their_state_layer() {
    let desc: MachineDescription = serde_json::from_value(json!({
        "parameters": [{ "name": "Go", "type": "Bool" }],
        "layers": [
            { "name": "Base", "index": 0, "entry": "Idle" },
            { "name": "Upper", "index": 1, "entry": "A" }
        ],
        "states": [
            { "name": "Idle", "layer": 0, "motion": { "type": "Clip", "clip": "Loop" } },
            {
                "name": "A",
                "layer": 1,
                "motion": { "type": "Clip", "clip": "Loop" },
                "transitions": [
                    { "destination": "B", "conditions": [{ "parameter": "Go", "mode": "If" }] }
                ]
            },
            { "name": "B", "layer": 1, "motion": { "type": "Clip", "clip": "Hold" } }
        ]
    }))
    .expect("machine");
    let mut ctrl = controller(&desc, Config::default());
    let machine = ctrl.machine().expect("machine");
    let a = machine.state(machine.find_state("A").unwrap()).unwrap();
    assert_eq!(a.transitions[0].layer, 1);

    ctrl.update(0.1);
    assert_eq!(ctrl.current_state(1), Some("A"));
    ctrl.set_bool("Go", true);
    ctrl.update(0.1);
    assert_eq!(ctrl.current_state(1), Some("B"));
    assert_eq!(ctrl.current_state(0), Some("Idle"));
}

/// it should compare numeric conditions after rounding to two decimals
#[test]
fn numeric_conditions_round() {
    let mut idle = clip_state("Idle", 0, "Loop");
    idle.transitions.push(to(
        "Run",
        0,
        vec![ConditionDesc {
            parameter: "Speed".into(),
            mode: ConditionMode::Greater,
            threshold: 0.5,
        }],
    ));
    let desc = MachineDescription {
        parameters: vec![ParameterDesc::new("Speed", ParameterType::Float)],
        layers: vec![LayerDesc::new(0, Some("Idle"))],
        states: vec![idle, clip_state("Run", 0, "Loop")],
        ..Default::default()
    };
    let mut ctrl = controller(&desc, Config::default());
    ctrl.set_float("Speed", 0.504);
    ctrl.update(0.1);
    assert_eq!(ctrl.current_state(0), Some("Idle"));
    ctrl.set_float("Speed", 0.506);
    ctrl.update(0.1);
    assert_eq!(ctrl.current_state(0), Some("Run"));
}

/// it should report but otherwise ignore play/stop requests it cannot honor
#[test]
fn play_state_errors_are_no_ops() {
    let mut fresh = Controller::default();
    assert_eq!(
        fresh.play_state("Jump", 0, 0.0),
        Err(AnimatorError::NotInitialized)
    );

    let mut ctrl = fixture_controller("locomotion");
    ctrl.update(0.1);
    assert!(matches!(
        ctrl.play_state("Fly", 0, 0.2),
        Err(AnimatorError::StateNotFound { .. })
    ));
    assert_eq!(
        ctrl.play_state("Jump", 7, 0.2),
        Err(AnimatorError::LayerNotFound { index: 7 })
    );
    assert_eq!(ctrl.stop_state(3), Err(AnimatorError::LayerNotFound { index: 3 }));
    assert_eq!(ctrl.current_state(0), Some("Locomotion"));

    // Empty, exit and unchanged names do nothing.
    assert_eq!(ctrl.play_state("", 0, 0.2), Ok(()));
    assert_eq!(ctrl.play_state(EXIT_STATE, 0, 0.2), Ok(()));
    assert_eq!(ctrl.play_state("Locomotion", 0, 0.2), Ok(()));
    assert_eq!(ctrl.current_state(0), Some("Locomotion"));
}

/// it should play and stop states directly, resetting layer time
#[test]
fn play_and_stop_state() {
    let mut ctrl = fixture_controller("locomotion");
    ctrl.update(0.0);
    ctrl.update(0.2);
    assert_eq!(ctrl.play_state("Jump", 0, 0.0), Ok(()));
    assert_eq!(ctrl.current_state(0), Some("Jump"));
    assert_eq!(ctrl.state_tag(0), Some("air"));
    assert_eq!(ctrl.normalized_time(0), Some(0.0));

    assert_eq!(ctrl.stop_state(0), Ok(()));
    assert_eq!(ctrl.current_state(0), None);
    ctrl.update(0.1);
    assert_eq!(ctrl.current_state(0), None);

    ctrl.play_state("Jump", 0, 0.0).unwrap();
    ctrl.stop_all();
    assert_eq!(ctrl.current_state(0), None);
}

/// it should run the fixture jump round trip: trigger in, exit time out
#[test]
fn fixture_jump_round_trip() {
    let mut ctrl = fixture_controller("locomotion");
    ctrl.update(0.1);
    ctrl.set_trigger("Jump");
    ctrl.update(0.1);
    assert_eq!(ctrl.current_state(0), Some("Jump"));
    assert!(!ctrl.get_trigger("Jump"));
    // Jump lasts 0.5s; its exit transition fires once the timer reaches it.
    for _ in 0..3 {
        ctrl.update(0.125);
        assert_eq!(ctrl.current_state(0), Some("Jump"));
    }
    let out = ctrl.update(0.125);
    assert!(out.events.contains(&AnimatorEvent::Transition {
        layer: 0,
        from: Some("Jump".into()),
        to: "Locomotion".into(),
    }));
    assert_eq!(ctrl.current_state(0), Some("Locomotion"));
}
