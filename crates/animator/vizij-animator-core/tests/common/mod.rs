#![allow(dead_code)]

use std::collections::HashMap;

use nalgebra::Vector3;
use serde::Deserialize;
use vizij_animator_core::{
    AnimationClip, ClipSettings, Controller, Curve, CurveValue, Keyframe, MachineDescription,
    MotionDesc, StateDesc, TargetDesc, TargetResolver, Track, TrackProperty, Transform,
};

pub fn approx(a: f32, b: f32, eps: f32) {
    assert!((a - b).abs() <= eps, "left={a} right={b} eps={eps}");
}

/// Resolver over a fixed set of transform paths; the handle echoes the path.
#[derive(Default)]
pub struct RigResolver(HashMap<String, TargetDesc>);

impl RigResolver {
    pub fn new(paths: &[&str]) -> Self {
        let mut map = HashMap::new();
        for p in paths {
            map.insert(p.to_string(), TargetDesc::new(*p, Transform::identity()));
        }
        Self(map)
    }

    pub fn with_root(mut self, path: &str) -> Self {
        let desc = TargetDesc::new(path, Transform::identity()).root();
        self.0.insert(path.to_string(), desc);
        self
    }
}

impl TargetResolver for RigResolver {
    fn resolve(&mut self, path: &str) -> Option<TargetDesc> {
        self.0.get(path).cloned()
    }
}

#[derive(Deserialize)]
struct RigFixture {
    targets: Vec<RigTarget>,
}

#[derive(Deserialize)]
struct RigTarget {
    path: String,
    #[serde(default)]
    root: bool,
}

/// Resolver built from a rig fixture.
pub fn rig_fixture(name: &str) -> RigResolver {
    let rig: RigFixture = vizij_test_fixtures::rigs::load(name).expect("load rig fixture");
    let mut resolver = RigResolver::default();
    for t in rig.targets {
        let mut desc = TargetDesc::new(t.path.as_str(), Transform::identity());
        desc.root_bone = t.root;
        resolver.0.insert(t.path, desc);
    }
    resolver
}

/// Controller with every clip the fixture machine uses, initialized against the humanoid rig.
pub fn fixture_controller(machine: &str) -> Controller {
    let mut ctrl = Controller::default();
    let clips: Vec<AnimationClip> =
        vizij_test_fixtures::clips::load_for_machine(machine).expect("load fixture clips");
    for clip in clips {
        ctrl.load_clip(clip).expect("fixture clip is valid");
    }
    let desc: MachineDescription =
        vizij_test_fixtures::machines::load(machine).expect("load machine fixture");
    let mut resolver = rig_fixture("humanoid");
    ctrl.initialize(&desc, &mut resolver).expect("initialize fixture machine");
    ctrl
}

pub fn vec3_key(time: f32, v: [f32; 3]) -> Keyframe {
    Keyframe::new(time, CurveValue::Vec3(v))
}

/// Clip holding each target at a constant position.
pub fn const_clip(name: &str, duration: f32, targets: &[(&str, [f32; 3])]) -> AnimationClip {
    let tracks = targets
        .iter()
        .map(|(target, v)| Track {
            target: target.to_string(),
            property: TrackProperty::Position,
            curve: Curve::linear(vec![vec3_key(0.0, *v), vec3_key(duration, *v)]),
        })
        .collect();
    AnimationClip::new(name, duration, tracks)
}

/// Clip moving one target's position linearly from `from` to `to`.
pub fn ramp_clip(
    name: &str,
    duration: f32,
    target: &str,
    from: [f32; 3],
    to: [f32; 3],
) -> AnimationClip {
    AnimationClip::new(
        name,
        duration,
        vec![Track {
            target: target.to_string(),
            property: TrackProperty::Position,
            curve: Curve::linear(vec![vec3_key(0.0, from), vec3_key(duration, to)]),
        }],
    )
}

pub fn looping(clip: AnimationClip, loop_time: bool) -> AnimationClip {
    let settings = ClipSettings {
        loop_time,
        ..clip.settings.clone()
    };
    clip.with_settings(settings)
}

pub fn clip_state(name: &str, layer: usize, clip: &str) -> StateDesc {
    StateDesc::new(
        name,
        layer,
        Some(MotionDesc::Clip {
            clip: clip.to_string(),
        }),
    )
}

pub fn position(ctrl: &Controller, path: &str) -> Vector3<f32> {
    ctrl.target_pose(path)
        .map(|t| t.position)
        .unwrap_or_else(|| panic!("target '{path}' is bound"))
}
