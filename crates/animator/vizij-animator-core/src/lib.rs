//! Vizij Animator Core (engine-agnostic)
//!
//! A layered state-machine animator: parameterized transitions between clip and blend-tree
//! states, per-layer avatar masks, cross-layer pose composition and root-motion extraction.
//! Hosts load clips, hand over a `MachineDescription` plus a `TargetResolver`, then call
//! `Controller::update(dt)` once per frame and apply the returned `Outputs`.

pub mod binding;
pub mod blend_tree;
pub mod config;
pub mod controller;
pub mod data;
pub mod error;
pub mod finalize;
pub mod ids;
pub mod interp;
pub mod layer;
pub mod machine;
pub mod math;
pub mod mixer;
pub mod observers;
pub mod outputs;
pub mod params;
pub mod root_motion;
pub mod sampling;
pub mod scratch;
pub mod transitions;

// Re-exports for consumers (adapters)
pub use binding::{TargetDesc, TargetHandle, TargetResolver};
pub use blend_tree::{BlendTree, BlendType, WeightedClip};
pub use config::Config;
pub use controller::Controller;
pub use data::{AnimationClip, ClipSettings, Curve, CurveValue, Keyframe, Track, TrackProperty};
pub use error::{AnimatorError, Result};
pub use ids::{ClipId, ObserverId, StateId, TargetId};
pub use interp::Interpolation;
pub use machine::{
    AvatarMaskDesc, BlendChildDesc, BlendTreeDesc, ConditionDesc, ConditionMode, EventDesc,
    InterruptionSource, LayerDesc, MachineDescription, MotionDesc, ParameterCurveDesc,
    ParameterDesc, StateDesc, TransitionDesc, EXIT_STATE,
};
pub use math::Transform;
pub use mixer::SampleBlend;
pub use observers::Observable;
pub use outputs::{AnimatorEvent, Change, Outputs, PoseValue, RootMotionSample};
pub use params::{ParamValue, ParameterStore, ParameterType};
pub use sampling::{sample_curve, sample_curve_into, WrapMode};
