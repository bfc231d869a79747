//! Core configuration for vizij-animator-core.

use serde::{Deserialize, Serialize};

use crate::mixer::SampleBlend;

/// Controller tuning and feature flags.
/// Every field has a default so partial JSON configs deserialize.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Frames per second assumed when converting transition durations to blending speeds.
    pub frame_rate: f32,
    /// Global playback multiplier applied to every layer.
    pub global_speed: f32,
    /// Controller speed ratio (scales time advance and exit-time gating).
    pub speed_ratio: f32,
    /// Split root-bone tracks into root motion instead of baking them into the pose.
    pub apply_root_motion: bool,
    /// Master switch for per-tick evaluation.
    pub enable_animation: bool,
    /// How blend-tree samples combine inside one layer's mixer buffer.
    pub sample_blend: SampleBlend,

    /// Normalized time at or above which a state is in its last frame.
    pub last_frame_threshold: f32,
    /// Half-width of the normalized window in which an authored event fires.
    pub event_window: f32,

    /// Maximum notifications retained per tick; extras are dropped with a warning.
    pub max_events_per_tick: usize,
    /// Initial capacity hint for the tick-local weight buffers.
    pub scratch_weights: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            frame_rate: 60.0,
            global_speed: 1.0,
            speed_ratio: 1.0,
            apply_root_motion: true,
            enable_animation: true,
            sample_blend: SampleBlend::Sequential,
            last_frame_threshold: 0.985,
            event_window: 0.01,
            max_events_per_tick: 1024,
            scratch_weights: 64,
        }
    }
}
