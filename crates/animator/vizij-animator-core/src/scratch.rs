//! Tick-local scratch buffers owned by one controller.
//!
//! Nothing here survives a tick; buffers keep their capacity so steady-state ticks do not
//! allocate.

use crate::config::Config;
use crate::outputs::AnimatorEvent;

#[derive(Debug, Default)]
pub struct Scratch {
    /// Blend-tree solver stack (one slice per tree level).
    pub weights: Vec<f32>,
    /// Notifications raised by the layer being updated.
    pub events: Vec<AnimatorEvent>,
}

impl Scratch {
    pub fn new(cfg: &Config) -> Self {
        Self {
            weights: Vec::with_capacity(cfg.scratch_weights),
            events: Vec::with_capacity(16),
        }
    }

    #[inline]
    pub fn begin_frame(&mut self) {
        self.weights.clear();
        self.events.clear();
    }
}
