//! Controller: data ownership and public API.
//!
//! Methods:
//! - new, load_clip, awake, initialize (resolver), update (transitions → advance → sample →
//!   finalize → root motion), destroy
//! - play_state / stop_state / stop_all, parameter accessors, playback queries, observers

use log::{debug, error, warn};
use nalgebra::{UnitQuaternion, Vector3};

use crate::binding::{BindingTable, TargetResolver, TargetTable};
use crate::config::Config;
use crate::data::{AnimationClip, ClipLibrary};
use crate::error::{AnimatorError, Result};
use crate::finalize::{finalize, RootPose};
use crate::ids::{ClipId, IdAllocator, ObserverId, StateId};
use crate::layer::{AdvanceContext, LayerRuntime};
use crate::machine::{Destination, Machine, MachineDescription, MachineState, EXIT_STATE};
use crate::math::Transform;
use crate::mixer::{bake_layer, AnimationMixer, BakeContext, MixerTable};
use crate::observers::Observable;
use crate::outputs::{AnimatorEvent, Outputs};
use crate::params::{ParamValue, ParameterStore};
use crate::root_motion::{FrameFlags, RootMotion};
use crate::scratch::Scratch;
use crate::transitions::{self, blending_speed, TransitionContext};

/// Animator for one character: owns its machine, parameters, targets and every per-tick buffer.
#[derive(Debug)]
pub struct Controller {
    // Owned data
    cfg: Config,
    ids: IdAllocator,
    clips: ClipLibrary,
    machine: Option<Machine>,
    params: ParameterStore,
    layers: Vec<LayerRuntime>,

    // Systems
    targets: TargetTable,
    bindings: BindingTable,
    mixers: MixerTable,
    root_motion: RootMotion,
    scratch: Scratch,
    observers: Observable<AnimatorEvent>,
    awakened: bool,

    // Per-tick outputs
    outputs: Outputs,
}

impl Default for Controller {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

fn logged(err: AnimatorError) -> AnimatorError {
    warn!("{err}");
    err
}

/// Switch a layer to `state`, restarting its mixers' blend-in and the root-motion snapshots.
fn enter_state(
    layer: &mut LayerRuntime,
    slot: usize,
    state: StateId,
    offset: f32,
    blending_speed: f32,
    mixers: &mut MixerTable,
    root_motion: &mut RootMotion,
) {
    mixers.reset_layer(slot, blending_speed);
    layer.enter(state, offset);
    root_motion.reset();
}

impl Controller {
    /// Create a controller with the given config.
    pub fn new(cfg: Config) -> Self {
        Self {
            scratch: Scratch::new(&cfg),
            cfg,
            ids: IdAllocator::new(),
            clips: ClipLibrary::default(),
            machine: None,
            params: ParameterStore::new(),
            layers: Vec::new(),
            targets: TargetTable::new(),
            bindings: BindingTable::new(),
            mixers: MixerTable::default(),
            root_motion: RootMotion::new(),
            observers: Observable::new(),
            awakened: false,
            outputs: Outputs::default(),
        }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Tune playback (speed ratio, global speed, flags) between ticks.
    #[inline]
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.cfg
    }

    /// Load a clip, returning its id. Clips must be loaded before `initialize`.
    pub fn load_clip(&mut self, clip: AnimationClip) -> Result<ClipId> {
        clip.validate_basic()?;
        if self.clips.find(&clip.name).is_some() {
            warn!("clip '{}' loaded twice; the first copy wins", clip.name);
        }
        let id = self.ids.alloc_clip();
        self.clips.insert(id, clip);
        Ok(id)
    }

    pub fn clip(&self, id: ClipId) -> Option<&AnimationClip> {
        self.clips.get(id)
    }

    pub fn awake(&mut self) {
        self.awakened = true;
        self.observers.notify(&AnimatorEvent::Awake);
    }

    /// Validate the description, declare parameters, bind every clip track and enter each
    /// layer's entry state.
    pub fn initialize(
        &mut self,
        desc: &MachineDescription,
        resolver: &mut dyn TargetResolver,
    ) -> Result<()> {
        let machine = Machine::build(desc, &self.clips)?;

        self.params.clear();
        for (name, value) in &machine.parameters {
            self.params.declare(name, *value);
        }

        self.targets.clear();
        self.ids.reset_targets();
        let unresolved =
            self.bindings
                .bind_all(&self.clips, &mut self.targets, &mut self.ids, resolver);
        for path in &unresolved {
            warn!("target '{path}' could not be resolved; its tracks are skipped");
        }

        self.mixers = MixerTable::new(self.targets.len(), machine.layers.len());
        self.root_motion.reset();
        self.layers = machine
            .layers
            .iter()
            .map(|def| LayerRuntime::new(def.index))
            .collect();
        for (slot, def) in machine.layers.iter().enumerate() {
            if let Some(entry) = def.entry.and_then(|id| machine.state(id)) {
                enter_state(
                    &mut self.layers[slot],
                    slot,
                    entry.id,
                    entry.cycle_offset,
                    0.0,
                    &mut self.mixers,
                    &mut self.root_motion,
                );
            }
        }

        debug!(
            "machine '{}' initialized: {} layers, {} states, {} parameters, {} targets",
            machine.name,
            machine.layers.len(),
            machine.states.len(),
            machine.parameters.len(),
            self.targets.len()
        );
        self.machine = Some(machine);
        self.observers.notify(&AnimatorEvent::Init);
        Ok(())
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.machine.is_some()
    }

    #[inline]
    pub fn is_awakened(&self) -> bool {
        self.awakened
    }

    pub fn machine(&self) -> Option<&Machine> {
        self.machine.as_ref()
    }

    /// Tear everything down except loaded clips.
    pub fn destroy(&mut self) {
        self.observers.clear();
        self.params.clear();
        self.mixers.clear();
        self.layers.clear();
        self.machine = None;
        self.targets.clear();
        self.bindings.clear();
        self.ids.reset_targets();
        self.root_motion.reset();
        self.scratch.begin_frame();
        self.outputs.clear();
        self.awakened = false;
    }

    /// Step the animator by `delta_time` seconds.
    pub fn update(&mut self, delta_time: f32) -> &Outputs {
        self.scratch.begin_frame();
        self.outputs.clear();
        if self.machine.is_none() || !self.cfg.enable_animation {
            return &self.outputs;
        }
        let dt = if delta_time.is_finite() {
            delta_time.max(0.0)
        } else {
            0.0
        };

        self.scratch
            .events
            .push(AnimatorEvent::Update { delta_time: dt });
        self.dispatch_events();

        // 1) Per layer: transitions, time advance, sampling into mixers
        for slot in 0..self.layers.len() {
            if let Err(err) = self.update_layer(slot, dt) {
                let layer = &mut self.layers[slot];
                error!("layer {} update failed: {err}; layer reset", layer.index);
                layer.reset_timing();
            }
            self.dispatch_events();
        }

        // 2) Consumed triggers clear once every layer has seen them
        self.params.flush_trigger_resets();

        // 3) Compose layers into live poses
        let root = match self.machine.as_ref() {
            Some(machine) => finalize(
                &machine.layers,
                &mut self.targets,
                &mut self.mixers,
                &mut self.outputs,
            ),
            None => None,
        };

        // 4) Root motion
        self.extract_root_motion(root, dt);

        &self.outputs
    }

    fn update_layer(&mut self, slot: usize, dt: f32) -> Result<()> {
        let machine = self.machine.as_ref().ok_or(AnimatorError::NotInitialized)?;
        let def = machine
            .layers
            .get(slot)
            .ok_or(AnimatorError::LayerNotFound { index: slot })?;
        let layer = self
            .layers
            .get_mut(slot)
            .ok_or(AnimatorError::LayerNotFound { index: def.index })?;

        let active = match layer.state {
            Some(id) => Some(machine.state(id).ok_or_else(|| AnimatorError::StateNotFound {
                name: format!("#{}", id.0),
            })?),
            None => None,
        };
        if active.is_some() {
            layer.state_timer += dt;
        }

        let ctx = TransitionContext {
            layer: def.index,
            state_length: active.map(|s| s.length).unwrap_or(0.0),
            state_timer: layer.state_timer,
            speed_ratio: self.cfg.speed_ratio,
            frame_rate: self.cfg.frame_rate,
        };
        if let Some(choice) = transitions::evaluate(machine, active, &ctx, &mut self.params) {
            if choice.fire_end {
                if let Some(state) = active {
                    self.scratch.events.push(AnimatorEvent::End {
                        layer: def.index,
                        state: state.name.clone(),
                    });
                }
            }
            if let Destination::State(dest) = choice.destination {
                if layer.state != Some(dest) {
                    if let Some(next) = machine.state(dest) {
                        debug!(
                            "layer {}: '{}' -> '{}' via '{}'",
                            def.index,
                            active.map(|s| s.name.as_str()).unwrap_or(""),
                            next.name,
                            choice.name
                        );
                        self.scratch.events.push(AnimatorEvent::Transition {
                            layer: def.index,
                            from: active.map(|s| s.name.clone()),
                            to: next.name.clone(),
                        });
                        let offset = if choice.offset > 0.0 {
                            choice.offset
                        } else {
                            next.cycle_offset
                        };
                        enter_state(
                            layer,
                            slot,
                            dest,
                            offset,
                            choice.blending_speed,
                            &mut self.mixers,
                            &mut self.root_motion,
                        );
                    }
                }
            }
        }

        let Some(state) = layer.state.and_then(|id| machine.state(id)) else {
            return Ok(());
        };
        let actx = AdvanceContext {
            delta_time: dt,
            speed_ratio: self.cfg.speed_ratio,
            global_speed: self.cfg.global_speed * machine.speed,
            last_frame_threshold: self.cfg.last_frame_threshold,
            event_window: self.cfg.event_window,
        };
        layer.tick(
            state,
            def,
            &self.clips,
            &actx,
            &mut self.params,
            &mut self.scratch.weights,
            &mut self.scratch.events,
        )?;

        let bctx = BakeContext {
            slot,
            layer_index: def.index,
            mask: def.mask.as_ref(),
            normal: layer.normal,
            apply_root_motion: self.cfg.apply_root_motion,
            sample_blend: self.cfg.sample_blend,
        };
        bake_layer(
            &bctx,
            &layer.weighted,
            &self.clips,
            &self.bindings,
            &self.targets,
            &mut self.mixers,
        )
    }

    /// Hand queued notifications to observers and outputs, up to the per-tick cap.
    fn dispatch_events(&mut self) {
        let mut dropped = 0usize;
        for ev in self.scratch.events.drain(..) {
            if self.outputs.events.len() >= self.cfg.max_events_per_tick {
                dropped += 1;
                continue;
            }
            self.observers.notify(&ev);
            self.outputs.push_event(ev);
        }
        if dropped > 0 {
            warn!("dropped {dropped} notifications over the per-tick limit");
        }
    }

    fn extract_root_motion(&mut self, root: Option<RootPose>, dt: f32) {
        let Some(root) = root.filter(|_| self.cfg.apply_root_motion) else {
            self.root_motion.clear_delta();
            return;
        };
        let flags = match self.layers.first() {
            Some(base) => {
                let seam = base
                    .heaviest_clip()
                    .and_then(|wc| self.clips.get(wc.clip))
                    .map(|c| c.settings.loop_time && c.settings.loop_blend)
                    .unwrap_or(false);
                FrameFlags {
                    first_frame: base.first_frame,
                    last_frame: base.last_frame,
                    loop_blend_seam: seam,
                }
            }
            None => FrameFlags::default(),
        };
        self.root_motion
            .extract(&root.position, &root.rotation, flags, dt);
        self.outputs.root_motion = Some(self.root_motion.sample());
    }

    fn slot_of(&self, layer: usize) -> Result<usize> {
        let machine = self.machine.as_ref().ok_or(AnimatorError::NotInitialized)?;
        machine
            .layers
            .iter()
            .position(|l| l.index == layer)
            .ok_or(AnimatorError::LayerNotFound { index: layer })
    }

    // ---------------------------------------------------------------------------------------
    // Playback
    // ---------------------------------------------------------------------------------------

    /// Cross-fade `layer` into the named state over `transition_duration` seconds.
    /// Empty names, the exit sentinel and the already active state are no-ops.
    pub fn play_state(&mut self, name: &str, layer: usize, transition_duration: f32) -> Result<()> {
        if name.is_empty() || name == EXIT_STATE {
            return Ok(());
        }
        let slot = self.slot_of(layer).map_err(logged)?;
        let Some(machine) = self.machine.as_ref() else {
            return Err(logged(AnimatorError::NotInitialized));
        };
        let state = machine
            .find_state(name)
            .and_then(|id| machine.state(id))
            .ok_or_else(|| {
                logged(AnimatorError::StateNotFound {
                    name: name.to_string(),
                })
            })?;
        let runtime = &mut self.layers[slot];
        if runtime.state == Some(state.id) {
            return Ok(());
        }

        let event = AnimatorEvent::Transition {
            layer,
            from: runtime
                .state
                .and_then(|id| machine.state(id))
                .map(|s| s.name.clone()),
            to: state.name.clone(),
        };
        debug!("layer {layer}: play '{name}' over {transition_duration}s");
        enter_state(
            runtime,
            slot,
            state.id,
            state.cycle_offset,
            blending_speed(self.cfg.frame_rate, transition_duration),
            &mut self.mixers,
            &mut self.root_motion,
        );
        self.observers.notify(&event);
        Ok(())
    }

    pub fn stop_state(&mut self, layer: usize) -> Result<()> {
        let slot = self.slot_of(layer).map_err(logged)?;
        self.stop_slot(slot);
        debug!("layer {layer}: stopped");
        Ok(())
    }

    pub fn stop_all(&mut self) {
        for slot in 0..self.layers.len() {
            self.stop_slot(slot);
        }
    }

    fn stop_slot(&mut self, slot: usize) {
        if let Some(layer) = self.layers.get_mut(slot) {
            layer.stop();
        }
        self.mixers.reset_layer(slot, 0.0);
        self.root_motion.reset();
    }

    // ---------------------------------------------------------------------------------------
    // Parameters
    // ---------------------------------------------------------------------------------------

    pub fn parameters(&self) -> &ParameterStore {
        &self.params
    }

    pub fn parameter(&self, name: &str) -> Option<ParamValue> {
        self.params.get(name)
    }

    pub fn has_float(&self, name: &str) -> bool {
        self.params.has_float(name)
    }

    pub fn get_float(&self, name: &str) -> f32 {
        self.params.get_float(name)
    }

    pub fn set_float(&mut self, name: &str, value: f32) {
        self.params.set_float(name, value);
    }

    pub fn set_smooth_float(&mut self, name: &str, target: f32, factor: f32) {
        self.params.set_smooth_float(name, target, factor);
    }

    pub fn has_int(&self, name: &str) -> bool {
        self.params.has_int(name)
    }

    pub fn get_int(&self, name: &str) -> i32 {
        self.params.get_int(name)
    }

    pub fn set_int(&mut self, name: &str, value: i32) {
        self.params.set_int(name, value);
    }

    pub fn set_smooth_int(&mut self, name: &str, target: i32, factor: f32) {
        self.params.set_smooth_int(name, target, factor);
    }

    pub fn has_bool(&self, name: &str) -> bool {
        self.params.has_bool(name)
    }

    pub fn get_bool(&self, name: &str) -> bool {
        self.params.get_bool(name)
    }

    pub fn set_bool(&mut self, name: &str, value: bool) {
        self.params.set_bool(name, value);
    }

    pub fn has_trigger(&self, name: &str) -> bool {
        self.params.has_trigger(name)
    }

    pub fn get_trigger(&self, name: &str) -> bool {
        self.params.get_trigger(name)
    }

    pub fn set_trigger(&mut self, name: &str) {
        self.params.set_trigger(name);
    }

    pub fn reset_trigger(&mut self, name: &str) {
        self.params.reset_trigger(name);
    }

    // ---------------------------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------------------------

    fn layer_runtime(&self, layer: usize) -> Option<&LayerRuntime> {
        self.layers.iter().find(|l| l.index == layer)
    }

    fn active_state(&self, layer: usize) -> Option<&MachineState> {
        let id = self.layer_runtime(layer)?.state?;
        self.machine.as_ref()?.state(id)
    }

    /// Name of the active state on a layer.
    pub fn current_state(&self, layer: usize) -> Option<&str> {
        self.active_state(layer).map(|s| s.name.as_str())
    }

    pub fn state_tag(&self, layer: usize) -> Option<&str> {
        self.active_state(layer).map(|s| s.tag.as_str())
    }

    /// Normalized time sampled this tick.
    pub fn normalized_time(&self, layer: usize) -> Option<f32> {
        self.layer_runtime(layer).map(|l| l.normal)
    }

    /// Frame index within the active state (normalized time × length × rate).
    pub fn current_frame(&self, layer: usize) -> Option<f32> {
        let runtime = self.layer_runtime(layer)?;
        let state = self.active_state(layer)?;
        Some(runtime.normal * state.length * state.rate)
    }

    pub fn loop_count(&self, layer: usize) -> Option<u32> {
        self.layer_runtime(layer).map(|l| l.loop_count)
    }

    pub fn state_timer(&self, layer: usize) -> Option<f32> {
        self.layer_runtime(layer).map(|l| l.state_timer)
    }

    pub fn is_first_frame(&self, layer: usize) -> bool {
        self.layer_runtime(layer).is_some_and(|l| l.first_frame)
    }

    pub fn is_last_frame(&self, layer: usize) -> bool {
        self.layer_runtime(layer).is_some_and(|l| l.last_frame)
    }

    /// A layer flagged for IK reached its IK point this tick.
    pub fn ik_frame(&self, layer: usize) -> bool {
        self.layer_runtime(layer).is_some_and(|l| l.ik_frame)
    }

    pub fn root_motion(&self) -> &RootMotion {
        &self.root_motion
    }

    pub fn delta_position(&self) -> Vector3<f32> {
        self.root_motion.delta_position
    }

    pub fn delta_rotation(&self) -> UnitQuaternion<f32> {
        self.root_motion.delta_rotation
    }

    pub fn motion_speed(&self) -> f32 {
        self.root_motion.speed
    }

    pub fn angular_velocity(&self) -> Vector3<f32> {
        self.root_motion.angular_velocity
    }

    /// Live pose of a bound target.
    pub fn target_pose(&self, path: &str) -> Option<&Transform> {
        let id = self.targets.find(path)?;
        self.targets.get(id).map(|r| &r.pose)
    }

    pub fn target_influence(&self, path: &str) -> Option<f32> {
        let id = self.targets.find(path)?;
        self.targets.get(id).map(|r| r.influence)
    }

    /// Mixer cell of a target on a layer (blend-in state).
    pub fn mixer(&self, path: &str, layer: usize) -> Option<&AnimationMixer> {
        let id = self.targets.find(path)?;
        let slot = self.slot_of(layer).ok()?;
        self.mixers.get(id, slot)
    }

    /// Last outputs produced by `update`.
    pub fn outputs(&self) -> &Outputs {
        &self.outputs
    }

    // ---------------------------------------------------------------------------------------
    // Observers
    // ---------------------------------------------------------------------------------------

    pub fn add_observer(
        &mut self,
        callback: impl FnMut(&AnimatorEvent) + Send + 'static,
    ) -> ObserverId {
        self.observers.add(callback)
    }

    pub fn remove_observer(&mut self, id: ObserverId) -> bool {
        self.observers.remove(id)
    }
}
