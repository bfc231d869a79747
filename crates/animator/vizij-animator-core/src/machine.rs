//! State-machine description (serde) and its validated runtime form.
//!
//! Hosts hand a `MachineDescription` to the controller once. `Machine::build` checks it against
//! the loaded clips and produces strongly typed states, transitions and blend trees with every
//! name already resolved, so the per-tick path never looks anything up by string except
//! parameters.
//!
//! Structural problems (duplicate names, blend trees reading undeclared parameters) are errors.
//! Dangling references the animator can live with (unknown transition destination, missing
//! clip) are logged and degraded.

use hashbrown::{HashMap, HashSet};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::blend_tree::{BlendChild, BlendTree, BlendType, ChildMotion};
use crate::data::{ClipLibrary, Curve};
use crate::error::{AnimatorError, Result};
use crate::ids::{ClipId, StateId};
use crate::params::{ParamValue, ParameterType};

/// Destination name that leaves the state machine (a no-op for this animator).
pub const EXIT_STATE: &str = "[EXIT]";

fn one() -> f32 {
    1.0
}

fn default_rate() -> f32 {
    30.0
}

// ---------------------------------------------------------------------------------------------
// Description
// ---------------------------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MachineDescription {
    #[serde(default)]
    pub name: String,
    /// Machine-wide speed multiplier.
    #[serde(default = "one")]
    pub speed: f32,
    #[serde(default)]
    pub parameters: Vec<ParameterDesc>,
    #[serde(default)]
    pub layers: Vec<LayerDesc>,
    #[serde(default)]
    pub states: Vec<StateDesc>,
    #[serde(default)]
    pub any_state_transitions: Vec<TransitionDesc>,
}

impl Default for MachineDescription {
    fn default() -> Self {
        Self {
            name: String::new(),
            speed: one(),
            parameters: Vec::new(),
            layers: Vec::new(),
            states: Vec::new(),
            any_state_transitions: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ParameterDesc {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParameterType,
    #[serde(default)]
    pub default_float: f32,
    #[serde(default)]
    pub default_int: i32,
    #[serde(default)]
    pub default_bool: bool,
}

impl ParameterDesc {
    pub fn new(name: impl Into<String>, kind: ParameterType) -> Self {
        Self {
            name: name.into(),
            kind,
            default_float: 0.0,
            default_int: 0,
            default_bool: false,
        }
    }

    fn initial_value(&self) -> ParamValue {
        match self.kind {
            ParameterType::Float => ParamValue::Float(self.default_float),
            ParameterType::Int => ParamValue::Int(self.default_int),
            ParameterType::Bool => ParamValue::Bool(self.default_bool),
            ParameterType::Trigger => ParamValue::Trigger(self.default_bool),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AvatarMaskDesc {
    #[serde(default)]
    pub name: String,
    pub transform_paths: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LayerDesc {
    #[serde(default)]
    pub name: String,
    pub index: usize,
    #[serde(default = "one")]
    pub default_weight: f32,
    #[serde(default)]
    pub avatar_mask: Option<AvatarMaskDesc>,
    /// Entry state; defaults to the first state declared on the layer.
    #[serde(default)]
    pub entry: Option<String>,
    #[serde(default)]
    pub ik_pass: bool,
}

impl LayerDesc {
    pub fn new(index: usize, entry: Option<&str>) -> Self {
        Self {
            name: String::new(),
            index,
            default_weight: 1.0,
            avatar_mask: None,
            entry: entry.map(str::to_string),
            ik_pass: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum MotionDesc {
    Clip { clip: String },
    Tree(BlendTreeDesc),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BlendTreeDesc {
    #[serde(default)]
    pub name: String,
    pub blend_type: BlendType,
    #[serde(default)]
    pub parameter_x: String,
    #[serde(default)]
    pub parameter_y: String,
    #[serde(default)]
    pub children: Vec<BlendChildDesc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BlendChildDesc {
    pub motion: MotionDesc,
    #[serde(default)]
    pub threshold: f32,
    #[serde(default)]
    pub position: [f32; 2],
    #[serde(default = "one")]
    pub time_scale: f32,
    #[serde(default)]
    pub direct_parameter: Option<String>,
}

/// Comparison applied by a transition condition.
///
/// Numeric codes follow the authoring tool export: 1 If, 2 IfNot, 3 Greater, 4 Less, 6 Equals,
/// 7 NotEqual.
#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConditionMode {
    If,
    IfNot,
    Greater,
    Less,
    Equals,
    NotEqual,
}

impl ConditionMode {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::If),
            2 => Some(Self::IfNot),
            3 => Some(Self::Greater),
            4 => Some(Self::Less),
            6 => Some(Self::Equals),
            7 => Some(Self::NotEqual),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::If => 1,
            Self::IfNot => 2,
            Self::Greater => 3,
            Self::Less => 4,
            Self::Equals => 6,
            Self::NotEqual => 7,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ConditionDesc {
    pub parameter: String,
    pub mode: ConditionMode,
    #[serde(default)]
    pub threshold: f32,
}

/// Which transitions may interrupt a transition that waits on its exit time.
#[derive(Copy, Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum InterruptionSource {
    #[default]
    None,
    Source,
    Destination,
    SourceThenDestination,
    DestinationThenSource,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct TransitionDesc {
    #[serde(default)]
    pub name: String,
    /// Destination state name; `None` or `EXIT_STATE` leaves the machine.
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub is_exit: bool,
    /// Layer the transition is checked on. State transitions default to their state's layer;
    /// any-state transitions default to the base layer.
    #[serde(default)]
    pub layer: Option<usize>,
    #[serde(default)]
    pub conditions: Vec<ConditionDesc>,
    #[serde(default)]
    pub has_exit_time: bool,
    #[serde(default)]
    pub exit_time: f32,
    #[serde(default)]
    pub has_fixed_duration: bool,
    #[serde(default)]
    pub duration: f32,
    #[serde(default)]
    pub offset: f32,
    #[serde(default)]
    pub mute: bool,
    #[serde(default)]
    pub solo: bool,
    #[serde(default)]
    pub interruption_source: InterruptionSource,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EventDesc {
    pub function: String,
    /// Normalized time in [0, 1].
    pub time: f32,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Float curve keyed in normalized state time that drives a parameter.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ParameterCurveDesc {
    pub property: String,
    pub curve: Curve,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StateDesc {
    pub name: String,
    #[serde(default)]
    pub layer: usize,
    #[serde(default)]
    pub tag: String,
    #[serde(default = "one")]
    pub speed: f32,
    #[serde(default)]
    pub speed_parameter: Option<String>,
    #[serde(default)]
    pub cycle_offset: f32,
    /// Frames per second of the authored motion.
    #[serde(default = "default_rate")]
    pub rate: f32,
    /// Overrides the length derived from the motion (seconds).
    #[serde(default)]
    pub length: Option<f32>,
    #[serde(default)]
    pub motion: Option<MotionDesc>,
    #[serde(default)]
    pub transitions: Vec<TransitionDesc>,
    #[serde(default)]
    pub events: Vec<EventDesc>,
    #[serde(default)]
    pub curves: Vec<ParameterCurveDesc>,
}

impl StateDesc {
    pub fn new(name: impl Into<String>, layer: usize, motion: Option<MotionDesc>) -> Self {
        Self {
            name: name.into(),
            layer,
            tag: String::new(),
            speed: 1.0,
            speed_parameter: None,
            cycle_offset: 0.0,
            rate: default_rate(),
            length: None,
            motion,
            transitions: Vec::new(),
            events: Vec::new(),
            curves: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------------------------

/// Set of transform paths a layer may affect.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AvatarMask {
    pub name: String,
    paths: HashSet<String>,
}

impl AvatarMask {
    pub fn new(name: impl Into<String>, paths: impl IntoIterator<Item = String>) -> Self {
        Self {
            name: name.into(),
            paths: paths.into_iter().collect(),
        }
    }

    #[inline]
    pub fn allows(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LayerDef {
    pub name: String,
    pub index: usize,
    pub default_weight: f32,
    pub mask: Option<AvatarMask>,
    pub entry: Option<StateId>,
    pub ik_pass: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Motion {
    Empty,
    Clip { clip: ClipId, ratio: f32 },
    Tree(BlendTree),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Destination {
    State(StateId),
    Exit,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    pub parameter: String,
    pub mode: ConditionMode,
    pub threshold: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub name: String,
    pub destination: Destination,
    pub layer: usize,
    pub conditions: Vec<Condition>,
    pub has_exit_time: bool,
    pub exit_time: f32,
    pub has_fixed_duration: bool,
    pub duration: f32,
    pub offset: f32,
    pub mute: bool,
    pub solo: bool,
    pub interruption_source: InterruptionSource,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnimationEvent {
    pub function: String,
    pub time: f32,
    pub data: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParameterCurve {
    pub property: String,
    pub curve: Curve,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MachineState {
    pub id: StateId,
    pub name: String,
    pub layer: usize,
    pub tag: String,
    pub speed: f32,
    pub speed_parameter: Option<String>,
    pub cycle_offset: f32,
    pub rate: f32,
    /// Seconds.
    pub length: f32,
    pub motion: Motion,
    pub transitions: Vec<Transition>,
    pub events: Vec<AnimationEvent>,
    pub curves: Vec<ParameterCurve>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Machine {
    pub name: String,
    pub speed: f32,
    pub parameters: Vec<(String, ParamValue)>,
    /// Ascending by index.
    pub layers: Vec<LayerDef>,
    pub states: Vec<MachineState>,
    pub any_state: Vec<Transition>,
    state_index: HashMap<String, StateId>,
}

impl Machine {
    #[inline]
    pub fn state(&self, id: StateId) -> Option<&MachineState> {
        self.states.get(id.index())
    }

    pub fn find_state(&self, name: &str) -> Option<StateId> {
        self.state_index.get(name).copied()
    }

    /// Validate a description against the loaded clips.
    pub fn build(desc: &MachineDescription, clips: &ClipLibrary) -> Result<Machine> {
        // Parameters
        let mut declared: HashMap<String, ParameterType> = HashMap::new();
        let mut parameters = Vec::with_capacity(desc.parameters.len());
        for p in &desc.parameters {
            if declared.insert(p.name.clone(), p.kind).is_some() {
                return Err(AnimatorError::DuplicateParameter {
                    name: p.name.clone(),
                });
            }
            parameters.push((p.name.clone(), p.initial_value()));
        }

        // State names first so transitions can refer forward.
        let mut state_index: HashMap<String, StateId> = HashMap::new();
        for (i, s) in desc.states.iter().enumerate() {
            if state_index
                .insert(s.name.clone(), StateId(i as u32))
                .is_some()
            {
                return Err(AnimatorError::DuplicateState {
                    name: s.name.clone(),
                });
            }
        }

        let resolve = |t: &TransitionDesc, owner: &str, layer: usize| -> Option<Transition> {
            let destination = match t.destination.as_deref() {
                _ if t.is_exit => Destination::Exit,
                None | Some(EXIT_STATE) => Destination::Exit,
                Some(name) => match state_index.get(name) {
                    Some(id) => Destination::State(*id),
                    None => {
                        warn!("transition from '{owner}' targets unknown state '{name}'; dropped");
                        return None;
                    }
                },
            };
            for c in &t.conditions {
                if !declared.contains_key(&c.parameter) {
                    warn!(
                        "transition from '{owner}' tests undeclared parameter '{}'",
                        c.parameter
                    );
                }
            }
            Some(Transition {
                name: t.name.clone(),
                destination,
                layer: t.layer.unwrap_or(layer),
                conditions: t
                    .conditions
                    .iter()
                    .map(|c| Condition {
                        parameter: c.parameter.clone(),
                        mode: c.mode,
                        threshold: c.threshold,
                    })
                    .collect(),
                has_exit_time: t.has_exit_time,
                exit_time: t.exit_time,
                has_fixed_duration: t.has_fixed_duration,
                duration: t.duration,
                offset: t.offset,
                mute: t.mute,
                solo: t.solo,
                interruption_source: t.interruption_source,
            })
        };

        let mut states = Vec::with_capacity(desc.states.len());
        for (i, s) in desc.states.iter().enumerate() {
            let motion = match &s.motion {
                None => Motion::Empty,
                Some(MotionDesc::Clip { clip }) => match clips.find(clip) {
                    Some((id, c)) => Motion::Clip {
                        clip: id,
                        ratio: c.time_ratio(),
                    },
                    None => {
                        warn!("state '{}' plays unknown clip '{clip}'", s.name);
                        Motion::Empty
                    }
                },
                Some(MotionDesc::Tree(tree)) => {
                    Motion::Tree(build_tree(tree, &s.name, clips, &declared)?)
                }
            };
            let length_of = |id: ClipId| clips.get(id).map(|c| c.duration).unwrap_or(0.0);
            let derived_length = match &motion {
                Motion::Empty => 0.0,
                Motion::Clip { clip, .. } => length_of(*clip),
                Motion::Tree(tree) => tree.max_clip_length(&length_of),
            };
            if let Some(sp) = &s.speed_parameter {
                if !declared.contains_key(sp) {
                    warn!("state '{}' uses undeclared speed parameter '{sp}'", s.name);
                }
            }
            states.push(MachineState {
                id: StateId(i as u32),
                name: s.name.clone(),
                layer: s.layer,
                tag: s.tag.clone(),
                speed: s.speed,
                speed_parameter: s.speed_parameter.clone(),
                cycle_offset: s.cycle_offset,
                rate: s.rate,
                length: s.length.unwrap_or(derived_length).max(0.0),
                motion,
                transitions: s
                    .transitions
                    .iter()
                    .filter_map(|t| resolve(t, &s.name, s.layer))
                    .collect(),
                events: s
                    .events
                    .iter()
                    .map(|e| AnimationEvent {
                        function: e.function.clone(),
                        time: e.time,
                        data: e.data.clone(),
                    })
                    .collect(),
                curves: s
                    .curves
                    .iter()
                    .map(|c| ParameterCurve {
                        property: c.property.clone(),
                        curve: c.curve.clone(),
                    })
                    .collect(),
            });
        }

        let any_state = desc
            .any_state_transitions
            .iter()
            .filter_map(|t| resolve(t, "Any State", 0))
            .collect();

        // Layers
        let mut seen_layers: HashSet<usize> = HashSet::new();
        let mut layers = Vec::with_capacity(desc.layers.len());
        for l in &desc.layers {
            if !seen_layers.insert(l.index) {
                return Err(AnimatorError::DuplicateLayer { index: l.index });
            }
            let entry = match &l.entry {
                Some(name) => {
                    let id = state_index.get(name.as_str()).copied();
                    if id.is_none() {
                        warn!("layer {} entry state '{name}' not found", l.index);
                    }
                    id
                }
                None => states
                    .iter()
                    .find(|s: &&MachineState| s.layer == l.index)
                    .map(|s| s.id),
            };
            layers.push(LayerDef {
                name: l.name.clone(),
                index: l.index,
                default_weight: l.default_weight,
                mask: l
                    .avatar_mask
                    .as_ref()
                    .map(|m| AvatarMask::new(m.name.clone(), m.transform_paths.iter().cloned())),
                entry,
                ik_pass: l.ik_pass,
            });
        }
        layers.sort_by_key(|l| l.index);

        Ok(Machine {
            name: desc.name.clone(),
            speed: desc.speed,
            parameters,
            layers,
            states,
            any_state,
            state_index,
        })
    }
}

fn require_parameter(
    tree: &str,
    parameter: &str,
    declared: &HashMap<String, ParameterType>,
) -> Result<()> {
    if declared.contains_key(parameter) {
        Ok(())
    } else {
        Err(AnimatorError::UnknownParameter {
            tree: tree.to_string(),
            parameter: parameter.to_string(),
        })
    }
}

fn build_tree(
    desc: &BlendTreeDesc,
    owner: &str,
    clips: &ClipLibrary,
    declared: &HashMap<String, ParameterType>,
) -> Result<BlendTree> {
    let tree_name = if desc.name.is_empty() {
        owner.to_string()
    } else {
        desc.name.clone()
    };

    match desc.blend_type {
        BlendType::Simple1D => require_parameter(&tree_name, &desc.parameter_x, declared)?,
        BlendType::SimpleDirectional2D
        | BlendType::FreeformDirectional2D
        | BlendType::FreeformCartesian2D => {
            require_parameter(&tree_name, &desc.parameter_x, declared)?;
            require_parameter(&tree_name, &desc.parameter_y, declared)?;
        }
        BlendType::Direct | BlendType::Clip => {}
    }

    let mut children = Vec::with_capacity(desc.children.len());
    for child in &desc.children {
        let motion = match &child.motion {
            MotionDesc::Clip { clip } => match clips.find(clip) {
                Some((id, c)) => ChildMotion::Clip {
                    clip: id,
                    ratio: c.time_ratio(),
                },
                None => {
                    // Missing motions contribute nothing and stay out of the solver.
                    warn!("blend tree '{tree_name}' skips unknown clip '{clip}'");
                    continue;
                }
            },
            MotionDesc::Tree(sub) => {
                ChildMotion::Tree(Box::new(build_tree(sub, &tree_name, clips, declared)?))
            }
        };
        if desc.blend_type == BlendType::Direct {
            match child.direct_parameter.as_deref() {
                Some(p) => require_parameter(&tree_name, p, declared)?,
                None => {
                    return Err(AnimatorError::InvalidBlendTree {
                        tree: tree_name,
                        reason: "direct child without a weight parameter".into(),
                    })
                }
            }
        }
        if !child.threshold.is_finite() || !child.position.iter().all(|v| v.is_finite()) {
            return Err(AnimatorError::InvalidBlendTree {
                tree: tree_name,
                reason: "child threshold/position must be finite".into(),
            });
        }
        children.push(BlendChild {
            motion,
            threshold: child.threshold,
            position: child.position,
            time_scale: child.time_scale,
            direct_parameter: child.direct_parameter.clone(),
        });
    }
    if children.is_empty() {
        warn!("blend tree '{tree_name}' has no playable children");
    }

    Ok(BlendTree::new(
        tree_name,
        desc.blend_type,
        desc.parameter_x.clone(),
        desc.parameter_y.clone(),
        children,
    ))
}
