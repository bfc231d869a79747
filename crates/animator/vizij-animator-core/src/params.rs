//! Named, typed animator parameters.
//!
//! Getters never fail: an absent parameter (or one of another type) reads as the type's zero
//! value. Triggers consumed by a passing transition are queued and cleared together once the
//! whole tick has evaluated its transitions.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::interp::functions::lerp_f32;

#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ParameterType {
    Float,
    Int,
    Bool,
    Trigger,
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value")]
pub enum ParamValue {
    Float(f32),
    Int(i32),
    Bool(bool),
    Trigger(bool),
}

impl ParamValue {
    #[inline]
    pub fn kind(&self) -> ParameterType {
        match self {
            ParamValue::Float(_) => ParameterType::Float,
            ParamValue::Int(_) => ParameterType::Int,
            ParamValue::Bool(_) => ParameterType::Bool,
            ParamValue::Trigger(_) => ParameterType::Trigger,
        }
    }

    /// Numeric view used by comparison conditions.
    #[inline]
    pub fn as_f32(&self) -> f32 {
        match self {
            ParamValue::Float(v) => *v,
            ParamValue::Int(v) => *v as f32,
            ParamValue::Bool(b) | ParamValue::Trigger(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// Truth view used by If/IfNot conditions.
    #[inline]
    pub fn as_bool(&self) -> bool {
        match self {
            ParamValue::Float(v) => *v != 0.0,
            ParamValue::Int(v) => *v != 0,
            ParamValue::Bool(b) | ParamValue::Trigger(b) => *b,
        }
    }

    pub fn zero(kind: ParameterType) -> Self {
        match kind {
            ParameterType::Float => ParamValue::Float(0.0),
            ParameterType::Int => ParamValue::Int(0),
            ParameterType::Bool => ParamValue::Bool(false),
            ParameterType::Trigger => ParamValue::Trigger(false),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ParameterStore {
    values: HashMap<String, ParamValue>,
    pending_resets: Vec<String>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare (or redeclare) a parameter with its initial value.
    pub fn declare(&mut self, name: &str, value: ParamValue) {
        self.values.insert(name.to_string(), value);
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<ParamValue> {
        self.values.get(name).copied()
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.pending_resets.clear();
    }

    // Float

    pub fn has_float(&self, name: &str) -> bool {
        matches!(self.values.get(name), Some(ParamValue::Float(_)))
    }

    pub fn get_float(&self, name: &str) -> f32 {
        match self.values.get(name) {
            Some(ParamValue::Float(v)) => *v,
            _ => 0.0,
        }
    }

    pub fn set_float(&mut self, name: &str, value: f32) {
        self.values.insert(name.to_string(), ParamValue::Float(value));
    }

    /// Ease the float toward `target` by `factor` (clamped to 0..1) of the remaining distance.
    pub fn set_smooth_float(&mut self, name: &str, target: f32, factor: f32) {
        let current = self.get_float(name);
        let next = lerp_f32(current, target, factor.clamp(0.0, 1.0));
        self.set_float(name, next);
    }

    // Int

    pub fn has_int(&self, name: &str) -> bool {
        matches!(self.values.get(name), Some(ParamValue::Int(_)))
    }

    pub fn get_int(&self, name: &str) -> i32 {
        match self.values.get(name) {
            Some(ParamValue::Int(v)) => *v,
            _ => 0,
        }
    }

    pub fn set_int(&mut self, name: &str, value: i32) {
        self.values.insert(name.to_string(), ParamValue::Int(value));
    }

    /// Integer counterpart of `set_smooth_float`; the eased value is rounded.
    pub fn set_smooth_int(&mut self, name: &str, target: i32, factor: f32) {
        let current = self.get_int(name) as f32;
        let next = lerp_f32(current, target as f32, factor.clamp(0.0, 1.0));
        self.set_int(name, next.round() as i32);
    }

    // Bool

    pub fn has_bool(&self, name: &str) -> bool {
        matches!(self.values.get(name), Some(ParamValue::Bool(_)))
    }

    pub fn get_bool(&self, name: &str) -> bool {
        match self.values.get(name) {
            Some(ParamValue::Bool(v)) => *v,
            _ => false,
        }
    }

    pub fn set_bool(&mut self, name: &str, value: bool) {
        self.values.insert(name.to_string(), ParamValue::Bool(value));
    }

    // Trigger

    pub fn has_trigger(&self, name: &str) -> bool {
        matches!(self.values.get(name), Some(ParamValue::Trigger(_)))
    }

    pub fn get_trigger(&self, name: &str) -> bool {
        match self.values.get(name) {
            Some(ParamValue::Trigger(v)) => *v,
            _ => false,
        }
    }

    pub fn set_trigger(&mut self, name: &str) {
        self.values.insert(name.to_string(), ParamValue::Trigger(true));
    }

    pub fn reset_trigger(&mut self, name: &str) {
        self.values.insert(name.to_string(), ParamValue::Trigger(false));
    }

    /// Queue a consumed trigger for clearing at the end of the tick's transition pass.
    pub fn consume_trigger(&mut self, name: &str) {
        if !self.pending_resets.iter().any(|n| n == name) {
            self.pending_resets.push(name.to_string());
        }
    }

    /// Clear every trigger consumed this tick.
    pub fn flush_trigger_resets(&mut self) {
        for name in self.pending_resets.drain(..) {
            if let Some(v) = self.values.get_mut(&name) {
                if matches!(v, ParamValue::Trigger(_)) {
                    *v = ParamValue::Trigger(false);
                }
            }
        }
    }

    #[inline]
    pub fn has_pending_resets(&self) -> bool {
        !self.pending_resets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_parameters_read_as_zero_values() {
        let p = ParameterStore::new();
        assert_eq!(p.get_float("Speed"), 0.0);
        assert_eq!(p.get_int("Step"), 0);
        assert!(!p.get_bool("Grounded"));
        assert!(!p.get_trigger("Jump"));
        assert!(!p.has_float("Speed"));
    }

    #[test]
    fn wrong_type_reads_as_zero_value() {
        let mut p = ParameterStore::new();
        p.set_bool("Speed", true);
        assert_eq!(p.get_float("Speed"), 0.0);
        assert!(p.has_bool("Speed"));
    }

    #[test]
    fn consumed_triggers_clear_on_flush_only() {
        let mut p = ParameterStore::new();
        p.set_trigger("Jump");
        p.consume_trigger("Jump");
        p.consume_trigger("Jump");
        assert!(p.get_trigger("Jump"));
        assert!(p.has_pending_resets());
        p.flush_trigger_resets();
        assert!(!p.get_trigger("Jump"));
        assert!(!p.has_pending_resets());
    }

    #[test]
    fn smooth_setters_ease_toward_target() {
        let mut p = ParameterStore::new();
        p.set_float("Speed", 0.0);
        p.set_smooth_float("Speed", 10.0, 0.5);
        assert_eq!(p.get_float("Speed"), 5.0);
        p.set_smooth_float("Speed", 10.0, 0.5);
        assert_eq!(p.get_float("Speed"), 7.5);
        p.set_smooth_float("Speed", 10.0, 4.0);
        assert_eq!(p.get_float("Speed"), 10.0);

        p.set_int("Level", 0);
        p.set_smooth_int("Level", 10, 0.26);
        assert_eq!(p.get_int("Level"), 3);
    }
}
