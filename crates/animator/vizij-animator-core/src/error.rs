//! Error types for the animator.

use serde::{Deserialize, Serialize};

/// Errors raised while validating a machine description or driving a controller.
///
/// Structural problems in a description fail initialization. Everything the host can hit at
/// run time (unknown state, missing layer) leaves the controller untouched.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum AnimatorError {
    /// Operation requires an initialized machine
    #[error("State machine is not initialized")]
    NotInitialized,

    /// No layer with the given index
    #[error("Layer not found: {index}")]
    LayerNotFound { index: usize },

    /// No state with the given name
    #[error("State not found: {name}")]
    StateNotFound { name: String },

    /// No clip with the given name
    #[error("Clip not found: {name}")]
    ClipNotFound { name: String },

    /// State names must be unique within a machine
    #[error("Duplicate state name: {name}")]
    DuplicateState { name: String },

    /// Layer indices must be unique
    #[error("Duplicate layer index: {index}")]
    DuplicateLayer { index: usize },

    /// Parameter names must be unique
    #[error("Duplicate parameter: {name}")]
    DuplicateParameter { name: String },

    /// A blend tree refers to a parameter the machine never declares
    #[error("Blend tree '{tree}' references unknown parameter '{parameter}'")]
    UnknownParameter { tree: String, parameter: String },

    /// Malformed blend tree
    #[error("Invalid blend tree '{tree}': {reason}")]
    InvalidBlendTree { tree: String, reason: String },

    /// Malformed clip data
    #[error("Invalid clip '{name}': {reason}")]
    InvalidClip { name: String, reason: String },
}

impl AnimatorError {
    /// Run-time conditions the controller recovers from by ignoring the request.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotInitialized
                | Self::LayerNotFound { .. }
                | Self::StateNotFound { .. }
                | Self::ClipNotFound { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, AnimatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_classification() {
        assert!(AnimatorError::LayerNotFound { index: 3 }.is_recoverable());
        assert!(!AnimatorError::DuplicateState { name: "Idle".into() }.is_recoverable());
        assert_eq!(
            AnimatorError::StateNotFound { name: "Run".into() }.to_string(),
            "State not found: Run"
        );
    }
}
