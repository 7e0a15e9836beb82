//! Error taxonomy for the DCL engine.
//!
//! All engine operations are fatal on failure: there is no local recovery
//! inside the engine itself, only propagation to the caller with enough
//! context (component, offending argument, violated bound) to act on.

use thiserror::Error;

/// The six error kinds the engine can raise, matching the taxonomy the
/// rest of the crate is documented against.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DclError {
    /// A configuration key was missing or malformed.
    #[error("config error in {component}: {message}")]
    Config { component: String, message: String },

    /// The MDP lacks a capability the requested operation needs
    /// (flat features, event probabilities, an allowed-action predicate).
    #[error("contract error in {component}: {message}")]
    Contract { component: String, message: String },

    /// An operation was invoked on a trajectory in the wrong state category.
    #[error("state error in {component}: {message}")]
    State { component: String, message: String },

    /// A state or policy crossed between different MDP adapter instances.
    #[error("identity error in {component}: {message}")]
    Identity { component: String, message: String },

    /// `max_states` was exceeded, or inference was invoked without a runtime.
    #[error("resource error in {component}: {message}")]
    Resource { component: String, message: String },

    /// The exact solver failed to converge.
    #[error("numeric error in {component}: {message}")]
    Numeric { component: String, message: String },
}

impl DclError {
    pub fn config(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config { component: component.into(), message: message.into() }
    }

    pub fn contract(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Contract { component: component.into(), message: message.into() }
    }

    pub fn state(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::State { component: component.into(), message: message.into() }
    }

    pub fn identity(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Identity { component: component.into(), message: message.into() }
    }

    pub fn resource(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Resource { component: component.into(), message: message.into() }
    }

    pub fn numeric(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Numeric { component: component.into(), message: message.into() }
    }

    /// Logs this error at its point of origin and returns it unchanged.
    ///
    /// Call sites that construct an error should route it through here
    /// exactly once, so a consumer gets one diagnostic line per failure
    /// instead of one per propagating layer.
    pub fn logged(self) -> Self {
        log::error!("{self}");
        self
    }
}

pub type Result<T> = std::result::Result<T, DclError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_component_and_message() {
        let err = DclError::state("Trajectory", "category is not AwaitAction");
        let rendered = err.to_string();
        assert!(rendered.contains("Trajectory"));
        assert!(rendered.contains("category is not AwaitAction"));
    }
}
