//! The MDP capability set external plug-ins publish.
//!
//! A concrete MDP implements [`Mdp`] for its own `State`/`Event` types;
//! [`crate::mdp::adapter::MdpAdapter`] wraps it and projects a uniform,
//! type-erased surface to the rest of the engine.

use rand::rngs::StdRng;

use super::policy::PolicyRegistry;
use super::state::StateCategory;

/// Whether an MDP runs forever or reaches a designated final state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Horizon {
    Infinite,
    Finite,
}

/// Per-MDP constants published once and cached by the adapter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticInfo {
    pub num_valid_actions: i64,
    pub num_features: i64,
    pub discount_factor: f64,
    pub horizon: Horizon,
}

impl StaticInfo {
    pub fn is_infinite_horizon(&self) -> bool {
        matches!(self.horizon, Horizon::Infinite)
    }
}

/// Capability set a concrete MDP must publish to plug into the engine.
///
/// Every method below corresponds to an entry in the external capability
/// table: `ModifyStateWithAction`/`ModifyStateWithEvent` mutate state in
/// place and return the reward earned by the transition;
/// `get_state_category` tells the adapter what the state is waiting on
/// next. The optional methods default to "unsupported" / a no-op and are
/// overridden only by MDPs that actually have the corresponding
/// capability (event probabilities, useful statistics, DCL hyperparameter
/// advice).
pub trait Mdp: Send + Sync + Sized {
    type State: Clone + Send + std::fmt::Debug + 'static;
    type Event;

    fn static_info(&self) -> StaticInfo;

    /// Number of independent event-RNG streams a [`crate::trajectory::Trajectory`]
    /// for this MDP must own. Most MDPs have a single source of
    /// randomness between actions; MDPs with several independent event
    /// types (e.g. demand and lead time) override this so each gets
    /// its own common-random-numbers stream.
    fn num_event_streams(&self) -> usize {
        1
    }

    fn get_initial_state(&self, rng: &mut StdRng) -> Self::State;

    /// Applies `action` to `state` in place, returning the reward earned.
    /// Must leave `state` such that `get_state_category` no longer
    /// reports `AwaitAction`.
    fn modify_state_with_action(&self, state: &mut Self::State, action: i64) -> f64;

    fn get_event(&self, state: &Self::State, rng: &mut StdRng) -> Self::Event;

    /// Applies `event` to `state` in place, returning the reward earned.
    fn modify_state_with_event(&self, state: &mut Self::State, event: &Self::Event) -> f64;

    /// `(probability, next_state)` pairs for every possible event from
    /// `state`, with the one-step expected reward they share. `None` if
    /// this MDP does not publish exact event probabilities.
    fn get_all_event_transitions(&self, _state: &Self::State) -> Option<(f64, Vec<(f64, Self::State)>)> {
        None
    }

    /// Contributes MDP-specific policy factories beyond the adapter's
    /// built-in `"greedy"`/`"random"` entries. No-op by default.
    fn register_policies(&self, _registry: &mut PolicyRegistry<Self>) {}

    fn allowed_actions(&self, state: &Self::State) -> Vec<i64>;

    fn is_allowed_action(&self, state: &Self::State, action: i64) -> bool {
        self.allowed_actions(state).contains(&action)
    }

    fn get_features(&self, state: &Self::State) -> Vec<f32>;

    fn get_state_category(&self, state: &Self::State) -> StateCategory;

    /// User-defined diagnostics collected by the Policy Comparer.
    fn return_useful_statistics(&self, _state: &Self::State) -> Vec<f64> {
        Vec::new()
    }

    fn reset_hidden_state_variables(&self, _state: &mut Self::State) {}

    /// Per-state DCL hyperparameter advice. The engine calls these at
    /// most once per generation, against the initial state only — see
    /// `DESIGN.md` for why the per-state signature is not fully
    /// exploited.
    fn get_l(&self, _state: &Self::State) -> Option<i64> {
        None
    }
    fn get_h(&self, _state: &Self::State) -> Option<i64> {
        None
    }
    fn get_m(&self, _state: &Self::State) -> Option<i64> {
        None
    }
    fn get_reinitiate_counter(&self, _state: &Self::State) -> Option<i64> {
        None
    }

    /// A short, stable label for this MDP, used in diagnostics.
    fn type_identifier(&self) -> &str;
}
