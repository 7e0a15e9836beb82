//! Mutable per-rollout context.

use crate::error::{DclError, Result};
use crate::mdp::state::{DpState, StateCategory};
use crate::rng::RngProvider;

/// Owns exactly one [`DpState`] plus the bookkeeping the MDP Adapter
/// keeps up to date as the trajectory is evolved by alternating
/// `IncorporateAction`/`IncorporateEvent` calls.
///
/// Fields other than `next_action` and `external_index` are maintained
/// automatically by [`crate::mdp::adapter::MdpAdapter`] — do not mutate
/// them directly.
#[derive(Debug)]
pub struct Trajectory {
    /// The action the policy has selected but not yet incorporated.
    pub next_action: i64,
    /// Kept up to date by the adapter; do not mutate directly.
    pub category: StateCategory,
    /// Events applied since the last reset. Kept up to date by the adapter.
    pub event_count: i64,
    /// Product of per-event discount factors since the last reset.
    /// Kept up to date by the adapter.
    pub effective_discount: f64,
    /// Accumulates `reward * effective_discount` at every mutation.
    /// Kept up to date by the adapter.
    pub cumulative_return: f64,
    /// Opaque label for caller bookkeeping; never touched by the engine.
    pub external_index: i64,
    /// RNG streams owned by this trajectory.
    pub rng: RngProvider,
    state: Option<DpState>,
}

impl Trajectory {
    /// Creates a trajectory with `num_event_rngs` event streams and no
    /// initial state. Must be given a state via
    /// [`Trajectory::reset_with_state`] (typically through
    /// `MdpAdapter::initiate_state`) before any other operation.
    pub fn new(num_event_rngs: usize, external_index: i64) -> Self {
        Self {
            next_action: 0,
            category: StateCategory::AwaitAction,
            event_count: 0,
            effective_discount: 1.0,
            cumulative_return: 0.0,
            external_index,
            rng: RngProvider::new(num_event_rngs),
            state: None,
        }
    }

    /// Moves `state` into the trajectory and resets counters.
    pub fn reset_with_state(&mut self, state: DpState) {
        self.state = Some(state);
        self.reset_counters();
    }

    /// Resets `cumulative_return`, `effective_discount`, and
    /// `event_count` without touching the state.
    pub fn reset_counters(&mut self) {
        self.cumulative_return = 0.0;
        self.effective_discount = 1.0;
        self.event_count = 0;
    }

    /// Deterministically (re)seeds the owned RNG streams.
    pub fn seed_rng(&mut self, eval: bool, global_seed: i64, experiment_number: i64, thread_number: u32) {
        self.rng.seed(eval, global_seed, experiment_number, thread_number);
    }

    pub fn get_state(&self) -> Result<&DpState> {
        self.state
            .as_ref()
            .ok_or_else(|| DclError::state("Trajectory", "attempting to get state that has not been initialized").logged())
    }

    pub fn get_state_mut(&mut self) -> Result<&mut DpState> {
        self.state
            .as_mut()
            .ok_or_else(|| DclError::state("Trajectory", "attempting to get state that has not been initialized").logged())
    }

    pub fn has_state(&self) -> bool {
        self.state.is_some()
    }

    /// Disjoint borrow of the state and the RNG provider, used by
    /// policies that need to draw randomness while reading the state
    /// (e.g. `get_action(state, rng)`).
    pub(crate) fn state_and_rng_mut(&mut self) -> Result<(&DpState, &mut RngProvider)> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| DclError::state("Trajectory", "attempting to get state that has not been initialized").logged())?;
        Ok((state, &mut self.rng))
    }
}
