//! Policies: the decision-makers that set `Trajectory::next_action`.
//!
//! [`Policy`] is the type-erased interface the rest of the engine holds
//! (`Arc<dyn Policy>`); [`PolicyAdapter`] is the one piece of code that
//! bridges a concrete [`InnerPolicy`] over a concrete [`Mdp`] into that
//! interface, checking the state's `mdp_hash` before ever touching it —
//! the same role `erasure::PolicyAdapter` plays for its C++ counterpart.

use std::collections::HashMap;
use std::sync::Arc;

use rand::rngs::StdRng;

use super::state::{downcast_state, DpState};
use super::traits::Mdp;
use crate::error::{DclError, Result};
use crate::trajectory::Trajectory;

/// Type-erased policy: polymorphic over `set_action` and
/// `get_promising_actions`, exactly as described in the data model.
pub trait Policy: Send + Sync {
    fn set_action(&self, trajectories: &mut [Trajectory]) -> Result<()>;
    fn get_promising_actions(&self, state: &DpState, k: usize) -> Result<Vec<i64>>;
    fn type_identifier(&self) -> &str;
}

/// A concrete, MDP-typed decision rule.
///
/// Rust collapses the three call shapes the original capability set
/// distinguishes (`GetAction(state)`, `GetAction(state, rng)`,
/// stateful `GetActionState(state)`) into a single method that always
/// receives an RNG: policies that do not need randomness simply ignore
/// it. See `DESIGN.md` for why this simplification is safe.
pub trait InnerPolicy<M: Mdp>: Send + Sync {
    fn get_action(&self, state: &M::State, rng: &mut StdRng) -> i64;

    /// Falls back to `None` (the adapter then uses allowed actions) for
    /// policies that have no action-priority ordering to offer.
    fn get_promising_actions(&self, _state: &M::State, _k: usize) -> Option<Vec<i64>> {
        None
    }
}

/// Bridges a concrete [`InnerPolicy<M>`] into the type-erased [`Policy`]
/// interface.
pub struct PolicyAdapter<M: Mdp, P: InnerPolicy<M>> {
    mdp: Arc<M>,
    policy: P,
    mdp_hash: u64,
    identifier: String,
}

impl<M: Mdp, P: InnerPolicy<M>> PolicyAdapter<M, P> {
    pub fn new(mdp: Arc<M>, policy: P, mdp_hash: u64, identifier: impl Into<String>) -> Self {
        Self { mdp, policy, mdp_hash, identifier: identifier.into() }
    }

    fn check_identity(&self, state: &DpState) -> Result<()> {
        if state.mdp_hash() != self.mdp_hash {
            return Err(DclError::identity(
                "Policy",
                "state does not belong to the MDP adapter this policy was obtained from",
            )
            .logged());
        }
        Ok(())
    }
}

impl<M: Mdp + 'static, P: InnerPolicy<M>> Policy for PolicyAdapter<M, P> {
    fn set_action(&self, trajectories: &mut [Trajectory]) -> Result<()> {
        for traj in trajectories.iter_mut() {
            if !traj.category.is_await_action() {
                return Err(DclError::state(
                    "Policy::set_action",
                    "cannot set action when trajectory category is not AwaitAction",
                )
                .logged());
            }
            let (state, rng) = traj.state_and_rng_mut()?;
            self.check_identity(state)?;
            let typed_state: &M::State = downcast_state(state);
            let action = self.policy.get_action(typed_state, rng.policy_rng());
            traj.next_action = action;
        }
        Ok(())
    }

    fn get_promising_actions(&self, state: &DpState, k: usize) -> Result<Vec<i64>> {
        self.check_identity(state)?;
        let typed_state: &M::State = downcast_state(state);
        match self.policy.get_promising_actions(typed_state, k) {
            Some(actions) => Ok(actions),
            None => Ok(self.mdp.allowed_actions(typed_state).into_iter().take(k).collect()),
        }
    }

    fn type_identifier(&self) -> &str {
        &self.identifier
    }
}

/// One-step-lookahead policy: evaluates every allowed action by directly
/// applying it to a scratch clone of the state and keeping the one with
/// the highest immediate reward. Grounded on the reference
/// implementation's `GreedyPolicy`, which is exactly this — no
/// look-beyond-one-step simulation.
pub struct GreedyPolicy<M: Mdp> {
    mdp: Arc<M>,
}

impl<M: Mdp> GreedyPolicy<M> {
    pub fn new(mdp: Arc<M>) -> Self {
        Self { mdp }
    }
}

impl<M: Mdp> InnerPolicy<M> for GreedyPolicy<M> {
    fn get_action(&self, state: &M::State, _rng: &mut StdRng) -> i64 {
        let mut best_action = None;
        let mut best_return = f64::NEG_INFINITY;
        for action in self.mdp.allowed_actions(state) {
            let mut scratch = state.clone();
            let reward = self.mdp.modify_state_with_action(&mut scratch, action);
            if reward > best_return {
                best_return = reward;
                best_action = Some(action);
            }
        }
        best_action.expect("GreedyPolicy: no allowed action found for a state that awaits one")
    }
}

/// Uniformly samples among the allowed actions.
pub struct RandomPolicy<M: Mdp> {
    mdp: Arc<M>,
}

impl<M: Mdp> RandomPolicy<M> {
    pub fn new(mdp: Arc<M>) -> Self {
        Self { mdp }
    }
}

impl<M: Mdp> InnerPolicy<M> for RandomPolicy<M> {
    fn get_action(&self, state: &M::State, rng: &mut StdRng) -> i64 {
        use rand::seq::SliceRandom;
        let actions = self.mdp.allowed_actions(state);
        *actions.choose(rng).expect("RandomPolicy: no allowed actions")
    }
}

type PolicyFactory<M> = Box<dyn Fn(&Arc<M>, u64) -> Arc<dyn Policy> + Send + Sync>;

/// Registry of named policy factories an [`Mdp`] contributes at adapter
/// construction, plus the two always-available built-ins.
///
/// Grounded on `dynaplexprovider.cpp`'s provider/registrar pattern and
/// `MDPRegistrar`'s static self-registration convention observed in the
/// reference lost-sales MDP.
pub struct PolicyRegistry<M: Mdp> {
    factories: HashMap<String, PolicyFactory<M>>,
}

impl<M: Mdp + 'static> PolicyRegistry<M> {
    pub fn new() -> Self {
        let mut registry = Self { factories: HashMap::new() };
        registry.register("greedy", |mdp, hash| {
            Arc::new(PolicyAdapter::new(mdp.clone(), GreedyPolicy::new(mdp.clone()), hash, "greedy")) as Arc<dyn Policy>
        });
        registry.register("random", |mdp, hash| {
            Arc::new(PolicyAdapter::new(mdp.clone(), RandomPolicy::new(mdp.clone()), hash, "random")) as Arc<dyn Policy>
        });
        registry
    }

    pub fn register<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn(&Arc<M>, u64) -> Arc<dyn Policy> + Send + Sync + 'static,
    {
        self.factories.insert(id.into(), Box::new(factory));
    }

    pub fn get(&self, id: &str, mdp: &Arc<M>, mdp_hash: u64) -> Result<Arc<dyn Policy>> {
        self.factories
            .get(id)
            .map(|factory| factory(mdp, mdp_hash))
            .ok_or_else(|| DclError::config("PolicyRegistry", format!("no policy registered under id '{id}'")).logged())
    }
}

impl<M: Mdp + 'static> Default for PolicyRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}
