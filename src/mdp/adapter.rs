//! Bridges a concrete [`Mdp`] into the type-erased operations the rest
//! of the engine drives trajectories with.
//!
//! Every [`DpState`] the adapter hands out is tagged with its own
//! process-local hash; every operation that takes a [`DpState`] back
//! checks that tag before downcasting, so a state produced by one
//! adapter can never silently be fed to another.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;

use super::policy::{Policy, PolicyRegistry};
use super::state::{downcast_state, downcast_state_mut, wrap_state, StateCategory};
use super::traits::{Mdp, StaticInfo};
use crate::error::{DclError, Result};
use crate::rng::RngProvider;
use crate::trajectory::Trajectory;

static NEXT_ADAPTER_ID: AtomicU64 = AtomicU64::new(1);

/// Default slack given to a single [`MdpAdapter::incorporate_until_action`]
/// call beyond the trajectory's `event_count` at the time it's invoked,
/// for callers with no tighter bound of their own. Guards against an MDP
/// whose events never advance the category out of `AwaitEvent`.
pub const DEFAULT_MAX_PERIOD_SLACK: i64 = 10_000;

/// Assigns a fresh, never-zero hash to a new adapter instance.
fn next_mdp_hash() -> u64 {
    let id = NEXT_ADAPTER_ID.fetch_add(1, Ordering::Relaxed);
    crate::rng::derive_seed(id as i64, 0x4D44_5000, 0)
}

/// Wraps a concrete `M: Mdp` and drives [`Trajectory`] instances through
/// it without the rest of the engine ever needing to know `M::State`.
pub struct MdpAdapter<M: Mdp> {
    mdp: Arc<M>,
    mdp_hash: u64,
    static_info: StaticInfo,
    policies: PolicyRegistry<M>,
}

impl<M: Mdp + 'static> MdpAdapter<M> {
    pub fn new(mdp: M) -> Self {
        let mdp = Arc::new(mdp);
        let static_info = mdp.static_info();
        let mut policies = PolicyRegistry::new();
        mdp.register_policies(&mut policies);
        Self { mdp_hash: next_mdp_hash(), static_info, policies, mdp }
    }

    pub fn static_info(&self) -> StaticInfo {
        self.static_info
    }

    pub fn mdp_hash(&self) -> u64 {
        self.mdp_hash
    }

    pub fn mdp(&self) -> &Arc<M> {
        &self.mdp
    }

    pub fn policies_mut(&mut self) -> &mut PolicyRegistry<M> {
        &mut self.policies
    }

    pub fn get_policy(&self, id: &str) -> Result<Arc<dyn Policy>> {
        self.policies.get(id, &self.mdp, self.mdp_hash)
    }

    /// Allocates an empty trajectory with the right number of event-RNG
    /// streams for this MDP. Must still be seeded and initiated before use.
    pub fn new_trajectory(&self, external_index: i64) -> Trajectory {
        Trajectory::new(self.mdp.num_event_streams(), external_index)
    }

    /// Seeds `trajectory` with a fresh initial state drawn from
    /// `initial_state_rng`, then repeatedly applies events until the
    /// state reaches `AwaitAction` or `Final`.
    pub fn initiate_state(&self, trajectory: &mut Trajectory) -> Result<()> {
        let mut rng_snapshot: StdRng = trajectory.rng.initial_state_rng().clone();
        let state = self.mdp.get_initial_state(&mut rng_snapshot);
        *trajectory.rng.initial_state_rng() = rng_snapshot;
        trajectory.reset_with_state(wrap_state(self.mdp_hash, state));
        self.sync_category(trajectory)?;
        self.incorporate_until_action(trajectory, DEFAULT_MAX_PERIOD_SLACK)?;
        Ok(())
    }

    /// Clones `src`'s state into `trajectory` (used by the action
    /// selector to fork sub-rollouts from a shared parent state).
    pub fn initiate_state_from(&self, trajectory: &mut Trajectory, src: &Trajectory) -> Result<()> {
        let src_state = src.get_state()?;
        self.check_identity(src_state)?;
        trajectory.reset_with_state(src_state.clone());
        self.sync_category(trajectory)
    }

    fn check_identity(&self, state: &super::state::DpState) -> Result<()> {
        if state.mdp_hash() != self.mdp_hash {
            return Err(DclError::identity("MdpAdapter", "state does not belong to this adapter").logged());
        }
        Ok(())
    }

    fn sync_category(&self, trajectory: &mut Trajectory) -> Result<()> {
        let state = trajectory.get_state()?;
        let typed: &M::State = downcast_state(state);
        trajectory.category = self.mdp.get_state_category(typed);
        Ok(())
    }

    /// Applies `trajectory.next_action`, accumulating reward into
    /// `cumulative_return` and advancing `category`.
    pub fn incorporate_action(&self, trajectory: &mut Trajectory) -> Result<()> {
        let action = trajectory.next_action;
        if !trajectory.category.is_await_action() {
            return Err(DclError::state("MdpAdapter::incorporate_action", "trajectory is not awaiting an action").logged());
        }
        let state = trajectory.get_state_mut()?;
        self.check_identity(state)?;
        let typed: &mut M::State = downcast_state_mut(state);
        if !self.mdp.is_allowed_action(typed, action) {
            return Err(DclError::contract(
                "MdpAdapter::incorporate_action",
                format!("action {action} is not allowed in the current state"),
            )
            .logged());
        }
        let reward = self.mdp.modify_state_with_action(typed, action);
        trajectory.cumulative_return += reward * trajectory.effective_discount;
        self.sync_category(trajectory)
    }

    /// Has `policy` set the action, then incorporates it.
    pub fn incorporate_action_from_policy(&self, trajectory: &mut Trajectory, policy: &dyn Policy) -> Result<()> {
        policy.set_action(std::slice::from_mut(trajectory))?;
        self.incorporate_action(trajectory)
    }

    /// Samples and applies the next event, advancing `effective_discount`
    /// and `event_count`.
    pub fn incorporate_event(&self, trajectory: &mut Trajectory) -> Result<()> {
        let index = match trajectory.category {
            StateCategory::AwaitEvent { index } => index,
            _ => return Err(DclError::state("MdpAdapter::incorporate_event", "trajectory is not awaiting an event").logged()),
        };
        let discount = self.static_info.discount_factor;
        let state = trajectory.get_state()?;
        self.check_identity(state)?;
        let typed: &M::State = downcast_state(state);
        let event = self.mdp.get_event(typed, trajectory.rng.event_stream(index));

        let state_mut = trajectory.get_state_mut()?;
        let typed_mut: &mut M::State = downcast_state_mut(state_mut);
        let reward = self.mdp.modify_state_with_event(typed_mut, &event);

        trajectory.cumulative_return += reward * trajectory.effective_discount;
        trajectory.effective_discount *= discount;
        trajectory.event_count += 1;
        self.sync_category(trajectory)
    }

    /// Incorporates events until the trajectory reaches `AwaitAction`,
    /// `Final`, or `event_count` reaches `max_period` — whichever comes
    /// first, so an MDP that never leaves `AwaitEvent` cannot hang the
    /// caller. Returns `true` iff the trajectory is `AwaitAction`.
    pub fn incorporate_until_action(&self, trajectory: &mut Trajectory, max_period: i64) -> Result<bool> {
        while trajectory.category.is_await_event() && trajectory.event_count < max_period {
            self.incorporate_event(trajectory)?;
        }
        Ok(trajectory.category.is_await_action())
    }

    /// Like [`Self::incorporate_until_action`], but also skips actions
    /// an MDP marks as trivial (a single allowed action) by applying
    /// them automatically. Mirrors `IncorporateUntilNonTrivialAction`.
    pub fn incorporate_until_nontrivial_action(&self, trajectory: &mut Trajectory, max_period: i64) -> Result<bool> {
        loop {
            if !self.incorporate_until_action(trajectory, max_period)? {
                return Ok(false);
            }
            let state = trajectory.get_state()?;
            let typed: &M::State = downcast_state(state);
            let actions = self.mdp.allowed_actions(typed);
            if actions.len() == 1 {
                trajectory.next_action = actions[0];
                self.incorporate_action(trajectory)?;
                continue;
            }
            return Ok(true);
        }
    }

    pub fn allowed_actions(&self, trajectory: &Trajectory) -> Result<Vec<i64>> {
        let state = trajectory.get_state()?;
        self.check_identity(state)?;
        Ok(self.mdp.allowed_actions(downcast_state(state)))
    }

    pub fn get_flat_features(&self, trajectory: &Trajectory) -> Result<Vec<f32>> {
        let state = trajectory.get_state()?;
        self.check_identity(state)?;
        Ok(self.mdp.get_features(downcast_state(state)))
    }

    /// A boolean mask over `0..num_valid_actions`, `true` where allowed.
    pub fn get_mask(&self, trajectory: &Trajectory) -> Result<Vec<bool>> {
        let allowed = self.allowed_actions(trajectory)?;
        let n = self.static_info.num_valid_actions as usize;
        let mut mask = vec![false; n];
        for action in allowed {
            if let Some(slot) = mask.get_mut(action as usize) {
                *slot = true;
            }
        }
        Ok(mask)
    }

    /// `(one-step expected reward, [(probability, next state)])` if the
    /// wrapped MDP publishes exact event probabilities.
    pub fn get_all_event_transitions(&self, trajectory: &Trajectory) -> Result<Option<(f64, Vec<(f64, super::state::DpState)>)>> {
        let state = trajectory.get_state()?;
        self.check_identity(state)?;
        let typed: &M::State = downcast_state(state);
        Ok(self.mdp.get_all_event_transitions(typed).map(|(reward, next_states)| {
            let tagged = next_states
                .into_iter()
                .map(|(p, s)| (p, wrap_state(self.mdp_hash, s)))
                .collect();
            (reward, tagged)
        }))
    }

    pub fn return_useful_statistics(&self, trajectory: &Trajectory) -> Result<Vec<f64>> {
        let state = trajectory.get_state()?;
        self.check_identity(state)?;
        Ok(self.mdp.return_useful_statistics(downcast_state(state)))
    }

    /// Clears accumulated hidden diagnostics (e.g. useful-statistics
    /// accumulators) without otherwise disturbing the state. Used by
    /// the Policy Comparer after the warm-up period.
    pub fn reset_hidden_state_variables(&self, trajectory: &mut Trajectory) -> Result<()> {
        let state = trajectory.get_state_mut()?;
        self.check_identity(state)?;
        self.mdp.reset_hidden_state_variables(downcast_state_mut(state));
        Ok(())
    }

    pub fn set_arg_max_action(&self, trajectory: &mut Trajectory, scores: &[f64]) -> Result<()> {
        let mask = self.get_mask(trajectory)?;
        let mut best_action = None;
        let mut best_score = f64::NEG_INFINITY;
        for (action, &allowed) in mask.iter().enumerate() {
            if allowed && scores[action] > best_score {
                best_score = scores[action];
                best_action = Some(action as i64);
            }
        }
        trajectory.next_action = best_action.ok_or_else(|| {
            DclError::contract("MdpAdapter::set_arg_max_action", "no allowed action has a finite score").logged()
        })?;
        Ok(())
    }

    /// Per-generation hyperparameter advice, queried once against a
    /// fresh initial state. `None` means the MDP has no opinion and the
    /// caller should use its own configured default.
    pub fn hyperparameter_advice(&self, rng: &mut StdRng) -> (Option<i64>, Option<i64>, Option<i64>, Option<i64>) {
        let state = self.mdp.get_initial_state(rng);
        (
            self.mdp.get_l(&state),
            self.mdp.get_h(&state),
            self.mdp.get_m(&state),
            self.mdp.get_reinitiate_counter(&state),
        )
    }

    /// Builds a standalone [`RngProvider`] with the same event-stream
    /// count as trajectories from this adapter, seeded for an
    /// action-selector sub-rollout.
    pub fn sub_rollout_rng(&self, sample_seed: i64, action_index: i64, sub_rollout_index: i64) -> RngProvider {
        RngProvider::for_sub_rollout(self.mdp.num_event_streams(), sample_seed, action_index, sub_rollout_index)
    }
}
