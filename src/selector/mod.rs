//! Action selectors: the bandit algorithms a Sample Generator worker
//! uses to turn one `AwaitAction` trajectory into a [`Sample`].

mod sequential_halving;
mod uniform;

pub use sequential_halving::SequentialHalvingSelector;
pub use uniform::UniformActionSelector;

use std::sync::Arc;

use crate::error::{DclError, Result};
use crate::mdp::state::StateCategory;
use crate::mdp::{Mdp, MdpAdapter, Policy};
use crate::rng::RngProvider;
use crate::sample::Sample;
use crate::trajectory::Trajectory;

/// Produces one training [`Sample`] from a trajectory paused at
/// `AwaitAction`, by simulating candidate actions forward under a base
/// rollout policy.
pub trait ActionSelector<M: Mdp>: Send + Sync {
    fn set_sample(&self, adapter: &MdpAdapter<M>, trajectory: &Trajectory, sample_seed: i64) -> Result<Sample>;
}

/// The actions an action selector should evaluate: every allowed
/// action, or the `k` the base policy considers promising.
pub(crate) fn candidate_actions<M: Mdp + 'static>(
    adapter: &MdpAdapter<M>,
    trajectory: &Trajectory,
    base_policy: &dyn Policy,
    simulate_only_promising_actions: bool,
    num_promising_actions: usize,
) -> Result<Vec<i64>> {
    if simulate_only_promising_actions {
        let state = trajectory.get_state()?;
        base_policy.get_promising_actions(state, num_promising_actions)
    } else {
        adapter.allowed_actions(trajectory)
    }
}

/// Clones `parent`'s current state, applies `action`, then rolls the
/// trajectory forward under `policy` for up to `horizon` total steps
/// (the action plus `horizon - 1` further decisions), returning the
/// accumulated return.
///
/// For an infinite-horizon, undiscounted MDP the rollout is necessarily
/// truncated, so the raw cumulative return would grow with `horizon`
/// rather than estimating a steady-state rate; it is instead normalized
/// by the number of periods actually simulated.
pub(crate) fn rollout_return<M: Mdp + 'static>(
    adapter: &MdpAdapter<M>,
    parent: &Trajectory,
    action: i64,
    policy: &dyn Policy,
    horizon: i64,
    rng: RngProvider,
) -> Result<f64> {
    if horizon < 1 {
        return Err(DclError::config("rollout_return", "horizon must be at least 1").logged());
    }

    let mut scratch = adapter.new_trajectory(parent.external_index);
    scratch.rng = rng;
    adapter.initiate_state_from(&mut scratch, parent)?;
    scratch.next_action = action;
    adapter.incorporate_action(&mut scratch)?;
    let max_period = scratch.event_count + crate::mdp::DEFAULT_MAX_PERIOD_SLACK;
    adapter.incorporate_until_action(&mut scratch, max_period)?;

    for _ in 1..horizon {
        if scratch.category == StateCategory::Final {
            break;
        }
        adapter.incorporate_action_from_policy(&mut scratch, policy)?;
        let max_period = scratch.event_count + crate::mdp::DEFAULT_MAX_PERIOD_SLACK;
        adapter.incorporate_until_action(&mut scratch, max_period)?;
    }

    let info = adapter.static_info();
    if info.is_infinite_horizon() && info.discount_factor == 1.0 && scratch.event_count > 0 {
        Ok(scratch.cumulative_return / scratch.event_count as f64)
    } else {
        Ok(scratch.cumulative_return)
    }
}

/// Shared configuration fields both built-in selectors accept.
#[derive(Clone)]
pub struct SelectorConfig {
    pub base_policy: Arc<dyn Policy>,
    pub horizon: i64,
    pub simulate_only_promising_actions: bool,
    pub num_promising_actions: usize,
}
