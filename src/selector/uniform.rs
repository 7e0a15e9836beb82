//! Rolls out every candidate action an equal, fixed number of times.
//!
//! Grounded on the reference implementation's `UniformActionSelector`:
//! the simplest possible selector, useful as a baseline and for MDPs
//! small enough that exhaustive rollout is affordable.

use crate::error::{DclError, Result};
use crate::mdp::{Mdp, MdpAdapter};
use crate::sample::Sample;
use crate::trajectory::Trajectory;

use super::{candidate_actions, rollout_return, ActionSelector, SelectorConfig};

pub struct UniformActionSelector {
    pub config: SelectorConfig,
    /// Per-decision rollout budget (`M`), split evenly across
    /// candidate actions.
    pub rollout_budget: usize,
}

impl UniformActionSelector {
    pub fn new(config: SelectorConfig, rollout_budget: usize) -> Self {
        Self { config, rollout_budget }
    }
}

impl<M: Mdp + 'static> ActionSelector<M> for UniformActionSelector {
    fn set_sample(&self, adapter: &MdpAdapter<M>, trajectory: &Trajectory, sample_seed: i64) -> Result<Sample> {
        let candidates = candidate_actions(
            adapter,
            trajectory,
            self.config.base_policy.as_ref(),
            self.config.simulate_only_promising_actions,
            self.config.num_promising_actions,
        )?;
        if candidates.is_empty() {
            return Err(DclError::contract("UniformActionSelector", "no candidate actions to evaluate").logged());
        }

        let features = adapter.get_flat_features(trajectory)?;
        let mut sample = Sample::new(features, adapter.static_info().num_valid_actions as usize);
        if self.config.simulate_only_promising_actions {
            let mut mask = vec![false; sample.action_scores.len()];
            for &action in &candidates {
                mask[action as usize] = true;
            }
            sample.promising_mask = Some(mask);
        }

        // Falls back to one rollout per action when the budget is too
        // small to split evenly across every candidate.
        let per_action = (self.rollout_budget / candidates.len()).max(1);
        for &action in &candidates {
            let mut total = 0.0;
            for rollout in 0..per_action {
                let rng = adapter.sub_rollout_rng(sample_seed, action, rollout as i64);
                total += rollout_return(adapter, trajectory, action, self.config.base_policy.as_ref(), self.config.horizon, rng)?;
            }
            sample.action_scores[action as usize] = total / per_action as f64;
        }

        sample.chosen_action = sample
            .arg_max_action()
            .ok_or_else(|| DclError::contract("UniformActionSelector", "no action received a finite score").logged())?;
        Ok(sample)
    }
}
