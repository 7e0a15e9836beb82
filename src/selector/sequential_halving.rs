//! Sequential Halving action selection (Karnin, Koren & Somekh).
//!
//! Spends a fixed rollout budget across candidate actions in rounds,
//! discarding the worse-performing half of the remaining candidates
//! after each round, until one survives. Grounded on the reference
//! implementation's `SequentialHalvingSelector`.

use std::collections::HashMap;

use crate::error::{DclError, Result};
use crate::mdp::{Mdp, MdpAdapter};
use crate::sample::Sample;
use crate::trajectory::Trajectory;

use super::{candidate_actions, rollout_return, ActionSelector, SelectorConfig};

pub struct SequentialHalvingSelector {
    pub config: SelectorConfig,
    /// Total number of rollouts to spend across all rounds, for all
    /// candidates combined.
    pub rollout_budget: usize,
}

impl SequentialHalvingSelector {
    pub fn new(config: SelectorConfig, rollout_budget: usize) -> Self {
        Self { config, rollout_budget }
    }
}

impl<M: Mdp + 'static> ActionSelector<M> for SequentialHalvingSelector {
    fn set_sample(&self, adapter: &MdpAdapter<M>, trajectory: &Trajectory, sample_seed: i64) -> Result<Sample> {
        let mut remaining = candidate_actions(
            adapter,
            trajectory,
            self.config.base_policy.as_ref(),
            self.config.simulate_only_promising_actions,
            self.config.num_promising_actions,
        )?;
        if remaining.is_empty() {
            return Err(DclError::contract("SequentialHalvingSelector", "no candidate actions to evaluate").logged());
        }

        let features = adapter.get_flat_features(trajectory)?;
        let mut sample = Sample::new(features, adapter.static_info().num_valid_actions as usize);
        if self.config.simulate_only_promising_actions {
            let mut mask = vec![false; sample.action_scores.len()];
            for &action in &remaining {
                mask[action as usize] = true;
            }
            sample.promising_mask = Some(mask);
        }

        let num_rounds = (remaining.len() as f64).log2().ceil().max(1.0) as usize;
        let mut sums: HashMap<i64, f64> = HashMap::new();
        let mut counts: HashMap<i64, u64> = HashMap::new();
        let mut next_rollout_index: HashMap<i64, i64> = HashMap::new();

        if remaining.len() == 1 {
            let action = remaining[0];
            let rng = adapter.sub_rollout_rng(sample_seed, action, 0);
            let value = rollout_return(adapter, trajectory, action, self.config.base_policy.as_ref(), self.config.horizon, rng)?;
            sums.insert(action, value);
            counts.insert(action, 1);
        }

        while remaining.len() > 1 {
            // At least one rollout per remaining candidate per round, even
            // if the budget is too small to honor the even split exactly.
            let per_action = (self.rollout_budget / (remaining.len() * num_rounds)).max(1);

            for &action in &remaining {
                for _ in 0..per_action {
                    let index = next_rollout_index.entry(action).or_insert(0);
                    let rng = adapter.sub_rollout_rng(sample_seed, action, *index);
                    *index += 1;
                    let value = rollout_return(adapter, trajectory, action, self.config.base_policy.as_ref(), self.config.horizon, rng)?;
                    *sums.entry(action).or_insert(0.0) += value;
                    *counts.entry(action).or_insert(0) += 1;
                }
            }

            remaining.sort_by(|a, b| {
                let avg = |action: &i64| sums.get(action).copied().unwrap_or(f64::NEG_INFINITY) / counts.get(action).copied().unwrap_or(1) as f64;
                avg(b).partial_cmp(&avg(a)).expect("rollout returns must never be NaN")
            });
            let keep = remaining.len().div_ceil(2);
            remaining.truncate(keep);
        }

        for (&action, &sum) in sums.iter() {
            let count = counts.get(&action).copied().unwrap_or(1).max(1);
            sample.action_scores[action as usize] = sum / count as f64;
        }

        sample.chosen_action = remaining[0];
        Ok(sample)
    }
}
