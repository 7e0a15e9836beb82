//! Parallel, paired evaluation of one or many policies over many
//! independent trajectories.
//!
//! Every trajectory is seeded with `eval=true`, so trajectory `k` sees
//! an identical event sequence under every policy being compared
//! regardless of worker-thread assignment — the common-random-numbers
//! pairing that makes the reported gap meaningful. Grounded on the
//! reference implementation's `PolicyComparer`.

use std::sync::{Arc, Mutex};

use crate::error::{DclError, Result};
use crate::mdp::{Mdp, MdpAdapter, Policy};
use crate::trajectory::Trajectory;

#[derive(Debug, Clone)]
pub struct ComparerConfig {
    pub number_of_trajectories: usize,
    pub periods_per_trajectory: i64,
    /// Infinite-horizon, undiscounted only: periods advanced (and
    /// discarded) before the baseline return is recorded.
    pub warmup_periods: i64,
    /// Finite-horizon only: fatal if a trajectory has not reached
    /// `Final` after this many events.
    pub max_periods_until_error: i64,
    pub rng_seed: i64,
    /// How many of the MDP's user-defined statistics to collect.
    pub number_of_statistics: usize,
    /// Subtracts statistic 0 (the MDP's unavoidable-cost statistic)
    /// from the per-trajectory return before aggregating.
    pub avoidable_cost: bool,
    pub print_standard_error: bool,
    pub num_workers: Option<usize>,
}

impl Default for ComparerConfig {
    fn default() -> Self {
        Self {
            number_of_trajectories: 4096,
            periods_per_trajectory: 1024,
            warmup_periods: 128,
            max_periods_until_error: 16_384,
            rng_seed: 13_021_984,
            number_of_statistics: 0,
            avoidable_cost: false,
            print_standard_error: false,
            num_workers: None,
        }
    }
}

/// Mean, standard error, and optional diagnostics for one policy.
#[derive(Debug, Clone)]
pub struct ComparisonRecord {
    pub policy_id: String,
    pub mean: f64,
    pub standard_error: f64,
    pub mean_stat: Vec<f64>,
    pub st_error_stat: Vec<f64>,
    /// `mean - mean[benchmark]`, set on every record but the benchmark's
    /// own (which is always `0.0`) when comparing more than one policy.
    pub gap: Option<f64>,
    pub avoidable_mean: Option<f64>,
}

pub struct PolicyComparer<M: Mdp> {
    adapter: Arc<MdpAdapter<M>>,
}

impl<M: Mdp + 'static> PolicyComparer<M> {
    pub fn new(adapter: Arc<MdpAdapter<M>>) -> Self {
        Self { adapter }
    }

    pub fn assess(&self, policy_id: &str, policy: Arc<dyn Policy>, config: &ComparerConfig) -> Result<ComparisonRecord> {
        let mut records = self.compare(&[(policy_id.to_string(), policy)], config)?;
        Ok(records.remove(0))
    }

    /// Evaluates every `(id, policy)` pair against the same
    /// `number_of_trajectories` seeds, index `0` acting as the
    /// benchmark for the reported `gap`.
    pub fn compare(&self, policies: &[(String, Arc<dyn Policy>)], config: &ComparerConfig) -> Result<Vec<ComparisonRecord>> {
        if policies.is_empty() {
            return Err(DclError::config("PolicyComparer", "at least one policy is required").logged());
        }

        let mut records = Vec::with_capacity(policies.len());
        for (id, policy) in policies {
            records.push(self.evaluate_one(id, policy, config)?);
        }

        let benchmark_mean = records[0].mean;
        for record in records.iter_mut() {
            record.gap = Some(record.mean - benchmark_mean);
        }

        Ok(records)
    }

    fn evaluate_one(&self, policy_id: &str, policy: &Arc<dyn Policy>, config: &ComparerConfig) -> Result<ComparisonRecord> {
        let num_workers = config
            .num_workers
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
            .max(1);
        let results: Mutex<Vec<(f64, Vec<f64>)>> = Mutex::new(Vec::with_capacity(config.number_of_trajectories));

        std::thread::scope(|scope| -> Result<()> {
            let chunk = config.number_of_trajectories.div_ceil(num_workers);
            let mut handles = Vec::new();
            for worker_id in 0..num_workers {
                let start = worker_id * chunk;
                let end = (start + chunk).min(config.number_of_trajectories);
                if start >= end {
                    continue;
                }
                let adapter = &self.adapter;
                let policy = policy.clone();
                let results = &results;
                handles.push(scope.spawn(move || -> Result<()> {
                    let mut local = Vec::with_capacity(end - start);
                    for trajectory_index in start..end {
                        local.push(run_one_trajectory(adapter, policy.as_ref(), config, trajectory_index as i64, worker_id as u32)?);
                    }
                    results.lock().expect("policy comparer results mutex poisoned").extend(local);
                    Ok(())
                }));
            }
            for handle in handles {
                handle.join().expect("policy comparer worker panicked")?;
            }
            Ok(())
        })?;

        let results = results.into_inner().expect("policy comparer results mutex poisoned");
        let (returns, stats): (Vec<f64>, Vec<Vec<f64>>) = results.into_iter().unzip();

        let (mean, standard_error) = mean_and_standard_error(&returns);
        let (mean_stat, st_error_stat) = transpose_mean_and_standard_error(&stats, config.number_of_statistics);

        let avoidable_mean = if config.avoidable_cost && !mean_stat.is_empty() { Some(mean - mean_stat[0]) } else { None };

        Ok(ComparisonRecord {
            policy_id: policy_id.to_string(),
            mean,
            standard_error,
            mean_stat,
            st_error_stat,
            gap: None,
            avoidable_mean,
        })
    }
}

fn run_one_trajectory<M: Mdp + 'static>(
    adapter: &MdpAdapter<M>,
    policy: &dyn Policy,
    config: &ComparerConfig,
    trajectory_index: i64,
    worker_id: u32,
) -> Result<(f64, Vec<f64>)> {
    let mut traj = adapter.new_trajectory(trajectory_index);
    traj.seed_rng(true, config.rng_seed, trajectory_index, worker_id);
    adapter.initiate_state(&mut traj)?;

    let info = adapter.static_info();
    let per_period_return = if !info.is_infinite_horizon() {
        run_finite_horizon(adapter, &mut traj, policy, config.max_periods_until_error)?
    } else if info.discount_factor >= 1.0 {
        run_infinite_undiscounted(adapter, &mut traj, policy, config.warmup_periods, config.periods_per_trajectory)?
    } else {
        advance_periods(adapter, &mut traj, policy, config.periods_per_trajectory)?;
        traj.cumulative_return
    };

    let stats = adapter.return_useful_statistics(&traj)?;
    Ok((per_period_return, stats))
}

fn run_finite_horizon<M: Mdp + 'static>(
    adapter: &MdpAdapter<M>,
    traj: &mut Trajectory,
    policy: &dyn Policy,
    max_periods_until_error: i64,
) -> Result<f64> {
    let mut periods = 0i64;
    while !traj.category.is_final() {
        if periods >= max_periods_until_error {
            return Err(DclError::contract(
                "PolicyComparer",
                "trajectory did not reach Final within max_periods_until_error",
            )
            .logged());
        }
        if traj.category.is_await_action() {
            adapter.incorporate_action_from_policy(traj, policy)?;
        }
        let max_period = traj.event_count + crate::mdp::DEFAULT_MAX_PERIOD_SLACK;
        adapter.incorporate_until_action(traj, max_period)?;
        periods += 1;
    }
    Ok(traj.cumulative_return)
}

fn run_infinite_undiscounted<M: Mdp + 'static>(
    adapter: &MdpAdapter<M>,
    traj: &mut Trajectory,
    policy: &dyn Policy,
    warmup_periods: i64,
    periods_per_trajectory: i64,
) -> Result<f64> {
    advance_periods(adapter, traj, policy, warmup_periods)?;
    let baseline = traj.cumulative_return;
    adapter.reset_hidden_state_variables(traj)?;
    advance_periods(adapter, traj, policy, warmup_periods + periods_per_trajectory)?;
    Ok((traj.cumulative_return - baseline) / periods_per_trajectory as f64)
}

fn advance_periods<M: Mdp + 'static>(
    adapter: &MdpAdapter<M>,
    traj: &mut Trajectory,
    policy: &dyn Policy,
    target_event_count: i64,
) -> Result<()> {
    while traj.event_count < target_event_count && !traj.category.is_final() {
        if traj.category.is_await_action() {
            adapter.incorporate_action_from_policy(traj, policy)?;
        }
        let max_period = traj.event_count + crate::mdp::DEFAULT_MAX_PERIOD_SLACK;
        adapter.incorporate_until_action(traj, max_period)?;
    }
    Ok(())
}

fn mean_and_standard_error(values: &[f64]) -> (f64, f64) {
    let n = values.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    if n == 1 {
        return (mean, 0.0);
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    (mean, (variance / n as f64).sqrt())
}

fn transpose_mean_and_standard_error(stats: &[Vec<f64>], number_of_statistics: usize) -> (Vec<f64>, Vec<f64>) {
    let mut means = Vec::with_capacity(number_of_statistics);
    let mut errors = Vec::with_capacity(number_of_statistics);
    for i in 0..number_of_statistics {
        let column: Vec<f64> = stats.iter().filter_map(|row| row.get(i).copied()).collect();
        let (mean, error) = mean_and_standard_error(&column);
        means.push(mean);
        errors.push(error);
    }
    (means, errors)
}
