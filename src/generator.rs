//! Parallel construction of training samples under a warm-start policy.
//!
//! A pool of worker threads each drive a small set of *driving
//! trajectories* forward, invoking an [`ActionSelector`] whenever one
//! reaches an action decision, until the process-wide sample counter
//! reaches the target. Grounded on the reference implementation's
//! sample-generation loop; workers share one
//! [`std::sync::atomic::AtomicI64`] counter and a single `Mutex`-guarded
//! output buffer rather than a `rayon` pool, because each worker owns
//! long-lived, stateful trajectories rather than running one pure
//! closure per item.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{DclError, Result};
use crate::mdp::{Mdp, MdpAdapter, Policy};
use crate::sample::Sample;
use crate::selector::{ActionSelector, SelectorConfig, SequentialHalvingSelector, UniformActionSelector};
use crate::trajectory::Trajectory;

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// `N`: total samples to collect this generation.
    pub n: usize,
    /// `M`: per-decision rollout budget handed to the action selector.
    pub m: usize,
    /// `H`: rollout horizon.
    pub h: i64,
    /// `L`: warm-up events before the first emission is accepted, for
    /// infinite-horizon MDPs only.
    pub l: i64,
    /// Events a driving trajectory advances before it is discarded and
    /// reinitiated from a fresh initial state. `None` defers to the
    /// MDP's own advice (`Mdp::get_reinitiate_counter`), falling back
    /// to "never" if the MDP has no opinion either.
    pub reinitiate_counter: Option<i64>,
    pub rng_seed: i64,
    pub enable_sequential_halving: bool,
    pub simulate_only_promising_actions: bool,
    pub num_promising_actions: usize,
    /// Worker count; `None` uses the host's available parallelism.
    pub num_workers: Option<usize>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            n: 5000,
            m: 1000,
            h: 256,
            l: 100,
            reinitiate_counter: None,
            rng_seed: 13_021_984,
            enable_sequential_halving: false,
            simulate_only_promising_actions: false,
            num_promising_actions: 0,
            num_workers: None,
        }
    }
}

/// Splits `[0, n)` into the contiguous, non-overlapping range owned by
/// rank `rank` out of `size` ranks, for the distributed-generation
/// protocol (each rank produces `ceil(n / size)` samples).
pub fn partition_for_rank(n: usize, rank: usize, size: usize) -> std::ops::Range<usize> {
    let per_rank = n.div_ceil(size);
    let start = (rank * per_rank).min(n);
    let end = (start + per_rank).min(n);
    start..end
}

pub struct SampleGenerator<M: Mdp> {
    adapter: Arc<MdpAdapter<M>>,
}

impl<M: Mdp + 'static> SampleGenerator<M> {
    pub fn new(adapter: Arc<MdpAdapter<M>>) -> Self {
        Self { adapter }
    }

    /// Produces `config.n` samples (or the rank's share, via
    /// `sample_index_offset`/`n_override` for the distributed variant)
    /// under `warm_start_policy`.
    pub fn generate(&self, config: &GeneratorConfig, warm_start_policy: Arc<dyn Policy>) -> Result<Vec<Sample>> {
        self.generate_range(config, warm_start_policy, 0..config.n)
    }

    /// As [`Self::generate`], but only fills `range` of the `[0, N)`
    /// sample-index space — used by each rank in the distributed
    /// protocol so seed spaces never overlap.
    pub fn generate_range(
        &self,
        config: &GeneratorConfig,
        warm_start_policy: Arc<dyn Policy>,
        range: std::ops::Range<usize>,
    ) -> Result<Vec<Sample>> {
        let target = range.end.saturating_sub(range.start);
        if target == 0 {
            return Ok(Vec::new());
        }

        let selector_config = SelectorConfig {
            base_policy: warm_start_policy.clone(),
            horizon: config.h,
            simulate_only_promising_actions: config.simulate_only_promising_actions,
            num_promising_actions: config.num_promising_actions,
        };
        let selector: Arc<dyn ActionSelector<M>> = if config.enable_sequential_halving {
            Arc::new(SequentialHalvingSelector::new(selector_config, config.m))
        } else {
            Arc::new(UniformActionSelector::new(selector_config, config.m))
        };

        let num_workers = config.num_workers.unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)).max(1);
        let counter = AtomicI64::new(range.start as i64);
        let limit = range.end as i64;
        let buffer: Mutex<Vec<Sample>> = Mutex::new(Vec::with_capacity(target));
        let first_error: Mutex<Option<DclError>> = Mutex::new(None);

        std::thread::scope(|scope| {
            for worker_id in 0..num_workers {
                let adapter = &self.adapter;
                let selector = &selector;
                let warm_start_policy = &warm_start_policy;
                let counter = &counter;
                let buffer = &buffer;
                let first_error = &first_error;
                scope.spawn(move || {
                    if let Err(err) = run_worker(adapter, selector.as_ref(), warm_start_policy, config, worker_id as u32, counter, limit, buffer) {
                        let mut guard = first_error.lock().expect("sample generator error mutex poisoned");
                        if guard.is_none() {
                            *guard = Some(err);
                        }
                    }
                });
            }
        });

        if let Some(err) = first_error.into_inner().expect("sample generator error mutex poisoned") {
            return Err(err);
        }

        let mut samples = buffer.into_inner().expect("sample generator buffer mutex poisoned");
        samples.sort_by_key(|s| s.sample_index);
        Ok(samples)
    }
}

#[allow(clippy::too_many_arguments)]
fn run_worker<M: Mdp + 'static>(
    adapter: &MdpAdapter<M>,
    selector: &dyn ActionSelector<M>,
    warm_start_policy: &Arc<dyn Policy>,
    config: &GeneratorConfig,
    worker_id: u32,
    counter: &AtomicI64,
    limit: i64,
    buffer: &Mutex<Vec<Sample>>,
) -> Result<()> {
    let reinitiate_counter = config.reinitiate_counter.unwrap_or(i64::MAX);
    let mut driving = adapter.new_trajectory(worker_id as i64);
    driving.seed_rng(false, config.rng_seed, 0, worker_id);
    adapter.initiate_state(&mut driving)?;

    // Counts decisions this worker has evaluated, emitted or not, so
    // every selector call gets its own seed even during warm-up.
    let mut decisions_evaluated: i64 = 0;

    while counter.load(Ordering::SeqCst) < limit {
        ensure_await_action(adapter, &mut driving, warm_start_policy, reinitiate_counter)?;

        let seed_index = (worker_id as i64) * 1_000_000_000 + decisions_evaluated;
        decisions_evaluated += 1;
        let sample_seed = crate::rng::derive_seed(config.rng_seed, 0x5A_47_454E, seed_index) as i64;
        let mut sample = selector.set_sample(adapter, &driving, sample_seed)?;

        let chosen_action = sample.chosen_action;
        let still_warming_up = adapter.static_info().is_infinite_horizon() && driving.event_count < config.l;
        if !still_warming_up {
            let index = counter.fetch_add(1, Ordering::SeqCst);
            if index < limit {
                sample.sample_index = index;
                buffer.lock().expect("sample generator buffer mutex poisoned").push(sample);
            }
        }

        driving.next_action = chosen_action;
        adapter.incorporate_action(&mut driving)?;
        let max_period = driving.event_count + crate::mdp::DEFAULT_MAX_PERIOD_SLACK;
        adapter.incorporate_until_action(&mut driving, max_period)?;
    }
    Ok(())
}

fn ensure_await_action<M: Mdp + 'static>(
    adapter: &MdpAdapter<M>,
    driving: &mut Trajectory,
    warm_start_policy: &Arc<dyn Policy>,
    reinitiate_counter: i64,
) -> Result<()> {
    if driving.category.is_final() || driving.event_count >= reinitiate_counter {
        adapter.initiate_state(driving)?;
    }
    while !driving.category.is_await_action() {
        if driving.category.is_final() {
            adapter.initiate_state(driving)?;
            continue;
        }
        adapter.incorporate_action_from_policy(driving, warm_start_policy.as_ref())?;
        let max_period = driving.event_count + crate::mdp::DEFAULT_MAX_PERIOD_SLACK;
        adapter.incorporate_until_action(driving, max_period)?;
    }
    Ok(())
}
