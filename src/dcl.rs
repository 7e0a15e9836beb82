//! The outer generational loop: generate samples, train, wrap the
//! trained scoring function as the next generation's policy, repeat.

use std::sync::Arc;

use crate::error::Result;
use crate::generator::{GeneratorConfig, SampleGenerator};
use crate::mdp::policy::PolicyAdapter;
use crate::mdp::{Mdp, MdpAdapter, Policy};
use crate::nn_policy::{NNPolicy, ScoringFunction};
use crate::sample::Sample;

/// The external training step. Out of this crate's core scope per its
/// non-goals; the loop only needs something that turns samples into a
/// scoring function.
pub trait Trainer<M: Mdp>: Send + Sync {
    fn train(&self, samples: &[Sample], generation: u64) -> Result<Arc<dyn ScoringFunction>>;
}

/// Persists and restores policies across generations, keyed by
/// generation number, so a loop can be resumed from disk.
pub trait PolicyStore<M: Mdp>: Send + Sync {
    fn save(&self, policy: &Arc<dyn Policy>, generation: u64) -> Result<()>;
    fn load(&self, generation: u64, adapter: &MdpAdapter<M>) -> Result<Arc<dyn Policy>>;
    fn has(&self, generation: u64) -> bool;
}

#[derive(Debug, Clone)]
pub struct DclConfig {
    /// `None` runs forever (until the caller stops driving the loop);
    /// `Some(n)` runs generations `1..=n`.
    pub num_gens: Option<u64>,
    /// Resumes from `resume_gen`'s persisted policy instead of the
    /// caller-supplied initial policy.
    pub resume_gen: u64,
    /// Skips training for any generation already present in the store,
    /// reusing the persisted policy instead — useful when only the
    /// last generation needs retraining.
    pub retrain_lastgen_only: bool,
    pub generator: GeneratorConfig,
}

impl Default for DclConfig {
    fn default() -> Self {
        Self { num_gens: Some(1), resume_gen: 0, retrain_lastgen_only: false, generator: GeneratorConfig::default() }
    }
}

pub struct DclLoop<M: Mdp> {
    adapter: Arc<MdpAdapter<M>>,
    trainer: Arc<dyn Trainer<M>>,
    store: Arc<dyn PolicyStore<M>>,
}

impl<M: Mdp + 'static> DclLoop<M> {
    pub fn new(adapter: Arc<MdpAdapter<M>>, trainer: Arc<dyn Trainer<M>>, store: Arc<dyn PolicyStore<M>>) -> Self {
        Self { adapter, trainer, store }
    }

    /// Runs generations `config.resume_gen + 1 ..= config.num_gens`,
    /// returning the final generation's policy.
    pub fn run(&self, config: &DclConfig, initial_policy: Arc<dyn Policy>) -> Result<Arc<dyn Policy>> {
        let mut policy = if config.resume_gen > 0 {
            self.store.load(config.resume_gen, &self.adapter)?
        } else {
            initial_policy
        };

        let mut generation = config.resume_gen + 1;
        loop {
            if let Some(num_gens) = config.num_gens {
                if generation > num_gens {
                    break;
                }
            }

            let is_last = config.num_gens == Some(generation);
            if config.retrain_lastgen_only && !is_last && self.store.has(generation) {
                policy = self.store.load(generation, &self.adapter)?;
                generation += 1;
                continue;
            }

            let generator = SampleGenerator::new(self.adapter.clone());
            let samples = generator.generate(&config.generator, policy.clone())?;
            let scoring_fn = self.trainer.train(&samples, generation)?;

            let mdp = self.adapter.mdp().clone();
            let new_policy: Arc<dyn Policy> = Arc::new(PolicyAdapter::new(
                mdp.clone(),
                NNPolicy::new(mdp, scoring_fn),
                self.adapter.mdp_hash(),
                "nn",
            ));
            self.store.save(&new_policy, generation)?;
            policy = new_policy;
            generation += 1;
        }

        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DclError;
    use crate::mdp::traits::{Horizon, StaticInfo};
    use crate::nn_policy::NetworkInputShape;
    use rand::rngs::StdRng;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct CounterMdp;

    impl Mdp for CounterMdp {
        type State = i64;
        type Event = ();

        fn static_info(&self) -> StaticInfo {
            StaticInfo { num_valid_actions: 3, num_features: 1, discount_factor: 0.9, horizon: Horizon::Finite }
        }

        fn get_initial_state(&self, _rng: &mut StdRng) -> Self::State {
            4
        }

        fn modify_state_with_action(&self, state: &mut Self::State, action: i64) -> f64 {
            *state += action - 1;
            -(state.abs() as f64)
        }

        fn get_event(&self, _state: &Self::State, _rng: &mut StdRng) -> Self::Event {}

        fn modify_state_with_event(&self, _state: &mut Self::State, _event: &Self::Event) -> f64 {
            0.0
        }

        fn allowed_actions(&self, _state: &Self::State) -> Vec<i64> {
            vec![0, 1, 2]
        }

        fn get_features(&self, state: &Self::State) -> Vec<f32> {
            vec![*state as f32]
        }

        fn get_state_category(&self, _state: &Self::State) -> crate::mdp::state::StateCategory {
            crate::mdp::state::StateCategory::AwaitAction
        }

        fn type_identifier(&self) -> &str {
            "counter"
        }
    }

    struct ConstantScoringFunction;
    impl ScoringFunction for ConstantScoringFunction {
        fn input_shape(&self) -> NetworkInputShape {
            NetworkInputShape::FlatVector
        }
        fn score(&self, _features: &[f32], _mask: Option<&[bool]>) -> Vec<f64> {
            vec![1.0, 2.0, 1.0]
        }
    }

    struct StubTrainer;
    impl Trainer<CounterMdp> for StubTrainer {
        fn train(&self, _samples: &[Sample], _generation: u64) -> Result<Arc<dyn ScoringFunction>> {
            Ok(Arc::new(ConstantScoringFunction))
        }
    }

    struct InMemoryStore {
        policies: Mutex<HashMap<u64, Arc<dyn Policy>>>,
    }
    impl InMemoryStore {
        fn new() -> Self {
            Self { policies: Mutex::new(HashMap::new()) }
        }
    }
    impl PolicyStore<CounterMdp> for InMemoryStore {
        fn save(&self, policy: &Arc<dyn Policy>, generation: u64) -> Result<()> {
            self.policies.lock().unwrap().insert(generation, policy.clone());
            Ok(())
        }
        fn load(&self, generation: u64, _adapter: &MdpAdapter<CounterMdp>) -> Result<Arc<dyn Policy>> {
            self.policies
                .lock()
                .unwrap()
                .get(&generation)
                .cloned()
                .ok_or_else(|| DclError::resource("InMemoryStore", "no such generation").logged())
        }
        fn has(&self, generation: u64) -> bool {
            self.policies.lock().unwrap().contains_key(&generation)
        }
    }

    #[test]
    fn run_trains_one_generation_and_persists_it() {
        let adapter = Arc::new(MdpAdapter::new(CounterMdp));
        let warm_start: Arc<dyn Policy> = adapter.get_policy("greedy").unwrap();

        let store = Arc::new(InMemoryStore::new());
        let loop_ = DclLoop::new(adapter, Arc::new(StubTrainer), store.clone());

        let mut config = DclConfig::default();
        config.generator.n = 4;
        config.generator.m = 2;
        config.generator.h = 2;
        config.generator.l = 0;
        config.generator.num_workers = Some(1);

        let final_policy = loop_.run(&config, warm_start).unwrap();
        assert_eq!(final_policy.type_identifier(), "nn");
        assert!(store.has(1));
    }
}
