//! Explicit state enumeration plus hybrid policy/value iteration, for
//! correctness validation on MDPs small enough to solve exactly.
//!
//! Grounded on the reference implementation's `ExactSolver`: states are
//! deduplicated by a hash of their feature vector (collisions are
//! counted and warned on), a self-transition probability breaks
//! periodicity in infinite-horizon undiscounted MDPs, and policy
//! improvement alternates with batches of value-iteration sweeps until
//! the value function stops moving.

use std::collections::HashMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{DclError, Result};
use crate::mdp::{InnerPolicy, Mdp, StaticInfo};

const VALUE_ITERATION_SWEEPS_PER_ROUND: usize = 10;
const CONVERGENCE_THRESHOLD: f64 = 0.0001;
const SELF_TRANSITION_PROB: f64 = 0.02;
const MAX_EVENT_CHAIN_DEPTH: usize = 6;
/// Sentinel transition target representing a `Final` state: an
/// absorbing sink whose value is always zero.
const TERMINAL_SINK: usize = usize::MAX;

#[derive(Debug, Clone, Copy)]
pub struct ExactSolverConfig {
    pub max_states: usize,
    pub convergence_threshold: f64,
}

impl Default for ExactSolverConfig {
    fn default() -> Self {
        Self { max_states: 1_048_576, convergence_threshold: CONVERGENCE_THRESHOLD }
    }
}

struct Transition {
    action: i64,
    expected_reward: f64,
    outcomes: Vec<(f64, usize)>,
}

struct StateRecord<S> {
    state: S,
    transitions: Vec<Transition>,
    value: f64,
    policy_action: i64,
}

pub struct ExactSolution {
    pub optimal_gain: f64,
    pub num_states: usize,
    pub hash_collisions: usize,
}

/// A policy backed by the exact solver's solved action-state table.
pub struct ExactPolicy<M: Mdp> {
    mdp: Arc<M>,
    by_feature_hash: HashMap<u64, i64>,
}

impl<M: Mdp> InnerPolicy<M> for ExactPolicy<M> {
    fn get_action(&self, state: &M::State, _rng: &mut StdRng) -> i64 {
        let key = feature_hash(&self.mdp.get_features(state));
        *self
            .by_feature_hash
            .get(&key)
            .expect("ExactPolicy queried on a state the solver never visited")
    }
}

fn feature_hash(features: &[f32]) -> u64 {
    // FNV-style hash combine over the bit pattern of each feature,
    // mirroring the reference implementation's hash-combine constant.
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for f in features {
        let bits = f.to_bits() as u64;
        hash ^= bits.wrapping_add(0x9e37_79b9_7f4a_7c15).wrapping_add(hash << 6).wrapping_add(hash >> 2);
    }
    hash
}

pub struct ExactSolver<M: Mdp> {
    mdp: Arc<M>,
    config: ExactSolverConfig,
}

impl<M: Mdp + 'static> ExactSolver<M> {
    pub fn new(mdp: Arc<M>, config: ExactSolverConfig) -> Self {
        Self { mdp, config }
    }

    /// Enumerates reachable action-states, solves for the optimal
    /// value function and policy, and returns both the solution
    /// summary and a policy that plays it back.
    pub fn solve(&self) -> Result<(ExactSolution, ExactPolicy<M>)> {
        let info = self.mdp.static_info();
        let mut states: Vec<StateRecord<M::State>> = Vec::new();
        let mut by_hash: HashMap<u64, Vec<usize>> = HashMap::new();
        let mut hash_collisions = 0usize;

        let mut seed_rng = StdRng::seed_from_u64(0);
        let initial = self.mdp.get_initial_state(&mut seed_rng);
        let (_, initial_outcomes) = self.flatten_event_chain(&initial, 0)?;
        for (_, leaf) in initial_outcomes {
            if !self.mdp.get_state_category(&leaf).is_final() {
                self.enqueue_state(leaf, &mut states, &mut by_hash, &mut hash_collisions)?;
            }
        }

        let mut frontier = 0usize;
        while frontier < states.len() {
            let current_state = states[frontier].state.clone();
            let actions = self.mdp.allowed_actions(&current_state);
            if actions.is_empty() {
                return Err(DclError::contract("ExactSolver", "a reachable state has no allowed actions").logged());
            }

            let mut transitions = Vec::with_capacity(actions.len());
            for action in actions {
                let mut after_action = current_state.clone();
                let action_reward = self.mdp.modify_state_with_action(&mut after_action, action);
                let (chain_reward, outcomes) = self.flatten_event_chain(&after_action, 0)?;

                let mut resolved_outcomes = Vec::with_capacity(outcomes.len());
                for (probability, leaf) in outcomes {
                    let index = if self.mdp.get_state_category(&leaf).is_final() {
                        TERMINAL_SINK
                    } else {
                        self.enqueue_state(leaf, &mut states, &mut by_hash, &mut hash_collisions)?
                    };
                    if states.len() > self.config.max_states {
                        return Err(DclError::resource(
                            "ExactSolver",
                            format!("reachable state count exceeded max_states ({})", self.config.max_states),
                        )
                        .logged());
                    }
                    resolved_outcomes.push((probability, index));
                }

                transitions.push(Transition { action, expected_reward: action_reward + chain_reward, outcomes: resolved_outcomes });
            }
            states[frontier].transitions = transitions;
            states[frontier].policy_action = states[frontier].transitions[0].action;
            frontier += 1;
        }

        if states.len() as f64 * 0.05 < hash_collisions as f64 {
            log::warn!("ExactSolver: hash collisions affected more than 5% of {} states", states.len());
        }

        let sigma = if info.is_infinite_horizon() && info.discount_factor == 1.0 { SELF_TRANSITION_PROB } else { 0.0 };
        self.iterate_to_convergence(&mut states, &info, sigma);

        let rescale = 1.0 - sigma;
        let optimal_gain = states[0].value * rescale;

        let by_feature_hash = states
            .iter()
            .map(|record| (feature_hash(&self.mdp.get_features(&record.state)), record.policy_action))
            .collect();

        Ok((
            ExactSolution { optimal_gain, num_states: states.len(), hash_collisions },
            ExactPolicy { mdp: self.mdp.clone(), by_feature_hash },
        ))
    }

    fn enqueue_state(
        &self,
        state: M::State,
        states: &mut Vec<StateRecord<M::State>>,
        by_hash: &mut HashMap<u64, Vec<usize>>,
        hash_collisions: &mut usize,
    ) -> Result<usize> {
        let features = self.mdp.get_features(&state);
        let key = feature_hash(&features);
        if let Some(indices) = by_hash.get(&key) {
            for &index in indices {
                if self.mdp.get_features(&states[index].state) == features {
                    return Ok(index);
                }
            }
            *hash_collisions += 1;
        }
        let index = states.len();
        states.push(StateRecord { state, transitions: Vec::new(), value: 0.0, policy_action: 0 });
        by_hash.entry(key).or_default().push(index);
        Ok(index)
    }

    /// Recursively resolves a post-action state through however many
    /// chained event applications it takes to land on `AwaitAction` or
    /// `Final`, combining probabilities and expected rewards along the
    /// way. Only MDPs that publish exact event probabilities
    /// (`get_all_event_transitions`) can be solved exactly.
    fn flatten_event_chain(&self, state: &M::State, depth: usize) -> Result<(f64, Vec<(f64, M::State)>)> {
        let category = self.mdp.get_state_category(state);
        if category.is_await_action() || category.is_final() {
            return Ok((0.0, vec![(1.0, state.clone())]));
        }
        if depth > MAX_EVENT_CHAIN_DEPTH {
            return Err(DclError::numeric("ExactSolver", "event chain exceeded the maximum resolvable depth").logged());
        }
        let (expected_reward, branches) = self
            .mdp
            .get_all_event_transitions(state)
            .ok_or_else(|| DclError::contract("ExactSolver", "MDP does not publish exact event probabilities").logged())?;

        let mut total_reward = expected_reward;
        let mut flattened = Vec::new();
        for (probability, next_state) in branches {
            let (sub_reward, sub_outcomes) = self.flatten_event_chain(&next_state, depth + 1)?;
            total_reward += probability * sub_reward;
            for (sub_probability, leaf) in sub_outcomes {
                flattened.push((probability * sub_probability, leaf));
            }
        }
        Ok((total_reward, flattened))
    }

    fn iterate_to_convergence(&self, states: &mut [StateRecord<M::State>], info: &StaticInfo, sigma: f64) {
        loop {
            for _ in 0..VALUE_ITERATION_SWEEPS_PER_ROUND {
                value_sweep(states, info.discount_factor, sigma);
            }
            let max_change = update_policy(states, info.discount_factor, sigma);
            value_sweep(states, info.discount_factor, sigma);
            if max_change <= self.config.convergence_threshold {
                break;
            }
        }
    }
}

fn value_sweep<S: Clone>(states: &mut [StateRecord<S>], discount_factor: f64, sigma: f64) {
    let snapshot: Vec<f64> = states.iter().map(|s| s.value).collect();
    for index in 0..states.len() {
        let transition = states[index].transitions.iter().find(|t| t.action == states[index].policy_action).expect("policy action must have a resolved transition");
        let next_value: f64 = transition
            .outcomes
            .iter()
            .map(|&(p, idx)| p * if idx == TERMINAL_SINK { 0.0 } else { snapshot[idx] })
            .sum();
        let blended = if sigma > 0.0 { (1.0 - sigma) * next_value + sigma * snapshot[index] } else { next_value };
        states[index].value = transition.expected_reward + discount_factor * blended;
    }
}

fn update_policy<S: Clone>(states: &mut [StateRecord<S>], discount_factor: f64, sigma: f64) -> f64 {
    let snapshot: Vec<f64> = states.iter().map(|s| s.value).collect();
    let mut max_change = 0.0f64;
    for index in 0..states.len() {
        let mut best_action = states[index].policy_action;
        let mut best_value = f64::NEG_INFINITY;
        for transition in &states[index].transitions {
            let next_value: f64 = transition
                .outcomes
                .iter()
                .map(|&(p, idx)| p * if idx == TERMINAL_SINK { 0.0 } else { snapshot[idx] })
                .sum();
            let blended = if sigma > 0.0 { (1.0 - sigma) * next_value + sigma * snapshot[index] } else { next_value };
            let q = transition.expected_reward + discount_factor * blended;
            if q > best_value {
                best_value = q;
                best_action = transition.action;
            }
        }
        max_change = max_change.max((best_value - snapshot[index]).abs());
        states[index].policy_action = best_action;
    }
    max_change
}
