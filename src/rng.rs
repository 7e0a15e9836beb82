//! Per-trajectory RNG streams and the deterministic seed-tree.
//!
//! Every trajectory owns `N+3` independent streams: one per event-stream
//! index, one for policy randomness, one for action-selector randomness,
//! and one for initial-state draws. Streams are derived from a seed-tree
//! (`derive_seed`) so that identical `(parent_seed, role, index)` tuples
//! always reproduce the same stream, with no inter-thread coordination.

use rand::rngs::StdRng;
use rand::SeedableRng;

const ROLE_POLICY: u64 = 1;
const ROLE_SELECTOR: u64 = 2;
const ROLE_INITIAL_STATE: u64 = 3;
const ROLE_EVENT_BASE: u64 = 1_000;
const ROLE_EVAL_TAG: u64 = 7;
const ROLE_THREAD_TAG: u64 = 11;

/// SplitMix64, used purely as a seed mixer (not as the trajectory RNG
/// itself — trajectories draw from [`StdRng`]).
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Derives a child seed as a pure function of `(parent_seed, role, index)`.
///
/// Two calls with identical arguments always return the same value, so
/// sibling seeds never need to coordinate across threads to stay
/// independent of each other.
pub fn derive_seed(parent_seed: i64, role: u64, index: i64) -> u64 {
    let mut h = splitmix64(parent_seed as u64 ^ role.wrapping_mul(0x9E37_79B9_7F4A_7C15));
    h = splitmix64(h ^ (index as u64).wrapping_mul(0xD1B5_4A32_D192_ED03));
    h
}

/// The N+3 RNG streams owned by one [`crate::trajectory::Trajectory`].
#[derive(Debug, Clone)]
pub struct RngProvider {
    event_streams: Vec<StdRng>,
    policy_rng: StdRng,
    selector_rng: StdRng,
    initial_state_rng: StdRng,
}

impl RngProvider {
    /// Creates a provider with `num_event_rngs` event streams, all
    /// seeded from a fixed placeholder until [`RngProvider::seed`] is
    /// called explicitly.
    pub fn new(num_event_rngs: usize) -> Self {
        Self {
            event_streams: (0..num_event_rngs).map(|_| StdRng::seed_from_u64(0)).collect(),
            policy_rng: StdRng::seed_from_u64(0),
            selector_rng: StdRng::seed_from_u64(0),
            initial_state_rng: StdRng::seed_from_u64(0),
        }
    }

    /// Deterministically (re)seeds every owned stream from
    /// `(eval, global_seed, experiment_number, thread_number)`.
    ///
    /// When `eval` is `true`, `thread_number` is excluded from the
    /// derivation: two `Compare` runs assigning trajectory `k` to
    /// different worker threads still see the same event sequence,
    /// which is what makes paired policy comparison valid.
    pub fn seed(&mut self, eval: bool, global_seed: i64, experiment_number: i64, thread_number: u32) {
        let eval_tag = if eval { 1u64 } else { 0u64 };
        let thread_component: i64 = if eval { 0 } else { thread_number as i64 };
        let base = derive_seed(global_seed, ROLE_EVAL_TAG.wrapping_add(eval_tag), experiment_number)
            ^ derive_seed(global_seed, ROLE_THREAD_TAG, thread_component);
        let base = base as i64;

        for (index, stream) in self.event_streams.iter_mut().enumerate() {
            *stream = StdRng::seed_from_u64(derive_seed(base, ROLE_EVENT_BASE + index as u64, 0));
        }
        self.policy_rng = StdRng::seed_from_u64(derive_seed(base, ROLE_POLICY, 0));
        self.selector_rng = StdRng::seed_from_u64(derive_seed(base, ROLE_SELECTOR, 0));
        self.initial_state_rng = StdRng::seed_from_u64(derive_seed(base, ROLE_INITIAL_STATE, 0));
    }

    /// Builds a fresh provider for an action-selector sub-rollout, seeded
    /// purely from `(sample_seed, action_index, sub_rollout_index)` so
    /// that comparing two candidate actions reuses identical event
    /// sequences (common-random-numbers).
    pub fn for_sub_rollout(
        num_event_rngs: usize,
        sample_seed: i64,
        action_index: i64,
        sub_rollout_index: i64,
    ) -> Self {
        let base = derive_seed(sample_seed, action_index as u64 ^ 0x5a5a_0000, sub_rollout_index) as i64;
        let mut provider = Self::new(num_event_rngs);
        for (index, stream) in provider.event_streams.iter_mut().enumerate() {
            *stream = StdRng::seed_from_u64(derive_seed(base, ROLE_EVENT_BASE + index as u64, 0));
        }
        provider.policy_rng = StdRng::seed_from_u64(derive_seed(base, ROLE_POLICY, 0));
        provider.selector_rng = StdRng::seed_from_u64(derive_seed(base, ROLE_SELECTOR, 0));
        provider.initial_state_rng = StdRng::seed_from_u64(derive_seed(base, ROLE_INITIAL_STATE, 0));
        provider
    }

    /// The event stream for a given state-category index.
    pub fn event_stream(&mut self, index: u32) -> &mut StdRng {
        &mut self.event_streams[index as usize]
    }

    pub fn policy_rng(&mut self) -> &mut StdRng {
        &mut self.policy_rng
    }

    pub fn selector_rng(&mut self) -> &mut StdRng {
        &mut self.selector_rng
    }

    pub fn initial_state_rng(&mut self) -> &mut StdRng {
        &mut self.initial_state_rng
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn derive_seed_is_pure() {
        assert_eq!(derive_seed(42, 3, 7), derive_seed(42, 3, 7));
        assert_ne!(derive_seed(42, 3, 7), derive_seed(42, 3, 8));
        assert_ne!(derive_seed(42, 3, 7), derive_seed(42, 4, 7));
    }

    #[test]
    fn eval_mode_ignores_thread_number() {
        let mut a = RngProvider::new(2);
        a.seed(true, 13021984, 5, 0);
        let mut b = RngProvider::new(2);
        b.seed(true, 13021984, 5, 99);
        let draw_a: u64 = a.event_stream(0).gen();
        let draw_b: u64 = b.event_stream(0).gen();
        assert_eq!(draw_a, draw_b);
    }

    #[test]
    fn non_eval_mode_diversifies_by_thread() {
        let mut a = RngProvider::new(1);
        a.seed(false, 13021984, 5, 0);
        let mut b = RngProvider::new(1);
        b.seed(false, 13021984, 5, 1);
        let draw_a: u64 = a.event_stream(0).gen();
        let draw_b: u64 = b.event_stream(0).gen();
        assert_ne!(draw_a, draw_b);
    }

    #[test]
    fn same_seed_reproduces_identical_sequence() {
        let mut a = RngProvider::new(1);
        a.seed(false, 7, 1, 2);
        let mut b = RngProvider::new(1);
        b.seed(false, 7, 1, 2);
        let seq_a: Vec<u64> = (0..5).map(|_| a.event_stream(0).gen()).collect();
        let seq_b: Vec<u64> = (0..5).map(|_| b.event_stream(0).gen()).collect();
        assert_eq!(seq_a, seq_b);
    }

    #[test]
    fn sub_rollout_seeds_are_common_across_identical_args() {
        let a = RngProvider::for_sub_rollout(1, 99, 3, 0);
        let b = RngProvider::for_sub_rollout(1, 99, 3, 0);
        let mut a = a;
        let mut b = b;
        let x: u64 = a.event_stream(0).gen();
        let y: u64 = b.event_stream(0).gen();
        assert_eq!(x, y);
    }
}
