//! A small, bounded MDP used only to exercise the engine's core
//! invariants directly (not a production plug-in). Value is clamped to
//! `[-cap, cap]` so the reachable state space stays small enough for
//! the exact solver, and `get_all_event_transitions` is implemented so
//! the same fixture doubles as an exact-solver cross-check target.

use dclengine::mdp::{ConfigCodec, Horizon, StateCategory, StateConfig, StaticInfo};
use dclengine::Mdp;
use rand::rngs::StdRng;
use rand::Rng;

#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceState {
    pub value: i64,
    pub last_event: i64,
    pub category: StateCategory,
}

/// `single_action` restricts `allowed_actions` to one fixed action, for
/// the action-selector invariant that only applies when `|A| = 1`.
pub struct ReferenceMdp {
    cap: i64,
    single_action: bool,
}

impl ReferenceMdp {
    pub fn new(cap: i64, single_action: bool) -> Self {
        Self { cap, single_action }
    }
}

impl Mdp for ReferenceMdp {
    type State = ReferenceState;
    type Event = i64;

    fn static_info(&self) -> StaticInfo {
        StaticInfo { num_valid_actions: 3, num_features: 2, discount_factor: 0.9, horizon: Horizon::Infinite }
    }

    fn get_initial_state(&self, _rng: &mut StdRng) -> Self::State {
        ReferenceState { value: 0, last_event: 0, category: StateCategory::AwaitAction }
    }

    fn modify_state_with_action(&self, state: &mut Self::State, action: i64) -> f64 {
        let delta = action - 1;
        state.value = (state.value + delta).clamp(-self.cap, self.cap);
        state.category = StateCategory::AwaitEvent { index: 0 };
        -(state.value.abs() as f64)
    }

    fn get_event(&self, _state: &Self::State, rng: &mut StdRng) -> Self::Event {
        rng.gen_range(0..3) - 1
    }

    fn modify_state_with_event(&self, state: &mut Self::State, event: &Self::Event) -> f64 {
        state.last_event = *event;
        state.value = (state.value + event).clamp(-self.cap, self.cap);
        state.category = StateCategory::AwaitAction;
        0.0
    }

    fn get_all_event_transitions(&self, state: &Self::State) -> Option<(f64, Vec<(f64, Self::State)>)> {
        let branches = (-1i64..=1)
            .map(|delta| {
                let mut next = state.clone();
                next.last_event = delta;
                next.value = (state.value + delta).clamp(-self.cap, self.cap);
                next.category = StateCategory::AwaitAction;
                (1.0 / 3.0, next)
            })
            .collect();
        Some((0.0, branches))
    }

    fn allowed_actions(&self, _state: &Self::State) -> Vec<i64> {
        if self.single_action {
            vec![1]
        } else {
            vec![0, 1, 2]
        }
    }

    fn get_features(&self, state: &Self::State) -> Vec<f32> {
        vec![state.value as f32, state.last_event as f32]
    }

    fn get_state_category(&self, state: &Self::State) -> StateCategory {
        state.category
    }

    fn type_identifier(&self) -> &str {
        "reference"
    }
}

impl ConfigCodec for ReferenceState {
    fn to_config(&self) -> StateConfig {
        let mut cfg = StateConfig::new("reference");
        cfg.ints.push(self.value);
        cfg.ints.push(self.last_event);
        cfg.ints.push(match self.category {
            StateCategory::AwaitAction => 0,
            StateCategory::AwaitEvent { index } => 1_000 + index as i64,
            StateCategory::Final => -1,
        });
        cfg
    }

    fn from_config(cfg: &StateConfig) -> Self {
        let category = match cfg.ints[2] {
            -1 => StateCategory::Final,
            0 => StateCategory::AwaitAction,
            tag => StateCategory::AwaitEvent { index: (tag - 1_000) as u32 },
        };
        ReferenceState { value: cfg.ints[0], last_event: cfg.ints[1], category }
    }
}
