//! A small lost-sales inventory MDP, grounded line-for-line on the
//! reference `lostsalesmdp.h`/`.cpp`: lead-time `leadtime` periods, a
//! per-unit holding cost `h`, a per-unit lost-sales penalty `p`, and
//! Poisson-distributed demand. Test-only: exercises the engine
//! end-to-end, not part of the public API surface.

use std::collections::VecDeque;

use dclengine::mdp::{Horizon, InnerPolicy, StaticInfo};
use dclengine::mdp::state::StateCategory;
use dclengine::Mdp;
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Poisson};

#[derive(Debug, Clone)]
pub struct LostSalesState {
    /// `leadtime` entries at `AwaitAction` (the decision state `get_features`
    /// is read from), `leadtime + 1` at `AwaitEvent` between an order being
    /// placed and the next event consuming one: pipeline + on-hand
    /// inventory, oldest (on-hand) order at the front.
    queue: VecDeque<i64>,
    total_inv: i64,
    category: StateCategory,
}

pub struct LostSalesMdp {
    p: f64,
    h: f64,
    leadtime: i64,
    mean_demand: f64,
    max_order_size: i64,
    max_system_inv: i64,
}

impl LostSalesMdp {
    /// `max_order_size`/`max_system_inv` are the reference's
    /// critical-fractile fractiles of the demand (and lead-time demand)
    /// distribution at `p / (p + h)`; for a test fixture we size them
    /// generously instead of computing the exact fractile, which needs
    /// no counterpart here since this MDP never claims exact optimality.
    pub fn new(p: f64, h: f64, leadtime: i64, mean_demand: f64, max_order_size: i64, max_system_inv: i64) -> Self {
        Self { p, h, leadtime, mean_demand, max_order_size, max_system_inv }
    }
}

impl Mdp for LostSalesMdp {
    type State = LostSalesState;
    type Event = i64;

    fn static_info(&self) -> StaticInfo {
        StaticInfo {
            num_valid_actions: self.max_order_size + 1,
            num_features: self.leadtime,
            discount_factor: 1.0,
            horizon: Horizon::Infinite,
        }
    }

    fn get_initial_state(&self, _rng: &mut StdRng) -> Self::State {
        let mut queue = VecDeque::with_capacity((self.leadtime + 1) as usize);
        queue.push_back(self.max_system_inv);
        for _ in 0..self.leadtime {
            queue.push_back(0);
        }
        let total_inv = queue.iter().sum();
        LostSalesState { queue, total_inv, category: StateCategory::AwaitEvent { index: 0 } }
    }

    fn modify_state_with_action(&self, state: &mut Self::State, action: i64) -> f64 {
        state.queue.push_back(action);
        state.total_inv += action;
        state.category = StateCategory::AwaitEvent { index: 0 };
        0.0
    }

    fn get_event(&self, _state: &Self::State, rng: &mut StdRng) -> Self::Event {
        let demand: f64 = Poisson::new(self.mean_demand).expect("mean_demand must be positive").sample(rng);
        demand as i64
    }

    fn modify_state_with_event(&self, state: &mut Self::State, event: &Self::Event) -> f64 {
        state.category = StateCategory::AwaitAction;
        let mut on_hand = state.queue.pop_front().expect("queue must never be empty between an action and the next event");
        let demand = *event;
        let reward = if on_hand > demand {
            on_hand -= demand;
            state.total_inv -= demand;
            if let Some(front) = state.queue.front_mut() {
                *front += on_hand;
            } else {
                state.queue.push_front(on_hand);
            }
            on_hand as f64 * self.h
        } else {
            state.total_inv -= on_hand;
            (demand - on_hand) as f64 * self.p
        };
        -reward
    }

    fn allowed_actions(&self, state: &Self::State) -> Vec<i64> {
        (0..=self.max_order_size).filter(|&action| state.total_inv + action <= self.max_system_inv).collect()
    }

    fn get_features(&self, state: &Self::State) -> Vec<f32> {
        state.queue.iter().map(|&x| x as f32).collect()
    }

    fn get_state_category(&self, state: &Self::State) -> StateCategory {
        state.category
    }

    fn type_identifier(&self) -> &str {
        "lost_sales"
    }
}

/// Orders up to a fixed base-stock level each period, capped at
/// `max_order_size` when `capped` is set. Grounded on the reference
/// `policies.cpp`'s `BaseStockPolicy::GetAction`.
pub struct BaseStockPolicy {
    base_stock_level: i64,
    max_order_size: i64,
    capped: bool,
}

impl BaseStockPolicy {
    pub fn new(base_stock_level: i64, max_order_size: i64, capped: bool) -> Self {
        Self { base_stock_level, max_order_size, capped }
    }
}

impl InnerPolicy<LostSalesMdp> for BaseStockPolicy {
    fn get_action(&self, state: &LostSalesState, _rng: &mut StdRng) -> i64 {
        if self.base_stock_level > state.total_inv {
            let mut action = self.base_stock_level - state.total_inv;
            if action > self.max_order_size && self.capped {
                action = self.max_order_size;
            }
            action
        } else {
            0
        }
    }
}

/// Orders 0 or 1 unit each period regardless of state — a deliberately
/// weak baseline (well below mean demand) so comparisons against a
/// properly sized `BaseStockPolicy` have an unambiguous winner.
pub struct RandomOrderPolicy;

impl InnerPolicy<LostSalesMdp> for RandomOrderPolicy {
    fn get_action(&self, _state: &LostSalesState, rng: &mut StdRng) -> i64 {
        rng.gen_range(0..=1)
    }
}
