//! Invariant 6: the exact solver's optimal cost must agree with the
//! Policy Comparer's own evaluation of the solver's extracted policy,
//! within the comparer's standard error (times a small safety factor
//! for the comparer's necessarily finite rollout horizon).

mod common;

use std::sync::Arc;

use common::reference_mdp::ReferenceMdp;
use dclengine::comparer::{ComparerConfig, PolicyComparer};
use dclengine::exact_solver::{ExactSolver, ExactSolverConfig};
use dclengine::mdp::PolicyAdapter;
use dclengine::{MdpAdapter, Policy};

#[test]
fn exact_solver_optimal_gain_matches_comparer_evaluation_of_its_own_policy() {
    let adapter = Arc::new(MdpAdapter::new(ReferenceMdp::new(3, false)));
    let mdp = adapter.mdp().clone();

    let solver = ExactSolver::new(mdp.clone(), ExactSolverConfig::default());
    let (solution, exact_policy) = solver.solve().unwrap();

    let policy: Arc<dyn Policy> = Arc::new(PolicyAdapter::new(mdp, exact_policy, adapter.mdp_hash(), "exact"));
    let comparer = PolicyComparer::new(adapter);
    // discount_factor = 0.9, so 200 periods makes the truncated tail
    // (bounded by 0.9^200 of the per-period reward range) negligible
    // next to the comparer's standard error.
    let config = ComparerConfig { number_of_trajectories: 2000, periods_per_trajectory: 200, num_workers: Some(4), ..ComparerConfig::default() };
    let record = comparer.assess("exact", policy, &config).unwrap();

    let tolerance = 3.0 * record.standard_error + 1e-6;
    assert!(
        (solution.optimal_gain - record.mean).abs() <= tolerance,
        "exact solver gain {} vs comparer mean {} (se {}, tolerance {})",
        solution.optimal_gain,
        record.mean,
        record.standard_error,
        tolerance,
    );
}
