//! The unit of training data the Sample Generator produces and a
//! Trainer consumes.

/// One state's feature vector together with per-action quality
/// estimates from rollouts.
///
/// `action_scores[a]` is `f64::NEG_INFINITY` for actions the action
/// selector pruned rather than rolled out, so a Trainer can tell
/// "scored low" apart from "never evaluated".
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sample {
    pub features: Vec<f32>,
    pub action_scores: Vec<f64>,
    pub chosen_action: i64,
    /// The subset of actions the selector actually simulated, if it
    /// pruned any. `None` when every allowed action was rolled out.
    pub promising_mask: Option<Vec<bool>>,
    /// Position this sample was emitted at, assigned by the Sample
    /// Generator. Downstream code may preserve this order or shuffle.
    pub sample_index: i64,
}

impl Sample {
    pub fn new(features: Vec<f32>, num_actions: usize) -> Self {
        Self {
            features,
            action_scores: vec![f64::NEG_INFINITY; num_actions],
            chosen_action: 0,
            promising_mask: None,
            sample_index: 0,
        }
    }

    /// The best-scoring action among those actually evaluated.
    pub fn arg_max_action(&self) -> Option<i64> {
        self.action_scores
            .iter()
            .enumerate()
            .filter(|(_, &score)| score.is_finite())
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).expect("action scores must never be NaN"))
            .map(|(action, _)| action as i64)
    }
}
