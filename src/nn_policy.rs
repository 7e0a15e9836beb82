//! Inference-time bridge from a trained scoring function to a [`Policy`].
//!
//! Batches one state's features, invokes a pre-trained
//! [`ScoringFunction`], masks disallowed actions, and returns the
//! arg-max (or a top-k ranking for promising-action pruning). Grounded
//! on the teacher's `network.rs` forward-pass conventions; the optional
//! `tch`-backed implementation is gated behind the `nn` feature, same
//! as the teacher's `rl-nn` feature.

use std::sync::Arc;

use rand::rngs::StdRng;

#[cfg(feature = "nn")]
use crate::error::Result;
use crate::mdp::{InnerPolicy, Mdp};

/// The shape a [`ScoringFunction`] expects its input in. Mirrors the
/// reference implementation's `NetworkForwardType` enum
/// (`Tensor`/`TensorDict`/`TensorDictMask`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkInputShape {
    /// A single flat feature vector.
    FlatVector,
    /// A feature vector plus an explicit action mask passed alongside it.
    FlatVectorWithMask,
}

/// A trained, stateless function from state features to per-action
/// scores. Implemented by whatever external trainer the DCL Loop was
/// configured with; this crate only consumes it at inference time.
pub trait ScoringFunction: Send + Sync {
    fn input_shape(&self) -> NetworkInputShape;

    /// One score per valid action index, given one state's flat
    /// features (and, if `input_shape()` is `FlatVectorWithMask`, the
    /// allowed-action mask).
    fn score(&self, features: &[f32], mask: Option<&[bool]>) -> Vec<f64>;
}

/// Wraps a [`ScoringFunction`] as an [`InnerPolicy`]: scores every
/// allowed action and picks the arg-max.
pub struct NNPolicy<M: Mdp> {
    mdp: Arc<M>,
    scoring_fn: Arc<dyn ScoringFunction>,
}

impl<M: Mdp> NNPolicy<M> {
    pub fn new(mdp: Arc<M>, scoring_fn: Arc<dyn ScoringFunction>) -> Self {
        Self { mdp, scoring_fn }
    }

    fn scored_allowed_actions(&self, state: &M::State) -> (Vec<i64>, Vec<f64>) {
        let features = self.mdp.get_features(state);
        let allowed = self.mdp.allowed_actions(state);
        let scores = match self.scoring_fn.input_shape() {
            NetworkInputShape::FlatVector => self.scoring_fn.score(&features, None),
            NetworkInputShape::FlatVectorWithMask => {
                let num_actions = self.mdp.static_info().num_valid_actions as usize;
                let mut mask = vec![false; num_actions];
                for &a in &allowed {
                    mask[a as usize] = true;
                }
                self.scoring_fn.score(&features, Some(&mask))
            }
        };
        (allowed, scores)
    }
}

impl<M: Mdp> InnerPolicy<M> for NNPolicy<M> {
    fn get_action(&self, state: &M::State, _rng: &mut StdRng) -> i64 {
        let (allowed, scores) = self.scored_allowed_actions(state);
        allowed
            .into_iter()
            .max_by(|a, b| scores[*a as usize].partial_cmp(&scores[*b as usize]).expect("scores must never be NaN"))
            .expect("NNPolicy: state has no allowed actions")
    }

    fn get_promising_actions(&self, state: &M::State, k: usize) -> Option<Vec<i64>> {
        let (mut allowed, scores) = self.scored_allowed_actions(state);
        allowed.sort_by(|a, b| scores[*b as usize].partial_cmp(&scores[*a as usize]).expect("scores must never be NaN"));
        allowed.truncate(k);
        Some(allowed)
    }
}

/// `tch`-backed [`ScoringFunction`], gated behind the `nn` feature.
/// Forwards a single state's features through a loaded `tch::CModule`
/// and reads back a `[num_valid_actions]` score tensor.
#[cfg(feature = "nn")]
pub struct TchScoringFunction {
    module: tch::CModule,
    input_shape: NetworkInputShape,
}

#[cfg(feature = "nn")]
impl TchScoringFunction {
    pub fn load(path: &std::path::Path, input_shape: NetworkInputShape) -> Result<Self> {
        let module = tch::CModule::load(path)
            .map_err(|e| crate::error::DclError::resource("TchScoringFunction", e.to_string()).logged())?;
        Ok(Self { module, input_shape })
    }
}

#[cfg(feature = "nn")]
impl ScoringFunction for TchScoringFunction {
    fn input_shape(&self) -> NetworkInputShape {
        self.input_shape
    }

    fn score(&self, features: &[f32], _mask: Option<&[bool]>) -> Vec<f64> {
        let input = tch::Tensor::from_slice(features).unsqueeze(0);
        let output = self.module.forward_ts(&[input]).expect("scoring forward pass failed");
        Vec::<f64>::try_from(output.squeeze()).expect("scoring output must be a 1-D tensor")
    }
}
