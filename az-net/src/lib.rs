//! az-net - the Evaluator/Optimizer capability: a small convolutional
//! value/policy network on [`candle_core`], trained with [`candle_nn`]'s
//! AdamW.

pub mod error;
pub mod model;
pub mod optimizer;

pub use error::NetError;
pub use model::{ConvNet, NetConfig};
pub use optimizer::Optimizer;

use az_core::GameState;

/// The Evaluator capability (C2): a batched mapping from game states to
/// `(value, policy-over-legal-moves)`. Masking illegal-move priors and
/// renormalizing is the *caller's* job (the coordinator), per the wire
/// protocol — `predict` returns the raw per-action distribution over all
/// `M` actions, legal or not.
pub trait Evaluator<S: GameState> {
    fn predict(&self, states: &[S]) -> Result<Vec<(f32, Vec<f32>)>, NetError>;
}
