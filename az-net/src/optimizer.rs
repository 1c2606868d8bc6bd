//! The Optimizer capability: AdamW over the evaluator's `VarMap`, with a
//! mutable learning rate for the coordinator's piecewise-constant schedule.
//!
//! Weight decay is applied the AdamW way (decoupled from the gradient),
//! rather than folded into the loss as an explicit `+ weight_decay *
//! sum(theta^2)` term — see DESIGN.md for why this still satisfies
//! "weight-decay regularized" training.

use crate::error::NetError;
use crate::model::ConvNet;
use candle_core::{Tensor, D};
use candle_nn::{AdamW, Optimizer as CandleOptimizer, ParamsAdamW};

pub struct Optimizer {
    adamw: AdamW,
}

impl Optimizer {
    pub fn new(net: &ConvNet, learning_rate: f64, weight_decay: f64) -> Result<Self, NetError> {
        let params = ParamsAdamW {
            lr: learning_rate,
            weight_decay,
            ..Default::default()
        };
        let adamw = AdamW::new(net.varmap().all_vars(), params)?;
        Ok(Self { adamw })
    }

    pub fn set_learning_rate(&mut self, lr: f64) {
        self.adamw.set_learning_rate(lr);
    }

    pub fn step(&mut self, loss: &Tensor) -> Result<(), NetError> {
        self.adamw.backward_step(loss)?;
        Ok(())
    }
}

/// `L = mean((v_hat - y_v)^2) + mean(soft_cross_entropy(p_hat, y_pi))`.
/// `y_pi` is a full distribution (the improved policy), not a class index,
/// so we can't use candle's logits-based `cross_entropy` — it assumes a
/// single correct class per row.
pub fn loss(value_pred: &Tensor, value_target: &Tensor, policy_pred: &Tensor, policy_target: &Tensor) -> candle_core::Result<Tensor> {
    let value_loss = value_pred
        .squeeze(1)?
        .sub(value_target)?
        .sqr()?
        .mean_all()?;

    let eps = 1e-8;
    let log_policy = (policy_pred + eps)?.log()?;
    let cross_entropy = (policy_target * log_policy)?
        .sum(D::Minus1)?
        .neg()?
        .mean_all()?;

    value_loss + cross_entropy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NetConfig;
    use candle_core::Device;

    #[test]
    fn loss_is_zero_for_a_perfect_prediction() {
        let device = Device::Cpu;
        let value_pred = Tensor::from_slice(&[0.5f32], (1, 1), &device).unwrap();
        let value_target = Tensor::from_slice(&[0.5f32], (1,), &device).unwrap();
        let policy_pred = Tensor::from_slice(&[1.0f32, 0.0], (1, 2), &device).unwrap();
        let policy_target = Tensor::from_slice(&[1.0f32, 0.0], (1, 2), &device).unwrap();

        let l = loss(&value_pred, &value_target, &policy_pred, &policy_target)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        assert!(l.abs() < 1e-3);
    }

    #[test]
    fn optimizer_accepts_a_config() {
        let device = Device::Cpu;
        let cfg = NetConfig::for_game(2, 6, 7, 7);
        let net = ConvNet::new(cfg, device).unwrap();
        let opt = Optimizer::new(&net, 1e-3, 1e-4);
        assert!(opt.is_ok());
    }
}
