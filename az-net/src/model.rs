//! Conv tower + residual blocks + separate value/policy heads, matching the
//! reference Keras `ConvNet3x3`: one initial conv block, four residual
//! blocks, a 1x1-conv value head ending in a scalar tanh, and a 1x1-conv
//! policy head ending in a softmax over columns.

use crate::error::NetError;
use crate::Evaluator;
use az_core::GameState;
use candle_core::{DType, Device, Tensor, D};
use candle_nn::{
    batch_norm, conv2d, linear, BatchNorm, BatchNormConfig, Conv2d, Conv2dConfig, Linear, Module,
    VarBuilder, VarMap,
};

#[derive(Clone, Copy, Debug)]
pub struct NetConfig {
    pub input_channels: usize,
    pub rows: usize,
    pub columns: usize,
    pub num_actions: usize,
    pub filters: usize,
    pub residual_blocks: usize,
}

impl NetConfig {
    pub fn for_game(input_channels: usize, rows: usize, columns: usize, num_actions: usize) -> Self {
        Self {
            input_channels,
            rows,
            columns,
            num_actions,
            filters: 64,
            residual_blocks: 4,
        }
    }

    pub fn with_filters(mut self, filters: usize) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_residual_blocks(mut self, n: usize) -> Self {
        self.residual_blocks = n;
        self
    }
}

struct ConvBlock {
    conv: Conv2d,
    bn: BatchNorm,
}

impl ConvBlock {
    fn new(in_c: usize, out_c: usize, kernel: usize, vb: VarBuilder) -> candle_core::Result<Self> {
        let cfg = Conv2dConfig {
            padding: kernel / 2,
            ..Default::default()
        };
        let conv = conv2d(in_c, out_c, kernel, cfg, vb.pp("conv"))?;
        let bn = batch_norm(out_c, BatchNormConfig::default(), vb.pp("bn"))?;
        Ok(Self { conv, bn })
    }

    fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        self.bn.forward_t(&self.conv.forward(xs)?, train)?.relu()
    }
}

struct ResidualBlock {
    first: ConvBlock,
    second: ConvBlock,
}

impl ResidualBlock {
    fn new(filters: usize, vb: VarBuilder) -> candle_core::Result<Self> {
        Ok(Self {
            first: ConvBlock::new(filters, filters, 3, vb.pp("conv1"))?,
            second: ConvBlock::new(filters, filters, 3, vb.pp("conv2"))?,
        })
    }

    fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        let h = self.first.forward_t(xs, train)?;
        let h = self.second.forward_t(&h, train)?;
        xs + h
    }
}

/// The evaluator: `forward_t` returns raw `(value, policy)` tensors,
/// `predict` is the boundary that turns those into the plain-`f32`
/// `Evaluator` trait response.
pub struct ConvNet {
    cfg: NetConfig,
    device: Device,
    varmap: VarMap,
    tower: ConvBlock,
    residual: Vec<ResidualBlock>,
    value_conv: ConvBlock,
    value_fc1: Linear,
    value_fc2: Linear,
    policy_conv: ConvBlock,
    policy_fc: Linear,
}

impl ConvNet {
    pub fn new(cfg: NetConfig, device: Device) -> candle_core::Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        Self::from_varbuilder(cfg, device, varmap, vb)
    }

    fn from_varbuilder(
        cfg: NetConfig,
        device: Device,
        varmap: VarMap,
        vb: VarBuilder,
    ) -> candle_core::Result<Self> {
        let tower = ConvBlock::new(cfg.input_channels, cfg.filters, 3, vb.pp("tower"))?;
        let mut residual = Vec::with_capacity(cfg.residual_blocks);
        for i in 0..cfg.residual_blocks {
            residual.push(ResidualBlock::new(cfg.filters, vb.pp(format!("res{i}")))?);
        }

        let value_conv = ConvBlock::new(cfg.filters, 1, 1, vb.pp("value_conv"))?;
        let value_flat = cfg.rows * cfg.columns;
        let value_fc1 = linear(value_flat, 64, vb.pp("value_fc1"))?;
        let value_fc2 = linear(64, 1, vb.pp("value_fc2"))?;

        let policy_conv = ConvBlock::new(cfg.filters, 2, 1, vb.pp("policy_conv"))?;
        let policy_flat = 2 * cfg.rows * cfg.columns;
        let policy_fc = linear(policy_flat, cfg.num_actions, vb.pp("policy_fc"))?;

        Ok(Self {
            cfg,
            device,
            varmap,
            tower,
            residual,
            value_conv,
            value_fc1,
            value_fc2,
            policy_conv,
            policy_fc,
        })
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn config(&self) -> NetConfig {
        self.cfg
    }

    pub fn save(&self, path: &std::path::Path) -> candle_core::Result<()> {
        self.varmap.save(path)
    }

    pub fn load(&mut self, path: &std::path::Path) -> candle_core::Result<()> {
        self.varmap.load(path)
    }

    /// Raw forward pass. `xs` has shape `[B, input_channels, rows, columns]`.
    /// Returns `(value [B,1] in tanh range, policy [B,num_actions] softmax)`.
    pub fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<(Tensor, Tensor)> {
        let mut features = self.tower.forward_t(xs, train)?;
        for block in &self.residual {
            features = block.forward_t(&features, train)?;
        }

        let batch = features.dim(0)?;
        let v = self.value_conv.forward_t(&features, train)?;
        let v = v.reshape((batch, self.cfg.rows * self.cfg.columns))?;
        let v = self.value_fc1.forward(&v)?.relu()?;
        let v = self.value_fc2.forward(&v)?.tanh()?;

        let p = self.policy_conv.forward_t(&features, train)?;
        let p = p.reshape((batch, 2 * self.cfg.rows * self.cfg.columns))?;
        let logits = self.policy_fc.forward(&p)?;
        let policy = candle_nn::ops::softmax(&logits, D::Minus1)?;

        Ok((v, policy))
    }

    fn states_to_tensor<S: GameState>(&self, states: &[S]) -> candle_core::Result<Tensor> {
        let mut flat = Vec::with_capacity(states.len() * self.cfg.input_channels * self.cfg.rows * self.cfg.columns);
        for s in states {
            flat.extend(s.position());
        }
        Tensor::from_vec(
            flat,
            (states.len(), self.cfg.input_channels, self.cfg.rows, self.cfg.columns),
            &self.device,
        )
    }
}

impl<S: GameState> Evaluator<S> for ConvNet {
    fn predict(&self, states: &[S]) -> Result<Vec<(f32, Vec<f32>)>, NetError> {
        if states.is_empty() {
            return Ok(Vec::new());
        }
        let xs = self.states_to_tensor(states)?;
        let (value, policy) = self.forward_t(&xs, false)?;

        let values: Vec<f32> = value.squeeze(1)?.to_vec1()?;
        let policies: Vec<Vec<f32>> = policy.to_vec2()?;

        for &v in &values {
            if !v.is_finite() {
                return Err(NetError::NonFinite(v));
            }
        }
        for row in &policies {
            if row.len() != self.cfg.num_actions {
                return Err(NetError::ShapeMismatch {
                    expected: vec![self.cfg.num_actions],
                    got: vec![row.len()],
                });
            }
            if let Some(&bad) = row.iter().find(|p| !p.is_finite()) {
                return Err(NetError::NonFinite(bad));
            }
        }

        Ok(values.into_iter().zip(policies).collect())
    }
}
