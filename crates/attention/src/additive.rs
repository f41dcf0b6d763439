//! Additive (Bahdanau) attention.
//!
//! `score_l = v^T tanh(W_value value_l + W_query query) + b_v`. Query and value
//! are projected into a shared `units`-wide space, so this is the only
//! mechanism where `units` may differ from the hidden size.

use std::sync::OnceLock;

use candle_core::{Device, Tensor, Var};
use candle_nn::VarBuilder;
use layers::{Linear, LinearConfig, LinearInit, PrecisionPolicy};

use crate::core::{Attention, AttentionConfig, AttentionError, AttentionKind, AttentionOutput};
use crate::ops;

#[derive(Debug)]
pub struct AdditiveAttention {
    config: AttentionConfig,
    policy: PrecisionPolicy,
    /// `H -> U`, applied to every value position.
    w_value: Linear,
    /// `H -> U`, applied to the query.
    w_query: Linear,
    /// `U -> 1`, collapses each position to a scalar score.
    score: Linear,
    first_call: OnceLock<()>,
}

impl AdditiveAttention {
    /// Builds the layer with Glorot-uniform kernels and zero biases.
    pub fn new(config: AttentionConfig, device: &Device) -> Result<Self, AttentionError> {
        config.validate_for(AttentionKind::Additive)?;
        let dtype = config.dtype.to_dtype();
        let (input, proj) = Self::projection_configs(&config);
        let build = |cfg: LinearConfig| Linear::with_init(cfg, LinearInit::XavierUniform, device, dtype);
        Ok(Self {
            w_value: build(input.clone())?,
            w_query: build(input)?,
            score: build(proj)?,
            policy: config.policy(),
            config,
            first_call: OnceLock::new(),
        })
    }

    /// Builds the layer with parameters registered under `vb`
    /// (`w_value.*`, `w_query.*`, `score.*`).
    ///
    /// Parameters are stored in the builder's dtype; `config.dtype` is
    /// overwritten with it, and [`Attention::config`] reports the builder's dtype.
    pub fn from_var_builder(
        mut config: AttentionConfig,
        vb: VarBuilder,
    ) -> Result<Self, AttentionError> {
        config.dtype = crate::core::ParameterDType::from_dtype(vb.dtype())?;
        config.validate_for(AttentionKind::Additive)?;
        let (input, proj) = Self::projection_configs(&config);
        let init = LinearInit::XavierUniform;
        Ok(Self {
            w_value: Linear::from_var_builder(input.clone(), init, vb.pp("w_value"))?,
            w_query: Linear::from_var_builder(input, init, vb.pp("w_query"))?,
            score: Linear::from_var_builder(proj, init, vb.pp("score"))?,
            policy: config.policy(),
            config,
            first_call: OnceLock::new(),
        })
    }

    fn projection_configs(config: &AttentionConfig) -> (LinearConfig, LinearConfig) {
        (
            LinearConfig::new(config.hidden_size, config.units).with_bias(config.bias),
            LinearConfig::new(config.units, 1).with_bias(config.bias),
        )
    }

    pub fn value_projection(&self) -> &Linear {
        &self.w_value
    }

    pub fn query_projection(&self) -> &Linear {
        &self.w_query
    }

    pub fn score_projection(&self) -> &Linear {
        &self.score
    }
}

impl Attention for AdditiveAttention {
    fn kind(&self) -> AttentionKind {
        AttentionKind::Additive
    }

    fn config(&self) -> &AttentionConfig {
        &self.config
    }

    fn compute(&self, query: &Tensor, value: &Tensor) -> Result<AttentionOutput, AttentionError> {
        let dims = ops::validate_inputs(query, value, self.config.hidden_size)?;
        ops::log_first_call(&self.first_call, self.kind(), &self.config, &self.policy);

        let query_t = ops::expand_query(query)?;
        let keys = self.w_value.forward_compute(value, &self.policy)?;
        let hidden = self.w_query.forward_compute(&query_t, &self.policy)?;
        let features = keys.broadcast_add(&hidden)?.tanh()?;

        // [B, L, 1] and [B, 1, L] share a memory order.
        let scores = self
            .score
            .forward_compute(&features, &self.policy)?
            .reshape((dims.batch, 1, dims.seq_len))?;
        let weights = ops::sequence_softmax(&scores, &self.policy)?;
        let context = ops::weighted_sum(&weights, value, &self.policy)?;
        ops::finish(&context, &weights, query)
    }

    fn parameters(&self) -> Vec<Var> {
        [&self.w_value, &self.w_query, &self.score]
            .into_iter()
            .flat_map(Linear::vars)
            .collect()
    }
}
