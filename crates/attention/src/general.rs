//! General (Luong) attention.
//!
//! `score_l = query . (W value_l + b)`. The projection kernel carries a
//! [`MaxNorm`](layers::MaxNorm) constraint with bound `kernel_max_norm`;
//! training loops call [`Attention::apply_constraints`] after each optimizer
//! step to pull drifted rows back inside the bound. The context vector sums
//! the original values, not the projected ones.

use std::sync::OnceLock;

use candle_core::{Device, Tensor, Var};
use candle_nn::VarBuilder;
use layers::{Linear, LinearConfig, LinearInit, PrecisionPolicy};

use crate::core::{
    Attention, AttentionConfig, AttentionError, AttentionKind, AttentionOutput, ParameterDType,
};
use crate::ops;

#[derive(Debug)]
pub struct GeneralAttention {
    config: AttentionConfig,
    policy: PrecisionPolicy,
    projection: Linear,
    first_call: OnceLock<()>,
}

impl GeneralAttention {
    pub fn new(config: AttentionConfig, device: &Device) -> Result<Self, AttentionError> {
        config.validate_for(AttentionKind::General)?;
        let projection = Linear::with_init(
            Self::projection_config(&config),
            LinearInit::XavierUniform,
            device,
            config.dtype.to_dtype(),
        )?
        .with_constraint(config.kernel_constraint()?)?;
        Ok(Self::assemble(config, projection))
    }

    /// Builds the layer with `projection.weight`/`projection.bias` registered
    /// under `vb`.
    ///
    /// Parameters are stored in the builder's dtype; `config.dtype` is
    /// overwritten with it, and [`Attention::config`] reports the builder's dtype.
    pub fn from_var_builder(
        mut config: AttentionConfig,
        vb: VarBuilder,
    ) -> Result<Self, AttentionError> {
        config.dtype = ParameterDType::from_dtype(vb.dtype())?;
        config.validate_for(AttentionKind::General)?;
        let projection = Linear::from_var_builder(
            Self::projection_config(&config),
            LinearInit::XavierUniform,
            vb.pp("projection"),
        )?
        .with_constraint(config.kernel_constraint()?)?;
        Ok(Self::assemble(config, projection))
    }

    fn projection_config(config: &AttentionConfig) -> LinearConfig {
        LinearConfig::new(config.hidden_size, config.units).with_bias(config.bias)
    }

    fn assemble(config: AttentionConfig, projection: Linear) -> Self {
        Self {
            policy: config.policy(),
            config,
            projection,
            first_call: OnceLock::new(),
        }
    }

    /// The constrained value projection.
    pub fn projection(&self) -> &Linear {
        &self.projection
    }
}

impl Attention for GeneralAttention {
    fn kind(&self) -> AttentionKind {
        AttentionKind::General
    }

    fn config(&self) -> &AttentionConfig {
        &self.config
    }

    fn compute(&self, query: &Tensor, value: &Tensor) -> Result<AttentionOutput, AttentionError> {
        ops::validate_inputs(query, value, self.config.hidden_size)?;
        ops::log_first_call(&self.first_call, self.kind(), &self.config, &self.policy);

        let query_t = self.policy.cast_for_compute(&ops::expand_query(query)?)?;
        let projected = self.projection.forward_compute(value, &self.policy)?;
        let scores = ops::dot_scores(&query_t, &projected)?;
        let weights = ops::sequence_softmax(&scores, &self.policy)?;
        let context = ops::weighted_sum(&weights, value, &self.policy)?;
        ops::finish(&context, &weights, query)
    }

    fn parameters(&self) -> Vec<Var> {
        self.projection.vars()
    }

    fn apply_constraints(&self) -> Result<(), AttentionError> {
        self.projection.apply_constraints()?;
        Ok(())
    }
}
