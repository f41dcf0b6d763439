//! Scaled dot-product (Vaswani) attention without learned parameters.

use std::sync::OnceLock;

use candle_core::Tensor;
use layers::PrecisionPolicy;

use crate::core::{Attention, AttentionConfig, AttentionError, AttentionKind, AttentionOutput};
use crate::ops;

/// `score_l = (query . value_l) / sqrt(H)`.
///
/// The divisor keeps score magnitudes independent of the feature dimension;
/// without it softmax saturates towards one-hot as `H` grows.
#[derive(Debug)]
pub struct ScaledDotProductAttention {
    config: AttentionConfig,
    policy: PrecisionPolicy,
    /// `1 / sqrt(units)`, fixed at construction.
    scale: f64,
    first_call: OnceLock<()>,
}

impl ScaledDotProductAttention {
    /// There are no learned parameters, so `bias` and `kernel_max_norm` are
    /// ignored; only `hidden_size`, `units` and `dtype` are read.
    pub fn new(config: AttentionConfig) -> Result<Self, AttentionError> {
        config.validate_for(AttentionKind::ScaledDotProduct)?;
        Ok(Self {
            scale: 1.0 / (config.units as f64).sqrt(),
            policy: config.policy(),
            config,
            first_call: OnceLock::new(),
        })
    }

    /// Convenience constructor for a given feature dimension.
    pub fn with_units(units: usize) -> Result<Self, AttentionError> {
        Self::new(AttentionConfig::square(units))
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }
}

impl Attention for ScaledDotProductAttention {
    fn kind(&self) -> AttentionKind {
        AttentionKind::ScaledDotProduct
    }

    fn config(&self) -> &AttentionConfig {
        &self.config
    }

    fn compute(&self, query: &Tensor, value: &Tensor) -> Result<AttentionOutput, AttentionError> {
        ops::validate_inputs(query, value, self.config.hidden_size)?;
        ops::log_first_call(&self.first_call, self.kind(), &self.config, &self.policy);

        let query_t = self.policy.cast_for_compute(&ops::expand_query(query)?)?;
        let keys = self.policy.cast_for_compute(value)?;
        let scores = ops::dot_scores(&query_t, &keys)?.affine(self.scale, 0.0)?;
        let weights = ops::sequence_softmax(&scores, &self.policy)?;
        let context = ops::weighted_sum(&weights, value, &self.policy)?;
        ops::finish(&context, &weights, query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{Device, Result};

    #[test]
    fn scale_is_inverse_sqrt_of_units() {
        let attention = ScaledDotProductAttention::with_units(16).unwrap();
        assert!((attention.scale() - 0.25).abs() < 1e-12);
        assert!(attention.parameters().is_empty());
    }

    #[test]
    fn weights_match_manual_softmax() -> Result<()> {
        let device = Device::Cpu;
        let attention = ScaledDotProductAttention::with_units(4).unwrap();
        let query = Tensor::from_vec(vec![1f32, 1.0, 0.0, 0.0], (1, 4), &device)?;
        let value = Tensor::from_vec(
            vec![
                1f32, 0.0, 0.0, 0.0, //
                1.0, 1.0, 0.0, 0.0, //
                0.0, 0.0, 3.0, 3.0,
            ],
            (1, 3, 4),
            &device,
        )?;
        let output = attention.compute(&query, &value).unwrap();
        let weights = output.weights.flatten_all()?.to_vec1::<f32>()?;

        // Dot products 1, 2, 0 scaled by 1/2.
        let logits = [0.5f32, 1.0, 0.0];
        let denom: f32 = logits.iter().map(|l| l.exp()).sum();
        for (w, l) in weights.iter().zip(logits.iter()) {
            assert!((w - l.exp() / denom).abs() < 1e-6);
        }

        let context = output.context.flatten_all()?.to_vec1::<f32>()?;
        let expected_first = weights[0] + weights[1];
        assert!((context[0] - expected_first).abs() < 1e-6);
        assert!((context[2] - 3.0 * weights[2]).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn projection_fields_are_ignored() {
        let config = AttentionConfig::square(4)
            .with_bias(false)
            .with_kernel_max_norm(-1.0);
        let attention = ScaledDotProductAttention::new(config).unwrap();
        assert!(attention.parameters().is_empty());
        assert!(attention.apply_constraints().is_ok());
    }

    #[test]
    fn rejects_non_square_config() {
        assert!(ScaledDotProductAttention::new(AttentionConfig::new(8, 4)).is_err());
    }
}
