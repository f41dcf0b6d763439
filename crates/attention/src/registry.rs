//! Construction of mechanisms by [`AttentionKind`].

use candle_core::Device;
use candle_nn::VarBuilder;

use crate::core::{Attention, AttentionConfig, AttentionError, AttentionKind};
use crate::{AdditiveAttention, GeneralAttention, ScaledDotProductAttention};

/// Builds a mechanism with freshly initialised parameters on `device`.
pub fn build(
    kind: AttentionKind,
    config: AttentionConfig,
    device: &Device,
) -> Result<Box<dyn Attention>, AttentionError> {
    Ok(match kind {
        AttentionKind::Additive => Box::new(AdditiveAttention::new(config, device)?),
        AttentionKind::ScaledDotProduct => Box::new(ScaledDotProductAttention::new(config)?),
        AttentionKind::General => Box::new(GeneralAttention::new(config, device)?),
    })
}

/// Builds a mechanism whose parameters live in the builder's backing store,
/// e.g. a `VarMap` that is later saved to safetensors.
pub fn build_from_var_builder(
    kind: AttentionKind,
    config: AttentionConfig,
    vb: VarBuilder,
) -> Result<Box<dyn Attention>, AttentionError> {
    Ok(match kind {
        AttentionKind::Additive => Box::new(AdditiveAttention::from_var_builder(config, vb)?),
        AttentionKind::ScaledDotProduct => Box::new(ScaledDotProductAttention::new(config)?),
        AttentionKind::General => Box::new(GeneralAttention::from_var_builder(config, vb)?),
    })
}
