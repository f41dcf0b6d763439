//! Core traits and types shared across attention mechanisms.
//!
//! Every mechanism consumes a query shaped `[batch, hidden]` and a value
//! sequence shaped `[batch, seq_len, hidden]`, and produces
//!
//! * a context vector `[batch, hidden]`, the attention-weighted sum of values,
//! * attention weights `[batch, seq_len, 1]`, non-negative and summing to one
//!   along `seq_len`.
//!
//! Outputs are returned in the query's dtype. Internally the mechanisms follow
//! the [`PrecisionPolicy`](layers::PrecisionPolicy) derived from their config.

pub mod config;
pub mod errors;

use std::{fmt, str::FromStr};

use candle_core::{Tensor, Var};
use serde::{Deserialize, Serialize};

pub use config::{AttentionConfig, ParameterDType, DEFAULT_KERNEL_MAX_NORM};
pub use errors::AttentionError;

/// Identifies which scoring function a mechanism implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttentionKind {
    /// Bahdanau: `v^T tanh(W_1 value + W_2 query)`.
    #[serde(alias = "bahdanau")]
    Additive,
    /// Vaswani: `query . value / sqrt(H)`.
    #[serde(alias = "vaswani")]
    ScaledDotProduct,
    /// Luong: `query . (W value)` with a max-norm bounded `W`.
    #[serde(alias = "luong")]
    General,
}

impl AttentionKind {
    pub const ALL: [AttentionKind; 3] = [
        AttentionKind::Additive,
        AttentionKind::ScaledDotProduct,
        AttentionKind::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AttentionKind::Additive => "additive",
            AttentionKind::ScaledDotProduct => "scaled_dot_product",
            AttentionKind::General => "general",
        }
    }
}

impl fmt::Display for AttentionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttentionKind {
    type Err = AttentionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "additive" | "bahdanau" => Ok(AttentionKind::Additive),
            "scaled_dot_product" | "scaled-dot-product" | "vaswani" => {
                Ok(AttentionKind::ScaledDotProduct)
            }
            "general" | "luong" => Ok(AttentionKind::General),
            other => Err(AttentionError::ConfigFormat(format!(
                "unknown attention kind '{other}'"
            ))),
        }
    }
}

/// Result of a single attention computation.
#[derive(Debug, Clone)]
pub struct AttentionOutput {
    /// `[batch, hidden]` weighted summary of the value sequence.
    pub context: Tensor,
    /// `[batch, seq_len, 1]` distribution over value positions.
    pub weights: Tensor,
}

impl AttentionOutput {
    pub fn into_parts(self) -> (Tensor, Tensor) {
        (self.context, self.weights)
    }
}

/// Unified interface for the attention mechanisms.
pub trait Attention: Send + Sync + fmt::Debug {
    /// Which scoring function this mechanism implements.
    fn kind(&self) -> AttentionKind;

    /// The configuration the mechanism was built from.
    fn config(&self) -> &AttentionConfig;

    /// Scores every value position against the query and summarises the
    /// values with the resulting weights. Parameters are only read.
    fn compute(&self, query: &Tensor, value: &Tensor) -> Result<AttentionOutput, AttentionError>;

    /// Trainable parameters, for handing to an optimizer.
    fn parameters(&self) -> Vec<Var> {
        Vec::new()
    }

    /// Re-enforces parameter constraints; call after every optimizer step.
    fn apply_constraints(&self) -> Result<(), AttentionError> {
        Ok(())
    }
}
