//! Shape handling shared by the mechanisms.
//!
//! Broadcasting is spelled out here instead of being left to the tensor
//! library's implicit rules:
//!
//! | step             | lhs            | rhs            | result         |
//! |------------------|----------------|----------------|----------------|
//! | `expand_query`   | `[B, H]`       |                | `[B, 1, H]`    |
//! | additive sum     | `[B, L, U]`    | `[B, 1, U]`    | `[B, L, U]`    |
//! | `dot_scores`     | `[B, 1, H]`    | `[B, L, H]`    | `[B, 1, L]`    |
//! | `sequence_softmax` | `[B, 1, L]`  |                | `[B, L, 1]`    |
//! | `weighted_sum`   | `[B, L, 1]`    | `[B, L, H]`    | `[B, H]`       |

use std::sync::OnceLock;

use candle_core::{Tensor, D};
use candle_nn::ops::softmax;
use layers::{checks::FLOAT_DTYPES, PrecisionPolicy};

use crate::core::{AttentionConfig, AttentionError, AttentionKind, AttentionOutput};

/// Sizes extracted from a validated `(query, value)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputDims {
    pub batch: usize,
    pub seq_len: usize,
    pub hidden: usize,
}

/// Checks the `[B, H]` / `[B, L, H]` contract against the expected hidden size.
pub fn validate_inputs(
    query: &Tensor,
    value: &Tensor,
    hidden: usize,
) -> Result<InputDims, AttentionError> {
    if !query.device().same_device(value.device()) {
        return Err(AttentionError::shape(
            "query and value must reside on the same device",
        ));
    }
    let dtype = query.dtype();
    if !FLOAT_DTYPES.contains(&dtype) {
        return Err(AttentionError::UnsupportedDType {
            requested: format!("{dtype:?}"),
        });
    }
    if value.dtype() != dtype {
        return Err(AttentionError::shape(format!(
            "query ({dtype:?}) and value ({:?}) must share a dtype",
            value.dtype()
        )));
    }

    let (batch, query_hidden) = query.dims2().map_err(|_| {
        AttentionError::shape(format!(
            "query must have shape [batch, hidden], got {:?}",
            query.dims()
        ))
    })?;
    let (value_batch, seq_len, value_hidden) = value.dims3().map_err(|_| {
        AttentionError::shape(format!(
            "value must have shape [batch, seq_len, hidden], got {:?}",
            value.dims()
        ))
    })?;

    if value_batch != batch {
        return Err(AttentionError::shape(format!(
            "batch mismatch: query has {batch}, value has {value_batch}"
        )));
    }
    if query_hidden != hidden || value_hidden != hidden {
        return Err(AttentionError::shape(format!(
            "expected hidden size {hidden}, got query {query_hidden} and value {value_hidden}"
        )));
    }
    if batch == 0 || seq_len == 0 {
        return Err(AttentionError::shape(
            "batch and seq_len must be non-zero",
        ));
    }

    Ok(InputDims {
        batch,
        seq_len,
        hidden,
    })
}

/// `[B, H] -> [B, 1, H]`.
pub fn expand_query(query: &Tensor) -> candle_core::Result<Tensor> {
    query.unsqueeze(1)
}

/// Batched dot products `[B, 1, H] x [B, L, H]^T -> [B, 1, L]`.
pub fn dot_scores(query: &Tensor, keys: &Tensor) -> candle_core::Result<Tensor> {
    query.matmul(&keys.transpose(1, 2)?.contiguous()?)
}

/// Softmax over sequence positions.
///
/// Takes scores laid out `[B, 1, L]`, normalises over `L` in the reduction
/// dtype and returns the distribution as `[B, L, 1]`.
pub fn sequence_softmax(
    scores: &Tensor,
    policy: &PrecisionPolicy,
) -> candle_core::Result<Tensor> {
    let (batch, _, seq_len) = scores.dims3()?;
    let scores = policy.cast_for_reduction(scores)?;
    softmax(&scores, D::Minus1)?.reshape((batch, seq_len, 1))
}

/// `sum_l weights[b, l, 0] * value[b, l, :]`, computed in the reduction dtype.
pub fn weighted_sum(
    weights: &Tensor,
    value: &Tensor,
    policy: &PrecisionPolicy,
) -> candle_core::Result<Tensor> {
    let weights = policy.cast_for_reduction(weights)?;
    let value = policy.cast_for_reduction(value)?;
    weights.broadcast_mul(&value)?.sum(1)
}

/// Packs the outputs in the caller's dtype.
pub fn finish(
    context: &Tensor,
    weights: &Tensor,
    like: &Tensor,
) -> Result<AttentionOutput, AttentionError> {
    let dtype = like.dtype();
    Ok(AttentionOutput {
        context: layers::dtypes::cast_tensor(context, dtype)?,
        weights: layers::dtypes::cast_tensor(weights, dtype)?,
    })
}

/// Emits a one-time summary the first time a mechanism runs.
pub fn log_first_call(
    latch: &OnceLock<()>,
    kind: AttentionKind,
    config: &AttentionConfig,
    policy: &PrecisionPolicy,
) {
    if latch.set(()).is_ok() {
        log::info!(
            "attention::{kind} init hidden_size={} units={} bias={} storage={:?} compute={:?} reduction={:?}",
            config.hidden_size,
            config.units,
            config.bias,
            policy.storage(),
            policy.compute(),
            policy.reduction()
        );
    }
}
