//! Lightweight validation helpers shared across layer components.
//!
//! Every helper takes a short `context` label (e.g. `"linear.weight"`) that is
//! prefixed to the error message, so a failure deep inside a composite layer
//! still names the tensor that broke the contract. All of them return
//! `candle_core::Result<()>` so call sites can propagate with `?`.

use candle_core::{DType, Error, Result, Tensor};

/// Floating point dtypes accepted for parameters and activations.
pub const FLOAT_DTYPES: [DType; 4] = [DType::F16, DType::BF16, DType::F32, DType::F64];

/// Ensures a tensor has exactly `rank` dimensions.
pub fn expect_rank(context: &str, tensor: &Tensor, rank: usize) -> Result<()> {
    if tensor.rank() == rank {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{context}: expected rank {rank}, got shape {:?}",
            tensor.dims()
        )))
    }
}

/// Ensures a tensor matches the expected dimensions exactly.
pub fn expect_shape(context: &str, tensor: &Tensor, expected: &[usize]) -> Result<()> {
    if tensor.dims() == expected {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{context}: expected shape {expected:?}, got {:?}",
            tensor.dims()
        )))
    }
}

/// Validates that the last axis of `tensor` has size `features`.
pub fn expect_last_dim(context: &str, tensor: &Tensor, features: usize) -> Result<()> {
    match tensor.dims().last() {
        Some(&actual) if actual == features => Ok(()),
        _ => Err(Error::Msg(format!(
            "{context}: expected trailing dimension {features}, got {:?}",
            tensor.dims()
        ))),
    }
}

/// Checks the tensor dtype is one of the allowed values.
pub fn expect_dtype_in(context: &str, tensor: &Tensor, allowed: &[DType]) -> Result<()> {
    let dtype = tensor.dtype();
    if allowed.contains(&dtype) {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{context}: expected dtype in {allowed:?}, got {dtype:?}"
        )))
    }
}

/// Rejects tensors that are not laid out contiguously in memory.
pub fn expect_contiguous(context: &str, tensor: &Tensor) -> Result<()> {
    if tensor.is_contiguous() {
        Ok(())
    } else {
        Err(Error::Msg(format!("{context}: tensor must be contiguous")))
    }
}

/// Rejects shapes that contain a zero-sized axis.
pub fn expect_non_empty(context: &str, tensor: &Tensor) -> Result<()> {
    if tensor.dims().iter().all(|&dim| dim > 0) {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{context}: dimensions must be non-zero, got {:?}",
            tensor.dims()
        )))
    }
}
