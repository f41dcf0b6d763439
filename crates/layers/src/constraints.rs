//! Weight constraints applied to projection kernels outside the forward pass.
//!
//! A constraint is a projection `W -> W'` that a training loop re-applies after
//! every optimizer update. Kernels follow the Candle layout `(out_dim, in_dim)`,
//! so "per output unit" means per row.

use candle_core::{DType, Error, Result, Tensor, D};

/// Caps the L2 norm of each output unit's incoming weights.
///
/// Every row is rescaled by `clip(n, 0, max) / (eps + n)` where `n` is the row
/// norm, which leaves rows under the bound (almost) untouched and pulls the
/// others back onto the sphere of radius `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaxNorm {
    max_value: f64,
}

impl MaxNorm {
    /// Stabiliser in the rescaling denominator.
    pub const EPSILON: f64 = 1e-7;

    /// Relative slack allowed for float rounding when checking the bound.
    pub const TOLERANCE: f64 = 1e-5;

    /// Creates a constraint with the given bound, which must be finite and positive.
    pub fn new(max_value: f64) -> Result<Self> {
        if !max_value.is_finite() || max_value <= 0.0 {
            return Err(Error::Msg(format!(
                "max-norm bound must be finite and positive, got {max_value}"
            )));
        }
        Ok(Self { max_value })
    }

    /// The configured bound.
    pub fn max_value(&self) -> f64 {
        self.max_value
    }

    /// Returns the projected kernel in the kernel's own dtype.
    ///
    /// Rows over the bound are pulled to `max * (1 - eps)` for half-precision
    /// kernels, where `eps` is the storage machine epsilon, so that rounding
    /// each element back to storage cannot grow the row norm past `max`.
    pub fn project(&self, kernel: &Tensor) -> Result<Tensor> {
        let dtype = kernel.dtype();
        let work = kernel.to_dtype(work_dtype(dtype))?;
        let norms = row_norms_tensor(&work)?;
        let over = norms.gt(self.max_value)?.to_dtype(work.dtype())?;
        let margin = over.affine(-rounding_margin(dtype), 1.0)?;
        let desired = norms.clamp(0f64, self.max_value)?.mul(&margin)?;
        let scale = desired.div(&(norms + Self::EPSILON)?)?;
        work.broadcast_mul(&scale)?.to_dtype(dtype)
    }

    /// Whether every row of `kernel` satisfies the bound, up to rounding.
    pub fn is_satisfied(&self, kernel: &Tensor) -> Result<bool> {
        let limit = self.max_value * (1.0 + Self::TOLERANCE);
        Ok(row_norms(kernel)?
            .iter()
            .all(|&norm| f64::from(norm) <= limit))
    }
}

/// L2 norm of each row of a `(out_dim, in_dim)` kernel.
pub fn row_norms(kernel: &Tensor) -> Result<Vec<f32>> {
    let work = kernel.to_dtype(work_dtype(kernel.dtype()))?;
    row_norms_tensor(&work)?
        .squeeze(D::Minus1)?
        .to_dtype(DType::F32)?
        .to_vec1::<f32>()
}

fn row_norms_tensor(kernel: &Tensor) -> Result<Tensor> {
    if kernel.rank() != 2 {
        return Err(Error::Msg(format!(
            "max-norm expects a (out_dim, in_dim) kernel, got {:?}",
            kernel.dims()
        )));
    }
    kernel.sqr()?.sum_keepdim(D::Minus1)?.sqrt()
}

/// Relative growth of a row norm caused by rounding each element to `dtype`.
/// Kernels already stored in the work dtype are never rounded.
fn rounding_margin(dtype: DType) -> f64 {
    match dtype {
        DType::BF16 => 2f64.powi(-7),
        DType::F16 => 2f64.powi(-10),
        _ => 0.0,
    }
}

fn work_dtype(dtype: DType) -> DType {
    match dtype {
        DType::F64 => DType::F64,
        _ => DType::F32,
    }
}
