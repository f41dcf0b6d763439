//! Dense affine projections with trainable parameters.
//!
//! Inputs are shaped `(batch, in_dim)` or `(batch, seq, in_dim)` and come back
//! with the trailing axis replaced by `out_dim`. Weights follow the Candle
//! layout `(out_dim, in_dim)` and live in [`Var`]s, so an external optimizer
//! can update them in place and every clone of the layer sees the update.
//!
//! A layer may carry a [`MaxNorm`] constraint. The constraint is enforced when
//! the layer is built, whenever weights are written through
//! [`Linear::copy_weight_from`], and whenever the owner calls
//! [`Linear::apply_constraints`] after an optimizer step. The forward pass
//! never mutates parameters.

use candle_core::{DType, Device, Error, Result, Tensor, Var};
use candle_nn::{Init, VarBuilder};

use crate::{
    checks,
    constraints::MaxNorm,
    dtypes::{cast_tensor, PrecisionPolicy},
};

/// Shape of a dense projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearConfig {
    /// Incoming feature dimension.
    pub input_dim: usize,
    /// Output feature dimension.
    pub output_dim: usize,
    /// Whether a learnable bias vector should be applied.
    pub bias: bool,
}

impl LinearConfig {
    /// Creates a configuration with a bias term.
    pub fn new(input_dim: usize, output_dim: usize) -> Self {
        Self {
            input_dim,
            output_dim,
            bias: true,
        }
    }

    /// Toggles the bias term.
    pub fn with_bias(mut self, bias: bool) -> Self {
        self.bias = bias;
        self
    }
}

/// Supported weight initialisation policies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LinearInit {
    /// Xavier/Glorot uniform initialisation.
    XavierUniform,
    /// Xavier/Glorot normal initialisation.
    XavierNormal,
}

impl LinearInit {
    /// Resolves the policy into a concrete Candle initialiser for a kernel.
    pub fn to_init(self, input_dim: usize, output_dim: usize) -> Init {
        let (fan_in, fan_out) = (input_dim as f64, output_dim as f64);
        match self {
            LinearInit::XavierUniform => {
                let bound = (6.0 / (fan_in + fan_out)).sqrt();
                Init::Uniform {
                    lo: -bound,
                    up: bound,
                }
            }
            LinearInit::XavierNormal => Init::Randn {
                mean: 0.0,
                stdev: (2.0 / (fan_in + fan_out)).sqrt(),
            },
        }
    }
}

/// Dense affine projection `y = x W^T + b`.
#[derive(Debug, Clone)]
pub struct Linear {
    config: LinearConfig,
    weight: Var,
    bias: Option<Var>,
    constraint: Option<MaxNorm>,
}

impl Linear {
    /// Wraps existing parameter tensors. Tensors that are already variables
    /// (e.g. handed out by a `VarMap`) keep sharing storage with their source.
    pub fn new(config: LinearConfig, weight: Tensor, bias: Option<Tensor>) -> Result<Self> {
        Self::validate_weight(&config, &weight)?;
        Self::validate_bias(&config, bias.as_ref())?;
        Ok(Self {
            config,
            weight: Var::from_tensor(&weight)?,
            bias: bias.as_ref().map(Var::from_tensor).transpose()?,
            constraint: None,
        })
    }

    /// Builds a layer with freshly sampled weights and a zero bias.
    pub fn with_init(
        config: LinearConfig,
        init: LinearInit,
        device: &Device,
        dtype: DType,
    ) -> Result<Self> {
        let weight = init
            .to_init(config.input_dim, config.output_dim)
            .var((config.output_dim, config.input_dim), dtype, device)?;
        let bias = if config.bias {
            Some(Var::zeros(config.output_dim, dtype, device)?)
        } else {
            None
        };
        Self::new(
            config,
            weight.as_tensor().clone(),
            bias.map(|b| b.as_tensor().clone()),
        )
    }

    /// Fetches (or creates) `weight` and `bias` under the builder's prefix.
    pub fn from_var_builder(config: LinearConfig, init: LinearInit, vb: VarBuilder) -> Result<Self> {
        let weight = vb.get_with_hints(
            (config.output_dim, config.input_dim),
            "weight",
            init.to_init(config.input_dim, config.output_dim),
        )?;
        let bias = if config.bias {
            Some(vb.get_with_hints(config.output_dim, "bias", Init::Const(0.0))?)
        } else {
            None
        };
        Self::new(config, weight, bias)
    }

    /// Attaches a max-norm constraint and enforces it immediately.
    pub fn with_constraint(mut self, constraint: MaxNorm) -> Result<Self> {
        self.constraint = Some(constraint);
        self.apply_constraints()?;
        Ok(self)
    }

    pub fn config(&self) -> &LinearConfig {
        &self.config
    }

    pub fn constraint(&self) -> Option<&MaxNorm> {
        self.constraint.as_ref()
    }

    /// Returns the weight tensor (shares storage with the variable).
    pub fn weight(&self) -> Tensor {
        self.weight.as_tensor().clone()
    }

    /// Returns the bias tensor if present.
    pub fn bias(&self) -> Option<Tensor> {
        self.bias.as_ref().map(|b| b.as_tensor().clone())
    }

    /// Trainable variables, weight first.
    pub fn vars(&self) -> Vec<Var> {
        let mut vars = vec![self.weight.clone()];
        vars.extend(self.bias.iter().cloned());
        vars
    }

    /// Overwrites the weight, projecting it through the constraint first.
    pub fn copy_weight_from(&self, value: &Tensor) -> Result<()> {
        Self::validate_weight(&self.config, value)?;
        let value = value.to_dtype(self.weight.dtype())?;
        let value = match &self.constraint {
            Some(constraint) => constraint.project(&value)?,
            None => value,
        };
        self.weight.set(&value)
    }

    /// Overwrites the bias vector.
    pub fn copy_bias_from(&self, value: &Tensor) -> Result<()> {
        match &self.bias {
            Some(bias) => {
                Self::validate_bias(&self.config, Some(value))?;
                bias.set(&value.to_dtype(bias.dtype())?)
            }
            None => Err(Error::Msg("layer has no bias to copy into".into())),
        }
    }

    /// Re-enforces the constraint on the stored weight.
    ///
    /// Returns `true` when the weight had drifted outside the bound and was
    /// rewritten.
    pub fn apply_constraints(&self) -> Result<bool> {
        let Some(constraint) = &self.constraint else {
            return Ok(false);
        };
        if constraint.is_satisfied(self.weight.as_tensor())? {
            return Ok(false);
        }
        let projected = constraint.project(self.weight.as_tensor())?;
        self.weight.set(&projected)?;
        log::debug!(
            "linear {}x{}: weight rescaled to max-norm {}",
            self.config.output_dim,
            self.config.input_dim,
            constraint.max_value()
        );
        Ok(true)
    }

    /// Applies the projection and returns the result in `policy.compute()`.
    pub fn forward_compute(&self, hidden: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor> {
        self.validate_input(hidden)?;

        let input = policy.cast_for_compute(hidden)?;
        let weight_t = policy.cast_for_compute(self.weight.as_tensor())?.t()?;

        let mut output = match input.dims() {
            &[batch, seq, _] => input
                .reshape((batch * seq, self.config.input_dim))?
                .matmul(&weight_t)?
                .reshape((batch, seq, self.config.output_dim))?,
            &[_, _] => input.matmul(&weight_t)?,
            _ => unreachable!("validated above"),
        };

        if let Some(bias) = &self.bias {
            output = output.broadcast_add(&cast_tensor(bias.as_tensor(), policy.compute())?)?;
        }
        Ok(output)
    }

    /// Applies the projection and casts the result back to storage precision.
    pub fn forward(&self, hidden: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor> {
        policy.cast_to_storage(&self.forward_compute(hidden, policy)?)
    }

    fn validate_weight(config: &LinearConfig, weight: &Tensor) -> Result<()> {
        checks::expect_shape(
            "linear.weight",
            weight,
            &[config.output_dim, config.input_dim],
        )?;
        checks::expect_dtype_in("linear.weight", weight, &checks::FLOAT_DTYPES)?;
        checks::expect_contiguous("linear.weight", weight)
    }

    fn validate_bias(config: &LinearConfig, bias: Option<&Tensor>) -> Result<()> {
        match (config.bias, bias) {
            (true, Some(tensor)) => {
                checks::expect_shape("linear.bias", tensor, &[config.output_dim])?;
                checks::expect_dtype_in("linear.bias", tensor, &checks::FLOAT_DTYPES)?;
                checks::expect_contiguous("linear.bias", tensor)
            }
            (false, Some(_)) => Err(Error::Msg("bias provided but config disables bias".into())),
            (true, None) => Err(Error::Msg("config expects bias but none supplied".into())),
            (false, None) => Ok(()),
        }
    }

    fn validate_input(&self, hidden: &Tensor) -> Result<()> {
        if !matches!(hidden.rank(), 2 | 3) {
            return Err(Error::Msg(format!(
                "linear expects input shaped [B, T, H_in] or [B, H_in], got {:?}",
                hidden.dims()
            )));
        }
        checks::expect_last_dim("linear.input", hidden, self.config.input_dim)?;
        checks::expect_non_empty("linear.input", hidden)
    }
}
