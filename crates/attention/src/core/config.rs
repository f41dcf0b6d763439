//! Construction-time configuration shared by all attention mechanisms.
//!
//! [`AttentionConfig`] can be built in code or read from a `.toml`/`.json`
//! file. Field meaning per mechanism:
//!
//! | field             | additive         | scaled dot-product | general             |
//! |-------------------|------------------|--------------------|---------------------|
//! | `hidden_size`     | query/value H    | query/value H      | query/value H       |
//! | `units`           | score space U    | must equal H       | must equal H        |
//! | `kernel_max_norm` | unused           | unused             | projection bound    |
//! | `bias`            | all projections  | unused             | projection bias     |

use std::{fs, path::Path};

use candle_core::DType;
use layers::{MaxNorm, PrecisionPolicy};
use serde::{Deserialize, Serialize};

use super::{AttentionError, AttentionKind};

/// Default bound on the per-unit kernel norm of [`GeneralAttention`](crate::GeneralAttention).
pub const DEFAULT_KERNEL_MAX_NORM: f64 = 2.0;

/// Parameter storage precision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterDType {
    F16,
    Bf16,
    #[default]
    F32,
    F64,
}

impl ParameterDType {
    pub fn to_dtype(self) -> DType {
        match self {
            ParameterDType::F16 => DType::F16,
            ParameterDType::Bf16 => DType::BF16,
            ParameterDType::F32 => DType::F32,
            ParameterDType::F64 => DType::F64,
        }
    }

    pub fn from_dtype(dtype: DType) -> Result<Self, AttentionError> {
        match dtype {
            DType::F16 => Ok(ParameterDType::F16),
            DType::BF16 => Ok(ParameterDType::Bf16),
            DType::F32 => Ok(ParameterDType::F32),
            DType::F64 => Ok(ParameterDType::F64),
            other => Err(AttentionError::UnsupportedDType {
                requested: format!("{other:?}"),
            }),
        }
    }
}

/// Configuration driving a single attention layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttentionConfig {
    /// Feature dimension H of both query and value vectors.
    pub hidden_size: usize,
    /// Internal projection dimension.
    pub units: usize,
    /// Upper bound on each projection unit's weight norm (general attention).
    #[serde(default = "default_kernel_max_norm")]
    pub kernel_max_norm: f64,
    /// Whether learned projections carry a bias term.
    #[serde(default = "default_bias")]
    pub bias: bool,
    /// Storage dtype for parameters built from this config.
    #[serde(default)]
    pub dtype: ParameterDType,
}

fn default_kernel_max_norm() -> f64 {
    DEFAULT_KERNEL_MAX_NORM
}

fn default_bias() -> bool {
    true
}

impl AttentionConfig {
    /// Config with default bound, bias enabled and `f32` parameters.
    pub fn new(hidden_size: usize, units: usize) -> Self {
        Self {
            hidden_size,
            units,
            kernel_max_norm: DEFAULT_KERNEL_MAX_NORM,
            bias: true,
            dtype: ParameterDType::default(),
        }
    }

    /// Config where the projection dimension equals the hidden size.
    pub fn square(hidden_size: usize) -> Self {
        Self::new(hidden_size, hidden_size)
    }

    pub fn with_kernel_max_norm(mut self, bound: f64) -> Self {
        self.kernel_max_norm = bound;
        self
    }

    pub fn with_bias(mut self, bias: bool) -> Self {
        self.bias = bias;
        self
    }

    pub fn with_dtype(mut self, dtype: ParameterDType) -> Self {
        self.dtype = dtype;
        self
    }

    /// Precision policy derived from the parameter dtype.
    pub fn policy(&self) -> PrecisionPolicy {
        PrecisionPolicy::from_parameter_dtype(self.dtype.to_dtype())
    }

    /// The max-norm constraint described by `kernel_max_norm`.
    pub fn kernel_constraint(&self) -> Result<MaxNorm, AttentionError> {
        MaxNorm::new(self.kernel_max_norm)
            .map_err(|err| AttentionError::config(format!("kernel_max_norm: {err}")))
    }

    /// Checks the invariants `kind` relies on.
    pub fn validate_for(&self, kind: AttentionKind) -> Result<(), AttentionError> {
        if self.hidden_size == 0 {
            return Err(AttentionError::config("hidden_size must be greater than zero"));
        }
        if self.units == 0 {
            return Err(AttentionError::config("units must be greater than zero"));
        }
        match kind {
            AttentionKind::Additive => Ok(()),
            AttentionKind::ScaledDotProduct => self.expect_square(kind),
            AttentionKind::General => {
                self.expect_square(kind)?;
                self.kernel_constraint().map(|_| ())
            }
        }
    }

    fn expect_square(&self, kind: AttentionKind) -> Result<(), AttentionError> {
        if self.units == self.hidden_size {
            Ok(())
        } else {
            Err(AttentionError::config(format!(
                "{kind} attention requires units ({}) == hidden_size ({})",
                self.units, self.hidden_size
            )))
        }
    }

    /// Parses a config from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, AttentionError> {
        Ok(toml::from_str(contents)?)
    }

    /// Loads a config from a `.toml` or `.json` file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, AttentionError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(serde_json::from_str(&contents)?),
            Some("toml") | None => Self::from_toml_str(&contents),
            Some(other) => Err(AttentionError::ConfigFormat(format!(
                "unsupported configuration extension '{other}'"
            ))),
        }
    }
}
