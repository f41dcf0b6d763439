//! Attention layers for encoder-decoder sequence models, built on Candle.
//!
//! Three scoring functions share one contract: given a query `[batch, hidden]`
//! and a value sequence `[batch, seq_len, hidden]`, return a context vector
//! `[batch, hidden]` and attention weights `[batch, seq_len, 1]` that are
//! non-negative and sum to one over `seq_len`.
//!
//! * [`AdditiveAttention`]: Bahdanau, `v^T tanh(W_1 value + W_2 query)`.
//! * [`ScaledDotProductAttention`]: Vaswani, `query . value / sqrt(H)`.
//! * [`GeneralAttention`]: Luong, `query . (W value)` with a max-norm bound on `W`.
//!
//! Parameters are Candle `Var`s owned by each layer. `compute` only reads them;
//! an external optimizer updates them via [`Attention::parameters`], followed by
//! [`Attention::apply_constraints`].

pub mod additive;
pub mod core;
pub mod general;
pub mod ops;
pub mod registry;
pub mod scaled_dot;

pub use additive::AdditiveAttention;
pub use crate::core::{
    Attention, AttentionConfig, AttentionError, AttentionKind, AttentionOutput, ParameterDType,
};
pub use general::GeneralAttention;
pub use registry::{build, build_from_var_builder};
pub use scaled_dot::ScaledDotProductAttention;
