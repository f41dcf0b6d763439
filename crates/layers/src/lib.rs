//! Building blocks the attention mechanisms are assembled from.
//!
//! * [`linear`]: dense projections whose parameters are Candle [`Var`]s,
//!   optionally bound by a max-norm constraint.
//! * [`constraints`]: weight constraints re-applied after optimizer updates.
//! * [`dtypes`]: the storage/compute/reduction precision policy.
//! * [`checks`]: shape and dtype assertions returning `candle_core::Result`.
//!
//! [`Var`]: candle_core::Var

pub mod checks;
pub mod constraints;
pub mod dtypes;
pub mod linear;

pub use constraints::MaxNorm;
pub use dtypes::PrecisionPolicy;
pub use linear::{Linear, LinearConfig, LinearInit};
