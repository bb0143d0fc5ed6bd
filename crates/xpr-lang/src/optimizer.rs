//! Tiered accessor optimizer.
//!
//! Every cached accessor chain starts [`Tier::Generic`]. A chain that is hit
//! more than [`OptimizerConfig::tenure_threshold`] times inside one
//! [`OptimizerConfig::tenure_window`] is handed to the
//! [`SpecializationBackend`](backend::SpecializationBackend), and the
//! specialized accessor replaces per-segment dispatch from then on. When
//! more than [`OptimizerConfig::max_specializations`] chains are promoted,
//! every specialized chain is demoted at once.

pub(crate) mod backend;
mod state;
mod tiered;

pub use state::{OptimizerConfig, OptimizerState};
pub use tiered::{Tier, TieredAccessor};
