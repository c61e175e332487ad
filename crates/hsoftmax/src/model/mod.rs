//! High-level layer wrapper.
//!
//! - [`HierarchicalSoftmax`]: owns the tree, parameters, gradients and the
//!   last recorded path
//! - [`HsmConfig`]: threads, score clamp and initialization seed

mod config;
mod layer;

pub(crate) use config::check_score_clamp;
pub use config::{ConfigError, HsmConfig, HsmConfigBuilder};
pub use layer::HierarchicalSoftmax;
