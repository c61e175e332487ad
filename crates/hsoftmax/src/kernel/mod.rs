//! Hierarchical softmax kernels.
//!
//! Three passes over a batch, all pure functions of their inputs plus the
//! documented in-place accumulation:
//!
//! - [`forward`] / [`forward_into`]: log-probability of each target leaf,
//!   recording the decisions in a [`PathRecorder`](crate::repr::PathRecorder)
//! - [`backward_input`] / [`backward_input_into`]: gradient with respect to the
//!   input activations
//! - [`backward_params`] / [`backward_params_into`]: gradient with respect to the
//!   per-node weights and biases
//!
//! Every pass takes a [`Parallelism`](crate::Parallelism) flag. Examples are
//! independent in the forward and input-gradient passes; the parameter pass
//! partitions work by node so that every gradient row has a single writer.

mod forward;
mod grad_input;
mod grad_params;

pub use forward::{forward, forward_into};
pub use grad_input::{backward_input, backward_input_into};
pub use grad_params::{backward_params, backward_params_into};

use crate::model::{check_score_clamp, ConfigError};
use crate::utils::Parallelism;

/// Options for the forward pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForwardOptions {
    /// Clamp node scores to `[-c, c]` before exponentiating.
    ///
    /// `None` (the default) leaves scores untouched: large scores then
    /// overflow to `inf` / `NaN` in the output, which is the caller's to avoid.
    /// A clamp that is not positive and finite fails the pass.
    pub score_clamp: Option<f64>,

    /// Emit a `tracing` warning when some outputs are not finite.
    pub warn_non_finite: bool,

    pub parallelism: Parallelism,
}

impl Default for ForwardOptions {
    fn default() -> Self {
        Self {
            score_clamp: None,
            warn_non_finite: true,
            parallelism: Parallelism::Sequential,
        }
    }
}

impl ForwardOptions {
    pub fn with_parallelism(mut self, parallelism: Parallelism) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn with_score_clamp(mut self, clamp: f64) -> Self {
        self.score_clamp = Some(clamp);
        self
    }

    /// Reject a clamp that is not positive and finite.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_score_clamp(self.score_clamp)
    }
}
