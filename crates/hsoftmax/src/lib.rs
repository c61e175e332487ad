//! hsoftmax: hierarchical softmax for Rust.
//!
//! Scores a large set of classes through a binary tree of logistic decisions,
//! so the cost of one example grows with its path length instead of with the
//! number of classes.
//!
//! # Key Types
//!
//! - [`ClassTree`] - The class hierarchy, in the signed parent encoding
//! - [`PathRecorder`] - Decisions recorded by a forward pass for the backward passes
//! - [`HierarchicalSoftmax`] / [`HsmConfig`] - A layer that owns parameters and gradients
//!
//! # Kernels
//!
//! The [`kernel`] module exposes the three passes as free functions over
//! `ndarray` views: [`forward`], [`backward_input`] and [`backward_params`],
//! each with an `_into` variant that writes into caller-owned buffers.
//!
//! # Logging
//!
//! Diagnostics go through `tracing`. Install any subscriber to see them;
//! without one they cost nothing.

pub mod data;
pub mod element;
pub mod error;
pub mod kernel;
pub mod model;
pub mod repr;
pub mod testing;
pub mod utils;

// =============================================================================
// Convenience Re-exports
// =============================================================================

pub use element::Element;
pub use error::HsmError;

// Tree and path representations
pub use repr::{Branch, ClassTree, ParentLink, PathError, PathRecorder, SignedTree, TreeValidationError};

// Kernels and their inputs
pub use data::{Input, NodeGradsMut, NodeParams};
pub use kernel::{
    backward_input, backward_input_into, backward_params, backward_params_into, forward,
    forward_into, ForwardOptions,
};

// Layer
pub use model::{ConfigError, HierarchicalSoftmax, HsmConfig};

// Shared utilities
pub use utils::{run_with_threads, Executor, Parallelism};
