//! Kernel error type.
//!
//! [`HsmError`] is returned by every forward and backward pass. Structural
//! errors abort the whole batch: after an error the output buffers hold no
//! meaningful values and the path recorder is cleared.

use crate::model::ConfigError;
use crate::repr::{PathError, TreeValidationError};

/// Errors raised by the hierarchical softmax kernels and layer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HsmError {
    /// A parent link resolved to a leaf, i.e. to an internal-node index below zero.
    ///
    /// The tree descriptor does not agree with its `n_leaves`.
    #[error("inconsistent tree: item {item} has parent {parent}, which is not an internal node")]
    InconsistentTree { item: usize, parent: usize },

    /// The target leaf has no parent, so there is no decision to evaluate.
    #[error("inconsistent tree: leaf {leaf} has no parent")]
    DetachedLeaf { leaf: usize },

    /// A walk ended after fewer decisions than the depth of its first ancestor implies.
    #[error("path of example {example} has {actual} decisions, depth implies {expected}")]
    PathLengthMismatch {
        example: usize,
        expected: usize,
        actual: usize,
    },

    /// A walk kept going past the length implied by the depth of its first ancestor.
    #[error("path of example {example} is longer than the {expected} decisions its depth implies")]
    PathTooLong { example: usize, expected: usize },

    /// A target is not a 1-based leaf id.
    #[error("target {target} of example {example} is not a leaf id in 1..={n_leaves}")]
    TargetOutOfRange {
        example: usize,
        target: i64,
        n_leaves: usize,
    },

    /// Two arrays that must agree on a dimension do not.
    #[error("{what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A recorded path refers to an internal node the parameters do not have.
    #[error("path references internal node {node}, but only {n_internal} exist")]
    PathNodeOutOfRange { node: usize, n_internal: usize },

    /// A backward pass was requested before any successful forward pass.
    #[error("no recorded path: run a forward pass first")]
    MissingForward,

    #[error(transparent)]
    Tree(#[from] TreeValidationError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Fail with [`HsmError::ShapeMismatch`] unless `actual == expected`.
#[inline]
pub(crate) fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<(), HsmError> {
    if expected == actual {
        Ok(())
    } else {
        Err(HsmError::ShapeMismatch {
            what,
            expected,
            actual,
        })
    }
}
