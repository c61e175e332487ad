//! Array views passed to the kernels.
//!
//! The kernels work on `ndarray` views and never own parameters:
//!
//! - [`NodeParams`]: read-only `weight` `[n_internal, n_features]` and `bias` `[n_internal]`
//! - [`NodeGradsMut`]: the matching gradient buffers, accumulated in place
//! - [`Input`]: a single feature vector or a batch `[n_examples, n_features]`

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2, Axis};

use crate::element::Element;
use crate::error::{check_len, HsmError};
use crate::repr::ClassTree;

// =============================================================================
// Parameters
// =============================================================================

/// Per-node logistic parameters: one weight row and one bias per internal node.
#[derive(Debug, Clone, Copy)]
pub struct NodeParams<'a, T> {
    pub weight: ArrayView2<'a, T>,
    pub bias: ArrayView1<'a, T>,
}

impl<'a, T: Element> NodeParams<'a, T> {
    pub fn new(weight: ArrayView2<'a, T>, bias: ArrayView1<'a, T>) -> Self {
        Self { weight, bias }
    }

    #[inline]
    pub fn n_internal(&self) -> usize {
        self.weight.nrows()
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.weight.ncols()
    }

    /// Check that there is one weight row and one bias per internal node of `tree`.
    pub fn check(&self, tree: &ClassTree) -> Result<(), HsmError> {
        check_len("weight rows", tree.n_internal(), self.weight.nrows())?;
        check_len("bias length", tree.n_internal(), self.bias.len())
    }
}

/// Gradient buffers for [`NodeParams`], accumulated in place.
#[derive(Debug)]
pub struct NodeGradsMut<'a, T> {
    pub weight: ArrayViewMut2<'a, T>,
    pub bias: ArrayViewMut1<'a, T>,
}

impl<'a, T: Element> NodeGradsMut<'a, T> {
    pub fn new(weight: ArrayViewMut2<'a, T>, bias: ArrayViewMut1<'a, T>) -> Self {
        Self { weight, bias }
    }
}

// =============================================================================
// Input
// =============================================================================

/// Input activations: one vector, or a batch with examples on rows.
///
/// A single vector behaves exactly like a one-row batch.
#[derive(Debug, Clone, Copy)]
pub enum Input<'a, T> {
    Single(ArrayView1<'a, T>),
    Batch(ArrayView2<'a, T>),
}

impl<'a, T: Element> Input<'a, T> {
    /// View as a batch `[n_examples, n_features]`.
    pub fn as_batch(&self) -> ArrayView2<'a, T> {
        match *self {
            Input::Single(row) => row.insert_axis(Axis(0)),
            Input::Batch(batch) => batch,
        }
    }

    #[inline]
    pub fn is_single(&self) -> bool {
        matches!(self, Input::Single(_))
    }

    #[inline]
    pub fn n_examples(&self) -> usize {
        match self {
            Input::Single(_) => 1,
            Input::Batch(batch) => batch.nrows(),
        }
    }
}

impl<'a, T> From<ArrayView1<'a, T>> for Input<'a, T> {
    fn from(row: ArrayView1<'a, T>) -> Self {
        Input::Single(row)
    }
}

impl<'a, T> From<ArrayView2<'a, T>> for Input<'a, T> {
    fn from(batch: ArrayView2<'a, T>) -> Self {
        Input::Batch(batch)
    }
}

impl<'a, T> From<&'a Array1<T>> for Input<'a, T> {
    fn from(row: &'a Array1<T>) -> Self {
        Input::Single(row.view())
    }
}

impl<'a, T> From<&'a Array2<T>> for Input<'a, T> {
    fn from(batch: &'a Array2<T>) -> Self {
        Input::Batch(batch.view())
    }
}
