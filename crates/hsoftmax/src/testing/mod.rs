//! Helpers for tests and benchmarks.
//!
//! Deterministic tree builders, seeded random data, and a central-difference
//! gradient for checking the backward passes.

mod data;
mod trees;

pub use data::{random_inputs, random_params, random_targets};
pub use trees::{balanced_tree, random_tree};

use ndarray::{Array, Dimension};

/// Central-difference gradient of `f` at `point`.
///
/// Each coordinate is moved by `±eps` in turn; `f` sees the perturbed array.
pub fn numerical_gradient<D, F>(point: &Array<f64, D>, eps: f64, mut f: F) -> Array<f64, D>
where
    D: Dimension,
    F: FnMut(&Array<f64, D>) -> f64,
{
    assert!(eps > 0.0);
    let mut shifted = point.as_standard_layout().into_owned();
    let mut grad = Array::zeros(point.raw_dim());

    for (k, g) in grad.iter_mut().enumerate() {
        let original = shifted.as_slice().expect("standard layout")[k];

        shifted.as_slice_mut().expect("standard layout")[k] = original + eps;
        let plus = f(&shifted);
        shifted.as_slice_mut().expect("standard layout")[k] = original - eps;
        let minus = f(&shifted);
        shifted.as_slice_mut().expect("standard layout")[k] = original;

        *g = (plus - minus) / (2.0 * eps);
    }

    grad
}
