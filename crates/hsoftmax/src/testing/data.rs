use ndarray::{Array1, Array2};
use rand::prelude::*;

use crate::element::Element;

/// Node parameters uniform in `[-scale, scale]`.
///
/// Returns `(weight [n_internal, n_features], bias [n_internal])`.
pub fn random_params<T: Element>(
    n_internal: usize,
    n_features: usize,
    seed: u64,
    scale: f64,
) -> (Array2<T>, Array1<T>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let weight = Array2::from_shape_simple_fn((n_internal, n_features), || {
        T::from_f64(rng.gen_range(-scale..=scale))
    });
    let bias = Array1::from_shape_simple_fn(n_internal, || T::from_f64(rng.gen_range(-scale..=scale)));
    (weight, bias)
}

/// Random activations `[rows, cols]`, uniform in `[-scale, scale]`.
pub fn random_inputs<T: Element>(rows: usize, cols: usize, seed: u64, scale: f64) -> Array2<T> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_simple_fn((rows, cols), || T::from_f64(rng.gen_range(-scale..=scale)))
}

/// Random 1-based targets in `1..=n_leaves`.
pub fn random_targets(n: usize, n_leaves: usize, seed: u64) -> Vec<i64> {
    assert!(n_leaves > 0);
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen_range(1..=n_leaves as i64)).collect()
}
