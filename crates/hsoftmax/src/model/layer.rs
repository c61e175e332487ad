//! Hierarchical softmax layer.
//!
//! [`HierarchicalSoftmax`] bundles a class tree with the parameters it scores
//! and their gradient buffers, and keeps the path recorded by the last forward
//! pass for the backward passes that follow it.
//!
//! # Example
//!
//! ```
//! use hsoftmax::model::{HierarchicalSoftmax, HsmConfig};
//! use hsoftmax::testing::balanced_tree;
//! use ndarray::array;
//!
//! let config = HsmConfig::builder().n_threads(1).build().unwrap();
//! let mut layer = HierarchicalSoftmax::<f64>::new(balanced_tree(4), 2, config).unwrap();
//!
//! let input = array![[0.5, -1.0], [2.0, 0.0]];
//! let log_probs = layer.update_output(&input, &[1, 4]).unwrap();
//! assert!(log_probs.iter().all(|&lp| lp < 0.0));
//!
//! let grad_output = array![-1.0, -1.0];
//! let grad_input = layer.update_grad_input(grad_output.view()).unwrap();
//! assert_eq!(grad_input.dim(), (2, 2));
//!
//! layer.zero_grad_parameters();
//! layer.acc_grad_parameters(&input, grad_output.view(), 1.0).unwrap();
//! layer.update_parameters(0.1);
//! ```

use ndarray::{Array1, Array2, ArrayView1};
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::data::{Input, NodeGradsMut, NodeParams};
use crate::element::Element;
use crate::error::{check_len, HsmError};
use crate::kernel::{backward_input, backward_params_into, forward_into};
use crate::repr::{ClassTree, PathRecorder};
use crate::utils::Executor;

use super::HsmConfig;

/// A hierarchical softmax output layer.
///
/// Owns `weight` `[n_internal, n_features]`, `bias` `[n_internal]`, their
/// gradients, and the path recorded by the last successful forward pass.
#[derive(Debug)]
pub struct HierarchicalSoftmax<T: Element> {
    tree: ClassTree,
    weight: Array2<T>,
    bias: Array1<T>,
    grad_weight: Array2<T>,
    grad_bias: Array1<T>,
    path: PathRecorder<T>,
    has_path: bool,
    config: HsmConfig,
    executor: Executor,
}

impl<T: Element> HierarchicalSoftmax<T> {
    /// Create a layer with randomly initialized parameters (see [`reset`](Self::reset)).
    pub fn new(tree: ClassTree, n_features: usize, config: HsmConfig) -> Result<Self, HsmError> {
        let n_internal = tree.n_internal();
        let seed = config.seed;
        let mut layer = Self::with_params(
            tree,
            Array2::zeros((n_internal, n_features)),
            Array1::zeros(n_internal),
            config,
        )?;
        layer.reset(seed);
        Ok(layer)
    }

    /// Create a layer around existing parameters.
    pub fn with_params(
        tree: ClassTree,
        weight: Array2<T>,
        bias: Array1<T>,
        config: HsmConfig,
    ) -> Result<Self, HsmError> {
        config.validate()?;
        NodeParams::new(weight.view(), bias.view()).check(&tree)?;

        let executor = Executor::new(config.n_threads);
        tracing::debug!(
            n_leaves = tree.n_leaves(),
            n_internal = tree.n_internal(),
            n_features = weight.ncols(),
            n_threads = executor.n_threads(),
            "hierarchical softmax layer created"
        );

        Ok(Self {
            grad_weight: Array2::zeros(weight.raw_dim()),
            grad_bias: Array1::zeros(bias.raw_dim()),
            tree,
            weight,
            bias,
            path: PathRecorder::new(),
            has_path: false,
            config,
            executor,
        })
    }

    /// Draw parameters uniformly from `[-1/sqrt(n_features), 1/sqrt(n_features)]`.
    pub fn reset(&mut self, seed: u64) {
        let stdv = 1.0 / (self.n_features().max(1) as f64).sqrt();
        let dist = Uniform::new_inclusive(-stdv, stdv);
        let mut rng = StdRng::seed_from_u64(seed);

        self.weight
            .mapv_inplace(|_| T::from_f64(dist.sample(&mut rng)));
        self.bias.mapv_inplace(|_| T::from_f64(dist.sample(&mut rng)));
    }

    pub fn tree(&self) -> &ClassTree {
        &self.tree
    }

    pub fn config(&self) -> &HsmConfig {
        &self.config
    }

    pub fn n_features(&self) -> usize {
        self.weight.ncols()
    }

    pub fn weight(&self) -> &Array2<T> {
        &self.weight
    }

    pub fn bias(&self) -> &Array1<T> {
        &self.bias
    }

    pub fn grad_weight(&self) -> &Array2<T> {
        &self.grad_weight
    }

    pub fn grad_bias(&self) -> &Array1<T> {
        &self.grad_bias
    }

    /// Read-only views of the parameters.
    pub fn params(&self) -> NodeParams<'_, T> {
        NodeParams::new(self.weight.view(), self.bias.view())
    }

    /// Path recorded by the last successful forward pass.
    pub fn last_path(&self) -> Option<&PathRecorder<T>> {
        self.has_path.then_some(&self.path)
    }

    /// Log-probability of each target, recording the paths for the backward passes.
    ///
    /// `targets` are 1-based leaf ids, one per example. A single input vector
    /// behaves as a batch of one.
    pub fn update_output<'a>(
        &mut self,
        input: impl Into<Input<'a, T>>,
        targets: &[i64],
    ) -> Result<Array1<T>, HsmError>
    where
        T: 'a,
    {
        let input = input.into().as_batch();
        let mut output = Array1::zeros(input.nrows());

        let Self {
            tree,
            weight,
            bias,
            path,
            has_path,
            config,
            executor,
            ..
        } = self;
        let params = NodeParams::new(weight.view(), bias.view());

        *has_path = false;
        executor.install(|parallelism| {
            forward_into(
                tree,
                &params,
                input,
                targets,
                output.view_mut(),
                path,
                &config.forward_options(parallelism),
            )
        })?;
        *has_path = true;

        Ok(output)
    }

    /// Gradient with respect to the input of the last forward pass.
    pub fn update_grad_input(&self, grad_output: ArrayView1<'_, T>) -> Result<Array2<T>, HsmError> {
        let path = self.last_path().ok_or(HsmError::MissingForward)?;
        self.executor.install(|parallelism| {
            backward_input(&self.tree, self.weight.view(), path, grad_output, parallelism)
        })
    }

    /// Add `scale` times the parameter gradient of the last forward pass to
    /// the gradient buffers.
    ///
    /// `input` must be the input of that forward pass.
    pub fn acc_grad_parameters<'a>(
        &mut self,
        input: impl Into<Input<'a, T>>,
        grad_output: ArrayView1<'_, T>,
        scale: f64,
    ) -> Result<(), HsmError>
    where
        T: 'a,
    {
        let input = input.into().as_batch();
        if !self.has_path {
            return Err(HsmError::MissingForward);
        }
        check_len("input columns", self.weight.ncols(), input.ncols())?;

        let Self {
            path,
            grad_weight,
            grad_bias,
            executor,
            ..
        } = self;
        executor.install(|parallelism| {
            backward_params_into(
                input,
                path,
                grad_output,
                scale,
                NodeGradsMut::new(grad_weight.view_mut(), grad_bias.view_mut()),
                parallelism,
            )
        })
    }

    /// Reset the gradient buffers to zero.
    pub fn zero_grad_parameters(&mut self) {
        self.grad_weight.fill(T::zero());
        self.grad_bias.fill(T::zero());
    }

    /// Plain gradient step: `param -= learning_rate * grad`.
    pub fn update_parameters(&mut self, learning_rate: f64) {
        let step = -T::from_f64(learning_rate);
        self.weight.scaled_add(step, &self.grad_weight);
        self.bias.scaled_add(step, &self.grad_bias);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::balanced_tree;
    use ndarray::array;

    fn sequential() -> HsmConfig {
        HsmConfig::builder().n_threads(1).build().unwrap()
    }

    #[test]
    fn test_new_initializes_within_bounds() {
        let layer = HierarchicalSoftmax::<f32>::new(balanced_tree(8), 16, sequential()).unwrap();
        let stdv = 0.25f32;
        assert_eq!(layer.weight().dim(), (7, 16));
        assert!(layer.weight().iter().all(|w| w.abs() <= stdv));
        assert!(layer.bias().iter().all(|b| b.abs() <= stdv));
        assert!(layer.weight().iter().any(|&w| w != 0.0));
    }

    #[test]
    fn test_reset_is_deterministic() {
        let mut a = HierarchicalSoftmax::<f64>::new(balanced_tree(4), 3, sequential()).unwrap();
        let b = HierarchicalSoftmax::<f64>::new(balanced_tree(4), 3, sequential()).unwrap();
        assert_eq!(a.weight(), b.weight());
        a.reset(7);
        assert_ne!(a.weight(), b.weight());
    }

    #[test]
    fn test_with_params_checks_shapes() {
        let err = HierarchicalSoftmax::with_params(
            balanced_tree(4),
            Array2::<f64>::zeros((2, 3)),
            Array1::zeros(3),
            sequential(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            HsmError::ShapeMismatch {
                what: "weight rows",
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn test_backward_before_forward() {
        let mut layer = HierarchicalSoftmax::<f64>::new(balanced_tree(4), 2, sequential()).unwrap();
        assert!(layer.last_path().is_none());
        assert_eq!(
            layer.update_grad_input(array![1.0].view()),
            Err(HsmError::MissingForward)
        );
        let input = array![[1.0, 2.0]];
        assert_eq!(
            layer.acc_grad_parameters(&input, array![1.0].view(), 1.0),
            Err(HsmError::MissingForward)
        );
    }

    #[test]
    fn test_failed_forward_forgets_path() {
        let mut layer = HierarchicalSoftmax::<f64>::new(balanced_tree(4), 2, sequential()).unwrap();
        let input = array![[1.0, 2.0]];
        layer.update_output(&input, &[2]).unwrap();
        assert!(layer.last_path().is_some());

        let err = layer.update_output(&input, &[5]).unwrap_err();
        assert!(matches!(err, HsmError::TargetOutOfRange { target: 5, .. }));
        assert!(layer.last_path().is_none());
    }

    #[test]
    fn test_update_parameters_steps_against_gradient() {
        let mut layer = HierarchicalSoftmax::with_params(
            balanced_tree(2),
            array![[0.0, 0.0]],
            array![0.0],
            sequential(),
        )
        .unwrap();
        let input = array![[1.0, -1.0]];

        layer.update_output(&input, &[1]).unwrap();
        layer.acc_grad_parameters(&input, array![1.0].view(), 1.0).unwrap();
        // d ln P / dz at z = 0 for the left branch is -0.5.
        assert_eq!(layer.grad_bias(), &array![-0.5]);
        assert_eq!(layer.grad_weight(), &array![[-0.5, 0.5]]);

        layer.update_parameters(2.0);
        assert_eq!(layer.bias(), &array![1.0]);
        assert_eq!(layer.weight(), &array![[1.0, -1.0]]);

        layer.zero_grad_parameters();
        assert_eq!(layer.grad_bias(), &array![0.0]);
    }
}
