//! Parameter gradient: accumulate into per-node weight and bias gradients.
//!
//! Unlike the other passes, examples here write into shared rows: every
//! example that walks through node `k` adds to `grad_weight[k]`. The
//! sequential path visits examples in order. The parallel path buckets the
//! decisions by node first (a counting sort that keeps example order inside
//! each bucket) and then gives every node row to exactly one task, so no
//! synchronization is needed and both paths add in the same order.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut1, Zip};

use crate::data::NodeGradsMut;
use crate::element::Element;
use crate::error::{check_len, HsmError};
use crate::repr::PathRecorder;
use crate::utils::Parallelism;

/// Accumulate the parameter gradient into `grads`.
///
/// For every decision `j` of example `i`, with `c = scale * values[j] * grad_output[i]`:
/// `grad_weight[nodes[j]] += c * input[i]` and `grad_bias[nodes[j]] += c`.
pub fn backward_params_into<T: Element>(
    input: ArrayView2<'_, T>,
    path: &PathRecorder<T>,
    grad_output: ArrayView1<'_, T>,
    scale: f64,
    grads: NodeGradsMut<'_, T>,
    parallelism: Parallelism,
) -> Result<(), HsmError> {
    let NodeGradsMut {
        weight: mut grad_weight,
        bias: mut grad_bias,
    } = grads;
    let n_internal = grad_weight.nrows();

    check_len("grad_bias length", n_internal, grad_bias.len())?;
    check_len("input rows", path.n_examples(), input.nrows())?;
    check_len("grad_output", path.n_examples(), grad_output.len())?;
    check_len("input columns", grad_weight.ncols(), input.ncols())?;
    path.check_nodes(n_internal)?;

    let scale = T::from_f64(scale);
    let values = path.values();

    if parallelism.is_parallel() {
        let buckets = NodeBuckets::build(path, n_internal);
        Zip::indexed(grad_weight.rows_mut())
            .and(&mut grad_bias)
            .par_for_each(|ix, mut row: ArrayViewMut1<'_, T>, bias: &mut T| {
                for &(example, j) in buckets.decisions(ix) {
                    let c = scale * values[j] * grad_output[example];
                    row.scaled_add(c, &input.row(example));
                    *bias += c;
                }
            });
    } else {
        for example in 0..path.n_examples() {
            let g = grad_output[example];
            let x = input.row(example);
            for j in path.range(example) {
                let ix = path.nodes()[j];
                let c = scale * values[j] * g;
                grad_weight.row_mut(ix).scaled_add(c, &x);
                grad_bias[ix] += c;
            }
        }
    }

    tracing::debug!(
        n_examples = path.n_examples(),
        n_decisions = path.n_decisions(),
        parallel = parallelism.is_parallel(),
        "parameter gradient accumulated"
    );
    Ok(())
}

/// Allocating variant of [`backward_params_into`].
///
/// Returns zero-initialized `(grad_weight, grad_bias)` shaped like `weight`
/// with the batch's contribution added.
pub fn backward_params<T: Element>(
    input: ArrayView2<'_, T>,
    path: &PathRecorder<T>,
    grad_output: ArrayView1<'_, T>,
    scale: f64,
    weight: ArrayView2<'_, T>,
    parallelism: Parallelism,
) -> Result<(Array2<T>, Array1<T>), HsmError> {
    let mut grad_weight = Array2::zeros(weight.raw_dim());
    let mut grad_bias = Array1::zeros(weight.nrows());
    backward_params_into(
        input,
        path,
        grad_output,
        scale,
        NodeGradsMut::new(grad_weight.view_mut(), grad_bias.view_mut()),
        parallelism,
    )?;
    Ok((grad_weight, grad_bias))
}

/// Decisions grouped by node: `(example, position in path)` pairs.
struct NodeBuckets {
    starts: Vec<usize>,
    decisions: Vec<(usize, usize)>,
}

impl NodeBuckets {
    fn build<T: Element>(path: &PathRecorder<T>, n_nodes: usize) -> Self {
        let mut starts = vec![0usize; n_nodes + 1];
        for &ix in path.nodes() {
            starts[ix + 1] += 1;
        }
        for k in 0..n_nodes {
            starts[k + 1] += starts[k];
        }

        let mut cursor = starts[..n_nodes].to_vec();
        let mut decisions = vec![(0usize, 0usize); path.n_decisions()];
        for example in 0..path.n_examples() {
            for j in path.range(example) {
                let ix = path.nodes()[j];
                decisions[cursor[ix]] = (example, j);
                cursor[ix] += 1;
            }
        }

        Self { starts, decisions }
    }

    #[inline]
    fn decisions(&self, node: usize) -> &[(usize, usize)] {
        &self.decisions[self.starts[node]..self.starts[node + 1]]
    }
}
