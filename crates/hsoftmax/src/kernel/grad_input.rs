//! Input gradient: scatter the recorded decisions back onto the activations.

use ndarray::{Array2, ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2, Zip};

use crate::element::Element;
use crate::error::{check_len, HsmError};
use crate::repr::{ClassTree, PathRecorder};
use crate::utils::Parallelism;

/// Accumulate the input gradient into `grad_input`.
///
/// For every decision `j` of example `i`:
/// `grad_input[i] += grad_output[i] * values[j] * weight[nodes[j]]`.
///
/// The buffer is added to, not overwritten, so several loss terms can share it.
/// Rows are independent and run in parallel when allowed.
pub fn backward_input_into<T: Element>(
    tree: &ClassTree,
    weight: ArrayView2<'_, T>,
    path: &PathRecorder<T>,
    grad_output: ArrayView1<'_, T>,
    mut grad_input: ArrayViewMut2<'_, T>,
    parallelism: Parallelism,
) -> Result<(), HsmError> {
    check_len("weight rows", tree.n_internal(), weight.nrows())?;
    check_len("grad_output", path.n_examples(), grad_output.len())?;
    check_len("grad_input rows", path.n_examples(), grad_input.nrows())?;
    check_len("grad_input columns", weight.ncols(), grad_input.ncols())?;
    path.check_nodes(weight.nrows())?;

    let scatter = |example: usize, mut row: ArrayViewMut1<'_, T>, &g: &T| {
        let (nodes, values) = path.example(example);
        for (&ix, &value) in nodes.iter().zip(values) {
            row.scaled_add(g * value, &weight.row(ix));
        }
    };

    let rows = Zip::indexed(grad_input.rows_mut()).and(grad_output);
    if parallelism.is_parallel() {
        rows.par_for_each(scatter);
    } else {
        rows.for_each(scatter);
    }

    tracing::debug!(
        n_examples = path.n_examples(),
        n_decisions = path.n_decisions(),
        "input gradient accumulated"
    );
    Ok(())
}

/// Allocating variant of [`backward_input_into`], starting from zeros.
pub fn backward_input<T: Element>(
    tree: &ClassTree,
    weight: ArrayView2<'_, T>,
    path: &PathRecorder<T>,
    grad_output: ArrayView1<'_, T>,
    parallelism: Parallelism,
) -> Result<Array2<T>, HsmError> {
    let mut grad_input = Array2::zeros((path.n_examples(), weight.ncols()));
    backward_input_into(
        tree,
        weight,
        path,
        grad_output,
        grad_input.view_mut(),
        parallelism,
    )?;
    Ok(grad_input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn three_leaf_tree() -> ClassTree {
        ClassTree::from_signed(3, &[4, -4, 5, -5, 0], &[1, 0]).unwrap()
    }

    #[test]
    fn test_weighted_sum_of_rows() {
        let tree = three_leaf_tree();
        let weight = array![[1.0, 2.0], [10.0, 20.0]];
        // Example 0 visits nodes 0 and 1, example 1 visits node 1.
        let path =
            PathRecorder::from_one_based(&[1, 3, 4], &[4, 5, 5], vec![0.5, -0.25, 2.0], 3).unwrap();
        let grad_output = array![2.0, -1.0];

        let grad_input =
            backward_input(&tree, weight.view(), &path, grad_output.view(), Parallelism::Sequential)
                .unwrap();

        // 2 * (0.5 * [1, 2] - 0.25 * [10, 20]) = [-4, -8]
        assert_abs_diff_eq!(grad_input, array![[-4.0, -8.0], [-20.0, -40.0]], epsilon = 1e-12);
    }

    #[test]
    fn test_accumulates_into_existing_content() {
        let tree = three_leaf_tree();
        let weight = array![[1.0f32, 0.0], [0.0, 1.0]];
        let path = PathRecorder::from_one_based(&[1, 2], &[5], vec![1.0f32], 3).unwrap();
        let mut grad_input = array![[3.0f32, 3.0]];

        backward_input_into(
            &tree,
            weight.view(),
            &path,
            array![1.0f32].view(),
            grad_input.view_mut(),
            Parallelism::Sequential,
        )
        .unwrap();

        assert_eq!(grad_input, array![[3.0f32, 4.0]]);
    }

    #[test]
    fn test_rejects_grad_output_length() {
        let tree = three_leaf_tree();
        let weight = Array2::<f64>::zeros((2, 2));
        let path = PathRecorder::from_one_based(&[1, 2], &[5], vec![1.0], 3).unwrap();
        let err = backward_input(
            &tree,
            weight.view(),
            &path,
            array![1.0, 2.0].view(),
            Parallelism::Sequential,
        )
        .unwrap_err();
        assert_eq!(
            err,
            HsmError::ShapeMismatch {
                what: "grad_output",
                expected: 1,
                actual: 2
            }
        );
    }
}
