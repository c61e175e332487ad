//! Forward pass: log-probability of each target leaf.
//!
//! For every example the walk starts at the target leaf and follows parent
//! links to the root. Each internal node `k` on the way contributes one
//! logistic decision with score `z = weight[k] · x + bias[k]`; taking the
//! branch with sign `s` has probability `1 / p` where `p = 1 + exp(s · z)`.
//! The output is `Σ -ln(p)` over the path, and each decision records
//! `s · (1/p - 1)`, the derivative of that sum with respect to `z`.
//!
//! Sizing is count-then-fill: path lengths come from the depth of the first
//! ancestor, the recorder is sized once, and every example fills its own
//! slice. A walk that disagrees with its pre-sized slice is a structural error.

use ndarray::{Array1, ArrayView1, ArrayView2, ArrayViewMut1};

use crate::data::NodeParams;
use crate::element::Element;
use crate::error::{check_len, HsmError};
use crate::repr::{ClassTree, ParentLink, PathError, PathRecorder};

use super::ForwardOptions;

/// Compute per-example log-probabilities into `output` and record the paths.
///
/// # Arguments
///
/// * `tree` - Class hierarchy
/// * `params` - Node weights `[n_internal, n_features]` and biases `[n_internal]`
/// * `input` - Activations `[n_examples, n_features]`
/// * `targets` - 1-based target leaf per example
/// * `output` - `[n_examples]`, overwritten with `ln P(target | x)`
/// * `path` - Recorder, resized and overwritten
///
/// # Errors
///
/// An invalid score clamp, shape mismatches, out-of-range targets and
/// structural inconsistencies of the tree abort the whole batch. `path` is cleared and `output` is
/// unspecified after an error.
pub fn forward_into<T: Element>(
    tree: &ClassTree,
    params: &NodeParams<'_, T>,
    input: ArrayView2<'_, T>,
    targets: &[i64],
    output: ArrayViewMut1<'_, T>,
    path: &mut PathRecorder<T>,
    options: &ForwardOptions,
) -> Result<(), HsmError> {
    let result = forward_impl(tree, params, input, targets, output, path, options);
    if result.is_err() {
        path.clear();
    }
    result
}

/// Allocating variant of [`forward_into`].
///
/// Returns the log-probabilities and a fresh [`PathRecorder`].
pub fn forward<T: Element>(
    tree: &ClassTree,
    params: &NodeParams<'_, T>,
    input: ArrayView2<'_, T>,
    targets: &[i64],
    options: &ForwardOptions,
) -> Result<(Array1<T>, PathRecorder<T>), HsmError> {
    let mut output = Array1::zeros(input.nrows());
    let mut path = PathRecorder::new();
    forward_into(tree, params, input, targets, output.view_mut(), &mut path, options)?;
    Ok((output, path))
}

fn forward_impl<T: Element>(
    tree: &ClassTree,
    params: &NodeParams<'_, T>,
    input: ArrayView2<'_, T>,
    targets: &[i64],
    mut output: ArrayViewMut1<'_, T>,
    path: &mut PathRecorder<T>,
    options: &ForwardOptions,
) -> Result<(), HsmError> {
    options.validate()?;
    params.check(tree)?;
    check_len("input columns", params.n_features(), input.ncols())?;
    check_len("targets", input.nrows(), targets.len())?;
    check_len("output", input.nrows(), output.len())?;

    // Count pass: resolve every target and the length of its path.
    let walks = targets
        .iter()
        .enumerate()
        .map(|(example, &target)| -> Result<(usize, usize), HsmError> {
            let leaf = leaf_index(tree, example, target)?;
            let first = tree.parent(leaf).ok_or(HsmError::DetachedLeaf { leaf })?;
            let ix = internal_index(tree, leaf, first)?;
            let len = tree
                .depth(ix)
                .checked_add(1)
                .ok_or(PathError::TooManyDecisions { example })?;
            Ok((leaf, len))
        })
        .collect::<Result<Vec<_>, HsmError>>()?;
    path.reset_for(walks.iter().map(|&(_, len)| len))?;

    // Fill pass: each example owns a disjoint slice of the recorder.
    let clamp = options.score_clamp.map(T::from_f64);
    let work: Vec<_> = path
        .example_slices_mut()
        .into_iter()
        .zip(&walks)
        .enumerate()
        .map(|(example, ((nodes, values), &(leaf, _)))| (example, leaf, nodes, values))
        .collect();

    let log_probs = options
        .parallelism
        .maybe_par_map(work, |(example, leaf, nodes, values)| {
            walk(tree, params, input.row(example), example, leaf, clamp, nodes, values)
        });

    let mut n_non_finite = 0usize;
    for (slot, log_prob) in output.iter_mut().zip(log_probs) {
        let log_prob = log_prob?;
        if !log_prob.is_finite() {
            n_non_finite += 1;
        }
        *slot = log_prob;
    }

    if n_non_finite > 0 && options.warn_non_finite {
        tracing::warn!(
            n_non_finite,
            n_examples = targets.len(),
            "hierarchical softmax produced non-finite log-probabilities; node scores overflow exp"
        );
    }
    tracing::debug!(
        n_examples = targets.len(),
        n_decisions = path.n_decisions(),
        parallel = options.parallelism.is_parallel(),
        "forward pass done"
    );

    Ok(())
}

/// Walk one example from `leaf` to the root, filling `nodes` and `values`.
#[allow(clippy::too_many_arguments)]
fn walk<T: Element>(
    tree: &ClassTree,
    params: &NodeParams<'_, T>,
    x: ArrayView1<'_, T>,
    example: usize,
    leaf: usize,
    clamp: Option<T>,
    nodes: &mut [usize],
    values: &mut [T],
) -> Result<T, HsmError> {
    let expected = nodes.len();
    let mut log_prob = T::zero();
    let mut written = 0usize;
    let mut child = leaf;
    let mut current = tree.parent(leaf);

    while let Some(link) = current {
        let ix = internal_index(tree, child, link)?;
        if written == expected {
            return Err(HsmError::PathTooLong { example, expected });
        }

        let sign = link.branch.sign::<T>();
        let mut score = params.weight.row(ix).dot(&x) + params.bias[ix];
        if let Some(c) = clamp {
            score = score.max(-c).min(c);
        }
        let partition = T::one() + (sign * score).exp();
        log_prob -= partition.ln();

        nodes[written] = ix;
        values[written] = sign * (partition.recip() - T::one());
        written += 1;

        child = link.node;
        current = tree.parent(link.node);
    }

    if written != expected {
        return Err(HsmError::PathLengthMismatch {
            example,
            expected,
            actual: written,
        });
    }
    Ok(log_prob)
}

/// 1-based target to 0-based leaf index.
#[inline]
fn leaf_index(tree: &ClassTree, example: usize, target: i64) -> Result<usize, HsmError> {
    let n_leaves = tree.n_leaves();
    if target >= 1 && (target as u64) <= n_leaves as u64 {
        Ok((target - 1) as usize)
    } else {
        Err(HsmError::TargetOutOfRange {
            example,
            target,
            n_leaves,
        })
    }
}

/// Internal-node index of `link.node`, or the structural error for `child`.
#[inline]
fn internal_index(tree: &ClassTree, child: usize, link: ParentLink) -> Result<usize, HsmError> {
    tree.internal_index(link.node)
        .ok_or(HsmError::InconsistentTree {
            item: child,
            parent: link.node,
        })
}
