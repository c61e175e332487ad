//! Per-batch record of the decisions taken by the forward pass.
//!
//! A [`PathRecorder`] is filled by [`forward_into`](crate::kernel::forward_into)
//! and read by both backward passes. It is owned by the caller and reused
//! across batches: the forward pass first counts the decisions of every
//! example, sizes the buffers once, then fills per-example slices in place.
//!
//! # Layout
//!
//! - `offsets`: `n_examples + 1` entries, `offsets[0] == 0`, non-decreasing;
//!   example `i` owns `offsets[i]..offsets[i + 1]`.
//! - `nodes`: 0-based internal-node index of each decision, leaf-to-root.
//! - `values`: `sign * (1 / p - 1)` for each decision, the derivative of the
//!   example's log-probability with respect to the node's score.
//!
//! [`one_based_offsets`](PathRecorder::one_based_offsets) and
//! [`one_based_nodes`](PathRecorder::one_based_nodes) give the 1-based view
//! hosts expect; [`from_one_based`](PathRecorder::from_one_based) reads it back.

use std::ops::Range;

use crate::element::Element;

/// Errors in an externally supplied path record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("offsets must have at least one entry")]
    EmptyOffsets,

    #[error("first offset must be 1, got {found}")]
    FirstOffset { found: i64 },

    #[error("offsets decrease at position {position}")]
    DecreasingOffsets { position: usize },

    #[error("last offset must be nodes + 1 = {expected}, got {found}")]
    LastOffset { expected: i64, found: i64 },

    #[error("{nodes} nodes but {values} values")]
    ValuesLenMismatch { nodes: usize, values: usize },

    #[error("node {node} at position {position} is not an internal item")]
    NotInternal { position: usize, node: i64 },

    #[error("decision count overflows at example {example}")]
    TooManyDecisions { example: usize },
}

/// Decisions recorded by one forward pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PathRecorder<T> {
    offsets: Vec<usize>,
    nodes: Vec<usize>,
    values: Vec<T>,
}

impl<T: Element> Default for PathRecorder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Element> PathRecorder<T> {
    /// An empty record (zero examples).
    pub fn new() -> Self {
        Self {
            offsets: vec![0],
            nodes: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Rebuild from the 1-based external layout.
    ///
    /// `nodes` holds 1-based item indices, so each must exceed `n_leaves`.
    pub fn from_one_based(
        offsets: &[i64],
        nodes: &[i64],
        values: Vec<T>,
        n_leaves: usize,
    ) -> Result<Self, PathError> {
        let (&first, &last) = match (offsets.first(), offsets.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(PathError::EmptyOffsets),
        };
        if first != 1 {
            return Err(PathError::FirstOffset { found: first });
        }
        if let Some(position) = offsets.windows(2).position(|w| w[1] < w[0]) {
            return Err(PathError::DecreasingOffsets {
                position: position + 1,
            });
        }
        let expected = nodes.len() as i64 + 1;
        if last != expected {
            return Err(PathError::LastOffset {
                expected,
                found: last,
            });
        }
        if values.len() != nodes.len() {
            return Err(PathError::ValuesLenMismatch {
                nodes: nodes.len(),
                values: values.len(),
            });
        }

        let first_internal = n_leaves as i64 + 1;
        let nodes = nodes
            .iter()
            .enumerate()
            .map(|(position, &node)| {
                if node > n_leaves as i64 {
                    Ok((node - first_internal) as usize)
                } else {
                    Err(PathError::NotInternal { position, node })
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            offsets: offsets.iter().map(|&o| (o - 1) as usize).collect(),
            nodes,
            values,
        })
    }

    /// Number of examples recorded.
    #[inline]
    pub fn n_examples(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Total number of decisions across all examples.
    #[inline]
    pub fn n_decisions(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n_examples() == 0
    }

    #[inline]
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    #[inline]
    pub fn nodes(&self) -> &[usize] {
        &self.nodes
    }

    #[inline]
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Index range of example `i` in `nodes` / `values`.
    #[inline]
    pub fn range(&self, example: usize) -> Range<usize> {
        self.offsets[example]..self.offsets[example + 1]
    }

    /// Nodes and values of example `i`.
    #[inline]
    pub fn example(&self, example: usize) -> (&[usize], &[T]) {
        let range = self.range(example);
        (&self.nodes[range.clone()], &self.values[range])
    }

    /// Offsets in the 1-based external layout (`offsets[B] - 1 == n_decisions`).
    pub fn one_based_offsets(&self) -> Vec<i64> {
        self.offsets.iter().map(|&o| o as i64 + 1).collect()
    }

    /// Nodes as 1-based item indices of a tree with `n_leaves` leaves.
    pub fn one_based_nodes(&self, n_leaves: usize) -> Vec<i64> {
        self.nodes
            .iter()
            .map(|&ix| (ix + n_leaves + 1) as i64)
            .collect()
    }

    /// Drop all examples, keeping the allocations.
    pub fn clear(&mut self) {
        self.offsets.clear();
        self.offsets.push(0);
        self.nodes.clear();
        self.values.clear();
    }

    /// Fail if any recorded node is outside `0..n_internal`.
    pub(crate) fn check_nodes(&self, n_internal: usize) -> Result<(), crate::HsmError> {
        match self.nodes.iter().find(|&&ix| ix >= n_internal) {
            Some(&node) => Err(crate::HsmError::PathNodeOutOfRange { node, n_internal }),
            None => Ok(()),
        }
    }

    /// Size the record for examples with the given path lengths.
    ///
    /// This is the count half of count-then-fill: offsets become the prefix
    /// sums of `lengths`, and `nodes` / `values` are resized once to the total.
    /// On overflow the recorder is left empty.
    pub(crate) fn reset_for(
        &mut self,
        lengths: impl IntoIterator<Item = usize>,
    ) -> Result<(), PathError> {
        self.clear();
        let mut total = 0usize;
        for (example, len) in lengths.into_iter().enumerate() {
            total = match total.checked_add(len) {
                Some(total) => total,
                None => {
                    self.clear();
                    return Err(PathError::TooManyDecisions { example });
                }
            };
            self.offsets.push(total);
        }
        self.nodes.resize(total, 0);
        self.values.resize(total, T::zero());
        Ok(())
    }

    /// Disjoint mutable `(nodes, values)` slices, one per example.
    pub(crate) fn example_slices_mut(&mut self) -> Vec<(&mut [usize], &mut [T])> {
        let mut nodes_rest = self.nodes.as_mut_slice();
        let mut values_rest = self.values.as_mut_slice();
        let mut slices = Vec::with_capacity(self.offsets.len() - 1);

        for w in self.offsets.windows(2) {
            let len = w[1] - w[0];
            let (nodes, nodes_tail) = std::mem::take(&mut nodes_rest).split_at_mut(len);
            let (values, values_tail) = std::mem::take(&mut values_rest).split_at_mut(len);
            nodes_rest = nodes_tail;
            values_rest = values_tail;
            slices.push((nodes, values));
        }

        slices
    }
}
