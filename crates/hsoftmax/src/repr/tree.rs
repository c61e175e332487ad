//! Class hierarchy descriptor.
//!
//! A [`ClassTree`] arranges the output classes as leaves of a binary tree.
//! Items `0..n_leaves` are leaves; items `n_leaves..n_items` are internal
//! nodes, each holding one logistic decision (a weight row and a bias).
//! Every item knows its parent through a [`ParentLink`]; the root has none.
//!
//! # External encoding
//!
//! Hosts exchange trees as three arrays, which [`ClassTree::from_signed`]
//! accepts and [`ClassTree::to_signed`] produces:
//!
//! - `parents[item]`: 1-based item index of the parent, negated for the right
//!   branch, `0` for the root;
//! - `depth[k]`: depth of internal node `k` (root = 0), used to size paths;
//! - `n_leaves`.
//!
//! The same encoding is used for serde, so a tree stored as JSON reads
//! `{"n_leaves": 3, "parents": [4, -4, 5, -5, 0], "depth": [1, 0]}`.

use serde::{Deserialize, Serialize};

use crate::element::Element;

// ============================================================================
// Branch / ParentLink
// ============================================================================

/// Which child of its parent an item is.
///
/// `Left` is stored as a positive parent index, `Right` as a negative one.
/// The probability of following `Left` at a node with score `z` is
/// `σ(-z)`, and of following `Right` is `σ(z)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Branch {
    Left,
    Right,
}

impl Branch {
    /// Branch encoded by the sign of a signed parent index.
    #[inline]
    pub fn from_sign(signed: i64) -> Self {
        if signed < 0 {
            Branch::Right
        } else {
            Branch::Left
        }
    }

    /// `+1` for `Left`, `-1` for `Right`.
    #[inline]
    pub fn signum(self) -> i64 {
        match self {
            Branch::Left => 1,
            Branch::Right => -1,
        }
    }

    /// [`signum`](Self::signum) in the element type.
    #[inline]
    pub fn sign<T: Element>(self) -> T {
        match self {
            Branch::Left => T::one(),
            Branch::Right => -T::one(),
        }
    }
}

/// Edge from an item to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParentLink {
    /// 0-based item index of the parent.
    pub node: usize,
    /// Side of the parent the child hangs on.
    pub branch: Branch,
}

impl ParentLink {
    pub fn new(node: usize, branch: Branch) -> Self {
        Self { node, branch }
    }

    /// Decode a signed 1-based parent index; `0` means no parent.
    #[inline]
    pub fn decode(signed: i64) -> Option<Self> {
        if signed == 0 {
            return None;
        }
        Some(Self {
            node: (signed.unsigned_abs() - 1) as usize,
            branch: Branch::from_sign(signed),
        })
    }

    /// Inverse of [`decode`](Self::decode).
    #[inline]
    pub fn encode(link: Option<Self>) -> i64 {
        match link {
            None => 0,
            Some(link) => link.branch.signum() * (link.node as i64 + 1),
        }
    }
}

// ============================================================================
// TreeValidationError
// ============================================================================

/// Structural errors in a [`ClassTree`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeValidationError {
    #[error("tree must have at least one leaf")]
    NoLeaves,

    #[error("tree with {n_leaves} leaves has no internal nodes")]
    NoInternalNodes { n_leaves: usize },

    #[error("depth has {actual} entries, expected one per internal node ({expected})")]
    DepthLenMismatch { expected: usize, actual: usize },

    #[error("internal node {node} has negative depth {depth}")]
    NegativeDepth { node: usize, depth: i64 },

    #[error("internal node {node} has depth {depth}, deeper than {n_internal} internal nodes allow")]
    DepthOutOfRange {
        node: usize,
        depth: usize,
        n_internal: usize,
    },

    #[error("item {item} has parent {parent}, beyond the {n_items} items of the tree")]
    ParentOutOfRange {
        item: usize,
        parent: i64,
        n_items: usize,
    },

    #[error("item {item} has leaf {parent} as its parent")]
    LeafParent { item: usize, parent: usize },

    #[error("leaf {leaf} has no parent")]
    DetachedLeaf { leaf: usize },

    #[error("path from leaf {leaf} has {actual} decisions, depth implies {expected}")]
    PathLengthMismatch {
        leaf: usize,
        expected: usize,
        actual: usize,
    },

    #[error("walking up from leaf {leaf} never reaches the root")]
    CycleDetected { leaf: usize },
}

// ============================================================================
// ClassTree
// ============================================================================

/// Read-only description of the class hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SignedTree", into = "SignedTree")]
pub struct ClassTree {
    n_leaves: usize,
    parents: Box<[Option<ParentLink>]>,
    depth: Box<[usize]>,
}

/// A [`ClassTree`] in the external signed encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTree {
    pub n_leaves: usize,
    pub parents: Vec<i64>,
    pub depth: Vec<i64>,
}

impl ClassTree {
    /// Create a tree from decoded parent links.
    ///
    /// Only checks what indexing and path sizing need: at least one leaf and
    /// one internal node, one depth below `n_internal` per internal node,
    /// parents inside the item range.
    /// Parents that resolve to leaves are accepted here and reported when a
    /// path through them is walked, or by [`validate`](Self::validate).
    pub fn new(
        n_leaves: usize,
        parents: Vec<Option<ParentLink>>,
        depth: Vec<usize>,
    ) -> Result<Self, TreeValidationError> {
        if n_leaves == 0 {
            return Err(TreeValidationError::NoLeaves);
        }
        let n_items = parents.len();
        if n_items <= n_leaves {
            return Err(TreeValidationError::NoInternalNodes { n_leaves });
        }
        let n_internal = n_items - n_leaves;
        if depth.len() != n_internal {
            return Err(TreeValidationError::DepthLenMismatch {
                expected: n_internal,
                actual: depth.len(),
            });
        }
        // A root-to-leaf path visits each internal node at most once.
        if let Some((node, &d)) = depth.iter().enumerate().find(|&(_, &d)| d >= n_internal) {
            return Err(TreeValidationError::DepthOutOfRange {
                node,
                depth: d,
                n_internal,
            });
        }
        for (item, link) in parents.iter().enumerate() {
            if let Some(link) = link {
                if link.node >= n_items {
                    return Err(TreeValidationError::ParentOutOfRange {
                        item,
                        parent: ParentLink::encode(Some(*link)),
                        n_items,
                    });
                }
            }
        }

        Ok(Self {
            n_leaves,
            parents: parents.into_boxed_slice(),
            depth: depth.into_boxed_slice(),
        })
    }

    /// Create a tree from the external signed encoding.
    pub fn from_signed(
        n_leaves: usize,
        parents: &[i64],
        depth: &[i64],
    ) -> Result<Self, TreeValidationError> {
        let n_items = parents.len();
        let links = parents
            .iter()
            .enumerate()
            .map(|(item, &signed)| {
                if signed.unsigned_abs() > n_items as u64 {
                    Err(TreeValidationError::ParentOutOfRange {
                        item,
                        parent: signed,
                        n_items,
                    })
                } else {
                    Ok(ParentLink::decode(signed))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        let depth = depth
            .iter()
            .enumerate()
            .map(|(node, &d)| {
                usize::try_from(d).map_err(|_| TreeValidationError::NegativeDepth { node, depth: d })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(n_leaves, links, depth)
    }

    /// Convert to the external signed encoding.
    pub fn to_signed(&self) -> SignedTree {
        SignedTree {
            n_leaves: self.n_leaves,
            parents: self.parents.iter().map(|&link| ParentLink::encode(link)).collect(),
            depth: self.depth.iter().map(|&d| d as i64).collect(),
        }
    }

    /// Number of leaves (classes).
    #[inline]
    pub fn n_leaves(&self) -> usize {
        self.n_leaves
    }

    /// Number of internal nodes (rows of the weight matrix).
    #[inline]
    pub fn n_internal(&self) -> usize {
        self.depth.len()
    }

    /// Leaves plus internal nodes.
    #[inline]
    pub fn n_items(&self) -> usize {
        self.parents.len()
    }

    /// Parent of `item`, `None` for the root.
    ///
    /// # Panics
    /// Panics if `item >= n_items()`.
    #[inline]
    pub fn parent(&self, item: usize) -> Option<ParentLink> {
        self.parents[item]
    }

    /// Depth of internal node `node` (0-based over internal nodes).
    ///
    /// # Panics
    /// Panics if `node >= n_internal()`.
    #[inline]
    pub fn depth(&self, node: usize) -> usize {
        self.depth[node]
    }

    /// Internal-node index of `item`, `None` for leaves.
    #[inline]
    pub fn internal_index(&self, item: usize) -> Option<usize> {
        item.checked_sub(self.n_leaves)
    }

    /// Number of decisions on the path from `leaf`, as implied by the depth
    /// of its first ancestor.
    ///
    /// `None` if the leaf has no parent or its parent is not an internal node.
    pub fn path_len(&self, leaf: usize) -> Option<usize> {
        let first = self.parent(leaf)?;
        self.internal_index(first.node).map(|ix| self.depth(ix) + 1)
    }

    /// Iterate the parent links from `leaf` up to the root.
    ///
    /// Does not check the tree; on a cyclic descriptor this never ends.
    /// Use [`validate`](Self::validate) first for untrusted input.
    pub fn ancestors(&self, leaf: usize) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.parent(leaf),
        }
    }

    /// Check that every leaf reaches the root in exactly
    /// `depth[first ancestor] + 1` decisions, passing only through internal
    /// nodes.
    pub fn validate(&self) -> Result<(), TreeValidationError> {
        let n_internal = self.n_internal();

        for leaf in 0..self.n_leaves {
            let first = self
                .parent(leaf)
                .ok_or(TreeValidationError::DetachedLeaf { leaf })?;
            let first_ix = self
                .internal_index(first.node)
                .ok_or(TreeValidationError::LeafParent {
                    item: leaf,
                    parent: first.node,
                })?;
            let expected = self.depth(first_ix) + 1;

            let mut child = leaf;
            let mut steps = 0usize;
            let mut current = Some(first);
            while let Some(link) = current {
                if link.node < self.n_leaves {
                    return Err(TreeValidationError::LeafParent {
                        item: child,
                        parent: link.node,
                    });
                }
                steps += 1;
                if steps > n_internal {
                    return Err(TreeValidationError::CycleDetected { leaf });
                }
                child = link.node;
                current = self.parent(link.node);
            }

            if steps != expected {
                return Err(TreeValidationError::PathLengthMismatch {
                    leaf,
                    expected,
                    actual: steps,
                });
            }
        }

        Ok(())
    }
}

impl TryFrom<SignedTree> for ClassTree {
    type Error = TreeValidationError;

    fn try_from(value: SignedTree) -> Result<Self, Self::Error> {
        Self::from_signed(value.n_leaves, &value.parents, &value.depth)
    }
}

impl From<ClassTree> for SignedTree {
    fn from(tree: ClassTree) -> Self {
        tree.to_signed()
    }
}

/// Iterator returned by [`ClassTree::ancestors`].
#[derive(Debug, Clone)]
pub struct Ancestors<'a> {
    tree: &'a ClassTree,
    next: Option<ParentLink>,
}

impl Iterator for Ancestors<'_> {
    type Item = ParentLink;

    fn next(&mut self) -> Option<Self::Item> {
        let link = self.next?;
        self.next = self.tree.parent(link.node);
        Some(link)
    }
}
