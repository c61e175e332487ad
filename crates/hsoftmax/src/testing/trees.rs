use std::collections::VecDeque;

use rand::prelude::*;

use crate::repr::{Branch, ClassTree, ParentLink};

/// Complete-as-possible binary tree over `n_leaves` classes.
///
/// Items are merged pairwise in FIFO order, so for a power of two every leaf
/// sits at the same depth. The first item of each merge hangs on the left.
/// A single leaf gets one internal node above it.
pub fn balanced_tree(n_leaves: usize) -> ClassTree {
    let mut queue: VecDeque<usize> = (0..n_leaves).collect();
    build(n_leaves, |parents| {
        while queue.len() > 1 {
            let left = queue.pop_front().expect("at least two items");
            let right = queue.pop_front().expect("at least two items");
            queue.push_back(merge(parents, left, right));
        }
    })
}

/// Random binary tree over `n_leaves` classes.
///
/// Repeatedly merges two items drawn from the pool of roots, which gives
/// unbalanced shapes with paths of very different lengths.
pub fn random_tree(n_leaves: usize, seed: u64) -> ClassTree {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut pool: Vec<usize> = (0..n_leaves).collect();
    build(n_leaves, |parents| {
        while pool.len() > 1 {
            let left = pool.swap_remove(rng.gen_range(0..pool.len()));
            let right = pool.swap_remove(rng.gen_range(0..pool.len()));
            pool.push(merge(parents, left, right));
        }
    })
}

fn build(n_leaves: usize, merge_all: impl FnOnce(&mut Vec<Option<ParentLink>>)) -> ClassTree {
    assert!(n_leaves > 0, "tree needs at least one leaf");
    let mut parents = vec![None; n_leaves];
    if n_leaves == 1 {
        parents[0] = Some(ParentLink::new(1, Branch::Left));
        parents.push(None);
    } else {
        merge_all(&mut parents);
    }

    let depth = (n_leaves..parents.len())
        .map(|item| {
            let mut depth = 0;
            let mut current = parents[item];
            while let Some(link) = current {
                depth += 1;
                current = parents[link.node];
            }
            depth
        })
        .collect();

    ClassTree::new(n_leaves, parents, depth).expect("generated tree is well formed")
}

/// Join `left` and `right` under a new internal node and return it.
fn merge(parents: &mut Vec<Option<ParentLink>>, left: usize, right: usize) -> usize {
    let node = parents.len();
    parents.push(None);
    parents[left] = Some(ParentLink::new(node, Branch::Left));
    parents[right] = Some(ParentLink::new(node, Branch::Right));
    node
}
