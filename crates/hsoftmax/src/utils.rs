//! Parallelism configuration shared by the kernels.
//!
//! The kernels never build thread pools themselves. They take a [`Parallelism`]
//! flag and use `rayon` when it allows them to. Pools are owned by an
//! [`Executor`], which the layer creates once from its configured thread count.

use rayon::prelude::*;

// =============================================================================
// Parallelism
// =============================================================================

/// Whether a kernel may fan out over the current `rayon` pool.
///
/// The flag only permits parallel work; the pool itself comes from the
/// caller, usually an [`Executor`]. Results do not depend on the flag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Parallelism {
    /// Run on the calling thread.
    #[default]
    Sequential,
    /// Split examples (or node rows) across the current pool.
    Parallel,
}

impl Parallelism {
    /// Map a configured thread count to a flag.
    ///
    /// `1` is sequential, any larger count is parallel, and `0` defers to the
    /// size of the pool the call runs in.
    #[inline]
    pub fn from_threads(n_threads: usize) -> Self {
        match n_threads {
            1 => Parallelism::Sequential,
            0 if rayon::current_num_threads() == 1 => Parallelism::Sequential,
            _ => Parallelism::Parallel,
        }
    }

    #[inline]
    pub fn is_parallel(self) -> bool {
        self == Parallelism::Parallel
    }

    /// Apply `f` to every item, keeping input order in the result.
    ///
    /// The forward pass feeds this one work item per example.
    #[inline]
    pub fn maybe_par_map<T, B, I, F>(self, items: I, f: F) -> Vec<B>
    where
        T: Send,
        B: Send,
        I: IntoIterator<Item = T> + IntoParallelIterator<Item = T>,
        F: Fn(T) -> B + Sync + Send,
    {
        match self {
            Parallelism::Parallel => items.into_par_iter().map(f).collect(),
            Parallelism::Sequential => items.into_iter().map(f).collect(),
        }
    }
}

// =============================================================================
// Thread Pool Setup
// =============================================================================

/// Thread pool held by a layer for its whole lifetime.
///
/// `n_threads == 1` keeps no pool at all. `0` sizes the pool to the machine
/// when the global pool is parallel; other counts are used as given.
#[derive(Debug)]
pub struct Executor {
    pool: Option<rayon::ThreadPool>,
}

impl Executor {
    /// Build the pool for `n_threads`.
    ///
    /// If the pool cannot be created the executor runs sequentially.
    pub fn new(n_threads: usize) -> Self {
        let pool = match Parallelism::from_threads(n_threads) {
            Parallelism::Sequential => None,
            Parallelism::Parallel => {
                match rayon::ThreadPoolBuilder::new().num_threads(n_threads).build() {
                    Ok(pool) => Some(pool),
                    Err(err) => {
                        tracing::warn!(%err, n_threads, "thread pool unavailable, running sequentially");
                        None
                    }
                }
            }
        };
        Self { pool }
    }

    /// The parallelism closures run under [`install`](Self::install) receive.
    #[inline]
    pub fn parallelism(&self) -> Parallelism {
        if self.pool.is_some() {
            Parallelism::Parallel
        } else {
            Parallelism::Sequential
        }
    }

    /// Number of worker threads, 1 when sequential.
    pub fn n_threads(&self) -> usize {
        self.pool.as_ref().map_or(1, |pool| pool.current_num_threads())
    }

    /// Run `f` inside the pool (or on the calling thread when sequential).
    #[inline]
    pub fn install<R: Send>(&self, f: impl FnOnce(Parallelism) -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(|| f(Parallelism::Parallel)),
            None => f(Parallelism::Sequential),
        }
    }
}

/// One-shot [`Executor`]: build a pool for `n_threads`, run `f` in it, drop it.
///
/// Useful around a single kernel call; layers keep their [`Executor`].
#[inline]
pub fn run_with_threads<T: Send>(n_threads: usize, f: impl FnOnce(Parallelism) -> T + Send) -> T {
    Executor::new(n_threads).install(f)
}
