pub mod criterion_config;

/// Thread counts swept by the parallel benchmarks.
pub const THREAD_COUNTS: &[usize] = &[1, 2, 4, 8];
