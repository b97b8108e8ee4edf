// src/kernel_loop.rs
//! Parallel dispatch over a flat index space.
//!
//! A launch runs one body invocation per index in `0..nthreads`. Indices are
//! independent and run in no particular order; the body cannot tell which
//! loop is driving it.

use std::sync::Arc;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::config::Schedule;
use crate::error::Result;

pub trait KernelLoop {
    /// Runs `body(index)` for every `index` in `0..nthreads`.
    fn launch<F>(&self, nthreads: usize, body: F)
    where
        F: Fn(usize) + Send + Sync;

    fn name(&self) -> &'static str;
}

/// Plain sequential loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialLoop;

impl KernelLoop for SerialLoop {
    fn launch<F>(&self, nthreads: usize, body: F)
    where
        F: Fn(usize) + Send + Sync,
    {
        for index in 0..nthreads {
            body(index);
        }
    }

    fn name(&self) -> &'static str {
        "serial"
    }
}

/// Data-parallel loop on a rayon pool.
#[derive(Debug, Clone, Default)]
pub struct ThreadLoop {
    pool: Option<Arc<ThreadPool>>,
}

impl ThreadLoop {
    /// Loop on rayon's global pool.
    pub fn new() -> Self {
        Self { pool: None }
    }

    /// Loop on a dedicated pool of `num_threads` workers.
    pub fn with_threads(num_threads: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("mobula-worker-{i}"))
            .build()?;
        Ok(Self { pool: Some(Arc::new(pool)) })
    }

    pub fn num_threads(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }
}

impl KernelLoop for ThreadLoop {
    fn launch<F>(&self, nthreads: usize, body: F)
    where
        F: Fn(usize) + Send + Sync,
    {
        let run = || (0..nthreads).into_par_iter().for_each(|index| body(index));
        match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        }
    }

    fn name(&self) -> &'static str {
        "threads"
    }
}

/// CPU emulation of a GPU launch grid.
///
/// `ceil(nthreads / block_dim)` blocks run in parallel; every lane derives its
/// global index from `(block, lane)` and drops out once past `nthreads`, the
/// same guard a GPU kernel uses when the grid overshoots.
#[derive(Debug, Clone, Copy)]
pub struct GridLoop {
    block_dim: usize,
}

impl GridLoop {
    pub const DEFAULT_BLOCK_DIM: usize = 256;

    /// A `block_dim` of zero is bumped to one.
    pub fn new(block_dim: usize) -> Self {
        Self { block_dim: block_dim.max(1) }
    }

    pub fn block_dim(&self) -> usize {
        self.block_dim
    }

    pub fn grid_dim(&self, nthreads: usize) -> usize {
        nthreads.div_ceil(self.block_dim)
    }
}

impl Default for GridLoop {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BLOCK_DIM)
    }
}

impl KernelLoop for GridLoop {
    fn launch<F>(&self, nthreads: usize, body: F)
    where
        F: Fn(usize) + Send + Sync,
    {
        let block_dim = self.block_dim;
        (0..self.grid_dim(nthreads)).into_par_iter().for_each(|block| {
            for lane in 0..block_dim {
                let index = block * block_dim + lane;
                if index >= nthreads {
                    return;
                }
                body(index);
            }
        });
    }

    fn name(&self) -> &'static str {
        "grid"
    }
}

/// Loop picked from [`Schedule`] at startup.
#[derive(Debug, Clone)]
pub enum CpuLoop {
    Serial(SerialLoop),
    Threads(ThreadLoop),
    Grid(GridLoop),
}

impl CpuLoop {
    pub fn from_schedule(
        schedule: Schedule,
        num_threads: Option<usize>,
        block_dim: usize,
    ) -> Result<Self> {
        Ok(match schedule {
            Schedule::Serial => CpuLoop::Serial(SerialLoop),
            Schedule::Threads => match num_threads {
                Some(n) => CpuLoop::Threads(ThreadLoop::with_threads(n)?),
                None => CpuLoop::Threads(ThreadLoop::new()),
            },
            Schedule::Grid => CpuLoop::Grid(GridLoop::new(block_dim)),
        })
    }
}

impl Default for CpuLoop {
    fn default() -> Self {
        CpuLoop::Threads(ThreadLoop::new())
    }
}

impl KernelLoop for CpuLoop {
    fn launch<F>(&self, nthreads: usize, body: F)
    where
        F: Fn(usize) + Send + Sync,
    {
        match self {
            CpuLoop::Serial(l) => l.launch(nthreads, body),
            CpuLoop::Threads(l) => l.launch(nthreads, body),
            CpuLoop::Grid(l) => l.launch(nthreads, body),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            CpuLoop::Serial(l) => l.name(),
            CpuLoop::Threads(l) => l.name(),
            CpuLoop::Grid(l) => l.name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn visit_counts<L: KernelLoop>(l: &L, nthreads: usize) -> Vec<usize> {
        let hits: Vec<AtomicUsize> = (0..nthreads).map(|_| AtomicUsize::new(0)).collect();
        l.launch(nthreads, |i| {
            hits[i].fetch_add(1, Ordering::Relaxed);
        });
        hits.into_iter().map(AtomicUsize::into_inner).collect()
    }

    #[test]
    fn every_loop_visits_each_index_once() {
        for n in [0, 1, 7, 256, 1000] {
            assert!(visit_counts(&SerialLoop, n).iter().all(|&c| c == 1));
            assert!(visit_counts(&ThreadLoop::new(), n).iter().all(|&c| c == 1));
            assert!(visit_counts(&GridLoop::new(64), n).iter().all(|&c| c == 1));
        }
    }

    #[test]
    fn grid_overshoot_is_guarded() {
        let grid = GridLoop::new(32);
        assert_eq!(grid.grid_dim(33), 2);
        let counts = visit_counts(&grid, 33);
        assert_eq!(counts.len(), 33);
        assert!(counts.iter().all(|&c| c == 1));
    }

    #[test]
    fn zero_block_dim_is_clamped() {
        assert_eq!(GridLoop::new(0).block_dim(), 1);
    }

    #[test]
    fn dedicated_pool_reports_its_size() {
        let l = ThreadLoop::with_threads(2).unwrap();
        assert_eq!(l.num_threads(), 2);
        assert!(visit_counts(&l, 100).iter().all(|&c| c == 1));
    }

    #[test]
    fn schedule_selects_loop() {
        let l = CpuLoop::from_schedule(Schedule::Grid, None, 16).unwrap();
        assert_eq!(l.name(), "grid");
        let l = CpuLoop::from_schedule(Schedule::Serial, Some(4), 16).unwrap();
        assert_eq!(l.name(), "serial");
    }
}
