use std::thread;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::warp::WARP_SIZE;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("a grid must contain at least one block")]
    EmptyGrid,
    #[error("block dimension {0} is not a positive multiple of the warp width {WARP_SIZE}")]
    BadBlockDim(usize),
}

/// Execution context handed to a kernel, one per block.
pub struct BlockCtx {
    grid_dim: usize,
    block_dim: usize,
    block_index: usize,
}

impl BlockCtx {
    /// Number of blocks in the launch.
    pub fn grid_dim(&self) -> usize {
        self.grid_dim
    }

    /// Number of threads per block.
    pub fn block_dim(&self) -> usize {
        self.block_dim
    }

    /// Number of warps per block.
    pub fn nwarps(&self) -> usize {
        self.block_dim / WARP_SIZE
    }

    /// The scheduler's block index. Blocks are dispatched in arbitrary
    /// order, so this says nothing about which blocks have already run;
    /// protocols that need an ordering must claim their own id.
    pub fn block_index(&self) -> usize {
        self.block_index
    }

    /// Block-wide barrier. Warps of a block are evaluated in program order
    /// by the executor, so the barrier is a sequencing point; it is kept so
    /// kernels read like their device equivalents.
    #[inline]
    pub fn sync_threads(&self) {}
}

/// Scheduler controls for one launch.
///
/// The defaults dispatch blocks in index order onto the thread pool, which
/// is already racy; the knobs below make the order adversarial on purpose.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    /// Shuffle the dispatch order of blocks with this seed.
    pub shuffle_seed: Option<u64>,
    /// Upper bound for a random per-block startup delay. Zero disables the
    /// delay. Delays are derived from `shuffle_seed`.
    pub max_start_delay: Duration,
}

/// A launch shape: `grid_dim` blocks of `block_dim` threads.
#[derive(Debug, Clone, Copy)]
pub struct Grid {
    grid_dim: usize,
    block_dim: usize,
}

impl Grid {
    pub fn new(grid_dim: usize, block_dim: usize) -> Result<Self, LaunchError> {
        if grid_dim == 0 {
            return Err(LaunchError::EmptyGrid);
        }
        if block_dim == 0 || block_dim % WARP_SIZE != 0 {
            return Err(LaunchError::BadBlockDim(block_dim));
        }
        Ok(Self {
            grid_dim,
            block_dim,
        })
    }

    pub fn grid_dim(&self) -> usize {
        self.grid_dim
    }

    pub fn block_dim(&self) -> usize {
        self.block_dim
    }

    /// Runs `kernel` once per block and returns when the whole grid has
    /// finished.
    ///
    /// Blocks are spawned onto the `rayon` pool, possibly fewer workers than
    /// blocks. A spawned block runs to completion on its worker, so a kernel
    /// may spin on state published by any block spawned before it, but must
    /// not wait on blocks that have not started. This is the usual
    /// forward-progress contract of a hardware scheduler.
    pub fn launch<F>(&self, options: &LaunchOptions, kernel: F)
    where
        F: Fn(&BlockCtx) + Sync,
    {
        let grid_dim = self.grid_dim;
        let block_dim = self.block_dim;

        let mut order: Vec<usize> = (0..grid_dim).collect();
        let seed = options.shuffle_seed.unwrap_or(0);
        if options.shuffle_seed.is_some() {
            order.shuffle(&mut StdRng::seed_from_u64(seed));
        }

        let mut delays = vec![Duration::ZERO; grid_dim];
        if !options.max_start_delay.is_zero() {
            let mut rng = StdRng::seed_from_u64(seed ^ 0x9e37_79b9_7f4a_7c15);
            let max_us = options.max_start_delay.as_micros() as u64;
            for delay in delays.iter_mut() {
                *delay = Duration::from_micros(rng.gen_range(0..=max_us));
            }
        }

        log::trace!("launching {grid_dim} blocks of {block_dim} threads");

        let kernel = &kernel;
        rayon::scope(|scope| {
            for block_index in order {
                let delay = delays[block_index];
                scope.spawn(move |_| {
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    kernel(&BlockCtx {
                        grid_dim,
                        block_dim,
                        block_index,
                    });
                });
            }
        });
    }
}
