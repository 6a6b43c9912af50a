//! A small SIMT device model.
//!
//! The model follows the usual GPU hierarchy: `WARP_SIZE` lanes execute in
//! lock-step and exchange register values through shuffles; warps are grouped
//! into blocks; a grid of blocks is handed to a scheduler that runs them in
//! arbitrary order. Blocks are the unit of preemption: each block executes
//! on one thread of a `rayon` pool and races against the other blocks through
//! real `std::sync::atomic` operations, so cross-block protocols (status
//! cells, claim counters, spin-waits) are exercised under genuine
//! concurrency. Lanes of a warp are evaluated as a vector of registers
//! ([`Lanes`]), which makes intra-warp lock-step exact by construction.

mod grid;
mod mem;
mod warp;

pub use grid::{BlockCtx, Grid, LaunchError, LaunchOptions};
pub use mem::{atomic_inc_wrap, device_fence, SharedCell, SharedWriteSlice};
pub use warp::{ballot, Lanes, WARP_SIZE};
