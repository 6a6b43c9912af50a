//! Single-pass parallel prefix sum with decoupled look-back.
//!
//! [`prefix_sum`] computes the inclusive or exclusive scan of `n` elements
//! in one pass over the data, on a SIMT grid whose blocks may be scheduled
//! in any order. [`inclusive_sum`] and [`exclusive_sum`] are the slice
//! front-ends; [`sequential`] holds the serial fallbacks.

mod driver;
pub mod sequential;

pub use driver::{
    exclusive_sum, inclusive_sum, prefix_sum, prefix_sum_with, Geometry, ScanError,
    DEFAULT_CHUNKS_PER_BLOCK, DEFAULT_WARPS_PER_BLOCK,
};
pub use scan_kernel::{BlockStatus, PackedStatus, ScanKind, ScanValue, UnpackedStatus};
pub use simt::LaunchOptions;
