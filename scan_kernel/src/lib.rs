//! Device-side pieces of the single-pass parallel prefix sum.
//!
//! The overall algorithm is based on "Single-pass Parallel Prefix Scan with
//! Decoupled Look-back" by D. Merrill & M. Garland. Each block scans its own
//! slice of the input ([`block::scan_block`]), publishes its aggregate
//! through a lock-free status cell ([`status`]), and resolves the prefix
//! contributed by earlier blocks by walking their cells backward
//! ([`lookback`]).

pub mod block;
pub mod kogge_stone;
pub mod lookback;
pub mod status;

pub use block::{scan_block, ScanKind, Scratch};
pub use lookback::decoupled_lookback;
pub use status::{
    BlockStatus, PackedStatus, PackedValue, ScanValue, StatusValue, UnpackedStatus, AGGREGATE,
    INCLUSIVE, INVALID,
};
