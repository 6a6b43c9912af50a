//! Host-side orchestration: geometry, scratch, launch, and the public
//! entry points.

use std::sync::atomic::AtomicU32;

use scan_kernel::{scan_block, BlockStatus, ScanKind, ScanValue, Scratch, INVALID};
use simt::{Grid, LaunchOptions, SharedCell, SharedWriteSlice, WARP_SIZE};
use thiserror::Error;

/// Default number of warps per block.
pub const DEFAULT_WARPS_PER_BLOCK: usize = 4;
/// Default number of chunks each block processes.
pub const DEFAULT_CHUNKS_PER_BLOCK: usize = 12;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("a block must hold between 1 and {WARP_SIZE} warps, got {0}")]
    BadWarpsPerBlock(usize),
    #[error("a block must process at least one chunk")]
    ZeroChunks,
    #[error(transparent)]
    Launch(#[from] simt::LaunchError),
}

/// Block geometry for one scan: how many warps per block and how many
/// chunks of `block_dim` elements each block owns. Fixed for the duration
/// of a call.
#[derive(Debug, Clone, Copy)]
pub struct Geometry {
    warps_per_block: usize,
    chunks_per_block: usize,
}

impl Geometry {
    pub fn new(warps_per_block: usize, chunks_per_block: usize) -> Result<Self, ScanError> {
        // The warp-of-warp-sums scan runs inside a single warp, so a block
        // cannot hold more warps than a warp has lanes.
        if !(1..=WARP_SIZE).contains(&warps_per_block) {
            return Err(ScanError::BadWarpsPerBlock(warps_per_block));
        }
        if chunks_per_block == 0 {
            return Err(ScanError::ZeroChunks);
        }
        Ok(Self {
            warps_per_block,
            chunks_per_block,
        })
    }

    pub fn warps_per_block(&self) -> usize {
        self.warps_per_block
    }

    pub fn chunks_per_block(&self) -> usize {
        self.chunks_per_block
    }

    /// Threads per block.
    pub fn block_dim(&self) -> usize {
        self.warps_per_block * WARP_SIZE
    }

    /// Elements owned by one block.
    pub fn elems_per_block(&self) -> usize {
        self.block_dim() * self.chunks_per_block
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            warps_per_block: DEFAULT_WARPS_PER_BLOCK,
            chunks_per_block: DEFAULT_CHUNKS_PER_BLOCK,
        }
    }
}

/// Computes the prefix sum of `fin(0), ..., fin(n-1)` in a single pass,
/// delivering the scanned value for each index through `fout` exactly once.
/// The return value is the total sum, for both scan kinds.
pub fn prefix_sum<T, Fin, Fout>(
    n: usize,
    fin: Fin,
    fout: Fout,
    kind: ScanKind,
) -> Result<T, ScanError>
where
    T: ScanValue,
    Fin: Fn(usize) -> T + Sync,
    Fout: Fn(usize, T) + Sync,
{
    prefix_sum_with::<T, T::Status, _, _>(
        Geometry::default(),
        &LaunchOptions::default(),
        n,
        fin,
        fout,
        kind,
    )
}

/// [`prefix_sum`] with explicit geometry, scheduler options, and status-cell
/// layout. The layout is a type parameter so the packed and unpacked cells
/// can be exercised on the same element type.
pub fn prefix_sum_with<T, S, Fin, Fout>(
    geometry: Geometry,
    options: &LaunchOptions,
    n: usize,
    fin: Fin,
    fout: Fout,
    kind: ScanKind,
) -> Result<T, ScanError>
where
    T: ScanValue,
    S: BlockStatus<T>,
    Fin: Fn(usize) -> T + Sync,
    Fout: Fn(usize, T) + Sync,
{
    if n == 0 {
        return Ok(T::zero());
    }
    assert!(n < 1 << 31, "scan length must be below 2^31, got {n}");

    let nblocks = n.div_ceil(geometry.elems_per_block());
    let grid = Grid::new(nblocks, geometry.block_dim())?;
    log::debug!(
        "scanning {n} elements: {nblocks} blocks of {} threads, {} chunks per block",
        geometry.block_dim(),
        geometry.chunks_per_block,
    );

    // Scratch for this call: one status cell per block, the id counter,
    // and the total-sum sink.
    let mut status: Vec<S> = (0..nblocks).map(|_| S::default()).collect();
    for cell in status.iter_mut() {
        cell.set_status(INVALID);
    }
    let virtual_block_id = AtomicU32::new(0);
    let mut total_sum = SharedCell::new(T::zero());

    let scratch = Scratch {
        status: &status,
        virtual_block_id: &virtual_block_id,
        total_sum: &total_sum,
    };
    grid.launch(options, |ctx| {
        scan_block(
            ctx,
            n,
            kind,
            geometry.chunks_per_block,
            &scratch,
            &fin,
            &fout,
        )
    });

    Ok(*total_sum.get_mut())
}

/// Inclusive scan of `input` into `output`. The return value is the total
/// sum.
pub fn inclusive_sum<T: ScanValue>(input: &[T], output: &mut [T]) -> Result<T, ScanError> {
    assert_eq!(input.len(), output.len());
    let out = SharedWriteSlice::new(output);
    prefix_sum(
        input.len(),
        |i| input[i],
        |i, x| unsafe { out.write(i, x) },
        ScanKind::Inclusive,
    )
}

/// Exclusive scan of `input` into `output`. The return value is the total
/// sum.
pub fn exclusive_sum<T: ScanValue>(input: &[T], output: &mut [T]) -> Result<T, ScanError> {
    assert_eq!(input.len(), output.len());
    let out = SharedWriteSlice::new(output);
    prefix_sum(
        input.len(),
        |i| input[i],
        |i, x| unsafe { out.write(i, x) },
        ScanKind::Exclusive,
    )
}
