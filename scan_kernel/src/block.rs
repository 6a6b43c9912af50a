//! The per-block scan kernel.

use std::sync::atomic::AtomicU32;

use simt::{atomic_inc_wrap, BlockCtx, Lanes, SharedCell, WARP_SIZE};

use crate::kogge_stone::warp_inclusive_scan;
use crate::lookback::decoupled_lookback;
use crate::status::{BlockStatus, ScanValue, AGGREGATE, INCLUSIVE};

/// Which of the two scans to compute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanKind {
    /// `out[i] = v[0] + ... + v[i]`
    Inclusive,
    /// `out[i] = v[0] + ... + v[i-1]`, `out[0] = 0`
    Exclusive,
}

/// Scratch shared by every block of one launch: the status cells, the
/// virtual-block-id counter, and the total-sum sink.
pub struct Scratch<'a, T, S> {
    pub status: &'a [S],
    pub virtual_block_id: &'a AtomicU32,
    pub total_sum: &'a SharedCell<T>,
}

/// Scans the slice of the input owned by one block and writes its outputs.
///
/// Each block claims a virtual block id, computes a block-local inclusive
/// scan over `chunks_per_block` chunks of `block_dim` elements, publishes
/// its aggregate, resolves the prefix of earlier blocks with the decoupled
/// look-back, and streams the final values through `fout`. The thread that
/// holds the last input index also records the total sum.
pub fn scan_block<T, S, Fin, Fout>(
    ctx: &BlockCtx,
    n: usize,
    kind: ScanKind,
    chunks_per_block: usize,
    scratch: &Scratch<'_, T, S>,
    fin: &Fin,
    fout: &Fout,
) where
    T: ScanValue,
    S: BlockStatus<T>,
    Fin: Fn(usize) -> T + Sync,
    Fout: Fn(usize, T) + Sync,
{
    let grid_dim = ctx.grid_dim();
    let block_dim = ctx.block_dim();
    let nwarps = ctx.nwarps();

    // Shared memory: one slot per warp for warp sums, plus their scan.
    let mut shared = vec![T::zero(); WARP_SIZE];
    let mut shared2 = vec![T::zero(); nwarps];

    // Claim a virtual block id before anything else. Blocks are scheduled
    // in arbitrary order, so the scheduler's block index must not be used
    // anywhere below; a look-back keyed on it could wait on a block that
    // has not started. The claim itself orders the grid: every block with a
    // smaller virtual id has already begun.
    let virtual_block_id = if grid_dim > 1 {
        let id = atomic_inc_wrap(scratch.virtual_block_id, grid_dim as u32) as usize;
        ctx.sync_threads();
        id
    } else {
        0
    };

    // This block owns [ibegin, iend).
    let elems_per_block = block_dim * chunks_per_block;
    let ibegin = elems_per_block * virtual_block_id;
    let iend = (ibegin + elems_per_block).min(n);
    let cell = &scratch.status[virtual_block_id];

    // Block-wide inclusive sums per chunk, kept in registers until the
    // output pass.
    let mut chunk_out: Vec<Vec<Lanes<T>>> =
        vec![vec![Lanes::splat(T::zero()); nwarps]; chunks_per_block];
    // Warp-inclusive sums and raw inputs for the chunk in flight.
    let mut warp_scan = vec![Lanes::splat(T::zero()); nwarps];
    let mut warp_input = vec![Lanes::splat(T::zero()); nwarps];
    // Inclusive sum of all previous chunks; ends as the block aggregate.
    let mut sum_prev_chunk = T::zero();

    for ichunk in 0..chunks_per_block {
        let chunk_begin = ibegin + ichunk * block_dim;
        if chunk_begin >= iend {
            break;
        }

        for warp in 0..nwarps {
            let base = chunk_begin + warp * WARP_SIZE;
            let x0 = Lanes::from_fn(|lane| {
                let offset = base + lane;
                if offset < iend {
                    fin(offset)
                } else {
                    T::zero()
                }
            });
            if kind == ScanKind::Exclusive && (base..base + WARP_SIZE).contains(&(n - 1)) {
                // The exclusive output at n-1 omits the element itself, so
                // its contribution to the total is folded in at read time.
                let last = x0.get(n - 1 - base);
                // Safety: exactly one thread in the grid holds index n-1.
                unsafe { scratch.total_sum.update(|total| *total += last) };
            }
            let x = warp_inclusive_scan(x0);
            warp_input[warp] = x0;
            warp_scan[warp] = x;
            // The last lane holds the inclusive sum of the whole warp.
            shared[warp] = x.get(WARP_SIZE - 1);
        }
        ctx.sync_threads();

        // Warp 0 scans the warp sums for the whole block.
        {
            let y = Lanes::from_fn(|lane| {
                if lane < nwarps {
                    shared[lane]
                } else {
                    T::zero()
                }
            });
            let y = warp_inclusive_scan(y);
            for lane in 0..nwarps {
                shared2[lane] = y.get(lane);
            }
        }
        ctx.sync_threads();

        // shared2[0..nwarps) now holds the inclusive scan of warp sums;
        // combining it with the in-warp scan gives the chunk-local value.
        for warp in 0..nwarps {
            let sum_prev_warp = if warp == 0 {
                T::zero()
            } else {
                shared2[warp - 1]
            };
            let x = warp_scan[warp];
            let x0 = warp_input[warp];
            chunk_out[ichunk][warp] = Lanes::from_fn(|lane| {
                let v = match kind {
                    ScanKind::Inclusive => x.get(lane),
                    ScanKind::Exclusive => x.get(lane) - x0.get(lane),
                };
                sum_prev_warp + sum_prev_chunk + v
            });
        }
        sum_prev_chunk += shared2[nwarps - 1];
    }

    // sum_prev_chunk now holds the sum of the whole block. Publish it so
    // later blocks can stop waiting; block 0's aggregate is already its
    // inclusive prefix.
    if grid_dim > 1 {
        let status = if virtual_block_id == 0 {
            INCLUSIVE
        } else {
            AGGREGATE
        };
        cell.write(status, sum_prev_chunk);
    }

    let exclusive_prefix = if virtual_block_id == 0 {
        T::zero()
    } else {
        // Only warp 0 walks the predecessors; it spins without holding any
        // block barrier. The result is broadcast through shared memory.
        let prefix = decoupled_lookback(scratch.status, virtual_block_id);
        cell.write(INCLUSIVE, cell.aggregate() + prefix);
        shared[0] = prefix;
        ctx.sync_threads();
        shared[0]
    };

    for ichunk in 0..chunks_per_block {
        let chunk_begin = ibegin + ichunk * block_dim;
        if chunk_begin >= iend {
            break;
        }
        for warp in 0..nwarps {
            let base = chunk_begin + warp * WARP_SIZE;
            let out = chunk_out[ichunk][warp];
            for lane in 0..WARP_SIZE {
                let offset = base + lane;
                if offset >= iend {
                    break;
                }
                let value = out.get(lane) + exclusive_prefix;
                fout(offset, value);
                if offset == n - 1 {
                    // Safety: exactly one thread in the grid holds index
                    // n-1, and it is the same thread that contributed the
                    // read-time term above.
                    unsafe { scratch.total_sum.update(|total| *total += value) };
                }
            }
        }
    }
}
