//! Decoupled look-back across predecessor blocks.

use simt::{Lanes, WARP_SIZE};

use crate::kogge_stone::warp_reduce_add;
use crate::status::{BlockStatus, ScanValue, StatusValue, INCLUSIVE};

/// Walks backward over predecessor status cells and returns the exclusive
/// prefix of block `virtual_block_id`, i.e. the sum of all elements owned by
/// blocks `0..virtual_block_id`.
///
/// Executed by warp 0 of the block, and only there: the walk spins on cells
/// other blocks have yet to publish, so it must not sit behind any
/// block-internal barrier. Each round inspects a window of `WARP_SIZE`
/// predecessors, nearest first, one per lane. Aggregates are summed until a
/// cell with a full inclusive prefix is found, which settles everything
/// further back; if a window holds only aggregates the walk moves one window
/// earlier.
pub fn decoupled_lookback<T, S>(status: &[S], virtual_block_id: usize) -> T
where
    T: ScanValue,
    S: BlockStatus<T>,
{
    let mut exclusive_prefix = T::zero();
    let mut window = virtual_block_id as isize - 1;
    loop {
        let stva = Lanes::from_fn(|lane| {
            let iblock = window - lane as isize;
            if iblock >= 0 {
                status[iblock as usize].wait()
            } else {
                // Lanes past the front of the grid contribute an empty,
                // fully resolved prefix.
                StatusValue {
                    status: INCLUSIVE,
                    value: T::zero(),
                }
            }
        });

        let status_bf =
            ballot_emulated(Lanes::from_fn(|lane| stva.get(lane).status == INCLUSIVE));

        if status_bf & 1 != 0 {
            // The nearest predecessor already holds a full prefix; it alone
            // settles the look-back.
            exclusive_prefix += stva.get(0).value;
            return exclusive_prefix;
        }

        // Lowest lane with an inclusive prefix; everything below it is an
        // aggregate. WARP_SIZE or more means the window is all aggregates.
        let k = status_bf.trailing_zeros() as usize;
        let x = Lanes::from_fn(|lane| {
            if lane <= k {
                stva.get(lane).value
            } else {
                T::zero()
            }
        });
        let x = warp_reduce_add(x);
        exclusive_prefix += x.get(0);
        if k < WARP_SIZE {
            return exclusive_prefix;
        }
        window -= WARP_SIZE as isize;
    }
}

/// Ballot assembled from a `shuffle_xor` butterfly, for devices without a
/// native ballot. Every lane ends up holding the full mask.
fn ballot_emulated(pred: Lanes<bool>) -> u64 {
    let mut bits = Lanes::from_fn(|lane| if pred.get(lane) { 1u64 << lane } else { 0 });
    let mut stride = 1;
    while stride < WARP_SIZE {
        let other = bits.shuffle_xor(stride);
        bits = Lanes::from_fn(|lane| bits.get(lane) | other.get(lane));
        stride *= 2;
    }
    bits.get(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{PackedStatus, UnpackedStatus, AGGREGATE, INVALID};
    use rand::{Rng, SeedableRng};
    use rand_hc::Hc128Rng;
    use std::thread;
    use std::time::Duration;

    const SEED: &[u8; 32] = b"mGH05zfYqLrp2kCoB8dQvXuTnJ3wRaE1";

    fn invalid_cells(n: usize) -> Vec<PackedStatus<u32>> {
        let mut cells: Vec<PackedStatus<u32>> = (0..n).map(|_| Default::default()).collect();
        for cell in cells.iter_mut() {
            cell.set_status(INVALID);
        }
        cells
    }

    #[test]
    fn emulated_ballot_matches_native() {
        let mut rng = Hc128Rng::from_seed(*SEED);
        for _ in 0..100 {
            let pred = Lanes::from_fn(|_| rng.gen_bool(0.5));
            assert_eq!(ballot_emulated(pred), simt::ballot(pred));
        }
    }

    #[test]
    fn nearest_inclusive_settles_immediately() {
        // Every lane of the window waits, so all predecessors must be
        // published; the sentinel aggregates must not leak into the result.
        let cells = invalid_cells(4);
        cells[0].write(AGGREGATE, 999);
        cells[1].write(AGGREGATE, 999);
        cells[2].write(INCLUSIVE, 55);
        assert_eq!(decoupled_lookback(&cells, 3), 55);
    }

    #[test]
    fn sums_aggregates_up_to_an_inclusive_cell() {
        let cells = invalid_cells(6);
        cells[0].write(AGGREGATE, 999);
        cells[1].write(AGGREGATE, 999);
        cells[2].write(INCLUSIVE, 100);
        cells[3].write(AGGREGATE, 10);
        cells[4].write(AGGREGATE, 20);
        assert_eq!(decoupled_lookback(&cells, 5), 130);
    }

    #[test]
    fn walks_all_the_way_to_block_zero() {
        let cells = invalid_cells(5);
        cells[0].write(INCLUSIVE, 1);
        for vb in 1..4 {
            cells[vb].write(AGGREGATE, 1 << vb);
        }
        assert_eq!(decoupled_lookback(&cells, 4), 1 + 2 + 4 + 8);
    }

    #[test]
    fn crosses_multiple_windows() {
        // Two full windows of aggregates before the inclusive cell shows up.
        let n = 2 * WARP_SIZE + 10;
        let cells = invalid_cells(n);
        for vb in 0..5 {
            cells[vb].write(AGGREGATE, 999);
        }
        cells[5].write(INCLUSIVE, 1000);
        for vb in 6..n - 1 {
            cells[vb].write(AGGREGATE, 1);
        }
        let expected = 1000 + (n - 1 - 6) as u32;
        assert_eq!(decoupled_lookback(&cells, n - 1), expected);
    }

    #[test]
    fn lookback_works_on_unpacked_cells() {
        let mut cells: Vec<UnpackedStatus<u64>> = (0..4).map(|_| Default::default()).collect();
        for cell in cells.iter_mut() {
            cell.set_status(INVALID);
        }
        cells[0].write(INCLUSIVE, u64::from(u32::MAX) + 7);
        cells[1].write(AGGREGATE, 3);
        cells[2].write(AGGREGATE, 5);
        assert_eq!(decoupled_lookback(&cells, 3), u64::from(u32::MAX) + 15);
    }

    /// The walk must spin until predecessors publish, then still come out
    /// with the exact prefix. Cells are published late and in reverse
    /// resolution order to maximize the time spent waiting.
    #[test]
    fn spins_until_predecessors_publish() {
        let vb = 8;
        let cells = invalid_cells(vb + 1);
        let total = thread::scope(|scope| {
            let cells = &cells;
            scope.spawn(move || {
                for i in (1..vb).rev() {
                    thread::sleep(Duration::from_millis(1));
                    cells[i].write(AGGREGATE, i as u32);
                }
                thread::sleep(Duration::from_millis(2));
                cells[0].write(INCLUSIVE, 500);
            });
            decoupled_lookback(cells, vb)
        });
        assert_eq!(total, 500 + (1..vb as u32).sum::<u32>());
    }
}
