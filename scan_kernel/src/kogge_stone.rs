//! Warp-level scan and reduction over shuffles.

use std::ops::Add;

use simt::{Lanes, WARP_SIZE};

/// Inclusive Kogge-Stone scan across the lanes of a warp: lane `l` ends up
/// holding the sum of lanes `0..=l`. Uses `shuffle_up` at doubling strides;
/// a lane only adds the shuffled value once the source lane is in range.
pub fn warp_inclusive_scan<T>(x: Lanes<T>) -> Lanes<T>
where
    T: Copy + Add<Output = T>,
{
    let mut x = x;
    let mut stride = 1;
    while stride < WARP_SIZE {
        let s = x.shuffle_up(stride);
        x = Lanes::from_fn(|lane| {
            if lane >= stride {
                x.get(lane) + s.get(lane)
            } else {
                x.get(lane)
            }
        });
        stride *= 2;
    }
    x
}

/// Warp-wide sum via `shuffle_down` at halving strides. Lane 0 ends up
/// holding the sum of all lanes; the other lanes hold partial sums.
pub fn warp_reduce_add<T>(x: Lanes<T>) -> Lanes<T>
where
    T: Copy + Add<Output = T>,
{
    let mut x = x;
    let mut stride = WARP_SIZE / 2;
    while stride > 0 {
        let s = x.shuffle_down(stride);
        x = Lanes::from_fn(|lane| x.get(lane) + s.get(lane));
        stride /= 2;
    }
    x
}
