use prefix_scan::{exclusive_sum, inclusive_sum, sequential};

pub fn main() {
    env_logger::init();

    let xs = vec![1u32; 4096];
    let mut ys = vec![0u32; 4096];

    let total = sequential::inclusive_sum(&xs, &mut ys);
    println!("serial    total: {total}, tail: {:?}", &ys[4090..]);

    let total = inclusive_sum(&xs, &mut ys).unwrap();
    println!("inclusive total: {total}, tail: {:?}", &ys[4090..]);

    let total = exclusive_sum(&xs, &mut ys).unwrap();
    println!("exclusive total: {total}, tail: {:?}", &ys[4090..]);
}
