//! Per-block status cells for the decoupled look-back.
//!
//! A cell moves through `INVALID -> AGGREGATE -> INCLUSIVE` (block 0 goes
//! straight to `INCLUSIVE`) and `INCLUSIVE` is terminal. Readers on other
//! blocks must never observe a status paired with a stale value, which
//! drives the two layouts:
//!
//! * [`PackedStatus`] fits status and value into one 64-bit word, so a
//!   single atomic exchange publishes the pair and a single atomic load
//!   reads it back. Chosen whenever the value fits in 32 bits.
//! * [`UnpackedStatus`] keeps separate `aggregate` and `inclusive` slots.
//!   Writers store the slot matching the status, issue a device fence, then
//!   store the status byte; a reader that sees a non-`INVALID` status is
//!   therefore guaranteed the matching slot.

use std::cell::UnsafeCell;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::ops::{Add, AddAssign, Sub};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use num_traits::Zero;
use simt::device_fence;

/// No value published yet.
pub const INVALID: u8 = b'x';
/// The block-local aggregate is available.
pub const AGGREGATE: u8 = b'a';
/// The inclusive prefix through this block is available.
pub const INCLUSIVE: u8 = b'p';

/// A status byte and the value it vouches for, read out of a cell as one
/// unit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StatusValue<T> {
    pub status: u8,
    pub value: T,
}

/// Element types the scan runs over: an additive semigroup with zero.
///
/// The associated `Status` type picks the cell layout at compile time:
/// packed when status plus value fit in 64 bits, unpacked otherwise.
pub trait ScanValue:
    Copy
    + Send
    + Sync
    + Debug
    + PartialEq
    + Zero
    + Add<Output = Self>
    + AddAssign
    + Sub<Output = Self>
    + 'static
{
    type Status: BlockStatus<Self>;
}

impl ScanValue for u32 {
    type Status = PackedStatus<u32>;
}

impl ScanValue for i32 {
    type Status = PackedStatus<i32>;
}

impl ScanValue for f32 {
    type Status = PackedStatus<f32>;
}

impl ScanValue for u64 {
    type Status = UnpackedStatus<u64>;
}

impl ScanValue for i64 {
    type Status = UnpackedStatus<i64>;
}

impl ScanValue for f64 {
    type Status = UnpackedStatus<f64>;
}

/// A lock-free per-block publication cell.
pub trait BlockStatus<T>: Default + Send + Sync {
    /// Non-atomic status store. Taking `&mut self` restricts it to
    /// initialization, before the cell is shared with the grid.
    fn set_status(&mut self, status: u8);

    /// Publishes `(status, value)`. Any thread on the device that
    /// subsequently reads the cell observes the pair together.
    fn write(&self, status: u8, value: T);

    /// The current `(status, value)` pair: the aggregate under `AGGREGATE`,
    /// the inclusive prefix under `INCLUSIVE`, unspecified under `INVALID`.
    fn read(&self) -> StatusValue<T>;

    /// The aggregate this cell published earlier. Only meaningful on the
    /// owning block, after its `write(AGGREGATE, ..)`.
    fn aggregate(&self) -> T;

    /// Spins until the cell leaves `INVALID`, fencing on every iteration so
    /// the load cannot be hoisted out of the loop.
    fn wait(&self) -> StatusValue<T> {
        loop {
            device_fence();
            let r = self.read();
            if r.status != INVALID {
                return r;
            }
        }
    }
}

/// Values that fit the packed cell: 32 bits, losslessly convertible to raw
/// bits.
pub trait PackedValue: Copy {
    fn to_bits(self) -> u32;
    fn from_bits(bits: u32) -> Self;
}

impl PackedValue for u32 {
    fn to_bits(self) -> u32 {
        self
    }

    fn from_bits(bits: u32) -> Self {
        bits
    }
}

impl PackedValue for i32 {
    fn to_bits(self) -> u32 {
        self as u32
    }

    fn from_bits(bits: u32) -> Self {
        bits as i32
    }
}

impl PackedValue for f32 {
    fn to_bits(self) -> u32 {
        f32::to_bits(self)
    }

    fn from_bits(bits: u32) -> Self {
        f32::from_bits(bits)
    }
}

/// Status and value packed into one atomic 64-bit word: the status byte in
/// the low byte, the value bits in the high 32 bits.
pub struct PackedStatus<T> {
    word: AtomicU64,
    _marker: PhantomData<T>,
}

impl<T> Default for PackedStatus<T> {
    fn default() -> Self {
        Self {
            word: AtomicU64::new(0),
            _marker: PhantomData,
        }
    }
}

fn pack<T: PackedValue>(status: u8, value: T) -> u64 {
    (u64::from(value.to_bits()) << 32) | u64::from(status)
}

fn unpack<T: PackedValue>(word: u64) -> StatusValue<T> {
    StatusValue {
        status: (word & 0xff) as u8,
        value: T::from_bits((word >> 32) as u32),
    }
}

impl<T> BlockStatus<T> for PackedStatus<T>
where
    T: PackedValue + Send + Sync,
{
    fn set_status(&mut self, status: u8) {
        let word = self.word.get_mut();
        *word = (*word & !0xff) | u64::from(status);
    }

    fn write(&self, status: u8, value: T) {
        // One atomic exchange keeps status and value a single unit; a
        // concurrent read can never tear the pair.
        self.word.swap(pack(status, value), Ordering::AcqRel);
    }

    fn read(&self) -> StatusValue<T> {
        unpack(self.word.load(Ordering::Acquire))
    }

    fn aggregate(&self) -> T {
        self.read().value
    }
}

/// Separate aggregate and inclusive slots plus a status byte, for values
/// wider than 32 bits.
pub struct UnpackedStatus<T> {
    aggregate: UnsafeCell<T>,
    inclusive: UnsafeCell<T>,
    status: AtomicU8,
}

// Safety: each slot is written at most once, strictly before the matching
// status byte is released; readers touch a slot only after acquiring a
// status that vouches for it. The two slots are distinct memory, so an
// `inclusive` store never races a reader of `aggregate`.
unsafe impl<T: Send + Sync> Sync for UnpackedStatus<T> {}

impl<T: Zero> Default for UnpackedStatus<T> {
    fn default() -> Self {
        Self {
            aggregate: UnsafeCell::new(T::zero()),
            inclusive: UnsafeCell::new(T::zero()),
            status: AtomicU8::new(0),
        }
    }
}

impl<T> BlockStatus<T> for UnpackedStatus<T>
where
    T: Copy + Zero + Send + Sync,
{
    fn set_status(&mut self, status: u8) {
        *self.status.get_mut() = status;
    }

    fn write(&self, status: u8, value: T) {
        // Value slot first, device fence, then the status byte.
        unsafe {
            if status == AGGREGATE {
                *self.aggregate.get() = value;
            } else {
                *self.inclusive.get() = value;
            }
        }
        device_fence();
        self.status.store(status, Ordering::Release);
    }

    fn read(&self) -> StatusValue<T> {
        match self.status.load(Ordering::Acquire) {
            AGGREGATE => StatusValue {
                status: AGGREGATE,
                value: unsafe { *self.aggregate.get() },
            },
            INCLUSIVE => StatusValue {
                status: INCLUSIVE,
                value: unsafe { *self.inclusive.get() },
            },
            status => StatusValue {
                status,
                value: T::zero(),
            },
        }
    }

    fn aggregate(&self) -> T {
        unsafe { *self.aggregate.get() }
    }
}
