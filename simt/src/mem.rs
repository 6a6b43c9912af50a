use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::sync::atomic::{fence, AtomicU32, Ordering};

/// Device-scope memory fence. Orders all prior stores of this thread before
/// all later loads and stores, grid-wide.
#[inline]
pub fn device_fence() {
    fence(Ordering::SeqCst);
}

/// Atomic increment with wrap-around: returns the old value and stores
/// `old >= limit - 1 ? 0 : old + 1`, the semantics of the hardware
/// increment-wrap instruction. With `limit` equal to the grid size and one
/// claim per block, every block receives a distinct id in `0..limit`.
pub fn atomic_inc_wrap(counter: &AtomicU32, limit: u32) -> u32 {
    debug_assert!(limit > 0);
    counter
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |old| {
            Some(if old >= limit - 1 { 0 } else { old + 1 })
        })
        .unwrap_or_else(|old| old)
}

/// A slice every thread of a grid may write through, each index at most once.
///
/// This stands in for a raw device output pointer: bounds are checked, but
/// exclusivity per index is the caller's contract, exactly as it is for a
/// kernel scattering results into global memory.
pub struct SharedWriteSlice<'a, T> {
    ptr: *mut T,
    len: usize,
    _lifetime: PhantomData<&'a mut [T]>,
}

unsafe impl<T: Send> Send for SharedWriteSlice<'_, T> {}
unsafe impl<T: Send> Sync for SharedWriteSlice<'_, T> {}

impl<'a, T> SharedWriteSlice<'a, T> {
    pub fn new(slice: &'a mut [T]) -> Self {
        Self {
            ptr: slice.as_mut_ptr(),
            len: slice.len(),
            _lifetime: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stores `value` at `index`.
    ///
    /// # Safety
    ///
    /// No two threads may write the same index during one launch, and the
    /// slice must not be read until the grid has joined.
    pub unsafe fn write(&self, index: usize, value: T) {
        assert!(index < self.len);
        unsafe { self.ptr.add(index).write(value) };
    }
}

/// A single cell written by at most one thread of a grid at a time.
///
/// Used for sinks with a single designated writer (a "last thread records
/// the total" slot). The host reads it back through `get_mut` after the
/// grid has joined, which re-establishes exclusive access.
pub struct SharedCell<T>(UnsafeCell<T>);

unsafe impl<T: Send> Sync for SharedCell<T> {}

impl<T> SharedCell<T> {
    pub fn new(value: T) -> Self {
        Self(UnsafeCell::new(value))
    }

    /// Applies `f` to the cell in place.
    ///
    /// # Safety
    ///
    /// Calls must not overlap: at any point in time at most one thread may
    /// be inside `update`, and no thread may read the cell concurrently.
    pub unsafe fn update(&self, f: impl FnOnce(&mut T)) {
        f(unsafe { &mut *self.0.get() });
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.0.get_mut()
    }
}
