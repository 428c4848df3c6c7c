//! Helpers shared by the allocator unit tests.

use core::{ptr::NonNull, slice};

/// Backing memory for tests, aligned so that address-based alignment
/// matches offset-based alignment up to 16 bytes.
#[repr(C, align(16))]
pub(crate) struct TestHeap<const N: usize>(pub(crate) [u8; N]);

impl<const N: usize> TestHeap<N> {
    /// Creates a heap filled with a recognizable garbage pattern.
    pub(crate) const fn new() -> Self {
        Self([0x11; N])
    }

    pub(crate) fn base(&self) -> usize {
        self.0.as_ptr().addr()
    }
}

pub(crate) fn offset(base: usize, ptr: NonNull<u8>) -> usize {
    ptr.as_ptr().addr() - base
}

/// Fills `len` bytes at `ptr` with `byte`.
pub(crate) unsafe fn fill(ptr: NonNull<u8>, byte: u8, len: usize) {
    unsafe {
        ptr.write_bytes(byte, len);
    }
}

/// Returns `true` if all `len` bytes at `ptr` equal `byte`.
pub(crate) unsafe fn all_eq(ptr: NonNull<u8>, byte: u8, len: usize) -> bool {
    unsafe { slice::from_raw_parts(ptr.as_ptr(), len) }
        .iter()
        .all(|&b| b == byte)
}
