//! Borrowed backing buffer shared by the allocators.

use core::{marker::PhantomData, ptr::NonNull};

use snafu::ensure;

use crate::error::{AllocError, OutOfBoundsSnafu};

/// The caller-owned memory region an allocator carves its allocations from.
///
/// The buffer is borrowed mutably for `'a`, so it outlives the allocator.
/// Allocations are handed out as raw pointers derived from `start`, which
/// keeps them valid while the allocator itself keeps writing headers and
/// free list nodes through the same pointer.
#[derive(Debug)]
pub(crate) struct BackingBuffer<'a> {
    start: NonNull<u8>,
    len: usize,
    _marker: PhantomData<&'a mut [u8]>,
}

impl<'a> BackingBuffer<'a> {
    pub(crate) fn new(buf: &'a mut [u8]) -> Self {
        let len = buf.len();
        Self {
            start: NonNull::from(buf).cast(),
            len,
            _marker: PhantomData,
        }
    }

    pub(crate) fn start(&self) -> NonNull<u8> {
        self.start
    }

    pub(crate) fn start_addr(&self) -> usize {
        self.start.as_ptr().addr()
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if `ptr` points into `start..start + len`.
    pub(crate) fn contains(&self, ptr: *const u8) -> bool {
        ptr.addr()
            .checked_sub(self.start_addr())
            .is_some_and(|offset| offset < self.len)
    }

    /// Converts `ptr` into an offset from the buffer start.
    ///
    /// Fails with [`AllocError::OutOfBounds`] unless `ptr` lies inside the
    /// buffer.
    pub(crate) fn offset_of(&self, ptr: *const u8) -> Result<usize, AllocError> {
        self.offset_within(ptr, self.len)
    }

    /// Like [`offset_of`](Self::offset_of), but also accepts the
    /// one-past-the-end pointer, where a zero-sized allocation may live.
    pub(crate) fn offset_of_inclusive(&self, ptr: *const u8) -> Result<usize, AllocError> {
        self.offset_within(ptr, self.len + 1)
    }

    fn offset_within(&self, ptr: *const u8, limit: usize) -> Result<usize, AllocError> {
        let offset = ptr.addr().checked_sub(self.start_addr());
        ensure!(
            offset.is_some_and(|offset| offset < limit),
            OutOfBoundsSnafu {
                addr: ptr.addr(),
                start: self.start_addr(),
                end: self.start_addr() + self.len,
            }
        );
        Ok(ptr.addr() - self.start_addr())
    }

    /// Checks that `offset..offset + count` lies inside the buffer.
    pub(crate) fn check_range(&self, offset: usize, count: usize) -> Result<(), AllocError> {
        ensure!(
            offset
                .checked_add(count)
                .is_some_and(|end| end <= self.len),
            OutOfBoundsSnafu {
                addr: self.start_addr().wrapping_add(offset),
                start: self.start_addr(),
                end: self.start_addr() + self.len,
            }
        );
        Ok(())
    }

    /// Returns a pointer to the byte at `offset`.
    ///
    /// `offset == len` is allowed and yields the one-past-the-end pointer.
    pub(crate) fn ptr_at(&self, offset: usize) -> NonNull<u8> {
        assert!(offset <= self.len, "offset {offset} is past the buffer end");
        unsafe { self.start.add(offset) }
    }

    /// Zeroes `offset..offset + count`.
    pub(crate) fn fill_zero(&mut self, offset: usize, count: usize) {
        assert!(
            offset.checked_add(count).is_some_and(|end| end <= self.len),
            "zeroed range is out of the buffer"
        );
        unsafe {
            self.ptr_at(offset).write_bytes(0, count);
        }
    }

    /// Copies `count` bytes from `src` to `dst`, both offsets into the buffer.
    ///
    /// The ranges may overlap.
    pub(crate) fn copy_within(&mut self, src: usize, dst: usize, count: usize) {
        assert!(
            src.checked_add(count).is_some_and(|end| end <= self.len)
                && dst.checked_add(count).is_some_and(|end| end <= self.len),
            "copied range is out of the buffer"
        );
        unsafe {
            self.ptr_at(dst).copy_from(self.ptr_at(src), count);
        }
    }

    /// Reads a `T` stored at `offset`, without alignment requirements.
    ///
    /// # Safety
    ///
    /// The bytes at `offset..offset + size_of::<T>()` must hold a valid `T`,
    /// typically one previously stored with [`write`](Self::write).
    pub(crate) unsafe fn read<T>(&self, offset: usize) -> T {
        assert!(
            offset
                .checked_add(size_of::<T>())
                .is_some_and(|end| end <= self.len),
            "read is out of the buffer"
        );
        unsafe { self.ptr_at(offset).cast::<T>().read_unaligned() }
    }

    /// Stores `value` at `offset`, without alignment requirements.
    pub(crate) fn write<T>(&mut self, offset: usize, value: T) {
        assert!(
            offset
                .checked_add(size_of::<T>())
                .is_some_and(|end| end <= self.len),
            "write is out of the buffer"
        );
        unsafe {
            self.ptr_at(offset).cast::<T>().write_unaligned(value);
        }
    }
}
