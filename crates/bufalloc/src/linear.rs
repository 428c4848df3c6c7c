//! Linear (bump/arena) allocator.
//!
//! Allocations are carved sequentially from the backing buffer by advancing a
//! single offset. Individual allocations cannot be freed; [`free`] releases
//! everything at once. The most recent allocation can be resized in place.
//!
//! ```text
//! [buf]--[alloc1]--pad--[alloc2]--pad--[alloc3][.......free.......][buf + len]
//!                              prev_offset ^   ^ curr_offset
//! ```
//!
//! [`free`]: LinearAllocator::free

use core::ptr::NonNull;

use crate::{
    align::{self, DEFAULT_ALIGNMENT},
    buffer::BackingBuffer,
    error::{self, AllocError, OutOfMemorySnafu},
};

/// A bump allocator over a caller-supplied buffer.
///
/// Every allocation is zero-filled. Running out of space is reported as
/// `None` (or [`AllocError::OutOfMemory`] from the `try_*` methods) and
/// leaves the allocator untouched.
///
/// # Thread Safety
///
/// This allocator is `Send` but not `Sync`. It can be moved between threads
/// but requires external synchronization for concurrent access.
#[derive(Debug)]
pub struct LinearAllocator<'a> {
    buf: BackingBuffer<'a>,
    /// Offset of the most recent allocation.
    prev_offset: usize,
    /// Offset where the next allocation may start.
    curr_offset: usize,
}

unsafe impl Send for LinearAllocator<'_> {}

impl<'a> LinearAllocator<'a> {
    /// Creates a linear allocator managing `buf`.
    ///
    /// The buffer stays borrowed for as long as the allocator lives, so its
    /// lifetime always dominates the allocator's.
    ///
    /// # Examples
    ///
    /// ```
    /// # use bufalloc::linear::LinearAllocator;
    /// let mut buf = [0_u8; 1024];
    /// let mut allocator = LinearAllocator::new(&mut buf);
    /// let ptr = allocator.alloc(32).unwrap();
    /// assert!(allocator.owns(ptr.as_ptr()));
    /// ```
    #[must_use]
    pub fn new(buf: &'a mut [u8]) -> Self {
        let buf = BackingBuffer::new(buf);
        tracing::debug!(
            start = buf.start_addr(),
            len = buf.len(),
            "linear allocator initialized"
        );
        Self {
            buf,
            prev_offset: 0,
            curr_offset: 0,
        }
    }

    /// Returns the length of the backing buffer in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Returns the number of bytes consumed so far, alignment padding
    /// included.
    #[must_use]
    pub fn used(&self) -> usize {
        self.curr_offset
    }

    /// Returns the number of bytes left after the current offset.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.curr_offset
    }

    /// Returns `true` if `ptr` points into the backing buffer.
    #[must_use]
    pub fn owns(&self, ptr: *const u8) -> bool {
        self.buf.contains(ptr)
    }

    /// Allocates `size` zeroed bytes aligned to `align`.
    ///
    /// Returns `None` if the buffer has no room left; the allocator state is
    /// unchanged in that case.
    ///
    /// # Allocation Behavior
    ///
    /// The current offset is moved forward to the next address aligned to
    /// `align`, then past the allocated bytes. Allocating large, highly
    /// aligned data first keeps the padding overhead low.
    ///
    /// # Panics
    ///
    /// Panics if `align` is not a power of two.
    #[track_caller]
    pub fn alloc_align(&mut self, size: usize, align: usize) -> Option<NonNull<u8>> {
        error::recoverable(self.try_alloc_align(size, align))
    }

    /// Allocates `size` zeroed bytes aligned to [`DEFAULT_ALIGNMENT`].
    ///
    /// See [`alloc_align`](Self::alloc_align).
    #[track_caller]
    pub fn alloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        self.alloc_align(size, DEFAULT_ALIGNMENT)
    }

    /// Fallible version of [`alloc_align`](Self::alloc_align).
    pub fn try_alloc_align(&mut self, size: usize, align: usize) -> Result<NonNull<u8>, AllocError> {
        align::validate_align(align)?;
        let offset = self.bump(size, align)?;
        Ok(self.buf.ptr_at(offset))
    }

    /// Releases every allocation at once.
    ///
    /// The buffer contents are left as they are; the next allocation starts
    /// at the beginning of the buffer again.
    pub fn free(&mut self) {
        tracing::debug!(used = self.curr_offset, "linear allocator reset");
        self.prev_offset = 0;
        self.curr_offset = 0;
    }

    /// Resizes the allocation at `old_ptr` from `old_size` to `new_size` bytes.
    ///
    /// - If `old_ptr` is null or `old_size` is zero, a new block is allocated.
    /// - If `old_ptr` is the most recent allocation, it is resized in place
    ///   and the same address is returned. Grown bytes are zeroed.
    /// - Otherwise a new block is allocated and the first
    ///   `min(old_size, new_size)` bytes are copied into it. The old block is
    ///   not reclaimed.
    ///
    /// Returns `None` if there is not enough space left.
    ///
    /// # Panics
    ///
    /// Panics if `align` is not a power of two or if `old_ptr` does not point
    /// into the backing buffer.
    ///
    /// # Examples
    ///
    /// ```
    /// # use bufalloc::linear::LinearAllocator;
    /// let mut buf = [0_u8; 1024];
    /// let mut allocator = LinearAllocator::new(&mut buf);
    /// let ptr = allocator.alloc_align(32, 16).unwrap();
    /// let resized = allocator.resize_align(ptr.as_ptr(), 32, 64, 16).unwrap();
    /// assert_eq!(ptr, resized);
    /// ```
    #[track_caller]
    pub fn resize_align(
        &mut self,
        old_ptr: *mut u8,
        old_size: usize,
        new_size: usize,
        align: usize,
    ) -> Option<NonNull<u8>> {
        error::recoverable(self.try_resize_align(old_ptr, old_size, new_size, align))
    }

    /// Resizes an allocation using [`DEFAULT_ALIGNMENT`].
    ///
    /// See [`resize_align`](Self::resize_align).
    #[track_caller]
    pub fn resize(
        &mut self,
        old_ptr: *mut u8,
        old_size: usize,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        self.resize_align(old_ptr, old_size, new_size, DEFAULT_ALIGNMENT)
    }

    /// Fallible version of [`resize_align`](Self::resize_align).
    pub fn try_resize_align(
        &mut self,
        old_ptr: *mut u8,
        old_size: usize,
        new_size: usize,
        align: usize,
    ) -> Result<NonNull<u8>, AllocError> {
        align::validate_align(align)?;

        if old_ptr.is_null() || old_size == 0 {
            return self.try_alloc_align(new_size, align);
        }

        let offset = self.buf.offset_of(old_ptr)?;
        if offset == self.prev_offset {
            let Some(end) = offset
                .checked_add(new_size)
                .filter(|&end| end <= self.buf.len())
            else {
                tracing::warn!(old_size, new_size, "linear allocator cannot grow in place");
                return OutOfMemorySnafu {
                    requested: new_size,
                    remaining: self.buf.len() - offset,
                }
                .fail();
            };
            if new_size > old_size {
                self.buf.fill_zero(offset + old_size, new_size - old_size);
            }
            self.curr_offset = end;
            tracing::trace!(offset, old_size, new_size, "linear resize in place");
            return Ok(self.buf.ptr_at(offset));
        }

        let copy_size = old_size.min(new_size);
        self.buf.check_range(offset, copy_size)?;
        let new_offset = self.bump(new_size, align)?;
        self.buf.copy_within(offset, new_offset, copy_size);
        tracing::trace!(offset, new_offset, copy_size, "linear resize by copy");
        Ok(self.buf.ptr_at(new_offset))
    }

    /// Advances the current offset past a new, zeroed `size`-byte block.
    ///
    /// `align` must already be validated.
    fn bump(&mut self, size: usize, align: usize) -> Result<usize, AllocError> {
        let start = self.buf.start_addr();
        let block = align::checked_align_forward(start + self.curr_offset, align)
            .map(|addr| addr - start)
            .and_then(|offset| Some((offset, offset.checked_add(size)?)))
            .filter(|&(_, end)| end <= self.buf.len());
        let Some((offset, end)) = block else {
            tracing::warn!(
                size,
                align,
                remaining = self.remaining(),
                "linear allocator is out of memory"
            );
            return OutOfMemorySnafu {
                requested: size,
                remaining: self.remaining(),
            }
            .fail();
        };

        self.buf.fill_zero(offset, size);
        self.prev_offset = offset;
        self.curr_offset = end;
        tracing::trace!(offset, size, align, "linear alloc");
        Ok(offset)
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use core::ptr;

    use super::*;
    use crate::testing::{TestHeap, all_eq, fill, offset};

    #[test]
    fn test_sequential_allocations_do_not_overlap() {
        let mut heap = TestHeap::<1024>::new();
        let base = heap.base();
        let mut allocator = LinearAllocator::new(&mut heap.0);

        let sizes = [32, 36, 24];
        let ptrs = sizes.map(|size| allocator.alloc(size).unwrap());
        let offsets = ptrs.map(|ptr| offset(base, ptr));

        assert_eq!(offsets[0], 0);
        for ((prev, size), next) in offsets.iter().zip(sizes).zip(&offsets[1..]) {
            assert!(prev + size <= *next);
            assert_eq!(next % DEFAULT_ALIGNMENT, 0);
        }
        assert_eq!(allocator.used(), offsets[2] + 24);
    }

    #[test]
    fn test_free_restarts_at_first_offset() {
        let mut heap = TestHeap::<1024>::new();
        let mut allocator = LinearAllocator::new(&mut heap.0);

        let first = allocator.alloc(32).unwrap();
        let _ = allocator.alloc(36).unwrap();
        let _ = allocator.alloc(24).unwrap();

        allocator.free();
        assert_eq!(allocator.used(), 0);
        assert_eq!(allocator.alloc(10).unwrap(), first);
    }

    #[test]
    fn test_free_is_idempotent() {
        let mut heap = TestHeap::<256>::new();
        let mut allocator = LinearAllocator::new(&mut heap.0);

        let _ = allocator.alloc(40).unwrap();
        allocator.free();
        let (prev, curr) = (allocator.prev_offset, allocator.curr_offset);
        allocator.free();
        assert_eq!((allocator.prev_offset, allocator.curr_offset), (prev, curr));
    }

    #[test]
    fn test_allocations_are_zeroed_and_aligned() {
        let mut heap = TestHeap::<512>::new();
        let mut allocator = LinearAllocator::new(&mut heap.0);

        let _ = allocator.alloc_align(3, 1).unwrap();
        for align in [1, 2, 4, 8, 16, 32, 64] {
            let ptr = allocator.alloc_align(24, align).unwrap();
            assert_eq!(ptr.as_ptr().addr() % align, 0);
            unsafe {
                assert!(all_eq(ptr, 0, 24));
                fill(ptr, 0x33, 24);
            }
        }

        allocator.free();
        let ptr = allocator.alloc(128).unwrap();
        unsafe {
            assert!(all_eq(ptr, 0, 128));
        }
    }

    #[test]
    fn test_out_of_memory_leaves_state_untouched() {
        let mut heap = TestHeap::<64>::new();
        let mut allocator = LinearAllocator::new(&mut heap.0);

        let _ = allocator.alloc(40).unwrap();
        let (prev, curr) = (allocator.prev_offset, allocator.curr_offset);

        assert!(allocator.alloc(32).is_none());
        assert!(allocator.alloc(usize::MAX).is_none());
        assert_eq!((allocator.prev_offset, allocator.curr_offset), (prev, curr));

        let err = allocator.try_alloc_align(32, 16).unwrap_err();
        assert!(err.is_out_of_memory());

        // The tail still fits a smaller block.
        assert!(allocator.alloc_align(8, 8).is_some());
    }

    #[test]
    fn test_zero_sized_allocation() {
        let mut heap = TestHeap::<32>::new();
        let mut allocator = LinearAllocator::new(&mut heap.0);

        let _ = allocator.alloc(32).unwrap();
        assert!(allocator.alloc_align(0, 1).is_some());
        assert_eq!(allocator.remaining(), 0);
    }

    #[test]
    fn test_allocation_filling_buffer() {
        let mut heap = TestHeap::<64>::new();
        let base = heap.base();
        let mut allocator = LinearAllocator::new(&mut heap.0);

        let _ = allocator.alloc(48).unwrap();
        let last = allocator.alloc(16).unwrap();
        assert_eq!(offset(base, last), 48);
        assert_eq!(allocator.remaining(), 0);

        assert_eq!(allocator.resize(last.as_ptr(), 16, 8), Some(last));
        assert_eq!(allocator.remaining(), 8);
        assert_eq!(allocator.resize(last.as_ptr(), 8, 16), Some(last));
        assert!(allocator.resize(last.as_ptr(), 16, 17).is_none());
        assert_eq!(allocator.remaining(), 0);

        allocator.free();
        assert_eq!(allocator.remaining(), 64);
    }

    #[test]
    fn test_zero_sized_allocation_at_buffer_end() {
        let mut heap = TestHeap::<64>::new();
        let base = heap.base();
        let mut allocator = LinearAllocator::new(&mut heap.0);

        let _ = allocator.alloc(64).unwrap();
        let z = allocator.alloc(0).unwrap();
        assert_eq!(offset(base, z), 64);

        // An empty block is resized by allocating a fresh one.
        assert_eq!(allocator.resize(z.as_ptr(), 0, 0), Some(z));
        assert!(allocator.resize(z.as_ptr(), 0, 1).is_none());
        assert_eq!(allocator.used(), 64);

        allocator.free();
        assert_eq!(offset(base, allocator.alloc(0).unwrap()), 0);
    }

    #[test]
    fn test_resize_last_allocation_in_place() {
        let mut heap = TestHeap::<1024>::new();
        let mut allocator = LinearAllocator::new(&mut heap.0);

        let _ = allocator.alloc(16).unwrap();
        let ptr = allocator.alloc(32).unwrap();
        unsafe {
            fill(ptr, 0x44, 32);
        }
        let used = allocator.used();

        // The bytes past the allocation still hold the heap's garbage pattern.
        let grown = allocator.resize(ptr.as_ptr(), 32, 64).unwrap();
        assert_eq!(grown, ptr);
        assert_eq!(allocator.used(), used + 32);
        unsafe {
            assert!(all_eq(ptr, 0x44, 32));
            assert!(all_eq(ptr.add(32), 0, 32));
        }

        let shrunk = allocator.resize(ptr.as_ptr(), 64, 8).unwrap();
        assert_eq!(shrunk, ptr);
        assert_eq!(allocator.used(), used - 24);
    }

    #[test]
    fn test_resize_older_allocation_copies() {
        let mut heap = TestHeap::<1024>::new();
        let base = heap.base();
        let mut allocator = LinearAllocator::new(&mut heap.0);

        let old = allocator.alloc(16).unwrap();
        unsafe {
            fill(old, 0x66, 16);
        }
        let last = allocator.alloc(16).unwrap();

        let new = allocator.resize(old.as_ptr(), 16, 48).unwrap();
        assert!(offset(base, new) > offset(base, last));
        unsafe {
            assert!(all_eq(new, 0x66, 16));
            assert!(all_eq(new.add(16), 0, 32));
            // The old block is abandoned, not cleared.
            assert!(all_eq(old, 0x66, 16));
        }

        let shrunk = allocator.resize(old.as_ptr(), 16, 4).unwrap();
        assert_ne!(shrunk, old);
        unsafe {
            assert!(all_eq(shrunk, 0x66, 4));
        }
    }

    #[test]
    fn test_resize_null_or_empty_allocates() {
        let mut heap = TestHeap::<128>::new();
        let base = heap.base();
        let mut allocator = LinearAllocator::new(&mut heap.0);

        let ptr = allocator.resize(ptr::null_mut(), 0, 16).unwrap();
        assert_eq!(offset(base, ptr), 0);

        let ptr2 = allocator.resize(ptr.as_ptr(), 0, 16).unwrap();
        assert_eq!(offset(base, ptr2), 16);
    }

    #[test]
    fn test_resize_in_place_beyond_capacity() {
        let mut heap = TestHeap::<64>::new();
        let mut allocator = LinearAllocator::new(&mut heap.0);

        let ptr = allocator.alloc(32).unwrap();
        assert!(allocator.resize(ptr.as_ptr(), 32, 65).is_none());
        assert_eq!(allocator.used(), 32);
        assert_eq!(allocator.resize(ptr.as_ptr(), 32, 64), Some(ptr));
    }

    #[test]
    fn test_resize_copy_out_of_memory() {
        let mut heap = TestHeap::<64>::new();
        let mut allocator = LinearAllocator::new(&mut heap.0);

        let old = allocator.alloc(16).unwrap();
        let _ = allocator.alloc(16).unwrap();
        assert!(allocator.resize(old.as_ptr(), 16, 48).is_none());
        assert_eq!(allocator.used(), 32);
    }

    #[test]
    #[should_panic = "is out of bounds of the backing buffer"]
    fn test_resize_out_of_bounds() {
        let mut heap = TestHeap::<64>::new();
        let mut other = [0_u8; 16];
        let mut allocator = LinearAllocator::new(&mut heap.0);
        let _ = allocator.resize(other.as_mut_ptr(), 16, 32);
    }

    #[test]
    fn test_try_resize_out_of_bounds() {
        let mut heap = TestHeap::<64>::new();
        let mut allocator = LinearAllocator::new(&mut heap.0);
        let ptr = allocator.alloc(16).unwrap();
        let _ = allocator.alloc(16).unwrap();

        // The copied range would run past the buffer end.
        let err = allocator
            .try_resize_align(ptr.as_ptr(), 128, 128, 16)
            .unwrap_err();
        assert!(err.is_out_of_bounds());
        assert_eq!(allocator.used(), 32);
    }

    #[test]
    #[should_panic = "alignment 24 is not a power of two"]
    fn test_alloc_invalid_alignment() {
        let mut heap = TestHeap::<64>::new();
        let mut allocator = LinearAllocator::new(&mut heap.0);
        let _ = allocator.alloc_align(8, 24);
    }

    #[test]
    fn test_try_alloc_invalid_alignment() {
        let mut heap = TestHeap::<64>::new();
        let mut allocator = LinearAllocator::new(&mut heap.0);
        let err = allocator.try_alloc_align(8, 0).unwrap_err();
        assert!(err.is_invalid_alignment());
        assert_eq!(allocator.used(), 0);
    }

    #[test]
    fn test_owns() {
        let mut heap = TestHeap::<64>::new();
        let mut allocator = LinearAllocator::new(&mut heap.0);
        let ptr = allocator.alloc(8).unwrap();
        let outside = [0_u8; 4];

        assert!(allocator.owns(ptr.as_ptr()));
        assert!(!allocator.owns(outside.as_ptr()));
        assert_eq!(allocator.capacity(), 64);
    }
}
