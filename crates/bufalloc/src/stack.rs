//! Stack (LIFO) allocator.
//!
//! Allocations are carved sequentially like in the linear allocator, but each
//! one is preceded by a small header so that the most recent
//! allocation can be freed individually and the stack top rewound exactly.
//!
//! # Memory Layout
//!
//! ```text
//!            padding (header included)
//!           <------------------------>
//! ...[prev][.........pad......][hdr][payload][.......free.......]
//!          ^ start of the block       ^ prev_offset  ^ curr_offset
//! ```
//!
//! The header records how many bytes separate the previous stack top from the
//! payload, and where the allocation below this one starts. Freeing must
//! happen in reverse order of allocation: only the top allocation can be
//! freed.

use core::ptr::NonNull;

use crate::{
    align::{self, DEFAULT_ALIGNMENT},
    buffer::BackingBuffer,
    error::{self, AllocError, OutOfBoundsSnafu, OutOfMemorySnafu, OutOfOrderFreeSnafu},
};

/// Largest alignment the stack allocator honors.
///
/// The header stores its padding in a single byte, so larger alignments
/// could not be encoded. Requests above this value are capped to it.
pub const MAX_ALIGNMENT: usize = 128;

/// Per-allocation bookkeeping stored right before the payload.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StackHeader {
    /// Bytes between the previous stack top and the payload, header included.
    padding: u8,
    /// Payload offset of the allocation below this one (0 if none).
    prev_offset: usize,
}

const HEADER_SIZE: usize = size_of::<StackHeader>();

// The largest padding is `MAX_ALIGNMENT + HEADER_SIZE - 1`.
const _: () = assert!(MAX_ALIGNMENT + HEADER_SIZE - 1 <= 0xff);

/// Computes the padding needed at `addr` to reach an address aligned to
/// `align` with at least [`HEADER_SIZE`] bytes in front of it.
fn padding_with_header(addr: usize, align: usize) -> usize {
    let modulo = addr & (align - 1);
    let mut padding = if modulo == 0 { 0 } else { align - modulo };
    if padding < HEADER_SIZE {
        padding += (HEADER_SIZE - padding).next_multiple_of(align);
    }
    padding
}

/// A LIFO allocator over a caller-supplied buffer.
///
/// Like [`LinearAllocator`](crate::linear::LinearAllocator), every
/// allocation is zero-filled and running out of space leaves the allocator
/// untouched. In addition, the most recent allocation can be freed with
/// [`free`](Self::free), which rewinds the stack top to where it was before
/// that allocation.
///
/// Freeing any allocation other than the top one is a contract violation,
/// since it would desynchronize the rewind offsets of every allocation still
/// live above it.
///
/// # Thread Safety
///
/// This allocator is `Send` but not `Sync`. It can be moved between threads
/// but requires external synchronization for concurrent access.
#[derive(Debug)]
pub struct StackAllocator<'a> {
    buf: BackingBuffer<'a>,
    /// Payload offset of the top allocation, 0 if the stack is empty.
    prev_offset: usize,
    /// Offset where the next allocation may start.
    curr_offset: usize,
}

unsafe impl Send for StackAllocator<'_> {}

impl<'a> StackAllocator<'a> {
    /// Creates a stack allocator managing `buf`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use bufalloc::stack::StackAllocator;
    /// let mut buf = [0_u8; 1024];
    /// let mut allocator = StackAllocator::new(&mut buf);
    /// let a = allocator.alloc(16).unwrap();
    /// let b = allocator.alloc(16).unwrap();
    /// allocator.free(b.as_ptr());
    /// allocator.free(a.as_ptr());
    /// assert_eq!(allocator.used(), 0);
    /// ```
    #[must_use]
    pub fn new(buf: &'a mut [u8]) -> Self {
        let buf = BackingBuffer::new(buf);
        tracing::debug!(
            start = buf.start_addr(),
            len = buf.len(),
            "stack allocator initialized"
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

    /// Returns the number of bytes between the buffer start and the stack
    /// top, headers and padding included.
    #[must_use]
    pub fn used(&self) -> usize {
        self.curr_offset
    }

    /// Returns the number of bytes above the stack top.
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
    /// Alignments above [`MAX_ALIGNMENT`] are capped to it. Returns `None` if
    /// the allocation, its header and its padding do not fit; the allocator
    /// state is unchanged in that case.
    ///
    /// # Panics
    ///
    /// Panics if `align` is not a power of two.
    #[track_caller]
    pub fn alloc_align(&mut self, size: usize, align: usize) -> Option<NonNull<u8>> {
        error::recoverable(self.try_alloc_align(size, align))
    }

    /// Allocates `size` zeroed bytes aligned to [`DEFAULT_ALIGNMENT`].
    #[track_caller]
    pub fn alloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        self.alloc_align(size, DEFAULT_ALIGNMENT)
    }

    /// Fallible version of [`alloc_align`](Self::alloc_align).
    pub fn try_alloc_align(&mut self, size: usize, align: usize) -> Result<NonNull<u8>, AllocError> {
        align::validate_align(align)?;
        let offset = self.push(size, align)?;
        Ok(self.buf.ptr_at(offset))
    }

    /// Frees the top allocation.
    ///
    /// - A null `ptr` is ignored.
    /// - A `ptr` at or above the stack top (already freed, or never handed
    ///   out) is ignored, which tolerates double frees.
    ///
    /// # Panics
    ///
    /// Panics if `ptr` does not point into the backing buffer (the
    /// one-past-the-end address of a zero-sized top counts as inside), or if
    /// it is a live allocation other than the top one.
    #[track_caller]
    pub fn free(&mut self, ptr: *mut u8) {
        error::strict(self.try_free(ptr));
    }

    /// Fallible version of [`free`](Self::free).
    ///
    /// Returns [`AllocError::OutOfBounds`] or [`AllocError::OutOfOrderFree`]
    /// without modifying the allocator.
    pub fn try_free(&mut self, ptr: *mut u8) -> Result<(), AllocError> {
        if ptr.is_null() {
            return Ok(());
        }

        let offset = self.buf.offset_of_inclusive(ptr)?;
        if self.is_top(offset) {
            return self.pop(offset);
        }
        if offset >= self.curr_offset {
            tracing::trace!(offset, "stack free of a released block ignored");
            return Ok(());
        }
        OutOfOrderFreeSnafu { addr: ptr.addr() }.fail()
    }

    /// Releases every allocation at once.
    pub fn free_all(&mut self) {
        tracing::debug!(used = self.curr_offset, "stack allocator reset");
        self.prev_offset = 0;
        self.curr_offset = 0;
    }

    /// Resizes the allocation at `ptr` from `old_size` to `new_size` bytes.
    ///
    /// - A null `ptr` allocates a new block.
    /// - The top allocation is resized in place and keeps its address. Grown
    ///   bytes are zeroed.
    /// - Otherwise, a `new_size` of zero frees `ptr` (subject to the same
    ///   ordering rule as [`free`](Self::free)) and returns `None`.
    /// - A `ptr` at or above the stack top is treated like a double free and
    ///   returns `None`.
    /// - Any other allocation is copied into a new block at the top. The old
    ///   block is abandoned without an ordering check: copying never rewinds
    ///   the stack.
    ///
    /// Also returns `None` if there is not enough space left.
    ///
    /// # Panics
    ///
    /// Panics if `align` is not a power of two, if `ptr` does not point into
    /// the backing buffer, or if a zero-size resize frees out of order.
    #[track_caller]
    pub fn resize_align(
        &mut self,
        ptr: *mut u8,
        old_size: usize,
        new_size: usize,
        align: usize,
    ) -> Option<NonNull<u8>> {
        error::recoverable(self.try_resize_align(ptr, old_size, new_size, align)).flatten()
    }

    /// Resizes an allocation using [`DEFAULT_ALIGNMENT`].
    #[track_caller]
    pub fn resize(&mut self, ptr: *mut u8, old_size: usize, new_size: usize) -> Option<NonNull<u8>> {
        self.resize_align(ptr, old_size, new_size, DEFAULT_ALIGNMENT)
    }

    /// Fallible version of [`resize_align`](Self::resize_align).
    ///
    /// `Ok(None)` means that `ptr` was freed or was already released.
    pub fn try_resize_align(
        &mut self,
        ptr: *mut u8,
        old_size: usize,
        new_size: usize,
        align: usize,
    ) -> Result<Option<NonNull<u8>>, AllocError> {
        align::validate_align(align)?;

        if ptr.is_null() {
            return self.try_alloc_align(new_size, align).map(Some);
        }

        let offset = self.buf.offset_of_inclusive(ptr)?;
        if self.is_top(offset) {
            if old_size == new_size {
                return Ok(Some(self.buf.ptr_at(offset)));
            }
            let Some(end) = offset
                .checked_add(new_size)
                .filter(|&end| end <= self.buf.len())
            else {
                tracing::warn!(old_size, new_size, "stack allocator cannot grow in place");
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
            tracing::trace!(offset, old_size, new_size, "stack resize in place");
            return Ok(Some(self.buf.ptr_at(offset)));
        }

        if new_size == 0 {
            self.try_free(ptr)?;
            return Ok(None);
        }
        if offset >= self.curr_offset {
            tracing::trace!(offset, "stack resize of a released block ignored");
            return Ok(None);
        }
        if old_size == new_size {
            return Ok(Some(self.buf.ptr_at(offset)));
        }

        let copy_size = old_size.min(new_size);
        self.buf.check_range(offset, copy_size)?;
        let new_offset = self.push(new_size, align)?;
        self.buf.copy_within(offset, new_offset, copy_size);
        tracing::trace!(offset, new_offset, copy_size, "stack resize by copy");
        Ok(Some(self.buf.ptr_at(new_offset)))
    }

    fn is_top(&self, offset: usize) -> bool {
        // Payloads always sit after their header, so 0 never names one.
        self.prev_offset != 0 && offset == self.prev_offset
    }

    /// Pushes a new zeroed `size`-byte block with its header.
    ///
    /// `align` must already be validated.
    fn push(&mut self, size: usize, align: usize) -> Result<usize, AllocError> {
        let align = align.min(MAX_ALIGNMENT);
        let padding = padding_with_header(self.buf.start_addr() + self.curr_offset, align);
        let block = self
            .curr_offset
            .checked_add(padding)
            .and_then(|offset| Some((offset, offset.checked_add(size)?)))
            .filter(|&(_, end)| end <= self.buf.len());
        let Some((offset, end)) = block else {
            tracing::warn!(
                size,
                align,
                remaining = self.remaining(),
                "stack allocator is out of memory"
            );
            return OutOfMemorySnafu {
                requested: size,
                remaining: self.remaining(),
            }
            .fail();
        };

        #[expect(clippy::cast_possible_truncation)]
        let header = StackHeader {
            padding: padding as u8,
            prev_offset: self.prev_offset,
        };
        self.buf.write(offset - HEADER_SIZE, header);
        self.buf.fill_zero(offset, size);
        self.prev_offset = offset;
        self.curr_offset = end;
        tracing::trace!(offset, size, align, padding, "stack alloc");
        Ok(offset)
    }

    /// Rewinds the stack past the top allocation at `offset`.
    fn pop(&mut self, offset: usize) -> Result<(), AllocError> {
        let header = unsafe { self.buf.read::<StackHeader>(offset - HEADER_SIZE) };
        // A header overwritten by the caller must not move the offsets out of
        // the buffer or above the freed block.
        let Some(start) = offset
            .checked_sub(usize::from(header.padding))
            .filter(|&start| header.prev_offset <= start)
        else {
            return OutOfBoundsSnafu {
                addr: self.buf.start_addr() + header.prev_offset,
                start: self.buf.start_addr(),
                end: self.buf.start_addr() + offset,
            }
            .fail();
        };

        self.curr_offset = start;
        self.prev_offset = header.prev_offset;
        tracing::trace!(offset, start, "stack free");
        Ok(())
    }
}
