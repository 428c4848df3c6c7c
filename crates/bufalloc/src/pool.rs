//! Pool allocator handing out fixed-size chunks.
//!
//! The backing buffer is split into equally sized chunks. Free chunks are
//! linked together through a link written into the chunk itself, so
//! the allocator needs no bookkeeping memory of its own. Allocation pops the
//! head of that list and deallocation pushes onto it, both in O(1).

use core::{iter, ptr::NonNull};

use snafu::ensure;

use crate::{
    align,
    buffer::BackingBuffer,
    error::{
        self, AllocError, BufferTooSmallSnafu, ChunkTooSmallSnafu, MisalignedChunkSnafu,
        PoolExhaustedSnafu,
    },
};

/// Link stored at the start of every free chunk.
///
/// Chunks are only guaranteed to be aligned to the pool's chunk alignment, so
/// nodes are always read and written unaligned.
#[derive(Debug, Clone, Copy)]
struct FreeNode {
    next: Option<NonNull<FreeNode>>,
}

/// Smallest chunk size a pool accepts: a free chunk must hold the link to
/// the next one.
pub const MIN_CHUNK_SIZE: usize = size_of::<FreeNode>();

/// A fixed-size chunk allocator over a caller-supplied buffer.
///
/// Chunks are interchangeable: any chunk may be freed at any time, in any
/// order. Running out of chunks is treated as a contract violation, like in
/// the stack allocator's out-of-order free.
///
/// # Memory Layout
///
/// ```text
/// [skipped][chunk 0][chunk 1][chunk 2]...[chunk n-1][unused tail]
///          ^ buf aligned to chunk_align
/// ```
///
/// # Thread Safety
///
/// This allocator is `Send` but not `Sync`. It can be moved between threads
/// but requires external synchronization for concurrent access.
#[derive(Debug)]
pub struct PoolAllocator<'a> {
    /// Chunk area: aligned start, exactly `chunk_count * chunk_size` bytes.
    buf: BackingBuffer<'a>,
    chunk_size: usize,
    chunk_count: usize,
    free_list_head: Option<NonNull<FreeNode>>,
}

unsafe impl Send for PoolAllocator<'_> {}

impl<'a> PoolAllocator<'a> {
    /// Creates a pool of `chunk_size`-byte chunks aligned to `chunk_align`.
    ///
    /// The start of `buf` is moved forward to the next multiple of
    /// `chunk_align`, and `chunk_size` is rounded up to a multiple of it.
    /// Every chunk starts out free.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_align` is not a power of two, if the rounded chunk
    /// size is below [`MIN_CHUNK_SIZE`], or if the aligned buffer cannot hold
    /// a single chunk.
    ///
    /// # Examples
    ///
    /// ```
    /// # use bufalloc::pool::PoolAllocator;
    /// let mut buf = [0_u8; 256];
    /// let mut pool = PoolAllocator::new(&mut buf, 16, 8);
    /// let chunk = pool.alloc();
    /// pool.free(chunk.as_ptr());
    /// assert_eq!(pool.free_chunk_count(), pool.chunk_count());
    /// ```
    #[must_use]
    #[track_caller]
    pub fn new(buf: &'a mut [u8], chunk_size: usize, chunk_align: usize) -> Self {
        error::strict(Self::try_new(buf, chunk_size, chunk_align))
    }

    /// Fallible version of [`new`](Self::new).
    pub fn try_new(
        buf: &'a mut [u8],
        chunk_size: usize,
        chunk_align: usize,
    ) -> Result<Self, AllocError> {
        align::validate_align(chunk_align)?;

        let len = buf.len();
        let start = buf.as_ptr().addr();
        let skipped = align::checked_align_forward(start, chunk_align).map(|addr| addr - start);
        let chunk_size_aligned = align::checked_align_forward(chunk_size, chunk_align);
        let (Some(skipped), Some(chunk_size)) = (skipped, chunk_size_aligned) else {
            return BufferTooSmallSnafu { len, chunk_size }.fail();
        };

        ensure!(
            chunk_size >= MIN_CHUNK_SIZE,
            ChunkTooSmallSnafu {
                chunk_size,
                min: MIN_CHUNK_SIZE,
            }
        );
        let usable_len = len.saturating_sub(skipped);
        ensure!(
            usable_len >= chunk_size,
            BufferTooSmallSnafu {
                len: usable_len,
                chunk_size,
            }
        );

        let chunk_count = usable_len / chunk_size;
        let (_, usable) = buf.split_at_mut(skipped);
        let (chunks, _) = usable.split_at_mut(chunk_count * chunk_size);

        let mut pool = Self {
            buf: BackingBuffer::new(chunks),
            chunk_size,
            chunk_count,
            free_list_head: None,
        };
        tracing::debug!(
            start = pool.buf.start_addr(),
            skipped,
            chunk_size,
            chunk_count,
            "pool allocator initialized"
        );
        pool.free_all();
        Ok(pool)
    }

    /// Returns the chunk size in bytes, after rounding to the chunk alignment.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Returns the total number of chunks in the pool.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    /// Returns the number of bytes covered by chunks.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Counts the chunks currently on the free list.
    ///
    /// This walks the list, so it takes O(n) time. The walk stops after
    /// [`chunk_count`](Self::chunk_count) nodes, which keeps it finite even if
    /// a chunk was freed twice.
    #[must_use]
    pub fn free_chunk_count(&self) -> usize {
        iter::successors(self.free_list_head, |&node| self.read_node(node).next)
            .take(self.chunk_count)
            .count()
    }

    /// Returns `true` if `ptr` points into the chunk area.
    #[must_use]
    pub fn owns(&self, ptr: *const u8) -> bool {
        self.buf.contains(ptr)
    }

    /// Takes a free chunk and returns it zero-filled.
    ///
    /// # Panics
    ///
    /// Panics if every chunk is in use.
    #[track_caller]
    pub fn alloc(&mut self) -> NonNull<u8> {
        error::strict(self.try_alloc())
    }

    /// Fallible version of [`alloc`](Self::alloc).
    ///
    /// Returns [`AllocError::PoolExhausted`] if every chunk is in use.
    pub fn try_alloc(&mut self) -> Result<NonNull<u8>, AllocError> {
        let Some(node) = self.free_list_head else {
            tracing::warn!(chunk_size = self.chunk_size, "pool allocator is exhausted");
            return PoolExhaustedSnafu {
                chunk_size: self.chunk_size,
            }
            .fail();
        };

        self.free_list_head = self.read_node(node).next;
        let offset = self.node_offset(node);
        self.buf.fill_zero(offset, self.chunk_size);
        tracing::trace!(offset, "pool alloc");
        Ok(node.cast())
    }

    /// Returns a chunk to the pool.
    ///
    /// A null `ptr` is ignored. No ordering is enforced: chunks are
    /// interchangeable.
    ///
    /// # Panics
    ///
    /// Panics if `ptr` lies outside the chunk area or does not point to the
    /// start of a chunk.
    #[track_caller]
    pub fn free(&mut self, ptr: *mut u8) {
        error::strict(self.try_free(ptr));
    }

    /// Fallible version of [`free`](Self::free).
    ///
    /// Returns [`AllocError::OutOfBounds`] or [`AllocError::MisalignedChunk`]
    /// without modifying the pool.
    pub fn try_free(&mut self, ptr: *mut u8) -> Result<(), AllocError> {
        if ptr.is_null() {
            return Ok(());
        }

        let offset = self.buf.offset_of(ptr)?;
        ensure!(
            offset.is_multiple_of(self.chunk_size),
            MisalignedChunkSnafu {
                addr: ptr.addr(),
                chunk_size: self.chunk_size,
            }
        );

        self.push(offset);
        tracing::trace!(offset, "pool free");
        Ok(())
    }

    /// Marks every chunk as free.
    ///
    /// Chunks are pushed in address order, so the last chunk ends up at the
    /// head of the list.
    pub fn free_all(&mut self) {
        self.free_list_head = None;
        for index in 0..self.chunk_count {
            self.push(index * self.chunk_size);
        }
        tracing::debug!(chunk_count = self.chunk_count, "pool allocator reset");
    }

    fn push(&mut self, offset: usize) {
        self.buf.write(
            offset,
            FreeNode {
                next: self.free_list_head,
            },
        );
        self.free_list_head = Some(self.buf.ptr_at(offset).cast());
    }

    fn node_offset(&self, node: NonNull<FreeNode>) -> usize {
        node.as_ptr().addr() - self.buf.start_addr()
    }

    fn read_node(&self, node: NonNull<FreeNode>) -> FreeNode {
        // Nodes are only ever created by `push` inside the chunk area.
        unsafe { self.buf.read(self.node_offset(node)) }
    }
}
