//! Errors reported by the allocators.
//!
//! Running out of space is the only recoverable failure. Every other variant
//! describes a broken caller contract: the strict methods (`alloc`, `free`,
//! `resize`, ...) panic on those, while the `try_*` methods hand them back
//! unchanged so that callers can decide for themselves.

use derive_more::IsVariant;
use snafu::{Location, Snafu};

/// An error reported by one of the allocators.
#[derive(Debug, Snafu, IsVariant)]
#[snafu(visibility(pub(crate)))]
pub enum AllocError {
    /// Not enough space left for the requested block.
    #[snafu(display(
        "out of memory: requested {requested} bytes, {remaining} bytes remaining"
    ))]
    OutOfMemory {
        requested: usize,
        remaining: usize,
        #[snafu(implicit)]
        location: Location,
    },
    /// The requested alignment is zero or not a power of two.
    #[snafu(display("alignment {align} is not a power of two"))]
    InvalidAlignment {
        align: usize,
        #[snafu(implicit)]
        location: Location,
    },
    /// A pointer or range lies outside the backing buffer.
    #[snafu(display(
        "memory {addr:#x} is out of bounds of the backing buffer {start:#x}..{end:#x}"
    ))]
    OutOfBounds {
        addr: usize,
        start: usize,
        end: usize,
        #[snafu(implicit)]
        location: Location,
    },
    /// A stack allocation other than the top one was freed.
    #[snafu(display("out of order stack allocator free: {addr:#x} is not the top allocation"))]
    OutOfOrderFree {
        addr: usize,
        #[snafu(implicit)]
        location: Location,
    },
    /// Every pool chunk is in use.
    #[snafu(display("pool allocator has no free memory ({chunk_size}-byte chunks)"))]
    PoolExhausted {
        chunk_size: usize,
        #[snafu(implicit)]
        location: Location,
    },
    /// The pool chunk size cannot hold a free list link.
    #[snafu(display("chunk size {chunk_size} is too small, at least {min} bytes are needed"))]
    ChunkTooSmall {
        chunk_size: usize,
        min: usize,
        #[snafu(implicit)]
        location: Location,
    },
    /// The pool buffer cannot hold a single chunk.
    #[snafu(display(
        "backing buffer length {len} is smaller than the chunk size {chunk_size}"
    ))]
    BufferTooSmall {
        len: usize,
        chunk_size: usize,
        #[snafu(implicit)]
        location: Location,
    },
    /// A pointer inside the pool does not point to the start of a chunk.
    #[snafu(display("memory {addr:#x} is not the start of a {chunk_size}-byte pool chunk"))]
    MisalignedChunk {
        addr: usize,
        chunk_size: usize,
        #[snafu(implicit)]
        location: Location,
    },
}

/// Unwraps the outcome of a strict operation.
///
/// # Panics
///
/// Panics with the error message on any error.
#[track_caller]
pub(crate) fn strict<T>(result: Result<T, AllocError>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => violation(&err),
    }
}

/// Unwraps the outcome of a strict operation that may run out of memory.
///
/// [`AllocError::OutOfMemory`] becomes `None`.
///
/// # Panics
///
/// Panics with the error message on any other error.
#[track_caller]
pub(crate) fn recoverable<T>(result: Result<T, AllocError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) if err.is_out_of_memory() => None,
        Err(err) => violation(&err),
    }
}

#[track_caller]
fn violation(err: &AllocError) -> ! {
    tracing::error!(error = %err, "allocator contract violation");
    panic!("{err}");
}
