//! Custom memory allocators over a single caller-supplied buffer.
//!
//! Each allocator borrows a byte buffer for its whole lifetime and carves
//! allocations out of it without touching the global allocator. The crate is
//! `no_std` compatible, and the allocators never allocate bookkeeping memory
//! of their own: whatever state they need beyond a few offsets lives inside
//! the buffer.
//!
//! # Available Allocators
//!
//! ## [`LinearAllocator`](linear::LinearAllocator)
//!
//! A bump allocator. Best suited for:
//!
//! - Per-frame or per-request scratch memory
//! - Many small allocations released all at once
//!
//! **Performance**: O(1) allocation. Individual allocations cannot be freed.
//!
//! ## [`StackAllocator`](stack::StackAllocator)
//!
//! A LIFO allocator that stores a small header in front of every allocation.
//! Best suited for:
//!
//! - Nested scopes where allocations are released in reverse order
//! - Temporary buffers that must be returned before their callers' buffers
//!
//! **Performance**: O(1) allocation and deallocation of the top allocation.
//!
//! ## [`PoolAllocator`](pool::PoolAllocator)
//!
//! A fixed-size chunk allocator threading an intrusive free list through the
//! unused chunks. Best suited for:
//!
//! - Many objects of the same type freed in arbitrary order
//! - Avoiding fragmentation for a single object size
//!
//! **Performance**: O(1) allocation and deallocation.
//!
//! # Usage Examples
//!
//! ## Basic `LinearAllocator` Usage
//!
//! ```rust
//! use bufalloc::LinearAllocator;
//!
//! let mut buf = [0_u8; 1024];
//! let mut allocator = LinearAllocator::new(&mut buf);
//!
//! let a = allocator.alloc(32).unwrap();
//! let b = allocator.alloc_align(64, 32).unwrap();
//! assert_eq!(b.as_ptr().addr() % 32, 0);
//! assert!(a < b);
//!
//! // Release everything at once.
//! allocator.free();
//! assert_eq!(allocator.used(), 0);
//! ```
//!
//! ## Basic `StackAllocator` Usage
//!
//! ```rust
//! use bufalloc::StackAllocator;
//!
//! let mut buf = [0_u8; 1024];
//! let mut allocator = StackAllocator::new(&mut buf);
//!
//! let outer = allocator.alloc(32).unwrap();
//! let inner = allocator.alloc(16).unwrap();
//!
//! // Frees must happen in reverse order of allocation.
//! allocator.free(inner.as_ptr());
//! allocator.free(outer.as_ptr());
//! assert_eq!(allocator.used(), 0);
//! ```
//!
//! ## Basic `PoolAllocator` Usage
//!
//! ```rust
//! use bufalloc::PoolAllocator;
//!
//! let mut buf = [0_u8; 1024];
//! let mut pool = PoolAllocator::new(&mut buf, 64, 16);
//!
//! let a = pool.alloc();
//! let b = pool.alloc();
//! pool.free(a.as_ptr());
//! pool.free(b.as_ptr());
//! assert_eq!(pool.free_chunk_count(), pool.chunk_count());
//! ```
//!
//! # Design Considerations
//!
//! ## Error Handling
//!
//! Running out of space is expected and reported as `None` by the linear and
//! stack allocators. Every other failure is a broken caller contract (an
//! invalid alignment, a foreign pointer, an out-of-order stack free, an
//! exhausted pool) and panics. Each such method has a `try_*` twin returning
//! [`AllocError`] instead, for callers that would rather handle it.
//!
//! ## Memory Safety
//!
//! Allocations are handed out as raw pointers into the borrowed buffer.
//! Users must ensure:
//!
//! - Allocations are not used after being freed or after the allocator is
//!   reset
//! - Pointers passed to `free` and `resize` came from the same allocator
//!
//! ## Thread Safety
//!
//! The allocators are `Send` but not `Sync`. They can be moved between threads
//! but require external synchronization (e.g., mutexes) for concurrent access.
//!
//! ## Performance Characteristics
//!
//! | Allocator | Allocation | Deallocation | Memory Overhead | Best Use Case |
//! |-----------|------------|--------------|-----------------|---------------|
//! | `LinearAllocator` | O(1) | O(1) (all at once) | Alignment padding | Scratch memory |
//! | `StackAllocator` | O(1) | O(1) (top only) | Header + padding | Nested scopes |
//! | `PoolAllocator` | O(1) | O(1) | Chunk rounding | Same-sized objects |

#![no_std]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod align;
mod buffer;
pub mod error;
pub mod linear;
pub mod pool;
pub mod stack;

#[cfg(test)]
mod testing;

pub use self::{
    align::DEFAULT_ALIGNMENT, error::AllocError, linear::LinearAllocator, pool::PoolAllocator,
    stack::StackAllocator,
};
