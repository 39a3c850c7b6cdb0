//! # firstfit - A First-Fit Free-List Allocator
//!
//! This crate provides a general purpose heap allocator that carves a single
//! growing region into variable-size blocks tracked by an in-band,
//! address-ordered block list.
//!
//! ## Overview
//!
//! ```text
//!   Free-List Allocator Concept:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                         HEAP MEMORY                                  │
//!   │                                                                      │
//!   │   ┌────┬──────┬────┬──────────┬────┬────┬────┬─────────┐             │
//!   │   │ H  │  A1  │ H  │   free   │ H  │ A3 │ H  │  free   │             │
//!   │   └────┴──────┴────┴──────────┴────┴────┴────┴─────────┘             │
//!   │     ◄──────────►◄────────────────►◄───────►◄───────────►        ▲    │
//!   │       prev/next links follow address order                 Program   │
//!   │                                                              Break   │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   allocate: first free block that fits, split if much larger, else grow.
//!   release:  mark free, then merge with free neighbours on both sides.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   firstfit
//!   ├── align      - Word rounding (align!, checked_align)
//!   ├── block      - In-band block header (internal)
//!   ├── error      - AllocError / ExtendError
//!   ├── source     - HeapSource trait, SbrkHeap, FixedHeap
//!   ├── freelist   - FreeListAllocator: allocate, release, resize, stats
//!   ├── locked     - LockedAllocator: spin-locked GlobalAlloc adapter
//!   └── ffi        - ff_malloc / ff_free / ff_calloc / ff_realloc
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use firstfit::{FixedHeap, FreeListAllocator};
//!
//! let mut allocator = FreeListAllocator::new(FixedHeap::with_capacity(4096).unwrap());
//!
//! let ptr = allocator.allocate(64).unwrap();
//! unsafe {
//!     ptr.as_ptr().write_bytes(0x2A, 64);
//!     let ptr = allocator.reallocate(Some(ptr), 256).unwrap();
//!     assert_eq!(ptr.as_ptr().read(), 0x2A);
//!     allocator.release(Some(ptr)).unwrap();
//! }
//!
//! assert_eq!(allocator.stats().blocks, 1);
//! ```
//!
//! ## Block Layout
//!
//! ```text
//!   Single Block:
//!   ┌───────────────────────┬────────────────────────────────┐
//!   │    Block Header       │         User Data              │
//!   │  ┌─────────────────┐  │                                │
//!   │  │ size: N         │  │  ┌──────────────────────────┐  │
//!   │  │ is_free         │  │  │                          │  │
//!   │  │ magic           │  │  │     N bytes usable       │  │
//!   │  │ prev / next     │  │  │                          │  │
//!   │  └─────────────────┘  │  └──────────────────────────┘  │
//!   │   META_SIZE bytes     │                                │
//!   └───────────────────────┴────────────────────────────────┘
//!                           ▲
//!                           └── Pointer returned to user
//! ```
//!
//! The payload pointer minus [`META_SIZE`] is the header, so the header
//! layout never changes while allocations are live.
//!
//! ## Splitting and Coalescing
//!
//! ```text
//!   split (allocate 16 from a free 96):
//!   ┌────┬────────────────────────┐      ┌────┬────┬────┬──────────────┐
//!   │ H  │        free 96         │  ->  │ H  │ 16 │ H  │   free 48    │
//!   └────┴────────────────────────┘      └────┴────┴────┴──────────────┘
//!
//!   coalesce (release B between two free blocks):
//!   ┌────┬──────┬────┬──────┬────┬──────┐      ┌────┬────────────────────┐
//!   │ H  │ free │ H  │  B   │ H  │ free │  ->  │ H  │        free        │
//!   └────┴──────┴────┴──────┴────┴──────┘      └────┴────────────────────┘
//! ```
//!
//! A block is split only when what is left over exceeds one header. Two free
//! blocks are never left next to each other.
//!
//! ## Limitations
//!
//! - **Word alignment**: payloads are aligned to `usize`; `LockedAllocator`
//!   over-allocates for stricter layouts
//! - **Monotonic heap**: address space is never given back to the source
//! - **Linear search**: first fit walks the whole chain in the worst case
//! - **Single owner**: `FreeListAllocator` needs `&mut self`; share it through
//!   `LockedAllocator`
//! - **Unix-only `SbrkHeap`**: requires `libc` and `sbrk`
//!
//! ## Safety
//!
//! Handing out memory is safe; giving it back is not. `release` and
//! `reallocate` are `unsafe` because a pointer that did not come from the
//! same allocator can corrupt the heap. The cheap checks they do catch double
//! releases and pointers outside the heap.

pub mod align;
mod block;
mod error;
pub mod ffi;
mod freelist;
mod locked;
mod source;

pub use block::META_SIZE;
pub use error::{AllocError, ExtendError};
pub use freelist::{BlockInfo, Blocks, FreeListAllocator, HeapStats};
pub use locked::LockedAllocator;
pub use source::{FixedHeap, HeapSource, SbrkHeap};
