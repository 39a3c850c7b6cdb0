//! Heap sources: where the block manager gets new address space from.

use std::{
  alloc::{self, Layout},
  ptr::NonNull,
};

use libc::{c_void, intptr_t, sbrk};
use log::debug;

use crate::{
  align::{WORD, checked_align},
  error::ExtendError,
};

/// Something that can hand out contiguous address space at its current end.
///
/// # Safety
///
/// A successful `extend(n)` must return a pointer that is word aligned and
/// valid for reads and writes of `n` bytes for as long as the source lives,
/// and must never hand out the same bytes twice.
pub unsafe trait HeapSource {
  /// Grows the source by `increment` bytes and returns the previous end.
  fn extend(
    &mut self,
    increment: usize,
  ) -> Result<NonNull<u8>, ExtendError>;
}

/// The process data segment, grown with `sbrk(2)`.
///
/// Only one `SbrkHeap` should be extending the break at a time.
#[derive(Debug, Default)]
pub struct SbrkHeap {
  _private: (),
}

impl SbrkHeap {
  pub const fn new() -> Self {
    Self { _private: () }
  }

  /// The current program break (`sbrk(0)`).
  pub fn current_break() -> *mut u8 {
    unsafe { sbrk(0) }.cast::<u8>()
  }
}

unsafe impl HeapSource for SbrkHeap {
  fn extend(
    &mut self,
    increment: usize,
  ) -> Result<NonNull<u8>, ExtendError> {
    if increment == 0 {
      return Err(ExtendError::ZeroIncrement);
    }

    let out_of_memory = ExtendError::OutOfMemory {
      requested: increment,
    };

    // Someone else may have left the break unaligned.
    let pad = Self::current_break().align_offset(WORD);
    let total = increment
      .checked_add(pad)
      .and_then(|total| intptr_t::try_from(total).ok())
      .ok_or(out_of_memory)?;

    let address = unsafe { sbrk(total) };

    if address == usize::MAX as *mut c_void {
      return Err(out_of_memory);
    }

    let base = NonNull::new(address.cast::<u8>()).ok_or(out_of_memory)?;
    debug!("sbrk grew the break by {total} bytes at {base:?}");

    Ok(unsafe { base.add(pad) })
  }
}

/// A fixed-capacity region with its own monotonic break.
///
/// Handy for an isolated heap that must not touch the process break.
pub struct FixedHeap {
  base: NonNull<u8>,
  offset: usize,
  capacity: usize,
  layout: Layout,
}

// The region is owned exclusively by this value.
unsafe impl Send for FixedHeap {}

impl Drop for FixedHeap {
  fn drop(&mut self) {
    unsafe { alloc::dealloc(self.base.as_ptr(), self.layout) };
  }
}

impl FixedHeap {
  /// Reserves `capacity` bytes. Returns `None` for a zero capacity or when the
  /// global allocator refuses.
  pub fn with_capacity(capacity: usize) -> Option<Self> {
    if capacity == 0 {
      return None;
    }

    let layout = Layout::from_size_align(capacity, WORD).ok()?;
    let base = NonNull::new(unsafe { alloc::alloc(layout) })?;

    Some(Self {
      base,
      offset: 0,
      capacity,
      layout,
    })
  }

  pub fn base(&self) -> NonNull<u8> {
    self.base
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn remaining(&self) -> usize {
    self.capacity - self.offset
  }

  /// First byte not yet handed out.
  pub fn current_break(&self) -> NonNull<u8> {
    unsafe { self.base.add(self.offset) }
  }
}

unsafe impl HeapSource for FixedHeap {
  fn extend(
    &mut self,
    increment: usize,
  ) -> Result<NonNull<u8>, ExtendError> {
    if increment == 0 {
      return Err(ExtendError::ZeroIncrement);
    }
    // Keep the break word aligned for whoever extends next.
    let grant = match checked_align(increment) {
      Some(grant) if grant <= self.remaining() => grant,
      _ => {
        return Err(ExtendError::OutOfMemory {
          requested: increment,
        });
      }
    };

    let base = self.current_break();
    self.offset += grant;

    Ok(base)
  }
}
