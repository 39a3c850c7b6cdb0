use std::{mem, ptr};

use static_assertions::{const_assert, const_assert_eq};

use crate::{align, align::WORD};

/// Tag stamped into every live header. Cleared when the header is absorbed.
pub const MAGIC: u32 = 0xF1F7_B10C;

/// Bytes of metadata in front of every payload.
///
/// Payload pointers are turned back into headers by subtracting this, so it
/// is part of the allocator's ABI.
pub const META_SIZE: usize = align!(mem::size_of::<Block>());

const_assert_eq!(META_SIZE % WORD, 0);
const_assert!(mem::align_of::<Block>() <= WORD);
#[cfg(target_pointer_width = "64")]
const_assert_eq!(META_SIZE, 32);

/// In-band block header.
///
/// ```text
///   ┌────────┬─────────┬───────┬────────┬────────┬───────────────────────┐
///   │  size  │ is_free │ magic │  prev  │  next  │  payload (size bytes) │
///   └────────┴─────────┴───────┴────────┴────────┴───────────────────────┘
///   ▲                                            ▲
///   block                                        block + META_SIZE
/// ```
#[repr(C)]
pub struct Block {
  pub size: usize,
  pub is_free: bool,
  pub magic: u32,
  pub prev: *mut Block,
  pub next: *mut Block,
}

impl Block {
  pub fn new(
    size: usize,
    is_free: bool,
    prev: *mut Block,
    next: *mut Block,
  ) -> Self {
    Self {
      size,
      is_free,
      magic: MAGIC,
      prev,
      next,
    }
  }

  /// Writes a fresh header at `at` and returns it.
  ///
  /// # Safety
  ///
  /// `at` must be word aligned and valid for writes of `META_SIZE` bytes.
  pub unsafe fn write(
    at: *mut u8,
    header: Block,
  ) -> *mut Block {
    let block = at.cast::<Block>();
    unsafe { block.write(header) };
    block
  }

  /// # Safety
  ///
  /// `block` must point at a header inside the managed heap.
  pub unsafe fn payload(block: *mut Block) -> *mut u8 {
    unsafe { block.cast::<u8>().add(META_SIZE) }
  }

  /// First byte past the payload of `block`.
  ///
  /// # Safety
  ///
  /// `block` must point at a live header.
  pub unsafe fn end(block: *mut Block) -> *mut u8 {
    unsafe { Self::payload(block).add((*block).size) }
  }

  /// Header address for a payload pointer. Pure arithmetic, nothing is read.
  pub fn from_payload(payload: *mut u8) -> *mut Block {
    payload.wrapping_sub(META_SIZE).cast::<Block>()
  }

  /// True when `next` starts exactly where `block`'s payload ends.
  ///
  /// # Safety
  ///
  /// `block` must point at a live header.
  pub unsafe fn touches(
    block: *mut Block,
    next: *mut Block,
  ) -> bool {
    !next.is_null() && unsafe { Self::end(block) } == next.cast::<u8>()
  }

  /// Clears the tag so a stale payload pointer to this header is rejected.
  ///
  /// # Safety
  ///
  /// `block` must point at a header that is being absorbed.
  pub unsafe fn invalidate(block: *mut Block) {
    unsafe {
      (*block).magic = 0;
      (*block).prev = ptr::null_mut();
      (*block).next = ptr::null_mut();
    }
  }
}
