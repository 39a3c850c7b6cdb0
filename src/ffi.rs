//! C entry points over one process-wide heap grown with `sbrk(2)`.
//!
//! Every failure comes back as a null pointer, except releasing something
//! that is not a live allocation, which aborts.

use std::ptr::{self, NonNull};

pub use libc::{c_void, size_t};

use crate::{
  locked::{LockedAllocator, reject},
  source::SbrkHeap,
};

static HEAP: LockedAllocator<SbrkHeap> = LockedAllocator::sbrk();

fn into_c(result: Result<NonNull<u8>, crate::AllocError>) -> *mut c_void {
  match result {
    Ok(payload) => payload.as_ptr().cast::<c_void>(),
    Err(_) => ptr::null_mut(),
  }
}

#[unsafe(no_mangle)]
pub extern "C" fn ff_malloc(size: size_t) -> *mut c_void {
  into_c(HEAP.lock().allocate(size))
}

#[unsafe(no_mangle)]
pub extern "C" fn ff_calloc(
  count: size_t,
  elem_size: size_t,
) -> *mut c_void {
  into_c(HEAP.lock().allocate_zeroed(count, elem_size))
}

/// # Safety
///
/// `ptr` must be null or come from `ff_malloc`, `ff_calloc` or `ff_realloc`
/// and not have been freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ff_realloc(
  ptr: *mut c_void,
  size: size_t,
) -> *mut c_void {
  let result = unsafe { HEAP.lock().reallocate(NonNull::new(ptr.cast::<u8>()), size) };

  match result {
    Err(error @ (crate::AllocError::InvalidPointer { .. } | crate::AllocError::DoubleFree { .. })) => {
      reject(ptr.cast::<u8>(), error)
    }
    other => into_c(other),
  }
}

/// # Safety
///
/// Same as [`ff_realloc`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ff_free(ptr: *mut c_void) {
  let result = unsafe { HEAP.lock().release(NonNull::new(ptr.cast::<u8>())) };

  if let Err(error) = result {
    reject(ptr.cast::<u8>(), error);
  }
}
