use std::{
  alloc::{GlobalAlloc, Layout},
  process,
  ptr::{self, NonNull},
};

use log::error;
use spin::{Mutex, MutexGuard};

use crate::{
  align::WORD,
  error::AllocError,
  freelist::FreeListAllocator,
  source::{HeapSource, SbrkHeap},
};

/// A [`FreeListAllocator`] behind a spin lock, usable as `#[global_allocator]`.
///
/// ```rust,ignore
/// use firstfit::LockedAllocator;
///
/// #[global_allocator]
/// static GLOBAL: LockedAllocator<firstfit::SbrkHeap> = LockedAllocator::sbrk();
/// ```
///
/// Payloads are word aligned. Stricter layouts are served from a larger block
/// with the real payload address stored in the word just below the pointer
/// handed out:
///
/// ```text
///   payload                    aligned (multiple of layout.align())
///   ▼                          ▼
///   ┌──────────────┬──────────┬─────────────────────────┬──────┐
///   │   padding    │ payload  │   layout.size() bytes   │ ...  │
///   └──────────────┴──────────┴─────────────────────────┴──────┘
/// ```
pub struct LockedAllocator<H> {
  inner: Mutex<FreeListAllocator<H>>,
}

impl<H: HeapSource> LockedAllocator<H> {
  pub const fn new(source: H) -> Self {
    Self {
      inner: Mutex::new(FreeListAllocator::new(source)),
    }
  }

  pub fn lock(&self) -> MutexGuard<'_, FreeListAllocator<H>> {
    self.inner.lock()
  }
}

impl LockedAllocator<SbrkHeap> {
  /// The process break as a heap, for statics.
  pub const fn sbrk() -> Self {
    Self::new(SbrkHeap::new())
  }
}

/// A rejected pointer at this boundary is heap corruption; unwinding out of an
/// allocator is not allowed, so the process goes down.
pub(crate) fn reject(
  ptr: *mut u8,
  error: AllocError,
) -> ! {
  error!("allocator rejected {ptr:?}: {error}");
  process::abort()
}

fn into_raw(result: Result<NonNull<u8>, AllocError>) -> *mut u8 {
  result.map_or(ptr::null_mut(), NonNull::as_ptr)
}

unsafe fn over_aligned<H: HeapSource>(
  heap: &mut FreeListAllocator<H>,
  layout: Layout,
) -> *mut u8 {
  let Some(total) = layout.size().checked_add(layout.align()) else {
    return ptr::null_mut();
  };
  let Ok(payload) = heap.allocate(total) else {
    return ptr::null_mut();
  };

  let payload = payload.as_ptr();
  let offset = payload.wrapping_add(WORD).align_offset(layout.align()) + WORD;

  unsafe {
    let aligned = payload.add(offset);
    aligned.cast::<*mut u8>().sub(1).write(payload);
    aligned
  }
}

/// Undoes [`over_aligned`] when needed.
unsafe fn payload_of(
  ptr: *mut u8,
  layout: Layout,
) -> *mut u8 {
  if layout.align() <= WORD {
    ptr
  } else {
    unsafe { ptr.cast::<*mut u8>().sub(1).read() }
  }
}

unsafe impl<H: HeapSource + Send> GlobalAlloc for LockedAllocator<H> {
  unsafe fn alloc(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    let mut heap = self.lock();

    if layout.align() <= WORD {
      into_raw(heap.allocate(layout.size().max(1)))
    } else {
      unsafe { over_aligned(&mut heap, layout) }
    }
  }

  unsafe fn dealloc(
    &self,
    ptr: *mut u8,
    layout: Layout,
  ) {
    let payload = unsafe { payload_of(ptr, layout) };
    let result = unsafe { self.lock().release(NonNull::new(payload)) };

    if let Err(error) = result {
      reject(ptr, error);
    }
  }

  unsafe fn alloc_zeroed(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    if layout.align() <= WORD {
      return into_raw(self.lock().allocate_zeroed(layout.size().max(1), 1));
    }

    let ptr = unsafe { self.alloc(layout) };
    if !ptr.is_null() {
      unsafe { ptr::write_bytes(ptr, 0, layout.size()) };
    }
    ptr
  }

  unsafe fn realloc(
    &self,
    ptr: *mut u8,
    layout: Layout,
    new_size: usize,
  ) -> *mut u8 {
    if layout.align() <= WORD {
      let result = unsafe { self.lock().reallocate(NonNull::new(ptr), new_size) };

      return match result {
        Ok(moved) => moved.as_ptr(),
        Err(error @ (AllocError::InvalidPointer { .. } | AllocError::DoubleFree { .. })) => {
          reject(ptr, error)
        }
        Err(_) => ptr::null_mut(),
      };
    }

    let new_layout = unsafe { Layout::from_size_align_unchecked(new_size, layout.align()) };
    let moved = unsafe { self.alloc(new_layout) };

    if !moved.is_null() {
      unsafe {
        ptr::copy_nonoverlapping(ptr, moved, layout.size().min(new_size));
        self.dealloc(ptr, layout);
      }
    }
    moved
  }
}

#[cfg(test)]
mod tests {
  use std::thread;

  use test_log::test;

  use super::*;
  use crate::{block::META_SIZE, source::FixedHeap};

  fn locked(capacity: usize) -> LockedAllocator<FixedHeap> {
    LockedAllocator::new(FixedHeap::with_capacity(capacity).unwrap())
  }

  #[test]
  fn word_aligned_layouts_go_straight_through() {
    let allocator = locked(4096);
    let layout = Layout::new::<u64>();

    unsafe {
      let ptr = allocator.alloc(layout);
      assert!(!ptr.is_null());
      assert_eq!(ptr as usize % layout.align(), 0);
      assert_eq!(
        ptr as usize,
        allocator.lock().head().unwrap().as_ptr() as usize + META_SIZE
      );

      ptr.cast::<u64>().write(0xDEAD_BEEF);
      assert_eq!(ptr.cast::<u64>().read(), 0xDEAD_BEEF);

      allocator.dealloc(ptr, layout);
    }
    assert_eq!(allocator.lock().stats().free_blocks, 1);
  }

  #[test]
  fn over_aligned_layouts_are_honoured() {
    let allocator = locked(64 * 1024);

    for align in [16, 64, 4096] {
      let layout = Layout::from_size_align(24, align).unwrap();

      unsafe {
        let ptr = allocator.alloc(layout);
        assert!(!ptr.is_null());
        assert_eq!(ptr as usize % align, 0, "align {align}");

        ptr::write_bytes(ptr, 0xCD, layout.size());
        allocator.dealloc(ptr, layout);
      }
    }

    let stats = allocator.lock().stats();
    assert_eq!(stats.blocks, stats.free_blocks);
  }

  #[test]
  fn zeroed_layouts_are_zero() {
    let allocator = locked(4096);

    for layout in [Layout::new::<[u8; 40]>(), Layout::from_size_align(40, 32).unwrap()] {
      unsafe {
        let dirty = allocator.alloc(layout);
        ptr::write_bytes(dirty, 0xFF, layout.size());
        allocator.dealloc(dirty, layout);

        let ptr = allocator.alloc_zeroed(layout);
        let bytes = std::slice::from_raw_parts(ptr, layout.size());
        assert!(bytes.iter().all(|&byte| byte == 0));
        allocator.dealloc(ptr, layout);
      }
    }
  }

  #[test]
  fn realloc_keeps_the_prefix() {
    let allocator = locked(16 * 1024);

    for align in [8, 128] {
      let layout = Layout::from_size_align(16, align).unwrap();

      unsafe {
        let ptr = allocator.alloc(layout);
        for i in 0..16 {
          ptr.add(i).write(i as u8);
        }

        let grown = allocator.realloc(ptr, layout, 512);
        assert!(!grown.is_null());
        assert_eq!(grown as usize % align, 0);
        for i in 0..16 {
          assert_eq!(grown.add(i).read(), i as u8);
        }

        allocator.dealloc(grown, Layout::from_size_align(512, align).unwrap());
      }
    }
  }

  #[test]
  fn exhaustion_is_a_null_pointer() {
    let allocator = locked(256);

    unsafe {
      assert!(allocator.alloc(Layout::new::<[u8; 1024]>()).is_null());
      assert!(allocator.alloc(Layout::from_size_align(512, 64).unwrap()).is_null());

      let layout = Layout::new::<[u8; 16]>();
      let ptr = allocator.alloc(layout);
      assert!(allocator.realloc(ptr, layout, 4096).is_null());
      allocator.dealloc(ptr, layout);
    }
  }

  #[test]
  fn threads_share_one_heap() {
    let allocator = locked(1024 * 1024);

    thread::scope(|scope| {
      for seed in 0..4u8 {
        let allocator = &allocator;
        scope.spawn(move || {
          for round in 0..200usize {
            let layout = Layout::from_size_align(8 + (round * 13) % 200, 8).unwrap();
            unsafe {
              let ptr = allocator.alloc(layout);
              assert!(!ptr.is_null());
              ptr::write_bytes(ptr, seed, layout.size());
              let bytes = std::slice::from_raw_parts(ptr, layout.size());
              assert!(bytes.iter().all(|&byte| byte == seed));
              allocator.dealloc(ptr, layout);
            }
          }
        });
      }
    });

    let stats = allocator.lock().stats();
    assert_eq!(stats.blocks, 1);
    assert_eq!(stats.free_blocks, 1);
  }
}
