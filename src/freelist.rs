use std::{
  fmt,
  marker::PhantomData,
  ptr::{self, NonNull},
};

use log::{debug, trace};

use crate::{
  align::{WORD, checked_align},
  block::{Block, MAGIC, META_SIZE},
  error::AllocError,
  source::HeapSource,
};

/// First-fit allocator over an address-ordered, in-band block list.
///
/// ```text
///   first                                                         last
///     │                                                             │
///     ▼                                                             ▼
///   ┌─────┬─────────┐   ┌─────┬───────────────┐   ┌─────┬──────────┐
///   │ hdr │  used   │◄─►│ hdr │     free      │◄─►│ hdr │   used   │
///   └─────┴─────────┘   └─────┴───────────────┘   └─────┴──────────┘
/// ```
///
/// Every mutation takes `&mut self`; wrap it in a
/// [`LockedAllocator`](crate::LockedAllocator) to share it between threads.
pub struct FreeListAllocator<H> {
  first: *mut Block,
  last: *mut Block,
  source: H,
}

// The chain lives in memory owned by `source` and is only reachable through `self`.
unsafe impl<H: HeapSource + Send> Send for FreeListAllocator<H> {}

impl<H: HeapSource + Default> Default for FreeListAllocator<H> {
  fn default() -> Self {
    Self::new(H::default())
  }
}

impl<H: HeapSource> FreeListAllocator<H> {
  pub const fn new(source: H) -> Self {
    Self {
      first: ptr::null_mut(),
      last: ptr::null_mut(),
      source,
    }
  }

  pub fn source(&self) -> &H {
    &self.source
  }

  pub fn source_mut(&mut self) -> &mut H {
    &mut self.source
  }

  /// Address of the first block header, once anything has been allocated.
  pub fn head(&self) -> Option<NonNull<u8>> {
    NonNull::new(self.first.cast::<u8>())
  }

  /// Returns a pointer to `size` writable bytes.
  ///
  /// Reuses the lowest-address free block that fits, splitting off what is
  /// left when that is more than a header's worth, and grows the heap
  /// otherwise. The contents are unspecified.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    if size == 0 {
      return Err(AllocError::ZeroSize);
    }

    let request = checked_align(size).ok_or(AllocError::SizeOverflow)?;

    let block = match self.find_free_block(request) {
      Some(block) => {
        trace!("first fit for {request} bytes at {block:?}");
        unsafe {
          (*block).is_free = false;
          self.split(block, request);
        }
        block
      }
      None => self.request_space(request)?,
    };

    Ok(unsafe { NonNull::new_unchecked(Block::payload(block)) })
  }

  /// Allocates `count * elem_size` bytes and zeroes them.
  ///
  /// An overflowing product is rejected rather than truncated.
  pub fn allocate_zeroed(
    &mut self,
    count: usize,
    elem_size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let size = count
      .checked_mul(elem_size)
      .ok_or(AllocError::SizeOverflow)?;

    let payload = self.allocate(size)?;
    unsafe { ptr::write_bytes(payload.as_ptr(), 0, size) };

    Ok(payload)
  }

  /// Resizes the allocation behind `payload`, moving it if it has to grow.
  ///
  /// `None` behaves like [`allocate`](Self::allocate). A request of zero bytes
  /// is treated as one. On failure the original allocation is left untouched.
  ///
  /// # Safety
  ///
  /// `payload` must have been returned by this allocator and not released
  /// since. The checks below catch the common mistakes, not all of them.
  pub unsafe fn reallocate(
    &mut self,
    payload: Option<NonNull<u8>>,
    new_size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let Some(payload) = payload else {
      return self.allocate(new_size);
    };

    let block = unsafe { self.block_for(payload)? };
    let request = checked_align(new_size.max(1)).ok_or(AllocError::SizeOverflow)?;
    let old_size = unsafe { (*block).size };

    if old_size >= request {
      unsafe { self.split(block, request) };
      return Ok(payload);
    }

    let moved = self.allocate(new_size)?;

    unsafe {
      ptr::copy_nonoverlapping(payload.as_ptr(), moved.as_ptr(), old_size.min(new_size));
      self.release(Some(payload))?;
    }
    debug!("moved {old_size} bytes from {payload:?} to {moved:?}");

    Ok(moved)
  }

  /// Gives the allocation back and merges it with free neighbours.
  ///
  /// `None` is a no-op. Address space is never returned to the source.
  ///
  /// # Safety
  ///
  /// `payload` must have been returned by this allocator and not released
  /// since. An already-free block is reported as [`AllocError::DoubleFree`]
  /// and a pointer outside the heap as [`AllocError::InvalidPointer`], both
  /// without touching the heap.
  pub unsafe fn release(
    &mut self,
    payload: Option<NonNull<u8>>,
  ) -> Result<(), AllocError> {
    let Some(payload) = payload else {
      return Ok(());
    };

    let mut block = unsafe { self.block_for(payload)? };

    unsafe {
      (*block).is_free = true;

      self.coalesce_forward(block);

      while let Some(prev) = NonNull::new((*block).prev) {
        let prev = prev.as_ptr();
        if !(*prev).is_free || !Block::touches(prev, block) {
          break;
        }
        self.absorb_next(prev);
        block = prev;
      }
    }

    Ok(())
  }

  /// Payload bytes actually backing a live allocation, at least what was asked for.
  ///
  /// # Safety
  ///
  /// Same contract as [`release`](Self::release).
  pub unsafe fn usable_size(
    &self,
    payload: NonNull<u8>,
  ) -> Result<usize, AllocError> {
    let block = unsafe { self.block_for(payload)? };
    Ok(unsafe { (*block).size })
  }

  /// Walks the chain in address order.
  pub fn blocks(&self) -> Blocks<'_> {
    Blocks {
      current: self.first,
      _heap: PhantomData,
    }
  }

  pub fn stats(&self) -> HeapStats {
    self
      .blocks()
      .fold(HeapStats::default(), |mut stats, block| {
        stats.blocks += 1;
        stats.heap_bytes += block.size + META_SIZE;
        if block.is_free {
          stats.free_blocks += 1;
          stats.free_bytes += block.size;
          stats.largest_free = stats.largest_free.max(block.size);
        } else {
          stats.used_bytes += block.size;
        }
        stats
      })
  }

  fn find_free_block(
    &self,
    size: usize,
  ) -> Option<*mut Block> {
    let mut current = self.first;

    while !current.is_null() {
      unsafe {
        if (*current).is_free && (*current).size >= size {
          return Some(current);
        }
        current = (*current).next;
      }
    }

    None
  }

  /// Appends a fresh occupied block of `size` bytes at the end of the heap.
  fn request_space(
    &mut self,
    size: usize,
  ) -> Result<*mut Block, AllocError> {
    let total = size
      .checked_add(META_SIZE)
      .ok_or(AllocError::SizeOverflow)?;

    let address = self.source.extend(total)?;

    let block = unsafe {
      Block::write(
        address.as_ptr(),
        Block::new(size, false, self.last, ptr::null_mut()),
      )
    };

    if self.last.is_null() {
      self.first = block;
    } else {
      unsafe { (*self.last).next = block };
    }
    self.last = block;

    debug!("grew the heap by {total} bytes for a {size} byte block at {block:?}");

    Ok(block)
  }

  /// Shrinks `block` to `size` bytes when the excess can hold a header plus at
  /// least one word, turning the tail into a free block.
  unsafe fn split(
    &mut self,
    block: *mut Block,
    size: usize,
  ) {
    unsafe {
      let excess = (*block).size - size;
      if excess <= META_SIZE {
        return;
      }

      let next = (*block).next;
      let remainder = Block::write(
        Block::payload(block).add(size),
        Block::new(excess - META_SIZE, true, block, next),
      );

      if next.is_null() {
        self.last = remainder;
      } else {
        (*next).prev = remainder;
      }
      (*block).next = remainder;
      (*block).size = size;

      debug!(
        "split {block:?} into {size} + {} bytes",
        (*remainder).size
      );

      self.coalesce_forward(remainder);
    }
  }

  unsafe fn coalesce_forward(
    &mut self,
    block: *mut Block,
  ) {
    unsafe {
      loop {
        let next = (*block).next;
        if !Block::touches(block, next) || !(*next).is_free {
          break;
        }
        self.absorb_next(block);
      }
    }
  }

  /// Folds `block.next` into `block` and unlinks it.
  unsafe fn absorb_next(
    &mut self,
    block: *mut Block,
  ) {
    unsafe {
      let next = (*block).next;
      let after = (*next).next;

      (*block).size += (*next).size + META_SIZE;
      (*block).next = after;

      if after.is_null() {
        self.last = block;
      } else {
        (*after).prev = block;
      }

      debug!("coalesced {next:?} into {block:?}, now {} bytes", (*block).size);

      Block::invalidate(next);
    }
  }

  /// Maps a payload pointer back to its header, refusing anything that does
  /// not look like a live allocation of this heap.
  unsafe fn block_for(
    &self,
    payload: NonNull<u8>,
  ) -> Result<*mut Block, AllocError> {
    let address = payload.as_ptr() as usize;
    let invalid = AllocError::InvalidPointer { address };

    if self.first.is_null() || address % WORD != 0 {
      return Err(invalid);
    }

    let (low, high) = unsafe {
      (
        Block::payload(self.first) as usize,
        Block::end(self.last) as usize,
      )
    };
    if address < low || address >= high {
      return Err(invalid);
    }

    let block = Block::from_payload(payload.as_ptr());

    unsafe {
      if (*block).magic != MAGIC {
        return Err(invalid);
      }
      if (*block).is_free {
        return Err(AllocError::DoubleFree { address });
      }
    }

    Ok(block)
  }
}

impl<H> fmt::Debug for FreeListAllocator<H> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "FreeListAllocator {{ first: {:?}, last: {:?} }}", self.first, self.last)?;

    let blocks = Blocks {
      current: self.first,
      _heap: PhantomData,
    };
    for block in blocks {
      write!(f, "\n\t{block:?}")?;
    }

    Ok(())
  }
}

/// Snapshot of one block, as seen by [`FreeListAllocator::blocks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  pub address: usize,
  pub payload: usize,
  pub size: usize,
  pub is_free: bool,
}

impl BlockInfo {
  /// First byte past the payload.
  pub fn end(&self) -> usize {
    self.payload + self.size
  }
}

pub struct Blocks<'a> {
  current: *mut Block,
  _heap: PhantomData<&'a ()>,
}

impl Iterator for Blocks<'_> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<BlockInfo> {
    let block = NonNull::new(self.current)?.as_ptr();

    unsafe {
      self.current = (*block).next;

      Some(BlockInfo {
        address: block as usize,
        payload: Block::payload(block) as usize,
        size: (*block).size,
        is_free: (*block).is_free,
      })
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
  pub blocks: usize,
  pub free_blocks: usize,
  pub free_bytes: usize,
  pub used_bytes: usize,
  /// Payload plus headers over the whole chain.
  pub heap_bytes: usize,
  pub largest_free: usize,
}
