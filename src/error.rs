use thiserror::Error;

/// Failure of a [`HeapSource`](crate::HeapSource) to grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ExtendError {
  #[error("heap cannot be extended by zero bytes")]
  ZeroIncrement,
  #[error("heap source cannot grow by {requested} bytes")]
  OutOfMemory { requested: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
  #[error("zero-sized allocation")]
  ZeroSize,
  #[error("requested size overflows the address space")]
  SizeOverflow,
  #[error(transparent)]
  OutOfMemory(#[from] ExtendError),
  #[error("{address:#x} was not handed out by this allocator")]
  InvalidPointer { address: usize },
  #[error("{address:#x} is already free")]
  DoubleFree { address: usize },
}
