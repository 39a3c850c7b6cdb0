/// Machine word size. Every block size and every header address is a multiple of it.
pub const WORD: usize = ::core::mem::size_of::<usize>();

/// Rounds `value` up to the machine word.
///
/// # Examples
///
/// ```rust
/// use firstfit::align;
///
/// match std::mem::size_of::<usize>() {
///     8 => assert_eq!(align!(13), 16), // 64 bit machine.
///     4 => assert_eq!(align!(11), 12), // 32 bit machine.
///     _ => {},
/// };
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + $crate::align::WORD - 1) & !($crate::align::WORD - 1)
  };
}

/// Same as [`align!`] but returns `None` instead of wrapping near `usize::MAX`.
pub const fn checked_align(value: usize) -> Option<usize> {
  match value.checked_add(WORD - 1) {
    Some(padded) => Some(padded & !(WORD - 1)),
    None => None,
  }
}
