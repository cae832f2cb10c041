/// Alignment unit for every payload size and block offset, in bytes.
pub const ALIGNMENT: usize = 8;

/// Rounds the given size up to the next multiple of [`ALIGNMENT`].
///
/// # Examples
///
/// ```rust
/// use fitalloc::align;
///
/// assert_eq!(align!(13), 16);
/// assert_eq!(align!(16), 16);
/// assert_eq!(align!(1), 8);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + $crate::align::ALIGNMENT - 1) & !($crate::align::ALIGNMENT - 1)
  };
}

/// Rounds the given size down to a multiple of [`ALIGNMENT`].
///
/// ```rust
/// use fitalloc::align_down;
///
/// assert_eq!(align_down!(13), 8);
/// assert_eq!(align_down!(7), 0);
/// ```
#[macro_export]
macro_rules! align_down {
  ($value:expr) => {
    $value & !($crate::align::ALIGNMENT - 1)
  };
}

/// Overflow-aware version of [`align!`]. Returns `None` when rounding up
/// would wrap around `usize::MAX`.
pub fn checked_align(size: usize) -> Option<usize> {
  size
    .checked_add(ALIGNMENT - 1)
    .map(|padded| align_down!(padded))
}

#[inline]
pub fn is_aligned(value: usize) -> bool {
  value & (ALIGNMENT - 1) == 0
}
