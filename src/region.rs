//! The byte range a [`crate::Heap`] carves into blocks.
//!
//! ```text
//!   raw range   ┌──┬───────────────────────────────────────────────┬───┐
//!               │▒▒│                 usable capacity               │▒▒▒│
//!               └──┴───────────────────────────────────────────────┴───┘
//!                ▲  ▲                                               ▲
//!                │  └── start (aligned up to ALIGNMENT)             └── end (aligned down)
//!                └───── skipped when a borrowed buffer is misaligned
//! ```
//!
//! Owned regions come straight from the kernel through `mmap(2)` and go back
//! through `munmap(2)` when the region is dropped. Borrowed regions are never
//! released by us.

use std::{io, marker::PhantomData, ptr, ptr::NonNull};

use crate::{align::ALIGNMENT, align_down, block::WORD, error::HeapError};

/// Where the bytes came from.
enum Backing {
  /// Mapped by us. Holds the exact arguments that `munmap` needs.
  Mapped { address: NonNull<u8>, length: usize },
  /// Supplied by the caller, who keeps ownership.
  Borrowed,
}

pub(crate) struct Region<'a> {
  start: NonNull<u8>,
  capacity: usize,
  backing: Backing,
  marker: PhantomData<&'a mut [u8]>,
}

// SAFETY: a region is the sole access path to its bytes, so moving it to
// another thread moves that access with it.
unsafe impl Send for Region<'_> {}

impl Region<'static> {
  /// Maps `length` bytes of anonymous read/write memory.
  pub fn map(length: usize) -> Result<Self, HeapError> {
    let null = ptr::null_mut::<libc::c_void>();
    let protection = libc::PROT_READ | libc::PROT_WRITE;
    let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;

    // SAFETY: anonymous mapping, no file descriptor involved.
    let address = unsafe { libc::mmap(null, length, protection, flags, -1, 0) };

    if address == libc::MAP_FAILED {
      return Err(HeapError::ReservationFailed(io::Error::last_os_error()));
    }

    let address = NonNull::new(address as *mut u8).ok_or_else(|| {
      HeapError::ReservationFailed(io::Error::new(
        io::ErrorKind::Other,
        "mmap returned a null mapping",
      ))
    })?;

    log::debug!("[fitalloc] mapped {} bytes at {:p}", length, address);

    // Mappings are page aligned, only the tail may need trimming.
    Ok(Self {
      start: address,
      capacity: align_down!(length),
      backing: Backing::Mapped { address, length },
      marker: PhantomData,
    })
  }
}

impl<'a> Region<'a> {
  /// Wraps a caller-owned buffer.
  pub fn borrow(buffer: &'a mut [u8]) -> Self {
    let length = buffer.len();
    // SAFETY: slices are never null.
    let address = unsafe { NonNull::new_unchecked(buffer.as_mut_ptr()) };
    // SAFETY: the lifetime of `buffer` is carried by `marker`.
    unsafe { Self::borrow_raw(address, length) }
  }

  /// Wraps `length` caller-owned bytes starting at `address`.
  ///
  /// # Safety
  ///
  /// The range must be valid for reads and writes and must not be accessed
  /// through any other path for as long as the region lives.
  pub unsafe fn borrow_raw(
    address: NonNull<u8>,
    length: usize,
  ) -> Self {
    let padding = address.as_ptr().align_offset(ALIGNMENT).min(length);
    // SAFETY: padding <= length, so we stay inside the caller's range.
    let start = unsafe { NonNull::new_unchecked(address.as_ptr().add(padding)) };

    Self {
      start,
      capacity: align_down!(length - padding),
      backing: Backing::Borrowed,
      marker: PhantomData,
    }
  }

  #[inline]
  pub fn start(&self) -> NonNull<u8> {
    self.start
  }

  /// Usable bytes, always a multiple of [`ALIGNMENT`].
  #[inline]
  pub fn capacity(&self) -> usize {
    self.capacity
  }

  #[inline]
  pub fn is_owned(&self) -> bool {
    matches!(self.backing, Backing::Mapped { .. })
  }

  /// Offset of `address` from the start, if it lies in `[start, end)`.
  #[inline]
  pub fn offset_of(
    &self,
    address: *const u8,
  ) -> Option<usize> {
    let offset = (address as usize).checked_sub(self.start.as_ptr() as usize)?;
    (offset < self.capacity).then_some(offset)
  }

  /// Address of the byte at `offset`.
  #[inline]
  pub fn address_at(
    &self,
    offset: usize,
  ) -> NonNull<u8> {
    debug_assert!(offset <= self.capacity);
    // SAFETY: offset is within the region (or one past its end).
    unsafe { NonNull::new_unchecked(self.start.as_ptr().add(offset)) }
  }

  /// Whether `[offset, offset + length)` lies inside the region.
  #[inline]
  pub fn contains(
    &self,
    offset: usize,
    length: usize,
  ) -> bool {
    offset
      .checked_add(length)
      .is_some_and(|end| end <= self.capacity)
  }

  #[inline]
  pub fn read_word(
    &self,
    offset: usize,
  ) -> usize {
    assert!(self.contains(offset, WORD), "word read out of bounds");
    // SAFETY: bounds checked above.
    unsafe { ptr::read_unaligned(self.start.as_ptr().add(offset) as *const usize) }
  }

  #[inline]
  pub fn write_word(
    &mut self,
    offset: usize,
    value: usize,
  ) {
    assert!(self.contains(offset, WORD), "word write out of bounds");
    // SAFETY: bounds checked above.
    unsafe { ptr::write_unaligned(self.start.as_ptr().add(offset) as *mut usize, value) }
  }

  pub fn bytes(
    &self,
    offset: usize,
    length: usize,
  ) -> &[u8] {
    assert!(self.contains(offset, length), "byte range out of bounds");
    // SAFETY: bounds checked above.
    unsafe { std::slice::from_raw_parts(self.start.as_ptr().add(offset), length) }
  }

  pub fn bytes_mut(
    &mut self,
    offset: usize,
    length: usize,
  ) -> &mut [u8] {
    assert!(self.contains(offset, length), "byte range out of bounds");
    // SAFETY: bounds checked above, and `&mut self` guarantees exclusivity.
    unsafe { std::slice::from_raw_parts_mut(self.start.as_ptr().add(offset), length) }
  }

  /// Copies `length` bytes from `src` to `dst`. The ranges must not overlap.
  pub fn copy(
    &mut self,
    src: usize,
    dst: usize,
    length: usize,
  ) {
    assert!(self.contains(src, length) && self.contains(dst, length));
    assert!(src + length <= dst || dst + length <= src, "overlapping copy");
    // SAFETY: both ranges checked in bounds and disjoint.
    unsafe {
      ptr::copy_nonoverlapping(
        self.start.as_ptr().add(src),
        self.start.as_ptr().add(dst),
        length,
      )
    }
  }
}

impl Drop for Region<'_> {
  fn drop(&mut self) {
    if let Backing::Mapped { address, length } = self.backing {
      // SAFETY: exactly the mapping created in `Region::map`.
      let result = unsafe { libc::munmap(address.as_ptr() as *mut libc::c_void, length) };
      if result != 0 {
        log::error!(
          "[fitalloc] munmap({:p}, {}) failed: {}",
          address,
          length,
          io::Error::last_os_error()
        );
      } else {
        log::debug!("[fitalloc] unmapped {} bytes at {:p}", length, address);
      }
    }
  }
}
