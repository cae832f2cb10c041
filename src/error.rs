use std::{fmt, io};

/// Construction failures. These are the only errors a [`crate::Heap`] ever
/// returns; everything that can go wrong afterwards is a [`Fault`].
#[derive(Debug)]
pub enum HeapError {
  /// The kernel refused to map the requested heap.
  ReservationFailed(io::Error),
  /// A caller-supplied region is unusable.
  InvalidRegion { reason: &'static str },
  /// The heap cannot hold even one block of the minimum payload.
  InvalidSize { size: usize, minimum: usize },
}

impl fmt::Display for HeapError {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      HeapError::ReservationFailed(e) => write!(f, "heap reservation failed: {e}"),
      HeapError::InvalidRegion { reason } => write!(f, "invalid memory region: {reason}"),
      HeapError::InvalidSize { size, minimum } => write!(
        f,
        "heap of {size} bytes is smaller than the minimum of {minimum} bytes"
      ),
    }
  }
}

impl std::error::Error for HeapError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      HeapError::ReservationFailed(e) => Some(e),
      HeapError::InvalidRegion { .. } | HeapError::InvalidSize { .. } => None,
    }
  }
}

/// Recoverable misuse or exhaustion. Faults are logged and remembered by the
/// heap (see [`crate::Heap::last_fault`]) but never returned or raised, and
/// never change heap state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
  /// No free block can hold `requested` bytes.
  Exhausted { requested: usize },
  /// The address is outside the payload range or not a block boundary.
  InvalidPointer { address: usize },
  /// The block at `address` is already free.
  DoubleRelease { address: usize },
  /// `count * element_size` does not fit in `usize`.
  SizeOverflow { count: usize, element_size: usize },
}

impl fmt::Display for Fault {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      Fault::Exhausted { requested } => write!(f, "out of memory, requested {requested} bytes"),
      Fault::InvalidPointer { address } => write!(f, "invalid pointer {address:#x}"),
      Fault::DoubleRelease { address } => write!(f, "double release of {address:#x}"),
      Fault::SizeOverflow {
        count,
        element_size,
      } => write!(f, "size overflow: {count} * {element_size}"),
    }
  }
}

/// A broken chain invariant, reported by [`crate::Heap::validate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IntegrityError {
  /// No readable header at `offset`.
  CorruptHeader { offset: usize },
  /// `next` of the block at `offset` doesn't point right past its footprint.
  Gap { offset: usize, expected: usize, found: usize },
  /// `prev` of the block at `offset` doesn't point back to its predecessor.
  BrokenBackLink { offset: usize, expected: usize, found: usize },
  /// The chain doesn't end exactly at the region end.
  Coverage { covered: usize, capacity: usize },
  /// Two neighbors are both free.
  AdjacentFree { first: usize, second: usize },
  /// Payload size is misaligned or below the minimum.
  BadSize { offset: usize, size: usize },
  /// A maintained counter disagrees with what the chain says.
  Counter { name: &'static str, maintained: usize, actual: usize },
}

impl fmt::Display for IntegrityError {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      IntegrityError::CorruptHeader { offset } => write!(f, "corrupt header at {offset:#x}"),
      IntegrityError::Gap {
        offset,
        expected,
        found,
      } => write!(
        f,
        "block {offset:#x} links to {found:#x}, expected {expected:#x}"
      ),
      IntegrityError::BrokenBackLink {
        offset,
        expected,
        found,
      } => write!(
        f,
        "block {offset:#x} links back to {found:#x}, expected {expected:#x}"
      ),
      IntegrityError::Coverage { covered, capacity } => {
        write!(f, "blocks cover {covered} of {capacity} bytes")
      }
      IntegrityError::AdjacentFree { first, second } => {
        write!(f, "adjacent free blocks at {first:#x} and {second:#x}")
      }
      IntegrityError::BadSize { offset, size } => {
        write!(f, "block {offset:#x} has invalid payload size {size}")
      }
      IntegrityError::Counter {
        name,
        maintained,
        actual,
      } => write!(f, "{name} is {maintained} but the chain says {actual}"),
    }
  }
}

impl std::error::Error for IntegrityError {}
