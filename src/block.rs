//! Block metadata, stored in-band at the start of every block.
//!
//! ```text
//!   offset ──►┌──────────────────────┐  ◄─┐
//!             │ payload_size         │    │
//!             ├──────────────────────┤    │
//!             │ next (offset | NIL)  │    │ METADATA_SIZE
//!             ├──────────────────────┤    │ (4 words)
//!             │ prev (offset | NIL)  │    │
//!             ├──────────────────────┤    │
//!             │ tag (FREE | USED)    │    │
//!             ├──────────────────────┤  ◄─┘
//!             │                      │  ◄── pointer handed to the caller
//!             │      payload         │
//!             │   payload_size B     │
//!             └──────────────────────┘
//! ```
//!
//! Links are offsets from the heap start rather than addresses, so a block
//! header is just four words that can be read and written anywhere inside
//! the region without reinterpreting memory as a struct.

use std::mem;

use crate::region::Region;

/// One header field. Word reads and writes in the region use this width.
pub(crate) const WORD: usize = mem::size_of::<usize>();

/// Bytes of metadata in front of every payload.
pub const METADATA_SIZE: usize = 4 * WORD;

/// "No neighbor" link value.
pub(crate) const NIL: usize = usize::MAX;

const SIZE: usize = 0;
const NEXT: usize = WORD;
const PREV: usize = 2 * WORD;
const TAG: usize = 3 * WORD;

const TAG_FREE: usize = 0xF4EE_B10C;
const TAG_USED: usize = 0x05ED_B10C;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Block {
  pub size: usize,
  pub in_use: bool,
  pub next: usize,
  pub prev: usize,
}

impl Block {
  pub fn new(
    size: usize,
    in_use: bool,
    next: usize,
    prev: usize,
  ) -> Self {
    Self {
      size,
      in_use,
      next,
      prev,
    }
  }

  /// Decodes the header at `offset`. Returns `None` if the header does not
  /// fit in the region or its tag is not one we write.
  pub fn read(
    region: &Region<'_>,
    offset: usize,
  ) -> Option<Self> {
    if !region.contains(offset, METADATA_SIZE) {
      return None;
    }

    let in_use = match region.read_word(offset + TAG) {
      TAG_FREE => false,
      TAG_USED => true,
      _ => return None,
    };

    Some(Self {
      size: region.read_word(offset + SIZE),
      in_use,
      next: region.read_word(offset + NEXT),
      prev: region.read_word(offset + PREV),
    })
  }

  pub fn write(
    &self,
    region: &mut Region<'_>,
    offset: usize,
  ) {
    region.write_word(offset + SIZE, self.size);
    region.write_word(offset + NEXT, self.next);
    region.write_word(offset + PREV, self.prev);
    region.write_word(offset + TAG, if self.in_use { TAG_USED } else { TAG_FREE });
  }

  /// Overwrites the tag so a stale header left inside a merged block can't
  /// be mistaken for a live one.
  pub fn erase(
    region: &mut Region<'_>,
    offset: usize,
  ) {
    region.write_word(offset + TAG, 0);
  }

  #[inline]
  pub fn next(&self) -> Option<usize> {
    (self.next != NIL).then_some(self.next)
  }

  #[inline]
  pub fn prev(&self) -> Option<usize> {
    (self.prev != NIL).then_some(self.prev)
  }

  #[inline]
  pub fn is_free(&self) -> bool {
    !self.in_use
  }

  /// Metadata plus payload.
  #[inline]
  pub fn footprint(&self) -> usize {
    METADATA_SIZE + self.size
  }

  #[inline]
  pub fn payload_offset(offset: usize) -> usize {
    offset + METADATA_SIZE
  }
}

/// Read-only snapshot of one block, yielded by [`crate::Heap::blocks`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
  /// Offset of the block's metadata from the heap start.
  pub offset: usize,
  pub payload_size: usize,
  pub in_use: bool,
}

impl BlockInfo {
  /// Total bytes the block occupies, metadata included.
  pub fn footprint(&self) -> usize {
    METADATA_SIZE + self.payload_size
  }
}
