//! The allocator engine.
//!
//! A [`Heap`] tiles its region with blocks. Every block, free or in use,
//! is part of one address-ordered chain, so physical neighbors are always
//! one link away:
//!
//! ```text
//!   ┌────┬────────┬────┬────────┬────┬──────────────────────────────┐
//!   │meta│  USED  │meta│  FREE  │meta│             FREE?            │
//!   └────┴────────┴────┴────────┴────┴──────────────────────────────┘
//!     │       ▲     │ ▲      ▲    │ ▲
//!     └─ next ┼─────┘ └ prev ┼────┘ │        (never two FREE in a row)
//!             └─ pointer returned to the caller
//! ```
//!
//! Allocation is first-fit: walk from the head, take the first free block
//! that is big enough and split off whatever is left over if the rest can
//! hold a header plus the minimum payload:
//!
//! ```text
//!   before   ┌────┬──────────────────────────────────────────┐
//!            │meta│                 FREE (S)                 │
//!            └────┴──────────────────────────────────────────┘
//!   after    ┌────┬────────────┬────┬────────────────────────┐
//!            │meta│  USED (N)  │meta│  FREE (S - N - meta)   │
//!            └────┴────────────┴────┴────────────────────────┘
//! ```
//!
//! Release marks the block free and immediately merges it with a free
//! successor and then a free predecessor, so at most three blocks collapse:
//!
//! ```text
//!   ┌────┬──────┬────┬──────┬────┬──────┐        ┌────┬────────────────────────────┐
//!   │meta│ FREE │meta│ ░░░░ │meta│ FREE │   ──►  │meta│            FREE            │
//!   └────┴──────┴────┴──────┴────┴──────┘        └────┴────────────────────────────┘
//!                      ▲ released
//! ```
//!
//! # Concurrency
//!
//! A heap is a plain single-threaded structure. It can be moved to another
//! thread, but sharing one between threads requires the caller to serialize
//! every call (see [`crate::global`] for a `Mutex` based wrapper).

use std::{fmt, iter, ptr::NonNull};

use crate::{
  align, align_down,
  block::{Block, BlockInfo, METADATA_SIZE, NIL},
  config::HeapConfig,
  error::{Fault, HeapError, IntegrityError},
  region::Region,
  stats::HeapStats,
};

/// The first block always starts at the beginning of the region.
const HEAD: usize = 0;

/// First-fit allocator over one contiguous region.
pub struct Heap<'a> {
  region: Region<'a>,
  min_payload: usize,
  stats: HeapStats,
  last_fault: Option<Fault>,
}

impl Heap<'static> {
  /// Maps a fresh region of `heap_size` bytes and manages it. The region is
  /// unmapped when the heap is dropped.
  pub fn new(heap_size: usize) -> Result<Self, HeapError> {
    Self::with_config(HeapConfig::default().heap_size(heap_size))
  }

  pub fn with_config(config: HeapConfig) -> Result<Self, HeapError> {
    let config = config.normalized();
    let minimum = METADATA_SIZE.saturating_add(config.min_payload);

    if align_down!(config.heap_size) < minimum {
      return Err(HeapError::InvalidSize {
        size: config.heap_size,
        minimum,
      });
    }

    Self::over(Region::map(config.heap_size)?, config.min_payload)
  }
}

impl<'a> Heap<'a> {
  /// Manages a caller-owned buffer. The buffer stays borrowed for as long as
  /// the heap lives and is never released by it.
  pub fn with_buffer(buffer: &'a mut [u8]) -> Result<Self, HeapError> {
    Self::with_buffer_config(buffer, HeapConfig::default())
  }

  /// Same as [`Heap::with_buffer`], `config.heap_size` is ignored.
  pub fn with_buffer_config(
    buffer: &'a mut [u8],
    config: HeapConfig,
  ) -> Result<Self, HeapError> {
    Self::over(Region::borrow(buffer), config.normalized().min_payload)
  }

  /// Manages `size` caller-owned bytes at `memory`.
  ///
  /// # Safety
  ///
  /// Unless null, `memory` must be valid for reads and writes of `size`
  /// bytes for `'a`, and nothing else may access it while the heap lives.
  pub unsafe fn from_raw_parts(
    memory: *mut u8,
    size: usize,
  ) -> Result<Self, HeapError> {
    let Some(memory) = NonNull::new(memory) else {
      return Err(HeapError::InvalidRegion {
        reason: "null memory pointer",
      });
    };

    // SAFETY: guaranteed by the caller.
    let region = unsafe { Region::borrow_raw(memory, size) };
    Self::over(region, HeapConfig::default().min_payload)
  }

  fn over(
    region: Region<'a>,
    min_payload: usize,
  ) -> Result<Self, HeapError> {
    if region.capacity() < METADATA_SIZE.saturating_add(min_payload) {
      return Err(HeapError::InvalidRegion {
        reason: "region smaller than one block header plus the minimum payload",
      });
    }

    let mut heap = Self {
      region,
      min_payload,
      stats: HeapStats::default(),
      last_fault: None,
    };
    heap.initialize();

    log::debug!(
      "[fitalloc] heap of {} bytes at {:p} ({})",
      heap.capacity(),
      heap.heap_start(),
      if heap.owns_region() { "owned" } else { "borrowed" }
    );

    Ok(heap)
  }

  /// Lays out a single free block spanning the whole region.
  fn initialize(&mut self) {
    let capacity = self.region.capacity();

    Block::new(capacity - METADATA_SIZE, false, NIL, NIL)
      .write(&mut self.region, HEAD);

    self.stats = HeapStats::fresh(capacity);
    self.last_fault = None;
  }

  /// Discards every allocation and goes back to one free block. Pointers
  /// handed out before the reset must not be used afterwards.
  pub fn reset(&mut self) {
    // Old headers would otherwise still look like live blocks.
    let stale: Vec<usize> = self.blocks().skip(1).map(|info| info.offset).collect();
    for offset in stale {
      Block::erase(&mut self.region, offset);
    }

    self.initialize();
    log::debug!("[fitalloc] heap reset");
  }

  /// Allocates at least `size` bytes, returning `None` for zero-sized
  /// requests and when no free block is large enough.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Option<NonNull<u8>> {
    let offset = self.allocate_block(size)?;
    Some(self.payload_address(offset))
  }

  fn allocate_block(
    &mut self,
    size: usize,
  ) -> Option<usize> {
    if size == 0 {
      return None;
    }

    let Some((offset, needed)) = self
      .round_request(size)
      .and_then(|needed| self.find_free_block(needed).map(|offset| (offset, needed)))
    else {
      self.fault("allocate", Fault::Exhausted { requested: size });
      return None;
    };

    self.split_block(offset, needed);

    let mut block = self.block(offset);
    block.in_use = true;
    block.write(&mut self.region, offset);

    self.stats.on_allocate(block.size);

    log::trace!(
      "[fitalloc] allocate({}) -> block {:#x}, {} bytes",
      size,
      offset,
      block.size
    );

    Some(offset)
  }

  /// Releases an allocation. Null is ignored; out-of-range pointers and
  /// blocks that are already free are reported and otherwise ignored.
  pub fn release(
    &mut self,
    ptr: *mut u8,
  ) {
    if ptr.is_null() {
      return;
    }

    let Some((offset, mut block)) = self.owning_block(ptr) else {
      self.fault("release", Fault::InvalidPointer {
        address: ptr as usize,
      });
      return;
    };

    if block.is_free() {
      self.fault("release", Fault::DoubleRelease {
        address: ptr as usize,
      });
      return;
    }

    self.stats.on_release(block.size);

    block.in_use = false;
    block.write(&mut self.region, offset);

    log::trace!("[fitalloc] release block {:#x}, {} bytes", offset, block.size);

    self.coalesce(offset);
  }

  /// Grows or keeps an allocation.
  ///
  /// Null behaves like [`Heap::allocate`] and a zero size like
  /// [`Heap::release`]. A block that is already big enough is returned as
  /// is. Otherwise a free successor is absorbed in place when that is
  /// enough, and as a last resort the payload moves to a new block. If that
  /// allocation fails, `None` is returned and `ptr` stays valid.
  pub fn resize(
    &mut self,
    ptr: *mut u8,
    new_size: usize,
  ) -> Option<NonNull<u8>> {
    if ptr.is_null() {
      return self.allocate(new_size);
    }

    if new_size == 0 {
      self.release(ptr);
      return None;
    }

    let Some((offset, block)) = self.owning_block(ptr).filter(|(_, block)| block.in_use) else {
      self.fault("resize", Fault::InvalidPointer {
        address: ptr as usize,
      });
      return None;
    };

    let Some(needed) = self.round_request(new_size) else {
      self.fault("resize", Fault::Exhausted {
        requested: new_size,
      });
      return None;
    };

    if needed <= block.size {
      return Some(self.payload_address(offset));
    }

    if let Some(next_offset) = block.next() {
      let next = self.block(next_offset);

      if next.is_free() && block.size + next.footprint() >= needed {
        self.merge(offset, next_offset);
        self.stats.on_absorb(next.size);

        log::trace!(
          "[fitalloc] resize block {:#x} in place, {} -> {} bytes",
          offset,
          block.size,
          block.size + next.footprint()
        );

        return Some(self.payload_address(offset));
      }
    }

    let new_offset = self.allocate_block(new_size)?;

    self.region.copy(
      Block::payload_offset(offset),
      Block::payload_offset(new_offset),
      block.size,
    );
    self.release(ptr);

    log::trace!(
      "[fitalloc] resize moved block {:#x} -> {:#x}",
      offset,
      new_offset
    );

    Some(self.payload_address(new_offset))
  }

  /// Allocates room for `count` elements of `element_size` bytes and zeroes
  /// the whole payload.
  pub fn zero_allocate(
    &mut self,
    count: usize,
    element_size: usize,
  ) -> Option<NonNull<u8>> {
    let Some(total) = count.checked_mul(element_size) else {
      self.fault("zero_allocate", Fault::SizeOverflow {
        count,
        element_size,
      });
      return None;
    };

    let offset = self.allocate_block(total)?;
    let size = self.block(offset).size;
    self.region.bytes_mut(Block::payload_offset(offset), size).fill(0);

    Some(self.payload_address(offset))
  }

  /// Whether `ptr` lies in the payload-addressable part of the region. This
  /// is a range check only, it says nothing about `ptr` being the start of a
  /// live allocation.
  pub fn is_valid_pointer(
    &self,
    ptr: *const u8,
  ) -> bool {
    self
      .region
      .offset_of(ptr)
      .is_some_and(|offset| offset >= METADATA_SIZE)
  }

  /// Granted payload size of the live allocation at `ptr`.
  pub fn block_size(
    &self,
    ptr: *const u8,
  ) -> Option<usize> {
    self
      .owning_block(ptr)
      .filter(|(_, block)| block.in_use)
      .map(|(_, block)| block.size)
  }

  /// The full payload of the live allocation at `ptr`.
  pub fn payload(
    &self,
    ptr: NonNull<u8>,
  ) -> Option<&[u8]> {
    let size = self.block_size(ptr.as_ptr())?;
    let offset = self.region.offset_of(ptr.as_ptr())?;
    Some(self.region.bytes(offset, size))
  }

  pub fn payload_mut(
    &mut self,
    ptr: NonNull<u8>,
  ) -> Option<&mut [u8]> {
    let size = self.block_size(ptr.as_ptr())?;
    let offset = self.region.offset_of(ptr.as_ptr())?;
    Some(self.region.bytes_mut(offset, size))
  }

  pub fn stats(&self) -> HeapStats {
    self.stats
  }

  /// The most recent fault reported by any operation since construction or
  /// the last reset.
  pub fn last_fault(&self) -> Option<Fault> {
    self.last_fault
  }

  pub fn heap_start(&self) -> NonNull<u8> {
    self.region.start()
  }

  /// Usable bytes, metadata included. Same as `stats().total_heap_size`.
  pub fn capacity(&self) -> usize {
    self.region.capacity()
  }

  pub fn min_payload(&self) -> usize {
    self.min_payload
  }

  /// Whether the region is released when the heap is dropped.
  pub fn owns_region(&self) -> bool {
    self.region.is_owned()
  }

  /// Every block in address order.
  pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
    iter::successors(Some((HEAD, self.block(HEAD))), move |(_, block)| {
      block.next().map(|next| (next, self.block(next)))
    })
    .map(|(offset, block)| BlockInfo {
      offset,
      payload_size: block.size,
      in_use: block.in_use,
    })
  }

  /// `(block_count, free_block_count)` counted by walking the chain.
  pub fn recount(&self) -> (usize, usize) {
    self.blocks().fold((0, 0), |(total, free), info| {
      (total + 1, free + usize::from(!info.in_use))
    })
  }

  /// Walks the chain and checks every structural invariant plus the
  /// maintained counters.
  pub fn validate(&self) -> Result<(), IntegrityError> {
    let capacity = self.region.capacity();

    let mut offset = HEAD;
    let mut prev = NIL;
    let mut prev_free = false;
    let (mut blocks, mut free_blocks, mut used) = (0, 0, 0);

    loop {
      let block = Block::read(&self.region, offset)
        .ok_or(IntegrityError::CorruptHeader { offset })?;

      if block.prev != prev {
        return Err(IntegrityError::BrokenBackLink {
          offset,
          expected: prev,
          found: block.prev,
        });
      }

      if !align::is_aligned(block.size)
        || block.size < self.min_payload
        || block.size > capacity
      {
        return Err(IntegrityError::BadSize {
          offset,
          size: block.size,
        });
      }

      let end = offset
        .checked_add(block.footprint())
        .filter(|&end| end <= capacity)
        .ok_or(IntegrityError::Coverage {
          covered: offset.saturating_add(block.footprint()),
          capacity,
        })?;

      if block.is_free() && prev_free {
        return Err(IntegrityError::AdjacentFree {
          first: prev,
          second: offset,
        });
      }

      blocks += 1;
      if block.is_free() {
        free_blocks += 1;
      } else {
        used += block.size;
      }

      match block.next() {
        None if end == capacity => break,
        None => {
          return Err(IntegrityError::Coverage {
            covered: end,
            capacity,
          });
        }
        Some(next) if next != end => {
          return Err(IntegrityError::Gap {
            offset,
            expected: end,
            found: next,
          });
        }
        Some(next) => {
          prev = offset;
          prev_free = block.is_free();
          offset = next;
        }
      }
    }

    let counters = [
      ("block_count", self.stats.block_count, blocks),
      ("free_block_count", self.stats.free_block_count, free_blocks),
      ("used", self.stats.used, used),
      ("free", self.stats.free, capacity - METADATA_SIZE - used),
      ("total_heap_size", self.stats.total_heap_size, capacity),
    ];

    for (name, maintained, actual) in counters {
      if maintained != actual {
        return Err(IntegrityError::Counter {
          name,
          maintained,
          actual,
        });
      }
    }

    Ok(())
  }

  /// Aligned request size, raised to the minimum payload. `None` if
  /// rounding overflows.
  fn round_request(
    &self,
    size: usize,
  ) -> Option<usize> {
    align::checked_align(size).map(|size| size.max(self.min_payload))
  }

  fn find_free_block(
    &self,
    size: usize,
  ) -> Option<usize> {
    self
      .blocks()
      .find(|info| !info.in_use && info.payload_size >= size)
      .map(|info| info.offset)
  }

  /// Shrinks the free block at `offset` to `size` bytes of payload if the
  /// remainder can stand on its own as a block. Returns whether it did.
  fn split_block(
    &mut self,
    offset: usize,
    size: usize,
  ) -> bool {
    let mut block = self.block(offset);
    let remainder = block.size - size;

    if remainder < METADATA_SIZE + self.min_payload {
      return false;
    }

    let new_offset = Block::payload_offset(offset) + size;
    Block::new(remainder - METADATA_SIZE, false, block.next, offset)
      .write(&mut self.region, new_offset);

    if let Some(next) = block.next() {
      self.set_prev(next, new_offset);
    }

    block.size = size;
    block.next = new_offset;
    block.write(&mut self.region, offset);

    self.stats.on_split();

    log::trace!(
      "[fitalloc] split block {:#x}: {} + {} bytes free at {:#x}",
      offset,
      size,
      remainder - METADATA_SIZE,
      new_offset
    );

    true
  }

  /// Merges the block at `offset`, which was just freed, with its free
  /// neighbors. Returns the offset of the surviving block.
  fn coalesce(
    &mut self,
    mut offset: usize,
  ) -> usize {
    if let Some(next) = self.block(offset).next() {
      if self.block(next).is_free() {
        self.merge(offset, next);
        self.stats.on_coalesce();
        log::trace!("[fitalloc] coalesce {:#x} <- {:#x}", offset, next);
      }
    }

    if let Some(prev) = self.block(offset).prev() {
      if self.block(prev).is_free() {
        self.merge(prev, offset);
        self.stats.on_coalesce();
        log::trace!("[fitalloc] coalesce {:#x} <- {:#x}", prev, offset);
        offset = prev;
      }
    }

    offset
  }

  /// Folds the block at `absorbed` into its predecessor `into` and unlinks
  /// it. Counters are the caller's business.
  fn merge(
    &mut self,
    into: usize,
    absorbed: usize,
  ) {
    let mut block = self.block(into);
    let gone = self.block(absorbed);
    debug_assert_eq!(block.next, absorbed);

    block.size += gone.footprint();
    block.next = gone.next;
    block.write(&mut self.region, into);

    if let Some(next) = gone.next() {
      self.set_prev(next, into);
    }
  }

  fn set_prev(
    &mut self,
    offset: usize,
    prev: usize,
  ) {
    let mut block = self.block(offset);
    block.prev = prev;
    block.write(&mut self.region, offset);
  }

  /// Header of a block reached through the chain.
  ///
  /// # Panics
  ///
  /// If the header was overwritten, which only happens when a caller writes
  /// outside of its allocation.
  fn block(
    &self,
    offset: usize,
  ) -> Block {
    match Block::read(&self.region, offset) {
      Some(block) => block,
      None => panic!("[fitalloc] corrupt block header at offset {offset:#x}"),
    }
  }

  /// Recovers the block whose payload starts at `ptr`.
  fn owning_block(
    &self,
    ptr: *const u8,
  ) -> Option<(usize, Block)> {
    if !self.is_valid_pointer(ptr) {
      return None;
    }

    let payload = self.region.offset_of(ptr)?;
    if !align::is_aligned(payload) {
      return None;
    }

    let offset = payload - METADATA_SIZE;
    Block::read(&self.region, offset).map(|block| (offset, block))
  }

  fn payload_address(
    &self,
    offset: usize,
  ) -> NonNull<u8> {
    self.region.address_at(Block::payload_offset(offset))
  }

  fn fault(
    &mut self,
    operation: &str,
    fault: Fault,
  ) {
    match fault {
      Fault::Exhausted { .. } | Fault::DoubleRelease { .. } => {
        log::warn!("[fitalloc] {}: {}", operation, fault)
      }
      Fault::InvalidPointer { .. } | Fault::SizeOverflow { .. } => {
        log::error!("[fitalloc] {}: {}", operation, fault)
      }
    }

    self.last_fault = Some(fault);
  }
}

impl fmt::Debug for Heap<'_> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Heap")
      .field("start", &self.region.start())
      .field("capacity", &self.region.capacity())
      .field("owned", &self.region.is_owned())
      .field("min_payload", &self.min_payload)
      .field("stats", &self.stats)
      .finish()
  }
}
