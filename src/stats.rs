//! Running counters kept by every [`crate::Heap`].
//!
//! The byte totals and block counts are maintained incrementally on every
//! operation. Only allocation, release and in-place growth move bytes
//! between `used` and `free`, so `used + free` always equals the heap size
//! minus one header, however the free space happens to be split up.
//! [`crate::Heap::recount`] and [`crate::Heap::validate`] rebuild them from
//! the chain when a consistency check is wanted.

use crate::block::METADATA_SIZE;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
  /// Usable bytes in the region, metadata included.
  pub total_heap_size: usize,
  /// Sum of in-use payloads.
  pub used: usize,
  /// `total_heap_size - METADATA_SIZE - used`.
  pub free: usize,
  /// Successful allocations, ever.
  pub alloc_count: usize,
  /// Successful releases, ever.
  pub release_count: usize,
  pub block_count: usize,
  pub free_block_count: usize,
  pub split_count: usize,
  /// Merges performed on release.
  pub coalesce_count: usize,
  /// Free neighbors swallowed by an in-place resize.
  pub absorb_count: usize,
}

impl HeapStats {
  /// Counters for a fresh heap: one free block spanning everything.
  pub(crate) fn fresh(total_heap_size: usize) -> Self {
    Self {
      total_heap_size,
      free: total_heap_size - METADATA_SIZE,
      block_count: 1,
      free_block_count: 1,
      ..Self::default()
    }
  }

  /// Allocations not yet released.
  pub fn active_allocations(&self) -> usize {
    self.alloc_count - self.release_count
  }

  /// Bytes spent on block metadata.
  pub fn metadata_bytes(&self) -> usize {
    self.block_count * METADATA_SIZE
  }

  /// Share of free blocks beyond the first, as a percentage. A heap whose
  /// free space sits in a single block scores 0.
  pub fn fragmentation_ratio(&self) -> f64 {
    if self.free == 0 || self.free_block_count <= 1 {
      return 0.0;
    }
    (self.free_block_count - 1) as f64 / self.free_block_count as f64 * 100.0
  }

  pub(crate) fn on_allocate(
    &mut self,
    payload: usize,
  ) {
    self.used += payload;
    self.free -= payload;
    self.alloc_count += 1;
    self.free_block_count -= 1;
  }

  pub(crate) fn on_release(
    &mut self,
    payload: usize,
  ) {
    self.used -= payload;
    self.free += payload;
    self.release_count += 1;
    self.free_block_count += 1;
  }

  pub(crate) fn on_split(&mut self) {
    self.block_count += 1;
    self.free_block_count += 1;
    self.split_count += 1;
  }

  /// Two free blocks became one.
  pub(crate) fn on_coalesce(&mut self) {
    self.block_count -= 1;
    self.free_block_count -= 1;
    self.coalesce_count += 1;
  }

  /// An in-use block swallowed a free neighbor with `payload` bytes.
  pub(crate) fn on_absorb(
    &mut self,
    payload: usize,
  ) {
    self.free -= payload + METADATA_SIZE;
    self.used += payload + METADATA_SIZE;
    self.block_count -= 1;
    self.free_block_count -= 1;
    self.absorb_count += 1;
  }
}
