//! A process-wide heap for code that doesn't want to carry a [`Heap`]
//! around.
//!
//! The heap is created lazily by the first [`allocate`], [`resize`] or
//! [`zero_allocate`] call, using [`HeapConfig::from_env`], or eagerly with
//! [`init`]. [`teardown`] drops it and unmaps its region; the next
//! allocation starts over with a fresh heap. Every call takes one lock for
//! its whole duration.

use std::{
  ptr::NonNull,
  sync::{Mutex, MutexGuard, PoisonError},
};

use crate::{config::HeapConfig, error::HeapError, heap::Heap, stats::HeapStats};

static GLOBAL: Mutex<Option<Heap<'static>>> = Mutex::new(None);

fn lock() -> MutexGuard<'static, Option<Heap<'static>>> {
  // The heap never panics halfway through an update.
  GLOBAL.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs `f` on the global heap, creating it first if needed. Returns `None`
/// if the heap could not be created.
fn with_heap<R>(f: impl FnOnce(&mut Heap<'static>) -> Option<R>) -> Option<R> {
  let mut global = lock();

  if global.is_none() {
    match Heap::with_config(HeapConfig::from_env()) {
      Ok(heap) => *global = Some(heap),
      Err(e) => {
        log::error!("[fitalloc] global heap initialization failed: {}", e);
        return None;
      }
    }
  }

  global.as_mut().and_then(f)
}

/// Creates the global heap, replacing (and dropping) any existing one.
pub fn init(config: HeapConfig) -> Result<(), HeapError> {
  let heap = Heap::with_config(config)?;
  *lock() = Some(heap);
  log::debug!("[fitalloc] global heap initialized");
  Ok(())
}

/// Drops the global heap. Every pointer it handed out becomes invalid.
pub fn teardown() {
  if lock().take().is_some() {
    log::debug!("[fitalloc] global heap torn down");
  }
}

pub fn is_initialized() -> bool {
  lock().is_some()
}

pub fn allocate(size: usize) -> Option<NonNull<u8>> {
  with_heap(|heap| heap.allocate(size))
}

/// Does nothing when the global heap doesn't exist.
pub fn release(ptr: *mut u8) {
  if let Some(heap) = lock().as_mut() {
    heap.release(ptr);
  }
}

pub fn resize(
  ptr: *mut u8,
  new_size: usize,
) -> Option<NonNull<u8>> {
  with_heap(|heap| heap.resize(ptr, new_size))
}

pub fn zero_allocate(
  count: usize,
  element_size: usize,
) -> Option<NonNull<u8>> {
  with_heap(|heap| heap.zero_allocate(count, element_size))
}

/// Counters of the global heap, if it exists.
pub fn stats() -> Option<HeapStats> {
  lock().as_ref().map(Heap::stats)
}

#[cfg(test)]
mod tests {
  use super::*;

  // All of these share the one global heap.
  static SERIAL: Mutex<()> = Mutex::new(());

  fn serial() -> MutexGuard<'static, ()> {
    let _ = env_logger::builder().is_test(true).try_init();
    SERIAL.lock().unwrap_or_else(PoisonError::into_inner)
  }

  #[test]
  fn test_lazy_init_and_teardown() {
    let _serial = serial();
    teardown();

    assert!(!is_initialized());
    assert_eq!(stats(), None);

    release(std::ptr::null_mut::<u8>().wrapping_add(64));
    assert!(!is_initialized());

    let ptr = allocate(100).unwrap();
    assert!(is_initialized());
    assert_eq!(stats().unwrap().alloc_count, 1);

    release(ptr.as_ptr());
    assert_eq!(stats().unwrap().release_count, 1);

    teardown();
    assert!(!is_initialized());
  }

  #[test]
  fn test_explicit_init() {
    let _serial = serial();

    init(HeapConfig::default().heap_size(8192)).unwrap();
    assert_eq!(stats().unwrap().total_heap_size, 8192);

    let ptr = zero_allocate(16, 4).unwrap();
    let grown = resize(ptr.as_ptr(), 1024).unwrap();
    assert_eq!(grown, ptr);
    assert_eq!(stats().unwrap().alloc_count, 1);
    assert_eq!(stats().unwrap().absorb_count, 1);

    release(grown.as_ptr());
    assert_eq!(stats().unwrap().active_allocations(), 0);

    init(HeapConfig::default().heap_size(4096)).unwrap();
    assert_eq!(stats().unwrap().alloc_count, 0);

    assert!(init(HeapConfig::default().heap_size(8)).is_err());
    assert_eq!(stats().unwrap().total_heap_size, 4096);

    teardown();
  }

  #[test]
  fn test_resize_null_initializes() {
    let _serial = serial();
    teardown();

    let ptr = resize(std::ptr::null_mut(), 32).unwrap();
    assert!(is_initialized());

    assert_eq!(resize(ptr.as_ptr(), 0), None);
    assert_eq!(stats().unwrap().release_count, 1);

    teardown();
  }
}
