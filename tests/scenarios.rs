use std::ptr::NonNull;

use fitalloc::{Fault, Heap, HeapConfig, HeapError, METADATA_SIZE};

fn heap(size: usize) -> Heap<'static> {
  let _ = env_logger::builder().is_test(true).try_init();
  Heap::new(size).unwrap()
}

fn fill(
  heap: &mut Heap<'_>,
  ptr: NonNull<u8>,
  len: usize,
  byte: u8,
) {
  heap.payload_mut(ptr).unwrap()[..len].fill(byte);
}

fn holds(
  heap: &Heap<'_>,
  ptr: NonNull<u8>,
  len: usize,
  byte: u8,
) -> bool {
  heap.payload(ptr).unwrap()[..len].iter().all(|&b| b == byte)
}

#[test]
fn basic_allocation_and_release() {
  let mut heap = heap(4096);

  let ptr = heap.allocate(100).unwrap();
  unsafe {
    let ints = ptr.as_ptr() as *mut u32;
    for i in 0..25 {
      ints.add(i).write(i as u32 * 10);
    }
    for i in 0..25 {
      assert_eq!(ints.add(i).read(), i as u32 * 10);
    }
  }

  heap.release(ptr.as_ptr());

  let stats = heap.stats();
  assert_eq!(stats.alloc_count, 1);
  assert_eq!(stats.release_count, 1);
  assert_eq!(stats.used, 0);
  assert_eq!(heap.recount(), (1, 1));
  heap.validate().unwrap();
}

#[test]
fn multiple_allocations_of_varying_sizes() {
  let mut heap = heap(8192);
  let sizes = [32, 64, 128, 256, 512, 1024];

  let ptrs: Vec<_> = sizes
    .iter()
    .map(|&size| heap.allocate(size).unwrap())
    .collect();

  for (i, (&ptr, &size)) in ptrs.iter().zip(&sizes).enumerate() {
    fill(&mut heap, ptr, size, i as u8);
  }
  for (i, (&ptr, &size)) in ptrs.iter().zip(&sizes).enumerate() {
    assert!(holds(&heap, ptr, size, i as u8));
  }

  assert_eq!(heap.stats().used, sizes.iter().sum::<usize>());
  heap.validate().unwrap();

  for ptr in ptrs {
    heap.release(ptr.as_ptr());
    heap.validate().unwrap();
  }

  assert_eq!(heap.recount(), (1, 1));
  assert_eq!(heap.stats().free, 8192 - METADATA_SIZE);
}

#[test]
fn splitting_creates_blocks() {
  let mut heap = heap(4096);

  heap.allocate(100).unwrap();
  heap.allocate(200).unwrap();
  heap.allocate(50).unwrap();

  let stats = heap.stats();
  assert_eq!(stats.split_count, 3);
  assert_eq!(stats.block_count, 4);
  assert_eq!(stats.free_block_count, 1);

  let sizes: Vec<usize> = heap.blocks().map(|info| info.payload_size).collect();
  assert_eq!(&sizes[..3], &[104, 200, 56]);
}

#[test]
fn coalescing_middle_first_then_ends() {
  let mut heap = heap(4096);

  let x = heap.allocate(100).unwrap();
  let y = heap.allocate(100).unwrap();
  let z = heap.allocate(100).unwrap();
  let _fence = heap.allocate(100).unwrap();

  heap.release(y.as_ptr());
  heap.release(x.as_ptr());
  heap.release(z.as_ptr());
  heap.validate().unwrap();

  let first = heap.blocks().next().unwrap();
  assert!(!first.in_use);
  assert_eq!(first.footprint(), 3 * (METADATA_SIZE + 104));
  assert!(heap.stats().coalesce_count >= 2);
  assert_eq!(heap.stats().free_block_count, 2);
}

#[test]
fn fragmentation_and_first_fit_reuse() {
  let mut heap = heap(4096);

  let blocks: Vec<_> = (0..5).map(|_| heap.allocate(100).unwrap()).collect();

  heap.release(blocks[1].as_ptr());
  heap.release(blocks[3].as_ptr());

  let stats = heap.stats();
  assert_eq!(stats.free_block_count, 3);
  assert!((stats.fragmentation_ratio() - 200.0 / 3.0).abs() < 1e-9);

  // Neither hole fits 250 bytes, so this lands after the last block.
  let big = heap.allocate(250).unwrap();
  assert!(big > blocks[4]);

  // The first hole fits 80 bytes, and what's left over is too small to split.
  let small = heap.allocate(80).unwrap();
  assert_eq!(small, blocks[1]);
  assert_eq!(heap.block_size(small.as_ptr()), Some(104));

  for ptr in [blocks[0], blocks[2], blocks[4], big, small] {
    heap.release(ptr.as_ptr());
  }

  assert_eq!(heap.recount(), (1, 1));
  assert_eq!(heap.stats().fragmentation_ratio(), 0.0);
  heap.validate().unwrap();
}

#[test]
fn resize_preserves_data_both_ways() {
  let mut heap = heap(4096);

  // In place: the neighbor is free.
  let a = heap.allocate(64).unwrap();
  let b = heap.allocate(64).unwrap();
  let fence = heap.allocate(64).unwrap();
  fill(&mut heap, a, 64, 0x11);
  heap.release(b.as_ptr());

  let grown = heap.resize(a.as_ptr(), 120).unwrap();
  assert_eq!(grown, a);
  assert!(holds(&heap, grown, 64, 0x11));
  assert_eq!(heap.stats().absorb_count, 1);

  // Copying: the neighbor is in use.
  fill(&mut heap, fence, 64, 0x22);
  let moved = heap.resize(grown.as_ptr(), 1000).unwrap();
  assert_ne!(moved, grown);
  assert!(holds(&heap, moved, 64, 0x11));
  assert!(holds(&heap, fence, 64, 0x22));
  heap.validate().unwrap();
}

#[test]
fn zero_allocate_returns_zeroed_memory() {
  let mut heap = heap(4096);

  let dirty = heap.allocate(400).unwrap();
  fill(&mut heap, dirty, 400, 0xFF);
  heap.release(dirty.as_ptr());

  let ptr = heap.zero_allocate(50, 8).unwrap();
  let ints = ptr.as_ptr() as *const u64;
  for i in 0..50 {
    assert_eq!(unsafe { ints.add(i).read() }, 0);
  }
}

#[test]
fn edge_cases_never_mutate() {
  let mut heap = heap(1024);
  let before = heap.stats();

  assert_eq!(heap.allocate(0), None);
  heap.release(std::ptr::null_mut());
  assert_eq!(heap.zero_allocate(usize::MAX / 2, 3), None);
  assert!(matches!(heap.last_fault(), Some(Fault::SizeOverflow { .. })));
  assert_eq!(heap.allocate(2000), None);
  assert!(matches!(heap.last_fault(), Some(Fault::Exhausted { requested: 2000 })));

  let mut local = [0u8; 16];
  assert!(!heap.is_valid_pointer(local.as_ptr()));
  heap.release(local.as_mut_ptr());

  assert_eq!(heap.stats(), before);
  heap.validate().unwrap();
}

#[test]
fn pointer_validity_is_a_range_check() {
  let mut heap = heap(1024);
  let start = heap.heap_start().as_ptr();
  let ptr = heap.allocate(64).unwrap();

  assert!(heap.is_valid_pointer(ptr.as_ptr()));
  assert!(heap.is_valid_pointer(unsafe { ptr.as_ptr().add(5) }));
  assert!(!heap.is_valid_pointer(start));
  assert!(heap.is_valid_pointer(start.wrapping_add(METADATA_SIZE)));
  assert!(!heap.is_valid_pointer(start.wrapping_add(heap.capacity())));
  assert!(heap.is_valid_pointer(start.wrapping_add(heap.capacity() - 1)));
}

#[test]
fn reuse_after_release() {
  let mut heap = heap(2048);

  let a = heap.allocate(200).unwrap();
  let _b = heap.allocate(200).unwrap();
  heap.release(a.as_ptr());

  let c = heap.allocate(200).unwrap();
  assert_eq!(a, c);
}

#[test]
fn external_buffer_is_not_released() {
  let _ = env_logger::builder().is_test(true).try_init();
  let mut buffer = vec![0u8; 2048];
  let config = HeapConfig::default().min_payload(32);

  let mut heap = Heap::with_buffer_config(&mut buffer, config).unwrap();
  assert!(!heap.owns_region());
  assert_eq!(heap.min_payload(), 32);

  let ptr = heap.allocate(1).unwrap();
  assert_eq!(heap.block_size(ptr.as_ptr()), Some(32));
  heap.validate().unwrap();
  drop(heap);

  assert_eq!(buffer.len(), 2048);
}

#[test]
fn raw_parts_construction() {
  let mut buffer = vec![0u8; 512];

  let heap = unsafe { Heap::from_raw_parts(buffer.as_mut_ptr(), buffer.len()) }.unwrap();
  heap.validate().unwrap();
  drop(heap);

  let error = unsafe { Heap::from_raw_parts(buffer.as_mut_ptr(), METADATA_SIZE) }.unwrap_err();
  assert!(matches!(error, HeapError::InvalidRegion { .. }));
}
