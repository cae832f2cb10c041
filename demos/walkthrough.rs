use std::{env, io::Read};

use fitalloc::{
  Heap, global,
  report::{print_layout, print_stats},
};

/// Waits until the user presses ENTER, but only when started with `--step`.
/// Handy for watching the heap change one operation at a time.
fn pause(step: bool) {
  if step {
    println!("\n>>> Press ENTER to continue...");
    let _ = std::io::stdin().bytes().next();
  }
}

fn main() {
  env_logger::init();

  let step = env::args().any(|arg| arg == "--step");

  // A small heap keeps the layout dumps readable.
  let mut heap = Heap::new(4096).expect("could not map a 4 KiB heap");

  println!("[0] Fresh heap: one free block spanning everything");
  print_layout(&heap);
  pause(step);

  // --------------------------------------------------------------------
  // 1) Three allocations. Each one splits the big free block.
  // --------------------------------------------------------------------
  let a = heap.allocate(100).unwrap();
  let b = heap.allocate(200).unwrap();
  let c = heap.allocate(50).unwrap();
  println!("\n[1] Allocated 100, 200 and 50 bytes at {:p}, {:p}, {:p}", a, b, c);
  print_layout(&heap);
  pause(step);

  // --------------------------------------------------------------------
  // 2) Release the middle block. Its neighbors are in use: no merge.
  // --------------------------------------------------------------------
  heap.release(b.as_ptr());
  println!("\n[2] Released the 200 byte block");
  print_layout(&heap);
  pause(step);

  // --------------------------------------------------------------------
  // 3) Release the first block. It merges with the free block after it.
  // --------------------------------------------------------------------
  heap.release(a.as_ptr());
  println!("\n[3] Released the 100 byte block (coalesces with the hole)");
  print_layout(&heap);
  pause(step);

  // --------------------------------------------------------------------
  // 4) First-fit reuse: 64 bytes land in the hole at the front.
  // --------------------------------------------------------------------
  let d = heap.allocate(64).unwrap();
  println!(
    "\n[4] Allocated 64 bytes at {:p}: {}",
    d,
    if d == a { "reused the freed block" } else { "somewhere else" }
  );
  heap.payload_mut(d).unwrap()[..5].copy_from_slice(b"hello");
  pause(step);

  // --------------------------------------------------------------------
  // 5) Grow it. The free remainder of the hole is absorbed in place.
  // --------------------------------------------------------------------
  let d = heap.resize(d.as_ptr(), 200).unwrap();
  println!(
    "\n[5] Resized to 200 bytes at {:p}, data = {:?}",
    d,
    String::from_utf8_lossy(&heap.payload(d).unwrap()[..5])
  );
  print_layout(&heap);
  pause(step);

  // --------------------------------------------------------------------
  // 6) Misuse is reported, never fatal.
  // --------------------------------------------------------------------
  heap.release(b.as_ptr());
  println!("\n[6] Released a stale pointer: {:?}", heap.last_fault());
  let huge = heap.allocate(1 << 20);
  println!("[6] Allocating 1 MiB: {:?}, {:?}", huge, heap.last_fault());
  let overflow = heap.zero_allocate(usize::MAX, 2);
  println!("[6] zero_allocate overflow: {:?}, {:?}", overflow, heap.last_fault());
  pause(step);

  heap.release(c.as_ptr());
  heap.release(d.as_ptr());
  println!("\n[7] Everything released");
  print_layout(&heap);
  print_stats(&heap.stats());

  if let Err(e) = heap.validate() {
    eprintln!("heap is inconsistent: {e}");
  }

  // --------------------------------------------------------------------
  // 8) The global heap is created on first use and torn down explicitly.
  // --------------------------------------------------------------------
  let ptr = global::zero_allocate(32, 8).unwrap();
  println!("\n[8] Global heap allocation at {:p}", ptr);
  global::release(ptr.as_ptr());
  if let Some(stats) = global::stats() {
    print_stats(&stats);
  }
  global::teardown();
}
