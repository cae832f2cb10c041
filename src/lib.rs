//! # fitalloc - A First-Fit Heap Allocator
//!
//! This crate manages one contiguous region of memory as a heap, handing out
//! and taking back variable-sized blocks with `allocate`, `release`, `resize`
//! and `zero_allocate`.
//!
//! ## Overview
//!
//! The region is cut into blocks. Each block starts with a small header
//! and every block, free or not, is linked to its physical neighbors:
//!
//! ```text
//!   Heap Region:
//!
//!   start                                                               end
//!   ┌──────┬──────────┬──────┬──────┬──────┬─────────────┬──────┬────────┐
//!   │ meta │   USED   │ meta │ FREE │ meta │    USED     │ meta │  FREE  │
//!   └──────┴──────────┴──────┴──────┴──────┴─────────────┴──────┴────────┘
//!      ▲  ──── next ────►  ▲  ──── next ────►  ▲  ──── next ────►  ▲
//!      └──── ◄── prev ─────┴──── ◄── prev ─────┴──── ◄── prev ─────┘
//!
//!   Blocks tile the region exactly: no gaps, no overlap.
//! ```
//!
//! - **Allocate**: first-fit. Walk the chain from the start, take the first
//!   free block that is large enough, split off the tail if it is worth
//!   keeping.
//! - **Release**: mark the block free and merge it with a free successor
//!   and a free predecessor right away. Two free blocks are never adjacent.
//! - **Resize**: keep the block if it is big enough, swallow a free successor
//!   if that is enough, otherwise allocate, copy and release.
//!
//! ## Crate Structure
//!
//! ```text
//!   fitalloc
//!   ├── align      - Alignment macros (align!, align_down!)
//!   ├── block      - In-band block header encoding
//!   ├── region     - Owned (mmap) or borrowed byte range
//!   ├── config     - HeapConfig and environment overrides
//!   ├── error      - HeapError, Fault, IntegrityError
//!   ├── stats      - HeapStats counters
//!   ├── heap       - The Heap engine
//!   ├── report     - Text dumps of stats and block layout
//!   └── global     - Lazily created process-wide heap
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use fitalloc::Heap;
//!
//! let mut heap = Heap::new(4096).unwrap();
//!
//! let ptr = heap.allocate(100).unwrap();
//! heap.payload_mut(ptr).unwrap()[0] = 42;
//!
//! let ptr = heap.resize(ptr.as_ptr(), 400).unwrap();
//! assert_eq!(heap.payload(ptr).unwrap()[0], 42);
//!
//! heap.release(ptr.as_ptr());
//! assert_eq!(heap.stats().active_allocations(), 0);
//! ```
//!
//! ## Errors
//!
//! Only construction can fail with an error ([`HeapError`]). Running out of
//! memory, releasing a bad pointer twice and similar mistakes are
//! [`Fault`]s: they are logged through the [`log`] facade, remembered in
//! [`Heap::last_fault`] and otherwise ignored. The heap never panics on
//! them and never changes state because of them.
//!
//! ## Limitations
//!
//! - **Single-threaded**: a [`Heap`] has no internal locking
//! - **Fixed size**: the region never grows
//! - **Word alignment only**: payloads are 8-byte aligned, nothing more
//! - **Unix-only**: owned regions come from `mmap(2)`

pub mod align;
mod block;
mod config;
mod error;
pub mod global;
mod heap;
mod region;
pub mod report;
mod stats;

pub use block::{BlockInfo, METADATA_SIZE};
pub use config::{DEFAULT_HEAP_SIZE, DEFAULT_MIN_PAYLOAD, HeapConfig};
pub use error::{Fault, HeapError, IntegrityError};
pub use heap::Heap;
pub use stats::HeapStats;
