//! Human-readable dumps of a heap. Nothing in here is needed to allocate.

use std::fmt;

use crate::{heap::Heap, stats::HeapStats};

const RULE: &str = "──────────────────────────────────────────────────────────";

/// Counter table for a [`HeapStats`] snapshot.
pub struct StatsTable<'s>(pub &'s HeapStats);

impl fmt::Display for StatsTable<'_> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    let stats = self.0;

    writeln!(f, "{RULE}")?;
    writeln!(f, "  heap statistics")?;
    writeln!(f, "{RULE}")?;
    writeln!(f, "  heap size            {:>12} bytes", stats.total_heap_size)?;
    writeln!(f, "  used                 {:>12} bytes", stats.used)?;
    writeln!(f, "  free                 {:>12} bytes", stats.free)?;
    writeln!(f, "  metadata             {:>12} bytes", stats.metadata_bytes())?;
    writeln!(f, "{RULE}")?;
    writeln!(f, "  allocations          {:>12}", stats.alloc_count)?;
    writeln!(f, "  releases             {:>12}", stats.release_count)?;
    writeln!(f, "  active               {:>12}", stats.active_allocations())?;
    writeln!(f, "{RULE}")?;
    writeln!(f, "  blocks               {:>12}", stats.block_count)?;
    writeln!(f, "  free blocks          {:>12}", stats.free_block_count)?;
    writeln!(f, "  splits               {:>12}", stats.split_count)?;
    writeln!(f, "  coalesces            {:>12}", stats.coalesce_count)?;
    writeln!(f, "  in-place grows       {:>12}", stats.absorb_count)?;
    writeln!(f, "{RULE}")?;
    writeln!(f, "  fragmentation        {:>11.2}%", stats.fragmentation_ratio())?;
    write!(f, "{RULE}")
  }
}

/// One row per block, in address order.
pub struct LayoutTable<'h, 'a>(pub &'h Heap<'a>);

impl fmt::Display for LayoutTable<'_, '_> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    writeln!(f, "{RULE}")?;
    writeln!(f, "  {:<12}{:>12}    {:<8}{:>6}", "offset", "payload", "state", "#")?;
    writeln!(f, "{RULE}")?;

    for (index, block) in self.0.blocks().enumerate() {
      writeln!(
        f,
        "  {:#010x}  {:>10} B    {:<8}{:>6}",
        block.offset,
        block.payload_size,
        if block.in_use { "[USED]" } else { "[FREE]" },
        index
      )?;
    }

    write!(f, "{RULE}")
  }
}

pub fn print_stats(stats: &HeapStats) {
  println!("{}", StatsTable(stats));
}

pub fn print_layout(heap: &Heap<'_>) {
  println!("{}", LayoutTable(heap));
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_stats_table() {
    let mut heap = Heap::new(4096).unwrap();
    heap.allocate(64).unwrap();

    let text = StatsTable(&heap.stats()).to_string();

    assert!(text.contains("heap size"));
    assert!(text.contains("4096 bytes"));
    assert!(text.contains("0.00%"));
  }

  #[test]
  fn test_layout_table_has_a_row_per_block() {
    let mut heap = Heap::new(4096).unwrap();
    let a = heap.allocate(64).unwrap();
    heap.allocate(64).unwrap();
    heap.release(a.as_ptr());

    let text = LayoutTable(&heap).to_string();

    assert_eq!(text.matches("[FREE]").count(), 2);
    assert_eq!(text.matches("[USED]").count(), 1);
    assert!(text.contains("0x00000000"));
  }
}
