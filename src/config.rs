use std::{env, str::FromStr};

use crate::align;

/// Default heap size for [`crate::Heap::new`] callers that don't care (1 MiB).
pub const DEFAULT_HEAP_SIZE: usize = 1024 * 1024;

/// Default smallest payload a block may have.
pub const DEFAULT_MIN_PAYLOAD: usize = 16;

pub const HEAP_SIZE_VAR: &str = "FITALLOC_HEAP_SIZE";
pub const MIN_PAYLOAD_VAR: &str = "FITALLOC_MIN_PAYLOAD";

/// Heap construction parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeapConfig {
  /// Bytes to reserve. Ignored when the heap is built over a caller buffer.
  pub heap_size: usize,
  /// Requests are raised to this, and split remainders must leave at least
  /// this much payload. Always a non-zero multiple of the alignment unit.
  pub min_payload: usize,
}

impl Default for HeapConfig {
  fn default() -> Self {
    Self {
      heap_size: DEFAULT_HEAP_SIZE,
      min_payload: DEFAULT_MIN_PAYLOAD,
    }
  }
}

impl HeapConfig {
  pub fn heap_size(
    mut self,
    heap_size: usize,
  ) -> Self {
    self.heap_size = heap_size;
    self
  }

  pub fn min_payload(
    mut self,
    min_payload: usize,
  ) -> Self {
    self.min_payload = min_payload;
    self.normalized()
  }

  /// Defaults overridden by `FITALLOC_HEAP_SIZE` and `FITALLOC_MIN_PAYLOAD`.
  pub fn from_env() -> Self {
    Self::from_lookup(|key| env::var(key).ok())
  }

  pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
    let mut config = Self::default();

    if let Some(size) = parse_var(&lookup, HEAP_SIZE_VAR) {
      config.heap_size = size;
    }
    if let Some(min) = parse_var(&lookup, MIN_PAYLOAD_VAR) {
      config.min_payload = min;
    }

    config.normalized()
  }

  pub(crate) fn normalized(mut self) -> Self {
    self.min_payload = align::checked_align(self.min_payload.max(1)).unwrap_or(DEFAULT_MIN_PAYLOAD);
    self
  }
}

fn parse_var<T: FromStr>(
  lookup: &impl Fn(&str) -> Option<String>,
  key: &str,
) -> Option<T> {
  let raw = lookup(key)?;
  match raw.trim().parse() {
    Ok(value) => Some(value),
    Err(_) => {
      log::warn!("[fitalloc] ignoring {}={:?}: not a byte count", key, raw);
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;

  use super::*;

  fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect();
    move |key| vars.get(key).cloned()
  }

  #[test]
  fn test_defaults() {
    let config = HeapConfig::from_lookup(lookup(&[]));
    assert_eq!(config, HeapConfig::default());
    assert_eq!(config.heap_size, 1024 * 1024);
    assert_eq!(config.min_payload, 16);
  }

  #[test]
  fn test_overrides() {
    let config = HeapConfig::from_lookup(lookup(&[
      (HEAP_SIZE_VAR, "65536"),
      (MIN_PAYLOAD_VAR, " 20 "),
    ]));
    assert_eq!(config.heap_size, 65536);
    assert_eq!(config.min_payload, 24);
  }

  #[test]
  fn test_garbage_is_ignored() {
    let config = HeapConfig::from_lookup(lookup(&[(HEAP_SIZE_VAR, "lots")]));
    assert_eq!(config.heap_size, DEFAULT_HEAP_SIZE);
  }

  #[test]
  fn test_min_payload_is_aligned_and_non_zero() {
    assert_eq!(HeapConfig::default().min_payload(0).min_payload, 8);
    assert_eq!(HeapConfig::default().min_payload(9).min_payload, 16);
    assert_eq!(HeapConfig::default().min_payload(32).min_payload, 32);
  }
}
