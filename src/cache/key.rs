//! Composite cache keys.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Key of a cache entry: a resource kind plus named parameters.
///
/// Written as `["events", {"id": "42"}]` in logs. A key also acts as a filter
/// for [`QueryKey::matches`]: `["events"]` matches every events key, while
/// `["events", {"id": "42"}]` only matches keys carrying that id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
  kind: String,
  params: BTreeMap<String, String>,
}

impl QueryKey {
  pub fn new(kind: impl Into<String>) -> Self {
    Self {
      kind: kind.into(),
      params: BTreeMap::new(),
    }
  }

  /// Add a parameter to the key.
  pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.params.insert(name.into(), value.into());
    self
  }

  /// Partial match: same kind, and every parameter of `filter` present with the same value.
  pub fn matches(&self, filter: &QueryKey) -> bool {
    self.kind == filter.kind
      && filter
        .params
        .iter()
        .all(|(name, value)| self.params.get(name) == Some(value))
  }

  /// Stable, fixed-length hash used as the storage key.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.to_string().as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[{:?}", self.kind)?;
    if !self.params.is_empty() {
      write!(f, ", {{")?;
      for (i, (name, value)) in self.params.iter().enumerate() {
        if i > 0 {
          write!(f, ", ")?;
        }
        write!(f, "{:?}: {:?}", name, value)?;
      }
      write!(f, "}}")?;
    }
    write!(f, "]")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_kind_only_filter_matches_all_of_kind() {
    let filter = QueryKey::new("events");
    assert!(QueryKey::new("events").matches(&filter));
    assert!(QueryKey::new("events").param("id", "42").matches(&filter));
    assert!(QueryKey::new("events")
      .param("search", "jazz")
      .matches(&filter));
    assert!(!QueryKey::new("venues").matches(&filter));
  }

  #[test]
  fn test_param_filter_is_partial() {
    let filter = QueryKey::new("events").param("id", "42");
    assert!(QueryKey::new("events").param("id", "42").matches(&filter));
    assert!(!QueryKey::new("events").param("id", "7").matches(&filter));
    assert!(!QueryKey::new("events").matches(&filter));
  }

  #[test]
  fn test_display() {
    assert_eq!(QueryKey::new("events").to_string(), r#"["events"]"#);
    assert_eq!(
      QueryKey::new("events").param("id", "42").to_string(),
      r#"["events", {"id": "42"}]"#
    );
  }

  #[test]
  fn test_cache_hash_is_stable_and_distinct() {
    let a = QueryKey::new("events").param("id", "1");
    let b = QueryKey::new("events").param("id", "2");
    assert_eq!(a.cache_hash(), a.clone().cache_hash());
    assert_ne!(a.cache_hash(), b.cache_hash());
    assert_eq!(a.cache_hash().len(), 64);
  }
}
