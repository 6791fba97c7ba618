//! Cache keys for the events API.

use crate::cache::QueryKey;

const EVENTS: &str = "events";

/// `["events", {"id": id}]`: a single event
pub fn event_key(id: &str) -> QueryKey {
  QueryKey::new(EVENTS).param("id", id)
}

/// `["events", {"search": term}]`: the event list for a search term
pub fn events_key(search: &str) -> QueryKey {
  QueryKey::new(EVENTS).param("search", search.trim())
}

/// `["events"]`: filter matching every events entry, lists and details alike
pub fn all_events() -> QueryKey {
  QueryKey::new(EVENTS)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_family_filter_covers_lists_and_details() {
    assert!(event_key("42").matches(&all_events()));
    assert!(events_key("").matches(&all_events()));
    assert!(!events_key("").matches(&event_key("42")));
  }

  #[test]
  fn test_search_term_is_trimmed() {
    assert_eq!(events_key(" rust "), events_key("rust"));
  }
}
