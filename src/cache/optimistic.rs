//! Optimistic writes: snapshot, speculative write, then commit or revert.

use serde_json::Value;
use std::future::Future;
use tracing::{debug, warn};

use super::client::QueryClient;
use super::key::QueryKey;
use super::traits::{Cacheable, RefetchType};

/// The value an entry held before an optimistic write.
///
/// Returned by [`QueryClient::begin_optimistic`]; hand it the mutation outcome
/// with [`OptimisticSnapshot::settle`].
#[must_use = "an optimistic write must be settled"]
#[derive(Debug)]
pub struct OptimisticSnapshot {
  key: QueryKey,
  previous: Option<Value>,
}

impl OptimisticSnapshot {
  /// Keep the speculative value on success, restore the snapshot on failure,
  /// and invalidate the entry either way. Runs under one lock.
  pub fn settle(self, client: &QueryClient, succeeded: bool) {
    let mut state = client.lock(&self.key);
    if !succeeded {
      debug!(key = %self.key, "Rolling back optimistic write");
      state.write(&self.key, self.previous);
    }
    state.invalidate_matching(&self.key, RefetchType::Active);
  }
}

impl QueryClient {
  /// Start an optimistic write: cancel reads in flight for `key`, snapshot the
  /// current value, then write `value`. No read started before this call can
  /// land in the entry afterwards.
  pub fn begin_optimistic<T: Cacheable>(&self, key: &QueryKey, value: &T) -> OptimisticSnapshot {
    let speculative = serde_json::to_value(value)
      .map_err(|e| warn!(key = %key, error = %e, "Failed to serialize optimistic value"))
      .ok();

    let mut state = self.lock(key);
    state.cancel_matching(key);
    let previous = state.data(key);
    if let Some(speculative) = speculative {
      state.write(key, Some(speculative));
    }
    debug!(key = %key, had_previous = previous.is_some(), "Optimistic write");

    OptimisticSnapshot {
      key: key.clone(),
      previous,
    }
  }

  /// Run `mutation` with `value` shown for `key` until it settles.
  ///
  /// The optimistic write happens on this call, before the returned future
  /// is first polled, so the new value is visible right away.
  pub fn optimistic_update<T, R, E, Fut>(
    &self,
    key: &QueryKey,
    value: &T,
    mutation: Fut,
  ) -> impl Future<Output = Result<R, E>>
  where
    T: Cacheable,
    Fut: Future<Output = Result<R, E>>,
  {
    let snapshot = self.begin_optimistic(key, value);
    let client = self.clone();
    async move {
      let result = mutation.await;
      snapshot.settle(&client, result.is_ok());
      result
    }
  }
}
