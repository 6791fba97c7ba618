//! The query cache: one instance per application, shared by cloning the handle.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::key::QueryKey;
use super::storage::{CacheStorage, NoopStorage};
use super::traits::{CacheResult, Cacheable, RefetchType};

/// Why a cache read did not produce data.
#[derive(Debug)]
pub enum FetchError<E> {
  /// The read was cancelled or superseded; its result was not stored
  Cancelled,
  /// The fetcher failed
  Failed(E),
}

/// Change counters of an entry, used by mounted queries to notice writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryState {
  /// Bumped on every write or invalidation
  pub version: u64,
  /// Bumped when an invalidation asks mounted queries to refetch
  pub refetch_seq: u64,
}

/// How a read ended, as seen by callers that joined it.
#[derive(Debug, Clone)]
enum Settled {
  Stored(Value),
  Failed(Arc<dyn Any + Send + Sync>),
  Cancelled,
}

#[derive(Debug)]
struct InFlight {
  id: u64,
  cancel: CancellationToken,
  settled: watch::Receiver<Option<Settled>>,
}

/// The caller that runs the fetcher for a read.
struct Lead {
  id: u64,
  token: CancellationToken,
  settled: watch::Sender<Option<Settled>>,
}

/// A caller waiting on a read someone else runs.
struct Joined {
  id: u64,
  cancel: CancellationToken,
  settled: watch::Receiver<Option<Settled>>,
}

enum Begin {
  Lead(Lead),
  Join(Joined),
}

#[derive(Debug, Default)]
struct Entry {
  data: Option<Value>,
  updated_at: Option<DateTime<Utc>>,
  invalidated: bool,
  version: u64,
  refetch_seq: u64,
  in_flight: Option<InFlight>,
}

impl Entry {
  fn is_stale(&self, stale_time: Duration) -> bool {
    if self.invalidated {
      return true;
    }
    match self.updated_at {
      Some(at) => {
        let age = (Utc::now() - at).to_std().unwrap_or(Duration::ZERO);
        age >= stale_time
      }
      None => true,
    }
  }

  fn state(&self) -> EntryState {
    EntryState {
      version: self.version,
      refetch_seq: self.refetch_seq,
    }
  }
}

#[derive(Debug, Default)]
pub(super) struct State {
  entries: HashMap<QueryKey, Entry>,
  next_fetch_id: u64,
}

impl State {
  pub(super) fn data(&self, key: &QueryKey) -> Option<Value> {
    self.entries.get(key).and_then(|e| e.data.clone())
  }

  pub(super) fn write(&mut self, key: &QueryKey, data: Option<Value>) {
    let entry = self.entries.entry(key.clone()).or_default();
    entry.data = data;
    entry.updated_at = Some(Utc::now());
    entry.invalidated = false;
    entry.version += 1;
  }

  pub(super) fn cancel_matching(&mut self, filter: &QueryKey) -> usize {
    let mut cancelled = 0;
    for (key, entry) in self.entries.iter_mut() {
      if !key.matches(filter) {
        continue;
      }
      if let Some(in_flight) = entry.in_flight.take() {
        in_flight.cancel.cancel();
        debug!(key = %key, "Cancelled in-flight read");
        cancelled += 1;
      }
    }
    cancelled
  }

  pub(super) fn invalidate_matching(&mut self, filter: &QueryKey, refetch: RefetchType) -> usize {
    let mut invalidated = 0;
    for (key, entry) in self.entries.iter_mut() {
      if !key.matches(filter) {
        continue;
      }
      entry.invalidated = true;
      entry.version += 1;
      if refetch == RefetchType::Active {
        entry.refetch_seq += 1;
      }
      debug!(key = %key, ?refetch, "Invalidated");
      invalidated += 1;
    }
    invalidated
  }
}

struct Inner {
  state: Mutex<State>,
  storage: Arc<dyn CacheStorage>,
}

/// Query cache keyed by [`QueryKey`].
///
/// Constructed once at the application root and cloned into whatever needs it;
/// clones share the same entries.
#[derive(Clone)]
pub struct QueryClient {
  inner: Arc<Inner>,
}

impl QueryClient {
  pub fn new(storage: Arc<dyn CacheStorage>) -> Self {
    Self {
      inner: Arc::new(Inner {
        state: Mutex::new(State::default()),
        storage,
      }),
    }
  }

  /// A cache that keeps nothing between sessions.
  pub fn in_memory() -> Self {
    Self::new(Arc::new(NoopStorage))
  }

  /// Lock the entry map, loading `key` from storage if it is not in memory yet.
  pub(super) fn lock(&self, key: &QueryKey) -> MutexGuard<'_, State> {
    let mut state = self
      .inner
      .state
      .lock()
      .unwrap_or_else(PoisonError::into_inner);

    if !state.entries.contains_key(key) {
      match self.inner.storage.load(key) {
        Ok(Some(stored)) => {
          debug!(key = %key, cached_at = %stored.cached_at, "Hydrated from storage");
          state.entries.insert(
            key.clone(),
            Entry {
              data: Some(stored.data),
              updated_at: Some(stored.cached_at),
              ..Entry::default()
            },
          );
        }
        Ok(None) => {}
        Err(e) => warn!(key = %key, error = %e, "Failed to load cache entry"),
      }
    }

    state
  }

  fn lock_all(&self) -> MutexGuard<'_, State> {
    self
      .inner
      .state
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
  }

  /// Current value for `key`, if any.
  pub fn get_query_data<T: Cacheable>(&self, key: &QueryKey) -> Option<T> {
    let value = self.lock(key).data(key)?;
    decode(key, value)
  }

  /// Current value for `key` with its age, classified against `stale_time`.
  pub fn peek<T: Cacheable>(&self, key: &QueryKey, stale_time: Duration) -> Option<CacheResult<T>> {
    let state = self.lock(key);
    let entry = state.entries.get(key)?;
    let value = entry.data.clone()?;
    let is_stale = entry.is_stale(stale_time);
    let cached_at = entry.updated_at.unwrap_or_else(Utc::now);
    drop(state);

    decode(key, value).map(|data| CacheResult::from_cache(data, cached_at, is_stale))
  }

  /// Overwrite the value for `key`. The entry counts as fresh afterwards.
  pub fn set_query_data<T: Serialize>(&self, key: &QueryKey, value: &T) {
    match serde_json::to_value(value) {
      Ok(value) => {
        self.lock(key).write(key, Some(value));
        debug!(key = %key, "Set query data");
      }
      Err(e) => warn!(key = %key, error = %e, "Failed to serialize query data"),
    }
  }

  /// Whether the entry is missing, invalidated, or older than `stale_time`.
  #[allow(dead_code)]
  pub fn is_stale(&self, key: &QueryKey, stale_time: Duration) -> bool {
    self
      .lock(key)
      .entries
      .get(key)
      .map(|e| e.data.is_none() || e.is_stale(stale_time))
      .unwrap_or(true)
  }

  pub fn entry_state(&self, key: &QueryKey) -> EntryState {
    self
      .lock_all()
      .entries
      .get(key)
      .map(Entry::state)
      .unwrap_or_default()
  }

  /// Drop the entry for `key` from memory and storage, cancelling its read.
  pub fn remove_query(&self, key: &QueryKey) {
    let removed = self.lock_all().entries.remove(key);
    if let Some(in_flight) = removed.and_then(|e| e.in_flight) {
      in_flight.cancel.cancel();
    }
    if let Err(e) = self.inner.storage.remove(key) {
      warn!(key = %key, error = %e, "Failed to remove persisted cache entry");
    }
    debug!(key = %key, "Removed query");
  }

  /// Cancel in-flight reads of every entry matching `filter`.
  pub fn cancel_queries(&self, filter: &QueryKey) -> usize {
    self.lock_all().cancel_matching(filter)
  }

  /// Mark every entry matching `filter` as stale.
  pub fn invalidate_queries(&self, filter: &QueryKey, refetch: RefetchType) -> usize {
    let count = self.lock_all().invalidate_matching(filter, refetch);
    debug!(filter = %filter, count, "Invalidated queries");
    count
  }

  /// Read-through fetch.
  ///
  /// 1. If the entry is fresh (within `stale_time` and not invalidated), return it
  /// 2. If a read of the entry is already in flight, wait for its outcome
  /// 3. Otherwise run `fetcher` and store the result unless the read was
  ///    cancelled or superseded meanwhile
  pub async fn fetch_query<T, E, F, Fut>(
    &self,
    key: &QueryKey,
    stale_time: Duration,
    fetcher: F,
  ) -> Result<CacheResult<T>, FetchError<E>>
  where
    T: Cacheable,
    E: Clone + Send + Sync + 'static,
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, E>>,
  {
    if let Some(cached) = self.peek::<T>(key, stale_time) {
      if !cached.is_stale() {
        debug!(key = %key, "Cache hit");
        return Ok(cached);
      }
    }

    match self.begin_fetch(key, false) {
      Begin::Lead(lead) => self.run_fetch(key, lead, fetcher).await,
      Begin::Join(joined) => join_fetch(key, joined).await,
    }
  }

  /// Fetch regardless of freshness, superseding any read in flight.
  pub async fn refetch_query<T, E, F, Fut>(
    &self,
    key: &QueryKey,
    fetcher: F,
  ) -> Result<CacheResult<T>, FetchError<E>>
  where
    T: Cacheable,
    E: Clone + Send + Sync + 'static,
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, E>>,
  {
    match self.begin_fetch(key, true) {
      Begin::Lead(lead) => self.run_fetch(key, lead, fetcher).await,
      Begin::Join(joined) => join_fetch(key, joined).await,
    }
  }

  fn begin_fetch(&self, key: &QueryKey, supersede: bool) -> Begin {
    let mut state = self.lock(key);

    if !supersede {
      let joinable = state
        .entries
        .get(key)
        .and_then(|e| e.in_flight.as_ref())
        // A closed channel means the running read was dropped
        .filter(|f| f.settled.has_changed().is_ok());
      if let Some(in_flight) = joinable {
        return Begin::Join(Joined {
          id: in_flight.id,
          cancel: in_flight.cancel.clone(),
          settled: in_flight.settled.clone(),
        });
      }
    }

    state.next_fetch_id += 1;
    let id = state.next_fetch_id;
    let token = CancellationToken::new();
    let (tx, rx) = watch::channel(None);

    let entry = state.entries.entry(key.clone()).or_default();
    let previous = entry.in_flight.replace(InFlight {
      id,
      cancel: token.clone(),
      settled: rx,
    });
    if let Some(previous) = previous {
      previous.cancel.cancel();
    }

    Begin::Lead(Lead {
      id,
      token,
      settled: tx,
    })
  }

  async fn run_fetch<T, E, F, Fut>(
    &self,
    key: &QueryKey,
    lead: Lead,
    fetcher: F,
  ) -> Result<CacheResult<T>, FetchError<E>>
  where
    T: Cacheable,
    E: Clone + Send + Sync + 'static,
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, E>>,
  {
    debug!(key = %key, fetch_id = lead.id, "Fetching");
    let result = fetcher(lead.token.clone()).await;
    let (outcome, settled) = self.finish_fetch(key, lead.id, &lead.token, result);
    lead.settled.send_replace(Some(settled));
    outcome
  }

  fn finish_fetch<T: Cacheable, E: Clone + Send + Sync + 'static>(
    &self,
    key: &QueryKey,
    id: u64,
    token: &CancellationToken,
    result: Result<T, E>,
  ) -> (Result<CacheResult<T>, FetchError<E>>, Settled) {
    let mut state = self.lock_all();

    let current = state
      .entries
      .get(key)
      .and_then(|e| e.in_flight.as_ref())
      .map(|f| f.id)
      == Some(id);
    if token.is_cancelled() || !current {
      debug!(key = %key, fetch_id = id, "Discarding cancelled read");
      return (Err(FetchError::Cancelled), Settled::Cancelled);
    }

    if let Some(entry) = state.entries.get_mut(key) {
      entry.in_flight = None;
    }

    let data = match result {
      Ok(data) => data,
      Err(e) => {
        let shared = Settled::Failed(Arc::new(e.clone()));
        return (Err(FetchError::Failed(e)), shared);
      }
    };

    let settled = match serde_json::to_value(&data) {
      Ok(value) => {
        if let Err(e) = self.inner.storage.store(key, &value) {
          warn!(key = %key, error = %e, "Failed to persist cache entry");
        }
        state.write(key, Some(value.clone()));
        Settled::Stored(value)
      }
      Err(e) => {
        warn!(key = %key, error = %e, "Failed to serialize fetched data");
        Settled::Cancelled
      }
    };

    (Ok(CacheResult::from_network(data)), settled)
  }
}

async fn join_fetch<T: Cacheable, E: Clone + 'static>(
  key: &QueryKey,
  joined: Joined,
) -> Result<CacheResult<T>, FetchError<E>> {
  debug!(key = %key, fetch_id = joined.id, "Joining read in flight");
  let Joined {
    cancel,
    mut settled,
    ..
  } = joined;

  let outcome = tokio::select! {
    _ = cancel.cancelled() => None,
    result = settled.wait_for(Option::is_some) => result.ok().and_then(|s| (*s).clone()),
  };

  match outcome {
    Some(Settled::Stored(value)) => decode(key, value)
      .map(CacheResult::from_network)
      .ok_or(FetchError::Cancelled),
    Some(Settled::Failed(e)) => match e.downcast_ref::<E>() {
      Some(e) => Err(FetchError::Failed(e.clone())),
      None => Err(FetchError::Cancelled),
    },
    Some(Settled::Cancelled) | None => Err(FetchError::Cancelled),
  }
}

fn decode<T: Cacheable>(key: &QueryKey, value: Value) -> Option<T> {
  serde_json::from_value(value)
    .map_err(|e| warn!(key = %key, error = %e, "Cached value has unexpected shape"))
    .ok()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::SqliteStorage;
  use crate::cache::traits::CacheSource;
  use std::sync::atomic::{AtomicU32, Ordering};
  use tokio::sync::oneshot;

  fn key(id: &str) -> QueryKey {
    QueryKey::new("events").param("id", id)
  }

  const LONG: Duration = Duration::from_secs(600);

  #[tokio::test]
  async fn test_fetch_query_stores_and_serves_fresh_entry() {
    let client = QueryClient::in_memory();
    let calls = Arc::new(AtomicU32::new(0));

    for _ in 0..2 {
      let calls = calls.clone();
      let result = client
        .fetch_query(&key("42"), LONG, |_| async move {
          calls.fetch_add(1, Ordering::SeqCst);
          Ok::<_, String>("Old".to_string())
        })
        .await
        .unwrap();
      assert_eq!(result.data, "Old");
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
      client.get_query_data::<String>(&key("42")).as_deref(),
      Some("Old")
    );
  }

  #[tokio::test]
  async fn test_zero_stale_time_always_refetches() {
    let client = QueryClient::in_memory();
    let calls = Arc::new(AtomicU32::new(0));

    for _ in 0..3 {
      let calls = calls.clone();
      let result = client
        .fetch_query(&key("1"), Duration::ZERO, |_| async move {
          Ok::<_, String>(calls.fetch_add(1, Ordering::SeqCst))
        })
        .await
        .unwrap();
      assert_eq!(result.source, CacheSource::Network);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn test_failed_fetch_leaves_entry_untouched() {
    let client = QueryClient::in_memory();
    client.set_query_data(&key("1"), &"kept".to_string());

    let result = client
      .fetch_query::<String, _, _, _>(&key("1"), Duration::ZERO, |_| async {
        Err("boom".to_string())
      })
      .await;

    assert!(matches!(result, Err(FetchError::Failed(e)) if e == "boom"));
    assert_eq!(
      client.get_query_data::<String>(&key("1")).as_deref(),
      Some("kept")
    );
    // Nothing left in flight
    assert_eq!(client.cancel_queries(&key("1")), 0);
  }

  #[tokio::test]
  async fn test_invalidate_forces_refetch_and_counts_matches() {
    let client = QueryClient::in_memory();
    client.set_query_data(&key("1"), &1);
    client.set_query_data(&key("2"), &2);
    client.set_query_data(&QueryKey::new("venues"), &3);
    assert!(!client.is_stale(&key("1"), LONG));

    let count = client.invalidate_queries(&QueryKey::new("events"), RefetchType::Active);

    assert_eq!(count, 2);
    assert!(client.is_stale(&key("1"), LONG));
    assert!(client.is_stale(&key("2"), LONG));
    assert!(!client.is_stale(&QueryKey::new("venues"), LONG));
    // Invalidation keeps the value for display
    assert_eq!(client.get_query_data::<i32>(&key("1")), Some(1));
  }

  #[test]
  fn test_refetch_type_none_does_not_ask_for_refetch() {
    let client = QueryClient::in_memory();
    client.set_query_data(&key("1"), &1);
    let before = client.entry_state(&key("1"));

    client.invalidate_queries(&QueryKey::new("events"), RefetchType::None);
    let after_none = client.entry_state(&key("1"));
    assert!(after_none.version > before.version);
    assert_eq!(after_none.refetch_seq, before.refetch_seq);

    client.invalidate_queries(&QueryKey::new("events"), RefetchType::Active);
    assert_eq!(
      client.entry_state(&key("1")).refetch_seq,
      before.refetch_seq + 1
    );
  }

  #[tokio::test]
  async fn test_cancelled_read_is_not_stored() {
    let client = QueryClient::in_memory();
    let (release_tx, release_rx) = oneshot::channel::<()>();

    let reader = {
      let client = client.clone();
      tokio::spawn(async move {
        client
          .fetch_query(&key("1"), Duration::ZERO, |_| async move {
            let _ = release_rx.await;
            Ok::<_, String>("late".to_string())
          })
          .await
      })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(client.cancel_queries(&QueryKey::new("events")), 1);
    let _ = release_tx.send(());

    let result = reader.await.unwrap();
    assert!(matches!(result, Err(FetchError::Cancelled)));
    assert_eq!(client.get_query_data::<String>(&key("1")), None);
  }

  #[tokio::test]
  async fn test_fetcher_observes_cancellation_signal() {
    let client = QueryClient::in_memory();

    let reader = {
      let client = client.clone();
      tokio::spawn(async move {
        client
          .fetch_query::<String, _, _, _>(&key("1"), Duration::ZERO, |token| async move {
            token.cancelled().await;
            Err("aborted".to_string())
          })
          .await
      })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    client.cancel_queries(&key("1"));

    let result = tokio::time::timeout(Duration::from_secs(1), reader)
      .await
      .unwrap()
      .unwrap();
    assert!(matches!(result, Err(FetchError::Cancelled)));
  }

  #[tokio::test]
  async fn test_refetch_supersedes_older_read() {
    let client = QueryClient::in_memory();
    let (release_tx, release_rx) = oneshot::channel::<()>();

    let older = {
      let client = client.clone();
      tokio::spawn(async move {
        client
          .fetch_query(&key("1"), Duration::ZERO, |_| async move {
            let _ = release_rx.await;
            Ok::<_, String>("older".to_string())
          })
          .await
      })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let newer = client
      .refetch_query(&key("1"), |_| async {
        Ok::<_, String>("newer".to_string())
      })
      .await
      .unwrap();
    let _ = release_tx.send(());

    assert_eq!(newer.data, "newer");
    assert!(matches!(older.await.unwrap(), Err(FetchError::Cancelled)));
    assert_eq!(
      client.get_query_data::<String>(&key("1")).as_deref(),
      Some("newer")
    );
  }

  #[tokio::test]
  async fn test_concurrent_reads_join_the_one_in_flight() {
    let client = QueryClient::in_memory();
    let calls = Arc::new(AtomicU32::new(0));
    let (release_tx, release_rx) = oneshot::channel::<()>();

    let first = {
      let client = client.clone();
      let calls = calls.clone();
      tokio::spawn(async move {
        client
          .fetch_query(&key("42"), Duration::ZERO, |_| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            let _ = release_rx.await;
            Ok::<_, String>("shared".to_string())
          })
          .await
      })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let second = {
      let client = client.clone();
      let calls = calls.clone();
      tokio::spawn(async move {
        client
          .fetch_query(&key("42"), Duration::ZERO, |_| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>("second".to_string())
          })
          .await
      })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    let _ = release_tx.send(());

    assert_eq!(first.await.unwrap().unwrap().data, "shared");
    assert_eq!(second.await.unwrap().unwrap().data, "shared");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_joined_read_sees_cancellation() {
    let client = QueryClient::in_memory();

    let spawn_read = |client: QueryClient| {
      tokio::spawn(async move {
        client
          .fetch_query::<String, String, _, _>(&key("1"), Duration::ZERO, |token| async move {
            token.cancelled().await;
            Err("aborted".to_string())
          })
          .await
      })
    };
    let first = spawn_read(client.clone());
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = spawn_read(client.clone());
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(client.cancel_queries(&key("1")), 1);
    assert!(matches!(first.await.unwrap(), Err(FetchError::Cancelled)));
    assert!(matches!(second.await.unwrap(), Err(FetchError::Cancelled)));
  }

  #[tokio::test]
  async fn test_confirmed_values_are_persisted_and_hydrated() {
    let storage: Arc<dyn CacheStorage> = Arc::new(SqliteStorage::open_in_memory().unwrap());

    let first = QueryClient::new(storage.clone());
    first
      .fetch_query(&key("42"), LONG, |_| async {
        Ok::<_, String>("from server".to_string())
      })
      .await
      .unwrap();
    first.set_query_data(&key("7"), &"local only".to_string());

    let second = QueryClient::new(storage);
    let hydrated = second.peek::<String>(&key("42"), LONG).unwrap();
    assert_eq!(hydrated.data, "from server");
    assert!(!hydrated.is_stale());
    assert!(second.peek::<String>(&key("42"), Duration::ZERO).unwrap().is_stale());
    assert_eq!(second.get_query_data::<String>(&key("7")), None);
  }

  #[tokio::test]
  async fn test_removed_entry_is_not_hydrated_again() {
    let storage: Arc<dyn CacheStorage> = Arc::new(SqliteStorage::open_in_memory().unwrap());

    let first = QueryClient::new(storage.clone());
    first
      .fetch_query(&key("42"), LONG, |_| async {
        Ok::<_, String>("deleted soon".to_string())
      })
      .await
      .unwrap();
    first.remove_query(&key("42"));
    assert_eq!(first.get_query_data::<String>(&key("42")), None);

    let second = QueryClient::new(storage);
    assert_eq!(second.get_query_data::<String>(&key("42")), None);
  }

  #[test]
  fn test_wrong_type_reads_as_missing() {
    let client = QueryClient::in_memory();
    client.set_query_data(&key("1"), &"text".to_string());
    assert_eq!(client.get_query_data::<Vec<u32>>(&key("1")), None);
  }
}
