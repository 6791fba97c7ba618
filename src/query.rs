//! Async query abstraction bound to the shared query cache.
//!
//! A `Query<T, E>` observes one cache entry. It reads through the cache,
//! fetches in a spawned task when the entry is missing or stale, and picks up
//! writes and invalidations made by other parts of the application.
//!
//! # Example
//!
//! ```ignore
//! let api = api.clone();
//! let mut query = Query::new(queries.clone(), event_key(&id), move |token| {
//!     let api = api.clone();
//!     let id = id.clone();
//!     async move { api.fetch_event(&id, token).await }
//! });
//!
//! // Start fetching (served from the cache when fresh)
//! query.fetch();
//!
//! // In event loop tick
//! if query.poll() {
//!     // State changed, trigger re-render
//! }
//!
//! // In render
//! match query.state() {
//!     QueryState::Loading => render_spinner(),
//!     QueryState::Success(data) => render_data(data),
//!     QueryState::Error(e) => render_error(e),
//!     QueryState::Idle => {}
//! }
//! ```

use crate::cache::{CacheResult, Cacheable, EntryState, FetchError, QueryClient, QueryKey};
use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// The state of a query
#[derive(Debug, Clone)]
pub enum QueryState<T, E = String> {
  /// Query has not been started
  Idle,
  /// Query is fetching and has no data to show yet
  Loading,
  /// Query has data (possibly being refreshed in the background)
  Success(T),
  /// Query failed with an error
  Error(E),
}

impl<T, E> QueryState<T, E> {
  pub fn is_idle(&self) -> bool {
    matches!(self, QueryState::Idle)
  }

  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn is_success(&self) -> bool {
    matches!(self, QueryState::Success(_))
  }

  pub fn is_error(&self) -> bool {
    matches!(self, QueryState::Error(_))
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      QueryState::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&E> {
    match self {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }
}

type FetcherFn<T, E> = Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

type FetchResult<T, E> = Result<CacheResult<T>, FetchError<E>>;

/// Observer of one cache entry.
pub struct Query<T, E = String> {
  client: QueryClient,
  key: QueryKey,
  state: QueryState<T, E>,
  fetcher: FetcherFn<T, E>,
  receiver: Option<mpsc::UnboundedReceiver<FetchResult<T, E>>>,
  stale_time: Duration,
  seen: EntryState,
}

impl<T: Cacheable, E: Clone + Send + Sync + 'static> Query<T, E> {
  /// Create a query for `key`.
  ///
  /// The fetcher receives a cancellation token and should stop early once it
  /// is cancelled; a cancelled read never reaches the cache. The default stale
  /// time is zero, so every mount refetches unless the entry was just written.
  pub fn new<F, Fut>(client: QueryClient, key: QueryKey, fetcher: F) -> Self
  where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
  {
    Self {
      client,
      key,
      state: QueryState::Idle,
      fetcher: Arc::new(move |token| fetcher(token).boxed()),
      receiver: None,
      stale_time: Duration::ZERO,
      seen: EntryState::default(),
    }
  }

  /// Set how long a cached value counts as fresh.
  pub fn with_stale_time(mut self, duration: Duration) -> Self {
    self.stale_time = duration;
    self
  }

  pub fn state(&self) -> &QueryState<T, E> {
    &self.state
  }

  pub fn data(&self) -> Option<&T> {
    self.state.data()
  }

  /// Loading with nothing to show yet.
  pub fn is_loading(&self) -> bool {
    self.state.is_loading()
  }

  /// A read is in flight, with or without data on screen.
  pub fn is_fetching(&self) -> bool {
    self.receiver.is_some()
  }

  pub fn is_error(&self) -> bool {
    self.state.is_error()
  }

  pub fn error(&self) -> Option<&E> {
    self.state.error()
  }

  /// Show the cached value if there is one and fetch when it is stale.
  ///
  /// This is a no-op while a read is in flight.
  pub fn fetch(&mut self) {
    if self.receiver.is_some() {
      return;
    }

    match self.client.peek::<T>(&self.key, self.stale_time) {
      Some(cached) if !cached.is_stale() => {
        debug!(key = %self.key, cached_at = ?cached.cached_at, "Query served from cache");
        self.state = QueryState::Success(cached.data);
        self.seen = self.client.entry_state(&self.key);
      }
      Some(cached) => {
        self.state = QueryState::Success(cached.data);
        self.start_fetch(false);
      }
      None => {
        self.state = QueryState::Loading;
        self.start_fetch(false);
      }
    }
  }

  /// Fetch regardless of freshness, superseding any read in flight.
  pub fn refetch(&mut self) {
    self.receiver = None;
    if !self.state.is_success() {
      self.state = QueryState::Loading;
    }
    self.start_fetch(true);
  }

  /// Poll for results and for changes made to the entry elsewhere.
  ///
  /// Returns `true` if the state changed. Call this in your event loop tick handler.
  pub fn poll(&mut self) -> bool {
    if let Some(receiver) = &mut self.receiver {
      let result = match receiver.try_recv() {
        Ok(result) => Some(result),
        Err(mpsc::error::TryRecvError::Empty) => return false,
        Err(mpsc::error::TryRecvError::Disconnected) => None,
      };
      self.receiver = None;
      self.seen.version = self.client.entry_state(&self.key).version;

      match result {
        Some(Ok(cached)) => self.state = QueryState::Success(cached.data),
        Some(Err(FetchError::Failed(e))) => self.state = QueryState::Error(e),
        Some(Err(FetchError::Cancelled)) | None => self.sync_from_cache(),
      }
      return true;
    }

    if self.state.is_idle() {
      return false;
    }

    let current = self.client.entry_state(&self.key);
    if current.refetch_seq != self.seen.refetch_seq {
      debug!(key = %self.key, "Refetching invalidated query");
      let written = current.version != self.seen.version;
      // Joins a read another observer of the entry already started
      self.start_fetch(false);
      if written {
        self.sync_from_cache();
      }
      return true;
    }
    if current.version != self.seen.version {
      self.seen = current;
      self.sync_from_cache();
      return true;
    }
    false
  }

  fn sync_from_cache(&mut self) {
    match self.client.get_query_data::<T>(&self.key) {
      Some(data) => self.state = QueryState::Success(data),
      None if self.state.is_loading() && self.receiver.is_none() => self.state = QueryState::Idle,
      None if self.state.is_success() => {
        // Entry was cleared, e.g. rolled back to nothing
        debug!(key = %self.key, "Entry cleared, refetching");
        self.state = QueryState::Loading;
        if self.receiver.is_none() {
          self.start_fetch(false);
        }
      }
      None => {}
    }
  }

  fn start_fetch(&mut self, supersede: bool) {
    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);
    self.seen = self.client.entry_state(&self.key);

    let client = self.client.clone();
    let key = self.key.clone();
    let fetcher = self.fetcher.clone();
    let stale_time = self.stale_time;
    tokio::spawn(async move {
      let result = if supersede {
        client.refetch_query(&key, |token| fetcher(token)).await
      } else {
        client
          .fetch_query(&key, stale_time, |token| fetcher(token))
          .await
      };
      // Ignore send errors - receiver may have been dropped
      let _ = tx.send(result);
    });
  }
}

impl<T: std::fmt::Debug, E: std::fmt::Debug> std::fmt::Debug for Query<T, E> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("key", &self.key)
      .field("state", &self.state)
      .field("stale_time", &self.stale_time)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::RefetchType;
  use std::sync::atomic::{AtomicU32, Ordering};

  fn key() -> QueryKey {
    QueryKey::new("events").param("id", "42")
  }

  fn is_stale<T: Cacheable, E: Clone + Send + Sync + 'static>(query: &Query<T, E>) -> bool {
    query.client.is_stale(&query.key, query.stale_time)
  }

  fn counting(client: &QueryClient, calls: Arc<AtomicU32>) -> Query<u32> {
    Query::new(client.clone(), key(), move |_| {
      let calls = calls.clone();
      async move { Ok::<_, String>(calls.fetch_add(1, Ordering::SeqCst)) }
    })
  }

  fn slow_counting(client: &QueryClient, calls: Arc<AtomicU32>) -> Query<u32> {
    Query::new(client.clone(), key(), move |_| {
      let calls = calls.clone();
      async move {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok::<_, String>(n)
      }
    })
  }

  #[tokio::test]
  async fn test_query_success() {
    let client = QueryClient::in_memory();
    let mut query = Query::new(client.clone(), key(), |_| async {
      Ok::<_, String>(vec![1, 2, 3])
    });

    assert!(matches!(query.state(), QueryState::Idle));

    query.fetch();
    assert!(query.is_loading());

    // Wait for the result
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(query.poll());
    assert!(query.state().is_success());
    assert_eq!(query.data(), Some(&vec![1, 2, 3]));
    assert_eq!(client.get_query_data::<Vec<i32>>(&key()), Some(vec![1, 2, 3]));
  }

  #[tokio::test]
  async fn test_query_error() {
    let mut query: Query<i32> = Query::new(QueryClient::in_memory(), key(), |_| async {
      Err("Something went wrong".to_string())
    });

    query.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(query.poll());
    assert!(query.is_error());
    assert_eq!(query.error().map(String::as_str), Some("Something went wrong"));
  }

  #[tokio::test]
  async fn test_query_stale() {
    let client = QueryClient::in_memory();
    let mut query = Query::new(client, key(), |_| async { Ok::<_, String>(42) });

    query.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;
    query.poll();

    // With zero stale time, should immediately be stale
    assert!(is_stale(&query));
  }

  #[tokio::test]
  async fn test_fresh_entry_is_served_without_fetching() {
    let client = QueryClient::in_memory();
    client.set_query_data(&key(), &7u32);
    let calls = Arc::new(AtomicU32::new(0));

    let mut query = counting(&client, calls.clone()).with_stale_time(Duration::from_secs(10));
    query.fetch();

    assert_eq!(query.data(), Some(&7));
    assert!(!query.is_fetching());
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!query.poll());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_stale_entry_shown_while_refetching() {
    let client = QueryClient::in_memory();
    client.set_query_data(&key(), &7u32);
    let calls = Arc::new(AtomicU32::new(0));

    let mut query = counting(&client, calls.clone());
    query.fetch();
    assert_eq!(query.data(), Some(&7));
    assert!(query.is_fetching());

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(query.poll());
    assert_eq!(query.data(), Some(&0));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_fetch_while_loading_is_noop() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let mut query = Query::new(QueryClient::in_memory(), key(), move |_| {
      let counter = counter.clone();
      async move {
        counter.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok::<_, String>(42)
      }
    });

    query.fetch();
    assert!(query.is_loading());

    // Second fetch should be no-op
    query.fetch();
    assert!(query.is_loading());
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_refetch_supersedes_pending() {
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();

    let mut query = Query::new(QueryClient::in_memory(), key(), move |_| {
      let counter = counter_clone.clone();
      async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok::<_, String>(counter.fetch_add(1, Ordering::SeqCst))
      }
    });

    query.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;

    // Refetch should cancel the first and start a new one
    query.refetch();
    tokio::time::sleep(Duration::from_millis(100)).await;

    query.poll();
    // Only the second fetch should have completed and been received
    assert_eq!(query.data(), Some(&1));
  }

  #[tokio::test]
  async fn test_observes_writes_made_elsewhere() {
    let client = QueryClient::in_memory();
    let mut query = counting(&client, Arc::new(AtomicU32::new(0)));
    query.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;
    query.poll();

    client.set_query_data(&key(), &99u32);
    assert!(query.poll());
    assert_eq!(query.data(), Some(&99));
    assert!(!query.poll());
  }

  #[tokio::test]
  async fn test_invalidation_without_refetch_keeps_data() {
    let client = QueryClient::in_memory();
    let calls = Arc::new(AtomicU32::new(0));
    let mut query = counting(&client, calls.clone());
    query.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;
    query.poll();

    client.invalidate_queries(&QueryKey::new("events"), RefetchType::None);
    query.poll();
    tokio::time::sleep(Duration::from_millis(10)).await;
    query.poll();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(query.data(), Some(&0));
    assert!(is_stale(&query));
  }

  #[tokio::test]
  async fn test_active_invalidation_refetches() {
    let client = QueryClient::in_memory();
    let calls = Arc::new(AtomicU32::new(0));
    let mut query = counting(&client, calls.clone());
    query.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;
    query.poll();

    client.invalidate_queries(&QueryKey::new("events"), RefetchType::Active);
    assert!(query.poll());
    assert!(query.is_fetching());
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(query.poll());

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(query.data(), Some(&1));
  }

  #[tokio::test]
  async fn test_observers_of_one_entry_share_a_read() {
    let client = QueryClient::in_memory();
    let calls = Arc::new(AtomicU32::new(0));
    let mut details = slow_counting(&client, calls.clone());
    let mut edit = slow_counting(&client, calls.clone());

    details.fetch();
    edit.fetch();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(details.poll());
    assert!(edit.poll());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(details.data(), Some(&0));
    assert_eq!(edit.data(), Some(&0));

    client.invalidate_queries(&QueryKey::new("events"), RefetchType::Active);
    assert!(details.poll());
    assert!(edit.poll());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(details.poll());
    assert!(edit.poll());

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(details.data(), Some(&1));
    assert_eq!(edit.data(), Some(&1));
  }

  #[tokio::test]
  async fn test_observers_share_a_failed_read() {
    let client = QueryClient::in_memory();
    let calls = Arc::new(AtomicU32::new(0));
    let failing = |calls: Arc<AtomicU32>| {
      Query::<u32>::new(client.clone(), key(), move |_| {
        let calls = calls.clone();
        async move {
          calls.fetch_add(1, Ordering::SeqCst);
          tokio::time::sleep(Duration::from_millis(50)).await;
          Err("Event not found".to_string())
        }
      })
    };
    let mut details = failing(calls.clone());
    let mut edit = failing(calls.clone());

    details.fetch();
    edit.fetch();
    tokio::time::sleep(Duration::from_millis(100)).await;
    details.poll();
    edit.poll();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(details.error().map(String::as_str), Some("Event not found"));
    assert_eq!(edit.error().map(String::as_str), Some("Event not found"));
  }

  #[tokio::test]
  async fn test_rollback_to_nothing_drops_speculative_value() {
    let client = QueryClient::in_memory();
    let mut query: Query<String> = Query::new(client.clone(), key(), |_| async {
      tokio::time::sleep(Duration::from_millis(50)).await;
      Ok::<_, String>("From server".to_string())
    })
    .with_stale_time(Duration::from_secs(10));

    let snapshot = client.begin_optimistic(&key(), &"New".to_string());
    query.fetch();
    assert_eq!(query.data().map(String::as_str), Some("New"));

    snapshot.settle(&client, false);
    assert!(query.poll());
    assert!(query.is_loading());
    assert_eq!(query.data(), None);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(query.poll());
    assert_eq!(query.data().map(String::as_str), Some("From server"));
  }

  #[tokio::test]
  async fn test_optimistic_write_replaces_pending_read() {
    let client = QueryClient::in_memory();
    client.set_query_data(&key(), &"Old".to_string());
    let mut query: Query<String> = Query::new(client.clone(), key(), |token| async move {
      tokio::select! {
        _ = token.cancelled() => Err("cancelled".to_string()),
        _ = tokio::time::sleep(Duration::from_millis(200)) => Ok("Old from server".to_string()),
      }
    });
    query.fetch();
    assert!(query.is_fetching());
    tokio::time::sleep(Duration::from_millis(10)).await;

    let snapshot = client.begin_optimistic(&key(), &"New".to_string());
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(query.poll());
    assert_eq!(query.data().map(String::as_str), Some("New"));
    snapshot.settle(&client, true);
  }
}
