//! Query cache for server state.
//!
//! This module is independent of the events API and provides:
//! - Entries keyed by composite [`QueryKey`]s, with partial-match filters
//! - Read-through fetching with a per-call stale time
//! - Invalidation, with or without refetch of mounted queries
//! - Cooperative cancellation of in-flight reads
//! - Optimistic writes with rollback
//! - Optional persistence of confirmed values (SQLite)

mod client;
mod key;
mod optimistic;
mod storage;
mod traits;

pub use client::{EntryState, FetchError, QueryClient};
pub use key::QueryKey;
pub use storage::{CacheStorage, SqliteStorage};
pub use traits::{CacheResult, Cacheable, RefetchType};
