//! Data loaders: run before a route's view mounts.

use super::RouteContext;
use crate::api::keys::event_key;
use crate::api::{ApiError, Event};
use tracing::info;

/// Make sure the cache holds the event for `id`, fetching it when missing or
/// stale, and hand it to the view as its initial data.
pub async fn event_loader(ctx: &RouteContext, id: &str) -> Result<Event, ApiError> {
  info!(id, "Loading event");
  let api = ctx.api.clone();
  let event_id = id.to_string();
  let result = ctx
    .queries
    .fetch_query(&event_key(id), ctx.stale_time, move |token| async move {
      api.fetch_event(&event_id, token).await
    })
    .await?;
  Ok(result.data)
}
