//! Form actions: handle a submission and tell the router where to go next.

use super::{Redirect, Route, RouteContext, SubmitMethod, Submission};
use crate::api::keys::{all_events, event_key};
use crate::api::{ApiError, EventFields};
use crate::cache::RefetchType;
use tracing::info;

/// Dispatch a submission to the action of `route`.
pub async fn run_action(
  ctx: &RouteContext,
  route: &Route,
  submission: Submission,
) -> Result<Redirect, ApiError> {
  match (route, submission.method) {
    (Route::EditEvent { id }, SubmitMethod::Put) => {
      edit_event_action(ctx, id, submission.fields).await
    }
    (Route::NewEvent, SubmitMethod::Post) => new_event_action(ctx, submission.fields).await,
    _ => Err(ApiError::Status {
      status: 405,
      message: Some(format!("No action for {:?} on {}", submission.method, route)),
    }),
  }
}

/// PUT the fields for `id`, mark every events entry stale and refetch what is
/// on screen, then go back to the details.
pub async fn edit_event_action(
  ctx: &RouteContext,
  id: &str,
  fields: EventFields,
) -> Result<Redirect, ApiError> {
  info!(id, "Updating event");
  ctx.api.update_event(id, &fields).await?;
  ctx
    .queries
    .invalidate_queries(&all_events(), RefetchType::Active);
  Ok(Redirect::to(Route::EventDetails { id: id.to_string() }))
}

/// POST a new event, then go to the list. The created event is cached so
/// opening it right away needs no read.
pub async fn new_event_action(ctx: &RouteContext, fields: EventFields) -> Result<Redirect, ApiError> {
  let created = ctx.api.create_event(&fields).await?;
  info!(id = %created.id, "Created event");
  ctx
    .queries
    .invalidate_queries(&all_events(), RefetchType::Active);
  ctx.queries.set_query_data(&event_key(&created.id), &created);
  Ok(Redirect::to(Route::Events))
}
