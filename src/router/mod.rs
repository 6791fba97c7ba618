//! Routes, their data loaders, and form actions.

pub mod action;
pub mod loader;
mod route;

pub use route::Route;

use crate::api::{EventFields, EventsClient};
use crate::cache::QueryClient;
use crate::config::{Config, UpdateStrategy};
use std::time::Duration;

/// What loaders, actions and views share. Cloning is cheap.
#[derive(Clone)]
pub struct RouteContext {
  pub api: EventsClient,
  pub queries: QueryClient,
  /// Stale time of the list and details queries
  pub stale_time: Duration,
  /// Stale time of the edit form's query
  pub edit_stale_time: Duration,
  pub strategy: UpdateStrategy,
}

impl RouteContext {
  pub fn new(config: &Config, api: EventsClient, queries: QueryClient) -> Self {
    Self {
      api,
      queries,
      stale_time: config.stale_time(),
      edit_stale_time: config.edit_stale_time(),
      strategy: config.edit.strategy,
    }
  }
}

/// Global navigation state shown by views
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NavigationState {
  #[default]
  Idle,
  /// A loader runs for the next route
  Loading,
  /// An action runs for a form submission
  Submitting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMethod {
  Post,
  Put,
}

/// A form submission handed to the route's action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
  pub method: SubmitMethod,
  pub fields: EventFields,
}

/// Where an action sends the user afterwards
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
  pub to: Route,
}

impl Redirect {
  pub fn to(route: Route) -> Self {
    Self { to: route }
  }
}
