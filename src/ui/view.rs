use crate::api::ApiError;
use crate::router::{NavigationState, Route, Submission};
use crossterm::event::KeyEvent;
use ratatui::prelude::*;

/// A keyboard shortcut hint for display in the header
#[derive(Debug, Clone)]
pub struct ShortcutInfo {
  pub key: &'static str,
  pub label: &'static str,
  pub priority: u8, // Lower = shown first
}

impl ShortcutInfo {
  pub const fn new(key: &'static str, label: &'static str) -> Self {
    Self {
      key,
      label,
      priority: 100,
    }
  }

  pub const fn with_priority(mut self, priority: u8) -> Self {
    self.priority = priority;
    self
  }
}

/// Actions that a view can request in response to user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewAction {
  /// No action needed
  None,
  /// Go to a route (already resolved to an absolute route)
  Navigate(Route),
  /// Hand a form submission to the current route's action
  Submit(Submission),
  /// Exit the application
  Quit,
}

/// Trait for view behavior
///
/// Each view is mounted for one route and returns actions for the App to
/// execute: App → View → Components. Child routes render over their parent.
///
/// Views that load data asynchronously should use Query<T> internally and
/// poll it in the tick() method.
pub trait View {
  /// Handle a key event, returning an action for App to execute
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction;

  /// Render the view to the frame
  fn render(&mut self, frame: &mut Frame, area: Rect);

  /// Get the breadcrumb label for this view
  fn breadcrumb_label(&self) -> String;

  /// The route this view is mounted for
  fn route(&self) -> Route;

  /// Called on each tick to allow views to poll async queries
  fn tick(&mut self) -> ViewAction {
    ViewAction::None
  }

  /// Whether the view is taking text input, so ':' must not open the palette
  fn is_editing(&self) -> bool {
    false
  }

  /// Navigation state changed (loader or action running)
  fn set_navigation(&mut self, _state: NavigationState) {}

  /// The action started by this view's submission failed
  fn action_failed(&mut self, _error: &ApiError) {}

  /// Get keyboard shortcuts to display in the header for the current state
  /// Override this to provide view-specific shortcuts
  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("q", "back").with_priority(30),
    ]
  }
}
