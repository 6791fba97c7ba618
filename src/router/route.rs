use std::fmt;

/// Application routes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
  /// `/events`
  Events,
  /// `/events/new`, shown over the list
  NewEvent,
  /// `/events/:id`
  EventDetails { id: String },
  /// `/events/:id/edit`, shown over the details
  EditEvent { id: String },
}

impl Route {
  /// Parse an absolute path. `/` and the empty path lead to the list.
  pub fn parse(path: &str) -> Option<Route> {
    let segments: Vec<&str> = path
      .trim()
      .split('/')
      .filter(|s| !s.is_empty())
      .collect();

    match segments.as_slice() {
      [] | ["events"] => Some(Route::Events),
      ["events", "new"] => Some(Route::NewEvent),
      ["events", id] => Some(Route::EventDetails { id: id.to_string() }),
      ["events", id, "edit"] => Some(Route::EditEvent { id: id.to_string() }),
      _ => None,
    }
  }

  pub fn path(&self) -> String {
    match self {
      Route::Events => "/events".to_string(),
      Route::NewEvent => "/events/new".to_string(),
      Route::EventDetails { id } => format!("/events/{}", id),
      Route::EditEvent { id } => format!("/events/{}/edit", id),
    }
  }

  /// Event id carried by the route
  #[cfg(test)]
  pub fn id(&self) -> Option<&str> {
    match self {
      Route::EventDetails { id } | Route::EditEvent { id } => Some(id),
      Route::Events | Route::NewEvent => None,
    }
  }

  /// The route `../` leads to
  pub fn parent(&self) -> Option<Route> {
    match self {
      Route::Events => None,
      Route::NewEvent | Route::EventDetails { .. } => Some(Route::Events),
      Route::EditEvent { id } => Some(Route::EventDetails { id: id.clone() }),
    }
  }

  /// Resolve a link relative to this route.
  ///
  /// Absolute paths are parsed as-is; `..` segments climb one route each and
  /// the remaining segments are appended to the current path.
  pub fn resolve(&self, target: &str) -> Option<Route> {
    if target.starts_with('/') {
      return Route::parse(target);
    }

    let mut base = self.clone();
    let mut rest = Vec::new();
    for segment in target.split('/').filter(|s| !s.is_empty() && *s != ".") {
      if segment == ".." && rest.is_empty() {
        base = base.parent()?;
      } else if segment == ".." {
        rest.pop();
      } else {
        rest.push(segment);
      }
    }

    if rest.is_empty() {
      return Some(base);
    }
    Route::parse(&format!("{}/{}", base.path(), rest.join("/")))
  }

  /// Routes rendered for this route, outermost first. Child routes render as
  /// overlays on their outer route.
  pub fn chain(&self) -> Vec<Route> {
    match self {
      Route::Events | Route::EventDetails { .. } => vec![self.clone()],
      Route::NewEvent => vec![Route::Events, Route::NewEvent],
      Route::EditEvent { id } => vec![Route::EventDetails { id: id.clone() }, self.clone()],
    }
  }
}

impl fmt::Display for Route {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.path())
  }
}
