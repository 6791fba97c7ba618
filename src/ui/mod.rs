pub mod components;
pub mod renderfns;
pub mod view;
pub mod views;

use crate::app::App;
use ratatui::prelude::*;
use ratatui::widgets::{Clear, ListState, Paragraph};
use renderfns::{centered_rect, draw_footer, draw_header};

/// Main draw function
pub fn draw(frame: &mut Frame, app: &mut App) {
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1), // Header
      Constraint::Min(1),    // Main content
      Constraint::Length(1), // Footer
    ])
    .split(frame.area());

  draw_header(
    frame,
    chunks[0],
    app.title(),
    app.api_url(),
    &app.route().path(),
    &app.shortcuts(),
  );

  draw_views(frame, chunks[1], app);

  draw_footer(
    frame,
    chunks[2],
    &app.breadcrumb(),
    app.navigation(),
    app.status(),
  );

  // Command palette goes on top of everything
  app.command().render_overlay(frame, chunks[1]);
}

/// The outermost view fills the content area, child routes render over it
fn draw_views(frame: &mut Frame, area: Rect, app: &mut App) {
  let views = app.views_mut();
  if views.is_empty() {
    let loading = Paragraph::new(" Loading...").style(Style::default().fg(Color::DarkGray));
    frame.render_widget(loading, area);
    return;
  }

  for (i, view) in views.iter_mut().enumerate() {
    if i == 0 {
      view.render(frame, area);
    } else {
      let overlay = centered_rect(80, 80, area);
      frame.render_widget(Clear, overlay);
      view.render(frame, overlay);
    }
  }
}

/// Keep a list selection inside `0..len`
pub fn ensure_valid_selection(state: &mut ListState, len: usize) {
  match state.selected() {
    _ if len == 0 => state.select(None),
    None => state.select(Some(0)),
    Some(i) if i >= len => state.select(Some(len - 1)),
    Some(_) => {}
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_ensure_valid_selection() {
    let mut state = ListState::default();
    ensure_valid_selection(&mut state, 3);
    assert_eq!(state.selected(), Some(0));

    state.select(Some(7));
    ensure_valid_selection(&mut state, 3);
    assert_eq!(state.selected(), Some(2));

    ensure_valid_selection(&mut state, 0);
    assert_eq!(state.selected(), None);
  }
}
