use crate::api::keys::{all_events, event_key};
use crate::api::{ApiError, Event};
use crate::cache::RefetchType;
use crate::mutation::{Mutation, MutationState};
use crate::query::{Query, QueryState};
use crate::router::{Route, RouteContext};
use crate::ui::renderfns::{centered_fixed, draw_error_block, draw_modal, key_hint};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use tracing::info;

const DELETE_FAILED: &str = "Failed to delete event";

/// Where the delete confirmation flow is at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletePhase {
  Idle,
  /// Modal open, possibly showing the last failure
  Confirming { error: Option<String> },
  Deleting,
  /// Deleted; the view is about to be left
  Done,
}

/// Details of a single event, with delete confirmation
pub struct EventDetailsView {
  ctx: RouteContext,
  id: String,
  query: Query<Event, ApiError>,
  delete: Mutation<(), ApiError>,
  phase: DeletePhase,
}

impl EventDetailsView {
  pub fn new(ctx: RouteContext, id: String) -> Self {
    let api = ctx.api.clone();
    let event_id = id.clone();
    let mut query = Query::new(ctx.queries.clone(), event_key(&id), move |token| {
      let api = api.clone();
      let id = event_id.clone();
      async move { api.fetch_event(&id, token).await }
    })
    .with_stale_time(ctx.stale_time);

    // Start fetching immediately
    query.fetch();

    Self {
      ctx,
      id,
      query,
      delete: Mutation::new(),
      phase: DeletePhase::Idle,
    }
  }

  fn start_delete(&mut self) {
    if self.phase == DeletePhase::Idle && self.query.data().is_some() {
      self.phase = DeletePhase::Confirming { error: None };
    }
  }

  fn cancel_delete(&mut self) {
    if matches!(self.phase, DeletePhase::Confirming { .. }) {
      self.phase = DeletePhase::Idle;
      self.delete.reset();
    }
  }

  fn confirm_delete(&mut self) {
    if !matches!(self.phase, DeletePhase::Confirming { .. }) {
      return;
    }
    self.phase = DeletePhase::Deleting;
    // A read landing after the delete would only 404
    self.ctx.queries.cancel_queries(&event_key(&self.id));

    let api = self.ctx.api.clone();
    let id = self.id.clone();
    self.delete.mutate(async move { api.delete_event(&id).await });
  }

  fn handle_confirm_key(&mut self, key: KeyEvent) {
    match key.code {
      KeyCode::Char('y') | KeyCode::Enter => self.confirm_delete(),
      KeyCode::Char('n') | KeyCode::Char('q') | KeyCode::Esc => self.cancel_delete(),
      _ => {}
    }
  }

  fn render_event(&self, frame: &mut Frame, area: Rect, event: &Event) {
    let mut lines = vec![
      Line::styled(event.title.clone(), Style::default().bold()),
      Line::styled(event.location.clone(), Style::default().fg(Color::Yellow)),
      Line::styled(
        format!("{} @ {}", event.display_date(), event.time),
        Style::default().fg(Color::Cyan),
      ),
      Line::raw(""),
    ];
    lines.extend(event.description.lines().map(|l| Line::raw(l.to_string())));

    if !event.image.is_empty() {
      lines.push(Line::raw(""));
      lines.push(Line::from(vec![
        Span::styled("Image: ", Style::default().fg(Color::DarkGray)),
        Span::raw(self.ctx.api.image_url(&event.image)),
      ]));
    }

    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
  }

  fn render_confirm(&self, frame: &mut Frame, area: Rect) {
    let error = match &self.phase {
      DeletePhase::Confirming { error } => error.as_deref(),
      DeletePhase::Deleting => None,
      DeletePhase::Idle | DeletePhase::Done => return,
    };

    let height = if error.is_some() { 10 } else { 7 };
    let modal = centered_fixed(50, height, area);
    let inner = draw_modal(frame, modal, "Are you sure ?");

    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([Constraint::Length(2), Constraint::Min(0), Constraint::Length(1)])
      .split(inner);

    frame.render_widget(
      Paragraph::new("Do you really want to delete this event?").wrap(Wrap { trim: true }),
      chunks[0],
    );

    if let Some(message) = error {
      draw_error_block(frame, chunks[1], "An error occurred", message, None);
    }

    let footer = if self.phase == DeletePhase::Deleting {
      Line::styled("Deleting...", Style::default().fg(Color::Yellow))
    } else {
      Line::from(vec![
        Span::styled("<n>", Style::default().fg(Color::Cyan)),
        Span::styled(" cancel   ", Style::default().fg(Color::DarkGray)),
        Span::styled("<y>", Style::default().fg(Color::Cyan)),
        Span::styled(" delete", Style::default().fg(Color::DarkGray)),
      ])
    };
    frame.render_widget(Paragraph::new(footer), chunks[2]);
  }
}

impl View for EventDetailsView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match self.phase {
      DeletePhase::Confirming { .. } => {
        self.handle_confirm_key(key);
        return ViewAction::None;
      }
      DeletePhase::Deleting | DeletePhase::Done => return ViewAction::None,
      DeletePhase::Idle => {}
    }

    match key.code {
      KeyCode::Char('e') if self.query.data().is_some() => {
        if let Some(route) = self.route().resolve("edit") {
          return ViewAction::Navigate(route);
        }
      }
      KeyCode::Char('d') => self.start_delete(),
      KeyCode::Char('r') => self.query.refetch(),
      KeyCode::Enter if self.query.is_error() => return ViewAction::Navigate(Route::Events),
      KeyCode::Char('a') | KeyCode::Char('q') | KeyCode::Esc => {
        return ViewAction::Navigate(Route::Events)
      }
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let title = match (self.query.state(), self.query.data()) {
      (_, Some(event)) => format!(" {} ", event.title),
      (QueryState::Error(_), _) => format!(" Event {} ", self.id),
      _ => format!(" Event {} (loading...) ", self.id),
    };

    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    match (self.query.state(), self.query.data()) {
      (_, Some(event)) => self.render_event(frame, inner, event),
      (QueryState::Error(e), _) => {
        let message = e.user_message("Failed to load event");
        draw_error_block(
          frame,
          inner,
          "An error occurred",
          &message,
          Some(key_hint("a", "view all events")),
        );
      }
      _ => {
        let loading = Paragraph::new("Loading event...").style(Style::default().fg(Color::DarkGray));
        frame.render_widget(loading, inner);
      }
    }

    self.render_confirm(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    match self.query.data() {
      Some(event) => format!("Event: {}", event.title),
      None => format!("Event {}", self.id),
    }
  }

  fn route(&self) -> Route {
    Route::EventDetails {
      id: self.id.clone(),
    }
  }

  fn tick(&mut self) -> ViewAction {
    // The entry is gone once deleted
    if self.phase != DeletePhase::Done {
      self.query.poll();
    }

    let outcome = match self.delete.poll() {
      None => return ViewAction::None,
      Some(MutationState::Success(())) => Ok(()),
      Some(MutationState::Error(e)) => Err(e.user_message(DELETE_FAILED)),
      Some(_) => Err(DELETE_FAILED.to_string()),
    };

    match outcome {
      Ok(()) => {
        info!(id = %self.id, "Event deleted");
        // Lists are stale now but refetch when next shown
        self.ctx.queries.invalidate_queries(&all_events(), RefetchType::None);
        self.ctx.queries.remove_query(&event_key(&self.id));
        self.phase = DeletePhase::Done;
        ViewAction::Navigate(Route::Events)
      }
      Err(message) => {
        self.phase = DeletePhase::Confirming {
          error: Some(message),
        };
        ViewAction::None
      }
    }
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    match self.phase {
      DeletePhase::Confirming { .. } => {
        return vec![
          ShortcutInfo::new("y", "delete").with_priority(10),
          ShortcutInfo::new("n", "cancel").with_priority(20),
        ]
      }
      DeletePhase::Deleting | DeletePhase::Done => return Vec::new(),
      DeletePhase::Idle => {}
    }

    let mut shortcuts = vec![ShortcutInfo::new(":", "command").with_priority(10)];
    if self.query.data().is_some() {
      shortcuts.push(ShortcutInfo::new("e", "edit").with_priority(20));
      shortcuts.push(ShortcutInfo::new("d", "delete").with_priority(30));
    }
    shortcuts.push(ShortcutInfo::new("r", "refresh"));
    shortcuts.push(ShortcutInfo::new("a", "all events").with_priority(150));
    shortcuts
  }
}
