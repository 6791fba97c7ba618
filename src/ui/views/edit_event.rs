use crate::api::keys::event_key;
use crate::api::{ApiError, Event, EventFields};
use crate::config::UpdateStrategy;
use crate::query::Query;
use crate::router::{NavigationState, Route, RouteContext, SubmitMethod, Submission};
use crate::ui::components::{form_buttons, EventForm, FormEvent, KeyResult};
use crate::ui::renderfns::{draw_error_block, key_hint};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph};
use tracing::{info, warn};

/// Edit form for an event, shown over its details
pub struct EditEventView {
  ctx: RouteContext,
  id: String,
  query: Query<Event, ApiError>,
  form: Option<EventForm>,
  load_error: Option<String>,
  navigation: NavigationState,
}

impl EditEventView {
  /// `initial` is what the route loader produced, if it ran.
  pub fn new(ctx: RouteContext, id: String, initial: Option<Result<Event, ApiError>>) -> Self {
    let api = ctx.api.clone();
    let event_id = id.clone();
    let mut query = Query::new(ctx.queries.clone(), event_key(&id), move |token| {
      let api = api.clone();
      let id = event_id.clone();
      async move { api.fetch_event(&id, token).await }
    })
    .with_stale_time(ctx.edit_stale_time);

    let mut form = None;
    let mut load_error = None;
    match initial {
      // Superseded by a newer read of the entry; the query picks it up
      Some(Err(e)) if e.is_cancelled() => query.fetch(),
      Some(Err(e)) => load_error = Some(e.user_message("Failed to load event")),
      Some(Ok(event)) => {
        form = Some(EventForm::new(&event.fields()));
        query.fetch();
      }
      None => query.fetch(),
    }

    Self {
      ctx,
      id,
      query,
      form,
      load_error,
      navigation: NavigationState::Idle,
    }
  }

  fn parent(&self) -> ViewAction {
    match self.route().resolve("../") {
      Some(route) => ViewAction::Navigate(route),
      None => ViewAction::None,
    }
  }

  fn submit(&mut self, fields: EventFields) -> ViewAction {
    match self.ctx.strategy {
      UpdateStrategy::Action => ViewAction::Submit(Submission {
        method: SubmitMethod::Put,
        fields,
      }),
      UpdateStrategy::Optimistic => {
        self.submit_optimistic(fields);
        self.parent()
      }
    }
  }

  /// Show the new values at once and send the update in the background.
  /// A failed update only rolls the cache back.
  fn submit_optimistic(&self, fields: EventFields) {
    let api = self.ctx.api.clone();
    let id = self.id.clone();
    let value = Event::with_fields(id.clone(), fields.clone());

    let update = self.ctx.queries.optimistic_update(&event_key(&id), &value, async move {
      api.update_event(&id, &fields).await?;
      Ok::<_, ApiError>(id)
    });

    tokio::spawn(async move {
      match update.await {
        Ok(id) => info!(id = %id, "Event updated"),
        Err(e) => warn!(error = %e, "Optimistic update failed, rolled back"),
      }
    });
  }
}

impl View for EditEventView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    if self.load_error.is_some() {
      return match key.code {
        KeyCode::Enter | KeyCode::Esc | KeyCode::Char('q') => self.parent(),
        _ => ViewAction::None,
      };
    }

    if self.navigation == NavigationState::Submitting {
      return ViewAction::None;
    }

    let Some(form) = self.form.as_mut() else {
      return match key.code {
        KeyCode::Esc => self.parent(),
        _ => ViewAction::None,
      };
    };

    match form.handle_key(key) {
      KeyResult::Event(FormEvent::Submitted(fields)) => self.submit(fields),
      KeyResult::Event(FormEvent::Cancelled) => self.parent(),
      KeyResult::Handled | KeyResult::NotHandled => ViewAction::None,
    }
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let block = Block::default()
      .title(" Edit event ")
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Yellow));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if let Some(message) = &self.load_error {
      draw_error_block(
        frame,
        inner,
        "An error occurred",
        message,
        Some(key_hint("enter", "OK")),
      );
      return;
    }

    match &self.form {
      Some(form) => {
        let footer = if self.navigation == NavigationState::Submitting {
          Line::styled("Sending data...", Style::default().fg(Color::Yellow))
        } else {
          form_buttons("update")
        };
        form.render(frame, inner, footer);
      }
      None => {
        let loading = Paragraph::new("Loading event...").style(Style::default().fg(Color::DarkGray));
        frame.render_widget(loading, inner);
      }
    }
  }

  fn breadcrumb_label(&self) -> String {
    "Edit".to_string()
  }

  fn route(&self) -> Route {
    Route::EditEvent {
      id: self.id.clone(),
    }
  }

  fn tick(&mut self) -> ViewAction {
    self.query.poll();

    // The form is filled once; later cache updates don't clobber typing
    if self.form.is_none() && self.load_error.is_none() {
      if let Some(event) = self.query.data() {
        self.form = Some(EventForm::new(&event.fields()));
      } else if let Some(e) = self.query.error() {
        self.load_error = Some(e.user_message("Failed to load event"));
      }
    }
    ViewAction::None
  }

  fn is_editing(&self) -> bool {
    self.form.is_some() && self.load_error.is_none()
  }

  fn set_navigation(&mut self, state: NavigationState) {
    self.navigation = state;
  }

  fn action_failed(&mut self, error: &ApiError) {
    if let Some(form) = self.form.as_mut() {
      form.set_message(error.user_message("Failed to update event"));
    }
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    if self.load_error.is_some() {
      return vec![ShortcutInfo::new("enter", "ok")];
    }
    vec![
      ShortcutInfo::new("tab", "next field").with_priority(10),
      ShortcutInfo::new("ctrl-s", "update").with_priority(20),
      ShortcutInfo::new("esc", "cancel").with_priority(30),
    ]
  }
}
