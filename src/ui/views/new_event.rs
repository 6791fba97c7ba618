use crate::api::{ApiError, EventFields};
use crate::router::{NavigationState, Route, SubmitMethod, Submission};
use crate::ui::components::{form_buttons, EventForm, FormEvent, KeyResult};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crossterm::event::KeyEvent;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders};

/// Form for a new event, shown over the list
pub struct NewEventView {
  form: EventForm,
  navigation: NavigationState,
}

impl NewEventView {
  pub fn new() -> Self {
    Self {
      form: EventForm::new(&EventFields::default()),
      navigation: NavigationState::Idle,
    }
  }
}

impl View for NewEventView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    if self.navigation == NavigationState::Submitting {
      return ViewAction::None;
    }

    match self.form.handle_key(key) {
      KeyResult::Event(FormEvent::Submitted(fields)) => ViewAction::Submit(Submission {
        method: SubmitMethod::Post,
        fields,
      }),
      KeyResult::Event(FormEvent::Cancelled) => ViewAction::Navigate(Route::Events),
      KeyResult::Handled | KeyResult::NotHandled => ViewAction::None,
    }
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let block = Block::default()
      .title(" New event ")
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Yellow));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let footer = if self.navigation == NavigationState::Submitting {
      Line::styled("Sending data...", Style::default().fg(Color::Yellow))
    } else {
      form_buttons("create")
    };
    self.form.render(frame, inner, footer);
  }

  fn breadcrumb_label(&self) -> String {
    "New".to_string()
  }

  fn route(&self) -> Route {
    Route::NewEvent
  }

  fn is_editing(&self) -> bool {
    true
  }

  fn set_navigation(&mut self, state: NavigationState) {
    self.navigation = state;
  }

  fn action_failed(&mut self, error: &ApiError) {
    self.form.set_message(error.user_message("Failed to create event"));
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("tab", "next field").with_priority(10),
      ShortcutInfo::new("ctrl-s", "create").with_priority(20),
      ShortcutInfo::new("esc", "cancel").with_priority(30),
    ]
  }
}
