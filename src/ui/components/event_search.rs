use super::input::{InputResult, TextInput};
use super::KeyResult;
use crate::api::keys::events_key;
use crate::cache::QueryKey;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

/// The search term the event list is filtered by.
///
/// Owns the applied term, always trimmed, and the draft being typed. The list
/// only hears about a term when it differs from the one already applied.
#[derive(Debug, Clone, Default)]
pub struct EventSearch {
  term: String,
  draft: Option<TextInput>,
}

impl EventSearch {
  pub fn new() -> Self {
    Self::default()
  }

  /// The applied term; empty when unfiltered.
  pub fn term(&self) -> &str {
    &self.term
  }

  /// Cache key of the list for the applied term.
  pub fn key(&self) -> QueryKey {
    events_key(&self.term)
  }

  pub fn is_editing(&self) -> bool {
    self.draft.is_some()
  }

  fn apply(&mut self, term: &str) -> KeyResult<String> {
    let term = term.trim();
    if term == self.term {
      return KeyResult::Handled;
    }
    self.term = term.to_string();
    KeyResult::Event(self.term.clone())
  }

  /// `/` starts editing with the applied term, enter applies the draft, esc
  /// clears the filter. Emits the new term when it changes.
  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<String> {
    let Some(draft) = self.draft.as_mut() else {
      return match key.code {
        KeyCode::Char('/') => {
          self.draft = Some(TextInput::with_value(self.term.clone()));
          KeyResult::Handled
        }
        KeyCode::Esc if !self.term.is_empty() => self.apply(""),
        _ => KeyResult::NotHandled,
      };
    };

    match draft.handle_key(key) {
      InputResult::Submitted(term) => {
        self.draft = None;
        self.apply(&term)
      }
      InputResult::Cancelled => {
        self.draft = None;
        self.apply("")
      }
      InputResult::Consumed | InputResult::NotHandled => KeyResult::Handled,
    }
  }

  /// Search prompt along the bottom edge of `area`, while editing.
  pub fn render(&self, frame: &mut Frame, area: Rect) {
    let Some(draft) = &self.draft else {
      return;
    };
    if area.height < 5 {
      return;
    }

    let prompt = Rect::new(area.x + 1, area.bottom() - 4, area.width.saturating_sub(2), 3);
    frame.render_widget(Clear, prompt);
    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Yellow))
      .title(" Search events ");
    let inner = block.inner(prompt);
    frame.render_widget(block, prompt);

    let line = if draft.value().is_empty() {
      Line::from(vec![
        Span::styled("_", Style::default().fg(Color::Yellow)),
        Span::styled(
          " title, description or location",
          Style::default().fg(Color::DarkGray),
        ),
      ])
    } else {
      let (before, after) = draft.split_at_cursor();
      Line::from(vec![
        Span::raw(before.to_string()),
        Span::styled("_", Style::default().fg(Color::Yellow)),
        Span::raw(after.to_string()),
      ])
    };
    frame.render_widget(Paragraph::new(line), inner);
  }
}
