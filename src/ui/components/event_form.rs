use super::input::{InputResult, TextInput};
use super::KeyResult;
use crate::api::EventFields;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

/// Events emitted by the form that the parent view needs to handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormEvent {
  /// All required fields are filled in
  Submitted(EventFields),
  Cancelled,
}

const LABELS: [&str; 6] = [
  "Title",
  "Description",
  "Date (YYYY-MM-DD)",
  "Time",
  "Location",
  "Image",
];

/// Event form: one text input per field, Tab to move between them
#[derive(Debug, Clone)]
pub struct EventForm {
  inputs: Vec<TextInput>,
  focus: usize,
  message: Option<String>,
}

impl EventForm {
  pub fn new(initial: &EventFields) -> Self {
    let inputs = EventFields::NAMES
      .iter()
      .map(|name| TextInput::with_value(initial.get(name).unwrap_or_default()))
      .collect();
    Self {
      inputs,
      focus: 0,
      message: None,
    }
  }

  pub fn fields(&self) -> EventFields {
    let mut fields = EventFields::default();
    for (name, input) in EventFields::NAMES.iter().zip(&self.inputs) {
      fields.set(name, input.value().to_string());
    }
    fields
  }

  /// Show a message under the form, e.g. a failed submission
  pub fn set_message(&mut self, message: impl Into<String>) {
    self.message = Some(message.into());
  }

  fn focus_next(&mut self) {
    self.focus = (self.focus + 1) % self.inputs.len();
  }

  fn focus_previous(&mut self) {
    self.focus = (self.focus + self.inputs.len() - 1) % self.inputs.len();
  }

  fn submit(&mut self) -> KeyResult<FormEvent> {
    let fields = self.fields();
    if let Some(missing) = fields.missing_field() {
      if let Some(idx) = EventFields::NAMES.iter().position(|n| *n == missing) {
        self.focus = idx;
      }
      self.message = Some(format!("Please fill in the {} field", missing));
      return KeyResult::Handled;
    }
    self.message = None;
    KeyResult::Event(FormEvent::Submitted(fields))
  }

  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<FormEvent> {
    match key.code {
      KeyCode::Char('s') if key.modifiers.contains(KeyModifiers::CONTROL) => return self.submit(),
      KeyCode::Tab | KeyCode::Down => {
        self.focus_next();
        return KeyResult::Handled;
      }
      KeyCode::BackTab | KeyCode::Up => {
        self.focus_previous();
        return KeyResult::Handled;
      }
      _ => {}
    }

    match self.inputs[self.focus].handle_key(key) {
      InputResult::Cancelled => KeyResult::Event(FormEvent::Cancelled),
      InputResult::Submitted(_) if self.focus + 1 == self.inputs.len() => self.submit(),
      InputResult::Submitted(_) => {
        self.focus_next();
        KeyResult::Handled
      }
      InputResult::Consumed => KeyResult::Handled,
      InputResult::NotHandled => KeyResult::NotHandled,
    }
  }

  /// Render fields, the message line, and `footer` (buttons or progress)
  pub fn render(&self, frame: &mut Frame, area: Rect, footer: Line) {
    let mut constraints: Vec<Constraint> = self.inputs.iter().map(|_| Constraint::Length(3)).collect();
    constraints.push(Constraint::Length(2));
    constraints.push(Constraint::Length(1));
    constraints.push(Constraint::Min(0));

    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints(constraints)
      .split(area);

    for (i, (input, label)) in self.inputs.iter().zip(LABELS).enumerate() {
      let focused = i == self.focus;
      let border = if focused { Color::Yellow } else { Color::DarkGray };
      let block = Block::default()
        .title(format!(" {} ", label))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border));

      let line = if focused {
        let (before, after) = input.split_at_cursor();
        Line::from(vec![
          Span::raw(before),
          Span::styled("_", Style::default().fg(Color::Yellow)),
          Span::raw(after),
        ])
      } else {
        Line::raw(input.value())
      };
      frame.render_widget(Paragraph::new(line).block(block), chunks[i]);
    }

    let n = self.inputs.len();
    if let Some(message) = &self.message {
      let paragraph = Paragraph::new(message.as_str())
        .style(Style::default().fg(Color::Red))
        .wrap(Wrap { trim: true });
      frame.render_widget(paragraph, chunks[n]);
    }
    frame.render_widget(Paragraph::new(footer), chunks[n + 1]);
  }
}

/// Default form buttons
pub fn form_buttons(submit_label: &str) -> Line<'static> {
  Line::from(vec![
    Span::styled("<esc>", Style::default().fg(Color::Cyan)),
    Span::styled(" cancel   ", Style::default().fg(Color::DarkGray)),
    Span::styled("<ctrl-s>", Style::default().fg(Color::Cyan)),
    Span::styled(format!(" {}", submit_label), Style::default().fg(Color::DarkGray)),
  ])
}
