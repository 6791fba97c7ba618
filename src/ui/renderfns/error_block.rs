use ratatui::prelude::*;
use ratatui::widgets::{Paragraph, Wrap};

/// Draw an error block: bold title, message, and an optional hint line
pub fn draw_error_block(frame: &mut Frame, area: Rect, title: &str, message: &str, hint: Option<Line>) {
  let mut lines = vec![
    Line::styled(title.to_string(), Style::default().fg(Color::Red).bold()),
    Line::styled(message.to_string(), Style::default().fg(Color::Red)),
  ];
  if let Some(hint) = hint {
    lines.push(Line::raw(""));
    lines.push(hint);
  }

  let paragraph = Paragraph::new(lines).wrap(Wrap { trim: true });
  frame.render_widget(paragraph, area);
}

/// "<key> label" hint, styled like the header shortcuts
pub fn key_hint(key: &str, label: &str) -> Line<'static> {
  Line::from(vec![
    Span::styled(format!("<{}>", key), Style::default().fg(Color::Cyan)),
    Span::styled(format!(" {}", label), Style::default().fg(Color::DarkGray)),
  ])
}
