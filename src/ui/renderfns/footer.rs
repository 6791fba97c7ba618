use crate::router::NavigationState;
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Status line message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
  pub text: String,
  pub is_error: bool,
}

/// Draw the footer bar with view breadcrumb, navigation state, and status message
pub fn draw_footer(
  frame: &mut Frame,
  area: Rect,
  breadcrumb: &[String],
  navigation: NavigationState,
  status: Option<&StatusMessage>,
) {
  let mut spans = Vec::new();

  spans.push(Span::raw(" "));

  for (i, part) in breadcrumb.iter().enumerate() {
    if i > 0 {
      spans.push(Span::styled(" > ", Style::default().fg(Color::DarkGray)));
    }

    let style = if i == breadcrumb.len() - 1 {
      // Current view - highlighted
      Style::default().fg(Color::Cyan).bold()
    } else {
      Style::default().fg(Color::White)
    };

    spans.push(Span::styled(part.clone(), style));
  }

  match navigation {
    NavigationState::Idle => {}
    NavigationState::Loading => {
      spans.push(Span::styled("  loading...", Style::default().fg(Color::Yellow)));
    }
    NavigationState::Submitting => {
      spans.push(Span::styled("  submitting...", Style::default().fg(Color::Yellow)));
    }
  }

  if let Some(status) = status {
    let color = if status.is_error { Color::Red } else { Color::Green };
    spans.push(Span::styled("  │ ", Style::default().fg(Color::DarkGray)));
    spans.push(Span::styled(status.text.clone(), Style::default().fg(color)));
  }

  let line = Line::from(spans);
  let paragraph = Paragraph::new(line).style(Style::default().bg(Color::Black));

  frame.render_widget(paragraph, area);
}
