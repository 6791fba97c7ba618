use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear};

/// Rect of `percent_x` by `percent_y` of `area`, centered
pub fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
  let width = area.width * percent_x / 100;
  let height = area.height * percent_y / 100;
  centered_fixed(width, height, area)
}

/// Rect of fixed size centered in `area`, shrunk to fit
pub fn centered_fixed(width: u16, height: u16, area: Rect) -> Rect {
  let width = width.min(area.width);
  let height = height.min(area.height);
  let x = area.x + (area.width - width) / 2;
  let y = area.y + (area.height - height) / 2;
  Rect::new(x, y, width, height)
}

/// Clear `area` and draw a modal frame over it, returning the inner area
pub fn draw_modal(frame: &mut Frame, area: Rect, title: &str) -> Rect {
  frame.render_widget(Clear, area);

  let block = Block::default()
    .title(format!(" {} ", title))
    .title_alignment(Alignment::Center)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Yellow));

  let inner = block.inner(area);
  frame.render_widget(block, area);
  inner
}
