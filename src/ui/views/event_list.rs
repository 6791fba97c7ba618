use crate::api::{ApiError, Event};
use crate::query::{Query, QueryState};
use crate::router::{Route, RouteContext};
use crate::ui::components::{EventSearch, KeyResult};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::truncate;
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

/// View for browsing and searching events
pub struct EventListView {
  ctx: RouteContext,
  query: Query<Vec<Event>, ApiError>,
  list_state: ListState,
  search: EventSearch,
}

fn list_query(ctx: &RouteContext, search: &EventSearch) -> Query<Vec<Event>, ApiError> {
  let api = ctx.api.clone();
  let term = search.term().to_string();
  let mut query = Query::new(ctx.queries.clone(), search.key(), move |token| {
    let api = api.clone();
    let term = term.clone();
    async move { api.list_events(Some(&term), token).await }
  })
  .with_stale_time(ctx.stale_time);

  // Start fetching immediately
  query.fetch();
  query
}

impl EventListView {
  pub fn new(ctx: RouteContext) -> Self {
    let search = EventSearch::new();
    let query = list_query(&ctx, &search);
    Self {
      ctx,
      query,
      list_state: ListState::default(),
      search,
    }
  }

  fn events(&self) -> &[Event] {
    self.query.data().map(|v| v.as_slice()).unwrap_or(&[])
  }

  fn search_changed(&mut self) {
    self.query = list_query(&self.ctx, &self.search);
    self.list_state.select(Some(0));
  }

  fn selected_event(&self) -> Option<&Event> {
    self.list_state.selected().and_then(|i| self.events().get(i))
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.events().len();
    ensure_valid_selection(&mut self.list_state, len);

    let filter = if self.search.term().is_empty() {
      String::new()
    } else {
      format!(" [/{}]", self.search.term())
    };
    let title = match self.query.state() {
      QueryState::Loading => format!(" Events{} (loading...) ", filter),
      QueryState::Error(e) => format!(" Events{} (error: {}) ", filter, e),
      _ if self.query.is_fetching() => format!(" Events{} ({}, refreshing...) ", filter, len),
      _ => format!(" Events{} ({}) ", filter, len),
    };

    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if self.events().is_empty() && !self.query.is_loading() {
      let content = if self.query.is_error() {
        "Failed to load events. Press 'r' to retry."
      } else if !self.search.term().is_empty() {
        "No events match your search."
      } else {
        "No events found. Press 'n' to create one."
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let items: Vec<ListItem> = self
      .events()
      .iter()
      .map(|event| {
        let line = Line::from(vec![
          Span::styled(
            format!("{:<14}", truncate(&event.display_date(), 14)),
            Style::default().fg(Color::Cyan),
          ),
          Span::raw(" "),
          Span::raw(format!("{:<40}", truncate(&event.title, 40))),
          Span::raw(" "),
          Span::styled(
            truncate(&event.location, 30),
            Style::default().fg(Color::DarkGray),
          ),
        ]);
        ListItem::new(line)
      })
      .collect();

    let list = List::new(items)
      .block(block)
      .highlight_style(
        Style::default()
          .bg(Color::DarkGray)
          .add_modifier(Modifier::BOLD),
      )
      .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut self.list_state);
  }
}

impl View for EventListView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match self.search.handle_key(key) {
      KeyResult::Event(_) => {
        self.search_changed();
        return ViewAction::None;
      }
      KeyResult::Handled => return ViewAction::None,
      KeyResult::NotHandled => {}
    }

    match key.code {
      KeyCode::Char('j') | KeyCode::Down => {
        self.list_state.select_next();
      }
      KeyCode::Char('k') | KeyCode::Up => {
        self.list_state.select_previous();
      }
      KeyCode::Char('r') => {
        self.query.refetch();
      }
      KeyCode::Char('n') => return ViewAction::Navigate(Route::NewEvent),
      KeyCode::Enter => {
        if let Some(event) = self.selected_event() {
          return ViewAction::Navigate(Route::EventDetails {
            id: event.id.clone(),
          });
        }
      }
      KeyCode::Char('q') => return ViewAction::Quit,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_list(frame, area);
    self.search.render(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    if self.search.term().is_empty() {
      "Events".to_string()
    } else {
      format!("Events [/{}]", self.search.term())
    }
  }

  fn route(&self) -> Route {
    Route::Events
  }

  fn tick(&mut self) -> ViewAction {
    self.query.poll();
    ViewAction::None
  }

  fn is_editing(&self) -> bool {
    self.search.is_editing()
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    if self.search.is_editing() {
      return vec![
        ShortcutInfo::new("enter", "apply").with_priority(10),
        ShortcutInfo::new("esc", "clear").with_priority(20),
      ];
    }
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("/", "search").with_priority(20),
      ShortcutInfo::new("enter", "open").with_priority(30),
      ShortcutInfo::new("n", "new"),
      ShortcutInfo::new("r", "refresh"),
      ShortcutInfo::new("q", "quit").with_priority(200),
    ]
  }
}
