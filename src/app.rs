use crate::api::{ApiError, Event, EventsClient};
use crate::cache::{CacheStorage, QueryClient, SqliteStorage};
use crate::commands::{self, PaletteCommand};
use crate::config::Config;
use crate::event::{AppEvent, EventHandler, NavigationEvent};
use crate::router::{action, loader, NavigationState, Route, RouteContext, Submission};
use crate::ui;
use crate::ui::components::{CommandEvent, CommandInput, KeyResult};
use crate::ui::renderfns::StatusMessage;
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::{EditEventView, EventDetailsView, EventListView, NewEventView};
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::{stdout, Stdout};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Main application state
pub struct App {
  config: Config,
  ctx: RouteContext,

  /// Views of the current route, outermost first
  views: Vec<Box<dyn View>>,
  route: Route,

  navigation: NavigationState,
  /// Sequence number of the loader or action being waited for
  pending: Option<u64>,
  nav_seq: u64,

  /// Command palette (after pressing :)
  command: CommandInput,
  status: Option<StatusMessage>,

  /// Event sender for async tasks
  event_tx: mpsc::UnboundedSender<AppEvent>,

  should_quit: bool,
}

/// Open the configured cache storage, if any. A broken cache file only
/// costs persistence, so it falls back to memory.
fn open_storage(config: &Config) -> Option<Arc<dyn CacheStorage>> {
  if !config.cache.persist {
    return None;
  }

  let path = match &config.cache.path {
    Some(path) => Ok(path.clone()),
    None => Config::data_dir().map(|dir| dir.join("cache.db")),
  };

  match path.and_then(|path| SqliteStorage::open(&path)) {
    Ok(storage) => Some(Arc::new(storage) as Arc<dyn CacheStorage>),
    Err(e) => {
      warn!(error = %e, "Cache persistence disabled");
      None
    }
  }
}

impl App {
  pub fn new(config: Config, start: Route) -> Result<Self> {
    let api = EventsClient::new(&config.api)?;
    let queries = match open_storage(&config) {
      Some(storage) => QueryClient::new(storage),
      None => QueryClient::in_memory(),
    };
    let ctx = RouteContext::new(&config, api, queries);
    let (tx, _rx) = mpsc::unbounded_channel();

    Ok(Self {
      config,
      ctx,
      views: Vec::new(),
      route: start,
      navigation: NavigationState::Idle,
      pending: None,
      nav_seq: 0,
      command: CommandInput::new(),
      status: None,
      event_tx: tx,
      should_quit: false,
    })
  }

  pub async fn run(&mut self) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    // Create event handler
    let mut events = EventHandler::new(Duration::from_millis(250));
    self.event_tx = events.sender();

    let start = self.route.clone();
    info!(route = %start, "Starting");
    self.navigate(start);

    let result = self.event_loop(&mut terminal, &mut events).await;

    // Cleanup terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
  }

  async fn event_loop(
    &mut self,
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    events: &mut EventHandler,
  ) -> Result<()> {
    while !self.should_quit {
      terminal.draw(|frame| ui::draw(frame, self))?;

      match events.next().await {
        Some(event) => self.handle_event(event),
        None => break,
      }
    }
    Ok(())
  }

  fn handle_event(&mut self, event: AppEvent) {
    match event {
      AppEvent::Key(key) => self.handle_key(key),
      AppEvent::Tick => self.tick(),
      AppEvent::Navigation(event) => self.handle_navigation(event),
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }

    // The palette opens on ':' unless a view is taking text input
    let editing = self.views.last().is_some_and(|v| v.is_editing());
    if self.command.is_active() || !editing {
      match self.command.handle_key(key) {
        KeyResult::Event(CommandEvent::Submitted(line)) => {
          self.run_command(&line);
          return;
        }
        KeyResult::Event(CommandEvent::Cancelled) | KeyResult::Handled => return,
        KeyResult::NotHandled => {}
      }
    }

    self.status = None;
    if let Some(view) = self.views.last_mut() {
      let action = view.handle_key(key);
      self.apply(action);
    }
  }

  fn run_command(&mut self, line: &str) {
    debug!(line, "Command");
    match commands::parse(line) {
      Ok(PaletteCommand::Events) => self.navigate(Route::Events),
      Ok(PaletteCommand::New) => self.navigate(Route::NewEvent),
      Ok(PaletteCommand::Open(id)) => self.navigate(Route::EventDetails { id }),
      Ok(PaletteCommand::Quit) => self.should_quit = true,
      Err(message) => {
        self.status = Some(StatusMessage {
          text: message,
          is_error: true,
        })
      }
    }
  }

  fn tick(&mut self) {
    let actions: Vec<ViewAction> = self.views.iter_mut().map(|view| view.tick()).collect();
    for action in actions {
      self.apply(action);
    }
  }

  fn apply(&mut self, action: ViewAction) {
    match action {
      ViewAction::None => {}
      ViewAction::Navigate(route) => self.navigate(route),
      ViewAction::Submit(submission) => self.submit(submission),
      ViewAction::Quit => self.should_quit = true,
    }
  }

  fn next_seq(&mut self) -> u64 {
    self.nav_seq += 1;
    self.nav_seq
  }

  fn set_navigation(&mut self, state: NavigationState) {
    self.navigation = state;
    for view in &mut self.views {
      view.set_navigation(state);
    }
  }

  /// Go to `target`. Routes with a loader mount once it settled; the
  /// current views stay on screen meanwhile.
  pub fn navigate(&mut self, target: Route) {
    info!(from = %self.route, to = %target, "Navigate");
    let seq = self.next_seq();

    match &target {
      Route::EditEvent { id } => {
        self.pending = Some(seq);
        self.set_navigation(NavigationState::Loading);

        let ctx = self.ctx.clone();
        let tx = self.event_tx.clone();
        let id = id.clone();
        tokio::spawn(async move {
          let result = loader::event_loader(&ctx, &id).await;
          let _ = tx.send(AppEvent::Navigation(NavigationEvent::Loaded {
            seq,
            route: target,
            result,
          }));
        });
      }
      _ => {
        self.pending = None;
        self.set_navigation(NavigationState::Idle);
        self.mount(target, None);
      }
    }
  }

  /// Hand a form submission to the current route's action.
  fn submit(&mut self, submission: Submission) {
    let seq = self.next_seq();
    self.pending = Some(seq);
    self.set_navigation(NavigationState::Submitting);

    let ctx = self.ctx.clone();
    let tx = self.event_tx.clone();
    let route = self.route.clone();
    tokio::spawn(async move {
      let result = action::run_action(&ctx, &route, submission).await;
      let _ = tx.send(AppEvent::Navigation(NavigationEvent::Submitted {
        seq,
        route,
        result,
      }));
    });
  }

  fn handle_navigation(&mut self, event: NavigationEvent) {
    let (seq, route) = match &event {
      NavigationEvent::Loaded { seq, route, .. } | NavigationEvent::Submitted { seq, route, .. } => {
        (*seq, route)
      }
    };
    if self.pending != Some(seq) {
      debug!(seq, route = %route, "Dropping result of abandoned navigation");
      return;
    }
    self.pending = None;
    self.set_navigation(NavigationState::Idle);

    match event {
      NavigationEvent::Loaded { route, result, .. } => self.mount(route, Some(result)),
      NavigationEvent::Submitted { route, result, .. } => match result {
        Ok(redirect) => self.navigate(redirect.to),
        Err(e) => {
          warn!(route = %route, status = ?e.status(), error = %e, "Action failed");
          if let Some(view) = self.views.last_mut() {
            view.action_failed(&e);
          }
          self.status = Some(StatusMessage {
            text: e.to_string(),
            is_error: true,
          });
        }
      },
    }
  }

  /// Replace the view stack with the chain of `target`, keeping views whose
  /// route is unchanged.
  fn mount(&mut self, target: Route, mut loaded: Option<Result<Event, ApiError>>) {
    let chain = target.chain();
    let keep = self
      .views
      .iter()
      .zip(&chain)
      .take_while(|(view, route)| view.route() == **route)
      .count();
    self.views.truncate(keep);

    for route in chain.into_iter().skip(keep) {
      let view = self.build_view(route, &mut loaded);
      self.views.push(view);
    }

    let navigation = self.navigation;
    for view in &mut self.views {
      view.set_navigation(navigation);
    }
    self.route = target;
  }

  fn build_view(&self, route: Route, loaded: &mut Option<Result<Event, ApiError>>) -> Box<dyn View> {
    let ctx = self.ctx.clone();
    match route {
      Route::Events => Box::new(EventListView::new(ctx)),
      Route::NewEvent => Box::new(NewEventView::new()),
      Route::EventDetails { id } => Box::new(EventDetailsView::new(ctx, id)),
      Route::EditEvent { id } => Box::new(EditEventView::new(ctx, id, loaded.take())),
    }
  }

  // Accessors for the UI

  pub fn title(&self) -> Option<&str> {
    self.config.title.as_deref()
  }

  pub fn api_url(&self) -> &str {
    self.ctx.api.base_url()
  }

  pub fn route(&self) -> &Route {
    &self.route
  }

  pub fn navigation(&self) -> NavigationState {
    self.navigation
  }

  pub fn status(&self) -> Option<&StatusMessage> {
    self.status.as_ref()
  }

  pub fn command(&self) -> &CommandInput {
    &self.command
  }

  pub fn views_mut(&mut self) -> &mut [Box<dyn View>] {
    &mut self.views
  }

  pub fn breadcrumb(&self) -> Vec<String> {
    self.views.iter().map(|v| v.breadcrumb_label()).collect()
  }

  pub fn shortcuts(&self) -> Vec<ShortcutInfo> {
    if self.command.is_active() {
      return vec![
        ShortcutInfo::new("enter", "run").with_priority(10),
        ShortcutInfo::new("tab", "next").with_priority(20),
        ShortcutInfo::new("esc", "cancel").with_priority(30),
      ];
    }
    self.views.last().map(|v| v.shortcuts()).unwrap_or_default()
  }
}
