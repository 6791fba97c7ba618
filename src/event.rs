use crate::api::{ApiError, Event};
use crate::router::{Redirect, Route};
use crossterm::event::{self, Event as CrosstermEvent, KeyEvent, KeyEventKind};
use std::time::Duration;
use tokio::sync::mpsc;

/// Application events
#[derive(Debug)]
pub enum AppEvent {
  /// Terminal key press
  Key(KeyEvent),
  /// Periodic tick for UI refresh and query polling
  Tick,
  /// A loader or action finished
  Navigation(NavigationEvent),
}

/// Outcome of router work started by the app. `seq` identifies the
/// navigation it belongs to, so results of abandoned navigations are dropped.
#[derive(Debug)]
pub enum NavigationEvent {
  Loaded {
    seq: u64,
    route: Route,
    result: Result<Event, ApiError>,
  },
  Submitted {
    seq: u64,
    route: Route,
    result: Result<Redirect, ApiError>,
  },
}

/// Event handler that produces events from terminal input and a tick timer
pub struct EventHandler {
  tx: mpsc::UnboundedSender<AppEvent>,
  rx: mpsc::UnboundedReceiver<AppEvent>,
}

impl EventHandler {
  /// Create a new event handler with the given tick rate
  pub fn new(tick_rate: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    // Spawn terminal event reader
    let input_tx = tx.clone();
    tokio::task::spawn_blocking(move || loop {
      let sent = if event::poll(tick_rate).unwrap_or(false) {
        match event::read() {
          Ok(CrosstermEvent::Key(key)) if key.kind == KeyEventKind::Press => {
            input_tx.send(AppEvent::Key(key))
          }
          Ok(_) | Err(_) => Ok(()),
        }
      } else {
        input_tx.send(AppEvent::Tick)
      };
      if sent.is_err() {
        break;
      }
    });

    Self { tx, rx }
  }

  /// Sender for background tasks reporting back to the event loop
  pub fn sender(&self) -> mpsc::UnboundedSender<AppEvent> {
    self.tx.clone()
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<AppEvent> {
    self.rx.recv().await
  }
}
