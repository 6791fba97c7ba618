//! One-shot async writes polled from the UI tick, the counterpart of `Query`.

use std::future::Future;
use tokio::sync::mpsc;

/// The state of a mutation
#[derive(Debug, Clone)]
pub enum MutationState<R, E> {
  Idle,
  Pending,
  Success(R),
  Error(E),
}

/// A write started from the UI whose outcome is picked up by `poll()`.
#[derive(Debug)]
pub struct Mutation<R, E> {
  state: MutationState<R, E>,
  receiver: Option<mpsc::UnboundedReceiver<Result<R, E>>>,
}

impl<R, E> Default for Mutation<R, E> {
  fn default() -> Self {
    Self {
      state: MutationState::Idle,
      receiver: None,
    }
  }
}

impl<R: Send + 'static, E: Send + 'static> Mutation<R, E> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_pending(&self) -> bool {
    matches!(self.state, MutationState::Pending)
  }

  /// Run `future` in the background. Ignored while another run is pending.
  pub fn mutate<Fut>(&mut self, future: Fut)
  where
    Fut: Future<Output = Result<R, E>> + Send + 'static,
  {
    if self.is_pending() {
      return;
    }

    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);
    self.state = MutationState::Pending;

    tokio::spawn(async move {
      let _ = tx.send(future.await);
    });
  }

  /// Poll for the outcome. Returns the finished result once, when it arrives.
  pub fn poll(&mut self) -> Option<&MutationState<R, E>> {
    let receiver = self.receiver.as_mut()?;
    match receiver.try_recv() {
      Ok(Ok(value)) => self.state = MutationState::Success(value),
      Ok(Err(error)) => self.state = MutationState::Error(error),
      Err(mpsc::error::TryRecvError::Empty) => return None,
      // Task dropped without sending; nothing to report
      Err(mpsc::error::TryRecvError::Disconnected) => self.state = MutationState::Idle,
    }
    self.receiver = None;
    Some(&self.state)
  }

  /// Forget the last outcome.
  pub fn reset(&mut self) {
    self.receiver = None;
    self.state = MutationState::Idle;
  }
}
