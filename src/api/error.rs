//! Errors returned by the events API client.

use crate::cache::FetchError;
use std::sync::Arc;
use thiserror::Error;

/// Cloneable so that every observer of a shared read gets the same failure.
#[derive(Error, Debug, Clone)]
pub enum ApiError {
  /// Non-success HTTP status, with the `message` of the JSON error body if any
  #[error("request failed with status {status}{}", message.as_deref().map(|m| format!(": {}", m)).unwrap_or_default())]
  Status { status: u16, message: Option<String> },

  #[error("network error: {0}")]
  Network(#[source] Arc<reqwest::Error>),

  #[error("invalid response body: {0}")]
  Decode(#[source] Arc<serde_json::Error>),

  #[error("invalid URL: {0}")]
  Url(#[from] url::ParseError),

  #[error("request was cancelled")]
  Cancelled,
}

impl ApiError {
  /// HTTP status, when the server answered.
  pub fn status(&self) -> Option<u16> {
    match self {
      Self::Status { status, .. } => Some(*status),
      Self::Network(e) => e.status().map(|s| s.as_u16()),
      _ => None,
    }
  }

  /// Message supplied by the server, if any.
  pub fn server_message(&self) -> Option<&str> {
    match self {
      Self::Status { message, .. } => message.as_deref(),
      _ => None,
    }
  }

  /// Server message for display, or `fallback` when the server gave none.
  pub fn user_message(&self, fallback: &str) -> String {
    self
      .server_message()
      .filter(|m| !m.trim().is_empty())
      .unwrap_or(fallback)
      .to_string()
  }

  pub fn is_cancelled(&self) -> bool {
    matches!(self, Self::Cancelled)
  }
}

impl From<reqwest::Error> for ApiError {
  fn from(err: reqwest::Error) -> Self {
    Self::Network(Arc::new(err))
  }
}

impl From<serde_json::Error> for ApiError {
  fn from(err: serde_json::Error) -> Self {
    Self::Decode(Arc::new(err))
  }
}

impl From<FetchError<ApiError>> for ApiError {
  fn from(err: FetchError<ApiError>) -> Self {
    match err {
      FetchError::Cancelled => ApiError::Cancelled,
      FetchError::Failed(e) => e,
    }
  }
}
