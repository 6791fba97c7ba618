use crate::api::error::ApiError;
use crate::api::types::{Event, EventFields};
use crate::config::ApiConfig;
use color_eyre::{eyre::eyre, Result};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use url::Url;

/// Single event body, bare or wrapped in `{"event": ...}`
#[derive(Deserialize)]
#[serde(untagged)]
enum EventBody {
  Wrapped { event: Event },
  Bare(Event),
}

impl EventBody {
  fn into_event(self) -> Event {
    match self {
      EventBody::Wrapped { event } | EventBody::Bare(event) => event,
    }
  }
}

/// Event list body, bare or wrapped in `{"events": [...]}`
#[derive(Deserialize)]
#[serde(untagged)]
enum EventsBody {
  Wrapped { events: Vec<Event> },
  Bare(Vec<Event>),
}

impl EventsBody {
  fn into_events(self) -> Vec<Event> {
    match self {
      EventsBody::Wrapped { events } | EventsBody::Bare(events) => events,
    }
  }
}

#[derive(Serialize)]
struct EventEnvelope<'a> {
  event: &'a EventFields,
}

#[derive(Deserialize)]
struct ErrorBody {
  message: Option<String>,
}

/// REST client for the events backend
#[derive(Clone, Debug)]
pub struct EventsClient {
  http: reqwest::Client,
  base_url: Url,
  envelope: bool,
}

impl EventsClient {
  pub fn new(config: &ApiConfig) -> Result<Self> {
    let mut base_url =
      Url::parse(&config.url).map_err(|e| eyre!("Invalid API URL {}: {}", config.url, e))?;
    // Joining relative paths replaces the last segment unless the path ends in '/'
    if !base_url.path().ends_with('/') {
      let path = format!("{}/", base_url.path());
      base_url.set_path(&path);
    }

    let http = reqwest::Client::builder()
      .timeout(config.timeout())
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url,
      envelope: config.envelope,
    })
  }

  /// Base URL without the trailing slash, for display
  pub fn base_url(&self) -> &str {
    self.base_url.as_str().trim_end_matches('/')
  }

  /// Public URL of an event image
  pub fn image_url(&self, image: &str) -> String {
    format!("{}/{}", self.base_url(), image.trim_start_matches('/'))
  }

  /// GET /events, optionally filtered by a search term
  #[instrument(skip(self, token), level = "info")]
  pub async fn list_events(
    &self,
    search: Option<&str>,
    token: CancellationToken,
  ) -> Result<Vec<Event>, ApiError> {
    let mut url = self.url("events")?;
    if let Some(term) = search.filter(|s| !s.is_empty()) {
      url.query_pairs_mut().append_pair("search", term);
    }

    let request = self.http.get(url);
    let body: EventsBody = cancellable(&token, self.send_json(request)).await?;
    let events = body.into_events();
    debug!(count = events.len(), "Listed events");
    Ok(events)
  }

  /// GET /events/:id
  #[instrument(skip(self, token), level = "info")]
  pub async fn fetch_event(&self, id: &str, token: CancellationToken) -> Result<Event, ApiError> {
    let request = self.http.get(self.event_url(id)?);
    let body: EventBody = cancellable(&token, self.send_json(request)).await?;
    Ok(body.into_event())
  }

  /// POST /events; returns the event with its server-assigned id
  #[instrument(skip(self, fields), level = "info")]
  pub async fn create_event(&self, fields: &EventFields) -> Result<Event, ApiError> {
    let request = self.with_body(self.http.request(Method::POST, self.url("events")?), fields);
    let body: EventBody = self.send_json(request).await?;
    Ok(body.into_event())
  }

  /// PUT /events/:id
  #[instrument(skip(self, fields), level = "info")]
  pub async fn update_event(&self, id: &str, fields: &EventFields) -> Result<(), ApiError> {
    let request = self.with_body(self.http.request(Method::PUT, self.event_url(id)?), fields);
    self.send(request).await?;
    Ok(())
  }

  /// DELETE /events/:id
  #[instrument(skip(self), level = "info")]
  pub async fn delete_event(&self, id: &str) -> Result<(), ApiError> {
    let request = self.http.delete(self.event_url(id)?);
    self.send(request).await?;
    Ok(())
  }

  fn url(&self, path: &str) -> Result<Url, ApiError> {
    Ok(self.base_url.join(path)?)
  }

  fn event_url(&self, id: &str) -> Result<Url, ApiError> {
    let mut url = self.url("events/")?;
    url
      .path_segments_mut()
      .map_err(|_| ApiError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
      .pop_if_empty()
      .push(id);
    Ok(url)
  }

  fn with_body(&self, request: RequestBuilder, fields: &EventFields) -> RequestBuilder {
    if self.envelope {
      request.json(&EventEnvelope { event: fields })
    } else {
      request.json(fields)
    }
  }

  async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
      .ok()
      .and_then(|body| body.message);
    warn!(status = status.as_u16(), ?message, "Request failed");
    Err(ApiError::Status {
      status: status.as_u16(),
      message,
    })
  }

  async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
    let response = self.send(request).await?;
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
  }
}

/// Run `fut` until it completes or `token` is cancelled
async fn cancellable<T, F>(token: &CancellationToken, fut: F) -> Result<T, ApiError>
where
  F: Future<Output = Result<T, ApiError>>,
{
  tokio::select! {
    _ = token.cancelled() => Err(ApiError::Cancelled),
    result = fut => result,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;
  use wiremock::matchers::{body_json, method, path, query_param};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn client_for(server: &MockServer, envelope: bool) -> EventsClient {
    EventsClient::new(&ApiConfig {
      url: server.uri(),
      envelope,
      ..ApiConfig::default()
    })
    .unwrap()
  }

  fn fields(title: &str) -> EventFields {
    EventFields {
      title: title.to_string(),
      description: "Monthly meetup".to_string(),
      date: "2026-10-19".to_string(),
      time: "18:30".to_string(),
      location: "Main hall".to_string(),
      image: "meetup.jpg".to_string(),
    }
  }

  #[tokio::test]
  async fn test_fetch_event_enveloped() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
      .and(path("/events/42"))
      .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "event": { "id": "42", "title": "Old", "date": "2026-10-19" }
      })))
      .expect(1)
      .mount(&mock_server)
      .await;

    let client = client_for(&mock_server, true);
    let event = client
      .fetch_event("42", CancellationToken::new())
      .await
      .unwrap();
    assert_eq!(event.id, "42");
    assert_eq!(event.title, "Old");
  }

  #[tokio::test]
  async fn test_fetch_event_bare() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
      .and(path("/events/7"))
      .respond_with(
        ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "7", "title": "Bare" })),
      )
      .mount(&mock_server)
      .await;

    let event = client_for(&mock_server, false)
      .fetch_event("7", CancellationToken::new())
      .await
      .unwrap();
    assert_eq!(event.title, "Bare");
  }

  #[tokio::test]
  async fn test_not_found_carries_server_message() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
      .and(path("/events/99"))
      .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
        "message": "Could not find event for id 99"
      })))
      .mount(&mock_server)
      .await;

    let err = client_for(&mock_server, true)
      .fetch_event("99", CancellationToken::new())
      .await
      .unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert_eq!(err.server_message(), Some("Could not find event for id 99"));
  }

  #[tokio::test]
  async fn test_error_without_json_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
      .and(path("/events/42"))
      .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
      .mount(&mock_server)
      .await;

    let err = client_for(&mock_server, true)
      .delete_event("42")
      .await
      .unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert_eq!(err.server_message(), None);
  }

  #[tokio::test]
  async fn test_list_events_with_search() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
      .and(path("/events"))
      .and(query_param("search", "meetup"))
      .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "events": [
          { "id": "1", "title": "Rust meetup" },
          { "id": "2", "title": "Go meetup" }
        ]
      })))
      .expect(1)
      .mount(&mock_server)
      .await;

    let events = client_for(&mock_server, true)
      .list_events(Some("meetup"), CancellationToken::new())
      .await
      .unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].id, "2");
  }

  #[tokio::test]
  async fn test_update_event_sends_envelope() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
      .and(path("/events/42"))
      .and(body_json(serde_json::json!({ "event": fields("New") })))
      .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
      .expect(1)
      .mount(&mock_server)
      .await;

    client_for(&mock_server, true)
      .update_event("42", &fields("New"))
      .await
      .unwrap();
  }

  #[tokio::test]
  async fn test_create_event_bare_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
      .and(path("/events"))
      .and(body_json(serde_json::json!(fields("Launch"))))
      .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
        "event": { "id": "100", "title": "Launch" }
      })))
      .expect(1)
      .mount(&mock_server)
      .await;

    let created = client_for(&mock_server, false)
      .create_event(&fields("Launch"))
      .await
      .unwrap();
    assert_eq!(created.id, "100");
  }

  #[tokio::test]
  async fn test_cancelled_read() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
      .and(path("/events/42"))
      .respond_with(
        ResponseTemplate::new(200)
          .set_body_json(serde_json::json!({ "id": "42" }))
          .set_delay(Duration::from_secs(5)),
      )
      .mount(&mock_server)
      .await;

    let client = client_for(&mock_server, true);
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(20)).await;
      cancel.cancel();
    });

    let err = client.fetch_event("42", token).await.unwrap_err();
    assert!(err.is_cancelled());
  }

  #[test]
  fn test_base_url_with_path_prefix() {
    let client = EventsClient::new(&ApiConfig {
      url: "http://localhost:3000/api".to_string(),
      ..ApiConfig::default()
    })
    .unwrap();
    assert_eq!(client.base_url(), "http://localhost:3000/api");
    assert_eq!(
      client.event_url("42").unwrap().as_str(),
      "http://localhost:3000/api/events/42"
    );
    assert_eq!(
      client.image_url("meetup.jpg"),
      "http://localhost:3000/api/meetup.jpg"
    );
  }
}
