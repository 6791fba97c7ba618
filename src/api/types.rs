use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

/// An event as served by the backend. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
  #[serde(deserialize_with = "string_or_number")]
  pub id: String,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub date: String,
  #[serde(default)]
  pub time: String,
  #[serde(default)]
  pub location: String,
  #[serde(default)]
  pub image: String,
}

impl Event {
  /// The event with `fields` applied, keeping its identity.
  pub fn with_fields(id: impl Into<String>, fields: EventFields) -> Self {
    Self {
      id: id.into(),
      title: fields.title,
      description: fields.description,
      date: fields.date,
      time: fields.time,
      location: fields.location,
      image: fields.image,
    }
  }

  /// The editable part of the event.
  pub fn fields(&self) -> EventFields {
    EventFields {
      title: self.title.clone(),
      description: self.description.clone(),
      date: self.date.clone(),
      time: self.time.clone(),
      location: self.location.clone(),
      image: self.image.clone(),
    }
  }

  /// Date as "Oct 19, 2026"; the raw value if it is not an ISO date.
  pub fn display_date(&self) -> String {
    let raw = self.date.get(..10).unwrap_or(&self.date);
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
      .map(|d| d.format("%b %-d, %Y").to_string())
      .unwrap_or_else(|_| self.date.clone())
  }
}

/// Backends differ on whether ids are strings or numbers
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Id {
    Text(String),
    Number(u64),
  }

  Ok(match Id::deserialize(deserializer)? {
    Id::Text(s) => s,
    Id::Number(n) => n.to_string(),
  })
}

/// The submitted field set of the event form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFields {
  pub title: String,
  pub description: String,
  pub date: String,
  pub time: String,
  pub location: String,
  pub image: String,
}

impl EventFields {
  /// Field names in form order.
  pub const NAMES: [&'static str; 6] = ["title", "description", "date", "time", "location", "image"];

  pub fn get(&self, name: &str) -> Option<&str> {
    match name {
      "title" => Some(&self.title),
      "description" => Some(&self.description),
      "date" => Some(&self.date),
      "time" => Some(&self.time),
      "location" => Some(&self.location),
      "image" => Some(&self.image),
      _ => None,
    }
  }

  pub fn set(&mut self, name: &str, value: String) {
    match name {
      "title" => self.title = value,
      "description" => self.description = value,
      "date" => self.date = value,
      "time" => self.time = value,
      "location" => self.location = value,
      "image" => self.image = value,
      _ => {}
    }
  }

  /// First required field that is blank. `image` is optional.
  pub fn missing_field(&self) -> Option<&'static str> {
    Self::NAMES
      .iter()
      .copied()
      .filter(|name| *name != "image")
      .find(|name| self.get(name).map(|v| v.trim().is_empty()).unwrap_or(true))
  }
}
