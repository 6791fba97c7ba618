pub mod client;
pub mod error;
pub mod keys;
pub mod types;

pub use client::EventsClient;
pub use error::ApiError;
pub use types::{Event, EventFields};
