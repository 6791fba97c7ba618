mod command_input;
mod event_form;
mod event_search;
mod input;
mod key_result;

pub use command_input::{CommandEvent, CommandInput};
pub use event_form::{form_buttons, EventForm, FormEvent};
pub use event_search::EventSearch;
pub use key_result::KeyResult;
