mod edit_event;
mod event_details;
mod event_list;
mod new_event;

pub use edit_event::EditEventView;
pub use event_details::EventDetailsView;
pub use event_list::EventListView;
pub use new_event::NewEventView;
