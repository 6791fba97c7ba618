pub mod error_block;
pub mod footer;
pub mod header;
pub mod modal;
pub mod utils;

pub use error_block::{draw_error_block, key_hint};
pub use footer::{draw_footer, StatusMessage};
pub use header::draw_header;
pub use modal::{centered_fixed, centered_rect, draw_modal};
pub use utils::truncate;
