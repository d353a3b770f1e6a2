//! Core types - pure abstractions shared across the codebase.

mod path;
mod state;

pub use path::{
    ERROR_PAGE, PagePath, decode_request_path, normalize_page_path, request_path,
};
pub use state::{is_shutdown, register_server, setup_shutdown_handler};
