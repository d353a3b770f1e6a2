use thiserror::Error;

use crate::core::PagePath;

/// Why `ensure_page` could not produce a page.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PageError {
    /// No source file resolves for the requested page
    #[error("page not found: {0}")]
    NotFound(String),

    /// The scheduler shut down while the page was waiting for a build
    #[error("scheduler stopped before `{0}` was built")]
    Stopped(PagePath),
}
