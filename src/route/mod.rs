//! Route resolution for pages with dynamic segments.
//!
//! ```text
//! route/
//! ├── pattern   # `/post/[id]` -> anchored regex + group map
//! ├── matcher   # regex + url path -> decoded params
//! └── sorted    # trie, conflict checks, priority order
//! ```
//!
//! [`RouteIndex`] ties them together: the sorted page list, each page with its
//! compiled pattern, used as the fallback chain when a URL doesn't name a page
//! file directly.

mod matcher;
mod pattern;
mod sorted;

pub use matcher::{MatchError, RouteParams};
pub use pattern::CompiledPattern;
pub use sorted::RouteConflict;

use matcher::match_route;
use pattern::compile_pattern;
use sorted::sorted_routes;

use thiserror::Error;

use crate::core::{PagePath, request_path};

/// Errors building a [`RouteIndex`].
#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    Conflict(#[from] RouteConflict),

    #[error("invalid route pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// A page and its compiled pattern.
#[derive(Debug, Clone)]
pub struct Route {
    pub page: PagePath,
    pub pattern: CompiledPattern,
}

/// A URL resolved through the route list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub page: PagePath,
    pub params: RouteParams,
}

/// Sorted, immutable route list. Rebuilt when pages are added or removed.
#[derive(Debug, Clone, Default)]
pub struct RouteIndex {
    routes: Vec<Route>,
}

impl RouteIndex {
    /// Build from every known page. Fails on naming conflicts.
    pub fn build<I, S>(pages: I) -> Result<Self, RouteError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let routes = sorted_routes(pages)?
            .into_iter()
            .map(|page| -> Result<Route, regex::Error> {
                let pattern = compile_pattern(&page)?;
                Ok(Route {
                    page: PagePath::new(&page),
                    pattern,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { routes })
    }

    /// All routes in priority order.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Routes with at least one dynamic segment, in priority order.
    pub fn dynamic_routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter().filter(|r| r.pattern.is_dynamic())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Resolve a request URL to the first matching route.
    ///
    /// The URL is matched still percent-encoded so parameter decoding can
    /// fail loudly. A decode failure stops the walk.
    pub fn resolve(&self, url: &str) -> Result<Option<Resolved>, MatchError> {
        let path = request_path(url);
        for route in &self.routes {
            if let Some(params) = match_route(&route.pattern, path)? {
                return Ok(Some(Resolved {
                    page: route.page.clone(),
                    params,
                }));
            }
        }
        Ok(None)
    }
}

// ============================================================================
// Tests
// ============================================================================
