//! Route registry: conflict-checked, priority-ordered route list.
//!
//! Pages are inserted into a segment trie. Flattening emits, at every node,
//! the page itself first, then literal children in lexicographic order, then
//! the dynamic child last. Static routes therefore always win over dynamic
//! ones at the same depth.

use std::collections::BTreeMap;

use thiserror::Error;

use super::pattern::param_name;

/// Dynamic segment naming violation. Fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteConflict {
    #[error(
        "cannot use different slug names for the same dynamic path (`{existing}` vs `{found}` in `{route}`)"
    )]
    DifferentSlugNames {
        route: String,
        existing: String,
        found: String,
    },

    #[error("cannot have the same slug name `{slug}` repeat within a single dynamic path (`{route}`)")]
    RepeatedSlug { route: String, slug: String },
}

/// Trie node keyed by URL segment.
#[derive(Debug, Default)]
struct UrlNode {
    /// A real page ends here (not just an intermediate segment)
    is_page: bool,
    /// Literal children, kept sorted
    children: BTreeMap<String, UrlNode>,
    /// The single dynamic child and its parameter name
    dynamic: Option<(String, Box<UrlNode>)>,
}

impl UrlNode {
    fn insert(&mut self, route: &str) -> Result<(), RouteConflict> {
        let segments: Vec<&str> = route.split('/').filter(|s| !s.is_empty()).collect();
        let mut slugs = Vec::new();
        self.insert_segments(route, &segments, &mut slugs)
    }

    fn insert_segments<'a>(
        &mut self,
        route: &str,
        segments: &[&'a str],
        slugs: &mut Vec<&'a str>,
    ) -> Result<(), RouteConflict> {
        let Some((&segment, rest)) = segments.split_first() else {
            self.is_page = true;
            return Ok(());
        };

        let Some(slug) = param_name(segment) else {
            return self
                .children
                .entry(segment.to_string())
                .or_default()
                .insert_segments(route, rest, slugs);
        };

        if let Some((existing, _)) = &self.dynamic
            && existing != slug
        {
            return Err(RouteConflict::DifferentSlugNames {
                route: route.to_string(),
                existing: existing.clone(),
                found: slug.to_string(),
            });
        }

        if slugs.contains(&slug) {
            return Err(RouteConflict::RepeatedSlug {
                route: route.to_string(),
                slug: slug.to_string(),
            });
        }
        slugs.push(slug);

        let (_, child) = self
            .dynamic
            .get_or_insert_with(|| (slug.to_string(), Box::default()));
        child.insert_segments(route, rest, slugs)
    }

    fn flatten(&self, prefix: &str, out: &mut Vec<String>) {
        if self.is_page {
            out.push(if prefix.is_empty() {
                "/".to_string()
            } else {
                prefix.to_string()
            });
        }

        for (segment, child) in &self.children {
            child.flatten(&format!("{prefix}/{segment}"), out);
        }

        if let Some((slug, child)) = &self.dynamic {
            child.flatten(&format!("{prefix}/[{slug}]"), out);
        }
    }
}

/// Sort page paths into resolution priority order.
///
/// Fails on the first [`RouteConflict`].
pub fn sorted_routes<I, S>(pages: I) -> Result<Vec<String>, RouteConflict>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut root = UrlNode::default();
    for page in pages {
        root.insert(page.as_ref())?;
    }

    let mut out = Vec::new();
    root.flatten("", &mut out);
    Ok(out)
}

// ============================================================================
// Tests
// ============================================================================
