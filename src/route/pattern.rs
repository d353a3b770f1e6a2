//! Route pattern compilation.
//!
//! Turns a page path with bracketed segments (`/post/[id]`) into an anchored,
//! case-insensitive regex plus a parameter name -> capture index map.

use std::collections::BTreeMap;

use regex::Regex;

/// Capturing wildcard for one dynamic segment.
const PARAM_CAPTURE: &str = "([^/]+?)";

/// Compiled route pattern. Immutable once built.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    regex: Regex,
    /// Parameter name -> 1-based capture group index
    groups: BTreeMap<String, usize>,
}

impl CompiledPattern {
    #[inline]
    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    #[inline]
    pub fn groups(&self) -> &BTreeMap<String, usize> {
        &self.groups
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    pub fn is_dynamic(&self) -> bool {
        !self.groups.is_empty()
    }
}

/// Extract the parameter name of a whole-segment `[name]`.
///
/// Returns `None` for literal segments, including `[]` and partial
/// brackets like `a[b]`.
pub fn param_name(segment: &str) -> Option<&str> {
    segment
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .filter(|name| !name.is_empty())
}

/// Compile a page path into a [`CompiledPattern`].
///
/// Literal segments are regex-escaped, each `[name]` segment becomes a
/// non-slash wildcard. The pattern is anchored at both ends and tolerates one
/// trailing slash.
pub fn compile_pattern(route: &str) -> Result<CompiledPattern, regex::Error> {
    let route = match route.strip_suffix('/') {
        Some("") | None => route,
        Some(trimmed) => trimmed,
    };

    let mut source = String::from("(?i)^");
    let mut groups = BTreeMap::new();
    let mut index = 1;

    for (i, segment) in route.split('/').enumerate() {
        if i > 0 {
            source.push('/');
        }
        match param_name(segment) {
            Some(name) => {
                groups.insert(name.to_string(), index);
                index += 1;
                source.push_str(PARAM_CAPTURE);
            }
            None => source.push_str(&regex::escape(segment)),
        }
    }

    source.push_str("(?:/)?$");

    Ok(CompiledPattern {
        regex: Regex::new(&source)?,
        groups,
    })
}

// ============================================================================
// Tests
// ============================================================================
