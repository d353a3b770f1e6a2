//! Apply a compiled pattern to a concrete URL path.

use std::collections::BTreeMap;

use percent_encoding::percent_decode_str;
use thiserror::Error;

use super::pattern::CompiledPattern;

/// Decoded route parameters, ordered by name.
pub type RouteParams = BTreeMap<String, String>;

/// A matched segment could not be percent-decoded.
///
/// Distinct from "no match": the URL addressed a route but carries a
/// malformed parameter, which is a client error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    #[error("failed to decode parameter `{name}`: {value:?}")]
    DecodeFailed { name: String, value: String },
}

/// Match `path` against `pattern`.
///
/// `Ok(None)` means the pattern does not apply.
pub fn match_route(
    pattern: &CompiledPattern,
    path: &str,
) -> Result<Option<RouteParams>, MatchError> {
    match_route_with(pattern, path, RouteParams::new())
}

/// Match with a pre-seeded parameter map. Captured values overwrite seeds.
pub fn match_route_with(
    pattern: &CompiledPattern,
    path: &str,
    mut params: RouteParams,
) -> Result<Option<RouteParams>, MatchError> {
    let Some(captures) = pattern.regex().captures(path) else {
        return Ok(None);
    };

    for (name, &index) in pattern.groups() {
        let Some(matched) = captures.get(index) else {
            continue;
        };
        if matched.is_empty() {
            continue;
        }

        let value = decode_component(matched.as_str()).ok_or_else(|| MatchError::DecodeFailed {
            name: name.clone(),
            value: matched.as_str().to_string(),
        })?;
        params.insert(name.clone(), value);
    }

    Ok(Some(params))
}

/// Strict percent-decoding: every `%` must start a valid escape and the
/// result must be UTF-8.
fn decode_component(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let escape = bytes.get(i + 1..i + 3)?;
            if !escape.iter().all(u8::is_ascii_hexdigit) {
                return None;
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    percent_decode_str(raw)
        .decode_utf8()
        .ok()
        .map(|s| s.into_owned())
}

// ============================================================================
// Tests
// ============================================================================
