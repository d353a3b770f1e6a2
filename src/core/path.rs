//! Page path type for type-safe page identity.
//!
//! - Canonical form: slash-separated, root is `/`, no trailing `/index`
//! - Lookup form: root is `/index`, used to look up files in the pages directory

use std::borrow::Borrow;
use std::path::{Component, Path};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Reserved page that always answers liveness pings with `invalid`.
pub const ERROR_PAGE: &str = "/_error";

/// Canonical page identifier.
///
/// Invariants:
/// - Always starts with `/`
/// - Root page is exactly `/`
/// - Never ends with `/index`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PagePath(Arc<str>);

impl PagePath {
    /// Normalize any page spelling into its canonical form.
    ///
    /// Backslashes become `/`, `/` and `/index` map to the root,
    /// a trailing `/index` collapses to its parent.
    pub fn new(raw: &str) -> Self {
        let unix = raw.replace('\\', "/");
        if unix.is_empty() || unix == "/" || unix == "/index" {
            return Self::root();
        }

        let collapsed = unix.strip_suffix("/index").unwrap_or(&unix);
        if collapsed.starts_with('/') {
            Self(Arc::from(collapsed))
        } else {
            Self(Arc::from(format!("/{collapsed}")))
        }
    }

    pub fn root() -> Self {
        Self(Arc::from("/"))
    }

    /// Derive the page served by a source file.
    ///
    /// `relative` is relative to the pages directory. Returns `None` when the
    /// file's extension is not one of `extensions`.
    pub fn from_source_file(relative: &Path, extensions: &[String]) -> Option<Self> {
        let ext = relative.extension()?.to_str()?;
        if !extensions.iter().any(|e| e == ext) {
            return None;
        }

        let stem = relative.with_extension("");
        let mut page = String::new();
        for component in stem.components() {
            match component {
                Component::Normal(part) => {
                    page.push('/');
                    page.push_str(part.to_str()?);
                }
                Component::CurDir => {}
                _ => return None,
            }
        }

        Some(Self::new(&page))
    }

    /// Artifact name relative to the compiler output directory.
    ///
    /// `/` -> `pages/index.<ext>`, `/blog/post` -> `pages/blog/post.<ext>`
    pub fn bundle_name(&self, ext: &str) -> String {
        if self.is_root() {
            format!("pages/index.{ext}")
        } else {
            format!("pages{}.{ext}", self.0)
        }
    }

    /// Lookup form used to look up files in the pages directory (`/` becomes `/index`).
    pub fn lookup_form(&self) -> String {
        if self.is_root() {
            "/index".to_string()
        } else {
            self.0.to_string()
        }
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.0.as_ref() == "/"
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Convert a requested page into its lookup form.
///
/// `/` becomes `/index` and a missing leading slash is added. A single
/// trailing slash is ignored. Returns `None` when the request does not
/// survive POSIX normalization unchanged (`.`/`..`/empty segments).
pub fn normalize_page_path(raw: &str) -> Option<String> {
    let trimmed = if raw.len() > 1 {
        raw.strip_suffix('/').unwrap_or(raw)
    } else {
        raw
    };

    let page = match trimmed {
        "" | "/" => "/index".to_string(),
        p if p.starts_with('/') => p.to_string(),
        p => format!("/{p}"),
    };

    if page.contains('\\') {
        return None;
    }

    let valid = page[1..]
        .split('/')
        .all(|segment| !segment.is_empty() && segment != "." && segment != "..");

    valid.then_some(page)
}

/// Strip query string and fragment from a request URL.
pub fn request_path(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}

/// Decode a request URL path for direct page lookup.
///
/// Malformed percent-encoding is kept verbatim; such a path simply won't
/// name a page on disk.
pub fn decode_request_path(url: &str) -> String {
    use percent_encoding::percent_decode_str;

    let path = request_path(url);
    percent_decode_str(path)
        .decode_utf8()
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| path.to_string())
}

impl std::fmt::Display for PagePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for PagePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for PagePath {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PagePath {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl PartialEq<&str> for PagePath {
    fn eq(&self, other: &&str) -> bool {
        self.0.as_ref() == *other
    }
}

impl Serialize for PagePath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PagePath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::new(&s))
    }
}
