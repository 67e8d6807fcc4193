//! Remote prefix handling
//!
//! A [`RemotePrefix`] is the key namespace of one published repository inside
//! a bucket. An empty prefix means keys live at the bucket root; otherwise the
//! prefix is a literal path segment joined with a single `/`. Matching is
//! always done against `<prefix>/`, so `foo` never touches `foobar/...`.

use std::fmt;

use crate::repo::REPODATA_DIR;

const SEPARATOR: char = '/';

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RemotePrefix {
    /// Normalised prefix without leading/trailing separators ("" = bucket root)
    value: String,
}

impl RemotePrefix {
    /// Normalise a user-supplied prefix. Leading/trailing and doubled
    /// separators are dropped, so `"/el9//x86_64/"` becomes `"el9/x86_64"`.
    pub fn new(raw: &str) -> Self {
        let value = raw
            .split(SEPARATOR)
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        Self { value }
    }

    pub fn root() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn is_root(&self) -> bool {
        self.value.is_empty()
    }

    /// The listing prefix for the whole repository: `""` or `"<prefix>/"`.
    pub fn scope(&self) -> String {
        if self.is_root() {
            String::new()
        } else {
            format!("{}{}", self.value, SEPARATOR)
        }
    }

    /// The listing prefix for the catalog: `"repodata/"` or `"<prefix>/repodata/"`.
    pub fn repodata_scope(&self) -> String {
        format!("{}{}{}", self.scope(), REPODATA_DIR, SEPARATOR)
    }

    /// Build the object key for a path relative to the repository root.
    pub fn key_for(&self, relative: &str) -> String {
        let relative = relative.trim_start_matches(SEPARATOR);
        format!("{}{}", self.scope(), relative)
    }

    /// Whether `key` belongs to this repository.
    pub fn contains(&self, key: &str) -> bool {
        key.starts_with(&self.scope())
    }

    /// Whether `key` belongs to this repository's catalog.
    pub fn contains_repodata(&self, key: &str) -> bool {
        key.starts_with(&self.repodata_scope())
    }

    /// Strip the prefix from `key`, yielding the path relative to the
    /// repository root. Returns `None` for keys outside the prefix or keys
    /// that name the prefix itself.
    pub fn strip<'k>(&self, key: &'k str) -> Option<&'k str> {
        let rest = key.strip_prefix(self.scope().as_str())?;
        if rest.is_empty() {
            None
        } else {
            Some(rest)
        }
    }
}

impl fmt::Display for RemotePrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str("<root>")
        } else {
            f.write_str(&self.value)
        }
    }
}
