use serde::Deserialize;
use std::cmp::Ordering;
use std::fmt;

/// Sentinel for "nothing installed yet"
pub const DEFAULT_VERSION: &str = "0.0.0";

/// Dot-separated version as published in a `version.json` descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "String")]
pub struct VersionString(String);

impl VersionString {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Self::default()
        } else {
            Self(trimmed.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the "not installed" sentinel, including spellings like `0` or `0.0`
    pub fn is_default(&self) -> bool {
        components(&self.0).all(|c| leading_number(c) == Some(0))
    }

    pub fn is_newer_than(&self, other: &VersionString) -> bool {
        is_newer_version(&self.0, &other.0)
    }
}

impl Default for VersionString {
    fn default() -> Self {
        Self(DEFAULT_VERSION.to_string())
    }
}

impl From<String> for VersionString {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<&str> for VersionString {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl fmt::Display for VersionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compare two versions component by component.
///
/// Missing trailing components count as `0`. Each component compares by its leading
/// digits (`3b` counts as `3`) when both sides have them; components without leading
/// digits on both sides compare as strings; a component with leading digits on only one
/// side does not decide the ordering.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left: Vec<&str> = components(a).collect();
    let right: Vec<&str> = components(b).collect();
    let len = left.len().max(right.len());

    for i in 0..len {
        let l = left.get(i).copied().unwrap_or("0");
        let r = right.get(i).copied().unwrap_or("0");

        let ordering = match (leading_number(l), leading_number(r)) {
            (Some(l), Some(r)) => l.cmp(&r),
            (None, None) => l.cmp(r),
            _ => Ordering::Equal,
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

/// True only when `candidate` is strictly greater than `current`
pub fn is_newer_version(candidate: &str, current: &str) -> bool {
    compare_versions(candidate, current) == Ordering::Greater
}

fn components(version: &str) -> impl Iterator<Item = &str> {
    version
        .trim()
        .trim_start_matches('v')
        .split('.')
        .map(str::trim)
}

/// Value of the digits a component starts with, `None` when it starts with something else
fn leading_number(component: &str) -> Option<u64> {
    let end = component
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(component.len());
    component[..end].parse().ok()
}

/// The installed version and the one an update is heading towards
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionStore {
    current: VersionString,
    pending: VersionString,
}

impl VersionStore {
    pub fn new(current: VersionString) -> Self {
        Self {
            pending: current.clone(),
            current,
        }
    }

    pub fn current(&self) -> &VersionString {
        &self.current
    }

    pub fn pending(&self) -> &VersionString {
        &self.pending
    }

    pub(crate) fn set_pending(&mut self, version: VersionString) {
        self.pending = version;
    }

    /// Promote the pending version after a successful install
    pub(crate) fn commit(&mut self) {
        self.current = self.pending.clone();
    }
}
