//! Normalized package identities.

use core::cmp::Ordering;
use core::fmt::{Display, Formatter, Result as FmtResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Canonicalize a package name per the package index's naming rules.
///
/// Lower-cases the name and collapses runs of `-`, `_`, and `.` into a single
/// `-`, so that `Flask`, `flask` and `python-dateutil`/`python_dateutil`
/// compare equal. Total (never fails) and idempotent.
#[must_use]
pub fn canonical_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_separator_run = false;

    for c in raw.trim().chars() {
        if c == '-' || c == '_' || c == '.' {
            if !in_separator_run {
                out.push('-');
                in_separator_run = true;
            }
        } else {
            out.extend(c.to_lowercase());
            in_separator_run = false;
        }
    }

    out
}

/// An immutable (name, version) pair identifying one package at one version.
///
/// The name is stored in canonical form; the version is preserved verbatim
/// since it is displayed to the user and used for registry lookups as-is.
/// Equality, ordering, and hashing are all defined on the canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageId {
    name: Arc<str>,
    version: Arc<str>,
}

impl PackageId {
    /// Create a new identity, canonicalizing the name.
    #[must_use]
    pub fn new(name: impl AsRef<str>, version: impl AsRef<str>) -> Self {
        Self {
            name: Arc::from(canonical_name(name.as_ref()).as_str()),
            version: Arc::from(version.as_ref().trim()),
        }
    }

    /// The canonical package name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The version string, exactly as it appeared in the input.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Get a clone of the name Arc (cheap pointer clone).
    #[must_use]
    pub fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }
}

impl Display for PackageId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}=={}", self.name, self.version)
    }
}

impl PartialOrd for PackageId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PackageId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name().cmp(other.name()).then_with(|| self.version().cmp(other.version()))
    }
}
