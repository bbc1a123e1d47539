//! Source clients for the external registries queried per package.
//!
//! Each implementation targets one registry and is interchangeable behind the
//! [`Source`] capability contract. Clients are stateless and safe to call
//! concurrently; the only shared mutable state on the fetch path is the
//! per-source admission gate owned by the scheduler.
//!
//! `fetch` never returns a Rust error: every outcome — data, an explicit
//! "does not exist" response, a transport failure, exhausted retries — is
//! represented as a [`SourceRecord`] so one bad call can never abort a batch.

use crate::identity::PackageId;
use crate::metrics::MetricValue;
use async_trait::async_trait;
use core::fmt::{Display, Formatter, Result as FmtResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

mod http;
mod repo_url;

pub mod github;
pub mod pypi;

pub use github::GitHubSource;
pub use http::REQUEST_TIMEOUT;
pub use pypi::PyPiSource;
pub use repo_url::RepoRef;

/// Raw metric map produced by one source for one identity.
pub type MetricMap = BTreeMap<String, MetricValue>;

/// Why one fetch for one (identity, source) pair failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchFailure {
    pub reason: String,
    /// Whether the failure class would have been worth retrying. Retries are
    /// already exhausted by the time a `FetchFailure` escapes a client; this
    /// is kept for reporting.
    pub retryable: bool,
}

impl FetchFailure {
    #[must_use]
    pub fn retryable(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            retryable: true,
        }
    }

    #[must_use]
    pub fn fatal(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            retryable: false,
        }
    }
}

impl Display for FetchFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.reason)
    }
}

/// The result of querying one source for one identity.
///
/// Exactly one of these exists per (identity, source) pair per run, and it is
/// immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SourceRecord {
    /// The source had data; the map holds raw (unprefixed) metric names.
    Found(MetricMap),

    /// The source explicitly has no record for this identity. Not an error.
    NotFound,

    /// The call failed (transport error, malformed response, exhausted
    /// retries, or an abandoned in-flight call).
    Failed(FetchFailure),
}

impl SourceRecord {
    #[must_use]
    pub const fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// Returns a string describing the status of this record.
    #[must_use]
    pub const fn status_str(&self) -> &'static str {
        match self {
            Self::Found(_) => "Found",
            Self::NotFound => "NotFound",
            Self::Failed(_) => "Failed",
        }
    }
}

/// Capability contract for one external registry.
#[async_trait]
pub trait Source: Send + Sync {
    /// Short stable name used to prefix metric names and label progress.
    fn name(&self) -> &'static str;

    /// Fetch the raw metrics for one identity. Infallible by construction:
    /// failures come back as `SourceRecord::Failed`.
    async fn fetch(&self, id: &PackageId) -> SourceRecord;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_str() {
        assert_eq!(SourceRecord::Found(MetricMap::new()).status_str(), "Found");
        assert_eq!(SourceRecord::NotFound.status_str(), "NotFound");
        assert_eq!(SourceRecord::Failed(FetchFailure::fatal("boom")).status_str(), "Failed");
    }

    #[test]
    fn test_failure_constructors() {
        let f = FetchFailure::retryable("rate limited");
        assert!(f.retryable);
        assert_eq!(f.to_string(), "rate limited");

        let f = FetchFailure::fatal("malformed response");
        assert!(!f.retryable);
    }

    #[test]
    fn test_record_serializes_for_caching() {
        let mut map = MetricMap::new();
        let _ = map.insert("stars".to_string(), MetricValue::Count(50));
        let record = SourceRecord::Found(map);

        let json = serde_json::to_string(&record).unwrap();
        let back: SourceRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
