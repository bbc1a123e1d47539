//! Typed metric values and derived, time-based metrics.
//!
//! Raw metrics arrive from the source clients as a flat name → value map;
//! [`derive`] adds the secondary day-based metrics. Absence is a first-class
//! state: a metric whose input is missing stays missing, and is never
//! coerced to zero anywhere in the pipeline.

use chrono::{DateTime, Utc};
use core::fmt::{Display, Formatter, Result as FmtResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// Raw metric names produced by the PyPI source.
pub const RELEASE_DATE: &str = "release_date";
pub const LATEST_RELEASE_DATE: &str = "latest_release_date";
pub const DOWNLOADS_LAST_MONTH: &str = "downloads_last_month";

// Raw metric names produced by the GitHub source.
pub const STARS: &str = "stars";
pub const FORKS: &str = "forks";
pub const WATCHERS: &str = "watchers";
pub const OPEN_ISSUES: &str = "open_issues";
pub const REPO_URL: &str = "repo_url";
pub const UPDATED_AT: &str = "updated_at";

// Derived metric names, fully qualified with their source prefix.
pub const VERSION_AGE_DAYS: &str = "pypi:version_age_days";
pub const DAYS_SINCE_LAST_RELEASE: &str = "pypi:days_since_last_release";
pub const AVG_DOWNLOADS_PER_DAY: &str = "pypi:avg_downloads_per_day";
pub const DAYS_SINCE_UPDATE: &str = "github:days_since_update";

/// A typed metric scalar.
///
/// `Absent` is distinct from any zero value and survives merging, ranking,
/// and export (it serializes to an empty CSV cell).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetricValue {
    Count(u64),
    Float(f64),
    Days(u64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Absent,
}

impl MetricValue {
    /// Numeric view used for ranking; non-numeric and absent values have none.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            #[expect(clippy::cast_precision_loss, reason = "ranking tolerates it")]
            Self::Count(n) | Self::Days(n) => Some(*n as f64),
            Self::Float(f) => Some(*f),
            Self::Text(_) | Self::Timestamp(_) | Self::Absent => None,
        }
    }

    #[must_use]
    pub const fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Timestamp view used by the derivation step.
    #[must_use]
    pub const fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }
}

impl Display for MetricValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Count(n) | Self::Days(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x:.1}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d")),
            Self::Absent => Ok(()),
        }
    }
}

/// Whole days between a past timestamp and `now`, floored, clamped at zero
/// so clock skew can never produce a negative duration.
#[must_use]
pub fn whole_days_since(then: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    now.signed_duration_since(then).num_days().max(0).cast_unsigned()
}

/// Derive the secondary, time-based metrics for one merged record.
///
/// Operates on fully-qualified (source-prefixed) metric names. Each derived
/// metric is added only when its raw input is present; missingness propagates
/// instead of defaulting to zero.
pub fn derive(metrics: &mut BTreeMap<String, MetricValue>, now: DateTime<Utc>) {
    let derivations: [(&str, &str); 3] = [
        ("pypi:release_date", VERSION_AGE_DAYS),
        ("pypi:latest_release_date", DAYS_SINCE_LAST_RELEASE),
        ("github:updated_at", DAYS_SINCE_UPDATE),
    ];

    for (input, output) in derivations {
        if let Some(ts) = metrics.get(input).and_then(MetricValue::as_timestamp) {
            let _ = metrics.insert(output.to_string(), MetricValue::Days(whole_days_since(ts, now)));
        }
    }

    if let Some(MetricValue::Count(downloads)) = metrics.get("pypi:downloads_last_month") {
        #[expect(clippy::cast_precision_loss, reason = "download counts fit comfortably")]
        let per_day = *downloads as f64 / 30.0;
        let _ = metrics.insert(AVG_DOWNLOADS_PER_DAY.to_string(), MetricValue::Float(per_day));
    }
}
