//! Reconciliation and report generation.
//!
//! [`aggregate`] folds per-(identity, source) fetch outcomes into one record
//! per dependency, qualifies metric names with their source prefix, and adds
//! the derived time-based metrics. The fold is commutative: outcomes can
//! arrive in any order and the resulting report is identical.
//!
//! Two generators render a finished [`Report`], each through a `generate`
//! function: console (ranked worst-offender views) and CSV (the full metric
//! grid).

use crate::fetch::FetchOutcome;
use crate::identity::PackageId;
use crate::metrics::{self, MetricValue};
use crate::requirements::{ParseWarning, ParsedRequirements};
use crate::sources::{FetchFailure, SourceRecord};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

mod console;
mod csv;

pub use console::generate as generate_console;
pub use csv::generate as generate_csv;

/// One dependency with its merged, source-qualified metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyRecord {
    pub id: PackageId,
    /// Keys are `source:metric` names; absent metrics are simply missing.
    pub metrics: BTreeMap<String, MetricValue>,
}

/// A fetch that failed, attributed to its identity and source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedFailure {
    pub id: PackageId,
    pub source: &'static str,
    pub failure: FetchFailure,
}

/// The reconciled output of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    /// One record per requested dependency, in alphabetical order.
    pub records: Vec<DependencyRecord>,

    /// Identities each source explicitly had no data for.
    pub not_located: BTreeMap<&'static str, Vec<PackageId>>,

    /// Fetches that failed outright.
    pub failures: Vec<ReportedFailure>,

    /// Input lines that were skipped during parsing.
    pub warnings: Vec<ParseWarning>,
}

/// Which end of a metric's scale a ranking should surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Smallest values first (fewest stars, fewest downloads).
    Ascending,
    /// Largest values first (oldest, most stale).
    Descending,
}

impl Report {
    /// The top `k` records by a numeric metric.
    ///
    /// Records where the metric is absent or non-numeric are skipped rather
    /// than treated as zero. Ties break alphabetically by identity so the
    /// view is deterministic.
    #[must_use]
    pub fn ranking(&self, metric: &str, direction: Direction, k: usize) -> Vec<(&DependencyRecord, f64)> {
        let mut ranked: Vec<(&DependencyRecord, f64)> = self
            .records
            .iter()
            .filter_map(|record| record.metrics.get(metric).and_then(MetricValue::as_f64).map(|value| (record, value)))
            .collect();

        ranked.sort_by(|(a, x), (b, y)| {
            let ordering = match direction {
                Direction::Ascending => x.total_cmp(y),
                Direction::Descending => y.total_cmp(x),
            };
            ordering.then_with(|| a.id.cmp(&b.id))
        });

        ranked.truncate(k);
        ranked
    }
}

/// Fold fetch outcomes into one record per dependency.
///
/// Every parsed identity gets a record even if every fetch for it failed;
/// such a record just carries no metrics. `now` anchors the derived
/// time-based metrics so a whole run shares one reference point.
#[must_use]
pub fn aggregate(parsed: &ParsedRequirements, outcomes: &[FetchOutcome], now: DateTime<Utc>) -> Report {
    let mut merged: BTreeMap<PackageId, BTreeMap<String, MetricValue>> =
        parsed.packages.iter().map(|id| (id.clone(), BTreeMap::new())).collect();
    let mut not_located: BTreeMap<&'static str, Vec<PackageId>> = BTreeMap::new();
    let mut failures = Vec::new();

    for outcome in outcomes {
        match &outcome.record {
            SourceRecord::Found(raw) => {
                let slot = merged.entry(outcome.id.clone()).or_default();
                for (name, value) in raw {
                    let _ = slot.insert(format!("{}:{name}", outcome.source), value.clone());
                }
            }
            SourceRecord::NotFound => {
                not_located.entry(outcome.source).or_default().push(outcome.id.clone());
            }
            SourceRecord::Failed(failure) => {
                // A failed source left no data either, so the identity shows
                // up in that source's not-located list as well.
                not_located.entry(outcome.source).or_default().push(outcome.id.clone());
                failures.push(ReportedFailure {
                    id: outcome.id.clone(),
                    source: outcome.source,
                    failure: failure.clone(),
                });
            }
        }
    }

    for ids in not_located.values_mut() {
        ids.sort();
    }
    failures.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.source.cmp(b.source)));

    let records = merged
        .into_iter()
        .map(|(id, mut record_metrics)| {
            metrics::derive(&mut record_metrics, now);
            DependencyRecord { id, metrics: record_metrics }
        })
        .collect();

    Report {
        records,
        not_located,
        failures,
        warnings: parsed.warnings.clone(),
    }
}
