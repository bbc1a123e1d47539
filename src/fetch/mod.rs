//! Concurrent fetch scheduling.
//!
//! The scheduler fans one task out per (identity, source) pair, bounds
//! in-flight calls per source through an [`AdmissionGate`], and enforces an
//! optional wall-clock budget shared by the whole batch. Every pair yields
//! exactly one [`SourceRecord`]: tasks cut off by the budget or lost to a
//! panic surface as `Failed` records, never as a shortened result set.

use crate::Result;
use crate::identity::PackageId;
use crate::sources::{FetchFailure, Source, SourceRecord};
use core::time::Duration;
use ohno::bail;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::Instant;

mod gate;
mod progress;
mod reporter;

pub use gate::AdmissionGate;
pub use progress::{FetchTracker, NoOpProgress, Progress};
pub use reporter::ProgressReporter;

const LOG_TARGET: &str = "fetch";

/// One completed fetch: which identity, which source, what came back.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub id: PackageId,
    pub source: &'static str,
    pub record: SourceRecord,
}

/// Fans fetches out across sources with per-source admission control.
pub struct Scheduler {
    sources: Vec<Arc<dyn Source>>,
    gates: Vec<Arc<AdmissionGate>>,
    tracker: FetchTracker,
    budget: Option<Duration>,
}

impl core::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Scheduler")
            .field("sources", &self.sources.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("gates", &self.gates)
            .field("tracker", &self.tracker)
            .field("budget", &self.budget)
            .finish()
    }
}

impl Scheduler {
    /// `concurrency` bounds in-flight calls per source, not overall; two
    /// sources at a limit of 10 can have 20 calls in flight.
    #[must_use]
    pub fn new(sources: Vec<Arc<dyn Source>>, concurrency: usize, budget: Option<Duration>, progress: &Arc<dyn Progress>) -> Self {
        let names: Vec<&'static str> = sources.iter().map(|source| source.name()).collect();
        let gates = sources.iter().map(|_| Arc::new(AdmissionGate::new(concurrency))).collect();

        Self {
            sources,
            gates,
            tracker: FetchTracker::new(&names, progress),
            budget,
        }
    }

    /// Fetch every (identity, source) pair and return exactly
    /// `ids.len() * sources.len()` outcomes.
    pub async fn run(&self, ids: &[PackageId]) -> Result<Vec<FetchOutcome>> {
        if self.sources.is_empty() {
            bail!("no sources are enabled, nothing to fetch");
        }

        // One absolute deadline shared by every task in the batch.
        let deadline = self.budget.map(|budget| Instant::now() + budget);

        let mut tasks: JoinSet<FetchOutcome> = JoinSet::new();
        let mut pairs = HashMap::new();
        for (source, gate) in self.sources.iter().zip(&self.gates) {
            self.tracker.add_fetches(source.name(), ids.len() as u64);

            for id in ids {
                let source = Arc::clone(source);
                let gate = Arc::clone(gate);
                let id = id.clone();
                let pair = (id.clone(), source.name());

                let handle = tasks.spawn(async move {
                    let name = source.name();
                    let record = fetch_one(&*source, &gate, &id, deadline).await;
                    FetchOutcome { id, source: name, record }
                });
                let _ = pairs.insert(handle.id(), pair);
            }
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next_with_id().await {
            let outcome = match joined {
                Ok((_, outcome)) => outcome,
                Err(e) => {
                    // A lost task still owes the batch a record.
                    log::error!(target: LOG_TARGET, "Fetch task failed: {e}");
                    let Some((id, source)) = pairs.get(&e.id()).cloned() else {
                        bail!("fetch task panicked and could not be attributed: {e}");
                    };
                    FetchOutcome {
                        id,
                        source,
                        record: SourceRecord::Failed(FetchFailure::fatal(format!("fetch task panicked: {e}"))),
                    }
                }
            };

            self.tracker.complete_fetch(outcome.source);
            log::debug!(
                target: LOG_TARGET,
                "{} from {}: {}",
                outcome.id,
                outcome.source,
                outcome.record.status_str()
            );
            outcomes.push(outcome);
        }

        for gate in &self.gates {
            debug_assert_eq!(gate.acquired_total(), gate.released_total());
        }

        Ok(outcomes)
    }

    #[must_use]
    pub const fn tracker(&self) -> &FetchTracker {
        &self.tracker
    }
}

/// Run one fetch under the gate and the shared deadline.
async fn fetch_one(source: &dyn Source, gate: &AdmissionGate, id: &PackageId, deadline: Option<Instant>) -> SourceRecord {
    let work = async {
        let _permit = gate.admit().await;
        source.fetch(id).await
    };

    match deadline {
        None => work.await,
        Some(deadline) => match tokio::time::timeout_at(deadline, work).await {
            Ok(record) => record,
            Err(_) => SourceRecord::Failed(FetchFailure::fatal("wall-clock budget exceeded")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::MetricMap;
    use async_trait::async_trait;
    use core::sync::atomic::{AtomicU64, Ordering};

    /// Source that records its peak concurrency and answers after a delay.
    struct FakeSource {
        name: &'static str,
        delay: Duration,
        in_flight: AtomicU64,
        peak: AtomicU64,
        fail: bool,
    }

    impl FakeSource {
        fn new(name: &'static str, delay: Duration, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                delay,
                in_flight: AtomicU64::new(0),
                peak: AtomicU64::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl Source for FakeSource {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn fetch(&self, _id: &PackageId) -> SourceRecord {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            let _ = self.peak.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            let _ = self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail {
                SourceRecord::Failed(FetchFailure::retryable("synthetic outage"))
            } else {
                SourceRecord::Found(MetricMap::new())
            }
        }
    }

    fn ids(n: usize) -> Vec<PackageId> {
        (0..n).map(|i| PackageId::new(&format!("pkg{i}"), "1.0.0")).collect()
    }

    fn progress() -> Arc<dyn Progress> {
        Arc::new(NoOpProgress)
    }

    #[tokio::test]
    async fn test_one_outcome_per_pair() {
        let sources: Vec<Arc<dyn Source>> = vec![
            FakeSource::new("pypi", Duration::ZERO, false),
            FakeSource::new("github", Duration::ZERO, false),
        ];
        let scheduler = Scheduler::new(sources, 4, None, &progress());

        let outcomes = scheduler.run(&ids(5)).await.unwrap();
        assert_eq!(outcomes.len(), 10);
        assert_eq!(outcomes.iter().filter(|o| o.source == "pypi").count(), 5);
        assert_eq!(outcomes.iter().filter(|o| o.source == "github").count(), 5);
        assert!(outcomes.iter().all(|o| o.record.is_found()));
    }

    #[tokio::test]
    async fn test_total_source_failure_still_completes() {
        let sources: Vec<Arc<dyn Source>> = vec![FakeSource::new("pypi", Duration::ZERO, true)];
        let scheduler = Scheduler::new(sources, 2, None, &progress());

        let outcomes = scheduler.run(&ids(4)).await.unwrap();
        assert_eq!(outcomes.len(), 4);
        assert!(outcomes.iter().all(|o| matches!(o.record, SourceRecord::Failed(_))));
    }

    #[tokio::test]
    async fn test_concurrency_cap_is_respected() {
        let source = FakeSource::new("pypi", Duration::from_millis(20), false);
        let sources: Vec<Arc<dyn Source>> = vec![Arc::clone(&source) as Arc<dyn Source>];
        let scheduler = Scheduler::new(sources, 3, None, &progress());

        let outcomes = scheduler.run(&ids(12)).await.unwrap();
        assert_eq!(outcomes.len(), 12);
        assert!(source.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_budget_produces_failed_records() {
        let sources: Vec<Arc<dyn Source>> = vec![FakeSource::new("pypi", Duration::from_secs(60), false)];
        let scheduler = Scheduler::new(sources, 1, Some(Duration::from_millis(50)), &progress());

        let outcomes = scheduler.run(&ids(3)).await.unwrap();
        assert_eq!(outcomes.len(), 3);
        for outcome in &outcomes {
            match &outcome.record {
                SourceRecord::Failed(failure) => assert!(failure.reason.contains("budget")),
                other => panic!("expected Failed, got {}", other.status_str()),
            }
        }
    }

    #[tokio::test]
    async fn test_no_sources_is_an_error() {
        let scheduler = Scheduler::new(Vec::new(), 4, None, &progress());
        assert!(scheduler.run(&ids(1)).await.is_err());
    }

    #[tokio::test]
    async fn test_tracker_totals() {
        let sources: Vec<Arc<dyn Source>> = vec![FakeSource::new("pypi", Duration::ZERO, false)];
        let scheduler = Scheduler::new(sources, 2, None, &progress());

        let _ = scheduler.run(&ids(3)).await.unwrap();
        assert_eq!(scheduler.tracker().totals(), (3, 3));
    }
}
