//! Progress reporting for the fetch phase.
//!
//! The scheduler never pushes updates; it bumps atomic counters and the
//! progress reporter pulls a snapshot through a callback whenever it wants
//! to redraw. A counter pair exists per source so the display can show how
//! far each registry has gotten independently.

use core::sync::atomic::{AtomicU64, Ordering};
use owo_colors::OwoColorize;
use std::sync::Arc;

/// A trait for reporting progress of long-running operations.
pub trait Progress: Send + Sync {
    /// Set the phase label for the current operation (e.g., "Parsing", "Fetching").
    fn set_phase(&self, phase: &str);

    /// Configure determinate progress reporting.
    ///
    /// The callback should return (total, current, message) to show progress
    /// as a percentage or fraction.
    fn set_determinate(&self, callback: Box<dyn Fn() -> (u64, u64, String) + Send + Sync + 'static>);

    /// Print a message line without disrupting the progress indicator.
    fn println(&self, msg: &str);

    /// Whether styled output is appropriate for this reporter.
    fn use_colors(&self) -> bool;

    /// Finish and clear the progress indicator.
    fn done(&self);
}

/// A progress reporter that swallows everything. Used when the output is not
/// a terminal, and by tests.
#[derive(Debug, Default)]
pub struct NoOpProgress;

impl Progress for NoOpProgress {
    fn set_phase(&self, _phase: &str) {}
    fn set_determinate(&self, _callback: Box<dyn Fn() -> (u64, u64, String) + Send + Sync + 'static>) {}
    fn println(&self, _msg: &str) {}
    fn use_colors(&self) -> bool {
        false
    }
    fn done(&self) {}
}

/// Counters for one source.
#[derive(Debug, Default)]
struct SourceCounter {
    issued: AtomicU64,
    completed: AtomicU64,
}

/// Tracks outstanding fetches per source and feeds the progress reporter.
#[derive(Clone)]
pub struct FetchTracker {
    names: Arc<[&'static str]>,
    counters: Arc<[SourceCounter]>,
    progress: Arc<dyn Progress>,
}

impl core::fmt::Debug for FetchTracker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FetchTracker")
            .field("names", &self.names)
            .field("counters", &self.counters)
            .field("progress", &"<dyn Progress>")
            .finish()
    }
}

impl FetchTracker {
    /// Create a tracker covering the given sources and wire it into the
    /// progress reporter.
    #[must_use]
    pub fn new(source_names: &[&'static str], progress: &Arc<dyn Progress>) -> Self {
        let names: Arc<[&'static str]> = source_names.into();
        let counters: Arc<[SourceCounter]> = source_names.iter().map(|_| SourceCounter::default()).collect();

        let names_clone = Arc::clone(&names);
        let counters_clone = Arc::clone(&counters);
        let use_colors = progress.use_colors();
        progress.set_determinate(Box::new(move || {
            Self::progress_reporter_callback(&names_clone, &counters_clone, use_colors)
        }));

        Self {
            names,
            counters,
            progress: Arc::clone(progress),
        }
    }

    /// Print a message line without disrupting the progress indicator.
    pub fn println(&self, msg: &str) {
        self.progress.println(msg);
    }

    fn index_of(&self, source: &str) -> Option<usize> {
        self.names.iter().position(|name| *name == source)
    }

    /// Mark that `count` fetches have been issued for the given source.
    pub fn add_fetches(&self, source: &str, count: u64) {
        if let Some(index) = self.index_of(source) {
            let _ = self.counters[index].issued.fetch_add(count, Ordering::Relaxed);
        }
    }

    /// Mark that one fetch has completed for the given source.
    pub fn complete_fetch(&self, source: &str) {
        if let Some(index) = self.index_of(source) {
            let _ = self.counters[index].completed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Current (issued, completed) totals across all sources.
    #[must_use]
    pub fn totals(&self) -> (u64, u64) {
        let issued = self.counters.iter().map(|c| c.issued.load(Ordering::Relaxed)).sum();
        let completed = self.counters.iter().map(|c| c.completed.load(Ordering::Relaxed)).sum();
        (issued, completed)
    }

    /// Compute current progress state from counters.
    ///
    /// Returns (`total_length`, `current_position`, `message_string`).
    fn progress_reporter_callback(names: &[&'static str], counters: &[SourceCounter], use_colors: bool) -> (u64, u64, String) {
        let mut total_issued = 0u64;
        let mut total_completed = 0u64;
        let mut parts = Vec::with_capacity(names.len());

        for (name, counter) in names.iter().zip(counters) {
            let issued = counter.issued.load(Ordering::Relaxed);
            let completed = counter.completed.load(Ordering::Relaxed);

            if issued > 0 {
                total_issued += issued;
                total_completed += completed;

                let text = format!("{completed}/{issued} {name}");
                let styled = if use_colors && completed >= issued {
                    format!("{}", text.green())
                } else {
                    text
                };
                parts.push(styled);
            }
        }

        let message = if parts.is_empty() {
            "No fetches".to_string()
        } else {
            parts.join(", ")
        };

        (total_issued, total_completed, message)
    }
}
