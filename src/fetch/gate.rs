//! Per-source admission control.
//!
//! Each source gets its own gate bounding how many of its calls are in
//! flight at once. Permits are RAII so a panicking or abandoned task still
//! releases its slot, and acquire/release totals are counted so tests can
//! check conservation.

use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounds concurrent in-flight calls against one source.
#[derive(Debug)]
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    limit: usize,
    acquired: AtomicU64,
    released: Arc<AtomicU64>,
}

/// An admission slot, returned to the gate on drop.
#[derive(Debug)]
pub struct Permit {
    _permit: OwnedSemaphorePermit,
    released: Arc<AtomicU64>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        let _ = self.released.fetch_add(1, Ordering::Relaxed);
    }
}

impl AdmissionGate {
    /// `limit` of zero is treated as one; a gate that admits nothing would
    /// deadlock the whole batch.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
            acquired: AtomicU64::new(0),
            released: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Wait for an admission slot.
    pub async fn admit(&self) -> Permit {
        // The semaphore is never closed, so acquisition cannot fail.
        #[expect(clippy::unwrap_used, reason = "semaphore is never closed")]
        let permit = Arc::clone(&self.semaphore).acquire_owned().await.unwrap();
        let _ = self.acquired.fetch_add(1, Ordering::Relaxed);
        Permit {
            _permit: permit,
            released: Arc::clone(&self.released),
        }
    }

    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    #[must_use]
    pub fn acquired_total(&self) -> u64 {
        self.acquired.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn released_total(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }
}
