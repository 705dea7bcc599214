//! Global atomic counters for review observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a review).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations and no locking.
pub struct Metrics {
    reviews_started: AtomicU64,
    lenses_succeeded: AtomicU64,
    lenses_failed: AtomicU64,
    lenses_skipped: AtomicU64,
    issues_reported: AtomicU64,
    issues_malformed: AtomicU64,
    events_emitted: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            reviews_started: AtomicU64::new(0),
            lenses_succeeded: AtomicU64::new(0),
            lenses_failed: AtomicU64::new(0),
            lenses_skipped: AtomicU64::new(0),
            issues_reported: AtomicU64::new(0),
            issues_malformed: AtomicU64::new(0),
            events_emitted: AtomicU64::new(0),
        }
    }

    pub fn inc_reviews_started(&self) {
        self.reviews_started.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "reviews_started", "counter incremented");
    }

    pub fn inc_lenses_succeeded(&self) {
        self.lenses_succeeded.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "lenses_succeeded", "counter incremented");
    }

    /// Lenses that ran and failed (errors and panics).
    pub fn inc_lenses_failed(&self) {
        self.lenses_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "lenses_failed", "counter incremented");
    }

    /// Lenses never started because the run was cancelled.
    pub fn inc_lenses_skipped(&self) {
        self.lenses_skipped.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "lenses_skipped", "counter incremented");
    }

    /// Add the number of issues that survived aggregation.
    pub fn add_issues_reported(&self, count: u64) {
        self.issues_reported.fetch_add(count, Ordering::Relaxed);
        tracing::trace!(metric = "issues_reported", count, "counter incremented");
    }

    /// Add the number of model issues dropped as undecodable.
    pub fn add_issues_malformed(&self, count: u64) {
        self.issues_malformed.fetch_add(count, Ordering::Relaxed);
        tracing::trace!(metric = "issues_malformed", count, "counter incremented");
    }

    pub fn inc_events_emitted(&self) {
        self.events_emitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call this at natural boundaries (end of a review, service tick)
    /// rather than on every increment.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            reviews_started = self.reviews_started(),
            lenses_succeeded = self.lenses_succeeded(),
            lenses_failed = self.lenses_failed(),
            lenses_skipped = self.lenses_skipped(),
            issues_reported = self.issues_reported(),
            issues_malformed = self.issues_malformed(),
            events_emitted = self.events_emitted(),
        );
    }

    pub fn reviews_started(&self) -> u64 {
        self.reviews_started.load(Ordering::Relaxed)
    }

    pub fn lenses_succeeded(&self) -> u64 {
        self.lenses_succeeded.load(Ordering::Relaxed)
    }

    pub fn lenses_failed(&self) -> u64 {
        self.lenses_failed.load(Ordering::Relaxed)
    }

    pub fn lenses_skipped(&self) -> u64 {
        self.lenses_skipped.load(Ordering::Relaxed)
    }

    pub fn issues_reported(&self) -> u64 {
        self.issues_reported.load(Ordering::Relaxed)
    }

    pub fn issues_malformed(&self) -> u64 {
        self.issues_malformed.load(Ordering::Relaxed)
    }

    pub fn events_emitted(&self) -> u64 {
        self.events_emitted.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.reviews_started.store(0, Ordering::Relaxed);
        self.lenses_succeeded.store(0, Ordering::Relaxed);
        self.lenses_failed.store(0, Ordering::Relaxed);
        self.lenses_skipped.store(0, Ordering::Relaxed);
        self.issues_reported.store(0, Ordering::Relaxed);
        self.issues_malformed.store(0, Ordering::Relaxed);
        self.events_emitted.store(0, Ordering::Relaxed);
    }
}
