//! Lifecycle Metrics
//!
//! Lightweight counters for everything a [`SharedResource`] does to its
//! generation: creations, joins, refreshes, releases and teardowns.  The
//! counters are plain atomics so they can be bumped from inside the manager's
//! critical section without adding contention of their own.
//!
//! # Design Goals:
//! - Lock-free atomic counters
//! - Zero allocation on the hot path
//! - Serializable snapshots for operators
//!
//! [`SharedResource`]: crate::share::SharedResource

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Counters for one manager instance.
#[derive(Debug, Default)]
pub struct ShareMetrics {
    // Generation lifecycle
    pub creates: AtomicU64,
    pub create_time_ns: AtomicU64,
    pub construction_failures: AtomicU64,
    pub destroys: AtomicU64,
    pub detaches: AtomicU64,

    // Sharing
    pub joins: AtomicU64,
    pub capacity_rejections: AtomicU64,
    pub releases: AtomicU64,

    // Refresh driving
    pub ownership_claims: AtomicU64,
    pub refreshes: AtomicU64,
    pub refresh_time_ns: AtomicU64,
}

impl ShareMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record a successful construction
    pub fn record_create(&self, duration: Duration) {
        self.creates.fetch_add(1, Ordering::Relaxed);
        self.create_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Record one refresh of the managed resource
    pub fn record_refresh(&self, duration: Duration) {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        self.refresh_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn record_construction_failure(&self) {
        self.construction_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_join(&self) {
        self.joins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_capacity_rejection(&self) {
        self.capacity_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ownership_claim(&self) {
        self.ownership_claims.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a release; `destroyed` marks the one that ended a generation.
    pub fn record_release(&self, destroyed: bool) {
        self.releases.fetch_add(1, Ordering::Relaxed);
        if destroyed {
            self.destroys.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a generation that ended by handing its resource back to a
    /// caller instead of dropping it
    pub fn record_detach(&self) {
        self.detaches.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of current metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            creates: self.creates.load(Ordering::Relaxed),
            avg_create_ms: avg_duration_ms(&self.creates, &self.create_time_ns),
            construction_failures: self.construction_failures.load(Ordering::Relaxed),
            destroys: self.destroys.load(Ordering::Relaxed),
            detaches: self.detaches.load(Ordering::Relaxed),
            joins: self.joins.load(Ordering::Relaxed),
            capacity_rejections: self.capacity_rejections.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            ownership_claims: self.ownership_claims.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            avg_refresh_ms: avg_duration_ms(&self.refreshes, &self.refresh_time_ns),
        }
    }

    /// Reset all metrics to zero
    pub fn reset(&self) {
        for counter in [
            &self.creates,
            &self.create_time_ns,
            &self.construction_failures,
            &self.destroys,
            &self.detaches,
            &self.joins,
            &self.capacity_rejections,
            &self.releases,
            &self.ownership_claims,
            &self.refreshes,
            &self.refresh_time_ns,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

fn avg_duration_ms(count: &AtomicU64, total_ns: &AtomicU64) -> f64 {
    let c = count.load(Ordering::Relaxed);
    if c == 0 {
        return 0.0;
    }
    let total = total_ns.load(Ordering::Relaxed);
    (total as f64) / (c as f64) / 1_000_000.0
}

/// A point-in-time snapshot of [`ShareMetrics`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub creates: u64,
    pub avg_create_ms: f64,
    pub construction_failures: u64,
    pub destroys: u64,
    pub detaches: u64,
    pub joins: u64,
    pub capacity_rejections: u64,
    pub releases: u64,
    pub ownership_claims: u64,
    pub refreshes: u64,
    pub avg_refresh_ms: f64,
}

impl MetricsSnapshot {
    /// Generations currently alive according to the counters.
    pub fn live_generations(&self) -> u64 {
        self.creates
            .saturating_sub(self.destroys)
            .saturating_sub(self.detaches)
    }

    /// Print a human-readable report
    pub fn print_report(&self) {
        println!("╔═══════════════════════════════════════════════════════════╗");
        println!("║         Camshare Resource Sharing Report                  ║");
        println!("╠═══════════════════════════════════════════════════════════╣");
        println!("║ Generations                                               ║");
        println!("║   Created:     {:>8} (avg: {:>8.3} ms)              ║",
                 self.creates, self.avg_create_ms);
        println!("║   Destroyed:   {:>8}                                   ║",
                 self.destroys);
        println!("║   Detached:    {:>8}                                   ║",
                 self.detaches);
        println!("║   Failed:      {:>8}                                   ║",
                 self.construction_failures);
        println!("╠═══════════════════════════════════════════════════════════╣");
        println!("║ Sharing                                                   ║");
        println!("║   Joins:       {:>8}                                   ║",
                 self.joins);
        println!("║   Busy:        {:>8}                                   ║",
                 self.capacity_rejections);
        println!("║   Releases:    {:>8}                                   ║",
                 self.releases);
        println!("╠═══════════════════════════════════════════════════════════╣");
        println!("║ Refresh                                                   ║");
        println!("║   Claims:      {:>8}                                   ║",
                 self.ownership_claims);
        println!("║   Refreshes:   {:>8} (avg: {:>8.3} ms)              ║",
                 self.refreshes, self.avg_refresh_ms);
        println!("╚═══════════════════════════════════════════════════════════╝");
    }
}

/// A scoped timer that automatically records duration on drop
pub struct ScopedTimer<'a> {
    start: Instant,
    metrics: &'a ShareMetrics,
    metric_type: TimerType,
}

/// Which duration a [`ScopedTimer`] feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerType {
    Create,
    Refresh,
}

impl<'a> ScopedTimer<'a> {
    pub fn new(metrics: &'a ShareMetrics, metric_type: TimerType) -> Self {
        Self {
            start: Instant::now(),
            metrics,
            metric_type,
        }
    }

    /// Stop the timer without recording anything (e.g. a failed create).
    pub fn cancel(self) {
        std::mem::forget(self);
    }
}

impl<'a> Drop for ScopedTimer<'a> {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        match self.metric_type {
            TimerType::Create => self.metrics.record_create(duration),
            TimerType::Refresh => self.metrics.record_refresh(duration),
        }
    }
}
