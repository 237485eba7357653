//! Test doubles for the [`ManagedResource`] contract.
//!
//! [`Tracked`] counts constructions, refreshes and drops in a shared
//! [`TrackedStats`] so tests can assert lifecycle invariants from outside the
//! manager.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::ManagedResource;

/// Shared lifecycle counters, readable while the instance lives in a slot.
#[derive(Debug, Default)]
pub struct TrackedStats {
    opened: AtomicUsize,
    refreshed: AtomicUsize,
    dropped: AtomicUsize,
    /// Tracked instances constructed but not yet dropped.
    live: AtomicUsize,
}

impl TrackedStats {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn refreshed(&self) -> usize {
        self.refreshed.load(Ordering::SeqCst)
    }

    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

/// Construction arguments for a [`Tracked`].
#[derive(Debug, Clone, Default)]
pub struct TrackedArgs {
    pub stats: Arc<TrackedStats>,
    /// Make `open` fail.
    pub fail: bool,
    /// Artificial latency for `open`, to widen creation races.
    pub open_delay: Option<Duration>,
}

impl TrackedArgs {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn with_open_delay(delay: Duration) -> Self {
        Self {
            open_delay: Some(delay),
            ..Self::default()
        }
    }
}

/// Construction failure reported by a [`Tracked`].
#[derive(Debug, thiserror::Error)]
#[error("tracked resource refused to open")]
pub struct TrackedUnavailable;

/// A resource that does nothing but count.
#[derive(Debug)]
pub struct Tracked {
    stats: Arc<TrackedStats>,
    /// Refreshes seen by this instance only.
    pub refreshes: usize,
    /// Free-form marker for post-create hooks.
    pub tag: &'static str,
}

impl ManagedResource for Tracked {
    type Args = TrackedArgs;
    type Error = TrackedUnavailable;

    fn open(args: &TrackedArgs) -> Result<Self, TrackedUnavailable> {
        if let Some(delay) = args.open_delay {
            std::thread::sleep(delay);
        }
        if args.fail {
            return Err(TrackedUnavailable);
        }
        args.stats.opened.fetch_add(1, Ordering::SeqCst);
        args.stats.live.fetch_add(1, Ordering::SeqCst);
        Ok(Self {
            stats: args.stats.clone(),
            refreshes: 0,
            tag: "",
        })
    }

    fn refresh(&mut self) {
        self.refreshes += 1;
        self.stats.refreshed.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.stats.live.fetch_sub(1, Ordering::SeqCst);
        self.stats.dropped.fetch_add(1, Ordering::SeqCst);
    }
}
