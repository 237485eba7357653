//! Keep-Warm Driver
//!
//! Holds a generation open independent of request traffic and refreshes it
//! from one background task, so an expensive device stays initialized and
//! its data stays fresh even with no viewer attached.
//!
//! The pinned share owns the refresh right, taking it over from a viewer if
//! the generation was already live, so cooperative callers on a kept-warm
//! generation read data but never refresh it themselves.  Only one driver
//! can run per manager: starting a second fails with
//! [`ShareError::AlreadyPinned`].

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use super::manager::{AcquireStatus, SharedResource};
use crate::error::ShareError;
use crate::resource::ManagedResource;

/// Background refresher for a kept-warm [`SharedResource`].
///
/// Must be started inside a tokio runtime.  Dropping the driver stops the
/// refresh task but leaves the pin in place; call
/// [`shutdown`](Self::shutdown) to tear both down.
pub struct KeepWarmDriver<R: ManagedResource> {
    manager: Arc<SharedResource<R>>,
    cancel: CancellationToken,
    task: JoinHandle<u64>,
    _guard: DropGuard,
}

impl<R: ManagedResource> KeepWarmDriver<R> {
    /// Pin a generation and start refreshing it every `interval`.
    ///
    /// Fails with [`ShareError::AlreadyPinned`] if another driver (or a
    /// direct [`SharedResource::keep_warm`]) already holds the pin.
    pub fn start(
        manager: Arc<SharedResource<R>>,
        args: &R::Args,
        interval: Duration,
    ) -> Result<Self, ShareError> {
        if manager.keep_warm(args)? == AcquireStatus::CapacityReached {
            return Err(ShareError::CapacityReached);
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(refresh_loop(manager.clone(), cancel.clone(), interval));
        info!(interval_ms = interval.as_millis() as u64, "Keep-warm driver started");

        Ok(Self {
            manager,
            _guard: cancel.clone().drop_guard(),
            cancel,
            task,
        })
    }

    /// Stop refreshing and drop the pin.  Returns `true` if that destroyed
    /// the generation (no viewer was attached).
    pub async fn shutdown(self) -> bool {
        self.cancel.cancel();
        match self.task.await {
            Ok(ticks) => debug!(ticks, "Keep-warm refresh task stopped"),
            Err(err) => warn!(error = %err, "Keep-warm refresh task failed"),
        }
        self.manager.end_keep_warm()
    }
}

async fn refresh_loop<R: ManagedResource>(
    manager: Arc<SharedResource<R>>,
    cancel: CancellationToken,
    interval: Duration,
) -> u64 {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut ticks = 0;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if manager.unconditional_refresh() {
                    ticks += 1;
                }
            }
        }
    }
    ticks
}
