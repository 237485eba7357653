//! Lease - Caller-Side Usage Pattern
//!
//! A [`Lease`] packages the round trip every request handler performs
//! against a [`SharedResource`]: create-or-join, cooperative refresh and
//! reads while streaming, an optional grace delay when it is the last
//! holder, then release.  Dropping a lease that was never finished releases
//! its share immediately, so a cancelled task can not leak one.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::manager::{AcquireStatus, Ownership, SharedResource};
use crate::error::ShareError;
use crate::resource::ManagedResource;

impl<R: ManagedResource> SharedResource<R> {
    /// Acquire a share and wrap it in a [`Lease`].
    ///
    /// Capacity is mapped to [`ShareError::CapacityReached`] ("busy").  A
    /// caller that created a generation which is already at capacity
    /// releases it again before reporting busy.
    pub fn lease(
        self: &Arc<Self>,
        args: &R::Args,
        grace: Duration,
    ) -> Result<Lease<R>, ShareError> {
        let mut ownership = Ownership::default();
        let status = self.acquire_or_create(&mut ownership, args)?;
        match status {
            AcquireStatus::CapacityReached => {
                if ownership.is_owner() {
                    debug!("Created generation is at capacity, releasing it");
                    self.release(ownership);
                }
                Err(ShareError::CapacityReached)
            }
            AcquireStatus::CreatedAndActive | AcquireStatus::JoinedAndActive => Ok(Lease {
                manager: self.clone(),
                ownership,
                created: status == AcquireStatus::CreatedAndActive,
                grace,
                released: false,
            }),
        }
    }
}

/// One caller's share of a [`SharedResource`].
pub struct Lease<R: ManagedResource> {
    manager: Arc<SharedResource<R>>,
    ownership: Ownership,
    created: bool,
    grace: Duration,
    released: bool,
}

impl<R: ManagedResource> Lease<R> {
    /// `true` if this lease constructed the generation it holds.
    pub fn created(&self) -> bool {
        self.created
    }

    /// `true` while this lease drives refresh for all holders.
    pub fn is_owner(&self) -> bool {
        self.ownership.is_owner()
    }

    /// Cooperative refresh; returns whether the resource was refreshed.
    /// Gaining ownership during the call is logged as the owner change.
    pub fn refresh(&mut self) -> bool {
        let was_owner = self.ownership.is_owner();
        let refreshed = self.manager.cooperative_refresh(&mut self.ownership);
        if !was_owner && self.ownership.is_owner() {
            info!("Refresh ownership changed hands");
        }
        refreshed
    }

    /// Read the resource; `None` if its generation has ended.
    pub fn with<T>(&self, f: impl FnOnce(&R) -> T) -> Option<T> {
        self.manager.with_resource(f)
    }

    pub fn with_mut<T>(&self, f: impl FnOnce(&mut R) -> T) -> Option<T> {
        self.manager.with_resource_mut(f)
    }

    pub fn manager(&self) -> &Arc<SharedResource<R>> {
        &self.manager
    }

    /// Release the share, pausing for the grace period first when this is
    /// the last holder.  Returns `true` if the generation was destroyed.
    pub async fn finish(mut self) -> bool {
        if self.manager.is_last_holder() && !self.grace.is_zero() {
            debug!(grace_ms = self.grace.as_millis() as u64, "Last holder, deferring release");
            tokio::time::sleep(self.grace).await;
        }
        self.release_now()
    }

    /// Blocking form of [`finish`](Self::finish) for thread-based callers.
    pub fn finish_blocking(mut self) -> bool {
        if self.manager.is_last_holder() && !self.grace.is_zero() {
            debug!(grace_ms = self.grace.as_millis() as u64, "Last holder, deferring release");
            std::thread::sleep(self.grace);
        }
        self.release_now()
    }

    fn release_now(&mut self) -> bool {
        self.released = true;
        let destroyed = self.manager.release(self.ownership);
        if destroyed {
            info!("Underlying resource torn down");
        }
        destroyed
    }
}

impl<R: ManagedResource> Drop for Lease<R> {
    fn drop(&mut self) {
        if !self.released {
            self.release_now();
        }
    }
}
