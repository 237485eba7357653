//! Shared Resource Manager
//!
//! [`SharedResource`] is the thread-safe façade around one [`OwnershipSlot`].
//! Many concurrent request handlers call into a single instance to create or
//! join the active generation, to drive its refresh cooperatively and to
//! release it again.  One mutex serializes every operation against the slot.
//!
//! # Concurrency Contract:
//! - Creation happens under the lock, so two callers racing to be first
//!   produce exactly one construction; the loser joins.
//! - The ownership claim is a one-shot transition under the same lock, so
//!   exactly one caller per generation drives refresh.
//! - Refresh runs *while holding the lock*.  It must not race with joins or
//!   releases on the same generation, and its latency adds to contention.
//! - Destruction also happens under the lock, so a device is always closed
//!   before the next generation may reopen it.

use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::slot::{OwnershipSlot, PostCreateHook};
use crate::config::ShareConfig;
use crate::error::ShareError;
use crate::metrics::{ScopedTimer, ShareMetrics, TimerType};
use crate::resource::ManagedResource;

/// Outcome of [`SharedResource::acquire_or_create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireStatus {
    /// A new generation was constructed; the caller is its sole holder and
    /// exclusive owner.
    CreatedAndActive,
    /// The caller joined the active generation.
    JoinedAndActive,
    /// The generation is at capacity.  If the caller's [`Ownership`] is set
    /// it created the generation and still holds it (capacity of one);
    /// otherwise nothing was joined and no state changed.
    CapacityReached,
}

/// The caller's local record of whether it drives refresh.
///
/// A default value means "not the owner".  Every successful claim is issued
/// a fresh ticket, so a token whose right was given up, taken over or left
/// behind in an earlier generation can never clear or drive the current one.
/// Such a token still reports [`is_owner`](Self::is_owner) until the next
/// [`SharedResource::cooperative_refresh`] resets it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ownership {
    ticket: Option<u64>,
}

impl Ownership {
    pub fn is_owner(&self) -> bool {
        self.ticket.is_some()
    }
}

struct State<R> {
    slot: OwnershipSlot<R>,
    /// Number of the active (or most recent) generation.
    generation: u64,
    /// Ticket of the most recent ownership claim.
    ticket: u64,
    /// The share pinned by keep-warm mode, if any.
    pin: Option<Ownership>,
    post_create: Option<PostCreateHook<R>>,
}

impl<R: ManagedResource> State<R> {
    fn is_current_owner(&self, ownership: &Ownership) -> bool {
        self.slot.ownership_claimed() && ownership.ticket == Some(self.ticket)
    }

    /// The cap joins are checked against.  A keep-warm pin is an extra
    /// share on top of the configured capacity for as long as it exists.
    fn effective_capacity(&self) -> i64 {
        let capacity = self.slot.capacity();
        if self.pin.is_some() {
            raised_for_pin(capacity)
        } else {
            capacity
        }
    }
}

fn raised_for_pin(capacity: i64) -> i64 {
    if capacity > 0 {
        capacity + 1
    } else {
        capacity
    }
}

/// Shares one expensive, non-cloneable resource among concurrent callers.
///
/// # Usage Pattern: Create or Join
/// ```rust,no_run
/// # use camshare_core::share::{AcquireStatus, Ownership, SharedResource};
/// # use camshare_core::resource::camera::{CameraArgs, SimulatedCamera};
/// let cam = SharedResource::<SimulatedCamera>::new(4);
/// let mut me = Ownership::default();
/// match cam.acquire_or_create(&mut me, &CameraArgs::new(0)).unwrap() {
///     AcquireStatus::CapacityReached => { /* decline, release if owner */ }
///     _ => {
///         cam.cooperative_refresh(&mut me);
///         let _jpeg = cam.with_resource(|c| c.latest().to_vec());
///         cam.release(me);
///     }
/// }
/// ```
pub struct SharedResource<R: ManagedResource> {
    state: Mutex<State<R>>,
    metrics: Arc<ShareMetrics>,
}

impl<R: ManagedResource> SharedResource<R> {
    /// Create a manager with the given capacity (`<= 0` is unbounded).
    pub fn new(capacity: i64) -> Self {
        debug!(capacity, "Creating SharedResource");
        Self {
            state: Mutex::new(State {
                slot: OwnershipSlot::new(capacity),
                generation: 0,
                ticket: 0,
                pin: None,
                post_create: None,
            }),
            metrics: ShareMetrics::new(),
        }
    }

    /// Create a manager sized from configuration.
    pub fn from_config(config: &ShareConfig) -> Self {
        Self::new(config.capacity)
    }

    /// Builder form of [`set_post_create`](Self::set_post_create).
    pub fn with_post_create<F>(self, hook: F) -> Self
    where
        F: Fn(&mut R) + Send + Sync + 'static,
    {
        self.set_post_create(hook);
        self
    }

    /// Install a hook run once per generation, right after construction and
    /// before any caller can observe the new instance.
    pub fn set_post_create<F>(&self, hook: F)
    where
        F: Fn(&mut R) + Send + Sync + 'static,
    {
        self.lock().post_create = Some(Box::new(hook));
    }

    /// Create a new generation or join the active one.
    ///
    /// On creation `ownership` becomes the owner token of the new
    /// generation.  Construction failure leaves every state untouched and is
    /// reported as [`ShareError::ConstructionFailed`].
    pub fn acquire_or_create(
        &self,
        ownership: &mut Ownership,
        args: &R::Args,
    ) -> Result<AcquireStatus, ShareError> {
        let mut state = self.lock();
        let capacity = state.effective_capacity();
        self.acquire_locked(&mut state, ownership, args, capacity)
    }

    /// Unconditionally create a generation, failing if one is already live.
    ///
    /// The returned token is the owner of the new generation and must be
    /// passed to [`release`](Self::release) eventually.
    pub fn create(&self, args: &R::Args) -> Result<Ownership, ShareError> {
        let mut state = self.lock();
        if state.slot.is_active() {
            return Err(ShareError::AlreadyActive);
        }
        let mut ownership = Ownership::default();
        self.create_locked(&mut state, &mut ownership, args)?;
        Ok(ownership)
    }

    /// Refresh the resource if (and only if) this caller is the owner.
    ///
    /// A caller that is not yet the owner attempts the one-shot claim first,
    /// which succeeds only when nobody else holds it.  Returns whether the
    /// refresh actually ran.
    pub fn cooperative_refresh(&self, ownership: &mut Ownership) -> bool {
        let mut state = self.lock();
        if !state.slot.is_active() {
            return false;
        }

        if !state.is_current_owner(ownership) {
            *ownership = self.claim_locked(&mut state).unwrap_or_default();
            if ownership.is_owner() {
                debug!(generation = state.generation, "Refresh ownership claimed");
            }
        }

        if ownership.is_owner() {
            self.refresh_locked(&mut state);
            true
        } else {
            false
        }
    }

    /// Refresh regardless of ownership.
    ///
    /// Meant for a single dedicated driver in keep-warm mode.  The caller is
    /// responsible for not mixing this with cooperative drivers.
    pub fn unconditional_refresh(&self) -> bool {
        let mut state = self.lock();
        if !state.slot.is_active() {
            return false;
        }
        self.refresh_locked(&mut state);
        true
    }

    /// Give up one share of the active generation.
    ///
    /// An owner relinquishes its refresh right first.  Returns `true` when
    /// this call ended the generation; the resource has then been dropped.
    pub fn release(&self, ownership: Ownership) -> bool {
        let mut state = self.lock();
        self.release_locked(&mut state, ownership)
    }

    /// Release one share without dropping the resource.
    ///
    /// When this ends the generation the detached instance is returned to
    /// the caller instead of being destroyed.  Ownership bookkeeping is left
    /// alone.
    pub fn release_detached(&self) -> Option<R> {
        let mut state = self.lock();
        let detached = state.slot.release();
        self.metrics.record_release(false);
        if detached.is_some() {
            self.metrics.record_detach();
            state.pin = None;
            info!(generation = state.generation, "Generation detached");
        }
        detached
    }

    /// Pin a generation open with no external sharer.
    ///
    /// The pin is an extra share: capacity is raised by one for as long as
    /// it exists, so it never takes a caller's place.  The pin also takes
    /// over the refresh right, leaving the dedicated driver as the only one
    /// refreshing.  Fails with [`ShareError::AlreadyPinned`] while a pin is
    /// held.
    pub fn keep_warm(&self, args: &R::Args) -> Result<AcquireStatus, ShareError> {
        let mut state = self.lock();
        if state.pin.is_some() {
            debug!(generation = state.generation, "Generation already kept warm");
            return Err(ShareError::AlreadyPinned);
        }

        let raised = raised_for_pin(state.slot.capacity());
        let mut pin = Ownership::default();
        let status = self.acquire_locked(&mut state, &mut pin, args, raised)?;
        if status == AcquireStatus::CapacityReached {
            return Ok(status);
        }

        if !pin.is_owner() {
            // Joined a caller's generation: the cooperative owner steps down.
            state.slot.clear_ownership();
            pin = self.claim_locked(&mut state).unwrap_or_default();
            debug_assert!(pin.is_owner(), "cleared ownership must be claimable");
            debug!(generation = state.generation, "Keep-warm pin took over refresh");
        }
        info!(generation = state.generation, "Generation pinned warm");
        state.pin = Some(pin);
        Ok(status)
    }

    /// Drop the keep-warm pin.  Returns `true` if that ended the generation.
    pub fn end_keep_warm(&self) -> bool {
        let mut state = self.lock();
        match state.pin.take() {
            Some(pin) => {
                info!(generation = state.generation, "Releasing keep-warm pin");
                self.release_locked(&mut state, pin)
            }
            None => false,
        }
    }

    /// `true` iff exactly one caller holds the active generation.
    pub fn is_last_holder(&self) -> bool {
        self.lock().slot.is_last_holder()
    }

    pub fn has_active_generation(&self) -> bool {
        self.lock().slot.is_active()
    }

    pub fn is_kept_warm(&self) -> bool {
        self.lock().pin.is_some()
    }

    pub fn shared_count(&self) -> usize {
        self.lock().slot.shared_count()
    }

    /// Whether some caller currently holds the refresh right.
    pub fn ownership_claimed(&self) -> bool {
        self.lock().slot.ownership_claimed()
    }

    /// Number of generations created so far.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn capacity(&self) -> i64 {
        self.lock().slot.capacity()
    }

    /// Change the cap for future joins; current holders are not evicted.
    pub fn set_capacity(&self, capacity: i64) {
        self.lock().slot.set_capacity(capacity);
    }

    /// Run `f` against the live resource, under the manager lock.
    pub fn with_resource<T>(&self, f: impl FnOnce(&R) -> T) -> Option<T> {
        self.lock().slot.resource().map(f)
    }

    /// Mutable form of [`with_resource`](Self::with_resource).
    pub fn with_resource_mut<T>(&self, f: impl FnOnce(&mut R) -> T) -> Option<T> {
        self.lock().slot.resource_mut().map(f)
    }

    pub fn metrics(&self) -> Arc<ShareMetrics> {
        self.metrics.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State<R>> {
        self.state.lock().unwrap_or_else(|poisoned| {
            // Slot fields are only mutated after fallible work succeeds, so
            // the state behind a poisoned lock is still consistent.
            warn!("SharedResource lock poisoned by a panicking holder, recovering");
            self.state.clear_poison();
            poisoned.into_inner()
        })
    }

    fn acquire_locked(
        &self,
        state: &mut State<R>,
        ownership: &mut Ownership,
        args: &R::Args,
        capacity: i64,
    ) -> Result<AcquireStatus, ShareError> {
        if !state.slot.is_active() {
            self.create_locked(state, ownership, args)?;
            if state.slot.capacity_reached_with(capacity) {
                debug!(capacity, "New generation is already at capacity");
                return Ok(AcquireStatus::CapacityReached);
            }
            return Ok(AcquireStatus::CreatedAndActive);
        }

        if state.slot.capacity_reached_with(capacity) {
            self.metrics.record_capacity_rejection();
            debug!(
                generation = state.generation,
                shared = state.slot.shared_count(),
                capacity,
                "Capacity reached, not joining"
            );
            return Ok(AcquireStatus::CapacityReached);
        }

        state.slot.join();
        self.metrics.record_join();
        debug!(
            generation = state.generation,
            shared = state.slot.shared_count(),
            "Joined active generation"
        );
        Ok(AcquireStatus::JoinedAndActive)
    }

    /// Construct a generation and hand its ownership to the creator.
    fn create_locked(
        &self,
        state: &mut State<R>,
        ownership: &mut Ownership,
        args: &R::Args,
    ) -> Result<(), ShareError> {
        let timer = ScopedTimer::new(&self.metrics, TimerType::Create);
        if let Err(err) = state.slot.create(args, state.post_create.as_ref()) {
            timer.cancel();
            self.metrics.record_construction_failure();
            warn!(error = %err, "Failed to construct managed resource");
            return Err(ShareError::construction(err));
        }
        drop(timer);

        state.generation += 1;
        *ownership = self.claim_locked(state).unwrap_or_default();
        debug_assert!(ownership.is_owner(), "fresh generation must be claimable");
        info!(generation = state.generation, "Generation created");
        Ok(())
    }

    /// One-shot claim of the refresh right, issuing a fresh ticket.
    fn claim_locked(&self, state: &mut State<R>) -> Option<Ownership> {
        if !state.slot.try_claim_ownership() {
            return None;
        }
        state.ticket += 1;
        self.metrics.record_ownership_claim();
        Some(Ownership {
            ticket: Some(state.ticket),
        })
    }

    fn refresh_locked(&self, state: &mut State<R>) {
        let _timer = ScopedTimer::new(&self.metrics, TimerType::Refresh);
        if let Some(resource) = state.slot.resource_mut() {
            resource.refresh();
        }
    }

    fn release_locked(&self, state: &mut State<R>, ownership: Ownership) -> bool {
        if state.is_current_owner(&ownership) {
            state.slot.clear_ownership();
            debug!(generation = state.generation, "Refresh ownership relinquished");
        }

        let detached = state.slot.release();
        let destroyed = detached.is_some();
        self.metrics.record_release(destroyed);
        if let Some(resource) = detached {
            state.pin = None;
            // Dropped under the lock: the next generation must not open the
            // device before this one has closed it.
            drop(resource);
            info!(generation = state.generation, "Generation destroyed");
        } else {
            debug!(
                generation = state.generation,
                shared = state.slot.shared_count(),
                "Released share"
            );
        }
        destroyed
    }
}

impl<R: ManagedResource> Default for SharedResource<R> {
    fn default() -> Self {
        Self::from_config(&ShareConfig::default())
    }
}
