//! Ownership Slot - Arena of One
//!
//! The slot holds at most one managed resource (one *generation*) together
//! with the bookkeeping that decides who may drive its refresh and when it
//! may be destroyed.  Sharing is purely a counter discipline: the resource
//! itself is always owned by the slot, callers only ever count themselves in
//! and out.
//!
//! The slot is not thread-safe on its own.  [`SharedResource`] keeps it
//! behind a mutex and every method here assumes that lock is held.
//!
//! [`SharedResource`]: crate::share::SharedResource

use crate::resource::ManagedResource;

/// One-time wiring callback invoked right after a resource is constructed.
pub type PostCreateHook<R> = Box<dyn Fn(&mut R) + Send + Sync>;

/// Holds at most one generation of a managed resource.
pub struct OwnershipSlot<R> {
    /// Present iff a generation is active.
    resource: Option<R>,
    /// Callers currently registered on the active generation.
    shared_count: usize,
    /// `<= 0` means unbounded.
    capacity: i64,
    /// Set once a caller has claimed the right to drive refresh.
    exclusive_owner_claimed: bool,
}

impl<R: ManagedResource> OwnershipSlot<R> {
    /// Create an empty slot with the given capacity (`<= 0` is unbounded).
    pub fn new(capacity: i64) -> Self {
        Self {
            resource: None,
            shared_count: 0,
            capacity,
            exclusive_owner_claimed: false,
        }
    }

    /// Construct a new generation.
    ///
    /// The caller must have checked that the slot is empty.  On construction
    /// failure the error is returned untouched and the slot stays empty.
    pub fn create(
        &mut self,
        args: &R::Args,
        hook: Option<&PostCreateHook<R>>,
    ) -> Result<(), R::Error> {
        debug_assert!(self.resource.is_none(), "create on an occupied slot");

        let mut resource = R::open(args)?;
        if let Some(hook) = hook {
            hook(&mut resource);
        }
        self.resource = Some(resource);
        self.shared_count = 1;
        self.exclusive_owner_claimed = false;
        Ok(())
    }

    /// Register one more caller on the active generation.
    pub fn join(&mut self) {
        debug_assert!(self.resource.is_some(), "join on an empty slot");
        self.shared_count += 1;
    }

    pub fn capacity_reached(&self) -> bool {
        self.capacity_reached_with(self.capacity)
    }

    /// Capacity check against an explicit limit instead of the configured one.
    pub(crate) fn capacity_reached_with(&self, capacity: i64) -> bool {
        capacity > 0 && self.shared_count as i64 >= capacity
    }

    /// One-shot false -> true transition of the ownership flag.
    ///
    /// Returns `true` only for the first call since the generation began or
    /// since the flag was last cleared.  Always `false` on an empty slot.
    pub fn try_claim_ownership(&mut self) -> bool {
        if self.resource.is_none() || self.exclusive_owner_claimed {
            return false;
        }
        self.exclusive_owner_claimed = true;
        true
    }

    /// Relinquish the refresh-driving right so another holder can claim it.
    pub fn clear_ownership(&mut self) {
        self.exclusive_owner_claimed = false;
    }

    pub fn is_last_holder(&self) -> bool {
        self.shared_count == 1
    }

    /// Drop one holder.
    ///
    /// When the count reaches zero the resource is detached and handed back
    /// to the caller for destruction and the ownership flag is cleared.
    /// Releasing an empty slot is a no-op.
    pub fn release(&mut self) -> Option<R> {
        if self.shared_count == 0 {
            return None;
        }
        self.shared_count -= 1;
        if self.shared_count == 0 {
            self.exclusive_owner_claimed = false;
            self.resource.take()
        } else {
            None
        }
    }

    pub fn is_active(&self) -> bool {
        self.resource.is_some()
    }

    pub fn shared_count(&self) -> usize {
        self.shared_count
    }

    pub fn capacity(&self) -> i64 {
        self.capacity
    }

    pub fn set_capacity(&mut self, capacity: i64) {
        self.capacity = capacity;
    }

    pub fn ownership_claimed(&self) -> bool {
        self.exclusive_owner_claimed
    }

    pub fn resource(&self) -> Option<&R> {
        self.resource.as_ref()
    }

    pub fn resource_mut(&mut self) -> Option<&mut R> {
        self.resource.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::testing::{Tracked, TrackedArgs};

    fn slot(capacity: i64) -> OwnershipSlot<Tracked> {
        OwnershipSlot::new(capacity)
    }

    #[test]
    fn test_new_slot_is_empty() {
        let s = slot(3);
        assert!(!s.is_active());
        assert_eq!(s.shared_count(), 0);
        assert!(!s.is_last_holder());
        assert!(!s.ownership_claimed());
    }

    #[test]
    fn test_create_sets_single_holder() {
        let mut s = slot(3);
        let args = TrackedArgs::default();
        s.create(&args, None).unwrap();

        assert!(s.is_active());
        assert_eq!(s.shared_count(), 1);
        assert!(s.is_last_holder());
        assert!(!s.ownership_claimed());
        assert_eq!(args.stats.opened(), 1);
    }

    #[test]
    fn test_create_failure_leaves_slot_empty() {
        let mut s = slot(3);
        let args = TrackedArgs::failing();
        assert!(s.create(&args, None).is_err());
        assert!(!s.is_active());
        assert_eq!(s.shared_count(), 0);
    }

    #[test]
    fn test_post_create_hook_runs_before_use() {
        let mut s = slot(0);
        let hook: PostCreateHook<Tracked> = Box::new(|p: &mut Tracked| p.tag = "wired");
        s.create(&TrackedArgs::default(), Some(&hook)).unwrap();
        assert_eq!(s.resource().map(|p| p.tag), Some("wired"));
    }

    #[test]
    fn test_capacity_reached() {
        let mut s = slot(2);
        s.create(&TrackedArgs::default(), None).unwrap();
        assert!(!s.capacity_reached());
        s.join();
        assert!(s.capacity_reached());
    }

    #[test]
    fn test_unbounded_capacity_never_reached() {
        for cap in [0, -1] {
            let mut s = slot(cap);
            s.create(&TrackedArgs::default(), None).unwrap();
            for _ in 0..50 {
                s.join();
            }
            assert!(!s.capacity_reached());
        }
    }

    #[test]
    fn test_claim_is_one_shot_per_generation() {
        let mut s = slot(0);
        assert!(!s.try_claim_ownership(), "no generation, nothing to claim");

        s.create(&TrackedArgs::default(), None).unwrap();
        assert!(s.try_claim_ownership());
        assert!(!s.try_claim_ownership());

        s.clear_ownership();
        assert!(s.try_claim_ownership());
    }

    #[test]
    fn test_release_detaches_on_last_holder() {
        let args = TrackedArgs::default();
        let mut s = slot(0);
        s.create(&args, None).unwrap();
        s.join();
        assert!(s.try_claim_ownership());

        assert!(s.release().is_none());
        assert!(s.is_active());
        assert!(s.ownership_claimed());

        let detached = s.release();
        assert!(detached.is_some());
        assert!(!s.is_active());
        assert!(!s.ownership_claimed());

        drop(detached);
        assert_eq!(args.stats.dropped(), 1);
    }

    #[test]
    fn test_release_on_empty_slot_is_noop() {
        let mut s = slot(0);
        assert!(s.release().is_none());
        assert_eq!(s.shared_count(), 0);
    }
}
