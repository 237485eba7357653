//! Managed Resource - Capability Contract
//!
//! Anything shared through a [`SharedResource`](crate::share::SharedResource)
//! must be constructible from a fixed argument set (which may fail, e.g. a
//! capture device that is already busy) and must expose a cheap, repeatable
//! no-argument refresh.  Everything else a resource offers is reached through
//! the manager's accessors and is opaque to it.
//!
//! # Implementations:
//! - [`camera::SimulatedCamera`]: in-process capture device used by the demo
//! - `testing::Tracked`: counting double for lifecycle assertions, built for
//!   tests or with the `testing` feature

pub mod camera;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// The contract a shared resource type must satisfy.
///
/// A value is constructed once per generation, never cloned, and dropped
/// exactly once when the last holder releases it.
pub trait ManagedResource: Send + 'static {
    /// Constructor arguments (e.g. a device index).
    type Args: Send + Sync;

    /// Why construction failed.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Construct a new instance.
    fn open(args: &Self::Args) -> Result<Self, Self::Error>
    where
        Self: Sized;

    /// Advance the resource by one unit of work (e.g. capture one frame).
    ///
    /// Called with the manager lock held, so it should be fast relative to
    /// the polling interval of the callers.
    fn refresh(&mut self);
}
