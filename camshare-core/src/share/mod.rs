//! Share module - Exclusive resource sharing
//!
//! This module contains the concurrency primitive at the heart of camshare:
//! an ownership slot holding one generation of an expensive resource, the
//! thread-safe manager around it, and the caller-side helpers built on top.

pub mod keep_warm;
pub mod lease;
pub mod manager;
pub mod slot;
pub mod stream;

pub use keep_warm::KeepWarmDriver;
pub use lease::Lease;
pub use manager::{AcquireStatus, Ownership, SharedResource};
pub use slot::{OwnershipSlot, PostCreateHook};
pub use stream::{stream_frames, FrameSink, StreamEnd, StreamReport};
