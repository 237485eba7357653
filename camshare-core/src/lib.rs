//! Camshare Core - Shared Exclusive-Resource Lifecycle Manager
//!
//! Lets many independent request handlers share one expensive, stateful,
//! non-cloneable resource (a capture device, say) under a capacity cap:
//! creation on first use, cooperative refresh driven by exactly one owner,
//! reference-counted teardown and a grace period against reconnect churn.
//!
//! # Building Blocks:
//! - [`share::OwnershipSlot`]: one generation plus its counters
//! - [`share::SharedResource`]: thread-safe create/join/refresh/release
//! - [`share::Lease`]: the caller-side round trip as an RAII value
//! - [`share::KeepWarmDriver`]: background refresh with no viewers attached

pub mod config;
pub mod error;
pub mod metrics;
pub mod resource;
pub mod share;

pub use config::ShareConfig;
pub use error::{ConfigError, ShareError};
pub use metrics::{MetricsSnapshot, ShareMetrics};
pub use resource::camera::{CameraArgs, SimulatedCamera};
pub use resource::ManagedResource;
pub use share::{AcquireStatus, KeepWarmDriver, Lease, Ownership, SharedResource};

use tracing::info;
use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber, honouring `RUST_LOG` (default `info`).
///
/// Returns `false` if a global subscriber was already installed, in which
/// case that one stays in place.
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok();
    if installed {
        info!("Initializing camshare v{}", env!("CARGO_PKG_VERSION"));
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_twice() {
        init_tracing();
        assert!(!init_tracing());
    }
}
