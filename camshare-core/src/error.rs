//! Error types for the sharing layer.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by [`SharedResource`](crate::share::SharedResource) and
/// the caller-side helpers built on it.
#[derive(Debug, Error)]
pub enum ShareError {
    /// The managed resource could not be constructed.  The slot is left
    /// empty and no other caller is affected.
    #[error("resource unavailable: {source}")]
    ConstructionFailed {
        /// The resource's own construction error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// Every share of the active generation is taken ("service busy").
    #[error("resource busy: sharing capacity reached")]
    CapacityReached,

    /// An unconditional create was attempted while a generation is live.
    #[error("a generation is already active")]
    AlreadyActive,

    /// Keep-warm was requested while a pin already holds the generation.
    #[error("generation is already kept warm")]
    AlreadyPinned,

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ShareError {
    pub(crate) fn construction<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ConstructionFailed {
            source: Box::new(source),
        }
    }

    /// `true` for the "service busy" condition.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::CapacityReached)
    }

    /// `true` for the "service unavailable" condition.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::ConstructionFailed { .. })
    }
}

/// Errors raised while loading a [`ShareConfig`](crate::config::ShareConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}
