//! Unified error type for the retakes facade.

use retakes_model::{HostError, ModelError};

/// Top-level error that wraps the errors of the layer crates.
///
/// Round-pipeline operations never return this: expected edge cases are
/// no-ops and host refusals are logged and worked around at the call site.
/// It only surfaces from configuration loading, map-file handling and the
/// runtime handle.
#[derive(Debug, thiserror::Error)]
pub enum RetakesError {
    /// Spawn-file or preference encoding failed.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// The host refused a command.
    #[error(transparent)]
    Host(#[from] HostError),

    /// The configuration document could not be parsed.
    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),

    /// The runtime task has stopped and can no longer take commands.
    #[error("retakes runtime is not running")]
    Unavailable,
}
