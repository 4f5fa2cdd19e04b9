//! Error types for the model layer.
//!
//! Only the map-file codec and the host contracts can fail. Everything else
//! in the round core treats odd input (unknown ids, repeated calls) as a
//! no-op rather than an error.

/// Errors produced while reading or writing spawn data.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Serializing a map config failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The map config document could not be parsed at all.
    ///
    /// A single bad spawn entry does not produce this error; those are
    /// dropped and counted by the loader instead.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A `"x y z"` triple had the wrong number of components or a
    /// component that is not a float.
    #[error("invalid triple {0:?}: {1}")]
    InvalidTriple(String, String),

    /// A numeric team code that is neither attacker (2) nor defender (3).
    #[error("unknown team code {0}")]
    UnknownTeam(u8),

    /// A numeric bombsite code outside A (0), B (1), Both (2).
    #[error("unknown bombsite code {0}")]
    UnknownBombsite(u8),
}

/// A command the host refused to carry out.
///
/// Returned by the fallible [`TeamEffector`](crate::TeamEffector) calls.
/// The orchestrator catches these at the call site and falls back; they
/// never abort the round pipeline.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The host rejected the command outright.
    #[error("host rejected {command}: {reason}")]
    Rejected {
        command: &'static str,
        reason: String,
    },
}
