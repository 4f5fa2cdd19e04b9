//! Per-component log settings.

use serde::{Deserialize, Serialize};

/// Gates the verbose `debug!` output of a component.
///
/// Each component receives its own copy at construction time instead of
/// reading a process-wide switch. Lifecycle, warning and error events are
/// always emitted; only per-call detail is gated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    pub debug: bool,
}

impl LogConfig {
    pub const fn verbose() -> Self {
        Self { debug: true }
    }
}
