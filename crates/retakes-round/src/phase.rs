//! Round phase and administrative overrides.

use retakes_model::Bombsite;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RoundPhase
// ---------------------------------------------------------------------------

/// Where the server is in the round lifecycle.
///
/// ```text
/// Warmup ──start──→ RoundLive ──end──→ RoundOver ──start──→ RoundLive
///   ↑                                      │
///   └──────────start(warmup)───────────────┘
/// ```
///
/// - **Warmup**: the host's warmup period. No locks, no round number.
/// - **RoundLive**: a counted round is being played. Team locks apply.
/// - **RoundOver**: between the end of one round and the start of the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RoundPhase {
    #[default]
    Warmup,
    RoundLive,
    RoundOver,
}

impl RoundPhase {
    /// Returns `true` while a counted round is being played.
    pub fn is_live(self) -> bool {
        matches!(self, Self::RoundLive)
    }

    /// The phase a round-start callback moves to.
    pub fn on_start(self, is_warmup: bool) -> Self {
        if is_warmup {
            Self::Warmup
        } else {
            Self::RoundLive
        }
    }

    /// The phase a round-end callback moves to. Ending during warmup
    /// (the host restarting warmup rounds) stays in warmup.
    pub fn on_end(self) -> Self {
        match self {
            Self::Warmup => Self::Warmup,
            Self::RoundLive | Self::RoundOver => Self::RoundOver,
        }
    }
}

impl std::fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Warmup => write!(f, "Warmup"),
            Self::RoundLive => write!(f, "RoundLive"),
            Self::RoundOver => write!(f, "RoundOver"),
        }
    }
}

// ---------------------------------------------------------------------------
// Overrides
// ---------------------------------------------------------------------------

/// Administrative state set by operators. Round transitions never touch it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overrides {
    /// Play every round on this site until cleared.
    pub forced_bombsite: Option<Bombsite>,
    /// Force the optional extra scenario (e.g. smoke setups) on every round.
    pub forced_scenario: bool,
    /// Which site's spawns the editing view is showing. May be `Both`.
    pub showing_spawns_for: Option<Bombsite>,
    /// Reshuffle teams at the next prestart.
    pub scramble_next_round: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_on_start_follows_warmup_flag() {
        assert_eq!(RoundPhase::Warmup.on_start(false), RoundPhase::RoundLive);
        assert_eq!(RoundPhase::RoundOver.on_start(true), RoundPhase::Warmup);
        assert_eq!(RoundPhase::RoundOver.on_start(false), RoundPhase::RoundLive);
    }

    #[test]
    fn test_phase_on_end() {
        assert_eq!(RoundPhase::RoundLive.on_end(), RoundPhase::RoundOver);
        assert_eq!(RoundPhase::Warmup.on_end(), RoundPhase::Warmup);
    }

    #[test]
    fn test_phase_is_live() {
        assert!(RoundPhase::RoundLive.is_live());
        assert!(!RoundPhase::Warmup.is_live());
        assert!(!RoundPhase::RoundOver.is_live());
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(RoundPhase::RoundLive.to_string(), "RoundLive");
    }

    #[test]
    fn test_overrides_default_is_empty() {
        let o = Overrides::default();
        assert_eq!(o.forced_bombsite, None);
        assert!(!o.scramble_next_round);
    }
}
