//! Server configuration.
//!
//! Every section has sensible defaults, so an empty document (`{}`) is a
//! valid configuration. Values outside their range are corrected by
//! [`RetakesConfig::validated`], which logs a warning for each correction.

use retakes_model::LogConfig;
use retakes_queue::QueueConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::RetakesError;

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Team size balancing and scrambling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamBalanceConfig {
    /// Move players between sides at prestart to reach the target split.
    pub enabled: bool,

    /// Share of players that should attack, in `0.0..=1.0`.
    pub attacker_ratio: f64,

    /// Split 50/50 when the player count is a multiple of 10.
    pub force_even_when_multiple_of_10: bool,

    /// Reshuffle teams after a run of attacker wins.
    pub scramble_enabled: bool,

    /// Consecutive attacker wins that trigger a scramble, in `1..=100`.
    pub rounds_to_scramble: u32,
}

impl Default for TeamBalanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            attacker_ratio: 0.45,
            force_even_when_multiple_of_10: true,
            scramble_enabled: true,
            rounds_to_scramble: 5,
        }
    }
}

/// Bomb handling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BombConfig {
    /// The bomb is planted for the attackers at freeze end; the planter
    /// does not need to stand on a planter spawn.
    pub auto_plant: bool,
}

impl Default for BombConfig {
    fn default() -> Self {
        Self { auto_plant: true }
    }
}

/// Process-level switches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Emit per-call `debug` events from every component.
    pub debug_enabled: bool,
}

// ---------------------------------------------------------------------------
// RetakesConfig
// ---------------------------------------------------------------------------

/// The complete configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetakesConfig {
    pub queue: QueueConfig,
    pub team_balance: TeamBalanceConfig,
    pub bomb: BombConfig,
    pub server: ServerConfig,
}

impl RetakesConfig {
    /// Parses a JSON document and validates it.
    ///
    /// # Errors
    /// Returns [`RetakesError::Config`] if the document is not valid JSON
    /// or a field has the wrong type.
    pub fn from_json(json: &str) -> Result<Self, RetakesError> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config.validated())
    }

    /// Returns a copy with out-of-range values corrected.
    pub fn validated(mut self) -> Self {
        self.queue = self.queue.validated();

        let balance = &mut self.team_balance;
        if !balance.attacker_ratio.is_finite() {
            warn!(
                ratio = balance.attacker_ratio,
                "team_balance.attacker_ratio is not a number, using 0.45"
            );
            balance.attacker_ratio = 0.45;
        } else if !(0.0..=1.0).contains(&balance.attacker_ratio) {
            let clamped = balance.attacker_ratio.clamp(0.0, 1.0);
            warn!(
                ratio = balance.attacker_ratio,
                clamped, "team_balance.attacker_ratio out of range"
            );
            balance.attacker_ratio = clamped;
        }

        if !(1..=100).contains(&balance.rounds_to_scramble) {
            let clamped = balance.rounds_to_scramble.clamp(1, 100);
            warn!(
                rounds = balance.rounds_to_scramble,
                clamped, "team_balance.rounds_to_scramble out of range"
            );
            balance.rounds_to_scramble = clamped;
        }

        self
    }

    /// The log settings handed to every component.
    pub fn log(&self) -> LogConfig {
        LogConfig {
            debug: self.server.debug_enabled,
        }
    }
}
