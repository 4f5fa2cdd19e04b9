//! Queue configuration.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Settings for the active roster and its waiting queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// When off, the orchestrator skips reconciliation and admission.
    pub enabled: bool,

    /// Capacity of the active roster.
    pub max_players: usize,

    /// Reject mid-round moves to a side the participant did not start on.
    pub prevent_team_changes_mid_round: bool,

    /// Split 50/50 when the active count is a multiple of 10.
    pub force_even_when_multiple_of_10: bool,

    /// Any of these permissions lets a queued participant bump someone.
    pub priority_flags: Vec<String>,

    /// Any of these permissions protects an active participant from being
    /// bumped. Empty means "same as `priority_flags`".
    pub immunity_flags: Vec<String>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_players: 9,
            prevent_team_changes_mid_round: true,
            force_even_when_multiple_of_10: true,
            priority_flags: vec!["retakes.vip".to_string()],
            immunity_flags: Vec::new(),
        }
    }
}

impl QueueConfig {
    /// Returns a copy with out-of-range values corrected.
    ///
    /// Flags are trimmed and blank entries dropped. A capacity of zero
    /// becomes one.
    pub fn validated(mut self) -> Self {
        if self.max_players == 0 {
            warn!("queue.max_players must be at least 1, using 1");
            self.max_players = 1;
        }
        self.priority_flags = clean_flags(self.priority_flags);
        self.immunity_flags = clean_flags(self.immunity_flags);
        self
    }

    /// The flags that grant immunity, after the empty-list fallback.
    pub fn effective_immunity_flags(&self) -> &[String] {
        if self.immunity_flags.is_empty() {
            &self.priority_flags
        } else {
            &self.immunity_flags
        }
    }
}

fn clean_flags(flags: Vec<String>) -> Vec<String> {
    flags
        .into_iter()
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_config_default() {
        let config = QueueConfig::default();
        assert!(config.enabled);
        assert_eq!(config.max_players, 9);
        assert!(config.prevent_team_changes_mid_round);
        assert_eq!(config.priority_flags, vec!["retakes.vip"]);
        assert!(config.immunity_flags.is_empty());
    }

    #[test]
    fn test_validated_clamps_capacity_and_cleans_flags() {
        let config = QueueConfig {
            max_players: 0,
            priority_flags: vec!["  vip ".into(), "".into(), "   ".into()],
            ..QueueConfig::default()
        }
        .validated();
        assert_eq!(config.max_players, 1);
        assert_eq!(config.priority_flags, vec!["vip"]);
    }

    #[test]
    fn test_empty_immunity_falls_back_to_priority() {
        let config = QueueConfig::default();
        assert_eq!(config.effective_immunity_flags(), &["retakes.vip".to_string()]);

        let config = QueueConfig {
            immunity_flags: vec!["admin".into()],
            ..QueueConfig::default()
        };
        assert_eq!(config.effective_immunity_flags(), &["admin".to_string()]);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: QueueConfig = serde_json::from_str(r#"{ "max_players": 4 }"#).unwrap();
        assert_eq!(config.max_players, 4);
        assert!(config.enabled);
    }
}
