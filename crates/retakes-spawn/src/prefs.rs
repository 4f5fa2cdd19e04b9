//! Spawn preferences.
//!
//! Each participant may store one favourite spawn per (side, site) pair and
//! may opt in to picking their defender spawn from a menu each round.
//! Persistence is external: [`MemoryPreferences`] serializes to JSON and a
//! storage layer decides where that goes.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use retakes_model::{Bombsite, ModelError, ParticipantId, Side, SpawnId};
use serde::{Deserialize, Serialize};

/// Lookup and update of per-participant spawn preferences.
pub trait PreferenceStore {
    /// The stored favourite spawn, if any. Always `None` for `Both`.
    fn preferred_spawn(&self, id: ParticipantId, side: Side, bombsite: Bombsite) -> Option<SpawnId>;

    /// Stores or clears (`None`) a favourite spawn. Ignored for `Both`.
    fn set_preferred_spawn(
        &mut self,
        id: ParticipantId,
        side: Side,
        bombsite: Bombsite,
        spawn: Option<SpawnId>,
    );

    /// Whether the participant picks their defender spawn interactively.
    fn wants_spawn_menu(&self, id: ParticipantId) -> bool;

    /// Flips the spawn-menu opt-in and returns the new value.
    fn toggle_spawn_menu(&mut self, id: ParticipantId) -> bool;

    /// Forgets a participant's cached preferences.
    fn clear(&mut self, id: ParticipantId);
}

/// One participant's stored preferences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceRecord {
    pub attacker_spawn_a: Option<SpawnId>,
    pub attacker_spawn_b: Option<SpawnId>,
    pub defender_spawn_a: Option<SpawnId>,
    pub defender_spawn_b: Option<SpawnId>,
    pub wants_spawn_menu: bool,
    /// Unix seconds of the last change.
    pub updated_at: i64,
}

impl PreferenceRecord {
    fn slot(&self, side: Side, bombsite: Bombsite) -> Option<SpawnId> {
        match (side, bombsite) {
            (Side::Attacker, Bombsite::A) => self.attacker_spawn_a,
            (Side::Attacker, Bombsite::B) => self.attacker_spawn_b,
            (Side::Defender, Bombsite::A) => self.defender_spawn_a,
            (Side::Defender, Bombsite::B) => self.defender_spawn_b,
            (_, Bombsite::Both) => None,
        }
    }

    fn slot_mut(&mut self, side: Side, bombsite: Bombsite) -> Option<&mut Option<SpawnId>> {
        match (side, bombsite) {
            (Side::Attacker, Bombsite::A) => Some(&mut self.attacker_spawn_a),
            (Side::Attacker, Bombsite::B) => Some(&mut self.attacker_spawn_b),
            (Side::Defender, Bombsite::A) => Some(&mut self.defender_spawn_a),
            (Side::Defender, Bombsite::B) => Some(&mut self.defender_spawn_b),
            (_, Bombsite::Both) => None,
        }
    }

    fn touch(&mut self) {
        self.updated_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs() as i64);
    }
}

/// In-memory [`PreferenceStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryPreferences {
    records: HashMap<ParticipantId, PreferenceRecord>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, id: ParticipantId) -> Option<&PreferenceRecord> {
        self.records.get(&id)
    }

    /// Installs a record loaded from storage, replacing any cached one.
    pub fn insert(&mut self, id: ParticipantId, record: PreferenceRecord) {
        self.records.insert(id, record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Serializes every cached record.
    ///
    /// # Errors
    /// Returns `ModelError::Encode` if serialization fails.
    pub fn to_json(&self) -> Result<String, ModelError> {
        serde_json::to_string_pretty(self).map_err(ModelError::Encode)
    }

    /// Restores records written by [`to_json`](Self::to_json).
    ///
    /// # Errors
    /// Returns `ModelError::Decode` if the document is not valid.
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        serde_json::from_str(json).map_err(ModelError::Decode)
    }
}

impl PreferenceStore for MemoryPreferences {
    fn preferred_spawn(&self, id: ParticipantId, side: Side, bombsite: Bombsite) -> Option<SpawnId> {
        self.records.get(&id)?.slot(side, bombsite)
    }

    fn set_preferred_spawn(
        &mut self,
        id: ParticipantId,
        side: Side,
        bombsite: Bombsite,
        spawn: Option<SpawnId>,
    ) {
        if !bombsite.is_playable() {
            return;
        }
        let record = self.records.entry(id).or_default();
        if let Some(slot) = record.slot_mut(side, bombsite) {
            *slot = spawn;
        }
        record.touch();
    }

    fn wants_spawn_menu(&self, id: ParticipantId) -> bool {
        self.records.get(&id).is_some_and(|r| r.wants_spawn_menu)
    }

    fn toggle_spawn_menu(&mut self, id: ParticipantId) -> bool {
        let record = self.records.entry(id).or_default();
        record.wants_spawn_menu = !record.wants_spawn_menu;
        record.touch();
        record.wants_spawn_menu
    }

    fn clear(&mut self, id: ParticipantId) {
        self.records.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const P: ParticipantId = ParticipantId(76561198000000001);

    #[test]
    fn test_set_then_get_preferred_spawn() {
        let mut prefs = MemoryPreferences::new();
        prefs.set_preferred_spawn(P, Side::Defender, Bombsite::A, Some(SpawnId(5)));

        assert_eq!(prefs.preferred_spawn(P, Side::Defender, Bombsite::A), Some(SpawnId(5)));
        assert_eq!(prefs.preferred_spawn(P, Side::Defender, Bombsite::B), None);
        assert_eq!(prefs.preferred_spawn(P, Side::Attacker, Bombsite::A), None);
        assert!(prefs.record(P).is_some_and(|r| r.updated_at > 0));
    }

    #[test]
    fn test_set_none_clears_preference() {
        let mut prefs = MemoryPreferences::new();
        prefs.set_preferred_spawn(P, Side::Defender, Bombsite::A, Some(SpawnId(5)));
        prefs.set_preferred_spawn(P, Side::Defender, Bombsite::A, None);

        assert_eq!(prefs.preferred_spawn(P, Side::Defender, Bombsite::A), None);
    }

    #[test]
    fn test_both_bombsite_is_ignored() {
        let mut prefs = MemoryPreferences::new();
        prefs.set_preferred_spawn(P, Side::Attacker, Bombsite::Both, Some(SpawnId(1)));

        assert!(prefs.is_empty());
        assert_eq!(prefs.preferred_spawn(P, Side::Attacker, Bombsite::Both), None);
    }

    #[test]
    fn test_toggle_spawn_menu() {
        let mut prefs = MemoryPreferences::new();
        assert!(!prefs.wants_spawn_menu(P));
        assert!(prefs.toggle_spawn_menu(P));
        assert!(prefs.wants_spawn_menu(P));
        assert!(!prefs.toggle_spawn_menu(P));
    }

    #[test]
    fn test_clear_forgets_participant() {
        let mut prefs = MemoryPreferences::new();
        prefs.toggle_spawn_menu(P);
        prefs.clear(P);
        prefs.clear(P);
        assert!(!prefs.wants_spawn_menu(P));
    }

    #[test]
    fn test_json_round_trip_keeps_records() {
        let mut prefs = MemoryPreferences::new();
        prefs.set_preferred_spawn(P, Side::Attacker, Bombsite::B, Some(SpawnId(12)));

        let json = prefs.to_json().unwrap();
        assert!(json.contains("attackerSpawnB"));
        let restored = MemoryPreferences::from_json(&json).unwrap();
        assert_eq!(restored, prefs);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(matches!(
            MemoryPreferences::from_json("[1, 2"),
            Err(ModelError::Decode(_))
        ));
    }
}
