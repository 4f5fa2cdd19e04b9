//! The spawn points of the loaded map.

use std::collections::HashSet;

use retakes_model::{
    Angles, Bombsite, DecodedMap, LogConfig, MapConfig, Side, SpawnId, SpawnPoint, SpawnRecord,
    Vector3,
};
use tracing::{debug, info, warn};

/// What happened while loading a spawn file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Spawns now available for matching.
    pub loaded: usize,
    /// Entries whose vector or angle text did not parse, or whose bombsite
    /// is not a playable site.
    pub invalid: usize,
    /// Entries at the same side, bombsite and position (to 2 decimals) as
    /// an earlier one.
    pub duplicates: usize,
    /// Entries the codec could not decode at all.
    pub malformed: usize,
}

impl LoadReport {
    /// Total entries that were dropped.
    pub fn dropped(&self) -> usize {
        self.invalid + self.duplicates + self.malformed
    }
}

/// A spawn point being added from the editor.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSpawn {
    pub position: Vector3,
    pub angles: Angles,
    pub side: Side,
    pub bombsite: Bombsite,
    pub can_be_planter: bool,
}

/// Validated spawn points for one map.
///
/// Only parsed, de-duplicated spawns on a playable site are kept, so
/// matching never sees malformed data.
pub struct SpawnPool {
    spawns: Vec<SpawnPoint>,
    log: LogConfig,
}

impl SpawnPool {
    pub fn new(log: LogConfig) -> Self {
        Self {
            spawns: Vec::new(),
            log,
        }
    }

    /// Replaces the pool with the entries of a decoded spawn file.
    pub fn load(&mut self, decoded: DecodedMap) -> LoadReport {
        let mut report = self.load_records(&decoded.records);
        report.malformed = decoded.malformed;

        if report.malformed > 0 {
            warn!(count = report.malformed, "dropped malformed spawn entries");
        }
        report
    }

    /// Replaces the pool with the entries of an in-memory map config.
    pub fn load_config(&mut self, config: &MapConfig) -> LoadReport {
        self.load_records(&config.spawns)
    }

    fn load_records(&mut self, records: &[SpawnRecord]) -> LoadReport {
        self.spawns.clear();
        let mut report = LoadReport::default();
        let mut seen = HashSet::new();

        for record in records {
            let spawn = match record.to_spawn_point() {
                Ok(spawn) if spawn.bombsite.is_playable() => spawn,
                Ok(_) => {
                    report.invalid += 1;
                    continue;
                }
                Err(e) => {
                    if self.log.debug {
                        debug!(id = record.id, error = %e, "invalid spawn entry");
                    }
                    report.invalid += 1;
                    continue;
                }
            };

            if !seen.insert(dedupe_key(&spawn)) {
                report.duplicates += 1;
                continue;
            }
            self.spawns.push(spawn);
        }

        report.loaded = self.spawns.len();

        if report.duplicates > 0 {
            warn!(
                count = report.duplicates,
                "removed duplicate spawns (same team/bombsite/position)"
            );
        }
        if report.invalid > 0 {
            warn!(count = report.invalid, "removed invalid spawns (bad vector/angle/bombsite)");
        }
        info!(loaded = report.loaded, "spawns loaded");
        report
    }

    // -- Queries ----------------------------------------------------------

    /// Spawns for one side at a site, in id order. `Both` returns the
    /// spawns of both sites, for the editing view.
    pub fn spawns_for(&self, bombsite: Bombsite, side: Side) -> Vec<&SpawnPoint> {
        let mut out: Vec<&SpawnPoint> = self
            .spawns
            .iter()
            .filter(|s| s.side == side)
            .filter(|s| bombsite == Bombsite::Both || s.bombsite == bombsite)
            .collect();
        out.sort_by_key(|s| s.id);
        out
    }

    pub fn get(&self, id: SpawnId) -> Option<&SpawnPoint> {
        self.spawns.iter().find(|s| s.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SpawnPoint> {
        self.spawns.iter()
    }

    pub fn len(&self) -> usize {
        self.spawns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spawns.is_empty()
    }

    // -- Editing ----------------------------------------------------------

    /// Adds a spawn and returns its id, one past the highest existing id.
    pub fn add_spawn(&mut self, new: NewSpawn) -> SpawnId {
        let id = SpawnId(self.spawns.iter().map(|s| s.id.0).max().unwrap_or(0) + 1);
        self.spawns.push(SpawnPoint {
            id,
            position: new.position,
            angles: new.angles,
            side: new.side,
            bombsite: new.bombsite,
            can_be_planter: new.can_be_planter,
            name: None,
        });
        info!(%id, side = %new.side, bombsite = %new.bombsite, "spawn added");
        id
    }

    /// Removes a spawn. Returns `false` if the id is unknown.
    pub fn remove_spawn(&mut self, id: SpawnId) -> bool {
        let before = self.spawns.len();
        self.spawns.retain(|s| s.id != id);
        let removed = self.spawns.len() != before;
        if removed {
            info!(%id, "spawn removed");
        }
        removed
    }

    /// Sets or clears a spawn's callout name. A blank name clears it.
    /// Returns `false` if the id is unknown.
    pub fn set_spawn_name(&mut self, id: SpawnId, name: Option<&str>) -> bool {
        let Some(spawn) = self.spawns.iter_mut().find(|s| s.id == id) else {
            return false;
        };
        spawn.name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        true
    }

    /// The pool as a spawn file document, in id order.
    pub fn to_map_config(&self) -> MapConfig {
        let mut spawns: Vec<SpawnRecord> = self.spawns.iter().map(SpawnRecord::from).collect();
        spawns.sort_by_key(|r| r.id);
        MapConfig { spawns }
    }

    /// Empties the pool (map change).
    pub fn clear(&mut self) {
        self.spawns.clear();
    }
}

impl Default for SpawnPool {
    fn default() -> Self {
        Self::new(LogConfig::default())
    }
}

fn dedupe_key(spawn: &SpawnPoint) -> (u8, u8, i64, i64, i64) {
    let r = |v: f32| (f64::from(v) * 100.0).round() as i64;
    let p = spawn.position;
    (
        spawn.side.into(),
        spawn.bombsite.into(),
        r(p.x),
        r(p.y),
        r(p.z),
    )
}
