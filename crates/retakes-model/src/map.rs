//! Spawn file records and the codec that reads and writes them.
//!
//! A map's spawn file is a JSON document owned by the operator. Positions
//! and angles are stored as `"x y z"` strings so they can be pasted straight
//! out of the game console. Parsing those strings is where malformed data
//! shows up, so the codec decodes each entry independently: one broken entry
//! is counted and skipped instead of failing the whole map.

use serde::{Deserialize, Serialize};

use crate::{Angles, Bombsite, ModelError, Side, SpawnId, SpawnPoint, Vector3};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One spawn entry exactly as stored in the spawn file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnRecord {
    pub id: u32,
    /// Position as `"x y z"`.
    pub vector: String,
    /// Orientation as `"pitch yaw roll"`.
    pub q_angle: String,
    pub team: Side,
    pub bombsite: Bombsite,
    #[serde(default)]
    pub can_be_planter: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl SpawnRecord {
    /// Parses the text coordinates into a [`SpawnPoint`].
    ///
    /// # Errors
    /// Returns [`ModelError::InvalidTriple`] if either coordinate string is
    /// not exactly three floats.
    pub fn to_spawn_point(&self) -> Result<SpawnPoint, ModelError> {
        let [x, y, z] = parse_triple(&self.vector)?;
        let [pitch, yaw, roll] = parse_triple(&self.q_angle)?;
        Ok(SpawnPoint {
            id: SpawnId(self.id),
            position: Vector3::new(x, y, z),
            angles: Angles::new(pitch, yaw, roll),
            side: self.team,
            bombsite: self.bombsite,
            can_be_planter: self.can_be_planter,
            name: self.name.clone(),
        })
    }
}

impl From<&SpawnPoint> for SpawnRecord {
    fn from(spawn: &SpawnPoint) -> Self {
        let p = spawn.position;
        let a = spawn.angles;
        Self {
            id: spawn.id.0,
            vector: format!("{} {} {}", p.x, p.y, p.z),
            q_angle: format!("{} {} {}", a.pitch, a.yaw, a.roll),
            team: spawn.side,
            bombsite: spawn.bombsite,
            can_be_planter: spawn.can_be_planter,
            name: spawn.name.clone(),
        }
    }
}

/// The whole spawn file for one map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapConfig {
    #[serde(default)]
    pub spawns: Vec<SpawnRecord>,
}

/// Result of decoding a spawn file leniently.
#[derive(Debug, Clone, Default)]
pub struct DecodedMap {
    /// Entries that deserialized cleanly.
    pub records: Vec<SpawnRecord>,
    /// Entries that were skipped because a field had the wrong shape
    /// (missing id, unknown team code, ...).
    pub malformed: usize,
}

/// Parses `"x y z"` (commas tolerated) into three floats.
///
/// # Errors
/// Returns [`ModelError::InvalidTriple`] for an empty string, a component
/// count other than three, or a component that is not a finite float.
pub fn parse_triple(text: &str) -> Result<[f32; 3], ModelError> {
    let cleaned = text.replace(',', "");
    let parts: Vec<&str> = cleaned.split_whitespace().collect();
    if parts.len() != 3 {
        return Err(ModelError::InvalidTriple(
            text.to_string(),
            format!("expected 3 components, got {}", parts.len()),
        ));
    }

    let mut out = [0.0f32; 3];
    for (slot, part) in out.iter_mut().zip(&parts) {
        *slot = part.parse::<f32>().map_err(|e| {
            ModelError::InvalidTriple(text.to_string(), e.to_string())
        })?;
        if !slot.is_finite() {
            return Err(ModelError::InvalidTriple(
                text.to_string(),
                format!("{part} is not a finite number"),
            ));
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// Converts a spawn file between bytes and records.
///
/// Decoding is lenient per entry (see [`DecodedMap`]); only a document
/// that is not valid at the top level is an error.
pub trait MapCodec: Send + Sync + 'static {
    /// Serializes a map config.
    ///
    /// # Errors
    /// Returns `ModelError::Encode` if serialization fails.
    fn encode(&self, config: &MapConfig) -> Result<Vec<u8>, ModelError>;

    /// Deserializes a map config, skipping malformed entries.
    ///
    /// # Errors
    /// Returns `ModelError::Decode` if the document itself is unreadable.
    fn decode(&self, data: &[u8]) -> Result<DecodedMap, ModelError>;
}

/// A [`MapCodec`] for the pretty-printed JSON spawn files.
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMapCodec;

#[cfg(feature = "json")]
impl MapCodec for JsonMapCodec {
    fn encode(&self, config: &MapConfig) -> Result<Vec<u8>, ModelError> {
        serde_json::to_vec_pretty(config).map_err(ModelError::Encode)
    }

    fn decode(&self, data: &[u8]) -> Result<DecodedMap, ModelError> {
        #[derive(Deserialize)]
        struct RawMap {
            #[serde(default)]
            spawns: Vec<serde_json::Value>,
        }

        let raw: RawMap = serde_json::from_slice(data).map_err(ModelError::Decode)?;

        let mut decoded = DecodedMap::default();
        for value in raw.spawns {
            match serde_json::from_value::<SpawnRecord>(value) {
                Ok(record) => decoded.records.push(record),
                Err(e) => {
                    tracing::debug!(error = %e, "skipping malformed spawn entry");
                    decoded.malformed += 1;
                }
            }
        }
        Ok(decoded)
    }
}
