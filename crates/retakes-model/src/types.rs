//! Core value types shared by every layer of the round core.
//!
//! Nothing here knows about rounds, queues, or spawn matching. These are the
//! nouns the other crates talk in: who a participant is, which side they play,
//! where a spawn point sits, and what a round looks like from the outside.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ModelError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Stable identity of a participant (the platform account id).
///
/// A newtype over `u64` so it can never be confused with a spawn id or a
/// connection slot. Serializes as the bare number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub u64);

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// Identity of a spawn point within one map's spawn file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpawnId(pub u32);

impl fmt::Display for SpawnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Sides and teams
// ---------------------------------------------------------------------------

/// One of the two playing sides.
///
/// Spawn files store sides as the engine's numeric team codes
/// (2 = attacker, 3 = defender), so serde goes through `u8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Side {
    Attacker,
    Defender,
}

impl Side {
    /// The other side.
    pub fn opposite(self) -> Self {
        match self {
            Self::Attacker => Self::Defender,
            Self::Defender => Self::Attacker,
        }
    }
}

impl TryFrom<u8> for Side {
    type Error = ModelError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            2 => Ok(Self::Attacker),
            3 => Ok(Self::Defender),
            other => Err(ModelError::UnknownTeam(other)),
        }
    }
}

impl From<Side> for u8 {
    fn from(side: Side) -> u8 {
        match side {
            Side::Attacker => 2,
            Side::Defender => 3,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attacker => write!(f, "Attacker"),
            Self::Defender => write!(f, "Defender"),
        }
    }
}

/// The team a connected participant is currently on, as the host reports it.
///
/// Unlike [`Side`] this includes the two non-playing states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Team {
    /// Connected but never picked a team.
    #[default]
    Unassigned,
    Spectator,
    Attacker,
    Defender,
}

impl Team {
    /// The playing side, if this team is one.
    pub fn side(self) -> Option<Side> {
        match self {
            Self::Attacker => Some(Side::Attacker),
            Self::Defender => Some(Side::Defender),
            Self::Unassigned | Self::Spectator => None,
        }
    }

    /// Returns `true` for attacker and defender.
    pub fn is_playing(self) -> bool {
        self.side().is_some()
    }
}

impl From<Side> for Team {
    fn from(side: Side) -> Self {
        match side {
            Side::Attacker => Self::Attacker,
            Side::Defender => Self::Defender,
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unassigned => write!(f, "Unassigned"),
            Self::Spectator => write!(f, "Spectator"),
            Self::Attacker => write!(f, "Attacker"),
            Self::Defender => write!(f, "Defender"),
        }
    }
}

// ---------------------------------------------------------------------------
// Bombsite
// ---------------------------------------------------------------------------

/// An objective zone.
///
/// `Both` exists only for the spawn editing view. Matching always runs
/// against a concrete site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Bombsite {
    A,
    B,
    Both,
}

impl Bombsite {
    /// Returns `true` for `A` and `B`.
    pub fn is_playable(self) -> bool {
        matches!(self, Self::A | Self::B)
    }
}

impl TryFrom<u8> for Bombsite {
    type Error = ModelError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::A),
            1 => Ok(Self::B),
            2 => Ok(Self::Both),
            other => Err(ModelError::UnknownBombsite(other)),
        }
    }
}

impl From<Bombsite> for u8 {
    fn from(site: Bombsite) -> u8 {
        match site {
            Bombsite::A => 0,
            Bombsite::B => 1,
            Bombsite::Both => 2,
        }
    }
}

impl fmt::Display for Bombsite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
            Self::Both => write!(f, "Both"),
        }
    }
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// A world-space position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// View orientation in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Angles {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

impl Angles {
    pub const fn new(pitch: f32, yaw: f32, roll: f32) -> Self {
        Self { pitch, yaw, roll }
    }
}

// ---------------------------------------------------------------------------
// SpawnPoint
// ---------------------------------------------------------------------------

/// A validated spawn point, ready for matching.
///
/// Produced from a [`SpawnRecord`](crate::SpawnRecord) once its text
/// coordinates have parsed. Matching code never sees unparsed data.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnPoint {
    pub id: SpawnId,
    pub position: Vector3,
    pub angles: Angles,
    pub side: Side,
    pub bombsite: Bombsite,
    /// Whether the designated planter may start here.
    pub can_be_planter: bool,
    /// Optional callout shown to players ("Pit", "Short", ...).
    pub name: Option<String>,
}

impl SpawnPoint {
    /// Label used in menus: `#4` or `#4 - Pit`.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("{} - {}", self.id, name),
            None => self.id.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Participants and rounds
// ---------------------------------------------------------------------------

/// Where a participant stands with respect to the active roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Membership {
    /// Counted against capacity and playing.
    Active,
    /// Waiting for a free slot.
    Queued,
    /// Neither active nor queued.
    Spectator,
}

/// A consolidated view of one participant across the round core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Participant {
    pub id: ParticipantId,
    pub membership: Membership,
    /// The side this participant is pinned to for the live round.
    pub locked_team: Option<Side>,
}

/// A read-only picture of the round lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSnapshot {
    pub round_number: u32,
    pub live: bool,
    pub forced_bombsite: Option<Bombsite>,
    pub scramble_next_round: bool,
    pub consecutive_wins: u32,
    pub last_winner: Option<Side>,
    pub pending_joiners: Vec<ParticipantId>,
    pub restart_queued_this_round: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_team_codes_match_engine() {
        assert_eq!(u8::from(Side::Attacker), 2);
        assert_eq!(u8::from(Side::Defender), 3);
        assert!(matches!(Side::try_from(1), Err(ModelError::UnknownTeam(1))));
    }

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Attacker.opposite(), Side::Defender);
        assert_eq!(Side::Defender.opposite(), Side::Attacker);
    }

    #[test]
    fn test_team_side_only_for_playing_teams() {
        assert_eq!(Team::Attacker.side(), Some(Side::Attacker));
        assert_eq!(Team::Spectator.side(), None);
        assert!(!Team::Unassigned.is_playing());
        assert_eq!(Team::from(Side::Defender), Team::Defender);
    }

    #[test]
    fn test_bombsite_both_is_not_playable() {
        assert!(Bombsite::A.is_playable());
        assert!(!Bombsite::Both.is_playable());
        assert!(matches!(
            Bombsite::try_from(7),
            Err(ModelError::UnknownBombsite(7))
        ));
    }

    #[test]
    fn test_spawn_label_includes_name() {
        let mut spawn = SpawnPoint {
            id: SpawnId(4),
            position: Vector3::default(),
            angles: Angles::default(),
            side: Side::Defender,
            bombsite: Bombsite::A,
            can_be_planter: false,
            name: None,
        };
        assert_eq!(spawn.label(), "#4");
        spawn.name = Some("Pit".into());
        assert_eq!(spawn.label(), "#4 - Pit");
    }

    #[test]
    fn test_display_impls() {
        assert_eq!(ParticipantId(42).to_string(), "P-42");
        assert_eq!(Bombsite::B.to_string(), "B");
        assert_eq!(Team::Spectator.to_string(), "Spectator");
    }
}
