//! Narrow contracts the round core consumes from the game host.
//!
//! The core computes decisions; the host applies them. Each trait covers one
//! concern so a component only asks for what it touches. A real host adapter
//! usually implements all of them on one type, which picks up [`Host`]
//! through the blanket impl.

use crate::{Angles, Bombsite, HostError, ParticipantId, Side, SpawnPoint, Team, Vector3};

/// A connected participant as the host sees it right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivePlayer {
    pub id: ParticipantId,
    pub team: Team,
    /// Has a living, controllable avatar.
    pub alive: bool,
    /// An avatar entity exists (alive or not). Deferred actions wait on this.
    pub has_avatar: bool,
}

/// Read access to the connected population.
pub trait LiveRoster {
    /// Every connected participant.
    fn players(&self) -> Vec<LivePlayer>;

    /// Whether the host is in its warmup period.
    fn is_warmup(&self) -> bool;

    /// Looks up one connected participant.
    fn player(&self, id: ParticipantId) -> Option<LivePlayer> {
        self.players().into_iter().find(|p| p.id == id)
    }
}

/// Permission flags, used only for queue priority and immunity.
pub trait PermissionLookup {
    fn has_permission(&self, id: ParticipantId, flag: &str) -> bool;
}

/// A user-visible message. Rendering and localization are up to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Placed in the waiting queue.
    QueueAdded,
    /// Still waiting; the active roster is full.
    QueueWaiting { active: usize, capacity: usize },
    /// Bumped to the queue by a priority participant.
    MovedOut { by: ParticipantId },
    /// Promoted into the roster, replacing someone.
    MovedIn { replaced: ParticipantId },
    /// Joined mid-round; held as spectator until the round ends.
    HeldUntilRoundEnd,
    /// A side won the round.
    TeamWin { side: Side, streak: u32 },
    /// The planter's spawn has a callout name.
    PlantSite { bombsite: Bombsite, name: String },
}

/// Team and round commands.
pub trait TeamEffector {
    /// Moves a participant to a team. A no-op for unknown participants.
    fn change_team(&mut self, id: ParticipantId, team: Team);

    /// Kills the participant's avatar without awarding anyone.
    fn eliminate(&mut self, id: ParticipantId);

    /// Ends the live round immediately with the given winner.
    ///
    /// # Errors
    /// The host may refuse, e.g. while its game rules are not loaded.
    fn terminate_round(&mut self, winner: Side) -> Result<(), HostError>;

    /// Shows a message to one participant.
    fn notify(&mut self, id: ParticipantId, notice: Notice);

    /// Restarts the game (used once per round for the 1v0 case).
    fn restart_game(&mut self);
}

/// Spawn placement commands.
pub trait SpawnEffector {
    /// Places a participant's avatar.
    fn teleport(&mut self, id: ParticipantId, position: Vector3, angles: Angles);

    /// Opens the interactive spawn selection for one participant.
    fn open_spawn_menu(&mut self, id: ParticipantId, bombsite: Bombsite, options: &[SpawnPoint]);
}

/// Everything the orchestrator needs from the host.
pub trait Host: LiveRoster + PermissionLookup + TeamEffector + SpawnEffector {}

impl<T> Host for T where T: LiveRoster + PermissionLookup + TeamEffector + SpawnEffector {}
