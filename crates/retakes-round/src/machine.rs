//! The round state machine.

use std::collections::HashMap;

use retakes_model::{
    Bombsite, EventBus, EventKind, LogConfig, ParticipantId, RoundSnapshot, Side, Subscriptions,
    Team,
};
use tracing::{debug, info};

use crate::{Overrides, RoundPhase};

/// What the host reports when a round ends.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoundOutcome {
    /// `None` for a draw or an aborted round.
    pub winner: Option<Side>,
    /// Host-specific end reason code.
    pub reason: u8,
    pub message: String,
}

impl RoundOutcome {
    pub fn won_by(side: Side) -> Self {
        Self {
            winner: Some(side),
            ..Self::default()
        }
    }
}

/// Lifecycle state for the whole server.
///
/// All operations are infallible in-memory updates. Unknown participant ids
/// are ignored, and repeating an operation is harmless.
///
/// ## Invariants
///
/// - Locks exist only for participants snapshotted by
///   [`set_round_participants`](Self::set_round_participants) and only for
///   playing sides.
/// - Locks are cleared at every round end and every warmup start.
/// - The bypass depth never goes below zero and is reset at round end.
pub struct RoundStateMachine {
    phase: RoundPhase,
    round_number: u32,
    restart_queued: bool,

    /// Round participants and the side each is locked to. Participants that
    /// were not on a playing side at snapshot time map to `None`.
    seats: HashMap<ParticipantId, Option<Side>>,

    /// Late joiners held until round end, in arrival order.
    pending_joiners: Vec<ParticipantId>,

    bypass_depth: u32,

    last_winner: Option<Side>,
    last_win_reason: u8,
    last_win_message: String,
    attacker_wins: u32,
    defender_wins: u32,
    consecutive_wins: u32,

    overrides: Overrides,
    log: LogConfig,
    subscriptions: Subscriptions,
}

impl RoundStateMachine {
    pub fn new(log: LogConfig) -> Self {
        Self {
            phase: RoundPhase::Warmup,
            round_number: 0,
            restart_queued: false,
            seats: HashMap::new(),
            pending_joiners: Vec::new(),
            bypass_depth: 0,
            last_winner: None,
            last_win_reason: 0,
            last_win_message: String::new(),
            attacker_wins: 0,
            defender_wins: 0,
            consecutive_wins: 0,
            overrides: Overrides::default(),
            log,
            subscriptions: Subscriptions::new(),
        }
    }

    // -- Subscriptions ----------------------------------------------------

    /// Host events that drive the lifecycle, locks and late joiners.
    pub const EVENTS: &'static [EventKind] = &[
        EventKind::RoundStart,
        EventKind::RoundEnd,
        EventKind::TeamChangeRequest,
        EventKind::AvatarSpawned,
        EventKind::Disconnected,
    ];

    /// Subscribes to [`EVENTS`](Self::EVENTS). Repeated calls do nothing.
    pub fn start<B: EventBus + ?Sized>(&mut self, bus: &mut B) {
        self.subscriptions.start(bus, Self::EVENTS);
    }

    /// Releases the subscriptions taken in [`start`](Self::start).
    pub fn stop<B: EventBus + ?Sized>(&mut self, bus: &mut B) {
        self.subscriptions.stop(bus);
    }

    pub fn is_started(&self) -> bool {
        self.subscriptions.is_active()
    }

    // -- Lifecycle --------------------------------------------------------

    /// Forgets the whole match: counters, streaks, locks, joiners.
    /// The scramble flag and the forced scenario are cleared; a forced
    /// bombsite and the spawn-edit view survive.
    pub fn reset_match(&mut self) {
        self.phase = RoundPhase::Warmup;
        self.round_number = 0;
        self.restart_queued = false;
        self.seats.clear();
        self.pending_joiners.clear();
        self.bypass_depth = 0;
        self.last_winner = None;
        self.last_win_reason = 0;
        self.last_win_message.clear();
        self.attacker_wins = 0;
        self.defender_wins = 0;
        self.consecutive_wins = 0;
        self.overrides.scramble_next_round = false;
        self.overrides.forced_scenario = false;
        info!("match state reset");
    }

    /// Handles the host's round-start callback.
    ///
    /// A warmup start clears participants and locks and leaves the round
    /// number alone. A real start counts the round and makes it live.
    pub fn on_round_start(&mut self, is_warmup: bool) {
        self.phase = self.phase.on_start(is_warmup);
        self.restart_queued = false;

        if is_warmup {
            self.seats.clear();
            if self.log.debug {
                debug!("warmup round started, locks cleared");
            }
            return;
        }

        self.round_number += 1;
        info!(round = self.round_number, "round live");
    }

    /// Replaces the round's participants and their locks in one step.
    ///
    /// Called once per round after teams are final. Participants on a
    /// non-playing team are recorded without a lock.
    pub fn set_round_participants<I>(&mut self, participants: I)
    where
        I: IntoIterator<Item = (ParticipantId, Team)>,
    {
        self.seats.clear();
        for (id, team) in participants {
            self.seats.insert(id, team.side());
        }

        if self.log.debug {
            let locked = self.seats.values().filter(|s| s.is_some()).count();
            debug!(
                round = self.round_number,
                participants = self.seats.len(),
                locked,
                "round participants set"
            );
        }
    }

    /// The side a participant is locked to for this round.
    pub fn try_get_locked_team(&self, id: ParticipantId) -> Option<Side> {
        self.seats.get(&id).copied().flatten()
    }

    /// Whether the participant was snapshotted into the current round.
    pub fn is_round_participant(&self, id: ParticipantId) -> bool {
        self.seats.contains_key(&id)
    }

    /// If a participant currently on `current` breaks their lock, returns
    /// the side they must be moved back to.
    ///
    /// Always `None` outside a live round and while a bypass is active.
    pub fn lock_violation(&self, id: ParticipantId, current: Team) -> Option<Side> {
        if !self.phase.is_live() || self.team_change_bypass_enabled() {
            return None;
        }
        let locked = self.try_get_locked_team(id)?;
        (current != Team::from(locked)).then_some(locked)
    }

    /// Handles the host's round-end callback.
    pub fn on_round_end(&mut self, outcome: RoundOutcome) {
        let previous = self.last_winner;

        self.consecutive_wins = match outcome.winner {
            None => 0,
            Some(winner) if previous == Some(winner) => (self.consecutive_wins + 1).max(1),
            Some(_) => 1,
        };

        match outcome.winner {
            Some(Side::Attacker) => self.attacker_wins += 1,
            Some(Side::Defender) => self.defender_wins += 1,
            None => {}
        }

        self.last_winner = outcome.winner;
        self.last_win_reason = outcome.reason;
        self.last_win_message = outcome.message;

        self.phase = self.phase.on_end();
        self.restart_queued = false;
        self.seats.clear();
        self.bypass_depth = 0;

        info!(
            round = self.round_number,
            winner = ?self.last_winner,
            streak = self.consecutive_wins,
            attacker_wins = self.attacker_wins,
            defender_wins = self.defender_wins,
            "round ended"
        );
    }

    /// Drops a participant who left from every per-participant record.
    pub fn on_participant_left(&mut self, id: ParticipantId) {
        self.seats.remove(&id);
        self.pending_joiners.retain(|p| *p != id);
    }

    // -- Late joiners -----------------------------------------------------

    /// Buffers a mid-round joiner. Enqueuing the same id twice keeps one entry.
    pub fn enqueue_joiner(&mut self, id: ParticipantId) {
        if !self.pending_joiners.contains(&id) {
            self.pending_joiners.push(id);
            if self.log.debug {
                debug!(%id, pending = self.pending_joiners.len(), "joiner held for round end");
            }
        }
    }

    /// Takes every buffered joiner. A second call returns an empty list.
    pub fn drain_pending_joiners(&mut self) -> Vec<ParticipantId> {
        std::mem::take(&mut self.pending_joiners)
    }

    // -- Restart ----------------------------------------------------------

    /// Claims the single game restart allowed per round.
    ///
    /// Returns `true` the first time in a round and `false` afterwards.
    pub fn try_queue_restart_this_round(&mut self) -> bool {
        if self.restart_queued {
            return false;
        }
        self.restart_queued = true;
        true
    }

    // -- Team-change bypass -----------------------------------------------

    /// Opens a window in which programmatic team moves may break locks.
    /// Calls nest.
    pub fn begin_team_change_bypass(&mut self) {
        self.bypass_depth += 1;
    }

    /// Closes one bypass window. Extra calls are ignored.
    pub fn end_team_change_bypass(&mut self) {
        self.bypass_depth = self.bypass_depth.saturating_sub(1);
    }

    pub fn team_change_bypass_enabled(&self) -> bool {
        self.bypass_depth > 0
    }

    /// Runs `f` inside a bypass window that is closed on every return path.
    pub fn with_team_change_bypass<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.begin_team_change_bypass();
        let out = f(self);
        self.end_team_change_bypass();
        out
    }

    // -- Overrides --------------------------------------------------------

    pub fn overrides(&self) -> &Overrides {
        &self.overrides
    }

    pub fn force_bombsite(&mut self, site: Bombsite) {
        self.overrides.forced_bombsite = Some(site);
        info!(%site, "bombsite forced");
    }

    pub fn clear_forced_bombsite(&mut self) {
        self.overrides.forced_bombsite = None;
    }

    pub fn force_scenario(&mut self) {
        self.overrides.forced_scenario = true;
    }

    pub fn clear_forced_scenario(&mut self) {
        self.overrides.forced_scenario = false;
    }

    pub fn set_showing_spawns_for(&mut self, site: Option<Bombsite>) {
        self.overrides.showing_spawns_for = site;
    }

    pub fn set_scramble_next_round(&mut self, scramble: bool) {
        self.overrides.scramble_next_round = scramble;
    }

    // -- Accessors --------------------------------------------------------

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn is_live(&self) -> bool {
        self.phase.is_live()
    }

    pub fn round_number(&self) -> u32 {
        self.round_number
    }

    pub fn restart_queued_this_round(&self) -> bool {
        self.restart_queued
    }

    pub fn last_winner(&self) -> Option<Side> {
        self.last_winner
    }

    pub fn last_win_reason(&self) -> u8 {
        self.last_win_reason
    }

    pub fn last_win_message(&self) -> &str {
        &self.last_win_message
    }

    pub fn consecutive_wins(&self) -> u32 {
        self.consecutive_wins
    }

    /// Total rounds won by a side this match.
    pub fn wins(&self, side: Side) -> u32 {
        match side {
            Side::Attacker => self.attacker_wins,
            Side::Defender => self.defender_wins,
        }
    }

    pub fn participant_count(&self) -> usize {
        self.seats.len()
    }

    /// A copy of the externally visible state.
    pub fn snapshot(&self) -> RoundSnapshot {
        RoundSnapshot {
            round_number: self.round_number,
            live: self.phase.is_live(),
            forced_bombsite: self.overrides.forced_bombsite,
            scramble_next_round: self.overrides.scramble_next_round,
            consecutive_wins: self.consecutive_wins,
            last_winner: self.last_winner,
            pending_joiners: self.pending_joiners.clone(),
            restart_queued_this_round: self.restart_queued,
        }
    }
}

impl Default for RoundStateMachine {
    fn default() -> Self {
        Self::new(LogConfig::default())
    }
}

/// Assigns drained joiners to whichever side is smaller at each step.
///
/// Ties go to the attackers. The counts are updated as joiners are placed,
/// so a batch fills both sides evenly.
pub fn distribute_joiners(
    joiners: &[ParticipantId],
    mut attackers: usize,
    mut defenders: usize,
) -> Vec<(ParticipantId, Side)> {
    joiners
        .iter()
        .map(|&id| {
            let side = if attackers <= defenders {
                attackers += 1;
                Side::Attacker
            } else {
                defenders += 1;
                Side::Defender
            };
            (id, side)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(id: u64) -> ParticipantId {
        ParticipantId(id)
    }

    #[test]
    fn test_distribute_joiners_ties_go_to_attackers() {
        let placed = distribute_joiners(&[pid(1), pid(2), pid(3)], 2, 2);
        assert_eq!(
            placed,
            vec![
                (pid(1), Side::Attacker),
                (pid(2), Side::Defender),
                (pid(3), Side::Attacker),
            ]
        );
    }

    #[test]
    fn test_distribute_joiners_fills_smaller_side_first() {
        let placed = distribute_joiners(&[pid(1), pid(2)], 1, 4);
        assert!(placed.iter().all(|(_, s)| *s == Side::Attacker));
    }

    #[test]
    fn test_with_bypass_closes_window() {
        let mut sm = RoundStateMachine::default();
        let inside = sm.with_team_change_bypass(|sm| sm.team_change_bypass_enabled());
        assert!(inside);
        assert!(!sm.team_change_bypass_enabled());
    }

    #[test]
    fn test_end_bypass_never_underflows() {
        let mut sm = RoundStateMachine::default();
        sm.end_team_change_bypass();
        sm.begin_team_change_bypass();
        assert!(sm.team_change_bypass_enabled());
        sm.end_team_change_bypass();
        assert!(!sm.team_change_bypass_enabled());
    }
}
