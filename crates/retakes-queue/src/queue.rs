//! The roster queue: who plays, who waits.
//!
//! # Membership
//!
//! Every participant the queue has seen gets one [`RosterEntry`] holding
//! their membership and a join sequence number. The sequence is assigned the
//! first time an id shows up and is the tiebreak for promotion (oldest
//! first) and preemption (newest first). Entries are dropped on disconnect.
//!
//! # Concurrency note
//!
//! Like the other round components this is owned by the single task that
//! serializes host callbacks. No locking.

use std::collections::HashMap;

use retakes_model::{
    EventBus, EventKind, LiveRoster, LogConfig, Membership, Notice, ParticipantId,
    PermissionLookup, Side, Subscriptions, Team, TeamEffector,
};
use tracing::{debug, info, warn};

use crate::{team_split, QueueConfig};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A team change the host is about to apply (or has just applied).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeamChangeRequest {
    pub participant: ParticipantId,
    pub from: Team,
    pub to: Team,
}

/// What the caller should do after admission control has looked at a
/// team change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Let the host's own team assignment go ahead.
    Proceed,
    /// The queue has fully processed the request. The caller must not
    /// apply a team change of its own.
    Handled,
}

// ---------------------------------------------------------------------------
// Internal bookkeeping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct RosterEntry {
    membership: Membership,
    join_seq: u64,
    /// The side this participant started the round on. Only filled while
    /// mid-round team changes are prevented.
    round_team: Option<Side>,
}

// ---------------------------------------------------------------------------
// RosterQueue
// ---------------------------------------------------------------------------

/// Capacity-bounded active roster plus its waiting queue.
///
/// ## Invariants
///
/// - `active_count() <= config.max_players` after every [`update`](Self::update).
/// - A participant is never both active and queued (one membership field).
/// - Every operation is safe to repeat; unknown ids are ignored.
pub struct RosterQueue {
    entries: HashMap<ParticipantId, RosterEntry>,
    next_seq: u64,
    config: QueueConfig,
    log: LogConfig,
    subscriptions: Subscriptions,
}

impl RosterQueue {
    pub fn new(config: QueueConfig, log: LogConfig) -> Self {
        Self {
            entries: HashMap::new(),
            next_seq: 0,
            config,
            log,
            subscriptions: Subscriptions::new(),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    // -- Subscriptions ----------------------------------------------------

    /// Host events that drive admission and reconciliation.
    pub const EVENTS: &'static [EventKind] = &[
        EventKind::RoundPrestart,
        EventKind::RoundStart,
        EventKind::RoundEnd,
        EventKind::TeamChangeRequest,
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

    // -- Queries ----------------------------------------------------------

    /// Where a participant stands. Unknown ids are spectators.
    pub fn membership(&self, id: ParticipantId) -> Membership {
        self.entries
            .get(&id)
            .map_or(Membership::Spectator, |e| e.membership)
    }

    pub fn is_active(&self, id: ParticipantId) -> bool {
        self.membership(id) == Membership::Active
    }

    pub fn is_queued(&self, id: ParticipantId) -> bool {
        self.membership(id) == Membership::Queued
    }

    pub fn active_count(&self) -> usize {
        self.count(Membership::Active)
    }

    pub fn queued_count(&self) -> usize {
        self.count(Membership::Queued)
    }

    /// Active participants, oldest first.
    pub fn active_ids(&self) -> Vec<ParticipantId> {
        self.ids_by_join_order(Membership::Active)
    }

    /// Queued participants, oldest first.
    pub fn queued_ids(&self) -> Vec<ParticipantId> {
        self.ids_by_join_order(Membership::Queued)
    }

    /// The side a participant was snapshotted on for this round.
    pub fn round_team(&self, id: ParticipantId) -> Option<Side> {
        self.entries.get(&id).and_then(|e| e.round_team)
    }

    /// Attacker target for the current active count.
    pub fn target_attackers(&self, ratio: f64) -> usize {
        team_split(
            self.active_count(),
            ratio,
            self.config.force_even_when_multiple_of_10,
        )
        .attackers
    }

    /// Defender target: the complement of [`target_attackers`](Self::target_attackers).
    pub fn target_defenders(&self, ratio: f64) -> usize {
        self.active_count() - self.target_attackers(ratio)
    }

    // -- Admission control ------------------------------------------------

    /// Decides how a team change is handled.
    ///
    /// - Connecting to spectator is always allowed.
    /// - An active participant going to spectator leaves the roster.
    /// - An active participant moving to a side they did not start the live
    ///   round on is demoted to the queue, eliminated and moved to
    ///   spectator.
    /// - Anyone else asking for a playing side is admitted directly during
    ///   warmup while there is room, and otherwise placed in the queue.
    pub fn on_team_change_request<H>(
        &mut self,
        host: &mut H,
        request: TeamChangeRequest,
        round_live: bool,
    ) -> Admission
    where
        H: LiveRoster + TeamEffector + ?Sized,
    {
        let TeamChangeRequest { participant, from, to } = request;

        if self.log.debug {
            debug!(%participant, %from, %to, "team change request");
        }

        if from == Team::Unassigned && to == Team::Spectator {
            return Admission::Proceed;
        }

        match self.membership(participant) {
            Membership::Active => self.admit_active(host, participant, to, round_live),
            Membership::Queued => {
                self.check_round_done(host);
                Admission::Handled
            }
            Membership::Spectator if !to.is_playing() => Admission::Proceed,
            Membership::Spectator => {
                let is_warmup = host.is_warmup();
                if is_warmup && self.active_count() < self.config.max_players {
                    self.set_membership(participant, Membership::Active);
                    info!(%participant, "added to active roster during warmup");
                    return Admission::Proceed;
                }

                self.set_membership(participant, Membership::Queued);
                host.notify(participant, Notice::QueueAdded);
                info!(%participant, queued = self.queued_count(), "added to queue");
                self.check_round_done(host);
                Admission::Handled
            }
        }
    }

    fn admit_active<H>(
        &mut self,
        host: &mut H,
        participant: ParticipantId,
        to: Team,
        round_live: bool,
    ) -> Admission
    where
        H: LiveRoster + TeamEffector + ?Sized,
    {
        if to == Team::Spectator {
            info!(%participant, "active participant switched to spectator");
            self.remove_participant(host, participant);
            return Admission::Proceed;
        }

        if !self.config.prevent_team_changes_mid_round || host.is_warmup() {
            return Admission::Proceed;
        }

        if round_live && self.has_round_teams() {
            if let Some(side) = to.side() {
                if self.round_team(participant) != Some(side) {
                    info!(%participant, %to, "prevented mid-round team change");
                    self.set_membership(participant, Membership::Queued);
                    if host.player(participant).is_some_and(|p| p.alive) {
                        host.eliminate(participant);
                    }
                    host.change_team(participant, Team::Spectator);
                    return Admission::Handled;
                }
            }
        }

        self.check_round_done(host);
        Admission::Handled
    }

    // -- Reconciliation ---------------------------------------------------

    /// Runs once per round prestart.
    ///
    /// Sweeps disconnected ids, fills free slots from the queue (priority
    /// first, then join order), resolves priority preemption one swap at a
    /// time, and tells whoever is still waiting where they stand.
    pub fn update<H>(&mut self, host: &mut H)
    where
        H: LiveRoster + PermissionLookup + TeamEffector + ?Sized,
    {
        self.sweep_disconnected(&*host);

        let capacity = self.config.max_players;
        if self.log.debug {
            debug!(
                capacity,
                active = self.active_count(),
                queued = self.queued_count(),
                "queue update"
            );
        }

        let slots = capacity.saturating_sub(self.active_count());
        if slots > 0 && self.queued_count() > 0 {
            let mut candidates = self.queued_ids();
            // Stable sort keeps join order within each priority class.
            candidates.sort_by_key(|id| !self.has_priority(&*host, *id));

            for id in candidates.into_iter().take(slots) {
                self.set_membership(id, Membership::Active);
                host.change_team(id, Team::Defender);
                info!(participant = %id, "promoted from queue");
            }
        }

        self.resolve_priority(host);

        if self.active_count() >= capacity {
            let active = self.active_count();
            for id in self.queued_ids() {
                host.notify(id, Notice::QueueWaiting { active, capacity });
            }
        }
    }

    fn resolve_priority<H>(&mut self, host: &mut H)
    where
        H: PermissionLookup + TeamEffector + ?Sized,
    {
        if self.active_count() != self.config.max_players {
            return;
        }

        let vips: Vec<ParticipantId> = self
            .queued_ids()
            .into_iter()
            .filter(|id| self.has_priority(&*host, *id))
            .collect();

        for vip in vips {
            let replaceable = self
                .active_ids()
                .into_iter()
                .rev()
                .find(|id| !self.has_priority(&*host, *id) && !self.has_immunity(&*host, *id));

            let Some(out) = replaceable else {
                if self.log.debug {
                    debug!("no replaceable active participant");
                }
                break;
            };

            self.set_membership(out, Membership::Queued);
            host.change_team(out, Team::Spectator);
            host.notify(out, Notice::MovedOut { by: vip });

            self.set_membership(vip, Membership::Active);
            host.change_team(vip, Team::Defender);
            host.notify(vip, Notice::MovedIn { replaced: out });

            info!(%vip, replaced = %out, "priority participant swapped in");
        }
    }

    fn sweep_disconnected<H>(&mut self, host: &H)
    where
        H: LiveRoster + ?Sized,
    {
        let before = self.entries.len();
        let connected: std::collections::HashSet<ParticipantId> =
            host.players().into_iter().map(|p| p.id).collect();
        self.entries.retain(|id, _| connected.contains(id));

        let removed = before - self.entries.len();
        if removed > 0 && self.log.debug {
            debug!(removed, "removed disconnected participants");
        }
    }

    // -- Round boundaries -------------------------------------------------

    /// Records the side each active participant starts the round on.
    /// Does nothing unless mid-round team changes are prevented.
    pub fn set_round_teams<H>(&mut self, host: &H)
    where
        H: LiveRoster + ?Sized,
    {
        if !self.config.prevent_team_changes_mid_round {
            return;
        }

        self.clear_round_teams();
        for player in host.players() {
            if let Some(entry) = self.entries.get_mut(&player.id) {
                if entry.membership == Membership::Active {
                    entry.round_team = player.team.side();
                }
            }
        }

        if self.log.debug {
            let attackers = self.snapshot_count(Side::Attacker);
            let defenders = self.snapshot_count(Side::Defender);
            debug!(attackers, defenders, "round teams set");
        }
    }

    pub fn clear_round_teams(&mut self) {
        for entry in self.entries.values_mut() {
            entry.round_team = None;
        }
    }

    /// Ends the round if either side has nobody left alive.
    ///
    /// Does nothing during warmup. If the host refuses to terminate the
    /// round, every remaining living participant is eliminated instead.
    /// Returns `true` if the round was ended.
    pub fn check_round_done<H>(&mut self, host: &mut H) -> bool
    where
        H: LiveRoster + TeamEffector + ?Sized,
    {
        if host.is_warmup() {
            return false;
        }

        let players = host.players();
        let alive_on = |team: Team| {
            players
                .iter()
                .filter(|p| p.team == team && p.alive)
                .count()
        };
        let attackers = alive_on(Team::Attacker);
        let defenders = alive_on(Team::Defender);

        if attackers > 0 && defenders > 0 {
            return false;
        }

        let winner = if defenders == 0 {
            Side::Attacker
        } else {
            Side::Defender
        };
        info!(attackers, defenders, %winner, "side eliminated, terminating round");

        if let Err(e) = host.terminate_round(winner) {
            warn!(error = %e, "failed to terminate round, eliminating survivors");
            for p in players.iter().filter(|p| p.alive) {
                host.eliminate(p.id);
            }
        }
        true
    }

    // -- Removal ----------------------------------------------------------

    /// Takes a participant out of the active and queued sets, then checks
    /// whether the round is now decided. Repeating the call is a no-op.
    pub fn remove_participant<H>(&mut self, host: &mut H, id: ParticipantId)
    where
        H: LiveRoster + TeamEffector + ?Sized,
    {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.membership = Membership::Spectator;
            entry.round_team = None;
            if self.log.debug {
                debug!(participant = %id, "removed from roster and queue");
            }
        }
        self.check_round_done(host);
    }

    /// Forgets a participant who disconnected, including their join order.
    pub fn forget(&mut self, id: ParticipantId) {
        self.entries.remove(&id);
    }

    /// Empties everything (map change).
    pub fn reset(&mut self) {
        self.entries.clear();
        self.next_seq = 0;
        if self.log.debug {
            debug!("queue reset");
        }
    }

    /// One-line summary for operator diagnostics.
    pub fn debug_summary(&self) -> String {
        let join = |ids: Vec<ParticipantId>| {
            ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
        };
        format!(
            "Active ({}): [{}] | Queue ({}): [{}]",
            self.active_count(),
            join(self.active_ids()),
            self.queued_count(),
            join(self.queued_ids()),
        )
    }

    // -- Helpers ----------------------------------------------------------

    fn set_membership(&mut self, id: ParticipantId, membership: Membership) {
        let next_seq = &mut self.next_seq;
        let entry = self.entries.entry(id).or_insert_with(|| {
            let seq = *next_seq;
            *next_seq += 1;
            RosterEntry {
                membership: Membership::Spectator,
                join_seq: seq,
                round_team: None,
            }
        });
        entry.membership = membership;
        if membership != Membership::Active {
            entry.round_team = None;
        }
    }

    fn count(&self, membership: Membership) -> usize {
        self.entries
            .values()
            .filter(|e| e.membership == membership)
            .count()
    }

    fn ids_by_join_order(&self, membership: Membership) -> Vec<ParticipantId> {
        let mut ids: Vec<(u64, ParticipantId)> = self
            .entries
            .iter()
            .filter(|(_, e)| e.membership == membership)
            .map(|(id, e)| (e.join_seq, *id))
            .collect();
        ids.sort_unstable();
        ids.into_iter().map(|(_, id)| id).collect()
    }

    fn snapshot_count(&self, side: Side) -> usize {
        self.entries
            .values()
            .filter(|e| e.round_team == Some(side))
            .count()
    }

    fn has_round_teams(&self) -> bool {
        self.snapshot_count(Side::Attacker) > 0 && self.snapshot_count(Side::Defender) > 0
    }

    fn has_priority<H>(&self, host: &H, id: ParticipantId) -> bool
    where
        H: PermissionLookup + ?Sized,
    {
        self.config
            .priority_flags
            .iter()
            .any(|flag| host.has_permission(id, flag))
    }

    fn has_immunity<H>(&self, host: &H, id: ParticipantId) -> bool
    where
        H: PermissionLookup + ?Sized,
    {
        self.config
            .effective_immunity_flags()
            .iter()
            .any(|flag| host.has_permission(id, flag))
    }
}

impl Default for RosterQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default(), LogConfig::default())
    }
}
