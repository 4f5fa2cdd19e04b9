//! The round pipeline.
//!
//! [`RoundOrchestrator`] owns the three round components, the spawn pool,
//! the deferred scheduler and the host, and turns host callbacks into calls
//! on them in a fixed order:
//!
//! ```text
//! prestart   queue update → scramble → balance → round token bump
//! start      lifecycle → queue round teams → locks → bombsite → spawns
//!            → spawn menus → plant-site announce
//! end        lifecycle → win announce → clear queue round teams
//!            → place late joiners
//! ```
//!
//! Everything runs on the caller's thread. Actions that must wait for an
//! avatar or for the next timer pass go through the scheduler and are
//! applied to the host whenever they become ready.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use retakes_defer::{DeferredScheduler, Ready, WhenReady};
use retakes_model::{
    Bombsite, DecodedMap, Host, LivePlayer, LogConfig, Notice, Participant, ParticipantId,
    RoundSnapshot, Side, SpawnId, Team,
};
use retakes_queue::{team_split, Admission, RosterQueue, TeamChangeRequest, TeamSplit};
use retakes_round::{distribute_joiners, RoundOutcome, RoundStateMachine};
use retakes_spawn::{LoadReport, PreferenceStore, SpawnAssigner, SpawnOutcome, SpawnPool, Teleport};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{EventBus, HostEvent, RetakesConfig};

// ---------------------------------------------------------------------------
// Deferred actions
// ---------------------------------------------------------------------------

/// What the orchestrator parks in the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum DeferredAction {
    /// Move the avatar to its assigned spawn.
    Teleport(Teleport),
    /// Show the defender spawn menu for this round's site.
    OpenSpawnMenu { bombsite: Bombsite },
    /// Put a participant back on the side they are locked to.
    Relock,
}

impl From<Teleport> for DeferredAction {
    fn from(teleport: Teleport) -> Self {
        Self::Teleport(teleport)
    }
}

// ---------------------------------------------------------------------------
// RoundOrchestrator
// ---------------------------------------------------------------------------

/// Wires round lifecycle, roster queue and spawn assignment to a host.
pub struct RoundOrchestrator<H, P, R = StdRng> {
    host: H,
    prefs: P,
    config: RetakesConfig,
    round: RoundStateMachine,
    queue: RosterQueue,
    pool: SpawnPool,
    assigner: SpawnAssigner<R>,
    scheduler: DeferredScheduler<DeferredAction>,
    /// Consecutive attacker wins counted at prestart, for auto-scramble.
    attacker_win_run: u32,
    /// Round token the spawn menus were opened under. Picks made under any
    /// other token are stale.
    menu_token: Option<u64>,
    log: LogConfig,
}

impl<H, P> RoundOrchestrator<H, P, StdRng>
where
    H: Host,
    P: PreferenceStore,
{
    /// Creates an orchestrator with an OS-seeded generator.
    pub fn new(host: H, prefs: P, config: RetakesConfig) -> Self {
        Self::with_rng(host, prefs, config, StdRng::from_os_rng())
    }
}

impl<H, P, R> RoundOrchestrator<H, P, R>
where
    H: Host,
    P: PreferenceStore,
    R: Rng,
{
    /// Creates an orchestrator drawing all round randomness (bombsite,
    /// shuffles, planter) from `rng`.
    pub fn with_rng(host: H, prefs: P, config: RetakesConfig, rng: R) -> Self {
        let config = config.validated();
        let log = config.log();
        Self {
            host,
            prefs,
            round: RoundStateMachine::new(log),
            queue: RosterQueue::new(config.queue.clone(), log),
            pool: SpawnPool::new(log),
            assigner: SpawnAssigner::new(rng, config.bomb.auto_plant, log),
            scheduler: DeferredScheduler::new(log),
            attacker_win_run: 0,
            menu_token: None,
            config,
            log,
        }
    }

    // -- Lifecycle --------------------------------------------------------

    /// Starts every component, each subscribing to the host events it
    /// reacts to. Calling it again while started does nothing.
    pub fn start<B: EventBus + ?Sized>(&mut self, bus: &mut B) {
        if self.is_started() {
            return;
        }
        self.round.start(bus);
        self.queue.start(bus);
        self.assigner.start(bus);
        self.scheduler.start(bus);
        info!("round orchestrator started");
    }

    /// Stops every component, releasing its subscriptions.
    pub fn stop<B: EventBus + ?Sized>(&mut self, bus: &mut B) {
        if !self.is_started() {
            return;
        }
        self.round.stop(bus);
        self.queue.stop(bus);
        self.assigner.stop(bus);
        self.scheduler.stop(bus);
        info!("round orchestrator stopped");
    }

    pub fn is_started(&self) -> bool {
        self.round.is_started()
            || self.queue.is_started()
            || self.assigner.is_started()
            || self.scheduler.is_started()
    }

    /// Routes one host callback. Only a team-change request produces an
    /// [`Admission`].
    pub fn handle_event(&mut self, event: HostEvent) -> Option<Admission> {
        match event {
            HostEvent::RoundPrestart => self.on_round_prestart(),
            HostEvent::RoundStart => {
                self.on_round_start();
            }
            HostEvent::RoundEnd(outcome) => self.on_round_end(outcome),
            HostEvent::TeamChangeRequest(request) => {
                return Some(self.on_team_change_request(request));
            }
            HostEvent::Connected(id) => self.on_connected(id),
            HostEvent::AvatarSpawned(id) => self.on_avatar_spawned(id),
            HostEvent::AvatarLost(id) => self.scheduler.avatar_lost(id),
            HostEvent::Disconnected(id) => self.on_disconnected(id),
        }
        None
    }

    // -- Round boundaries -------------------------------------------------

    /// Runs before players respawn: queue reconciliation, scramble, balance,
    /// then a new round token so last round's deferred actions go stale.
    pub fn on_round_prestart(&mut self) {
        self.close_spawn_menus();
        if self.config.queue.enabled {
            self.queue.update(&mut self.host);
        }
        self.try_scramble();
        self.try_balance();
        self.scheduler.advance_round();

        if self.log.debug {
            debug!(queue = %self.queue.debug_summary(), "prestart complete");
        }
    }

    /// Runs when the round begins. Returns the spawn outcome, or `None`
    /// during warmup.
    pub fn on_round_start(&mut self) -> Option<SpawnOutcome> {
        let is_warmup = self.host.is_warmup();
        self.round.on_round_start(is_warmup);
        if is_warmup {
            return None;
        }

        if self.config.queue.enabled {
            self.queue.set_round_teams(&self.host);
        }

        let players = self.host.players();
        self.round.set_round_participants(
            players
                .iter()
                .filter(|p| p.team.is_playing())
                .map(|p| (p.id, p.team)),
        );

        let bombsite = self.choose_bombsite();
        let attackers = ids_on(&players, Team::Attacker);
        let defenders = ids_on(&players, Team::Defender);

        self.scheduler
            .sync_avatars(players.iter().map(|p| (p.id, p.has_avatar)));

        let outcome = self.assigner.handle_round_spawns::<P, _, DeferredAction>(
            &self.pool,
            bombsite,
            &attackers,
            &defenders,
            &self.prefs,
            &mut self.scheduler,
        );

        if outcome.is_assigned() {
            self.menu_token = Some(self.scheduler.round_token());
            for id in self.assigner.prompted().to_vec() {
                self.scheduler
                    .when_ready(id, DeferredAction::OpenSpawnMenu { bombsite });
            }
            self.announce_plant_site(bombsite, &players);
        }

        info!(
            round = self.round.round_number(),
            %bombsite,
            attackers = attackers.len(),
            defenders = defenders.len(),
            assigned = outcome.is_assigned(),
            "round started"
        );

        self.apply_ready();
        Some(outcome)
    }

    /// Runs when the host reports the round result.
    pub fn on_round_end(&mut self, outcome: RoundOutcome) {
        let winner = outcome.winner;
        self.round.on_round_end(outcome);
        self.close_spawn_menus();

        if let Some(side) = winner {
            let streak = self.round.consecutive_wins();
            for player in self.host.players() {
                self.host.notify(player.id, Notice::TeamWin { side, streak });
            }
        }

        if self.config.queue.enabled {
            self.queue.clear_round_teams();
        }

        self.place_late_joiners();
    }

    /// Moves drained late joiners that are still waiting as spectators onto
    /// whichever side is smaller.
    fn place_late_joiners(&mut self) {
        let joiners = self.round.drain_pending_joiners();
        if joiners.is_empty() {
            return;
        }

        let players = self.host.players();
        let waiting: Vec<ParticipantId> = joiners
            .into_iter()
            .filter(|id| {
                players
                    .iter()
                    .any(|p| p.id == *id && !p.team.is_playing())
            })
            .collect();

        let attackers = count_on(&players, Team::Attacker);
        let defenders = count_on(&players, Team::Defender);
        let placements = distribute_joiners(&waiting, attackers, defenders);

        for (id, side) in &placements {
            let host = &mut self.host;
            self.round
                .with_team_change_bypass(|_| host.change_team(*id, Team::from(*side)));
        }

        if !placements.is_empty() {
            info!(placed = placements.len(), "late joiners placed");
        }
    }

    // -- Team changes -----------------------------------------------------

    /// Decides whether the host may apply a team change.
    ///
    /// Programmatic moves inside a bypass window always proceed. With the
    /// queue enabled, admission control decides; otherwise a live round
    /// refuses moves away from a participant's locked side.
    pub fn on_team_change_request(&mut self, request: TeamChangeRequest) -> Admission {
        if self.round.team_change_bypass_enabled() {
            return Admission::Proceed;
        }

        if self.config.queue.enabled {
            return self
                .queue
                .on_team_change_request(&mut self.host, request, self.round.is_live());
        }

        let locked = self.round.try_get_locked_team(request.participant);
        match (self.round.is_live(), locked, request.to.side()) {
            (true, Some(locked), Some(side)) if side != locked => {
                info!(participant = %request.participant, %locked, to = %request.to, "team change blocked by lock");
                Admission::Handled
            }
            _ => Admission::Proceed,
        }
    }

    // -- Connections and avatars ------------------------------------------

    fn on_connected(&mut self, id: ParticipantId) {
        self.scheduler.avatar_lost(id);
        if self.log.debug {
            debug!(participant = %id, "participant connected");
        }
    }

    /// Handles the host's spawn hook for one avatar.
    ///
    /// Outside warmup, a participant who was not snapshotted into the live
    /// round is held as a spectator until round end. The exception is a
    /// server that is effectively 1v0: the joiner fills the empty side and
    /// the game restarts once. A participant spawning off their locked side
    /// is moved back on the next timer pass.
    pub fn on_avatar_spawned(&mut self, id: ParticipantId) {
        if !self.host.is_warmup() && self.round.is_live() {
            let Some(player) = self.host.player(id) else {
                return;
            };

            if !self.round.is_round_participant(id) && player.team.is_playing() {
                if !self.fill_empty_side(id) {
                    self.hold_until_round_end(id);
                    return;
                }
            } else if self.round.lock_violation(id, player.team).is_some() {
                self.scheduler
                    .after(Duration::ZERO, Some(id), DeferredAction::Relock);
            }
        }

        self.scheduler.avatar_spawned(id);
        self.apply_ready();
    }

    /// 1v0: move the joiner to the empty side and claim this round's single
    /// restart. Returns `false` if the server is not 1v0.
    fn fill_empty_side(&mut self, id: ParticipantId) -> bool {
        let players = self.host.players();
        let attackers = count_on(&players, Team::Attacker);
        let defenders = count_on(&players, Team::Defender);
        let target = match (attackers, defenders) {
            (1, 0) => Side::Defender,
            (0, 1) => Side::Attacker,
            _ => return false,
        };

        let host = &mut self.host;
        self.round
            .with_team_change_bypass(|_| host.change_team(id, Team::from(target)));

        if self.round.try_queue_restart_this_round() {
            info!(participant = %id, %target, "1v0 join, restarting game");
            self.host.restart_game();
        }
        true
    }

    fn hold_until_round_end(&mut self, id: ParticipantId) {
        self.round.enqueue_joiner(id);
        let host = &mut self.host;
        self.round
            .with_team_change_bypass(|_| host.change_team(id, Team::Spectator));
        self.host.notify(id, Notice::HeldUntilRoundEnd);
        info!(participant = %id, "late joiner held until round end");
    }

    /// Forgets a participant in every round component. Stored spawn
    /// preferences are kept for when they reconnect.
    pub fn on_disconnected(&mut self, id: ParticipantId) {
        self.round.on_participant_left(id);
        if self.config.queue.enabled {
            self.queue.remove_participant(&mut self.host, id);
        }
        self.queue.forget(id);
        self.scheduler.disconnected(id);
        self.assigner.forget(id);

        if self.log.debug {
            debug!(participant = %id, "participant disconnected");
        }
    }

    /// Binds a defender's pick from the spawn menu. Returns `false` if the
    /// pick is not allowed (see [`SpawnAssigner::bind_selection`]) or the
    /// menu belongs to an earlier round.
    pub fn select_spawn(&mut self, id: ParticipantId, spawn: SpawnId) -> bool {
        if !self.round.is_live() || self.menu_token != Some(self.scheduler.round_token()) {
            if self.log.debug {
                debug!(participant = %id, %spawn, "stale spawn menu pick ignored");
            }
            return false;
        }
        let bound = self.assigner.bind_selection::<_, DeferredAction>(
            &self.pool,
            id,
            spawn,
            &mut self.scheduler,
        );
        self.apply_ready();
        bound
    }

    // -- Timers -----------------------------------------------------------

    /// Fires every timer due at `now` and applies the result.
    pub fn fire_due_timers(&mut self, now: Instant) -> usize {
        let fired = self.scheduler.fire_due(now);
        self.apply_ready();
        fired
    }

    // -- Scramble and balance ---------------------------------------------

    /// Reshuffles the playing participants into the target split when the
    /// attacker win run reaches the threshold or an operator asked for it.
    /// Returns `true` if teams were scrambled.
    pub fn try_scramble(&mut self) -> bool {
        if self.host.is_warmup() {
            return false;
        }

        let cfg = &self.config.team_balance;
        if !cfg.scramble_enabled && !self.round.overrides().scramble_next_round {
            return false;
        }

        if cfg.scramble_enabled {
            match self.round.last_winner() {
                Some(Side::Attacker) => self.attacker_win_run += 1,
                Some(Side::Defender) => self.attacker_win_run = 0,
                None => {}
            }
            if self.attacker_win_run >= cfg.rounds_to_scramble {
                self.round.set_scramble_next_round(true);
            }
        }

        if !self.round.overrides().scramble_next_round {
            return false;
        }

        let mut players: Vec<ParticipantId> = self
            .host
            .players()
            .iter()
            .filter(|p| p.team.is_playing())
            .map(|p| p.id)
            .collect();

        if players.len() < 2 {
            self.round.set_scramble_next_round(false);
            self.attacker_win_run = 0;
            return false;
        }

        players.shuffle(self.assigner.rng_mut());
        let split = self.target_split(players.len());
        let (attackers, defenders) = players.split_at(split.attackers);

        let host = &mut self.host;
        self.round.with_team_change_bypass(|_| {
            for id in attackers {
                host.change_team(*id, Team::Attacker);
            }
            for id in defenders {
                host.change_team(*id, Team::Defender);
            }
        });

        self.round.set_scramble_next_round(false);
        self.attacker_win_run = 0;
        info!(
            attackers = split.attackers,
            defenders = split.defenders,
            "teams scrambled"
        );
        true
    }

    /// Moves random participants off the larger side until the split
    /// matches the target. Returns how many were moved.
    pub fn try_balance(&mut self) -> usize {
        if !self.config.team_balance.enabled || self.host.is_warmup() {
            return 0;
        }

        let players = self.host.players();
        let total = count_on(&players, Team::Attacker) + count_on(&players, Team::Defender);
        if total < 2 {
            return 0;
        }

        let target = self.target_split(total).attackers;
        let current = count_on(&players, Team::Attacker);
        let (from, to, count) = match current.cmp(&target) {
            std::cmp::Ordering::Equal => return 0,
            std::cmp::Ordering::Greater => (Team::Attacker, Team::Defender, current - target),
            std::cmp::Ordering::Less => (Team::Defender, Team::Attacker, target - current),
        };

        let mut candidates = ids_on(&players, from);
        candidates.shuffle(self.assigner.rng_mut());
        candidates.truncate(count);

        for id in &candidates {
            let host = &mut self.host;
            self.round.with_team_change_bypass(|_| host.change_team(*id, to));
        }

        info!(moved = candidates.len(), %from, %to, target, "teams balanced");
        candidates.len()
    }

    fn target_split(&self, total: usize) -> TeamSplit {
        let cfg = &self.config.team_balance;
        team_split(total, cfg.attacker_ratio, cfg.force_even_when_multiple_of_10)
    }

    // -- Administrative overrides -----------------------------------------

    pub fn force_bombsite(&mut self, site: Bombsite) {
        self.round.force_bombsite(site);
    }

    pub fn clear_forced_bombsite(&mut self) {
        self.round.clear_forced_bombsite();
    }

    pub fn force_scenario(&mut self) {
        self.round.force_scenario();
    }

    pub fn clear_forced_scenario(&mut self) {
        self.round.clear_forced_scenario();
    }

    pub fn show_spawns_for(&mut self, site: Option<Bombsite>) {
        self.round.set_showing_spawns_for(site);
    }

    /// Scrambles teams at the next prestart.
    pub fn scramble_next_round(&mut self) {
        self.round.set_scramble_next_round(true);
        info!("scramble requested for next round");
    }

    /// Forgets the match: lifecycle counters, queue, scheduler, spawns
    /// assigned this round.
    pub fn reset_match(&mut self) {
        self.round.reset_match();
        self.queue.reset();
        self.scheduler.reset();
        self.assigner.clear();
        self.menu_token = None;
        self.attacker_win_run = 0;
    }

    /// Replaces the spawn pool for a new map and resets round state.
    /// Queue membership survives the map change.
    pub fn load_map(&mut self, decoded: DecodedMap) -> LoadReport {
        let report = self.pool.load(decoded);
        self.round.reset_match();
        self.scheduler.reset();
        self.assigner.clear();
        self.menu_token = None;
        self.attacker_win_run = 0;
        report
    }

    // -- Accessors --------------------------------------------------------

    /// The consolidated view of one participant.
    pub fn participant(&self, id: ParticipantId) -> Participant {
        Participant {
            id,
            membership: self.queue.membership(id),
            locked_team: self.round.try_get_locked_team(id),
        }
    }

    pub fn snapshot(&self) -> RoundSnapshot {
        self.round.snapshot()
    }

    pub fn config(&self) -> &RetakesConfig {
        &self.config
    }

    pub fn round(&self) -> &RoundStateMachine {
        &self.round
    }

    pub fn queue(&self) -> &RosterQueue {
        &self.queue
    }

    pub fn pool(&self) -> &SpawnPool {
        &self.pool
    }

    /// Spawn editing goes through here.
    pub fn pool_mut(&mut self) -> &mut SpawnPool {
        &mut self.pool
    }

    pub fn assigner(&self) -> &SpawnAssigner<R> {
        &self.assigner
    }

    pub fn scheduler(&self) -> &DeferredScheduler<DeferredAction> {
        &self.scheduler
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn prefs(&self) -> &P {
        &self.prefs
    }

    pub fn prefs_mut(&mut self) -> &mut P {
        &mut self.prefs
    }

    /// Multi-line summary for operator diagnostics.
    pub fn debug_summary(&self) -> String {
        let snapshot = self.round.snapshot();
        format!(
            "round {} live={} streak={}\n{}\n{}",
            snapshot.round_number,
            snapshot.live,
            snapshot.consecutive_wins,
            self.queue.debug_summary(),
            self.scheduler.debug_summary()
        )
    }

    // -- Helpers ----------------------------------------------------------

    fn close_spawn_menus(&mut self) {
        self.menu_token = None;
        self.assigner.close_menus();
    }

    fn choose_bombsite(&mut self) -> Bombsite {
        match self.round.overrides().forced_bombsite {
            Some(site) if site.is_playable() => site,
            _ => {
                if self.assigner.rng_mut().random_bool(0.5) {
                    Bombsite::A
                } else {
                    Bombsite::B
                }
            }
        }
    }

    fn announce_plant_site(&mut self, bombsite: Bombsite, players: &[LivePlayer]) {
        let Some(name) = self
            .assigner
            .planter()
            .and_then(|(_, spawn)| spawn.name.clone())
        else {
            return;
        };
        for player in players {
            self.host.notify(
                player.id,
                Notice::PlantSite {
                    bombsite,
                    name: name.clone(),
                },
            );
        }
    }

    /// Applies every action the scheduler has released.
    fn apply_ready(&mut self) {
        for Ready { participant, action } in self.scheduler.drain_ready() {
            let Some(id) = participant else {
                warn!(?action, "deferred action without a participant dropped");
                continue;
            };
            match action {
                DeferredAction::Teleport(teleport) => {
                    self.host.teleport(id, teleport.position, teleport.angles);
                }
                DeferredAction::OpenSpawnMenu { bombsite } => {
                    if self.assigner.prompted().contains(&id) {
                        let options = self.assigner.menu_options(&self.pool);
                        self.host.open_spawn_menu(id, bombsite, &options);
                    }
                }
                DeferredAction::Relock => self.relock(id),
            }
        }
    }

    /// Re-checks a lock violation at fire time and corrects it.
    fn relock(&mut self, id: ParticipantId) {
        if !self.round.is_live() {
            return;
        }
        let Some(locked) = self.round.try_get_locked_team(id) else {
            return;
        };
        let Some(player) = self.host.player(id) else {
            return;
        };
        if player.team == Team::from(locked) {
            return;
        }

        let host = &mut self.host;
        self.round
            .with_team_change_bypass(|_| host.change_team(id, Team::from(locked)));
        info!(participant = %id, %locked, "moved back to locked side");
    }
}

fn ids_on(players: &[LivePlayer], team: Team) -> Vec<ParticipantId> {
    players
        .iter()
        .filter(|p| p.team == team)
        .map(|p| p.id)
        .collect()
}

fn count_on(players: &[LivePlayer], team: Team) -> usize {
    players.iter().filter(|p| p.team == team).count()
}
