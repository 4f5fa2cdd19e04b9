//! Per-round spawn matching.
//!
//! # Algorithm
//!
//! 1. Forget last round's assignment and planter.
//! 2. With auto-plant on, planter-eligible attacker spawns are held out of
//!    the general pool (the plant is virtual, nobody has to stand there)
//!    unless the general pool alone is too small.
//! 3. If either side has fewer spawns than players, stop and report a
//!    shortage. Nothing is bound or scheduled.
//! 4. Shuffle both player lists and both spawn pools.
//! 5. Bind stored preferences that are still available, attackers first.
//! 6. Pick the planter. Auto-plant pairs the first unbound attacker with a
//!    random planter-eligible spawn without consuming a seat. Manual plant
//!    moves a planter-eligible spawn to the front of the pool so the next
//!    pairing puts an attacker on it.
//! 7. Zip the remaining players with the remaining spawns.
//! 8. Defenders who opted in to the spawn menu are left unbound and listed
//!    in [`SpawnAssigner::prompted`]; their pick arrives later through
//!    [`SpawnAssigner::bind_selection`].
//!
//! Every bind schedules a [`Teleport`] through [`WhenReady`], so it lands
//! once the participant's avatar exists.

use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::Rng;
use retakes_defer::WhenReady;
use retakes_model::{
    Angles, Bombsite, EventBus, EventKind, LogConfig, ParticipantId, Side, SpawnId, SpawnPoint,
    Subscriptions, Vector3,
};
use tracing::{debug, info, warn};

use crate::{PreferenceStore, SpawnPool};

/// Place a participant's avatar at a spawn point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Teleport {
    pub spawn: SpawnId,
    pub position: Vector3,
    pub angles: Angles,
}

impl From<&SpawnPoint> for Teleport {
    fn from(spawn: &SpawnPoint) -> Self {
        Self {
            spawn: spawn.id,
            position: spawn.position,
            angles: spawn.angles,
        }
    }
}

/// Result of one round's matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnOutcome {
    /// Every attacker and every non-menu defender is bound.
    Assigned,
    /// Not enough spawns. The host's default placement applies this round.
    Shortage {
        attackers: usize,
        attacker_spawns: usize,
        defenders: usize,
        defender_spawns: usize,
    },
}

impl SpawnOutcome {
    pub fn is_assigned(&self) -> bool {
        matches!(self, Self::Assigned)
    }
}

/// Matches participants to spawn points once per round.
///
/// All randomness comes from the injected generator, so a seeded `R` gives
/// reproducible rounds.
pub struct SpawnAssigner<R> {
    rng: R,
    auto_plant: bool,
    bombsite: Option<Bombsite>,
    assignments: HashMap<ParticipantId, SpawnPoint>,
    planter: Option<(ParticipantId, SpawnPoint)>,
    prompted: Vec<ParticipantId>,
    log: LogConfig,
    subscriptions: Subscriptions,
}

impl<R: Rng> SpawnAssigner<R> {
    pub fn new(rng: R, auto_plant: bool, log: LogConfig) -> Self {
        Self {
            rng,
            auto_plant,
            bombsite: None,
            assignments: HashMap::new(),
            planter: None,
            prompted: Vec::new(),
            log,
            subscriptions: Subscriptions::new(),
        }
    }

    // -- Subscriptions ----------------------------------------------------

    /// Host events that drive matching and spawn-menu lifetime.
    pub const EVENTS: &'static [EventKind] = &[
        EventKind::RoundPrestart,
        EventKind::RoundStart,
        EventKind::RoundEnd,
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

    pub fn set_auto_plant(&mut self, auto_plant: bool) {
        self.auto_plant = auto_plant;
    }

    pub fn auto_plant(&self) -> bool {
        self.auto_plant
    }

    /// The shared generator, for callers that draw other round randomness
    /// (bombsite choice, scramble order) from the same seed.
    pub fn rng_mut(&mut self) -> &mut R {
        &mut self.rng
    }

    /// Computes this round's assignment and schedules its teleports.
    ///
    /// A non-playable `bombsite` has no spawns and reports a shortage.
    pub fn handle_round_spawns<P, W, A>(
        &mut self,
        pool: &SpawnPool,
        bombsite: Bombsite,
        attackers: &[ParticipantId],
        defenders: &[ParticipantId],
        prefs: &P,
        ready: &mut W,
    ) -> SpawnOutcome
    where
        P: PreferenceStore + ?Sized,
        W: WhenReady<A> + ?Sized,
        A: From<Teleport>,
    {
        self.clear();
        self.bombsite = Some(bombsite);

        if attackers.is_empty() && defenders.is_empty() {
            return SpawnOutcome::Assigned;
        }

        let (attacker_spawns, defender_spawns) = if bombsite.is_playable() {
            (
                owned(pool.spawns_for(bombsite, Side::Attacker)),
                owned(pool.spawns_for(bombsite, Side::Defender)),
            )
        } else {
            (Vec::new(), Vec::new())
        };

        let planter_spawns: Vec<SpawnPoint> = attacker_spawns
            .iter()
            .filter(|s| s.can_be_planter)
            .cloned()
            .collect();

        let mut attacker_pool = if self.auto_plant {
            let mut general: Vec<SpawnPoint> = attacker_spawns
                .iter()
                .filter(|s| !s.can_be_planter)
                .cloned()
                .collect();
            if general.len() < attackers.len() {
                general.extend(planter_spawns.iter().cloned());
            }
            general
        } else {
            attacker_spawns
        };
        let mut defender_pool = defender_spawns;

        if attacker_pool.len() < attackers.len() || defender_pool.len() < defenders.len() {
            let outcome = SpawnOutcome::Shortage {
                attackers: attackers.len(),
                attacker_spawns: attacker_pool.len(),
                defenders: defenders.len(),
                defender_spawns: defender_pool.len(),
            };
            warn!(
                %bombsite,
                attackers = attackers.len(),
                attacker_spawns = attacker_pool.len(),
                defenders = defenders.len(),
                defender_spawns = defender_pool.len(),
                "not enough spawns"
            );
            return outcome;
        }

        let mut attacker_players = attackers.to_vec();
        let mut defender_players = defenders.to_vec();
        attacker_players.shuffle(&mut self.rng);
        defender_players.shuffle(&mut self.rng);
        attacker_pool.shuffle(&mut self.rng);
        defender_pool.shuffle(&mut self.rng);

        let (prompted, mut auto_defenders): (Vec<_>, Vec<_>) = defender_players
            .into_iter()
            .partition(|id| prefs.wants_spawn_menu(*id));

        self.bind_preferences::<P, W, A>(
            bombsite,
            Side::Attacker,
            &mut attacker_players,
            &mut attacker_pool,
            prefs,
            ready,
        );
        self.bind_preferences::<P, W, A>(
            bombsite,
            Side::Defender,
            &mut auto_defenders,
            &mut defender_pool,
            prefs,
            ready,
        );

        if self.auto_plant {
            self.pick_virtual_planter(&attacker_players, &planter_spawns);
        } else if self.planter.is_none() && !attacker_players.is_empty() {
            if let Some(index) = attacker_pool.iter().position(|s| s.can_be_planter) {
                attacker_pool.swap(0, index);
            }
        }

        for (id, spawn) in attacker_players.into_iter().zip(attacker_pool) {
            if !self.auto_plant && self.planter.is_none() && spawn.can_be_planter {
                self.planter = Some((id, spawn.clone()));
            }
            self.bind::<W, A>(id, spawn, ready);
        }

        for (id, spawn) in auto_defenders.into_iter().zip(defender_pool) {
            self.bind::<W, A>(id, spawn, ready);
        }

        self.prompted = prompted;

        info!(
            %bombsite,
            assigned = self.assignments.len(),
            prompted = self.prompted.len(),
            planter = ?self.planter.as_ref().map(|(id, s)| (id.to_string(), s.id)),
            "round spawns assigned"
        );
        SpawnOutcome::Assigned
    }

    /// Binds a prompted defender to the spawn they picked from the menu.
    ///
    /// Returns `false` if the participant was not prompted this round, the
    /// spawn is not a defender spawn at the round's site, or another
    /// participant already holds it. Picking again replaces the earlier
    /// pick.
    pub fn bind_selection<W, A>(
        &mut self,
        pool: &SpawnPool,
        id: ParticipantId,
        spawn: SpawnId,
        ready: &mut W,
    ) -> bool
    where
        W: WhenReady<A> + ?Sized,
        A: From<Teleport>,
    {
        let Some(bombsite) = self.bombsite else {
            return false;
        };
        if !self.prompted.contains(&id) {
            return false;
        }
        let Some(point) = pool
            .get(spawn)
            .filter(|s| s.side == Side::Defender && s.bombsite == bombsite)
        else {
            return false;
        };
        let taken = self
            .assignments
            .iter()
            .any(|(holder, s)| *holder != id && s.id == spawn);
        if taken {
            if self.log.debug {
                debug!(participant = %id, %spawn, "menu pick already taken");
            }
            return false;
        }

        self.bind::<W, A>(id, point.clone(), ready);
        true
    }

    /// The defender spawns offered in the menu this round, in id order.
    pub fn menu_options(&self, pool: &SpawnPool) -> Vec<SpawnPoint> {
        match self.bombsite {
            Some(bombsite) if bombsite.is_playable() => {
                owned(pool.spawns_for(bombsite, Side::Defender))
            }
            _ => Vec::new(),
        }
    }

    // -- Accessors --------------------------------------------------------

    pub fn bombsite(&self) -> Option<Bombsite> {
        self.bombsite
    }

    pub fn assignment(&self, id: ParticipantId) -> Option<&SpawnPoint> {
        self.assignments.get(&id)
    }

    pub fn assignments(&self) -> impl Iterator<Item = (ParticipantId, &SpawnPoint)> {
        self.assignments.iter().map(|(id, s)| (*id, s))
    }

    pub fn assigned_count(&self) -> usize {
        self.assignments.len()
    }

    /// The designated planter and the spawn they plant from.
    pub fn planter(&self) -> Option<(ParticipantId, &SpawnPoint)> {
        self.planter.as_ref().map(|(id, s)| (*id, s))
    }

    /// Defenders waiting to pick from the spawn menu this round.
    pub fn prompted(&self) -> &[ParticipantId] {
        &self.prompted
    }

    /// Drops a participant who left from this round's records.
    pub fn forget(&mut self, id: ParticipantId) {
        self.assignments.remove(&id);
        self.prompted.retain(|p| *p != id);
        if self.planter.as_ref().is_some_and(|(p, _)| *p == id) {
            self.planter = None;
        }
    }

    /// Ends this round's menu window. Later picks are refused; bound
    /// assignments stay.
    pub fn close_menus(&mut self) {
        self.prompted.clear();
    }

    /// Forgets the current assignment.
    pub fn clear(&mut self) {
        self.bombsite = None;
        self.assignments.clear();
        self.planter = None;
        self.prompted.clear();
    }

    // -- Helpers ----------------------------------------------------------

    fn bind_preferences<P, W, A>(
        &mut self,
        bombsite: Bombsite,
        side: Side,
        players: &mut Vec<ParticipantId>,
        pool: &mut Vec<SpawnPoint>,
        prefs: &P,
        ready: &mut W,
    ) where
        P: PreferenceStore + ?Sized,
        W: WhenReady<A> + ?Sized,
        A: From<Teleport>,
    {
        let mut unbound = Vec::with_capacity(players.len());
        for id in players.drain(..) {
            let preferred = prefs
                .preferred_spawn(id, side, bombsite)
                .and_then(|wanted| pool.iter().position(|s| s.id == wanted));

            match preferred {
                Some(index) => {
                    let spawn = pool.remove(index);
                    if side == Side::Attacker
                        && !self.auto_plant
                        && self.planter.is_none()
                        && spawn.can_be_planter
                    {
                        self.planter = Some((id, spawn.clone()));
                    }
                    if self.log.debug {
                        debug!(participant = %id, spawn = %spawn.id, "preferred spawn bound");
                    }
                    self.bind::<W, A>(id, spawn, ready);
                }
                None => unbound.push(id),
            }
        }
        *players = unbound;
    }

    /// Auto-plant: the first unbound attacker plants from a random
    /// planter-eligible spawn. If every attacker was bound by preference,
    /// the first of those plants instead.
    fn pick_virtual_planter(&mut self, unbound: &[ParticipantId], planter_spawns: &[SpawnPoint]) {
        if planter_spawns.is_empty() {
            return;
        }
        let planter = unbound.first().copied().or_else(|| {
            self.assignments
                .iter()
                .filter(|(_, s)| s.side == Side::Attacker)
                .map(|(id, _)| *id)
                .min()
        });
        let Some(planter) = planter else {
            return;
        };

        let index = self.rng.random_range(0..planter_spawns.len());
        self.planter = Some((planter, planter_spawns[index].clone()));
    }

    fn bind<W, A>(&mut self, id: ParticipantId, spawn: SpawnPoint, ready: &mut W)
    where
        W: WhenReady<A> + ?Sized,
        A: From<Teleport>,
    {
        ready.when_ready(id, A::from(Teleport::from(&spawn)));
        self.assignments.insert(id, spawn);
    }
}

fn owned(spawns: Vec<&SpawnPoint>) -> Vec<SpawnPoint> {
    spawns.into_iter().cloned().collect()
}
