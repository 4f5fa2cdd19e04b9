use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use retakes::model::{
    Angles, JsonMapCodec, MapCodec, MapConfig, SpawnId, SpawnPoint, SpawnRecord, Vector3,
};
use retakes::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

const PLAYERS: u64 = 10;
const ROUNDS: u32 = 8;
const LATE_JOINER: ParticipantId = ParticipantId(99);

// ---------------------------------------------------------------------------
// Simulated server
// ---------------------------------------------------------------------------

#[derive(Default)]
struct World {
    players: Vec<LivePlayer>,
    warmup: bool,
    teleports: usize,
    menus: Vec<(ParticipantId, Vec<SpawnId>)>,
    restarts: usize,
}

impl World {
    fn player_mut(&mut self, id: ParticipantId) -> Option<&mut LivePlayer> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    /// Everyone on a playing team gets a fresh avatar.
    fn respawn(&mut self) -> Vec<ParticipantId> {
        let mut spawned = Vec::new();
        for p in &mut self.players {
            p.alive = p.team.is_playing();
            p.has_avatar = p.alive;
            if p.alive {
                spawned.push(p.id);
            }
        }
        spawned
    }
}

/// The host side of the simulation. The runtime owns one clone, the
/// driver keeps another to play the game server's part.
#[derive(Clone, Default)]
struct SimHost {
    world: Arc<Mutex<World>>,
}

impl SimHost {
    fn world(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LiveRoster for SimHost {
    fn players(&self) -> Vec<LivePlayer> {
        self.world().players.clone()
    }

    fn is_warmup(&self) -> bool {
        self.world().warmup
    }
}

impl PermissionLookup for SimHost {
    fn has_permission(&self, _id: ParticipantId, _flag: &str) -> bool {
        false
    }
}

impl TeamEffector for SimHost {
    fn change_team(&mut self, id: ParticipantId, team: Team) {
        if let Some(p) = self.world().player_mut(id) {
            p.team = team;
            p.alive = false;
            p.has_avatar = false;
        }
    }

    fn eliminate(&mut self, id: ParticipantId) {
        if let Some(p) = self.world().player_mut(id) {
            p.alive = false;
        }
    }

    fn terminate_round(&mut self, winner: Side) -> Result<(), retakes::model::HostError> {
        info!(%winner, "round terminated");
        Ok(())
    }

    fn notify(&mut self, id: ParticipantId, notice: Notice) {
        info!(participant = %id, ?notice, "notice");
    }

    fn restart_game(&mut self) {
        self.world().restarts += 1;
    }
}

impl SpawnEffector for SimHost {
    fn teleport(&mut self, _id: ParticipantId, _position: Vector3, _angles: Angles) {
        self.world().teleports += 1;
    }

    fn open_spawn_menu(&mut self, id: ParticipantId, _bombsite: Bombsite, options: &[SpawnPoint]) {
        let ids = options.iter().map(|s| s.id).collect();
        self.world().menus.push((id, ids));
    }
}

// ---------------------------------------------------------------------------
// Spawn file
// ---------------------------------------------------------------------------

/// Six spawns per side and site, one attacker spawn per site marked as the
/// planter's.
fn spawn_file() -> MapConfig {
    let mut spawns = Vec::new();
    for (site, offset) in [(Bombsite::A, 0.0), (Bombsite::B, 2000.0)] {
        for side in [Side::Attacker, Side::Defender] {
            for i in 0..6u32 {
                let id = spawns.len() as u32 + 1;
                let planter = side == Side::Attacker && i == 0;
                spawns.push(SpawnRecord {
                    id,
                    vector: format!("{} {} 64", offset + f64::from(i) * 40.0, f64::from(id) * 8.0),
                    q_angle: "0 90 0".to_string(),
                    team: side,
                    bombsite: site,
                    can_be_planter: planter,
                    name: planter.then(|| format!("{site} default")),
                });
            }
        }
    }
    MapConfig { spawns }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut rng = StdRng::seed_from_u64(7);
    let host = SimHost::default();
    host.world().warmup = true;

    let config = RetakesConfig::from_json(
        r#"{ "queue": { "max_players": 9 }, "team_balance": { "rounds_to_scramble": 3 } }"#,
    )?;
    let mut orchestrator = RoundOrchestrator::with_rng(
        host.clone(),
        MemoryPreferences::new(),
        config,
        StdRng::seed_from_u64(rng.random()),
    );

    let codec = JsonMapCodec;
    let bytes = codec.encode(&spawn_file())?;
    let report = orchestrator.load_map(codec.decode(&bytes)?);
    info!(loaded = report.loaded, invalid = report.invalid, "spawn file loaded");

    let (handle, task) = RetakesRuntime::spawn(orchestrator);

    // Warmup: everyone connects and picks a side.
    for n in 1..=PLAYERS {
        let id = ParticipantId(n);
        host.world().players.push(LivePlayer {
            id,
            team: Team::Unassigned,
            alive: false,
            has_avatar: false,
        });
        handle.send_event(HostEvent::Connected(id)).await?;
        let to = if n % 2 == 0 { Team::Defender } else { Team::Attacker };
        join(&handle, &host, id, Team::Unassigned, to).await?;
    }
    host.world().warmup = false;

    for round in 1..=ROUNDS {
        handle.send_event(HostEvent::RoundPrestart).await?;
        let spawned = host.world().respawn();
        handle.send_event(HostEvent::RoundStart).await?;
        for id in spawned {
            handle.send_event(HostEvent::AvatarSpawned(id)).await?;
        }

        let menus = std::mem::take(&mut host.world().menus);
        for (id, options) in menus {
            if let Some(spawn) = options.choose(&mut rng) {
                handle.select_spawn(id, *spawn).await?;
            }
        }

        if round == 3 {
            host.world().players.push(LivePlayer {
                id: LATE_JOINER,
                team: Team::Spectator,
                alive: false,
                has_avatar: false,
            });
            handle.send_event(HostEvent::Connected(LATE_JOINER)).await?;
            join(&handle, &host, LATE_JOINER, Team::Spectator, Team::Attacker).await?;
        }

        let winner = if rng.random_bool(0.6) { Side::Attacker } else { Side::Defender };
        handle.send_event(HostEvent::RoundEnd(RoundOutcome::won_by(winner))).await?;

        let snapshot = handle.snapshot().await?;
        let (attackers, defenders) = {
            let world = host.world();
            let count = |team| world.players.iter().filter(|p| p.team == team).count();
            (count(Team::Attacker), count(Team::Defender))
        };
        info!(
            round,
            %winner,
            streak = snapshot.consecutive_wins,
            attackers,
            defenders,
            "round finished"
        );
    }

    let late = handle.participant(LATE_JOINER).await?;
    info!(membership = ?late.membership, "late joiner");

    handle.shutdown().await?;
    let orchestrator = task.await?;

    let world = host.world();
    println!("{}", orchestrator.debug_summary());
    println!(
        "teleports: {}, restarts: {}",
        world.teleports, world.restarts
    );
    Ok(())
}

/// Asks the round core about a team change and applies it if allowed.
async fn join(
    handle: &RetakesHandle,
    host: &SimHost,
    id: ParticipantId,
    from: Team,
    to: Team,
) -> Result<(), RetakesError> {
    let admission = handle
        .team_change(TeamChangeRequest {
            participant: id,
            from,
            to,
        })
        .await?;
    if admission == Admission::Proceed {
        if let Some(p) = host.world().player_mut(id) {
            p.team = to;
        }
    }
    Ok(())
}
