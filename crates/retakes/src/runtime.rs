//! Runtime actor: a Tokio task that owns the orchestrator.
//!
//! Host callbacks arrive over an mpsc channel and are processed strictly in
//! order on one task, so the round core never needs a lock. Delayed
//! deferred actions are awaited in the same `select!` loop.

use rand::Rng;
use retakes_model::{Bombsite, Host, Participant, ParticipantId, RoundSnapshot, SpawnId};
use retakes_queue::{Admission, TeamChangeRequest};
use retakes_spawn::PreferenceStore;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::{HostEvent, LocalBus, RetakesError, RoundOrchestrator};

/// Commands are buffered up to this many before senders wait.
const CHANNEL_CAPACITY: usize = 256;

/// Operator commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    ForceBombsite(Bombsite),
    ClearForcedBombsite,
    ForceScenario,
    ClearForcedScenario,
    ShowSpawnsFor(Option<Bombsite>),
    ScrambleNextRound,
    ResetMatch,
}

/// Messages to the runtime task.
enum RuntimeCommand {
    Event(HostEvent),
    TeamChange {
        request: TeamChangeRequest,
        reply: oneshot::Sender<Admission>,
    },
    SelectSpawn {
        participant: ParticipantId,
        spawn: SpawnId,
        reply: oneshot::Sender<bool>,
    },
    Admin(AdminCommand),
    Snapshot {
        reply: oneshot::Sender<RoundSnapshot>,
    },
    Participant {
        id: ParticipantId,
        reply: oneshot::Sender<Participant>,
    },
    Shutdown,
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Handle to a running [`RetakesRuntime`]. Cheap to clone.
#[derive(Clone)]
pub struct RetakesHandle {
    sender: mpsc::Sender<RuntimeCommand>,
}

impl RetakesHandle {
    /// Delivers a host callback (fire-and-forget).
    ///
    /// Team-change requests sent this way are processed but their
    /// admission is discarded; use [`team_change`](Self::team_change) when
    /// the host needs the answer.
    pub async fn send_event(&self, event: HostEvent) -> Result<(), RetakesError> {
        self.send(RuntimeCommand::Event(event)).await
    }

    /// Runs admission control and waits for the decision.
    pub async fn team_change(&self, request: TeamChangeRequest) -> Result<Admission, RetakesError> {
        let (reply, rx) = oneshot::channel();
        self.send(RuntimeCommand::TeamChange { request, reply }).await?;
        rx.await.map_err(|_| RetakesError::Unavailable)
    }

    /// Forwards a defender's spawn-menu pick.
    pub async fn select_spawn(
        &self,
        participant: ParticipantId,
        spawn: SpawnId,
    ) -> Result<bool, RetakesError> {
        let (reply, rx) = oneshot::channel();
        self.send(RuntimeCommand::SelectSpawn {
            participant,
            spawn,
            reply,
        })
        .await?;
        rx.await.map_err(|_| RetakesError::Unavailable)
    }

    pub async fn admin(&self, command: AdminCommand) -> Result<(), RetakesError> {
        self.send(RuntimeCommand::Admin(command)).await
    }

    pub async fn snapshot(&self) -> Result<RoundSnapshot, RetakesError> {
        let (reply, rx) = oneshot::channel();
        self.send(RuntimeCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| RetakesError::Unavailable)
    }

    pub async fn participant(&self, id: ParticipantId) -> Result<Participant, RetakesError> {
        let (reply, rx) = oneshot::channel();
        self.send(RuntimeCommand::Participant { id, reply }).await?;
        rx.await.map_err(|_| RetakesError::Unavailable)
    }

    /// Asks the runtime to stop. The task's join handle yields the
    /// orchestrator back once it has.
    pub async fn shutdown(&self) -> Result<(), RetakesError> {
        self.send(RuntimeCommand::Shutdown).await
    }

    async fn send(&self, command: RuntimeCommand) -> Result<(), RetakesError> {
        self.sender
            .send(command)
            .await
            .map_err(|_| RetakesError::Unavailable)
    }
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

/// The actor that drives a [`RoundOrchestrator`].
pub struct RetakesRuntime<H, P, R> {
    orchestrator: RoundOrchestrator<H, P, R>,
    bus: LocalBus,
    receiver: mpsc::Receiver<RuntimeCommand>,
}

impl<H, P, R> RetakesRuntime<H, P, R>
where
    H: Host + Send + 'static,
    P: PreferenceStore + Send + 'static,
    R: Rng + Send + 'static,
{
    /// Spawns the actor on the current Tokio runtime.
    ///
    /// The orchestrator subscribes to the runtime's bus on start and
    /// unsubscribes on shutdown. Awaiting the join handle returns it.
    pub fn spawn(
        orchestrator: RoundOrchestrator<H, P, R>,
    ) -> (RetakesHandle, JoinHandle<RoundOrchestrator<H, P, R>>) {
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let runtime = Self {
            orchestrator,
            bus: LocalBus::new(),
            receiver,
        };
        let task = tokio::spawn(runtime.run());
        (RetakesHandle { sender }, task)
    }

    async fn run(mut self) -> RoundOrchestrator<H, P, R> {
        self.orchestrator.start(&mut self.bus);
        info!("retakes runtime started");

        loop {
            tokio::select! {
                command = self.receiver.recv() => {
                    match command {
                        None | Some(RuntimeCommand::Shutdown) => break,
                        Some(command) => self.handle(command),
                    }
                }
                _ = self.orchestrator.scheduler().wait_for_timer() => {
                    self.orchestrator.fire_due_timers(Instant::now());
                }
            }
        }

        self.orchestrator.stop(&mut self.bus);
        info!("retakes runtime stopped");
        self.orchestrator
    }

    fn handle(&mut self, command: RuntimeCommand) {
        match command {
            RuntimeCommand::Event(event) => {
                if !self.bus.is_subscribed(event.kind()) {
                    debug!(kind = %event.kind(), "no subscriber, event dropped");
                    return;
                }
                self.orchestrator.handle_event(event);
            }
            RuntimeCommand::TeamChange { request, reply } => {
                let admission = self.orchestrator.on_team_change_request(request);
                let _ = reply.send(admission);
            }
            RuntimeCommand::SelectSpawn {
                participant,
                spawn,
                reply,
            } => {
                let _ = reply.send(self.orchestrator.select_spawn(participant, spawn));
            }
            RuntimeCommand::Admin(admin) => self.apply_admin(admin),
            RuntimeCommand::Snapshot { reply } => {
                let _ = reply.send(self.orchestrator.snapshot());
            }
            RuntimeCommand::Participant { id, reply } => {
                let _ = reply.send(self.orchestrator.participant(id));
            }
            // Handled by the loop.
            RuntimeCommand::Shutdown => {}
        }
    }

    fn apply_admin(&mut self, command: AdminCommand) {
        info!(?command, "admin command");
        let o = &mut self.orchestrator;
        match command {
            AdminCommand::ForceBombsite(site) => o.force_bombsite(site),
            AdminCommand::ClearForcedBombsite => o.clear_forced_bombsite(),
            AdminCommand::ForceScenario => o.force_scenario(),
            AdminCommand::ClearForcedScenario => o.clear_forced_scenario(),
            AdminCommand::ShowSpawnsFor(site) => o.show_spawns_for(site),
            AdminCommand::ScrambleNextRound => o.scramble_next_round(),
            AdminCommand::ResetMatch => o.reset_match(),
        }
    }
}
