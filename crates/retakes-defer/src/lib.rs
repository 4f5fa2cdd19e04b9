//! Deferred actions for the retakes round core.
//!
//! Some decisions cannot be applied the moment they are made. A teleport
//! needs the participant's avatar to exist; a locked-team correction has to
//! wait a tick. This crate holds those actions until they can run.
//!
//! # Round tokens
//!
//! Every held action captures the scheduler's round token when it is
//! scheduled. [`DeferredScheduler::advance_round`] bumps the token at each
//! round prestart. When an action comes due its token is checked again, and
//! a mismatch means the round it belonged to is over: the action is dropped
//! silently. That check is the only cancellation mechanism.
//!
//! # Actions are data
//!
//! The scheduler never runs anything itself. Due actions land in an outbox
//! that the caller drains with [`DeferredScheduler::drain_ready`] and applies
//! against the host. `A` is whatever command type the caller uses.
//!
//! # Integration
//!
//! Delayed timers are meant to sit in the same `tokio::select!` loop that
//! feeds host events:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(event) = events.recv() => { /* handle event */ }
//!         _ = scheduler.wait_for_timer() => {
//!             scheduler.fire_due(Instant::now());
//!         }
//!     }
//!     for ready in scheduler.drain_ready() { /* apply */ }
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use retakes_model::{EventBus, EventKind, LogConfig, ParticipantId, Subscriptions};
use tokio::time::{self, Instant};
use tracing::{debug, trace};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// An action whose preconditions now hold and which the caller should apply.
#[derive(Debug, Clone, PartialEq)]
pub struct Ready<A> {
    /// The participant the action targets, if any.
    pub participant: Option<ParticipantId>,
    pub action: A,
}

/// "Run this once the participant's avatar exists."
///
/// Implemented by [`DeferredScheduler`]; spawn assignment schedules its
/// teleports through this trait so tests can record them instead.
pub trait WhenReady<A> {
    fn when_ready(&mut self, participant: ParticipantId, action: A);
}

// ---------------------------------------------------------------------------
// Internal bookkeeping
// ---------------------------------------------------------------------------

struct Held<A> {
    token: u64,
    action: A,
}

struct Timer<A> {
    token: u64,
    deadline: Instant,
    participant: Option<ParticipantId>,
    action: A,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Holds avatar-gated and time-gated actions for one server.
///
/// Single-threaded by construction: it is owned by whichever task
/// serializes host callbacks, so it needs no interior locking.
pub struct DeferredScheduler<A> {
    round_token: u64,
    /// Participants whose avatar currently exists.
    avatars: HashSet<ParticipantId>,
    held: HashMap<ParticipantId, Vec<Held<A>>>,
    timers: Vec<Timer<A>>,
    outbox: Vec<Ready<A>>,
    log: LogConfig,
    subscriptions: Subscriptions,
}

impl<A> DeferredScheduler<A> {
    pub fn new(log: LogConfig) -> Self {
        Self {
            round_token: 0,
            avatars: HashSet::new(),
            held: HashMap::new(),
            timers: Vec::new(),
            outbox: Vec::new(),
            log,
            subscriptions: Subscriptions::new(),
        }
    }

    // -- Subscriptions ----------------------------------------------------

    /// Host events that release, invalidate or drop deferred actions.
    pub const EVENTS: &'static [EventKind] = &[
        EventKind::RoundPrestart,
        EventKind::Connected,
        EventKind::AvatarSpawned,
        EventKind::AvatarLost,
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

    /// The current round generation.
    pub fn round_token(&self) -> u64 {
        self.round_token
    }

    /// Starts a new round generation. Everything scheduled before this call
    /// becomes stale and will be dropped when it would otherwise fire.
    pub fn advance_round(&mut self) {
        self.round_token += 1;
        if self.log.debug {
            debug!(round_token = self.round_token, "round token advanced");
        }
    }

    /// Records that a participant's avatar now exists and releases their
    /// held actions from the current round.
    pub fn avatar_spawned(&mut self, participant: ParticipantId) {
        self.avatars.insert(participant);

        let Some(list) = self.held.remove(&participant) else {
            return;
        };

        let total = list.len();
        let token = self.round_token;
        let mut released = 0usize;
        for held in list {
            if held.token == token {
                self.outbox.push(Ready {
                    participant: Some(participant),
                    action: held.action,
                });
                released += 1;
            }
        }

        if self.log.debug {
            debug!(
                %participant,
                released,
                stale = total - released,
                "avatar ready, released held actions"
            );
        }
    }

    /// Records that a participant's avatar is gone (killed, respawning).
    /// Held actions stay held.
    pub fn avatar_lost(&mut self, participant: ParticipantId) {
        self.avatars.remove(&participant);
    }

    /// Replaces the readiness picture with the host's current view.
    pub fn sync_avatars<I>(&mut self, avatars: I)
    where
        I: IntoIterator<Item = (ParticipantId, bool)>,
    {
        for (participant, has_avatar) in avatars {
            if has_avatar {
                self.avatar_spawned(participant);
            } else {
                self.avatar_lost(participant);
            }
        }
    }

    /// Whether the scheduler believes the participant's avatar exists.
    pub fn has_avatar(&self, participant: ParticipantId) -> bool {
        self.avatars.contains(&participant)
    }

    /// Drops every held action and timer for a participant who left.
    pub fn disconnected(&mut self, participant: ParticipantId) {
        self.avatars.remove(&participant);
        let dropped = self.held.remove(&participant).map_or(0, |l| l.len());
        let before = self.timers.len();
        self.timers.retain(|t| t.participant != Some(participant));
        let dropped = dropped + (before - self.timers.len());

        if dropped > 0 && self.log.debug {
            debug!(%participant, dropped, "dropped deferred actions on disconnect");
        }
    }

    /// Schedules an action to come due after `delay`.
    ///
    /// A `Duration::ZERO` delay means "on the next timer pass", which is how
    /// callers express "next tick". If `participant` is set the timer is
    /// dropped when that participant disconnects.
    pub fn after(&mut self, delay: Duration, participant: Option<ParticipantId>, action: A) {
        self.timers.push(Timer {
            token: self.round_token,
            deadline: Instant::now() + delay,
            participant,
            action,
        });
    }

    /// Moves every timer whose deadline has passed into the outbox, skipping
    /// stale ones. Returns how many became ready.
    pub fn fire_due(&mut self, now: Instant) -> usize {
        let token = self.round_token;
        let mut fired = 0usize;
        let mut stale = 0usize;

        let mut kept = Vec::with_capacity(self.timers.len());
        for timer in self.timers.drain(..) {
            if timer.deadline > now {
                kept.push(timer);
            } else if timer.token == token {
                self.outbox.push(Ready {
                    participant: timer.participant,
                    action: timer.action,
                });
                fired += 1;
            } else {
                stale += 1;
            }
        }
        self.timers = kept;

        trace!(fired, stale, "timer pass");
        fired
    }

    /// The earliest pending deadline, if any timer is waiting.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.iter().map(|t| t.deadline).min()
    }

    /// Waits until the earliest timer is due.
    ///
    /// With no timers this future pends forever, which lets it sit in a
    /// `tokio::select!` without busy-looping. The deadline is read once when
    /// the future is created, so recreate it after scheduling new timers.
    pub async fn wait_for_timer(&self) {
        match self.next_deadline() {
            Some(deadline) => time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    }

    /// Takes every action that is ready to apply, in the order it became
    /// ready.
    pub fn drain_ready(&mut self) -> Vec<Ready<A>> {
        std::mem::take(&mut self.outbox)
    }

    /// Number of avatar-gated actions still held.
    pub fn held_count(&self) -> usize {
        self.held.values().map(Vec::len).sum()
    }

    /// Number of timers still waiting.
    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }

    /// Clears all state, including the round token (map change).
    pub fn reset(&mut self) {
        self.round_token = 0;
        self.avatars.clear();
        self.held.clear();
        self.timers.clear();
        self.outbox.clear();
    }

    /// One-line summary for operator diagnostics.
    pub fn debug_summary(&self) -> String {
        format!(
            "deferred: round_token={}, held={}, participants={}, timers={}",
            self.round_token,
            self.held_count(),
            self.held.len(),
            self.timers.len()
        )
    }
}

impl<A> WhenReady<A> for DeferredScheduler<A> {
    /// Queues the action for immediate application if the avatar exists,
    /// otherwise holds it under the current round token.
    fn when_ready(&mut self, participant: ParticipantId, action: A) {
        if self.avatars.contains(&participant) {
            self.outbox.push(Ready {
                participant: Some(participant),
                action,
            });
            return;
        }

        self.held.entry(participant).or_default().push(Held {
            token: self.round_token,
            action,
        });
    }
}

impl<A> Default for DeferredScheduler<A> {
    fn default() -> Self {
        Self::new(LogConfig::default())
    }
}
