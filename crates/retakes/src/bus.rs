//! Host events and the bus that routes them.
//!
//! The host publishes [`HostEvent`]s. Each round component subscribes to
//! the [`EventKind`]s it reacts to in its `start` and hands the tokens back
//! in its `stop`; the contract lives in `retakes_model`.

use std::collections::HashMap;

pub use retakes_model::{EventBus, EventKind, Subscription};
use retakes_model::ParticipantId;
use retakes_queue::TeamChangeRequest;
use retakes_round::RoundOutcome;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// One host callback, with its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// Before players respawn for the next round.
    RoundPrestart,
    /// Players have respawned and the round begins.
    RoundStart,
    RoundEnd(RoundOutcome),
    /// A participant asked to switch teams. The host waits for the
    /// [`Admission`](retakes_queue::Admission) before applying it.
    TeamChangeRequest(TeamChangeRequest),
    Connected(ParticipantId),
    /// An avatar was created for the participant (the host's spawn hook).
    AvatarSpawned(ParticipantId),
    /// The participant's avatar is gone (death, team switch).
    AvatarLost(ParticipantId),
    Disconnected(ParticipantId),
}

impl HostEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::RoundPrestart => EventKind::RoundPrestart,
            Self::RoundStart => EventKind::RoundStart,
            Self::RoundEnd(_) => EventKind::RoundEnd,
            Self::TeamChangeRequest(_) => EventKind::TeamChangeRequest,
            Self::Connected(_) => EventKind::Connected,
            Self::AvatarSpawned(_) => EventKind::AvatarSpawned,
            Self::AvatarLost(_) => EventKind::AvatarLost,
            Self::Disconnected(_) => EventKind::Disconnected,
        }
    }
}

// ---------------------------------------------------------------------------
// Bus
// ---------------------------------------------------------------------------

/// An [`EventBus`] that only tracks which kinds have subscribers.
///
/// The runtime uses it to drop events nobody is listening to; hosts that
/// deliver events some other way can use it the same way.
#[derive(Debug, Default)]
pub struct LocalBus {
    next_id: u64,
    live: HashMap<u64, EventKind>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether at least one subscription for `kind` is live.
    pub fn is_subscribed(&self, kind: EventKind) -> bool {
        self.live.values().any(|k| *k == kind)
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.live.len()
    }
}

impl EventBus for LocalBus {
    fn subscribe(&mut self, kind: EventKind) -> Subscription {
        self.next_id += 1;
        self.live.insert(self.next_id, kind);
        Subscription::new(self.next_id, kind)
    }

    fn unsubscribe(&mut self, subscription: Subscription) {
        self.live.remove(&subscription.id());
    }
}
