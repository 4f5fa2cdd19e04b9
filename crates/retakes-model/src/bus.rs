//! Event registration shared by every round component.
//!
//! Each component declares the host callbacks it reacts to and, in its
//! `start`, subscribes to them on an injected [`EventBus`]. The returned
//! [`Subscription`] tokens are owned values, not `Clone`, so `stop` hands
//! each one back exactly once.

// ---------------------------------------------------------------------------
// Event kinds
// ---------------------------------------------------------------------------

/// The kinds of host callback the round core reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    RoundPrestart,
    RoundStart,
    RoundEnd,
    TeamChangeRequest,
    Connected,
    AvatarSpawned,
    AvatarLost,
    Disconnected,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::RoundPrestart,
        EventKind::RoundStart,
        EventKind::RoundEnd,
        EventKind::TeamChangeRequest,
        EventKind::Connected,
        EventKind::AvatarSpawned,
        EventKind::AvatarLost,
        EventKind::Disconnected,
    ];
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::RoundPrestart => "RoundPrestart",
            Self::RoundStart => "RoundStart",
            Self::RoundEnd => "RoundEnd",
            Self::TeamChangeRequest => "TeamChangeRequest",
            Self::Connected => "Connected",
            Self::AvatarSpawned => "AvatarSpawned",
            Self::AvatarLost => "AvatarLost",
            Self::Disconnected => "Disconnected",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Bus contract
// ---------------------------------------------------------------------------

/// Proof of a live registration. Give it back through
/// [`EventBus::unsubscribe`] to end it.
#[derive(Debug, PartialEq, Eq)]
pub struct Subscription {
    id: u64,
    kind: EventKind,
}

impl Subscription {
    /// Mints a token. Only bus implementations should call this.
    pub fn new(id: u64, kind: EventKind) -> Self {
        Self { id, kind }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

/// Registration with the host's event source.
pub trait EventBus {
    fn subscribe(&mut self, kind: EventKind) -> Subscription;

    /// Ends a registration. Unknown tokens are ignored.
    fn unsubscribe(&mut self, subscription: Subscription);
}

/// The tokens one component holds between its `start` and `stop`.
#[derive(Debug, Default)]
pub struct Subscriptions {
    held: Vec<Subscription>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to each of `kinds`. Does nothing if tokens are already
    /// held, so a second `start` cannot double-register.
    pub fn start<B: EventBus + ?Sized>(&mut self, bus: &mut B, kinds: &[EventKind]) {
        if !self.held.is_empty() {
            return;
        }
        self.held = kinds.iter().map(|kind| bus.subscribe(*kind)).collect();
    }

    /// Hands every token back to `bus`.
    pub fn stop<B: EventBus + ?Sized>(&mut self, bus: &mut B) {
        for subscription in self.held.drain(..) {
            bus.unsubscribe(subscription);
        }
    }

    pub fn is_active(&self) -> bool {
        !self.held.is_empty()
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}
