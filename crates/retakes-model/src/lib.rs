//! Shared vocabulary for the retakes round core.
//!
//! - **Types** ([`ParticipantId`], [`Side`], [`Team`], [`Bombsite`],
//!   [`SpawnPoint`], [`RoundSnapshot`]) used by every other crate.
//! - **Map files** ([`MapConfig`], [`SpawnRecord`], [`MapCodec`]) for the
//!   per-map spawn data.
//! - **Host contracts** ([`LiveRoster`], [`TeamEffector`], ...) the core
//!   drives but never implements.
//! - **Event registration** ([`EventBus`], [`Subscriptions`]) each
//!   component uses in its `start`/`stop`.
//!
//! ```text
//! retakes (facade) → round / queue / spawn / defer → model (this crate)
//! ```

mod bus;
mod error;
mod host;
mod log;
mod map;
mod types;

pub use bus::{EventBus, EventKind, Subscription, Subscriptions};
pub use error::{HostError, ModelError};
pub use host::{Host, LivePlayer, LiveRoster, Notice, PermissionLookup, SpawnEffector, TeamEffector};
pub use log::LogConfig;
#[cfg(feature = "json")]
pub use map::JsonMapCodec;
pub use map::{parse_triple, DecodedMap, MapCodec, MapConfig, SpawnRecord};
pub use types::{
    Angles, Bombsite, Membership, Participant, ParticipantId, RoundSnapshot, Side, SpawnId,
    SpawnPoint, Team, Vector3,
};
