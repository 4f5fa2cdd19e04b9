//! Roster admission for the retakes round core.
//!
//! Keeps the number of playing participants at or below a fixed capacity.
//! Overflow waits in a queue that is reconciled once per round prestart;
//! priority participants may bump the newest ordinary player.
//!
//! - [`RosterQueue`]: active and queued sets, admission control,
//!   reconciliation, the per-round team snapshot.
//! - [`team_split`]: the attacker/defender target for a headcount.
//! - [`QueueConfig`]: capacity, lock and permission-flag settings.

mod config;
mod queue;
mod sizing;

pub use config::QueueConfig;
pub use queue::{Admission, RosterQueue, TeamChangeRequest};
pub use sizing::{team_split, TeamSplit};
