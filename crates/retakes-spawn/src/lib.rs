//! Spawn handling for the retakes round core.
//!
//! - [`SpawnPool`]: the validated spawn points of the current map, with the
//!   editing operations an operator uses to maintain the spawn file.
//! - [`SpawnAssigner`]: the per-round matching of participants to spawn
//!   points, including the single planter designation.
//! - [`PreferenceStore`]: stored favourite spawns and the spawn-menu opt-in.
//!
//! Matching consumes a [`SpawnPool`] and a [`PreferenceStore`] and schedules
//! its teleports through [`retakes_defer::WhenReady`], so it never touches
//! the host directly.

mod assigner;
mod pool;
mod prefs;

pub use assigner::{SpawnAssigner, SpawnOutcome, Teleport};
pub use pool::{LoadReport, NewSpawn, SpawnPool};
pub use prefs::{MemoryPreferences, PreferenceRecord, PreferenceStore};
