//! # Retakes
//!
//! Round orchestration for retake-style tactical shooter servers: each
//! round the attackers start around a planted (or about to be planted)
//! bomb and the defenders spawn to retake the site.
//!
//! The layer crates each own one concern:
//!
//! - [`retakes_round`]: round lifecycle, team locks, win streaks
//! - [`retakes_queue`]: active roster, waiting queue, team sizing
//! - [`retakes_spawn`]: spawn pool, preferences, per-round assignment
//! - [`retakes_defer`]: actions that wait for an avatar or a timer
//!
//! This crate wires them to a host in [`RoundOrchestrator`] and runs that
//! on a Tokio task in [`RetakesRuntime`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use retakes::{RetakesConfig, RetakesRuntime, RoundOrchestrator};
//! use retakes::spawn::MemoryPreferences;
//!
//! # async fn run<H: retakes::model::Host + Send + 'static>(host: H) -> Result<(), retakes::RetakesError> {
//! let config = RetakesConfig::from_json("{}")?;
//! let orchestrator = RoundOrchestrator::new(host, MemoryPreferences::new(), config);
//! let (handle, task) = RetakesRuntime::spawn(orchestrator);
//! handle.send_event(retakes::HostEvent::RoundPrestart).await?;
//! handle.shutdown().await?;
//! let _orchestrator = task.await;
//! # Ok(())
//! # }
//! ```

mod bus;
mod config;
mod error;
mod orchestrator;
mod runtime;

pub use bus::{EventBus, EventKind, HostEvent, LocalBus, Subscription};
pub use config::{BombConfig, RetakesConfig, ServerConfig, TeamBalanceConfig};
pub use error::RetakesError;
pub use orchestrator::{DeferredAction, RoundOrchestrator};
pub use runtime::{AdminCommand, RetakesHandle, RetakesRuntime};

pub use retakes_defer as defer;
pub use retakes_model as model;
pub use retakes_queue as queue;
pub use retakes_round as round;
pub use retakes_spawn as spawn;

/// Commonly used types, for `use retakes::prelude::*`.
pub mod prelude {
    pub use crate::{
        AdminCommand, HostEvent, RetakesConfig, RetakesError, RetakesHandle, RetakesRuntime,
        RoundOrchestrator,
    };
    pub use retakes_model::{
        Bombsite, Host, LivePlayer, LiveRoster, Notice, ParticipantId, PermissionLookup, Side,
        SpawnEffector, Team, TeamEffector,
    };
    pub use retakes_queue::{Admission, TeamChangeRequest};
    pub use retakes_round::RoundOutcome;
    pub use retakes_spawn::{MemoryPreferences, PreferenceStore};
}
