//! Round lifecycle for the retakes round core.
//!
//! [`RoundStateMachine`] tracks whether a round is live, which participants
//! were snapshotted into it and the side each one is locked to, the win
//! streak, and the late joiners waiting for the round to end. Everything
//! else in the core asks it whether a team switch is legal right now.
//!
//! # Key types
//!
//! - [`RoundStateMachine`]: lifecycle transitions, locks, streaks
//! - [`RoundPhase`]: `Warmup → RoundLive → RoundOver → RoundLive ...`
//! - [`RoundOutcome`]: winner/reason/message fed in at round end
//! - [`Overrides`]: administrative state orthogonal to the lifecycle

mod machine;
mod phase;

pub use machine::{distribute_joiners, RoundOutcome, RoundStateMachine};
pub use phase::{Overrides, RoundPhase};
