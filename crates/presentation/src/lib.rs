//! Authoritative presentation state and the per-session endpoint that owns it.
//!
//! Each session runs one [`endpoint`] task. The task is the only writer of
//! its [`state::PresentationMachine`] and the only publisher of snapshots,
//! so every operation on a session runs to completion before the next one
//! starts and no locks guard the state itself.

pub mod endpoint;
pub mod registry;
pub mod state;

pub use endpoint::{spawn_session, Attachment, ReactionOutcome, SessionHandle};
pub use registry::SessionRegistry;
pub use state::{tally, PresentationMachine};
