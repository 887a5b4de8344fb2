//! Session controller for the Veil pairing service.
//!
//! Action-based state machine that sequences onboarding, drives matchmaking,
//! owns the lifecycle of the partner-scoped chat channel, and enforces the
//! anti-abuse cooldown on session termination.
//!
//! # Architecture
//!
//! The controller follows a Sans-IO, action-based pattern. It receives events
//! ([`SessionEvent`]), processes them through pure state machine logic, and
//! returns actions ([`SessionAction`]) for the caller to execute. Request
//! completions, poll ticks, and unsolicited channel frames all arrive through
//! the same ordered inbox, so every transition is atomic from the caller's
//! perspective and there is nothing to lock.
//!
//! # Components
//!
//! - [`Session`]: the state machine (onboarding gate, match coordinator, chat
//!   session)
//! - [`SessionEvent`] / [`SessionAction`]: the event/action vocabulary
//! - [`DebugRecorder`]: bounded ring buffer for best-effort diagnostics
//! - [`Environment`]: time abstraction for deterministic testing
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides
//! `transport::RestApi` (HTTP bindings for the one-shot operations),
//! `transport::Channel` (WebSocket chat channel with an owned I/O task), and
//! `transport::SessionDriver` (the single-threaded cooperative event loop).

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod debug_log;
pub mod env;
mod error;
mod event;
mod session;
mod state;

#[cfg(feature = "transport")]
pub mod transport;

pub use debug_log::DebugRecorder;
pub use env::Environment;
pub use error::SessionError;
pub use event::{ApiCall, MatchOutcome, SessionAction, SessionEvent};
pub use session::{
    COOLDOWN_SECS, DEVICE_ID_MIN_LEN, ENDED_RESET_DELAY, NEXT_REQUEUE_DELAY, POLL_INTERVAL,
    Session,
};
pub use state::{MatchState, Message, MessageOrigin, OnboardingStage, Profile, VerifiedIdentity};
