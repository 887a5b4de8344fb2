//! Session precondition errors.
//!
//! These cover only violations the caller can act on locally (wrong stage,
//! active cooldown, duplicate request). Network failures never surface here:
//! they arrive inside completion events as `Err(reason)` payloads and are
//! absorbed by the state machine per the error taxonomy.

use thiserror::Error;

/// Errors returned when an event violates a session precondition.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The device identifier does not meet the backend's minimum length.
    #[error("invalid device id: {len} chars (minimum {minimum})")]
    InvalidDeviceId {
        /// Length of the rejected identifier.
        len: usize,
        /// Required minimum length.
        minimum: usize,
    },

    /// Matchmaking requires completed verification and profile setup.
    #[error("onboarding incomplete: verification and profile setup required")]
    NotOnboarded,

    /// The safety check failed; onboarding cannot proceed.
    #[error("account blocked: {reason}")]
    Blocked {
        /// Server-supplied reason.
        reason: String,
    },

    /// A termination cooldown is still running.
    #[error("cooldown active: {remaining}s remaining")]
    CooldownActive {
        /// Whole seconds until matchmaking unblocks.
        remaining: u64,
    },

    /// A match request is already in flight.
    #[error("a match request is already in flight")]
    AlreadyFinding,

    /// A chat session is still active; it must end before searching again.
    #[error("a chat session is already active")]
    ChatActive,

    /// The onboarding pipeline is not at the stage this operation expects.
    #[error("cannot {operation} at onboarding stage {stage}")]
    WrongStage {
        /// Operation that was attempted.
        operation: &'static str,
        /// Current stage name.
        stage: &'static str,
    },

    /// Locally rejected profile input (empty nickname, oversized fields).
    #[error("invalid profile: {reason}")]
    InvalidProfile {
        /// What was wrong with the input.
        reason: &'static str,
    },
}
