//! Session events and actions.
//!
//! The caller is responsible for:
//! - executing [`ApiCall`] requests and feeding back the matching
//!   `*Completed` event
//! - receiving frames from the chat channel
//! - driving time forward via ticks
//! - forwarding user intents (submit capture, find match, send message, ...)
//!
//! Generic over `I` (instant type) to support both production
//! (`std::time::Instant`) and mock-clock environments.

use veil_proto::{EndReason, Gender, MatchPreference, ServerFrame};

/// One-shot request the caller must execute against the backend.
///
/// The device identifier is supplied by the transport, which owns it for the
/// process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    /// `onboarding.init` - best-effort device registration.
    OnboardingInit,
    /// `safety.check` - ban check; fatal to onboarding on failure.
    SafetyCheck,
    /// `verify.gender` - submit a captured image for classification.
    VerifyGender {
        /// Captured image as a base64 data URL.
        image_base64: String,
    },
    /// `profile.setup` - submit nickname and bio.
    ProfileSetup {
        /// Whitespace-trimmed nickname.
        nickname: String,
        /// Whitespace-trimmed bio.
        bio: String,
    },
    /// `match.find` - request a partner.
    MatchFind {
        /// Current partner preference.
        preference: MatchPreference,
        /// Whether this request came from a "next" action.
        is_next: bool,
    },
    /// `match.status` - one poll of the queue.
    MatchStatus,
    /// `match.debug` - best-effort diagnostic snapshot.
    MatchDebug,
    /// `match.testMatch` - manual matchmaking override for demos.
    MatchTest,
    /// `queue.leave` - best-effort queue withdrawal.
    QueueLeave,
}

/// Outcome of a matchmaking request or status poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// A partner was assigned.
    Matched {
        /// Opaque identifier of the assigned partner.
        partner_id: String,
    },
    /// The device entered the waiting queue.
    Queued,
    /// No match yet.
    Waiting {
        /// Optional detail (test-match replies).
        message: Option<String>,
    },
}

/// Events the caller feeds into the session, in receipt order.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent<I = std::time::Instant> {
    /// Begin onboarding.
    Start,
    /// `onboarding.init` finished. Failure is non-fatal.
    RegistrationCompleted {
        /// Registration outcome; `Err` carries the reason.
        result: Result<(), String>,
    },
    /// `safety.check` finished. Failure blocks onboarding.
    SafetyCheckCompleted {
        /// Check outcome; `Err` carries the server-supplied reason.
        result: Result<(), String>,
    },
    /// User submitted a captured image.
    SubmitCapture {
        /// Captured image as a base64 data URL.
        image_base64: String,
    },
    /// `verify.gender` finished.
    VerificationCompleted {
        /// Classification or user-visible reason.
        result: Result<Gender, String>,
    },
    /// User submitted nickname and bio.
    SubmitProfile {
        /// Nickname draft (trimmed by the session).
        nickname: String,
        /// Bio draft (trimmed by the session).
        bio: String,
    },
    /// `profile.setup` finished; `Ok` carries the authoritative nickname.
    ProfileCompleted {
        /// Server-normalized nickname or user-visible reason.
        result: Result<String, String>,
    },
    /// Change the partner preference. Irrelevant once matched.
    SetPreference {
        /// New preference.
        preference: MatchPreference,
    },
    /// Request a partner.
    FindMatch {
        /// Bypass the cooldown check (set by the internal "next" re-queue).
        is_next: bool,
    },
    /// `match.find` finished.
    MatchCompleted {
        /// Matchmaking outcome or user-visible reason.
        result: Result<MatchOutcome, String>,
    },
    /// `match.status` finished.
    PollCompleted {
        /// Poll outcome; errors are transient and recorded only.
        result: Result<MatchOutcome, String>,
    },
    /// `match.debug` finished. Failures are swallowed.
    DebugSnapshotCompleted {
        /// Diagnostic line or reason; recorded either way.
        result: Result<String, String>,
    },
    /// `match.testMatch` finished.
    TestMatchCompleted {
        /// Override outcome or reason.
        result: Result<MatchOutcome, String>,
    },
    /// Withdraw from the waiting queue.
    CancelQueue,
    /// Trigger the manual matchmaking override.
    RequestTestMatch,
    /// Send a chat message to the partner.
    SendMessage {
        /// Message text; empty after trimming is a no-op.
        text: String,
    },
    /// Terminate the active chat.
    EndChat {
        /// Why the chat is ending; determines cooldown/re-queue policy.
        reason: EndReason,
    },
    /// Frame received on the chat channel.
    FrameReceived(ServerFrame),
    /// The chat channel finished opening.
    ChannelOpened,
    /// The chat channel closed (locally or remotely).
    ChannelClosed,
    /// The chat channel reported a transport error. Not retried here.
    ChannelError {
        /// Error description.
        message: String,
    },
    /// Time tick for poll scheduling, cooldown decrement, and delayed
    /// transitions. The caller should tick at least a few times per second.
    Tick {
        /// Current time from the environment.
        now: I,
    },
    /// Tear down the controller: close the channel, clear all timers.
    Shutdown,
}

/// Actions the session produces for the caller to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Execute a one-shot request and feed back the matching completion.
    SendRequest(ApiCall),
    /// Open a chat channel scoped to this partner. Always preceded by
    /// [`SessionAction::CloseChannel`] when a prior channel may be open.
    OpenChannel {
        /// Partner the new channel is scoped to.
        partner_id: String,
    },
    /// Close the current chat channel, if any.
    CloseChannel,
    /// Transmit a frame on the chat channel.
    SendFrame(veil_proto::ClientFrame),
}
