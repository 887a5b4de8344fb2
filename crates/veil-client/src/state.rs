//! Observable session state types.
//!
//! These structures are the "view model" of the controller: the subset of
//! session state a presentation layer needs, with none of the transport
//! mechanics underneath.

use veil_proto::Gender;

/// Where the session stands in the forward-only onboarding pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnboardingStage {
    /// Onboarding has not started.
    Idle,
    /// Device registration in flight.
    Registering,
    /// Safety/ban check in flight.
    CheckingSafety,
    /// Waiting for the user to submit a captured image.
    AwaitingCapture,
    /// Verification request in flight.
    Verifying,
    /// Waiting for the user to submit nickname and bio.
    AwaitingProfile,
    /// Profile request in flight.
    SavingProfile,
    /// Onboarding finished; matchmaking is available.
    Complete,
    /// Safety check failed; no further progress is possible.
    Blocked {
        /// Server-supplied reason shown to the user.
        reason: String,
    },
}

impl OnboardingStage {
    /// Short stage name for diagnostics and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Registering => "registering",
            Self::CheckingSafety => "checking-safety",
            Self::AwaitingCapture => "awaiting-capture",
            Self::Verifying => "verifying",
            Self::AwaitingProfile => "awaiting-profile",
            Self::SavingProfile => "saving-profile",
            Self::Complete => "complete",
            Self::Blocked { .. } => "blocked",
        }
    }
}

/// Matchmaking state. Exactly one value at a time; the partner identifier
/// exists iff the state is `Matched`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchState {
    /// Not looking for a partner.
    Idle,
    /// A match request is in flight.
    Finding,
    /// Waiting in the server-side queue; status polling is active.
    Queued,
    /// Paired with a partner; a chat channel is open or opening for it.
    Matched {
        /// Opaque identifier of the paired counterpart.
        partner_id: String,
    },
}

impl MatchState {
    /// Partner identifier, present iff matched.
    pub fn partner_id(&self) -> Option<&str> {
        match self {
            Self::Matched { partner_id } => Some(partner_id),
            _ => None,
        }
    }
}

/// Who produced a message in the conversation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOrigin {
    /// Sent by this device.
    Own,
    /// Received from the partner.
    Partner,
    /// Produced by the server or the controller itself.
    System,
}

/// One entry in the conversation log. Immutable once appended; the log
/// mutates only by appending or by a full clear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Who produced the message.
    pub origin: MessageOrigin,
    /// Message text.
    pub body: String,
}

impl Message {
    /// Message with the given origin and body.
    pub fn new(origin: MessageOrigin, body: impl Into<String>) -> Self {
        Self { origin, body: body.into() }
    }
}

/// Verified identity established by the onboarding gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    /// Display nickname. After profile setup succeeds this holds the
    /// server-normalized value, which is authoritative.
    pub nickname: String,
    /// Short bio.
    pub bio: String,
}

/// Gender classification paired with the profile, exposed together for
/// presentation layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    /// Classification from the verification step.
    pub gender: Gender,
    /// Display profile.
    pub profile: Profile,
}
