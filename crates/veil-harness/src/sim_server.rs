//! Scripted in-memory backend.
//!
//! Stands in for the REST side of the service: each [`ApiCall`] maps to the
//! completion event the real transport would feed back, with outcomes taken
//! from per-operation scripts. Unscripted operations fall back to the
//! backend's default behavior (registration succeeds, matchmaking queues).

use std::collections::VecDeque;

use veil_client::{ApiCall, MatchOutcome, SessionEvent};
use veil_proto::{Gender, MatchPreference};

/// Scripted backend model.
///
/// Mutable scripts are consumed front-to-back; counters and request records
/// are public so tests can assert on what the session actually sent.
pub struct SimServer {
    ban_reason: Option<String>,
    registration_error: Option<String>,
    verify_result: Result<Gender, String>,
    find_script: VecDeque<Result<MatchOutcome, String>>,
    status_script: VecDeque<Result<MatchOutcome, String>>,
    test_reply: Result<MatchOutcome, String>,
    /// Every `match.find` request observed, as `(preference, is_next)`.
    pub find_requests: Vec<(MatchPreference, bool)>,
    /// Number of `match.status` polls observed.
    pub status_polls: usize,
    /// Number of `queue.leave` requests observed.
    pub queue_leaves: usize,
}

impl Default for SimServer {
    fn default() -> Self {
        Self::new()
    }
}

impl SimServer {
    /// Backend where onboarding succeeds and matchmaking always queues.
    pub fn new() -> Self {
        Self {
            ban_reason: None,
            registration_error: None,
            verify_result: Ok(Gender::Female),
            find_script: VecDeque::new(),
            status_script: VecDeque::new(),
            test_reply: Ok(MatchOutcome::Waiting { message: Some("no candidate".to_owned()) }),
            find_requests: Vec::new(),
            status_polls: 0,
            queue_leaves: 0,
        }
    }

    /// Fail the safety check with this reason.
    #[must_use]
    pub fn with_ban(mut self, reason: impl Into<String>) -> Self {
        self.ban_reason = Some(reason.into());
        self
    }

    /// Fail device registration with this reason.
    #[must_use]
    pub fn with_registration_error(mut self, reason: impl Into<String>) -> Self {
        self.registration_error = Some(reason.into());
        self
    }

    /// Script the verification outcome.
    #[must_use]
    pub fn with_verify_result(mut self, result: Result<Gender, String>) -> Self {
        self.verify_result = result;
        self
    }

    /// Append a scripted reply to the next `match.find` request.
    #[must_use]
    pub fn with_find_reply(mut self, reply: Result<MatchOutcome, String>) -> Self {
        self.find_script.push_back(reply);
        self
    }

    /// Append a scripted reply to the next `match.status` poll.
    #[must_use]
    pub fn with_status_reply(mut self, reply: Result<MatchOutcome, String>) -> Self {
        self.status_script.push_back(reply);
        self
    }

    /// Script the `match.testMatch` reply.
    #[must_use]
    pub fn with_test_reply(mut self, reply: Result<MatchOutcome, String>) -> Self {
        self.test_reply = reply;
        self
    }

    /// Produce the completion event for one request, or `None` for
    /// fire-and-forget operations.
    pub fn respond(&mut self, call: ApiCall) -> Option<SessionEvent> {
        match call {
            ApiCall::OnboardingInit => {
                let result = match &self.registration_error {
                    Some(reason) => Err(reason.clone()),
                    None => Ok(()),
                };
                Some(SessionEvent::RegistrationCompleted { result })
            }
            ApiCall::SafetyCheck => {
                let result = match &self.ban_reason {
                    Some(reason) => Err(reason.clone()),
                    None => Ok(()),
                };
                Some(SessionEvent::SafetyCheckCompleted { result })
            }
            ApiCall::VerifyGender { .. } => {
                Some(SessionEvent::VerificationCompleted { result: self.verify_result.clone() })
            }
            ApiCall::ProfileSetup { nickname, .. } => {
                // Echo the nickname back; the session must adopt it.
                Some(SessionEvent::ProfileCompleted { result: Ok(nickname) })
            }
            ApiCall::MatchFind { preference, is_next } => {
                self.find_requests.push((preference, is_next));
                let result = self.find_script.pop_front().unwrap_or(Ok(MatchOutcome::Queued));
                Some(SessionEvent::MatchCompleted { result })
            }
            ApiCall::MatchStatus => {
                self.status_polls += 1;
                let result = self
                    .status_script
                    .pop_front()
                    .unwrap_or(Ok(MatchOutcome::Waiting { message: None }));
                Some(SessionEvent::PollCompleted { result })
            }
            ApiCall::MatchDebug => Some(SessionEvent::DebugSnapshotCompleted {
                result: Ok("pool snapshot".to_owned()),
            }),
            ApiCall::MatchTest => {
                Some(SessionEvent::TestMatchCompleted { result: self.test_reply.clone() })
            }
            ApiCall::QueueLeave => {
                self.queue_leaves += 1;
                None
            }
        }
    }
}
