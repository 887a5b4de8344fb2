//! Session state machine.
//!
//! [`Session`] owns every piece of client-side session state: the onboarding
//! pipeline, matchmaking, the conversation log, and the timers that drive
//! polling and delayed transitions. It performs no I/O. Callers feed it
//! [`SessionEvent`]s one at a time and execute the returned
//! [`SessionAction`]s; request completions come back as further events. All
//! events flow through a single ordered inbox, so no two handlers ever race.
//!
//! Timers are deadlines measured against the caller-supplied clock: the
//! session stores an anchor instant per pending transition and compares it
//! against `Tick { now }`. Ticking more often than needed is harmless.

use std::time::Duration;

use veil_proto::{
    BIO_MAX_LEN, ClientFrame, EndReason, Gender, MatchPreference, NICKNAME_MAX_LEN, ServerFrame,
    ended_notice,
};

use crate::{
    debug_log::DebugRecorder,
    env::Environment,
    error::SessionError,
    event::{ApiCall, MatchOutcome, SessionAction, SessionEvent},
    state::{MatchState, Message, MessageOrigin, OnboardingStage, Profile, VerifiedIdentity},
};

/// Interval between queue status polls while waiting for a partner.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1500);

/// Delay between a partner-initiated chat end and the reset to idle, giving
/// the user time to read the termination notice.
pub const ENDED_RESET_DELAY: Duration = Duration::from_secs(2);

/// Delay before the automatic re-queue that follows a "next" action.
pub const NEXT_REQUEUE_DELAY: Duration = Duration::from_millis(300);

/// Matchmaking cooldown after leaving or reporting a chat, in whole seconds.
pub const COOLDOWN_SECS: u64 = 10;

/// Minimum accepted device identifier length, matching the backend.
pub const DEVICE_ID_MIN_LEN: usize = 8;

/// Client-side session controller.
///
/// Generic over an [`Environment`] so tests can drive a mock clock. The
/// session never reads the clock behind the caller's back except to anchor
/// timers and compute cooldown remainders.
#[derive(Debug, Clone)]
pub struct Session<E: Environment> {
    env: E,
    device_id: String,
    stage: OnboardingStage,
    gender: Option<Gender>,
    profile: Option<Profile>,
    preference: MatchPreference,
    state: MatchState,
    channel_open: bool,
    messages: Vec<Message>,
    /// Cooldown anchor: when it started and its total length in seconds.
    /// Replaced wholesale on every restart, never extended.
    cooldown: Option<(E::Instant, u64)>,
    /// Anchor of the most recent status poll. `Some` iff the state is
    /// `Queued`; this is what "polling is active" means.
    last_poll: Option<E::Instant>,
    /// When the partner ended the chat; drives the delayed reset.
    ended_at: Option<E::Instant>,
    /// When a "next" action landed; drives the delayed re-queue.
    requeue_at: Option<E::Instant>,
    last_error: Option<String>,
    debug: DebugRecorder,
}

impl<E: Environment> Session<E> {
    /// Create an idle session for the given device identifier.
    ///
    /// The identifier is not validated here; [`SessionEvent::Start`] rejects
    /// identifiers shorter than [`DEVICE_ID_MIN_LEN`].
    pub fn new(env: E, device_id: impl Into<String>) -> Self {
        Self {
            env,
            device_id: device_id.into(),
            stage: OnboardingStage::Idle,
            gender: None,
            profile: None,
            preference: MatchPreference::default(),
            state: MatchState::Idle,
            channel_open: false,
            messages: Vec::new(),
            cooldown: None,
            last_poll: None,
            ended_at: None,
            requeue_at: None,
            last_error: None,
            debug: DebugRecorder::new(),
        }
    }

    /// Process one event and return the actions the caller must execute, in
    /// order.
    ///
    /// Errors are precondition violations only; they leave the session
    /// unchanged. Network failures arrive as `Err` payloads inside completion
    /// events and never surface here.
    pub fn handle(
        &mut self,
        event: SessionEvent<E::Instant>,
    ) -> Result<Vec<SessionAction>, SessionError> {
        match event {
            SessionEvent::Start => self.handle_start(),
            SessionEvent::RegistrationCompleted { result } => {
                Ok(self.handle_registration_completed(result))
            }
            SessionEvent::SafetyCheckCompleted { result } => {
                Ok(self.handle_safety_check_completed(result))
            }
            SessionEvent::SubmitCapture { image_base64 } => self.handle_submit_capture(image_base64),
            SessionEvent::VerificationCompleted { result } => {
                Ok(self.handle_verification_completed(result))
            }
            SessionEvent::SubmitProfile { nickname, bio } => {
                self.handle_submit_profile(&nickname, &bio)
            }
            SessionEvent::ProfileCompleted { result } => Ok(self.handle_profile_completed(result)),
            SessionEvent::SetPreference { preference } => {
                self.preference = preference;
                Ok(Vec::new())
            }
            SessionEvent::FindMatch { is_next } => self.find_match(is_next),
            SessionEvent::MatchCompleted { result } => Ok(self.handle_match_completed(result)),
            SessionEvent::PollCompleted { result } => Ok(self.handle_poll_completed(result)),
            SessionEvent::DebugSnapshotCompleted { result } => {
                self.handle_debug_snapshot_completed(result);
                Ok(Vec::new())
            }
            SessionEvent::TestMatchCompleted { result } => {
                Ok(self.handle_test_match_completed(result))
            }
            SessionEvent::CancelQueue => Ok(self.handle_cancel_queue()),
            SessionEvent::RequestTestMatch => self.handle_request_test_match(),
            SessionEvent::SendMessage { text } => Ok(self.handle_send_message(&text)),
            SessionEvent::EndChat { reason } => Ok(self.handle_end_chat(reason)),
            SessionEvent::FrameReceived(frame) => Ok(self.handle_frame(frame)),
            SessionEvent::ChannelOpened => Ok(self.handle_channel_opened()),
            SessionEvent::ChannelClosed => {
                self.channel_open = false;
                self.debug.record("channel closed");
                Ok(Vec::new())
            }
            SessionEvent::ChannelError { message } => {
                self.debug.record(format!("channel error: {message}"));
                Ok(Vec::new())
            }
            SessionEvent::Tick { now } => Ok(self.handle_tick(now)),
            SessionEvent::Shutdown => Ok(self.handle_shutdown()),
        }
    }

    fn handle_start(&mut self) -> Result<Vec<SessionAction>, SessionError> {
        if self.stage != OnboardingStage::Idle {
            return Err(SessionError::WrongStage {
                operation: "start onboarding",
                stage: self.stage.name(),
            });
        }
        let len = self.device_id.chars().count();
        if len < DEVICE_ID_MIN_LEN {
            return Err(SessionError::InvalidDeviceId { len, minimum: DEVICE_ID_MIN_LEN });
        }
        self.stage = OnboardingStage::Registering;
        Ok(vec![SessionAction::SendRequest(ApiCall::OnboardingInit)])
    }

    fn handle_registration_completed(&mut self, result: Result<(), String>) -> Vec<SessionAction> {
        if self.stage != OnboardingStage::Registering {
            self.debug.record("stale registration completion ignored");
            return Vec::new();
        }
        // Registration is best-effort: the backend upserts the device on
        // later calls anyway, so a failure here must not stall onboarding.
        if let Err(reason) = result {
            self.debug.record(format!("registration failed, continuing: {reason}"));
        }
        self.stage = OnboardingStage::CheckingSafety;
        vec![SessionAction::SendRequest(ApiCall::SafetyCheck)]
    }

    fn handle_safety_check_completed(&mut self, result: Result<(), String>) -> Vec<SessionAction> {
        if self.stage != OnboardingStage::CheckingSafety {
            self.debug.record("stale safety-check completion ignored");
            return Vec::new();
        }
        match result {
            Ok(()) => self.stage = OnboardingStage::AwaitingCapture,
            Err(reason) => {
                self.last_error = Some(reason.clone());
                self.stage = OnboardingStage::Blocked { reason };
            }
        }
        Vec::new()
    }

    fn handle_submit_capture(
        &mut self,
        image_base64: String,
    ) -> Result<Vec<SessionAction>, SessionError> {
        if self.stage != OnboardingStage::AwaitingCapture {
            return Err(SessionError::WrongStage {
                operation: "submit capture",
                stage: self.stage.name(),
            });
        }
        self.last_error = None;
        self.stage = OnboardingStage::Verifying;
        Ok(vec![SessionAction::SendRequest(ApiCall::VerifyGender { image_base64 })])
    }

    fn handle_verification_completed(
        &mut self,
        result: Result<Gender, String>,
    ) -> Vec<SessionAction> {
        if self.stage != OnboardingStage::Verifying {
            self.debug.record("stale verification completion ignored");
            return Vec::new();
        }
        match result {
            Ok(gender) => {
                self.gender = Some(gender);
                self.stage = OnboardingStage::AwaitingProfile;
            }
            Err(reason) => {
                // Recoverable: return to capture so the user can retry.
                self.last_error = Some(reason);
                self.stage = OnboardingStage::AwaitingCapture;
            }
        }
        Vec::new()
    }

    fn handle_submit_profile(
        &mut self,
        nickname: &str,
        bio: &str,
    ) -> Result<Vec<SessionAction>, SessionError> {
        if self.stage != OnboardingStage::AwaitingProfile {
            return Err(SessionError::WrongStage {
                operation: "submit profile",
                stage: self.stage.name(),
            });
        }
        let nickname = nickname.trim();
        let bio = bio.trim();
        if nickname.is_empty() {
            return Err(SessionError::InvalidProfile { reason: "nickname must not be empty" });
        }
        if nickname.chars().count() > NICKNAME_MAX_LEN {
            return Err(SessionError::InvalidProfile { reason: "nickname too long" });
        }
        if bio.chars().count() > BIO_MAX_LEN {
            return Err(SessionError::InvalidProfile { reason: "bio too long" });
        }
        self.profile = Some(Profile { nickname: nickname.to_owned(), bio: bio.to_owned() });
        self.last_error = None;
        self.stage = OnboardingStage::SavingProfile;
        Ok(vec![SessionAction::SendRequest(ApiCall::ProfileSetup {
            nickname: nickname.to_owned(),
            bio: bio.to_owned(),
        })])
    }

    fn handle_profile_completed(&mut self, result: Result<String, String>) -> Vec<SessionAction> {
        if self.stage != OnboardingStage::SavingProfile {
            self.debug.record("stale profile completion ignored");
            return Vec::new();
        }
        match result {
            Ok(nickname) => {
                // The server-normalized nickname is authoritative.
                match &mut self.profile {
                    Some(profile) => profile.nickname = nickname,
                    None => self.profile = Some(Profile { nickname, bio: String::new() }),
                }
                self.stage = OnboardingStage::Complete;
            }
            Err(reason) => {
                self.last_error = Some(reason);
                self.stage = OnboardingStage::AwaitingProfile;
            }
        }
        Vec::new()
    }

    fn find_match(&mut self, is_next: bool) -> Result<Vec<SessionAction>, SessionError> {
        match &self.stage {
            OnboardingStage::Complete => {}
            OnboardingStage::Blocked { reason } => {
                return Err(SessionError::Blocked { reason: reason.clone() });
            }
            _ => return Err(SessionError::NotOnboarded),
        }
        match self.state {
            MatchState::Finding => return Err(SessionError::AlreadyFinding),
            // Ending the chat is the only way out of a match; a find that
            // raced it would orphan the open channel.
            MatchState::Matched { .. } => return Err(SessionError::ChatActive),
            MatchState::Idle | MatchState::Queued => {}
        }
        if !is_next {
            let remaining = self.cooldown_remaining();
            if remaining > 0 {
                return Err(SessionError::CooldownActive { remaining });
            }
        }
        self.last_poll = None;
        self.last_error = None;
        self.state = MatchState::Finding;
        // Snapshot the matchmaking pools before the request; diagnostic only.
        Ok(vec![
            SessionAction::SendRequest(ApiCall::MatchDebug),
            SessionAction::SendRequest(ApiCall::MatchFind {
                preference: self.preference,
                is_next,
            }),
        ])
    }

    fn handle_match_completed(
        &mut self,
        result: Result<MatchOutcome, String>,
    ) -> Vec<SessionAction> {
        if self.state != MatchState::Finding {
            self.debug.record("stale match completion ignored");
            return Vec::new();
        }
        match result {
            Ok(MatchOutcome::Matched { partner_id }) => self.enter_matched(partner_id),
            Ok(MatchOutcome::Queued) => {
                self.state = MatchState::Queued;
                self.last_poll = Some(self.env.now());
                Vec::new()
            }
            Ok(MatchOutcome::Waiting { message }) => {
                self.debug.record("match request returned no assignment");
                self.last_error = message.or_else(|| Some("no match available".to_owned()));
                self.state = MatchState::Idle;
                Vec::new()
            }
            Err(reason) => {
                self.last_error = Some(reason);
                self.state = MatchState::Idle;
                Vec::new()
            }
        }
    }

    fn handle_poll_completed(&mut self, result: Result<MatchOutcome, String>) -> Vec<SessionAction> {
        if self.state != MatchState::Queued {
            self.debug.record("stale poll completion ignored");
            return Vec::new();
        }
        match result {
            Ok(MatchOutcome::Matched { partner_id }) => self.enter_matched(partner_id),
            Ok(_) => Vec::new(),
            Err(reason) => {
                // Transient: the poll schedule keeps running.
                self.debug.record(format!("status poll failed: {reason}"));
                Vec::new()
            }
        }
    }

    fn handle_debug_snapshot_completed(&mut self, result: Result<String, String>) {
        match result {
            Ok(line) => self.debug.record(format!("match debug: {line}")),
            Err(reason) => self.debug.record(format!("match debug unavailable: {reason}")),
        }
    }

    fn handle_test_match_completed(
        &mut self,
        result: Result<MatchOutcome, String>,
    ) -> Vec<SessionAction> {
        match result {
            Ok(MatchOutcome::Matched { partner_id }) => self.enter_matched(partner_id),
            Ok(MatchOutcome::Waiting { message }) => {
                let detail = message.unwrap_or_else(|| "no candidate".to_owned());
                self.debug.record(format!("test match: {detail}"));
                Vec::new()
            }
            Ok(MatchOutcome::Queued) => {
                self.debug.record("test match: unexpected queued reply");
                Vec::new()
            }
            Err(reason) => {
                self.debug.record(format!("test match failed: {reason}"));
                Vec::new()
            }
        }
    }

    fn handle_cancel_queue(&mut self) -> Vec<SessionAction> {
        if self.state != MatchState::Queued {
            return Vec::new();
        }
        self.last_poll = None;
        self.state = MatchState::Idle;
        // Best-effort: a failed leave just means the server queue entry goes
        // stale, which the backend tolerates.
        vec![SessionAction::SendRequest(ApiCall::QueueLeave)]
    }

    fn handle_request_test_match(&mut self) -> Result<Vec<SessionAction>, SessionError> {
        if self.stage != OnboardingStage::Complete {
            return Err(SessionError::NotOnboarded);
        }
        Ok(vec![SessionAction::SendRequest(ApiCall::MatchTest)])
    }

    fn handle_send_message(&mut self, text: &str) -> Vec<SessionAction> {
        let text = text.trim();
        if text.is_empty() || !self.channel_open || self.state.partner_id().is_none() {
            return Vec::new();
        }
        // Optimistic append: the log shows the message immediately and never
        // reconciles against delivery acknowledgements.
        self.messages.push(Message::new(MessageOrigin::Own, text));
        vec![SessionAction::SendFrame(ClientFrame::Chat { message: text.to_owned() })]
    }

    fn handle_end_chat(&mut self, reason: EndReason) -> Vec<SessionAction> {
        let mut actions = Vec::new();
        if self.channel_open {
            actions.push(SessionAction::SendFrame(ClientFrame::end(reason)));
            actions.push(SessionAction::CloseChannel);
            self.channel_open = false;
        }
        self.state = MatchState::Idle;
        self.messages.clear();
        self.last_poll = None;
        self.ended_at = None;
        match reason {
            EndReason::Leave | EndReason::Report => {
                // Restart, never extend: a second termination replaces the
                // running cooldown with a fresh full-length one.
                self.cooldown = Some((self.env.now(), COOLDOWN_SECS));
                self.requeue_at = None;
            }
            EndReason::Next => {
                self.requeue_at = Some(self.env.now());
            }
        }
        actions
    }

    fn handle_frame(&mut self, frame: ServerFrame) -> Vec<SessionAction> {
        let Some(partner_id) = self.state.partner_id() else {
            self.debug.record("frame received outside a match, dropped");
            return Vec::new();
        };
        match frame {
            ServerFrame::Chat { from, message } => {
                if from != partner_id {
                    self.debug.record(format!("chat frame from unexpected sender {from}"));
                }
                self.messages.push(Message::new(MessageOrigin::Partner, message));
            }
            ServerFrame::Delivery { to } => {
                let to = to.unwrap_or_default();
                self.debug.record(format!("delivery confirmed to {to}"));
            }
            ServerFrame::Ended { reason } => {
                self.messages.push(Message::new(MessageOrigin::System, ended_notice(&reason)));
                self.ended_at = Some(self.env.now());
            }
            ServerFrame::System { message } => {
                self.messages.push(Message::new(MessageOrigin::System, message));
            }
            ServerFrame::Raw { payload } => {
                // Unknown frames still reach the user rather than vanishing.
                self.messages.push(Message::new(MessageOrigin::System, payload));
            }
        }
        Vec::new()
    }

    fn handle_channel_opened(&mut self) -> Vec<SessionAction> {
        if self.state.partner_id().is_none() {
            // The match ended while the channel was still connecting.
            self.debug.record("channel opened after match ended, closing");
            return vec![SessionAction::CloseChannel];
        }
        self.channel_open = true;
        Vec::new()
    }

    fn handle_tick(&mut self, now: E::Instant) -> Vec<SessionAction> {
        let mut actions = Vec::new();

        if let Some(at) = self.ended_at
            && now - at >= ENDED_RESET_DELAY
        {
            self.ended_at = None;
            if self.channel_open {
                actions.push(SessionAction::CloseChannel);
                self.channel_open = false;
            }
            self.state = MatchState::Idle;
            self.messages.clear();
        }

        if let Some(at) = self.requeue_at
            && now - at >= NEXT_REQUEUE_DELAY
        {
            self.requeue_at = None;
            match self.find_match(true) {
                Ok(find_actions) => actions.extend(find_actions),
                Err(error) => self.debug.record(format!("re-queue skipped: {error}")),
            }
        }

        if self.cooldown.is_some() && self.cooldown_remaining() == 0 {
            self.cooldown = None;
        }

        if self.state == MatchState::Queued
            && let Some(last) = self.last_poll
            && now - last >= POLL_INTERVAL
        {
            self.last_poll = Some(now);
            actions.push(SessionAction::SendRequest(ApiCall::MatchStatus));
        }

        actions
    }

    fn handle_shutdown(&mut self) -> Vec<SessionAction> {
        let mut actions = Vec::new();
        if self.channel_open {
            actions.push(SessionAction::CloseChannel);
            self.channel_open = false;
        }
        self.state = MatchState::Idle;
        self.last_poll = None;
        self.ended_at = None;
        self.requeue_at = None;
        self.cooldown = None;
        actions
    }

    /// Transition into a match, tearing down any prior conversation first.
    ///
    /// The close-before-open ordering is what keeps at most one channel alive
    /// across back-to-back matches.
    fn enter_matched(&mut self, partner_id: String) -> Vec<SessionAction> {
        let mut actions = Vec::new();
        if self.channel_open {
            actions.push(SessionAction::CloseChannel);
            self.channel_open = false;
        }
        self.last_poll = None;
        self.ended_at = None;
        self.requeue_at = None;
        self.last_error = None;
        self.messages.clear();
        self.state = MatchState::Matched { partner_id: partner_id.clone() };
        actions.push(SessionAction::OpenChannel { partner_id });
        actions
    }

    /// Device identifier this session was created with.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Current onboarding stage.
    pub fn stage(&self) -> &OnboardingStage {
        &self.stage
    }

    /// Current matchmaking state.
    pub fn match_state(&self) -> &MatchState {
        &self.state
    }

    /// Partner identifier, present iff matched.
    pub fn partner_id(&self) -> Option<&str> {
        self.state.partner_id()
    }

    /// Current partner preference.
    pub fn preference(&self) -> MatchPreference {
        self.preference
    }

    /// Conversation log, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// True while a chat channel is open.
    pub fn is_channel_open(&self) -> bool {
        self.channel_open
    }

    /// True while the queue status poll schedule is running.
    pub fn polling_active(&self) -> bool {
        self.last_poll.is_some()
    }

    /// Whole seconds of matchmaking cooldown remaining, clamped at zero.
    pub fn cooldown_remaining(&self) -> u64 {
        match self.cooldown {
            Some((started, total)) => total.saturating_sub((self.env.now() - started).as_secs()),
            None => 0,
        }
    }

    /// Most recent user-facing error, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Verified gender and profile, present once onboarding completes.
    pub fn verified_identity(&self) -> Option<VerifiedIdentity> {
        match (self.gender, &self.profile) {
            (Some(gender), Some(profile)) => {
                Some(VerifiedIdentity { gender, profile: profile.clone() })
            }
            _ => None,
        }
    }

    /// Diagnostic recorder.
    pub fn debug_log(&self) -> &DebugRecorder {
        &self.debug
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::env::test_utils::MockEnv;

    const DEVICE: &str = "device-under-test";

    fn session(env: &MockEnv) -> Session<MockEnv> {
        Session::new(env.clone(), DEVICE)
    }

    fn onboarded(env: &MockEnv) -> Session<MockEnv> {
        let mut s = session(env);
        s.handle(SessionEvent::Start).unwrap();
        s.handle(SessionEvent::RegistrationCompleted { result: Ok(()) }).unwrap();
        s.handle(SessionEvent::SafetyCheckCompleted { result: Ok(()) }).unwrap();
        s.handle(SessionEvent::SubmitCapture { image_base64: "img".into() }).unwrap();
        s.handle(SessionEvent::VerificationCompleted { result: Ok(Gender::Female) }).unwrap();
        s.handle(SessionEvent::SubmitProfile { nickname: "nova".into(), bio: "hi".into() })
            .unwrap();
        s.handle(SessionEvent::ProfileCompleted { result: Ok("nova".into()) }).unwrap();
        assert_eq!(*s.stage(), OnboardingStage::Complete);
        s
    }

    fn matched(env: &MockEnv) -> Session<MockEnv> {
        let mut s = onboarded(env);
        s.handle(SessionEvent::FindMatch { is_next: false }).unwrap();
        let actions = s
            .handle(SessionEvent::MatchCompleted {
                result: Ok(MatchOutcome::Matched { partner_id: "partner-1".into() }),
            })
            .unwrap();
        assert!(actions.contains(&SessionAction::OpenChannel { partner_id: "partner-1".into() }));
        s.handle(SessionEvent::ChannelOpened).unwrap();
        s
    }

    fn tick(s: &mut Session<MockEnv>, env: &MockEnv) -> Vec<SessionAction> {
        s.handle(SessionEvent::Tick { now: env.now() }).unwrap()
    }

    #[test]
    fn onboarding_happy_path_emits_each_request_in_order() {
        let env = MockEnv::new();
        let mut s = session(&env);

        let actions = s.handle(SessionEvent::Start).unwrap();
        assert_eq!(actions, [SessionAction::SendRequest(ApiCall::OnboardingInit)]);

        let actions = s.handle(SessionEvent::RegistrationCompleted { result: Ok(()) }).unwrap();
        assert_eq!(actions, [SessionAction::SendRequest(ApiCall::SafetyCheck)]);

        s.handle(SessionEvent::SafetyCheckCompleted { result: Ok(()) }).unwrap();
        assert_eq!(*s.stage(), OnboardingStage::AwaitingCapture);

        let actions =
            s.handle(SessionEvent::SubmitCapture { image_base64: "data:img".into() }).unwrap();
        assert_eq!(
            actions,
            [SessionAction::SendRequest(ApiCall::VerifyGender { image_base64: "data:img".into() })]
        );

        s.handle(SessionEvent::VerificationCompleted { result: Ok(Gender::Male) }).unwrap();
        assert_eq!(*s.stage(), OnboardingStage::AwaitingProfile);

        let actions = s
            .handle(SessionEvent::SubmitProfile { nickname: "  kai ".into(), bio: "".into() })
            .unwrap();
        assert_eq!(
            actions,
            [SessionAction::SendRequest(ApiCall::ProfileSetup {
                nickname: "kai".into(),
                bio: String::new(),
            })]
        );

        s.handle(SessionEvent::ProfileCompleted { result: Ok("kai".into()) }).unwrap();
        assert_eq!(*s.stage(), OnboardingStage::Complete);
        let identity = s.verified_identity().unwrap();
        assert_eq!(identity.gender, Gender::Male);
        assert_eq!(identity.profile.nickname, "kai");
    }

    #[test]
    fn short_device_id_is_rejected_at_start() {
        let env = MockEnv::new();
        let mut s = Session::new(env, "short");
        let err = s.handle(SessionEvent::Start).unwrap_err();
        assert_eq!(err, SessionError::InvalidDeviceId { len: 5, minimum: DEVICE_ID_MIN_LEN });
        assert_eq!(*s.stage(), OnboardingStage::Idle);
    }

    #[test]
    fn registration_failure_does_not_stall_onboarding() {
        let env = MockEnv::new();
        let mut s = session(&env);
        s.handle(SessionEvent::Start).unwrap();
        let actions = s
            .handle(SessionEvent::RegistrationCompleted { result: Err("boom".into()) })
            .unwrap();
        assert_eq!(actions, [SessionAction::SendRequest(ApiCall::SafetyCheck)]);
        assert!(s.debug_log().entries().any(|e| e.contains("registration failed")));
    }

    #[test]
    fn safety_failure_blocks_onboarding_and_matchmaking() {
        let env = MockEnv::new();
        let mut s = session(&env);
        s.handle(SessionEvent::Start).unwrap();
        s.handle(SessionEvent::RegistrationCompleted { result: Ok(()) }).unwrap();
        s.handle(SessionEvent::SafetyCheckCompleted { result: Err("account banned".into()) })
            .unwrap();

        assert_eq!(*s.stage(), OnboardingStage::Blocked { reason: "account banned".into() });
        let err = s.handle(SessionEvent::FindMatch { is_next: false }).unwrap_err();
        assert_eq!(err, SessionError::Blocked { reason: "account banned".into() });
    }

    #[test]
    fn verification_failure_returns_to_capture() {
        let env = MockEnv::new();
        let mut s = session(&env);
        s.handle(SessionEvent::Start).unwrap();
        s.handle(SessionEvent::RegistrationCompleted { result: Ok(()) }).unwrap();
        s.handle(SessionEvent::SafetyCheckCompleted { result: Ok(()) }).unwrap();
        s.handle(SessionEvent::SubmitCapture { image_base64: "img".into() }).unwrap();
        s.handle(SessionEvent::VerificationCompleted { result: Err("no face detected".into()) })
            .unwrap();

        assert_eq!(*s.stage(), OnboardingStage::AwaitingCapture);
        assert_eq!(s.last_error(), Some("no face detected"));

        // Retrying clears the error.
        s.handle(SessionEvent::SubmitCapture { image_base64: "img2".into() }).unwrap();
        assert_eq!(s.last_error(), None);
    }

    #[test]
    fn empty_nickname_is_rejected_locally() {
        let env = MockEnv::new();
        let mut s = session(&env);
        s.handle(SessionEvent::Start).unwrap();
        s.handle(SessionEvent::RegistrationCompleted { result: Ok(()) }).unwrap();
        s.handle(SessionEvent::SafetyCheckCompleted { result: Ok(()) }).unwrap();
        s.handle(SessionEvent::SubmitCapture { image_base64: "img".into() }).unwrap();
        s.handle(SessionEvent::VerificationCompleted { result: Ok(Gender::Female) }).unwrap();

        let err = s
            .handle(SessionEvent::SubmitProfile { nickname: "   ".into(), bio: String::new() })
            .unwrap_err();
        assert_eq!(err, SessionError::InvalidProfile { reason: "nickname must not be empty" });
        assert_eq!(*s.stage(), OnboardingStage::AwaitingProfile);
    }

    #[test]
    fn server_nickname_overrides_the_draft() {
        let env = MockEnv::new();
        let mut s = session(&env);
        s.handle(SessionEvent::Start).unwrap();
        s.handle(SessionEvent::RegistrationCompleted { result: Ok(()) }).unwrap();
        s.handle(SessionEvent::SafetyCheckCompleted { result: Ok(()) }).unwrap();
        s.handle(SessionEvent::SubmitCapture { image_base64: "img".into() }).unwrap();
        s.handle(SessionEvent::VerificationCompleted { result: Ok(Gender::Female) }).unwrap();
        s.handle(SessionEvent::SubmitProfile { nickname: "draft".into(), bio: "b".into() })
            .unwrap();
        s.handle(SessionEvent::ProfileCompleted { result: Ok("normalized".into()) }).unwrap();

        assert_eq!(s.verified_identity().unwrap().profile.nickname, "normalized");
    }

    #[test]
    fn find_before_onboarding_is_rejected() {
        let env = MockEnv::new();
        let mut s = session(&env);
        let err = s.handle(SessionEvent::FindMatch { is_next: false }).unwrap_err();
        assert_eq!(err, SessionError::NotOnboarded);
    }

    #[test]
    fn duplicate_find_is_rejected_while_in_flight() {
        let env = MockEnv::new();
        let mut s = onboarded(&env);
        s.handle(SessionEvent::FindMatch { is_next: false }).unwrap();
        let err = s.handle(SessionEvent::FindMatch { is_next: false }).unwrap_err();
        assert_eq!(err, SessionError::AlreadyFinding);
    }

    #[test]
    fn find_while_matched_is_rejected() {
        let env = MockEnv::new();
        let mut s = matched(&env);
        let err = s.handle(SessionEvent::FindMatch { is_next: false }).unwrap_err();
        assert_eq!(err, SessionError::ChatActive);
        assert!(s.is_channel_open());
    }

    #[test]
    fn find_emits_debug_snapshot_then_match_request() {
        let env = MockEnv::new();
        let mut s = onboarded(&env);
        s.handle(SessionEvent::SetPreference { preference: MatchPreference::Male }).unwrap();
        let actions = s.handle(SessionEvent::FindMatch { is_next: false }).unwrap();
        assert_eq!(
            actions,
            [
                SessionAction::SendRequest(ApiCall::MatchDebug),
                SessionAction::SendRequest(ApiCall::MatchFind {
                    preference: MatchPreference::Male,
                    is_next: false,
                }),
            ]
        );
    }

    #[test]
    fn queued_outcome_starts_polling_on_schedule() {
        let env = MockEnv::new();
        let mut s = onboarded(&env);
        s.handle(SessionEvent::FindMatch { is_next: false }).unwrap();
        s.handle(SessionEvent::MatchCompleted { result: Ok(MatchOutcome::Queued) }).unwrap();
        assert!(s.polling_active());

        // Not yet due.
        env.advance(Duration::from_millis(1000));
        assert!(tick(&mut s, &env).is_empty());

        env.advance(Duration::from_millis(500));
        assert_eq!(tick(&mut s, &env), [SessionAction::SendRequest(ApiCall::MatchStatus)]);

        // The anchor moved: an immediate second tick is quiet.
        assert!(tick(&mut s, &env).is_empty());
    }

    #[test]
    fn poll_error_is_transient() {
        let env = MockEnv::new();
        let mut s = onboarded(&env);
        s.handle(SessionEvent::FindMatch { is_next: false }).unwrap();
        s.handle(SessionEvent::MatchCompleted { result: Ok(MatchOutcome::Queued) }).unwrap();

        s.handle(SessionEvent::PollCompleted { result: Err("timeout".into()) }).unwrap();
        assert_eq!(*s.match_state(), MatchState::Queued);
        assert!(s.polling_active());
        assert!(s.debug_log().entries().any(|e| e.contains("status poll failed")));
    }

    #[test]
    fn poll_match_opens_a_scoped_channel() {
        let env = MockEnv::new();
        let mut s = onboarded(&env);
        s.handle(SessionEvent::FindMatch { is_next: false }).unwrap();
        s.handle(SessionEvent::MatchCompleted { result: Ok(MatchOutcome::Queued) }).unwrap();

        let actions = s
            .handle(SessionEvent::PollCompleted {
                result: Ok(MatchOutcome::Matched { partner_id: "p9".into() }),
            })
            .unwrap();
        assert_eq!(actions, [SessionAction::OpenChannel { partner_id: "p9".into() }]);
        assert_eq!(s.partner_id(), Some("p9"));
        assert!(!s.polling_active());
    }

    #[test]
    fn cancel_queue_stops_polling_and_withdraws() {
        let env = MockEnv::new();
        let mut s = onboarded(&env);
        s.handle(SessionEvent::FindMatch { is_next: false }).unwrap();
        s.handle(SessionEvent::MatchCompleted { result: Ok(MatchOutcome::Queued) }).unwrap();

        let actions = s.handle(SessionEvent::CancelQueue).unwrap();
        assert_eq!(actions, [SessionAction::SendRequest(ApiCall::QueueLeave)]);
        assert_eq!(*s.match_state(), MatchState::Idle);
        assert!(!s.polling_active());

        // A poll completion that raced the cancel is dropped.
        let actions = s
            .handle(SessionEvent::PollCompleted {
                result: Ok(MatchOutcome::Matched { partner_id: "late".into() }),
            })
            .unwrap();
        assert!(actions.is_empty());
        assert_eq!(*s.match_state(), MatchState::Idle);
    }

    #[test]
    fn stale_match_completion_is_dropped() {
        let env = MockEnv::new();
        let mut s = onboarded(&env);
        let actions = s
            .handle(SessionEvent::MatchCompleted {
                result: Ok(MatchOutcome::Matched { partner_id: "ghost".into() }),
            })
            .unwrap();
        assert!(actions.is_empty());
        assert_eq!(*s.match_state(), MatchState::Idle);
        assert!(s.debug_log().entries().any(|e| e.contains("stale match completion")));
    }

    #[test]
    fn match_entry_clears_the_previous_conversation() {
        let env = MockEnv::new();
        let mut s = matched(&env);
        s.handle(SessionEvent::SendMessage { text: "hello".into() }).unwrap();
        assert_eq!(s.messages().len(), 1);

        // A test-match override lands while still chatting: old channel
        // closes first, then the new one opens, and the log resets.
        let actions = s
            .handle(SessionEvent::TestMatchCompleted {
                result: Ok(MatchOutcome::Matched { partner_id: "partner-2".into() }),
            })
            .unwrap();
        assert_eq!(
            actions,
            [
                SessionAction::CloseChannel,
                SessionAction::OpenChannel { partner_id: "partner-2".into() },
            ]
        );
        assert!(s.messages().is_empty());
        assert_eq!(s.partner_id(), Some("partner-2"));
    }

    #[test]
    fn blank_messages_are_dropped() {
        let env = MockEnv::new();
        let mut s = matched(&env);
        let actions = s.handle(SessionEvent::SendMessage { text: "   \n ".into() }).unwrap();
        assert!(actions.is_empty());
        assert!(s.messages().is_empty());
    }

    #[test]
    fn messages_require_an_open_channel() {
        let env = MockEnv::new();
        let mut s = matched(&env);
        s.handle(SessionEvent::ChannelClosed).unwrap();
        let actions = s.handle(SessionEvent::SendMessage { text: "hi".into() }).unwrap();
        assert!(actions.is_empty());
        assert!(s.messages().is_empty());
    }

    #[test]
    fn sent_message_is_appended_optimistically() {
        let env = MockEnv::new();
        let mut s = matched(&env);
        let actions = s.handle(SessionEvent::SendMessage { text: " hey ".into() }).unwrap();
        assert_eq!(
            actions,
            [SessionAction::SendFrame(ClientFrame::Chat { message: "hey".into() })]
        );
        assert_eq!(s.messages(), [Message::new(MessageOrigin::Own, "hey")]);
    }

    #[test]
    fn incoming_chat_frame_lands_at_the_end_of_the_log() {
        let env = MockEnv::new();
        let mut s = matched(&env);
        s.handle(SessionEvent::SendMessage { text: "one".into() }).unwrap();
        s.handle(SessionEvent::FrameReceived(ServerFrame::Chat {
            from: "partner-1".into(),
            message: "two".into(),
        }))
        .unwrap();

        let last = s.messages().last().unwrap();
        assert_eq!(*last, Message::new(MessageOrigin::Partner, "two"));
    }

    #[test]
    fn delivery_frame_does_not_touch_the_log() {
        let env = MockEnv::new();
        let mut s = matched(&env);
        s.handle(SessionEvent::SendMessage { text: "one".into() }).unwrap();
        let before = s.messages().to_vec();
        s.handle(SessionEvent::FrameReceived(ServerFrame::Delivery {
            to: Some("partner-1".into()),
        }))
        .unwrap();
        assert_eq!(s.messages(), before);
    }

    #[test]
    fn unparseable_frame_is_shown_as_system_text() {
        let env = MockEnv::new();
        let mut s = matched(&env);
        s.handle(SessionEvent::FrameReceived(ServerFrame::parse("not json at all"))).unwrap();
        assert_eq!(
            s.messages(),
            [Message::new(MessageOrigin::System, "not json at all")]
        );
    }

    #[test]
    fn partner_ended_resets_after_the_notice_delay() {
        let env = MockEnv::new();
        let mut s = matched(&env);
        s.handle(SessionEvent::SendMessage { text: "hi".into() }).unwrap();
        s.handle(SessionEvent::FrameReceived(ServerFrame::Ended { reason: "next".into() }))
            .unwrap();

        // Notice visible, state still matched.
        assert_eq!(s.messages().last().unwrap().body, "partner moved on");
        assert_eq!(s.partner_id(), Some("partner-1"));

        env.advance(Duration::from_millis(1999));
        assert!(tick(&mut s, &env).is_empty());

        env.advance(Duration::from_millis(1));
        let actions = tick(&mut s, &env);
        assert_eq!(actions, [SessionAction::CloseChannel]);
        assert_eq!(*s.match_state(), MatchState::Idle);
        assert!(s.messages().is_empty());
    }

    #[test]
    fn leave_starts_a_cooldown_that_blocks_matchmaking() {
        let env = MockEnv::new();
        let mut s = matched(&env);
        let actions = s.handle(SessionEvent::EndChat { reason: EndReason::Leave }).unwrap();
        assert_eq!(
            actions,
            [SessionAction::SendFrame(ClientFrame::Leave), SessionAction::CloseChannel]
        );
        assert_eq!(*s.match_state(), MatchState::Idle);
        assert!(s.messages().is_empty());
        assert_eq!(s.cooldown_remaining(), COOLDOWN_SECS);

        let err = s.handle(SessionEvent::FindMatch { is_next: false }).unwrap_err();
        assert_eq!(err, SessionError::CooldownActive { remaining: COOLDOWN_SECS });

        env.advance(Duration::from_secs(COOLDOWN_SECS));
        tick(&mut s, &env);
        assert_eq!(s.cooldown_remaining(), 0);
        assert!(s.handle(SessionEvent::FindMatch { is_next: false }).is_ok());
    }

    #[test]
    fn repeated_terminations_restart_the_cooldown_without_compounding() {
        let env = MockEnv::new();
        let mut s = matched(&env);
        s.handle(SessionEvent::EndChat { reason: EndReason::Leave }).unwrap();

        env.advance(Duration::from_secs(6));
        assert_eq!(s.cooldown_remaining(), COOLDOWN_SECS - 6);

        // Second termination while the first cooldown is still running.
        s.handle(SessionEvent::EndChat { reason: EndReason::Report }).unwrap();
        assert_eq!(s.cooldown_remaining(), COOLDOWN_SECS);
    }

    #[test]
    fn next_requeues_once_after_the_delay_and_skips_the_cooldown() {
        let env = MockEnv::new();
        let mut s = matched(&env);
        let actions = s.handle(SessionEvent::EndChat { reason: EndReason::Next }).unwrap();
        assert_eq!(
            actions,
            [SessionAction::SendFrame(ClientFrame::Next), SessionAction::CloseChannel]
        );
        assert_eq!(s.cooldown_remaining(), 0);

        env.advance(Duration::from_millis(299));
        assert!(tick(&mut s, &env).is_empty());

        env.advance(Duration::from_millis(1));
        let actions = tick(&mut s, &env);
        assert_eq!(
            actions,
            [
                SessionAction::SendRequest(ApiCall::MatchDebug),
                SessionAction::SendRequest(ApiCall::MatchFind {
                    preference: MatchPreference::Any,
                    is_next: true,
                }),
            ]
        );
        assert_eq!(*s.match_state(), MatchState::Finding);

        // Fires exactly once.
        env.advance(Duration::from_secs(1));
        assert!(tick(&mut s, &env).is_empty());
    }

    #[test]
    fn next_bypasses_an_active_cooldown() {
        let env = MockEnv::new();
        let mut s = matched(&env);
        s.handle(SessionEvent::EndChat { reason: EndReason::Leave }).unwrap();
        assert!(s.cooldown_remaining() > 0);

        let actions = s.handle(SessionEvent::FindMatch { is_next: true }).unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(*s.match_state(), MatchState::Finding);
    }

    #[test]
    fn frames_outside_a_match_are_dropped() {
        let env = MockEnv::new();
        let mut s = onboarded(&env);
        s.handle(SessionEvent::FrameReceived(ServerFrame::Chat {
            from: "nobody".into(),
            message: "ghost".into(),
        }))
        .unwrap();
        assert!(s.messages().is_empty());
    }

    #[test]
    fn late_channel_open_is_closed_again() {
        let env = MockEnv::new();
        let mut s = matched(&env);
        s.handle(SessionEvent::EndChat { reason: EndReason::Leave }).unwrap();

        let actions = s.handle(SessionEvent::ChannelOpened).unwrap();
        assert_eq!(actions, [SessionAction::CloseChannel]);
        assert!(!s.is_channel_open());
    }

    #[test]
    fn shutdown_closes_the_channel_and_clears_timers() {
        let env = MockEnv::new();
        let mut s = matched(&env);
        s.handle(SessionEvent::FrameReceived(ServerFrame::Ended { reason: "leave".into() }))
            .unwrap();

        let actions = s.handle(SessionEvent::Shutdown).unwrap();
        assert_eq!(actions, [SessionAction::CloseChannel]);
        assert_eq!(*s.match_state(), MatchState::Idle);
        assert!(!s.polling_active());

        // No delayed reset fires afterwards.
        env.advance(Duration::from_secs(5));
        assert!(tick(&mut s, &env).is_empty());
    }
}
