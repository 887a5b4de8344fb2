//! Fuzz target for the session state machine
//!
//! Feeds arbitrary event sequences, including out-of-order and stale
//! completions, into a session with a mock clock. Precondition errors are
//! expected; panics and broken invariants are not.

#![no_main]

use std::time::Duration;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use veil_client::{
    env::test_utils::MockEnv, Environment, MatchOutcome, MatchState, Session, SessionEvent,
};
use veil_proto::{EndReason, Gender, ServerFrame};

#[derive(Debug, Arbitrary)]
enum FuzzOp {
    Start,
    RegistrationOk,
    RegistrationErr(String),
    SafetyOk,
    SafetyErr(String),
    SubmitCapture(String),
    VerifyOk,
    VerifyErr(String),
    SubmitProfile(String, String),
    ProfileOk(String),
    ProfileErr(String),
    FindMatch(bool),
    MatchMatched(String),
    MatchQueued,
    MatchErr(String),
    PollMatched(String),
    PollErr(String),
    TestMatched(String),
    CancelQueue,
    SendMessage(String),
    EndLeave,
    EndNext,
    EndReport,
    DeliverChat(String, String),
    DeliverEnded(String),
    DeliverSystem(String),
    DeliverRaw(String),
    ChannelOpened,
    ChannelClosed,
    AdvanceMs(u16),
    Shutdown,
}

fn event(op: FuzzOp, env: &MockEnv) -> SessionEvent {
    match op {
        FuzzOp::Start => SessionEvent::Start,
        FuzzOp::RegistrationOk => SessionEvent::RegistrationCompleted { result: Ok(()) },
        FuzzOp::RegistrationErr(e) => SessionEvent::RegistrationCompleted { result: Err(e) },
        FuzzOp::SafetyOk => SessionEvent::SafetyCheckCompleted { result: Ok(()) },
        FuzzOp::SafetyErr(e) => SessionEvent::SafetyCheckCompleted { result: Err(e) },
        FuzzOp::SubmitCapture(img) => SessionEvent::SubmitCapture { image_base64: img },
        FuzzOp::VerifyOk => SessionEvent::VerificationCompleted { result: Ok(Gender::Male) },
        FuzzOp::VerifyErr(e) => SessionEvent::VerificationCompleted { result: Err(e) },
        FuzzOp::SubmitProfile(nickname, bio) => SessionEvent::SubmitProfile { nickname, bio },
        FuzzOp::ProfileOk(n) => SessionEvent::ProfileCompleted { result: Ok(n) },
        FuzzOp::ProfileErr(e) => SessionEvent::ProfileCompleted { result: Err(e) },
        FuzzOp::FindMatch(is_next) => SessionEvent::FindMatch { is_next },
        FuzzOp::MatchMatched(p) => SessionEvent::MatchCompleted {
            result: Ok(MatchOutcome::Matched { partner_id: p }),
        },
        FuzzOp::MatchQueued => {
            SessionEvent::MatchCompleted { result: Ok(MatchOutcome::Queued) }
        }
        FuzzOp::MatchErr(e) => SessionEvent::MatchCompleted { result: Err(e) },
        FuzzOp::PollMatched(p) => SessionEvent::PollCompleted {
            result: Ok(MatchOutcome::Matched { partner_id: p }),
        },
        FuzzOp::PollErr(e) => SessionEvent::PollCompleted { result: Err(e) },
        FuzzOp::TestMatched(p) => SessionEvent::TestMatchCompleted {
            result: Ok(MatchOutcome::Matched { partner_id: p }),
        },
        FuzzOp::CancelQueue => SessionEvent::CancelQueue,
        FuzzOp::SendMessage(text) => SessionEvent::SendMessage { text },
        FuzzOp::EndLeave => SessionEvent::EndChat { reason: EndReason::Leave },
        FuzzOp::EndNext => SessionEvent::EndChat { reason: EndReason::Next },
        FuzzOp::EndReport => SessionEvent::EndChat { reason: EndReason::Report },
        FuzzOp::DeliverChat(from, message) => {
            SessionEvent::FrameReceived(ServerFrame::Chat { from, message })
        }
        FuzzOp::DeliverEnded(reason) => {
            SessionEvent::FrameReceived(ServerFrame::Ended { reason })
        }
        FuzzOp::DeliverSystem(message) => {
            SessionEvent::FrameReceived(ServerFrame::System { message })
        }
        FuzzOp::DeliverRaw(payload) => {
            SessionEvent::FrameReceived(ServerFrame::parse(&payload))
        }
        FuzzOp::ChannelOpened => SessionEvent::ChannelOpened,
        FuzzOp::ChannelClosed => SessionEvent::ChannelClosed,
        FuzzOp::AdvanceMs(ms) => {
            env.advance(Duration::from_millis(u64::from(ms)));
            SessionEvent::Tick { now: env.now() }
        }
        FuzzOp::Shutdown => SessionEvent::Shutdown,
    }
}

fuzz_target!(|ops: Vec<FuzzOp>| {
    let env = MockEnv::new();
    let mut session = Session::new(env.clone(), "fuzz-device-0001");

    for op in ops {
        let _ = session.handle(event(op, &env));

        // Polling runs iff queued, whatever the event order was
        assert_eq!(
            session.polling_active(),
            *session.match_state() == MatchState::Queued
        );
    }
});
