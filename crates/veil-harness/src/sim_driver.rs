//! Simulation driver.
//!
//! `SimDriver` plays the role the production transport driver plays: it
//! executes the session's actions against a [`SimServer`], tracks channel
//! lifecycle, and feeds completions back through the same ordered work queue.
//! Time only moves through [`SimDriver::advance`], so schedules and delays
//! are exact.

use std::{collections::VecDeque, time::Duration};

use veil_client::{
    Environment, Session, SessionAction, SessionError, SessionEvent, env::test_utils::MockEnv,
};
use veil_proto::{ClientFrame, EndReason, ServerFrame};

use crate::{
    invariants::{InvariantRegistry, SessionSnapshot},
    sim_server::SimServer,
};

/// Device identifier used by simulated sessions.
pub const SIM_DEVICE_ID: &str = "sim-device-0001";

/// Deterministic driver pairing a real session with a scripted backend.
///
/// Every dispatched event is followed by an invariant check, so scenario
/// tests fail at the exact step that breaks a property.
pub struct SimDriver {
    env: MockEnv,
    session: Session<MockEnv>,
    server: SimServer,
    open_channels: usize,
    channel_partner: Option<String>,
    sent_frames: Vec<ClientFrame>,
    invariants: InvariantRegistry,
}

impl SimDriver {
    /// Driver over the given backend, with the standard invariants armed.
    pub fn new(server: SimServer) -> Self {
        let env = MockEnv::new();
        let session = Session::new(env.clone(), SIM_DEVICE_ID);
        Self {
            env,
            session,
            server,
            open_channels: 0,
            channel_partner: None,
            sent_frames: Vec::new(),
            invariants: InvariantRegistry::standard(),
        }
    }

    /// The session under test.
    pub fn session(&self) -> &Session<MockEnv> {
        &self.session
    }

    /// The scripted backend, for assertions on observed requests.
    pub fn server(&self) -> &SimServer {
        &self.server
    }

    /// Frames the session transmitted on the channel, in order.
    pub fn sent_frames(&self) -> &[ClientFrame] {
        &self.sent_frames
    }

    /// Channels currently held open by the simulated transport.
    pub fn open_channels(&self) -> usize {
        self.open_channels
    }

    /// Dispatch one event, executing resulting actions and queueing the
    /// completions they produce behind it.
    pub fn dispatch(&mut self, event: SessionEvent) -> Result<(), SessionError> {
        let mut pending = VecDeque::new();
        pending.push_back(event);

        while let Some(event) = pending.pop_front() {
            tracing::debug!(?event, "dispatch");
            let actions = self.session.handle(event)?;
            for action in actions {
                match action {
                    SessionAction::SendRequest(call) => {
                        if let Some(completion) = self.server.respond(call) {
                            pending.push_back(completion);
                        }
                    }
                    SessionAction::OpenChannel { partner_id } => {
                        self.open_channels += 1;
                        self.channel_partner = Some(partner_id);
                        // Connection completes instantly in simulation.
                        pending.push_back(SessionEvent::ChannelOpened);
                    }
                    SessionAction::CloseChannel => {
                        if self.open_channels > 0 {
                            self.open_channels -= 1;
                        }
                        if self.open_channels == 0 {
                            self.channel_partner = None;
                        }
                        pending.push_back(SessionEvent::ChannelClosed);
                    }
                    SessionAction::SendFrame(frame) => {
                        self.sent_frames.push(frame);
                    }
                }
            }
            self.check_invariants();
        }
        Ok(())
    }

    /// Advance the clock and deliver one tick.
    pub fn advance(&mut self, delta: Duration) -> Result<(), SessionError> {
        self.env.advance(delta);
        self.dispatch(SessionEvent::Tick { now: self.env.now() })
    }

    /// Deliver an inbound frame on the channel.
    pub fn deliver(&mut self, frame: ServerFrame) -> Result<(), SessionError> {
        self.dispatch(SessionEvent::FrameReceived(frame))
    }

    /// Drive onboarding to completion with default inputs.
    pub fn onboard(&mut self) -> Result<(), SessionError> {
        self.dispatch(SessionEvent::Start)?;
        self.dispatch(SessionEvent::SubmitCapture { image_base64: "data:sim".to_owned() })?;
        self.dispatch(SessionEvent::SubmitProfile {
            nickname: "sim".to_owned(),
            bio: String::new(),
        })
    }

    /// End the active chat with the given reason.
    pub fn end_chat(&mut self, reason: EndReason) -> Result<(), SessionError> {
        self.dispatch(SessionEvent::EndChat { reason })
    }

    fn check_invariants(&self) {
        let snapshot = SessionSnapshot::capture(
            &self.session,
            self.open_channels,
            self.channel_partner.as_deref(),
        );
        self.invariants.assert_all(&snapshot, "after dispatch");
    }
}
