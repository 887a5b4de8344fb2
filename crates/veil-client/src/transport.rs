//! HTTP and WebSocket transport for the session controller.
//!
//! Thin I/O layer around the Sans-IO [`Session`](crate::Session): one-shot
//! REST operations go through [`RestApi`], the partner chat runs over a
//! [`Channel`] with an owned I/O task, and [`SessionDriver`] ties both to the
//! state machine with a single ordered inbox. Protocol logic stays in the
//! session; this module only moves bytes and reports outcomes as events.

use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use thiserror::Error;
use tokio::{
    net::TcpStream,
    sync::mpsc,
    time::MissedTickBehavior,
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message as WsMessage,
};
use veil_proto::{
    ClientFrame, DebugResponse, DeviceRequest, InitResponse, MatchRequest, MatchResponse,
    MatchStatus, ProfileRequest, ProfileResponse, ServerFrame, VerifyRequest, VerifyResponse,
};

use crate::{
    env::Environment,
    event::{ApiCall, MatchOutcome, SessionAction, SessionEvent},
    session::Session,
};

/// How often the driver ticks the session when no events arrive.
const TICK_PERIOD: Duration = Duration::from_millis(250);

/// User-facing fallback when the server gives no usable failure detail.
const GENERIC_FAILURE: &str = "Something went wrong. Please try again.";

/// Production environment backed by the system monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl Environment for SystemEnv {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection could not be established.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The chat channel broke mid-session.
    #[error("channel error: {0}")]
    Channel(String),
}

/// Endpoints and identity for one backend.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// REST base URL without a trailing slash, e.g. `http://127.0.0.1:8000`.
    pub base_url: String,
    /// WebSocket base URL without a trailing slash, e.g. `ws://127.0.0.1:8000`.
    pub ws_url: String,
    /// Stable opaque device identifier.
    pub device_id: String,
}

/// Error body the backend attaches to non-success responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
}

/// HTTP bindings for the one-shot operations.
///
/// Every method maps a request to the completion event the session expects.
/// Transport and server failures collapse into the `Err(reason)` payload of
/// that event; nothing here returns a hard error to the driver.
#[derive(Debug, Clone)]
pub struct RestApi {
    http: reqwest::Client,
    config: TransportConfig,
}

impl RestApi {
    /// REST bindings for the given backend.
    pub fn new(config: TransportConfig) -> Self {
        Self { http: reqwest::Client::new(), config }
    }

    /// Execute one request and return the completion event to feed back, or
    /// `None` for fire-and-forget operations.
    pub async fn execute(&self, call: ApiCall) -> Option<SessionEvent> {
        let device_id = self.config.device_id.clone();
        match call {
            ApiCall::OnboardingInit => {
                let result = self
                    .post::<_, InitResponse>("/onboarding/init", &DeviceRequest { device_id })
                    .await
                    .and_then(|resp| match resp.status.as_str() {
                        "ok" => Ok(()),
                        _ => Err(resp.message.unwrap_or_else(|| GENERIC_FAILURE.to_owned())),
                    });
                Some(SessionEvent::RegistrationCompleted { result })
            }
            ApiCall::SafetyCheck => {
                let result = self
                    .post::<_, InitResponse>("/safety/check", &DeviceRequest { device_id })
                    .await
                    .map(|_| ());
                Some(SessionEvent::SafetyCheckCompleted { result })
            }
            ApiCall::VerifyGender { image_base64 } => {
                let result = self
                    .post::<_, VerifyResponse>(
                        "/verify/gender",
                        &VerifyRequest { device_id, image_base64 },
                    )
                    .await
                    .map(|resp| resp.gender);
                Some(SessionEvent::VerificationCompleted { result })
            }
            ApiCall::ProfileSetup { nickname, bio } => {
                let result = self
                    .post::<_, ProfileResponse>(
                        "/profile/setup",
                        &ProfileRequest { device_id, nickname, bio },
                    )
                    .await
                    .map(|resp| resp.nickname);
                Some(SessionEvent::ProfileCompleted { result })
            }
            ApiCall::MatchFind { preference, is_next } => {
                let result = self
                    .post::<_, MatchResponse>(
                        "/match/find",
                        &MatchRequest { device_id, preference, is_next },
                    )
                    .await
                    .map(outcome);
                Some(SessionEvent::MatchCompleted { result })
            }
            ApiCall::MatchStatus => {
                let result = self
                    .post::<_, MatchResponse>("/match/status", &DeviceRequest { device_id })
                    .await
                    .map(outcome);
                Some(SessionEvent::PollCompleted { result })
            }
            ApiCall::MatchDebug => {
                let result = self
                    .post::<_, DebugResponse>("/match/debug", &DeviceRequest { device_id })
                    .await
                    .map(|resp| {
                        format!("gender={:?} preference={:?}", resp.gender, resp.preference)
                    });
                Some(SessionEvent::DebugSnapshotCompleted { result })
            }
            ApiCall::MatchTest => {
                let result = self
                    .post::<_, MatchResponse>("/match/test_match", &DeviceRequest { device_id })
                    .await
                    .map(outcome);
                Some(SessionEvent::TestMatchCompleted { result })
            }
            ApiCall::QueueLeave => {
                // Fire-and-forget; a stale server queue entry is tolerated.
                if let Err(reason) =
                    self.post::<_, InitResponse>("/queue/leave", &DeviceRequest { device_id }).await
                {
                    tracing::debug!(%reason, "queue leave failed");
                }
                None
            }
        }
    }

    /// POST `body` to `path`, mapping failures to a user-facing reason.
    ///
    /// The backend reports failures as `{"detail": "..."}`; that detail is
    /// surfaced verbatim when present, otherwise a generic message stands in.
    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, String>
    where
        B: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        let url = format!("{}{path}", self.config.base_url);
        let response = self.http.post(&url).json(body).send().await.map_err(|error| {
            tracing::debug!(%error, path, "request failed");
            GENERIC_FAILURE.to_owned()
        })?;

        let status = response.status();
        if status.is_success() {
            response.json::<R>().await.map_err(|error| {
                tracing::debug!(%error, path, "malformed response body");
                GENERIC_FAILURE.to_owned()
            })
        } else {
            tracing::debug!(%status, path, "request rejected");
            match response.json::<ErrorBody>().await {
                Ok(body) => Err(body.detail),
                Err(_) => Err(GENERIC_FAILURE.to_owned()),
            }
        }
    }
}

/// Map a matchmaking response onto the session's outcome vocabulary.
fn outcome(resp: MatchResponse) -> MatchOutcome {
    match (resp.status, resp.partner_id) {
        (MatchStatus::Matched, Some(partner_id)) => MatchOutcome::Matched { partner_id },
        // A matched status without a partner is unusable; treat as no match.
        (MatchStatus::Matched, None) | (MatchStatus::Waiting, _) => {
            MatchOutcome::Waiting { message: resp.message }
        }
        (MatchStatus::Queued, _) => MatchOutcome::Queued,
    }
}

/// Handle to an open chat channel.
///
/// The WebSocket I/O runs in an owned task; frames go out through an mpsc
/// sender and everything inbound arrives on the driver's inbox as session
/// events. Dropping the handle does not close the task; call
/// [`Channel::close`].
pub struct Channel {
    to_server: mpsc::Sender<ClientFrame>,
    abort_handle: tokio::task::AbortHandle,
}

impl Channel {
    /// Connect and spawn the I/O task.
    ///
    /// [`SessionEvent::ChannelOpened`] is emitted on `events` once the
    /// connection is live, and [`SessionEvent::ChannelClosed`] when the task
    /// winds down for any reason.
    pub async fn open(
        ws_url: &str,
        device_id: &str,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<Self, TransportError> {
        let url = format!("{ws_url}/ws?device_id={device_id}");
        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Connection(format!("websocket connect failed: {e}")))?;

        let (to_server_tx, to_server_rx) = mpsc::channel::<ClientFrame>(32);
        let handle = tokio::spawn(run_channel(stream, to_server_rx, events));

        Ok(Self { to_server: to_server_tx, abort_handle: handle.abort_handle() })
    }

    /// Queue a frame for transmission.
    pub async fn send(&self, frame: ClientFrame) -> Result<(), TransportError> {
        self.to_server
            .send(frame)
            .await
            .map_err(|_| TransportError::Channel("channel task stopped".to_owned()))
    }

    /// Stop the I/O task.
    pub fn close(&self) {
        self.abort_handle.abort();
    }
}

/// Bridge between the WebSocket and the driver's inbox.
async fn run_channel(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut to_server: mpsc::Receiver<ClientFrame>,
    events: mpsc::Sender<SessionEvent>,
) {
    let (mut sink, mut source) = stream.split();

    if events.send(SessionEvent::ChannelOpened).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            outbound = to_server.recv() => {
                let Some(frame) = outbound else { break };
                let text = match frame.encode() {
                    Ok(text) => text,
                    Err(error) => {
                        let _ = events
                            .send(SessionEvent::ChannelError { message: error.to_string() })
                            .await;
                        continue;
                    }
                };
                if let Err(error) = sink.send(WsMessage::text(text)).await {
                    let _ = events
                        .send(SessionEvent::ChannelError { message: error.to_string() })
                        .await;
                    break;
                }
            }
            inbound = source.next() => {
                match inbound {
                    Some(Ok(WsMessage::Text(text))) => {
                        let frame = ServerFrame::parse(&text);
                        if events.send(SessionEvent::FrameReceived(frame)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        let _ = events
                            .send(SessionEvent::ChannelError { message: error.to_string() })
                            .await;
                        break;
                    }
                }
            }
        }
    }

    let _ = events.send(SessionEvent::ChannelClosed).await;
}

/// Single-threaded cooperative driver tying the session to real transport.
///
/// All inputs converge on one mpsc inbox: caller commands (through the sender
/// returned by [`SessionDriver::new`]), channel events from the I/O task, and
/// request completions produced inline. Events are processed strictly one at
/// a time, so session transitions never interleave.
pub struct SessionDriver {
    session: Session<SystemEnv>,
    api: RestApi,
    config: TransportConfig,
    inbox: mpsc::Receiver<SessionEvent>,
    inbox_tx: mpsc::Sender<SessionEvent>,
    channel: Option<Channel>,
}

impl SessionDriver {
    /// Driver plus the sender the caller uses to submit events.
    pub fn new(config: TransportConfig) -> (Self, mpsc::Sender<SessionEvent>) {
        let (inbox_tx, inbox) = mpsc::channel(64);
        let session = Session::new(SystemEnv, config.device_id.clone());
        let api = RestApi::new(config.clone());
        let driver =
            Self { session, api, config, inbox, inbox_tx: inbox_tx.clone(), channel: None };
        (driver, inbox_tx)
    }

    /// Current session state, for rendering between events.
    pub fn session(&self) -> &Session<SystemEnv> {
        &self.session
    }

    /// Run until [`SessionEvent::Shutdown`] arrives or every sender is gone.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(TICK_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let event = tokio::select! {
                _ = ticker.tick() => SessionEvent::Tick { now: Instant::now() },
                event = self.inbox.recv() => event.unwrap_or(SessionEvent::Shutdown),
            };
            let quitting = matches!(event, SessionEvent::Shutdown);
            self.dispatch(event).await;
            if quitting {
                break;
            }
        }
    }

    /// Process one event plus every completion it produces inline.
    ///
    /// Request completions are queued behind the triggering event rather than
    /// handled recursively, preserving the one-at-a-time ordering.
    async fn dispatch(&mut self, event: SessionEvent) {
        let mut pending = VecDeque::new();
        pending.push_back(event);

        while let Some(event) = pending.pop_front() {
            let actions = match self.session.handle(event) {
                Ok(actions) => actions,
                Err(error) => {
                    tracing::warn!(%error, "event rejected");
                    continue;
                }
            };

            for action in actions {
                match action {
                    SessionAction::SendRequest(call) => {
                        if let Some(completion) = self.api.execute(call).await {
                            pending.push_back(completion);
                        }
                    }
                    SessionAction::OpenChannel { partner_id } => {
                        self.open_channel(&partner_id).await;
                    }
                    SessionAction::CloseChannel => {
                        if let Some(channel) = self.channel.take() {
                            channel.close();
                        }
                    }
                    SessionAction::SendFrame(frame) => {
                        if let Some(channel) = &self.channel
                            && let Err(error) = channel.send(frame).await
                        {
                            tracing::warn!(%error, "frame send failed");
                        }
                    }
                }
            }
        }
    }

    async fn open_channel(&mut self, partner_id: &str) {
        // Close-before-open: never two live channels.
        if let Some(previous) = self.channel.take() {
            previous.close();
        }
        match Channel::open(&self.config.ws_url, &self.config.device_id, self.inbox_tx.clone())
            .await
        {
            Ok(channel) => self.channel = Some(channel),
            Err(error) => {
                tracing::warn!(%error, partner_id, "channel open failed");
                let _ = self
                    .inbox_tx
                    .send(SessionEvent::ChannelError { message: error.to_string() })
                    .await;
            }
        }
    }
}
