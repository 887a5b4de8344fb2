//! Invariant checking for simulation testing.
//!
//! Invariants are properties that must hold after every event, across all
//! execution paths. They capture WHAT must be true, not specific scenarios.
//! The harness extracts observable state into a [`SessionSnapshot`] and runs
//! registered [`Invariant`] checks against it after each dispatch.

use veil_client::{COOLDOWN_SECS, Environment, MatchState, Session};

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Invariant violation with context.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// Description of what went wrong.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// Observable state extracted from the session and the simulated transport.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// Current matchmaking state.
    pub match_state: MatchState,
    /// Whether the status poll schedule is running.
    pub polling_active: bool,
    /// Whether the session believes a channel is open.
    pub channel_open: bool,
    /// Channels the transport currently holds open.
    pub open_channels: usize,
    /// Partner the open channel was created for, if any.
    pub channel_partner: Option<String>,
    /// Whole seconds of termination cooldown remaining.
    pub cooldown_remaining: u64,
    /// Conversation log length.
    pub message_count: usize,
}

impl SessionSnapshot {
    /// Capture session state plus the transport's channel bookkeeping.
    pub fn capture<E: Environment>(
        session: &Session<E>,
        open_channels: usize,
        channel_partner: Option<&str>,
    ) -> Self {
        Self {
            match_state: session.match_state().clone(),
            polling_active: session.polling_active(),
            channel_open: session.is_channel_open(),
            open_channels,
            channel_partner: channel_partner.map(str::to_owned),
            cooldown_remaining: session.cooldown_remaining(),
            message_count: session.messages().len(),
        }
    }
}

/// An invariant that can be checked against session state.
pub trait Invariant: Send + Sync {
    /// Invariant name for error reporting.
    fn name(&self) -> &'static str;

    /// Check the invariant against the current state.
    fn check(&self, state: &SessionSnapshot) -> InvariantResult;
}

/// Status polling must run exactly while the session is queued.
///
/// A poll schedule that outlives the queue turns into request spam; one that
/// never starts strands the user in the queue forever.
pub struct PollingIffQueued;

impl Invariant for PollingIffQueued {
    fn name(&self) -> &'static str {
        "polling-iff-queued"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        let queued = state.match_state == MatchState::Queued;
        if state.polling_active == queued {
            Ok(())
        } else {
            Err(Violation {
                invariant: self.name(),
                message: format!(
                    "polling_active={} but match_state={:?}",
                    state.polling_active, state.match_state
                ),
            })
        }
    }
}

/// At most one chat channel may be open at any time.
pub struct SingleChannel;

impl Invariant for SingleChannel {
    fn name(&self) -> &'static str {
        "single-channel"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        if state.open_channels <= 1 {
            Ok(())
        } else {
            Err(Violation {
                invariant: self.name(),
                message: format!("{} channels open simultaneously", state.open_channels),
            })
        }
    }
}

/// An open channel must belong to the current match.
///
/// If the session believes its channel is open, it must be matched and the
/// transport's channel must have been created for that same partner.
pub struct ChannelScopedToPartner;

impl Invariant for ChannelScopedToPartner {
    fn name(&self) -> &'static str {
        "channel-scoped-to-partner"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        if !state.channel_open {
            return Ok(());
        }
        let Some(partner_id) = state.match_state.partner_id() else {
            return Err(Violation {
                invariant: self.name(),
                message: format!("channel open while {:?}", state.match_state),
            });
        };
        if state.channel_partner.as_deref() == Some(partner_id) {
            Ok(())
        } else {
            Err(Violation {
                invariant: self.name(),
                message: format!(
                    "channel scoped to {:?} but matched with {partner_id}",
                    state.channel_partner
                ),
            })
        }
    }
}

/// The cooldown remainder never exceeds the configured total.
pub struct CooldownBounded;

impl Invariant for CooldownBounded {
    fn name(&self) -> &'static str {
        "cooldown-bounded"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        if state.cooldown_remaining <= COOLDOWN_SECS {
            Ok(())
        } else {
            Err(Violation {
                invariant: self.name(),
                message: format!(
                    "cooldown_remaining={} exceeds total {COOLDOWN_SECS}",
                    state.cooldown_remaining
                ),
            })
        }
    }
}

/// Registry of invariants to check.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Registry with the standard session invariants.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(PollingIffQueued);
        registry.add(SingleChannel);
        registry.add(ChannelScopedToPartner);
        registry.add(CooldownBounded);
        registry
    }

    /// Add an invariant to the registry.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Check all invariants against the given state.
    pub fn check_all(&self, state: &SessionSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Check all invariants, panicking on violation.
    ///
    /// Use this in tests where you want immediate failure with context.
    #[allow(clippy::panic, reason = "test harness fails fast on violations")]
    pub fn assert_all(&self, state: &SessionSnapshot, context: &str) {
        if let Err(violations) = self.check_all(state) {
            let messages: Vec<_> = violations.iter().map(ToString::to_string).collect();
            panic!("invariant violation {context}:\n  {}", messages.join("\n  "));
        }
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}
