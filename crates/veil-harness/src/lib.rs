//! Deterministic simulation harness for the Veil session controller.
//!
//! Runs the real [`veil_client::Session`] against a scripted in-memory
//! backend with a mock clock, so every scenario is reproducible down to the
//! millisecond and no socket is ever opened.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks behavioral properties after every
//! dispatched event: polling runs iff the session is queued, at most one
//! channel is open, and an open channel is always scoped to the current
//! partner. Scenario tests get these checks for free through [`SimDriver`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod invariants;
pub mod sim_driver;
pub mod sim_server;

pub use invariants::{
    ChannelScopedToPartner, CooldownBounded, Invariant, InvariantRegistry, InvariantResult,
    PollingIffQueued, SessionSnapshot, SingleChannel, Violation,
};
pub use sim_driver::SimDriver;
pub use sim_server::SimServer;
