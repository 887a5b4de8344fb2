//! Wire types for the Veil pairing service.
//!
//! Everything a client exchanges with the backend lives here: the JSON bodies
//! of the one-shot REST operations (onboarding, safety, verification, profile,
//! matchmaking) and the tagged frames carried over the persistent chat
//! channel. This crate is pure data - no I/O, no session state.
//!
//! # Components
//!
//! - [`api`]: request/response bodies for the REST operations
//! - [`frame`]: inbound [`ServerFrame`] and outbound [`ClientFrame`] records
//!
//! Frame parsing is total: [`ServerFrame::parse`] never fails, mapping
//! unparseable payloads to [`ServerFrame::Raw`] so the session layer can
//! surface them instead of dropping them silently.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod api;
pub mod frame;

pub use api::{
    BIO_MAX_LEN, DebugResponse, DeviceRequest, Gender, InitResponse, MatchPreference,
    MatchRequest, MatchResponse, MatchStatus, NICKNAME_MAX_LEN, ProfileRequest, ProfileResponse,
    VerifyRequest, VerifyResponse,
};
pub use frame::{ClientFrame, EndReason, ProtocolError, ServerFrame, ended_notice};
