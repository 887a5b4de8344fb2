//! Tagged frames exchanged over the persistent chat channel.
//!
//! Every frame is a JSON object with a `type` discriminant. Inbound frames
//! ([`ServerFrame`]) carry chat text, delivery acknowledgments, termination
//! notices, and server announcements. Outbound frames ([`ClientFrame`]) are
//! either a chat message or a bare termination reason.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Frame encoding/decoding errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Outbound frame could not be serialized.
    #[error("frame encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Why a chat session was terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndReason {
    /// The user left the chat.
    Leave,
    /// The user skipped to a new partner.
    Next,
    /// The user reported the partner.
    Report,
}

impl EndReason {
    /// Wire representation of the reason.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Leave => "leave",
            Self::Next => "next",
            Self::Report => "report",
        }
    }
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// System-message text shown when the partner ends the chat.
///
/// Unrecognized reasons (including `report`, which is deliberately not
/// disclosed to the reported party) fall back to a generic notice.
pub fn ended_notice(reason: &str) -> &'static str {
    match reason {
        "leave" => "partner left",
        "next" => "partner moved on",
        _ => "chat ended",
    }
}

/// Inbound frame pushed by the server over the chat channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    /// Chat message from the partner.
    Chat {
        /// Sender's device identifier.
        from: String,
        /// Message text.
        message: String,
    },
    /// Acknowledgment that an outbound message reached the partner.
    Delivery {
        /// Recipient's device identifier, when the server includes it.
        #[serde(default)]
        to: Option<String>,
    },
    /// The partner terminated the session.
    Ended {
        /// Raw termination reason; see [`ended_notice`] for display mapping.
        reason: String,
    },
    /// Server announcement displayed verbatim.
    System {
        /// Announcement text.
        message: String,
    },
    /// Payload that did not parse as any known frame.
    ///
    /// Never produced by deserialization; [`ServerFrame::parse`] constructs
    /// it so malformed traffic surfaces instead of disappearing.
    #[serde(skip)]
    Raw {
        /// The unmodified payload text.
        payload: String,
    },
}

impl ServerFrame {
    /// Parse a channel payload. Total: malformed input becomes
    /// [`ServerFrame::Raw`] carrying the original text.
    pub fn parse(text: &str) -> Self {
        serde_json::from_str(text).unwrap_or_else(|_| Self::Raw { payload: text.to_owned() })
    }
}

/// Outbound frame sent by the client over the chat channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    /// Chat message to the partner.
    Chat {
        /// Message text.
        message: String,
    },
    /// Terminate the session: the user left.
    Leave,
    /// Terminate the session: the user skipped to a new partner.
    Next,
    /// Terminate the session: the user reported the partner.
    Report,
}

impl ClientFrame {
    /// Termination frame for the given reason.
    pub fn end(reason: EndReason) -> Self {
        match reason {
            EndReason::Leave => Self::Leave,
            EndReason::Next => Self::Next,
            EndReason::Report => Self::Report,
        }
    }

    /// Serialize to the wire representation.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}
