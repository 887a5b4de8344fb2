//! Request and response bodies for the REST operations.
//!
//! Field names follow the backend's JSON conventions (`device_id`,
//! `partner_id`, `image_base64`). Responses tolerate unknown enum values:
//! an unrecognized gender maps to [`Gender::Other`] and an unrecognized
//! match status to [`MatchStatus::Waiting`], so a newer server never breaks
//! deserialization on this side.

use serde::{Deserialize, Serialize};

/// Maximum accepted nickname length, in characters.
pub const NICKNAME_MAX_LEN: usize = 20;

/// Maximum accepted bio length, in characters.
pub const BIO_MAX_LEN: usize = 100;

/// Gender classification produced by the verification step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    /// Classified as male.
    #[serde(alias = "Male")]
    Male,
    /// Classified as female.
    #[serde(alias = "Female")]
    Female,
    /// Classifier could not produce a binary result.
    #[serde(other)]
    Other,
}

/// Partner preference for matchmaking.
///
/// Anything the server does not recognize is normalized to `Any`, matching
/// the backend's own preference handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPreference {
    /// Match with male partners only.
    Male,
    /// Match with female partners only.
    Female,
    /// No preference.
    #[default]
    #[serde(other)]
    Any,
}

/// Status discriminant of a matchmaking response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    /// A partner was assigned; `partner_id` is present.
    Matched,
    /// The device was placed in the waiting queue.
    Queued,
    /// No match yet (status polls and test-match replies).
    #[serde(other)]
    Waiting,
}

/// Body for operations that carry only the device identity
/// (`safety.check`, `match.status`, `match.debug`, `queue.leave`,
/// `match.testMatch`, and `onboarding.init`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRequest {
    /// Stable opaque device identifier.
    pub device_id: String,
}

/// Response to `onboarding.init`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitResponse {
    /// `"ok"` on success, `"error"` on rejection.
    pub status: String,
    /// Optional human-readable detail.
    #[serde(default)]
    pub message: Option<String>,
}

/// Body for `verify.gender`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyRequest {
    /// Stable opaque device identifier.
    pub device_id: String,
    /// Captured image as a base64 data URL.
    pub image_base64: String,
}

/// Response to `verify.gender`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyResponse {
    /// Classification result.
    pub gender: Gender,
}

/// Body for `profile.setup`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRequest {
    /// Stable opaque device identifier.
    pub device_id: String,
    /// Display nickname, at most [`NICKNAME_MAX_LEN`] characters.
    pub nickname: String,
    /// Short bio, at most [`BIO_MAX_LEN`] characters.
    pub bio: String,
}

/// Response to `profile.setup`.
///
/// The returned nickname is authoritative: the server may normalize the
/// submitted value, and the client must adopt whatever comes back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileResponse {
    /// Server-normalized nickname.
    pub nickname: String,
}

/// Body for `match.find`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRequest {
    /// Stable opaque device identifier.
    pub device_id: String,
    /// Partner preference.
    pub preference: MatchPreference,
    /// Set when this request re-enters the queue after a "next" action.
    #[serde(default)]
    pub is_next: bool,
}

/// Response to `match.find`, `match.status`, and `match.testMatch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResponse {
    /// Outcome discriminant.
    pub status: MatchStatus,
    /// Assigned partner; present iff `status` is [`MatchStatus::Matched`].
    #[serde(default)]
    pub partner_id: Option<String>,
    /// Optional human-readable detail (test-match replies).
    #[serde(default)]
    pub message: Option<String>,
}

/// Response to the diagnostic `match.debug` operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugResponse {
    /// Stored gender classification, if any.
    #[serde(default)]
    pub gender: Option<Gender>,
    /// Stored partner preference.
    #[serde(default)]
    pub preference: MatchPreference,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn gender_accepts_backend_capitalization() {
        let g: Gender = serde_json::from_str("\"Male\"").unwrap();
        assert_eq!(g, Gender::Male);

        let g: Gender = serde_json::from_str("\"female\"").unwrap();
        assert_eq!(g, Gender::Female);
    }

    #[test]
    fn unknown_gender_maps_to_other() {
        // The classifier falls back to a non-binary label on failure
        let g: Gender = serde_json::from_str("\"None\"").unwrap();
        assert_eq!(g, Gender::Other);
    }

    #[test]
    fn unknown_preference_normalizes_to_any() {
        let p: MatchPreference = serde_json::from_str("\"whatever\"").unwrap();
        assert_eq!(p, MatchPreference::Any);
    }

    #[test]
    fn match_response_without_partner() {
        let resp: MatchResponse = serde_json::from_str(r#"{"status":"queued"}"#).unwrap();
        assert_eq!(resp.status, MatchStatus::Queued);
        assert_eq!(resp.partner_id, None);
    }

    #[test]
    fn match_response_with_partner() {
        let resp: MatchResponse =
            serde_json::from_str(r#"{"status":"matched","partner_id":"P1"}"#).unwrap();
        assert_eq!(resp.status, MatchStatus::Matched);
        assert_eq!(resp.partner_id.as_deref(), Some("P1"));
    }

    #[test]
    fn match_request_serializes_is_next() {
        let req = MatchRequest {
            device_id: "device-0001".into(),
            preference: MatchPreference::Female,
            is_next: true,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"is_next\":true"));
        assert!(json.contains("\"preference\":\"female\""));
    }
}
