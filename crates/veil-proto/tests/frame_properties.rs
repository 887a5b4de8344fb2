//! Property-based tests for channel frame parsing.
//!
//! The channel boundary must be total: whatever the server (or a hostile
//! peer) puts on the wire, parsing never panics and never drops a payload
//! silently.

use proptest::prelude::*;
use veil_proto::{ClientFrame, EndReason, ServerFrame};

/// Strategy for generating arbitrary outbound frames.
fn arbitrary_client_frame() -> impl Strategy<Value = ClientFrame> {
    prop_oneof![
        ".*".prop_map(|message| ClientFrame::Chat { message }),
        Just(ClientFrame::end(EndReason::Leave)),
        Just(ClientFrame::end(EndReason::Next)),
        Just(ClientFrame::end(EndReason::Report)),
    ]
}

#[test]
fn prop_parse_never_panics() {
    proptest!(|(text in ".*")| {
        // PROPERTY: parse is total - malformed input becomes Raw, not a panic
        let frame = ServerFrame::parse(&text);
        if let ServerFrame::Raw { payload } = frame {
            prop_assert_eq!(payload, text, "Raw must carry the payload unmodified");
        }
    });
}

#[test]
fn prop_outbound_frames_parse_as_json_objects() {
    proptest!(|(frame in arbitrary_client_frame())| {
        let encoded = frame.encode().map_err(|e| {
            TestCaseError::fail(format!("encode failed: {e}"))
        })?;

        // PROPERTY: every outbound frame is a JSON object with a `type` tag
        let value: serde_json::Value = serde_json::from_str(&encoded)
            .map_err(|e| TestCaseError::fail(format!("not JSON: {e}")))?;
        prop_assert!(value.get("type").is_some_and(serde_json::Value::is_string));
    });
}

#[test]
fn prop_ended_reason_survives_arbitrary_strings() {
    proptest!(|(reason in "[a-z]{0,16}")| {
        let text = serde_json::json!({ "type": "ended", "reason": reason }).to_string();
        let frame = ServerFrame::parse(&text);
        prop_assert_eq!(frame, ServerFrame::Ended { reason });
    });
}

#[test]
fn prop_chat_message_survives_round_trip() {
    proptest!(|(message in ".*", from in "[a-z0-9-]{8,16}")| {
        let text = serde_json::json!({
            "type": "chat",
            "from": from.clone(),
            "message": message.clone(),
        })
        .to_string();

        let frame = ServerFrame::parse(&text);
        prop_assert_eq!(frame, ServerFrame::Chat { from, message });
    });
}
