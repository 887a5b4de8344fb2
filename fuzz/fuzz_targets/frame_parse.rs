//! Fuzz target for ServerFrame::parse
//!
//! Channel payloads come straight off the wire, so parsing must be total:
//! any byte sequence either decodes to a known frame or falls back to a Raw
//! frame carrying the original text. The fuzzer should NEVER panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use veil_proto::ServerFrame;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let frame = ServerFrame::parse(text);
        // Malformed input must be preserved, not dropped
        if let ServerFrame::Raw { payload } = frame {
            assert_eq!(payload, text);
        }
    }
});
