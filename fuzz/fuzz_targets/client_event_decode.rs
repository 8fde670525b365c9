//! Fuzz target for client event decoding
//!
//! Feeds arbitrary CBOR bodies to the client event decoder.
//!
//! # Invariants
//!
//! - Decoding NEVER panics, only returns `ProtocolError`
//! - Anything that decodes re-encodes and decodes to the same event

#![no_main]

use huddle_proto::{ClientEvent, Event, codec};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(event) = codec::decode_body::<ClientEvent>(data) {
        let frame = codec::encode(&event).expect("decoded event must re-encode");
        let again: ClientEvent = codec::decode_event(&frame).expect("re-encoded event must decode");
        assert_eq!(again, event);
        assert!(!event.name().is_empty());
    }

    // Server events share the envelope, so the same bytes must not panic there either
    let _ = codec::decode_body::<Event>(data);
});
