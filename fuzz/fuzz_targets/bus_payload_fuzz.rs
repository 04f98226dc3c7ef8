//! Fuzz test for bus signal payload decoding
//!
//! Feeds arbitrary bytes to the decoder a listening context runs on every
//! frame it receives. Decoding must return Ok or Err, never panic, and
//! whatever decodes must survive re-encoding.
//!
//! Run with: cargo +nightly fuzz run bus_payload_fuzz -- -max_total_time=60

#![no_main]

use fieldline_core::BusEvent;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(payload) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(event) = BusEvent::from_json(payload) {
        let _ = event.subject_id();
        let encoded = event.to_json().expect("decoded event re-encodes");
        let decoded = BusEvent::from_json(&encoded).expect("re-encoded event decodes");
        assert_eq!(decoded.event_type, event.event_type);
        assert_eq!(decoded.id, event.id);
        assert_eq!(decoded.timestamp, event.timestamp);
    }
});
