#![no_main]

//! Fuzz target for notification payload parsing.
//!
//! Parsing must reject malformed input with a malformed-payload error and
//! never panic, whatever the bytes.

use content_gate_core::models::ContentChange;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    match ContentChange::parse(data) {
        Ok(change) => assert!(!change.document_id.as_str().trim().is_empty()),
        Err(err) => assert_eq!(err.reason_code(), "malformed_payload"),
    }
});
