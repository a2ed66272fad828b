//! Test infrastructure for the content gate.
//!
//! Provides scripted cache invalidators, signed-notification fixtures, a
//! ready-wired gate harness on a `TestClock`, and log capture for asserting
//! what the gate writes to its logs.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod fixtures;
pub mod invalidator;
pub mod logs;

pub use content_gate_core::{Clock, TestClock};
pub use fixtures::{
    change_payload, signed_headers, signed_notification, test_secret, GateHarness, TEST_SECRET,
};
pub use invalidator::{Behavior, RecordingInvalidator};
pub use logs::LogCapture;
