//! HTTP cache invalidation for verified content changes.
//!
//! `HttpInvalidator` posts each change to an internal revalidation
//! endpoint. It makes exactly one attempt per change: the gate bounds the
//! call with its own emit timeout and leaves redelivery to the sender.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;

pub use client::{HttpInvalidator, InvalidationRequest, InvalidatorConfig};
