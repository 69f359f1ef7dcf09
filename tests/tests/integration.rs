//! All integration tests for aulos
#![expect(
    clippy::unwrap_used,
    reason = "integration test crate, unwraps are acceptable in test code"
)]

mod aulos_codec;
mod common;
