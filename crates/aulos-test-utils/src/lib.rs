#![forbid(unsafe_code)]

//! Shared test utilities for the aulos workspace.

pub mod allocator;
pub mod blob;
pub mod scripted;

pub use allocator::CountingAllocator;
pub use blob::{raw_param, setup_blob};
pub use scripted::{BlockSpec, CallLog, CodecCall, Op, ScriptedCodec, ScriptedCodecBuilder};
