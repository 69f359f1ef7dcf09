#![forbid(unsafe_code)]

//! # Aulos
//!
//! Facade crate for hosting pluggable codec libraries.
//!
//! ## Quick start
//!
//! ```
//! # #[cfg(feature = "passthrough")]
//! # fn main() -> Result<(), aulos::codec::AdapterError> {
//! use aulos::prelude::*;
//!
//! let registry = Arc::new(CapabilityRegistry::builtin());
//! let config = AdapterConfig::new(KnownCodec::Wrapper)
//!     .with_stream(StreamParams::new(44_100, 2, FrameFormat::S16Le));
//!
//! let mut adapter = CodecAdapter::new(config, registry);
//! adapter.set_setup_config(ParamWriter::new().u32(3, 128).finish());
//! adapter.init()?;
//! adapter.prepare()?;
//!
//! let written = adapter.write_input(&[0u8; 64])?;
//! let outcome = adapter.process(written)?;
//! assert_eq!(outcome.produced, 64);
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "passthrough"))]
//! # fn main() {}
//! ```

// ── Re-export sub-crates ────────────────────────────────────────────────

pub mod codec {
    pub use aulos_codec::*;
}

pub mod memory {
    pub use aulos_memory::*;
}

// ── Prelude ─────────────────────────────────────────────────────────────

pub mod prelude {
    pub use std::sync::Arc;

    pub use aulos_codec::{
        AdapterConfig, AdapterError, AdapterResult, AdapterState, CapabilityDescriptor,
        CapabilityRegistry, CodecAdapter, CodecApi, CodecId, CodecStatus, FrameFormat, KnownCodec,
        ParamWriter, ProcessOutcome, StreamParams,
    };
    pub use aulos_memory::{Allocator, heap};
}
