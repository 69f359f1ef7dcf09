//! Host-side adapter for pluggable codec libraries.
//!
//! A codec library is reached only through the [`CodecApi`] capability
//! interface. [`CodecAdapter`] drives one library instance through its
//! lifecycle:
//!
//! 1. **init**: resolve the library in a [`CapabilityRegistry`] and allocate
//!    its opaque object.
//! 2. **prepare**: apply the setup configuration, push [`StreamParams`],
//!    negotiate memory blocks, finish initialization.
//! 3. **process**: run the codec over the input block.
//! 4. **reset** / **free**: release everything, optionally re-open.
//!
//! Codec statuses are split into fatal and recoverable ([`CodecStatus`]).
//! Fatal statuses abort the current operation as an [`AdapterError`];
//! recoverable ones are logged and the operation continues.
//!
//! ## Example
//!
//! ```
//! # #[cfg(feature = "passthrough")]
//! # fn main() -> Result<(), aulos_codec::AdapterError> {
//! use std::sync::Arc;
//!
//! use aulos_codec::{AdapterConfig, CapabilityRegistry, CodecAdapter, KnownCodec, ParamWriter};
//!
//! let registry = Arc::new(CapabilityRegistry::builtin());
//! let mut adapter = CodecAdapter::new(AdapterConfig::new(KnownCodec::Wrapper), registry);
//! adapter.set_setup_config(ParamWriter::new().u32(3, 64).finish());
//!
//! adapter.init()?;
//! adapter.prepare()?;
//! adapter.write_input(&[1, 2, 3, 4])?;
//! let outcome = adapter.process(4)?;
//! assert_eq!(outcome.produced, 4);
//! adapter.free()?;
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "passthrough"))]
//! # fn main() {}
//! ```

mod adapter;
mod config;
mod error;
mod memory;
mod params;
#[cfg(feature = "passthrough")]
pub mod passthrough;
mod registry;
mod status;
mod stream;
mod traits;

pub use adapter::{AdapterState, CodecAdapter, LibraryInfo, ProcessOutcome};
pub use config::AdapterConfig;
pub use error::{AdapterError, AdapterResult};
pub use memory::{MemoryEntry, MemoryTable, negotiate};
pub use params::{
    ApplyFailure, ApplySummary, ConfigBlob, ConfigKind, PARAM_HEADER_LEN, Param, ParamCursor,
    ParamError, ParamWriter, SkippedParam, apply_config, apply_params,
};
pub use registry::{
    CapabilityDescriptor, CapabilityRegistry, CodecFactory, CodecId, KnownCodec, RegistryBuilder,
};
pub use status::{CodecResult, CodecStatus};
pub use stream::{
    FrameFormat, StreamParamIds, StreamParams, WIDTH_CODE_16, WIDTH_CODE_WIDE,
    update_stream_params, width_code_for_bits,
};
#[cfg(any(test, feature = "test-utils"))]
pub use traits::CodecApiMock;
pub use traits::{ApiObject, CodecApi, InitPhase, LibStringKind, MemoryRole};
