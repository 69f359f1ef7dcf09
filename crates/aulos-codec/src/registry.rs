//! Capability registry: resolves a codec id to a library implementation.
//!
//! The set of registered libraries is fixed before the registry is shared.
//! Built-in entries are selected by cargo features; deployments add their
//! own bindings through [`RegistryBuilder::register`].
//!
//! # Example
//!
//! ```
//! use aulos_codec::{
//!     AdapterError, ApiObject, CapabilityDescriptor, CapabilityRegistry, CodecApi, CodecResult,
//!     CodecStatus, InitPhase, KnownCodec, LibStringKind,
//! };
//! use aulos_memory::BlockRef;
//!
//! /// Binding to an external mp3 decoder library.
//! struct VendorMp3;
//!
//! # const UNSUPPORTED: CodecStatus = CodecStatus::fatal(1);
//! impl CodecApi for VendorMp3 {
//!     fn lib_string(&self, _: LibStringKind) -> CodecResult<String> {
//!         Ok("vendor mp3".into())
//!     }
//!     // ...
//! #   fn api_object_size(&self) -> CodecResult<usize> { Ok(64) }
//! #   fn initialize(&self, _: &ApiObject, _: InitPhase) -> CodecResult<u32> { Ok(1) }
//! #   fn set_config_param(&self, _: &ApiObject, _: u32, _: &[u8]) -> CodecResult<()> { Ok(()) }
//! #   fn memory_tables_size(&self, _: &ApiObject) -> CodecResult<usize> { Ok(0) }
//! #   fn set_memory_tables_pointer(&self, _: &ApiObject, _: BlockRef) -> CodecResult<()> { Ok(()) }
//! #   fn memory_table_count(&self, _: &ApiObject) -> CodecResult<u32> { Ok(0) }
//! #   fn memory_block_type(&self, _: &ApiObject, _: u32) -> CodecResult<u32> { Err(UNSUPPORTED) }
//! #   fn memory_block_size(&self, _: &ApiObject, _: u32) -> CodecResult<usize> { Err(UNSUPPORTED) }
//! #   fn memory_block_alignment(&self, _: &ApiObject, _: u32) -> CodecResult<usize> { Err(UNSUPPORTED) }
//! #   fn set_memory_block_pointer(&self, _: &ApiObject, _: u32, _: BlockRef) -> CodecResult<()> { Err(UNSUPPORTED) }
//! #   fn set_input_bytes(&self, _: &ApiObject, _: usize) -> CodecResult<()> { Ok(()) }
//! #   fn execute(&self, _: &ApiObject) -> CodecResult<()> { Ok(()) }
//! #   fn output_bytes(&self, _: &ApiObject) -> CodecResult<usize> { Ok(0) }
//! }
//!
//! # fn main() -> Result<(), AdapterError> {
//! let registry = CapabilityRegistry::builder()
//!     .with_builtins()
//!     .register(CapabilityDescriptor::new(
//!         KnownCodec::Mp3Dec.api_id(),
//!         "mp3 decoder",
//!         || Box::new(VendorMp3),
//!     ))
//!     .build();
//!
//! let mp3 = registry.lookup(KnownCodec::Mp3Dec.api_id())?;
//! assert_eq!(mp3.name(), "mp3 decoder");
//! assert!(registry.contains(KnownCodec::Mp3Dec.api_id()));
//! # Ok(())
//! # }
//! ```

use std::{borrow::Cow, collections::BTreeMap, fmt, sync::Arc};

use tracing::{debug, warn};

use crate::{
    error::{AdapterError, AdapterResult},
    traits::CodecApi,
};

/// Codec id as delivered by the host.
///
/// The low 8 bits select the library (API id); the remaining upper bits
/// identify the host-side interface the id arrived through.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CodecId(u32);

impl CodecId {
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Build an id from its two halves.
    #[must_use]
    pub const fn from_parts(interface_id: u32, api_id: u8) -> Self {
        Self((interface_id << 8) | api_id as u32)
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Library selector used for registry lookup.
    #[must_use]
    pub const fn api_id(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    #[must_use]
    pub const fn interface_id(self) -> u32 {
        self.0 >> 8
    }
}

impl From<u32> for CodecId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl From<KnownCodec> for CodecId {
    fn from(codec: KnownCodec) -> Self {
        Self(u32::from(codec.api_id()))
    }
}

impl fmt::Debug for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CodecId({:#x})", self.0)
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// API ids assigned to the vendor libraries this adapter was built around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownCodec {
    /// Generic wrapper library. Served by the built-in passthrough codec
    /// when the `passthrough` feature is enabled.
    Wrapper,
    AacDec,
    BsacDec,
    DabDec,
    DrmDec,
    Mp3Dec,
    SbcDec,
}

impl KnownCodec {
    pub const ALL: [Self; 7] = [
        Self::Wrapper,
        Self::AacDec,
        Self::BsacDec,
        Self::DabDec,
        Self::DrmDec,
        Self::Mp3Dec,
        Self::SbcDec,
    ];

    #[must_use]
    pub const fn api_id(self) -> u8 {
        match self {
            Self::Wrapper => 0x01,
            Self::AacDec => 0x02,
            Self::BsacDec => 0x03,
            Self::DabDec => 0x04,
            Self::DrmDec => 0x05,
            Self::Mp3Dec => 0x06,
            Self::SbcDec => 0x07,
        }
    }

    #[must_use]
    pub fn from_api_id(api_id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|codec| codec.api_id() == api_id)
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Wrapper => "wrapper",
            Self::AacDec => "aac decoder",
            Self::BsacDec => "bsac decoder",
            Self::DabDec => "dab+ decoder",
            Self::DrmDec => "drm decoder",
            Self::Mp3Dec => "mp3 decoder",
            Self::SbcDec => "sbc decoder",
        }
    }
}

/// Creates a fresh library binding for one adapter instance.
pub type CodecFactory = Arc<dyn Fn() -> Box<dyn CodecApi> + Send + Sync>;

/// One registry entry: an API id and the factory that binds it.
#[derive(Clone)]
pub struct CapabilityDescriptor {
    id: u8,
    name: Cow<'static, str>,
    factory: CodecFactory,
}

impl CapabilityDescriptor {
    pub fn new<F>(id: u8, name: impl Into<Cow<'static, str>>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn CodecApi> + Send + Sync + 'static,
    {
        Self {
            id,
            name: name.into(),
            factory: Arc::new(factory),
        }
    }

    #[must_use]
    pub fn id(&self) -> u8 {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bind a new library instance.
    #[must_use]
    pub fn instantiate(&self) -> Box<dyn CodecApi> {
        (self.factory)()
    }
}

impl fmt::Debug for CapabilityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityDescriptor")
            .field("id", &format_args!("{:#04x}", self.id))
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Read-only map from API id to [`CapabilityDescriptor`].
///
/// Build it once with [`CapabilityRegistry::builder`], then share it behind
/// an `Arc`. Lookups never mutate, so concurrent adapters may resolve
/// against the same registry.
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    entries: BTreeMap<u8, CapabilityDescriptor>,
}

impl CapabilityRegistry {
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Registry holding only the entries enabled by cargo features.
    #[must_use]
    pub fn builtin() -> Self {
        Self::builder().with_builtins().build()
    }

    /// Resolve an API id.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::NotFound`] when nothing is registered under
    /// `api_id`. The registered set depends on build configuration, so
    /// callers must not assume any id is present.
    pub fn lookup(&self, api_id: u8) -> AdapterResult<&CapabilityDescriptor> {
        self.entries
            .get(&api_id)
            .ok_or(AdapterError::NotFound { api_id })
    }

    #[must_use]
    pub fn contains(&self, api_id: u8) -> bool {
        self.entries.contains_key(&api_id)
    }

    /// Registered ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = u8> + '_ {
        self.entries.keys().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.values()).finish()
    }
}

/// Collects descriptors before the registry is frozen.
#[derive(Default)]
pub struct RegistryBuilder {
    entries: BTreeMap<u8, CapabilityDescriptor>,
}

impl RegistryBuilder {
    /// Add the entries enabled by cargo features.
    #[must_use]
    pub fn with_builtins(self) -> Self {
        #[cfg(feature = "passthrough")]
        let this = self.register(CapabilityDescriptor::new(
            KnownCodec::Wrapper.api_id(),
            crate::passthrough::PASSTHROUGH_NAME,
            || Box::new(crate::passthrough::Passthrough::new()),
        ));
        #[cfg(not(feature = "passthrough"))]
        let this = self;
        this
    }

    /// Add one descriptor. A later registration for the same id replaces
    /// the earlier one.
    #[must_use]
    pub fn register(mut self, descriptor: CapabilityDescriptor) -> Self {
        let id = descriptor.id();
        debug!(id, name = descriptor.name(), "registering codec capability");
        if let Some(previous) = self.entries.insert(id, descriptor) {
            warn!(id, replaced = previous.name(), "codec capability id registered twice");
        }
        self
    }

    #[must_use]
    pub fn build(self) -> CapabilityRegistry {
        CapabilityRegistry {
            entries: self.entries,
        }
    }
}
