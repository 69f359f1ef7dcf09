//! The capability interface a codec library implements.
//!
//! The adapter never sees codec internals. It drives a library through the
//! fixed operation set of [`CodecApi`], handing it an opaque [`ApiObject`]
//! (memory the library sized itself) on every instance-level call.

use std::{fmt, sync::Arc};

use aulos_memory::{Allocator, Block, BlockRef};
#[cfg(any(test, feature = "test-utils"))]
use unimock::unimock;

use crate::{error::AdapterResult, status::CodecResult};

/// Sub-command of [`CodecApi::initialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InitPhase {
    /// Load default configuration before any parameter is set.
    PreConfig,
    /// Parameters are final; compute memory requirements.
    PostConfig,
    /// Memory is bound; finish initialization for processing.
    Process,
    /// Poll whether initialization completed. Nonzero reply means done.
    QueryInitDone,
}

/// Which identification string to read from a library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LibStringKind {
    Name,
    LibVersion,
    ApiVersion,
}

/// How a codec intends to use one memory block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryRole {
    /// State that must survive across process calls.
    Persistent,
    /// Working memory, contents not preserved between calls.
    Scratch,
    /// Host writes encoded/raw input here before each process call.
    Input,
    /// Codec writes its produced bytes here.
    Output,
}

impl MemoryRole {
    /// Decode the wire value reported by `memory_block_type`.
    #[must_use]
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Persistent),
            1 => Some(Self::Scratch),
            2 => Some(Self::Input),
            3 => Some(Self::Output),
            _ => None,
        }
    }

    #[must_use]
    pub fn code(self) -> u32 {
        match self {
            Self::Persistent => 0,
            Self::Scratch => 1,
            Self::Input => 2,
            Self::Output => 3,
        }
    }
}

impl fmt::Display for MemoryRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Persistent => "persistent",
            Self::Scratch => "scratch",
            Self::Input => "input",
            Self::Output => "output",
        })
    }
}

/// Opaque per-instance codec object.
///
/// Sized by [`CodecApi::api_object_size`] and owned by the adapter. The
/// library may use the bytes however it likes during a call.
#[derive(Debug)]
pub struct ApiObject {
    block: Block,
}

impl ApiObject {
    /// Allocate an object of `size` bytes. The adapter does this on init;
    /// hosts driving [`negotiate`](crate::negotiate) themselves use it too.
    ///
    /// # Errors
    ///
    /// [`AdapterError::OutOfMemory`](crate::AdapterError::OutOfMemory) or
    /// [`AdapterError::InvalidAlignment`](crate::AdapterError::InvalidAlignment).
    pub fn allocate(
        allocator: &Arc<dyn Allocator>,
        size: usize,
        align: usize,
    ) -> AdapterResult<Self> {
        Ok(Self {
            block: Block::allocate(allocator, size, align)?,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.block.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.block.is_empty()
    }

    #[must_use]
    pub fn addr(&self) -> usize {
        self.block.addr()
    }

    /// Non-owning handle to the object memory.
    #[must_use]
    pub fn handle(&self) -> BlockRef {
        self.block.handle()
    }

    pub fn read<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        self.block.read(f)
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        self.block.write(f)
    }
}

/// Operation set every pluggable codec library provides.
///
/// Each method maps to one library command. A non-OK status is returned as
/// `Err`; callers decide with [`CodecStatus::is_fatal`](crate::CodecStatus::is_fatal)
/// whether it aborts the current operation.
///
/// Implementations are created per adapter instance by a
/// [`CapabilityDescriptor`](crate::CapabilityDescriptor) factory and are only
/// ever called from one thread at a time.
#[cfg_attr(any(test, feature = "test-utils"), unimock(api = CodecApiMock))]
pub trait CodecApi: Send + Sync {
    /// Read an identification string.
    fn lib_string(&self, kind: LibStringKind) -> CodecResult<String>;

    /// Size in bytes of the opaque object the library needs.
    fn api_object_size(&self) -> CodecResult<usize>;

    /// Run one initialization phase.
    ///
    /// The reply value is meaningful only for [`InitPhase::QueryInitDone`].
    fn initialize(&self, object: &ApiObject, phase: InitPhase) -> CodecResult<u32>;

    /// Set one configuration parameter.
    fn set_config_param(&self, object: &ApiObject, id: u32, value: &[u8]) -> CodecResult<()>;

    /// Size of the library's memory-table bookkeeping area.
    fn memory_tables_size(&self, object: &ApiObject) -> CodecResult<usize>;

    /// Bind the memory-table bookkeeping area.
    fn set_memory_tables_pointer(&self, object: &ApiObject, tables: BlockRef) -> CodecResult<()>;

    /// Number of memory blocks the library requires.
    fn memory_table_count(&self, object: &ApiObject) -> CodecResult<u32>;

    /// Role code of block `index` (see [`MemoryRole::from_code`]).
    fn memory_block_type(&self, object: &ApiObject, index: u32) -> CodecResult<u32>;

    fn memory_block_size(&self, object: &ApiObject, index: u32) -> CodecResult<usize>;

    fn memory_block_alignment(&self, object: &ApiObject, index: u32) -> CodecResult<usize>;

    /// Bind allocated memory to block `index`.
    fn set_memory_block_pointer(
        &self,
        object: &ApiObject,
        index: u32,
        block: BlockRef,
    ) -> CodecResult<()>;

    /// Announce how many input bytes are available for the next execute.
    fn set_input_bytes(&self, object: &ApiObject, bytes: usize) -> CodecResult<()>;

    fn execute(&self, object: &ApiObject) -> CodecResult<()>;

    /// Bytes produced by the last execute.
    fn output_bytes(&self, object: &ApiObject) -> CodecResult<usize>;
}
