//! Scripted codec library for adapter tests.
//!
//! [`ScriptedCodec`] answers every capability call from a fixed script,
//! records each call in a shared [`CallLog`], and can be told to fail
//! specific calls with a chosen status.

use std::{fmt, sync::Arc};

use aulos_codec::{
    ApiObject, CapabilityDescriptor, CapabilityRegistry, CodecApi, CodecResult, CodecStatus,
    InitPhase, LibStringKind, MemoryRole,
};
use aulos_memory::BlockRef;
use parking_lot::Mutex;
use tracing::trace;

/// Capability operation, used to target failures and count calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    LibString,
    ApiObjectSize,
    Initialize(InitPhase),
    SetConfigParam,
    MemoryTablesSize,
    SetMemoryTablesPointer,
    MemoryTableCount,
    MemoryBlockType,
    MemoryBlockSize,
    MemoryBlockAlignment,
    SetMemoryBlockPointer,
    SetInputBytes,
    Execute,
    OutputBytes,
}

/// One recorded capability call with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecCall {
    LibString(LibStringKind),
    ApiObjectSize,
    Initialize(InitPhase),
    SetConfigParam { id: u32, value: Vec<u8> },
    MemoryTablesSize,
    SetMemoryTablesPointer { len: usize },
    MemoryTableCount,
    MemoryBlockType(u32),
    MemoryBlockSize(u32),
    MemoryBlockAlignment(u32),
    SetMemoryBlockPointer { index: u32, len: usize },
    SetInputBytes(usize),
    Execute,
    OutputBytes,
}

impl CodecCall {
    #[must_use]
    pub fn op(&self) -> Op {
        match self {
            Self::LibString(_) => Op::LibString,
            Self::ApiObjectSize => Op::ApiObjectSize,
            Self::Initialize(phase) => Op::Initialize(*phase),
            Self::SetConfigParam { .. } => Op::SetConfigParam,
            Self::MemoryTablesSize => Op::MemoryTablesSize,
            Self::SetMemoryTablesPointer { .. } => Op::SetMemoryTablesPointer,
            Self::MemoryTableCount => Op::MemoryTableCount,
            Self::MemoryBlockType(_) => Op::MemoryBlockType,
            Self::MemoryBlockSize(_) => Op::MemoryBlockSize,
            Self::MemoryBlockAlignment(_) => Op::MemoryBlockAlignment,
            Self::SetMemoryBlockPointer { .. } => Op::SetMemoryBlockPointer,
            Self::SetInputBytes(_) => Op::SetInputBytes,
            Self::Execute => Op::Execute,
            Self::OutputBytes => Op::OutputBytes,
        }
    }

    /// Memory block index the call refers to, if any.
    #[must_use]
    pub fn index(&self) -> Option<u32> {
        match self {
            Self::MemoryBlockType(i)
            | Self::MemoryBlockSize(i)
            | Self::MemoryBlockAlignment(i)
            | Self::SetMemoryBlockPointer { index: i, .. } => Some(*i),
            _ => None,
        }
    }
}

/// Shared, append-only record of calls made to a [`ScriptedCodec`] and
/// all of its clones.
#[derive(Clone, Default)]
pub struct CallLog {
    inner: Arc<Mutex<Vec<CodecCall>>>,
}

impl CallLog {
    /// Append `call`; returns how many calls of the same op came before it.
    fn record(&self, call: CodecCall) -> usize {
        let mut calls = self.inner.lock();
        let op = call.op();
        let nth = calls.iter().filter(|c| c.op() == op).count();
        trace!(?call, nth, "scripted codec call");
        calls.push(call);
        nth
    }

    #[must_use]
    pub fn calls(&self) -> Vec<CodecCall> {
        self.inner.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Number of recorded calls of `op`.
    #[must_use]
    pub fn count(&self, op: Op) -> usize {
        self.inner.lock().iter().filter(|c| c.op() == op).count()
    }

    /// Every `set_config_param` call as `(id, payload)`, in order.
    #[must_use]
    pub fn params(&self) -> Vec<(u32, Vec<u8>)> {
        self.inner
            .lock()
            .iter()
            .filter_map(|c| match c {
                CodecCall::SetConfigParam { id, value } => Some((*id, value.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

impl fmt::Debug for CallLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.inner.lock().iter()).finish()
    }
}

/// One memory block the scripted codec declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpec {
    /// Raw role code; may be outside the known range.
    pub role: u32,
    pub size: usize,
    pub align: usize,
}

impl BlockSpec {
    #[must_use]
    pub fn new(role: MemoryRole, size: usize, align: usize) -> Self {
        Self::raw(role.code(), size, align)
    }

    #[must_use]
    pub fn raw(role: u32, size: usize, align: usize) -> Self {
        Self { role, size, align }
    }

    #[must_use]
    pub fn persistent(size: usize) -> Self {
        Self::new(MemoryRole::Persistent, size, 8)
    }

    #[must_use]
    pub fn scratch(size: usize) -> Self {
        Self::new(MemoryRole::Scratch, size, 8)
    }

    #[must_use]
    pub fn input(size: usize) -> Self {
        Self::new(MemoryRole::Input, size, 8)
    }

    #[must_use]
    pub fn output(size: usize) -> Self {
        Self::new(MemoryRole::Output, size, 8)
    }
}

#[derive(Debug, Clone, Copy)]
struct Failure {
    op: Op,
    index: Option<u32>,
    nth: Option<usize>,
    status: CodecStatus,
}

impl Failure {
    fn matches(&self, op: Op, index: Option<u32>, nth: usize) -> bool {
        self.op == op
            && self.index.is_none_or(|i| Some(i) == index)
            && self.nth.is_none_or(|n| n == nth)
    }
}

type ProduceFn = Arc<dyn Fn(usize) -> usize + Send + Sync>;

struct Script {
    name: String,
    object_size: usize,
    tables_size: usize,
    blocks: Vec<BlockSpec>,
    init_done: u32,
    produce: ProduceFn,
    failures: Vec<Failure>,
    param_statuses: Vec<(u32, CodecStatus)>,
}

#[derive(Default)]
struct Runtime {
    input_bytes: usize,
    produced: usize,
    tables: Option<BlockRef>,
    bound: Vec<BlockRef>,
}

/// Codec library driven by a fixed script.
///
/// Clones share the script, the call log and the runtime state, so a clone
/// handed to a registry factory reports into the same log the test reads.
#[derive(Clone)]
pub struct ScriptedCodec {
    script: Arc<Script>,
    runtime: Arc<Mutex<Runtime>>,
    log: CallLog,
}

impl ScriptedCodec {
    #[must_use]
    pub fn builder() -> ScriptedCodecBuilder {
        ScriptedCodecBuilder::default()
    }

    #[must_use]
    pub fn log(&self) -> &CallLog {
        &self.log
    }

    /// Every block handle the adapter has bound so far, in bind order.
    #[must_use]
    pub fn bound_blocks(&self) -> Vec<BlockRef> {
        self.runtime.lock().bound.clone()
    }

    /// Memory-table area handle, once bound.
    #[must_use]
    pub fn tables(&self) -> Option<BlockRef> {
        self.runtime.lock().tables.clone()
    }

    /// Registry entry whose factory hands out clones of this codec.
    #[must_use]
    pub fn descriptor(&self, api_id: u8) -> CapabilityDescriptor {
        let codec = self.clone();
        CapabilityDescriptor::new(api_id, self.script.name.clone(), move || {
            Box::new(codec.clone())
        })
    }

    /// Registry containing only this codec under `api_id`.
    #[must_use]
    pub fn registry(&self, api_id: u8) -> Arc<CapabilityRegistry> {
        Arc::new(
            CapabilityRegistry::builder()
                .register(self.descriptor(api_id))
                .build(),
        )
    }

    fn call(&self, call: CodecCall) -> CodecResult<()> {
        let op = call.op();
        let index = call.index();
        let nth = self.log.record(call);
        match self
            .script
            .failures
            .iter()
            .find(|f| f.matches(op, index, nth))
        {
            Some(failure) => Err(failure.status),
            None => Ok(()),
        }
    }

    fn block(&self, index: u32) -> CodecResult<&BlockSpec> {
        self.script
            .blocks
            .get(index as usize)
            .ok_or(CodecStatus::fatal(0xEE))
    }
}

impl fmt::Debug for ScriptedCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedCodec")
            .field("name", &self.script.name)
            .field("blocks", &self.script.blocks)
            .field("calls", &self.log.len())
            .finish_non_exhaustive()
    }
}

impl CodecApi for ScriptedCodec {
    fn lib_string(&self, kind: LibStringKind) -> CodecResult<String> {
        self.call(CodecCall::LibString(kind))?;
        Ok(match kind {
            LibStringKind::Name => self.script.name.clone(),
            LibStringKind::LibVersion => "0.0.1-scripted".to_string(),
            LibStringKind::ApiVersion => "1.0".to_string(),
        })
    }

    fn api_object_size(&self) -> CodecResult<usize> {
        self.call(CodecCall::ApiObjectSize)?;
        Ok(self.script.object_size)
    }

    fn initialize(&self, _object: &ApiObject, phase: InitPhase) -> CodecResult<u32> {
        self.call(CodecCall::Initialize(phase))?;
        Ok(match phase {
            InitPhase::QueryInitDone => self.script.init_done,
            _ => 0,
        })
    }

    fn set_config_param(&self, _object: &ApiObject, id: u32, value: &[u8]) -> CodecResult<()> {
        self.call(CodecCall::SetConfigParam {
            id,
            value: value.to_vec(),
        })?;
        match self.script.param_statuses.iter().find(|(pid, _)| *pid == id) {
            Some((_, status)) => Err(*status),
            None => Ok(()),
        }
    }

    fn memory_tables_size(&self, _object: &ApiObject) -> CodecResult<usize> {
        self.call(CodecCall::MemoryTablesSize)?;
        Ok(self.script.tables_size)
    }

    fn set_memory_tables_pointer(&self, _object: &ApiObject, tables: BlockRef) -> CodecResult<()> {
        self.call(CodecCall::SetMemoryTablesPointer { len: tables.len() })?;
        self.runtime.lock().tables = Some(tables);
        Ok(())
    }

    fn memory_table_count(&self, _object: &ApiObject) -> CodecResult<u32> {
        self.call(CodecCall::MemoryTableCount)?;
        u32::try_from(self.script.blocks.len()).map_err(|_| CodecStatus::fatal(0xEF))
    }

    fn memory_block_type(&self, _object: &ApiObject, index: u32) -> CodecResult<u32> {
        self.call(CodecCall::MemoryBlockType(index))?;
        Ok(self.block(index)?.role)
    }

    fn memory_block_size(&self, _object: &ApiObject, index: u32) -> CodecResult<usize> {
        self.call(CodecCall::MemoryBlockSize(index))?;
        Ok(self.block(index)?.size)
    }

    fn memory_block_alignment(&self, _object: &ApiObject, index: u32) -> CodecResult<usize> {
        self.call(CodecCall::MemoryBlockAlignment(index))?;
        Ok(self.block(index)?.align)
    }

    fn set_memory_block_pointer(
        &self,
        _object: &ApiObject,
        index: u32,
        block: BlockRef,
    ) -> CodecResult<()> {
        self.call(CodecCall::SetMemoryBlockPointer {
            index,
            len: block.len(),
        })?;
        self.runtime.lock().bound.push(block);
        Ok(())
    }

    fn set_input_bytes(&self, _object: &ApiObject, bytes: usize) -> CodecResult<()> {
        self.call(CodecCall::SetInputBytes(bytes))?;
        self.runtime.lock().input_bytes = bytes;
        Ok(())
    }

    fn execute(&self, _object: &ApiObject) -> CodecResult<()> {
        self.call(CodecCall::Execute)?;
        let mut runtime = self.runtime.lock();
        runtime.produced = (self.script.produce)(runtime.input_bytes);
        Ok(())
    }

    fn output_bytes(&self, _object: &ApiObject) -> CodecResult<usize> {
        self.call(CodecCall::OutputBytes)?;
        Ok(self.runtime.lock().produced)
    }
}

/// Builder for [`ScriptedCodec`].
///
/// Defaults: name `"scripted"`, 16-byte object, 32-byte table area, no
/// memory blocks, init done reported as 1, output equal to input.
pub struct ScriptedCodecBuilder {
    script: Script,
}

impl Default for ScriptedCodecBuilder {
    fn default() -> Self {
        Self {
            script: Script {
                name: "scripted".to_string(),
                object_size: 16,
                tables_size: 32,
                blocks: Vec::new(),
                init_done: 1,
                produce: Arc::new(|input| input),
                failures: Vec::new(),
                param_statuses: Vec::new(),
            },
        }
    }
}

impl ScriptedCodecBuilder {
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.script.name = name.into();
        self
    }

    #[must_use]
    pub fn object_size(mut self, size: usize) -> Self {
        self.script.object_size = size;
        self
    }

    #[must_use]
    pub fn tables_size(mut self, size: usize) -> Self {
        self.script.tables_size = size;
        self
    }

    /// Declare one more memory block.
    #[must_use]
    pub fn block(mut self, spec: BlockSpec) -> Self {
        self.script.blocks.push(spec);
        self
    }

    /// Declare persistent, scratch, input and output blocks of `size` bytes.
    #[must_use]
    pub fn standard_blocks(self, size: usize) -> Self {
        self.block(BlockSpec::persistent(size))
            .block(BlockSpec::scratch(size))
            .block(BlockSpec::input(size))
            .block(BlockSpec::output(size))
    }

    /// Value returned by the init-done query.
    #[must_use]
    pub fn init_done(mut self, value: u32) -> Self {
        self.script.init_done = value;
        self
    }

    /// Produced byte count as a function of the announced input count.
    #[must_use]
    pub fn produce(mut self, f: impl Fn(usize) -> usize + Send + Sync + 'static) -> Self {
        self.script.produce = Arc::new(f);
        self
    }

    /// Fail every call of `op`.
    #[must_use]
    pub fn fail(self, op: Op, status: CodecStatus) -> Self {
        self.push_failure(op, None, None, status)
    }

    /// Fail only the `nth` (zero-based) call of `op`.
    #[must_use]
    pub fn fail_nth(self, op: Op, nth: usize, status: CodecStatus) -> Self {
        self.push_failure(op, None, Some(nth), status)
    }

    /// Fail calls of an indexed memory op for block `index`.
    #[must_use]
    pub fn fail_index(self, op: Op, index: u32, status: CodecStatus) -> Self {
        self.push_failure(op, Some(index), None, status)
    }

    /// Answer `set_config_param` for `id` with `status`.
    #[must_use]
    pub fn param_status(mut self, id: u32, status: CodecStatus) -> Self {
        self.script.param_statuses.push((id, status));
        self
    }

    fn push_failure(
        mut self,
        op: Op,
        index: Option<u32>,
        nth: Option<usize>,
        status: CodecStatus,
    ) -> Self {
        self.script.failures.push(Failure {
            op,
            index,
            nth,
            status,
        });
        self
    }

    #[must_use]
    pub fn build(self) -> ScriptedCodec {
        ScriptedCodec {
            script: Arc::new(self.script),
            runtime: Arc::new(Mutex::new(Runtime::default())),
            log: CallLog::default(),
        }
    }
}
