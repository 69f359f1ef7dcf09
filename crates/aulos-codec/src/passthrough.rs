//! Pure-Rust reference library served under the wrapper API id.
//!
//! Declares four blocks (persistent, scratch, input, output) sized from the
//! configured period and sample format, and on execute copies the announced
//! input bytes to the output block unchanged.

use aulos_memory::BlockRef;
use parking_lot::Mutex;
use tracing::trace;

use crate::{
    status::CodecResult,
    stream::{WIDTH_CODE_16, WIDTH_CODE_WIDE},
    traits::{ApiObject, CodecApi, InitPhase, LibStringKind, MemoryRole},
};

pub const PASSTHROUGH_NAME: &str = "passthrough";

/// Parameter ids understood by [`Passthrough`].
pub mod param {
    pub const SAMPLE_RATE: u32 = 0;
    /// Width code, 0x10 or 0x20.
    pub const SAMPLE_WIDTH: u32 = 1;
    pub const CHANNELS: u32 = 2;
    /// Frames moved per execute.
    pub const PERIOD_FRAMES: u32 = 3;
    /// Nonzero silences the output. Accepted at any time after pre-config.
    pub const MUTE: u32 = 4;
}

/// Statuses returned by [`Passthrough`].
pub mod status {
    use crate::status::CodecStatus;

    pub const BAD_PHASE: CodecStatus = CodecStatus::fatal(0x01);
    pub const BAD_INDEX: CodecStatus = CodecStatus::fatal(0x02);
    pub const BAD_PAYLOAD: CodecStatus = CodecStatus::fatal(0x03);
    pub const BAD_VALUE: CodecStatus = CodecStatus::fatal(0x04);
    pub const BAD_BINDING: CodecStatus = CodecStatus::fatal(0x05);
    pub const BAD_OBJECT: CodecStatus = CodecStatus::fatal(0x06);
    /// Format parameter sent after memory was sized; ignored.
    pub const LOCKED: CodecStatus = CodecStatus::recoverable(0x10);
    /// Parameter id not recognized; ignored.
    pub const UNKNOWN_PARAM: CodecStatus = CodecStatus::recoverable(0x11);
}

const OBJECT_SIZE: usize = 32;
const OBJECT_TAG: [u8; 4] = *b"PTHR";
const TABLE_ENTRY_LEN: usize = 16;
const BLOCK_ROLES: [MemoryRole; 4] = [
    MemoryRole::Persistent,
    MemoryRole::Scratch,
    MemoryRole::Input,
    MemoryRole::Output,
];
const PERSISTENT_LEN: usize = 64;
const BLOCK_ALIGN: usize = 8;
const DEFAULT_PERIOD_FRAMES: u32 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    Configuring,
    Sized,
    Running,
}

#[derive(Debug, Clone, Copy)]
struct Format {
    sample_rate: u32,
    width_code: u32,
    channels: u32,
    period_frames: u32,
}

impl Default for Format {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            width_code: WIDTH_CODE_16,
            channels: 2,
            period_frames: DEFAULT_PERIOD_FRAMES,
        }
    }
}

impl Format {
    /// Bytes in one period; `BAD_VALUE` when the product does not fit.
    fn period_bytes(&self) -> CodecResult<usize> {
        let sample: usize = if self.width_code == WIDTH_CODE_16 { 2 } else { 4 };
        let frames = usize::try_from(self.period_frames).map_err(|_| status::BAD_VALUE)?;
        let channels = usize::try_from(self.channels).map_err(|_| status::BAD_VALUE)?;
        frames
            .checked_mul(channels)
            .and_then(|n| n.checked_mul(sample))
            .ok_or(status::BAD_VALUE)
    }

    fn block_size(&self, role: MemoryRole) -> CodecResult<usize> {
        match role {
            MemoryRole::Persistent => Ok(PERSISTENT_LEN),
            MemoryRole::Scratch | MemoryRole::Input | MemoryRole::Output => self.period_bytes(),
        }
    }
}

#[derive(Debug)]
struct State {
    phase: Phase,
    format: Format,
    mute: bool,
    tables: Option<BlockRef>,
    blocks: [Option<BlockRef>; 4],
    input_bytes: usize,
    produced: usize,
}

impl Default for State {
    fn default() -> Self {
        Self {
            phase: Phase::Created,
            format: Format::default(),
            mute: false,
            tables: None,
            blocks: Default::default(),
            input_bytes: 0,
            produced: 0,
        }
    }
}

impl State {
    fn require(&self, phase: Phase) -> CodecResult<()> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(status::BAD_PHASE)
        }
    }

    fn require_at_least(&self, phase: Phase) -> CodecResult<()> {
        if self.phase as u8 >= phase as u8 {
            Ok(())
        } else {
            Err(status::BAD_PHASE)
        }
    }

    fn block(&self, role: MemoryRole) -> CodecResult<&BlockRef> {
        self.blocks[role.code() as usize]
            .as_ref()
            .ok_or(status::BAD_BINDING)
    }
}

/// Reference codec: moves input bytes to output unchanged.
#[derive(Debug, Default)]
pub struct Passthrough {
    state: Mutex<State>,
}

impl Passthrough {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn role_at(index: u32) -> CodecResult<MemoryRole> {
    BLOCK_ROLES
        .get(index as usize)
        .copied()
        .ok_or(status::BAD_INDEX)
}

fn check_object(object: &ApiObject) -> CodecResult<()> {
    let tagged = object.read(|bytes| bytes.starts_with(&OBJECT_TAG));
    if tagged { Ok(()) } else { Err(status::BAD_OBJECT) }
}

fn decode_u32(value: &[u8]) -> CodecResult<u32> {
    let bytes: [u8; 4] = value.try_into().map_err(|_| status::BAD_PAYLOAD)?;
    Ok(u32::from_le_bytes(bytes))
}

/// Block length as stored in a 32-bit table field, saturating at `u32::MAX`.
fn table_len(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

/// Record a binding in the host-provided table area: role, size, address.
fn record_binding(tables: &BlockRef, index: u32, role: MemoryRole, block: &BlockRef) {
    let at = index as usize * TABLE_ENTRY_LEN;
    tables.write(|bytes| {
        if let Some(entry) = bytes.get_mut(at..at + TABLE_ENTRY_LEN) {
            entry[0..4].copy_from_slice(&role.code().to_le_bytes());
            entry[4..8].copy_from_slice(&table_len(block.len()).to_le_bytes());
            entry[8..16].copy_from_slice(&(block.addr() as u64).to_le_bytes());
        }
    });
}

impl CodecApi for Passthrough {
    fn lib_string(&self, kind: LibStringKind) -> CodecResult<String> {
        Ok(match kind {
            LibStringKind::Name => PASSTHROUGH_NAME.to_string(),
            LibStringKind::LibVersion => env!("CARGO_PKG_VERSION").to_string(),
            LibStringKind::ApiVersion => "1.0".to_string(),
        })
    }

    fn api_object_size(&self) -> CodecResult<usize> {
        Ok(OBJECT_SIZE)
    }

    fn initialize(&self, object: &ApiObject, phase: InitPhase) -> CodecResult<u32> {
        let mut state = self.state.lock();
        match phase {
            InitPhase::PreConfig => {
                object.write(|bytes| {
                    bytes.fill(0);
                    if let Some(tag) = bytes.get_mut(..OBJECT_TAG.len()) {
                        tag.copy_from_slice(&OBJECT_TAG);
                    }
                });
                *state = State {
                    phase: Phase::Configuring,
                    ..State::default()
                };
                Ok(0)
            }
            InitPhase::PostConfig => {
                check_object(object)?;
                state.require(Phase::Configuring)?;
                state.phase = Phase::Sized;
                Ok(0)
            }
            InitPhase::Process => {
                check_object(object)?;
                state.require(Phase::Sized)?;
                for role in BLOCK_ROLES {
                    let block = state.block(role)?;
                    if !block.is_live() || block.len() < state.format.block_size(role)? {
                        return Err(status::BAD_BINDING);
                    }
                }
                state.phase = Phase::Running;
                Ok(0)
            }
            InitPhase::QueryInitDone => Ok(u32::from(state.phase == Phase::Running)),
        }
    }

    fn set_config_param(&self, object: &ApiObject, id: u32, value: &[u8]) -> CodecResult<()> {
        check_object(object)?;
        let mut state = self.state.lock();
        state.require_at_least(Phase::Configuring)?;

        if id == param::MUTE {
            state.mute = decode_u32(value)? != 0;
            return Ok(());
        }

        if !matches!(
            id,
            param::SAMPLE_RATE | param::SAMPLE_WIDTH | param::CHANNELS | param::PERIOD_FRAMES
        ) {
            return Err(status::UNKNOWN_PARAM);
        }
        let value = decode_u32(value)?;
        if value == 0 {
            return Err(status::BAD_VALUE);
        }
        if id == param::SAMPLE_WIDTH && value != WIDTH_CODE_16 && value != WIDTH_CODE_WIDE {
            return Err(status::BAD_VALUE);
        }
        if state.phase != Phase::Configuring {
            // Memory is already sized for the current format.
            return Err(status::LOCKED);
        }

        let slot = match id {
            param::SAMPLE_RATE => &mut state.format.sample_rate,
            param::SAMPLE_WIDTH => &mut state.format.width_code,
            param::CHANNELS => &mut state.format.channels,
            _ => &mut state.format.period_frames,
        };
        *slot = value;
        Ok(())
    }

    fn memory_tables_size(&self, object: &ApiObject) -> CodecResult<usize> {
        check_object(object)?;
        Ok(BLOCK_ROLES.len() * TABLE_ENTRY_LEN)
    }

    fn set_memory_tables_pointer(&self, object: &ApiObject, tables: BlockRef) -> CodecResult<()> {
        check_object(object)?;
        if tables.len() < BLOCK_ROLES.len() * TABLE_ENTRY_LEN {
            return Err(status::BAD_BINDING);
        }
        self.state.lock().tables = Some(tables);
        Ok(())
    }

    fn memory_table_count(&self, object: &ApiObject) -> CodecResult<u32> {
        check_object(object)?;
        self.state.lock().require_at_least(Phase::Sized)?;
        Ok(BLOCK_ROLES.len() as u32)
    }

    fn memory_block_type(&self, object: &ApiObject, index: u32) -> CodecResult<u32> {
        check_object(object)?;
        role_at(index).map(MemoryRole::code)
    }

    fn memory_block_size(&self, object: &ApiObject, index: u32) -> CodecResult<usize> {
        check_object(object)?;
        let role = role_at(index)?;
        let state = self.state.lock();
        state.require_at_least(Phase::Sized)?;
        state.format.block_size(role)
    }

    fn memory_block_alignment(&self, object: &ApiObject, index: u32) -> CodecResult<usize> {
        check_object(object)?;
        role_at(index).map(|_| BLOCK_ALIGN)
    }

    fn set_memory_block_pointer(
        &self,
        object: &ApiObject,
        index: u32,
        block: BlockRef,
    ) -> CodecResult<()> {
        check_object(object)?;
        let role = role_at(index)?;
        let mut state = self.state.lock();
        state.require(Phase::Sized)?;
        if block.len() < state.format.block_size(role)? || block.addr() % BLOCK_ALIGN != 0 {
            return Err(status::BAD_BINDING);
        }
        if let Some(tables) = &state.tables {
            record_binding(tables, index, role, &block);
        }
        state.blocks[role.code() as usize] = Some(block);
        Ok(())
    }

    fn set_input_bytes(&self, object: &ApiObject, bytes: usize) -> CodecResult<()> {
        check_object(object)?;
        let mut state = self.state.lock();
        state.require(Phase::Running)?;
        state.input_bytes = bytes;
        Ok(())
    }

    fn execute(&self, object: &ApiObject) -> CodecResult<()> {
        check_object(object)?;
        let mut state = self.state.lock();
        state.require(Phase::Running)?;

        let input = state.block(MemoryRole::Input)?;
        let output = state.block(MemoryRole::Output)?;
        let count = state.input_bytes.min(input.len()).min(output.len());
        let mute = state.mute;

        let copied = input
            .read(|src| {
                output.write(|dst| {
                    if mute {
                        dst[..count].fill(0);
                    } else {
                        dst[..count].copy_from_slice(&src[..count]);
                    }
                })
            })
            .flatten();
        if copied.is_none() {
            return Err(status::BAD_BINDING);
        }

        trace!(count, mute, "passthrough executed");
        state.produced = count;
        Ok(())
    }

    fn output_bytes(&self, object: &ApiObject) -> CodecResult<usize> {
        check_object(object)?;
        let state = self.state.lock();
        state.require(Phase::Running)?;
        Ok(state.produced)
    }
}
