//! Memory-table negotiation.
//!
//! After configuration the codec declares how many blocks it needs and the
//! role, size and alignment of each. The host allocates every block, binds
//! it back by index, and keeps ownership in a [`MemoryTable`].

use std::sync::Arc;

use aulos_memory::{Allocator, Block};
use tracing::{debug, trace, warn};

use crate::{
    error::{AdapterError, AdapterResult},
    traits::{ApiObject, CodecApi, InitPhase, MemoryRole},
};

/// One negotiated block.
#[derive(Debug)]
pub struct MemoryEntry {
    index: u32,
    role: MemoryRole,
    block: Block,
}

impl MemoryEntry {
    /// Index the codec declared this block under.
    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[must_use]
    pub fn role(&self) -> MemoryRole {
        self.role
    }

    #[must_use]
    pub fn block(&self) -> &Block {
        &self.block
    }
}

/// Blocks owned on behalf of one prepared codec instance.
///
/// Entries only grow. Each role points at the most recent entry declared
/// with it; an earlier entry with the same role stays owned here and is
/// released together with the table.
#[derive(Debug, Default)]
pub struct MemoryTable {
    entries: Vec<MemoryEntry>,
    roles: [Option<usize>; 4],
}

impl MemoryTable {
    fn slot(role: MemoryRole) -> usize {
        role.code() as usize
    }

    fn push(&mut self, index: u32, role: MemoryRole, block: Block) {
        let slot = Self::slot(role);
        if let Some(previous) = self.roles[slot] {
            warn!(
                index,
                %role,
                previous = self.entries[previous].index,
                "memory role declared twice, keeping the later block"
            );
        }
        self.roles[slot] = Some(self.entries.len());
        self.entries.push(MemoryEntry { index, role, block });
    }

    /// Block currently bound for `role`.
    #[must_use]
    pub fn get(&self, role: MemoryRole) -> Option<&Block> {
        self.roles[Self::slot(role)].map(|i| &self.entries[i].block)
    }

    #[must_use]
    pub fn input(&self) -> Option<&Block> {
        self.get(MemoryRole::Input)
    }

    #[must_use]
    pub fn output(&self) -> Option<&Block> {
        self.get(MemoryRole::Output)
    }

    #[must_use]
    pub fn scratch(&self) -> Option<&Block> {
        self.get(MemoryRole::Scratch)
    }

    #[must_use]
    pub fn persistent(&self) -> Option<&Block> {
        self.get(MemoryRole::Persistent)
    }

    /// Size of the bound input block, zero when none was declared.
    #[must_use]
    pub fn input_capacity(&self) -> usize {
        self.input().map_or(0, Block::len)
    }

    /// Size of the bound output block, zero when none was declared.
    #[must_use]
    pub fn output_capacity(&self) -> usize {
        self.output().map_or(0, Block::len)
    }

    /// Every negotiated block in declaration order, superseded ones included.
    pub fn entries(&self) -> impl ExactSizeIterator<Item = &MemoryEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total bytes held by the table.
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.entries.iter().map(|e| e.block.len()).sum()
    }
}

/// Run the negotiation protocol.
///
/// Strictly sequential in ascending index order: a library may size later
/// blocks based on bindings it has already seen.
///
/// # Errors
///
/// - [`AdapterError::Codec`] for any fatal codec status.
/// - [`AdapterError::UnknownMemoryRole`] for an unrecognized block type.
/// - [`AdapterError::OutOfMemory`] / [`AdapterError::InvalidAlignment`] from
///   the allocator.
///
/// On error every block allocated so far is released before returning.
pub fn negotiate(
    api: &dyn CodecApi,
    object: &ApiObject,
    allocator: &Arc<dyn Allocator>,
) -> AdapterResult<MemoryTable> {
    api.initialize(object, InitPhase::PostConfig)
        .map_err(AdapterError::codec("post-config init"))?;

    let count = api
        .memory_table_count(object)
        .map_err(AdapterError::codec("memory table count"))?;
    debug!(count, "negotiating memory blocks");

    let mut table = MemoryTable::default();
    for index in 0..count {
        let code = api
            .memory_block_type(object, index)
            .map_err(AdapterError::codec("memory block type"))?;
        let role = MemoryRole::from_code(code)
            .ok_or(AdapterError::UnknownMemoryRole { index, code })?;
        let size = api
            .memory_block_size(object, index)
            .map_err(AdapterError::codec("memory block size"))?;
        let align = api
            .memory_block_alignment(object, index)
            .map_err(AdapterError::codec("memory block alignment"))?;

        let block = Block::allocate(allocator, size, align)?;
        api.set_memory_block_pointer(object, index, block.handle())
            .map_err(AdapterError::codec("bind memory block"))?;
        trace!(index, %role, size, align, addr = block.addr(), "memory block bound");

        table.push(index, role, block);
    }

    debug!(
        blocks = table.len(),
        bytes = table.total_bytes(),
        "memory negotiation complete"
    );
    Ok(table)
}
