use std::sync::{Arc, OnceLock};

use thiserror::Error;

use crate::buf::AlignedBuf;

/// Errors reported by an [`Allocator`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    #[error("out of memory: {size} bytes aligned to {align}")]
    OutOfMemory { size: usize, align: usize },

    #[error("alignment {align} is not a power of two")]
    InvalidAlignment { align: usize },
}

/// Result type for allocation.
pub type AllocResult<T> = Result<T, AllocError>;

/// Source of block memory.
///
/// Implementations decide where bytes come from (heap, a fixed arena, a
/// platform pool). Every buffer handed out by [`allocate`](Allocator::allocate)
/// comes back through [`release`](Allocator::release) exactly once when its
/// owning [`Block`](crate::Block) is dropped.
pub trait Allocator: Send + Sync {
    /// Allocate `size` zeroed bytes at `align`.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError`] if the request cannot be satisfied.
    fn allocate(&self, size: usize, align: usize) -> AllocResult<AlignedBuf>;

    /// Take back a buffer previously returned by [`allocate`](Allocator::allocate).
    fn release(&self, buf: AlignedBuf) {
        drop(buf);
    }
}

/// Global-heap allocator.
///
/// Reserves with `try_reserve_exact`, so exhaustion surfaces as
/// [`AllocError::OutOfMemory`] rather than an abort.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAllocator;

impl Allocator for HeapAllocator {
    fn allocate(&self, size: usize, align: usize) -> AllocResult<AlignedBuf> {
        AlignedBuf::new(size, align)
    }
}

static GLOBAL_HEAP: OnceLock<Arc<dyn Allocator>> = OnceLock::new();

/// Shared [`HeapAllocator`] handle for the entire workspace.
///
/// Lazily initialized on first call.
pub fn heap() -> Arc<dyn Allocator> {
    Arc::clone(GLOBAL_HEAP.get_or_init(|| Arc::new(HeapAllocator)))
}
