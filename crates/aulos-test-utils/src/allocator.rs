//! Allocator that counts every allocation and release.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use aulos_memory::{AlignedBuf, AllocError, AllocResult, Allocator, HeapAllocator};

/// Heap-backed [`Allocator`] that tracks outstanding blocks and can be told
/// to fail the n-th allocation.
#[derive(Debug, Default)]
pub struct CountingAllocator {
    fail_at: Option<usize>,
    attempts: AtomicUsize,
    allocated: AtomicUsize,
    released: AtomicUsize,
    live_bytes: AtomicUsize,
}

impl CountingAllocator {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the allocation attempt with zero-based number `n` with
    /// [`AllocError::OutOfMemory`]. Later attempts succeed.
    #[must_use]
    pub fn failing_at(n: usize) -> Arc<Self> {
        Arc::new(Self {
            fail_at: Some(n),
            ..Self::default()
        })
    }

    /// Coerce into the trait object the adapter takes.
    #[must_use]
    pub fn shared(self: &Arc<Self>) -> Arc<dyn Allocator> {
        Arc::clone(self) as Arc<dyn Allocator>
    }

    /// Allocation attempts so far, failed ones included.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Successful allocations so far.
    #[must_use]
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Blocks allocated and not yet released.
    #[must_use]
    pub fn live(&self) -> usize {
        self.allocated() - self.released()
    }

    #[must_use]
    pub fn live_bytes(&self) -> usize {
        self.live_bytes.load(Ordering::SeqCst)
    }
}

impl Allocator for CountingAllocator {
    fn allocate(&self, size: usize, align: usize) -> AllocResult<AlignedBuf> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_at == Some(attempt) {
            return Err(AllocError::OutOfMemory { size, align });
        }
        let buf = HeapAllocator.allocate(size, align)?;
        self.allocated.fetch_add(1, Ordering::SeqCst);
        self.live_bytes.fetch_add(buf.len(), Ordering::SeqCst);
        Ok(buf)
    }

    fn release(&self, buf: AlignedBuf) {
        self.released.fetch_add(1, Ordering::SeqCst);
        self.live_bytes.fetch_sub(buf.len(), Ordering::SeqCst);
        drop(buf);
    }
}
