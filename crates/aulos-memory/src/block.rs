use std::{
    fmt,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;
use tracing::trace;

use crate::{
    allocator::{AllocResult, Allocator},
    buf::AlignedBuf,
};

/// Single owner of an allocated block.
///
/// Returns its memory to the allocator it came from on drop. Outstanding
/// [`BlockRef`] handles stop resolving at that point.
pub struct Block {
    shared: Arc<Mutex<AlignedBuf>>,
    allocator: Arc<dyn Allocator>,
    len: usize,
    align: usize,
    addr: usize,
}

impl Block {
    /// Allocate a block of `size` bytes at `align` from `allocator`.
    ///
    /// # Errors
    ///
    /// Propagates the allocator's [`AllocError`](crate::AllocError).
    pub fn allocate(
        allocator: &Arc<dyn Allocator>,
        size: usize,
        align: usize,
    ) -> AllocResult<Self> {
        let buf = allocator.allocate(size, align)?;
        let (len, align, addr) = (buf.len(), buf.align(), buf.addr());
        trace!(len, align, addr, "block allocated");

        Ok(Self {
            shared: Arc::new(Mutex::new(buf)),
            allocator: Arc::clone(allocator),
            len,
            align,
            addr,
        })
    }

    /// Non-owning handle to this block.
    #[must_use]
    pub fn handle(&self) -> BlockRef {
        BlockRef {
            shared: Arc::downgrade(&self.shared),
            len: self.len,
            align: self.align,
            addr: self.addr,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn align(&self) -> usize {
        self.align
    }

    /// Address of the first usable byte.
    #[must_use]
    pub fn addr(&self) -> usize {
        self.addr
    }

    /// Run `f` over the block contents.
    pub fn read<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(self.shared.lock().as_slice())
    }

    /// Run `f` over the mutable block contents.
    pub fn write<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        f(self.shared.lock().as_mut_slice())
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        let buf = std::mem::take(&mut *self.shared.lock());
        trace!(len = self.len, addr = self.addr, "block released");
        self.allocator.release(buf);
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("addr", &format_args!("{:#x}", self.addr))
            .field("len", &self.len)
            .field("align", &self.align)
            .finish_non_exhaustive()
    }
}

/// Borrowed view of a [`Block`] that does not keep it alive.
///
/// This is what a codec receives when a block pointer is bound. Access goes
/// through [`read`](BlockRef::read)/[`write`](BlockRef::write), which return
/// `None` once the owner has been released.
#[derive(Clone)]
pub struct BlockRef {
    shared: Weak<Mutex<AlignedBuf>>,
    len: usize,
    align: usize,
    addr: usize,
}

impl BlockRef {
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn align(&self) -> usize {
        self.align
    }

    #[must_use]
    pub fn addr(&self) -> usize {
        self.addr
    }

    /// Whether the owning block is still allocated.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.shared.strong_count() > 0
    }

    pub fn read<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        let shared = self.shared.upgrade()?;
        let guard = shared.lock();
        Some(f(guard.as_slice()))
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> Option<R> {
        let shared = self.shared.upgrade()?;
        let mut guard = shared.lock();
        Some(f(guard.as_mut_slice()))
    }
}

impl fmt::Debug for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockRef")
            .field("addr", &format_args!("{:#x}", self.addr))
            .field("len", &self.len)
            .field("live", &self.is_live())
            .finish()
    }
}
