use std::fmt;

use crate::allocator::{AllocError, AllocResult};

/// Zero-initialized byte buffer whose visible window starts on an aligned
/// address.
///
/// The backing `Vec` is over-allocated by `align - 1` bytes and never grows
/// after construction, so the aligned window stays put for the buffer's
/// whole life.
#[derive(Default)]
pub struct AlignedBuf {
    storage: Vec<u8>,
    offset: usize,
    len: usize,
    align: usize,
}

impl AlignedBuf {
    /// Allocate `size` zeroed bytes aligned to `align`.
    ///
    /// An alignment of `0` is treated as `1` (no constraint).
    ///
    /// # Errors
    ///
    /// - [`AllocError::InvalidAlignment`] if `align` is not a power of two.
    /// - [`AllocError::OutOfMemory`] if the memory cannot be reserved.
    pub fn new(size: usize, align: usize) -> AllocResult<Self> {
        let align = align.max(1);
        if !align.is_power_of_two() {
            return Err(AllocError::InvalidAlignment { align });
        }

        let padded = size
            .checked_add(align - 1)
            .ok_or(AllocError::OutOfMemory { size, align })?;

        let mut storage = Vec::new();
        storage
            .try_reserve_exact(padded)
            .map_err(|_| AllocError::OutOfMemory { size, align })?;
        storage.resize(padded, 0);

        let base = storage.as_ptr() as usize;
        let offset = base.wrapping_neg() & (align - 1);

        Ok(Self {
            storage,
            offset,
            len: size,
            align,
        })
    }

    /// Usable length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Alignment the buffer was created with.
    #[must_use]
    pub fn align(&self) -> usize {
        self.align
    }

    /// Address of the first usable byte.
    #[must_use]
    pub fn addr(&self) -> usize {
        self.storage.as_ptr() as usize + self.offset
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.storage[self.offset..self.offset + self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.storage[self.offset..self.offset + self.len]
    }
}

impl fmt::Debug for AlignedBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlignedBuf")
            .field("addr", &format_args!("{:#x}", self.addr()))
            .field("len", &self.len)
            .field("align", &self.align)
            .finish()
    }
}
