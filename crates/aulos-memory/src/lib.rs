//! Aligned memory blocks handed to codec libraries.
//!
//! A codec declares the blocks it needs (size + alignment) and the host binds
//! pointers to them. This crate provides the host side of that contract:
//!
//! - **[`Allocator`]**: seam for where block memory comes from. The default
//!   [`HeapAllocator`] reports allocation failure instead of aborting.
//! - **[`Block`]**: the single owner of an allocation. Dropping it hands the
//!   memory back to its allocator exactly once.
//! - **[`BlockRef`]**: non-owning handle given to the codec. It resolves only
//!   while the owning [`Block`] is alive.
//!
//! ## Example
//!
//! ```
//! use aulos_memory::{Block, heap};
//!
//! let block = Block::allocate(&heap(), 256, 16).unwrap();
//! assert_eq!(block.addr() % 16, 0);
//!
//! let handle = block.handle();
//! handle.write(|bytes| bytes[0] = 7);
//! assert_eq!(block.read(|bytes| bytes[0]), 7);
//!
//! drop(block);
//! assert!(!handle.is_live());
//! ```

#![forbid(unsafe_code)]

mod allocator;
mod block;
mod buf;

pub use allocator::{AllocError, AllocResult, Allocator, HeapAllocator, heap};
pub use block::{Block, BlockRef};
pub use buf::AlignedBuf;
