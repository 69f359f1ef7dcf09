//! Status codes returned by codec libraries.

use std::fmt;

/// Raw status word returned by a capability call.
///
/// `0` is the no-error sentinel. Bit 31 marks a fatal status; every other
/// nonzero value is recoverable, meaning the current item failed but the
/// surrounding operation may continue.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CodecStatus(u32);

impl CodecStatus {
    /// No error.
    pub const OK: Self = Self(0);

    const FATAL_BIT: u32 = 0x8000_0000;

    /// Wrap a raw status word.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Fatal status with the given code in the low bits.
    #[must_use]
    pub const fn fatal(code: u32) -> Self {
        Self(code | Self::FATAL_BIT)
    }

    /// Recoverable status with the given code in the low bits.
    ///
    /// A zero code would collide with [`CodecStatus::OK`], so it is bumped to 1.
    #[must_use]
    pub const fn recoverable(code: u32) -> Self {
        let code = code & !Self::FATAL_BIT;
        if code == 0 { Self(1) } else { Self(code) }
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn is_ok(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn is_fatal(self) -> bool {
        self.0 & Self::FATAL_BIT != 0
    }

    /// Convert a raw status word into a [`CodecResult`].
    ///
    /// # Errors
    ///
    /// Returns the status itself when it is not [`CodecStatus::OK`].
    pub const fn check(self) -> CodecResult<()> {
        if self.is_ok() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Debug for CodecStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CodecStatus({:#010x})", self.0)
    }
}

impl fmt::Display for CodecStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_ok() {
            "ok"
        } else if self.is_fatal() {
            "fatal"
        } else {
            "recoverable"
        };
        write!(f, "{:#010x} ({kind})", self.0)
    }
}

/// Result of a capability call. `Err` never carries [`CodecStatus::OK`].
pub type CodecResult<T> = Result<T, CodecStatus>;
