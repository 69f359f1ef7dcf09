//! Error types for the codec adapter.

use aulos_memory::AllocError;
use thiserror::Error;

use crate::{
    adapter::AdapterState,
    params::{ConfigKind, ParamError},
    status::CodecStatus,
};

/// Errors surfaced by adapter operations.
///
/// Every variant is fatal to the call that produced it. Recoverable codec
/// statuses never show up here; they are logged and counted instead.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("no codec capability registered for api id {api_id:#04x}")]
    NotFound { api_id: u8 },

    #[error("out of memory: {size} bytes aligned to {align}")]
    OutOfMemory { size: usize, align: usize },

    #[error("codec requested invalid alignment {align}")]
    InvalidAlignment { align: usize },

    #[error("no {0} configuration available")]
    NoConfig(ConfigKind),

    #[error("{op} failed with codec status {status}")]
    Codec { op: &'static str, status: CodecStatus },

    #[error("codec rejected parameter {id:#x} with status {status}")]
    ParamRejected { id: u32, status: CodecStatus },

    #[error("malformed configuration: {0}")]
    MalformedParam(#[from] ParamError),

    #[error("codec reported it is not ready after initialization")]
    NotReady,

    #[error("unrecognized memory block type {code} at index {index}")]
    UnknownMemoryRole { index: u32, code: u32 },

    #[error("cannot {op} while {state}")]
    InvalidTransition {
        op: &'static str,
        state: AdapterState,
    },

    #[error("{requested} input bytes exceed the {capacity}-byte input buffer")]
    InputOverflow { requested: usize, capacity: usize },
}

impl AdapterError {
    pub(crate) fn codec(op: &'static str) -> impl FnOnce(CodecStatus) -> Self {
        move |status| Self::Codec { op, status }
    }

    /// Whether the surrounding phase may succeed if retried after the caller
    /// fixes the environment (frees memory elsewhere, supplies configuration).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. } | Self::NoConfig(_))
    }

    /// Codec status carried by this error, if any.
    #[must_use]
    pub fn status(&self) -> Option<CodecStatus> {
        match self {
            Self::Codec { status, .. } | Self::ParamRejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<AllocError> for AdapterError {
    fn from(err: AllocError) -> Self {
        match err {
            AllocError::OutOfMemory { size, align } => Self::OutOfMemory { size, align },
            AllocError::InvalidAlignment { align } => Self::InvalidAlignment { align },
        }
    }
}

/// Result type for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;
