//! Packed parameter lists and the config applier.
//!
//! A configuration blob is a run of self-delimiting records with no count:
//!
//! ```text
//! [id: u32 LE][size: u32 LE][payload: size - 8 bytes] [id][size][payload] ...
//! ```
//!
//! `size` covers the whole record including its 8-byte header, so the next
//! record starts exactly `size` bytes later. The format carries no integrity
//! check; [`ParamCursor`] rejects records that would not advance or would run
//! past the end of the blob.

use std::{fmt, iter::FusedIterator};

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::{
    error::{AdapterError, AdapterResult},
    status::CodecStatus,
    traits::{ApiObject, CodecApi},
};

/// Bytes taken by a record header (id + size).
pub const PARAM_HEADER_LEN: usize = 8;

/// Which configuration a blob carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKind {
    /// Applied once while preparing.
    Setup,
    /// Applied on demand while prepared.
    Runtime,
}

impl fmt::Display for ConfigKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Setup => "setup",
            Self::Runtime => "runtime",
        })
    }
}

/// Corrupt record found while walking a blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParamError {
    #[error("parameter at offset {offset} declares zero size")]
    ZeroSize { offset: usize },

    #[error("parameter at offset {offset} declares size {size}, smaller than its header")]
    Undersized { offset: usize, size: usize },

    #[error("parameter at offset {offset} needs {needed} bytes but only {remaining} remain")]
    Truncated {
        offset: usize,
        needed: usize,
        remaining: usize,
    },
}

/// One decoded record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Param<'a> {
    pub id: u32,
    /// Offset of the record header within the blob.
    pub offset: usize,
    /// Declared record size, header included.
    pub size: usize,
    pub payload: &'a [u8],
}

/// Lazy cursor over a packed parameter list.
///
/// Yields each record once, in order. After the first malformed record it
/// yields that error and then stops.
#[derive(Debug, Clone)]
pub struct ParamCursor<'a> {
    data: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> ParamCursor<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            failed: false,
        }
    }

    /// Bytes not consumed yet.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    fn fail(&mut self, err: ParamError) -> Option<Result<Param<'a>, ParamError>> {
        self.failed = true;
        Some(Err(err))
    }
}

impl<'a> Iterator for ParamCursor<'a> {
    type Item = Result<Param<'a>, ParamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.data.len() {
            return None;
        }

        let offset = self.offset;
        let rest = &self.data[offset..];
        let remaining = rest.len();

        let Some(header) = rest.first_chunk::<PARAM_HEADER_LEN>() else {
            return self.fail(ParamError::Truncated {
                offset,
                needed: PARAM_HEADER_LEN,
                remaining,
            });
        };
        let id = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let size = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;

        if size == 0 {
            return self.fail(ParamError::ZeroSize { offset });
        }
        if size < PARAM_HEADER_LEN {
            return self.fail(ParamError::Undersized { offset, size });
        }
        if size > remaining {
            return self.fail(ParamError::Truncated {
                offset,
                needed: size,
                remaining,
            });
        }

        self.offset += size;
        Some(Ok(Param {
            id,
            offset,
            size,
            payload: &rest[PARAM_HEADER_LEN..size],
        }))
    }
}

impl FusedIterator for ParamCursor<'_> {}

/// Builds a packed parameter list.
///
/// ```
/// use aulos_codec::{ParamCursor, ParamWriter};
///
/// let blob = ParamWriter::new().u32(0x10, 48_000).bytes(0x11, &[1, 2, 3, 4]).finish();
/// let ids: Vec<u32> = ParamCursor::new(&blob).map(|p| p.unwrap().id).collect();
/// assert_eq!(ids, [0x10, 0x11]);
/// ```
#[derive(Debug, Default, Clone)]
pub struct ParamWriter {
    buf: Vec<u8>,
}

impl ParamWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record with a raw payload.
    ///
    /// # Panics
    ///
    /// Panics if the record would not fit the 32-bit size field.
    #[must_use]
    pub fn bytes(mut self, id: u32, payload: &[u8]) -> Self {
        let size = u32::try_from(PARAM_HEADER_LEN + payload.len())
            .unwrap_or_else(|_| panic!("parameter {id:#x} payload too large"));
        self.buf.extend_from_slice(&id.to_le_bytes());
        self.buf.extend_from_slice(&size.to_le_bytes());
        self.buf.extend_from_slice(payload);
        self
    }

    /// Append a record carrying one little-endian `u32`.
    #[must_use]
    pub fn u32(self, id: u32, value: u32) -> Self {
        self.bytes(id, &value.to_le_bytes())
    }

    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Configuration bytes plus a flag telling whether they were delivered
/// since the last time they were applied.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigBlob {
    data: Vec<u8>,
    fresh: bool,
}

impl ConfigBlob {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents with newly delivered configuration.
    pub fn set(&mut self, data: impl Into<Vec<u8>>) {
        self.data = data.into();
        self.fresh = true;
    }

    /// Whether new configuration arrived since it was last applied.
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Mark applied; bytes are kept for reuse.
    pub fn mark_consumed(&mut self) {
        self.fresh = false;
    }

    /// Make previously applied bytes available again.
    pub(crate) fn revive(&mut self) {
        self.fresh = true;
    }
}

/// A record the codec refused with a recoverable status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkippedParam {
    pub id: u32,
    pub status: CodecStatus,
}

/// What stopped an apply pass early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyFailure {
    /// The codec refused a record with a fatal status.
    Rejected { id: u32, status: CodecStatus },
    /// The blob itself is corrupt.
    Malformed(ParamError),
}

impl From<ApplyFailure> for AdapterError {
    fn from(failure: ApplyFailure) -> Self {
        match failure {
            ApplyFailure::Rejected { id, status } => Self::ParamRejected { id, status },
            ApplyFailure::Malformed(err) => Self::MalformedParam(err),
        }
    }
}

/// Outcome of one apply pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplySummary {
    /// Records the codec accepted.
    pub applied: usize,
    /// Records refused with a recoverable status, in blob order.
    pub skipped: Vec<SkippedParam>,
    /// First fatal problem, if the pass was cut short.
    pub fatal: Option<ApplyFailure>,
}

impl ApplySummary {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.fatal.is_none()
    }

    /// `Ok(self)` for a complete pass, the fatal failure otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::ParamRejected`] or [`AdapterError::MalformedParam`].
    pub fn into_result(self) -> AdapterResult<Self> {
        match self.fatal {
            Some(failure) => Err(failure.into()),
            None => Ok(self),
        }
    }
}

/// Push every record of `data` to the codec, in order.
///
/// Recoverable refusals are logged and counted; the first fatal refusal or
/// malformed record ends the pass.
pub fn apply_params(api: &dyn CodecApi, object: &ApiObject, data: &[u8]) -> ApplySummary {
    let mut summary = ApplySummary::default();

    for param in ParamCursor::new(data) {
        let param = match param {
            Ok(param) => param,
            Err(err) => {
                warn!(%err, "malformed configuration parameter");
                summary.fatal = Some(ApplyFailure::Malformed(err));
                break;
            }
        };

        trace!(id = param.id, size = param.size, "applying parameter");
        match api.set_config_param(object, param.id, param.payload) {
            Ok(()) => summary.applied += 1,
            Err(status) if status.is_fatal() => {
                warn!(id = param.id, %status, "codec rejected parameter");
                summary.fatal = Some(ApplyFailure::Rejected {
                    id: param.id,
                    status,
                });
                break;
            }
            Err(status) => {
                warn!(id = param.id, %status, "codec skipped parameter");
                summary.skipped.push(SkippedParam {
                    id: param.id,
                    status,
                });
            }
        }
    }

    summary
}

/// Apply a setup or runtime blob.
///
/// # Errors
///
/// - [`AdapterError::NoConfig`] if the blob was not delivered or is empty.
/// - [`AdapterError::ParamRejected`] / [`AdapterError::MalformedParam`] when
///   the pass was cut short.
pub fn apply_config(
    api: &dyn CodecApi,
    object: &ApiObject,
    kind: ConfigKind,
    blob: &ConfigBlob,
) -> AdapterResult<ApplySummary> {
    if !blob.is_fresh() || blob.is_empty() {
        return Err(AdapterError::NoConfig(kind));
    }

    let summary = apply_params(api, object, blob.bytes()).into_result()?;
    debug!(
        %kind,
        applied = summary.applied,
        skipped = summary.skipped.len(),
        "configuration applied"
    );
    Ok(summary)
}
