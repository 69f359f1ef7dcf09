//! Stream parameter pushes.
//!
//! The host negotiates a stream format out of band; the codec learns it as
//! three ordinary config parameters (rate, width code, channel count) whose
//! ids vary per library.

use std::fmt;

use tracing::{debug, warn};

use crate::{
    error::{AdapterError, AdapterResult},
    traits::{ApiObject, CodecApi},
};

/// Width code pushed for 16-bit interleaved formats.
pub const WIDTH_CODE_16: u32 = 0x10;
/// Width code pushed for every wider format.
pub const WIDTH_CODE_WIDE: u32 = 0x20;

/// Interleaved sample format of the negotiated stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrameFormat {
    #[default]
    S16Le,
    /// 24-bit samples in the low bytes of 32-bit containers.
    S24_4Le,
    S32Le,
    F32Le,
}

impl FrameFormat {
    /// Significant bits per sample.
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Self::S16Le => 16,
            Self::S24_4Le => 24,
            Self::S32Le | Self::F32Le => 32,
        }
    }

    /// Container bytes per sample.
    #[must_use]
    pub const fn container_bytes(self) -> usize {
        match self {
            Self::S16Le => 2,
            Self::S24_4Le | Self::S32Le | Self::F32Le => 4,
        }
    }

    /// Width code understood by codec libraries. Only two buckets exist.
    #[must_use]
    pub const fn width_code(self) -> u32 {
        width_code_for_bits(self.bits())
    }
}

/// Width code for a raw bit depth: 16 maps to [`WIDTH_CODE_16`], anything
/// else to [`WIDTH_CODE_WIDE`].
#[must_use]
pub const fn width_code_for_bits(bits: u32) -> u32 {
    if bits == 16 {
        WIDTH_CODE_16
    } else {
        WIDTH_CODE_WIDE
    }
}

/// Negotiated stream format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParams {
    pub sample_rate: u32,
    pub channels: u32,
    pub format: FrameFormat,
}

impl StreamParams {
    #[must_use]
    pub const fn new(sample_rate: u32, channels: u32, format: FrameFormat) -> Self {
        Self {
            sample_rate,
            channels,
            format,
        }
    }

    /// Bytes in one interleaved frame.
    #[must_use]
    pub const fn frame_bytes(&self) -> usize {
        self.format.container_bytes() * self.channels as usize
    }
}

impl Default for StreamParams {
    fn default() -> Self {
        Self::new(48_000, 2, FrameFormat::S16Le)
    }
}

impl fmt::Display for StreamParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz, {} channels, {:?}",
            self.sample_rate, self.channels, self.format
        )
    }
}

/// Config parameter ids a library uses for the stream values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParamIds {
    pub sample_rate: u32,
    pub sample_width: u32,
    pub channels: u32,
}

impl Default for StreamParamIds {
    fn default() -> Self {
        Self {
            sample_rate: 0,
            sample_width: 1,
            channels: 2,
        }
    }
}

/// Push rate, width code and channel count, in that order.
///
/// Each value goes out as a 4-byte little-endian payload. A recoverable
/// refusal is logged and the sequence continues.
///
/// # Errors
///
/// Returns [`AdapterError::ParamRejected`] for the first fatal refusal; the
/// remaining pushes are not attempted.
pub fn update_stream_params(
    api: &dyn CodecApi,
    object: &ApiObject,
    ids: &StreamParamIds,
    params: &StreamParams,
) -> AdapterResult<()> {
    let pushes = [
        ("sample_rate", ids.sample_rate, params.sample_rate),
        ("sample_width", ids.sample_width, params.format.width_code()),
        ("channels", ids.channels, params.channels),
    ];

    for (name, id, value) in pushes {
        match api.set_config_param(object, id, &value.to_le_bytes()) {
            Ok(()) => debug!(param = name, id, value, "stream parameter set"),
            Err(status) if status.is_fatal() => {
                warn!(param = name, id, %status, "codec rejected stream parameter");
                return Err(AdapterError::ParamRejected { id, status });
            }
            Err(status) => warn!(param = name, id, %status, "codec ignored stream parameter"),
        }
    }

    Ok(())
}
