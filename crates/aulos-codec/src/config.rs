//! Adapter configuration.

use derivative::Derivative;
use derive_setters::Setters;

use crate::{
    registry::CodecId,
    stream::{StreamParamIds, StreamParams},
};

/// Configuration for one [`CodecAdapter`](crate::CodecAdapter).
///
/// ```
/// use aulos_codec::{AdapterConfig, FrameFormat, KnownCodec, StreamParams};
///
/// let config = AdapterConfig::new(KnownCodec::Mp3Dec)
///     .with_stream(StreamParams::new(44_100, 2, FrameFormat::S24_4Le))
///     .with_memtabs_align(16);
/// assert_eq!(config.codec_id.api_id(), 0x06);
/// ```
#[derive(Clone, Debug, Derivative, Setters)]
#[derivative(Default)]
#[setters(prefix = "with_")]
pub struct AdapterConfig {
    /// Full codec id; only its low byte selects the capability.
    pub codec_id: CodecId,
    /// Stream format pushed to the codec while preparing.
    pub stream: StreamParams,
    /// Parameter ids the codec uses for the stream values.
    pub stream_ids: StreamParamIds,
    /// Alignment of the memory-table bookkeeping area. Default: 4.
    #[derivative(Default(value = "4"))]
    pub memtabs_align: usize,
    /// Alignment of the opaque codec object. Default: 8.
    #[derivative(Default(value = "8"))]
    pub object_align: usize,
}

impl AdapterConfig {
    #[must_use]
    pub fn new(codec_id: impl Into<CodecId>) -> Self {
        Self {
            codec_id: codec_id.into(),
            ..Self::default()
        }
    }
}
