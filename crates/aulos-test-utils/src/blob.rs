//! Configuration blob helpers.

use aulos_codec::ParamWriter;

/// Encode one record with an arbitrary declared size, including sizes that
/// do not match the payload.
#[must_use]
pub fn raw_param(id: u32, declared_size: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + payload.len());
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&declared_size.to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Blob of `u32` parameters, one record per `(id, value)` pair.
#[must_use]
pub fn setup_blob(params: &[(u32, u32)]) -> Vec<u8> {
    params
        .iter()
        .fold(ParamWriter::new(), |writer, &(id, value)| writer.u32(id, value))
        .finish()
}
