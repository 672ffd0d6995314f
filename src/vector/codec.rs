//! Bit-exact byte encoding for embedding vectors.
//!
//! A vector of N floats is stored as N * 4 bytes, each float as its IEEE-754
//! single precision bit pattern in little-endian order. No header, no length
//! prefix. Readers and writers on any platform agree on this layout.

use super::types::VectorError;

const F32_BYTES: usize = std::mem::size_of::<f32>();

/// Encodes a vector into its storage bytes.
#[must_use]
pub fn encode(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * F32_BYTES);
    for value in vector {
        bytes.extend_from_slice(&value.to_bits().to_le_bytes());
    }
    bytes
}

/// Decodes storage bytes back into a vector.
///
/// # Errors
/// Returns [`VectorError::InvalidEncoding`] when the byte length is not a
/// multiple of four.
pub fn decode(bytes: &[u8]) -> Result<Vec<f32>, VectorError> {
    if bytes.len() % F32_BYTES != 0 {
        return Err(VectorError::InvalidEncoding { len: bytes.len() });
    }

    Ok(bytes
        .chunks_exact(F32_BYTES)
        .map(|chunk| f32::from_bits(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])))
        .collect())
}
