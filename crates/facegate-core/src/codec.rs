//! Template codec: embedding <-> base64 text.
//!
//! Each component is written as a 4-byte big-endian IEEE-754 float, the 512
//! components back to back, and the resulting 2048 bytes rendered with the
//! standard padded base64 alphabet. Decoding copies the bytes back into
//! floats, so a round trip is bit-exact.

use crate::types::{EncodedForm, Embedding, EMBEDDING_DIM};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

const BYTES_PER_COMPONENT: usize = 4;
const ENCODED_BYTES: usize = EMBEDDING_DIM * BYTES_PER_COMPONENT;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("not valid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("decoded length {0} is not a positive multiple of {BYTES_PER_COMPONENT}")]
    CorruptLength(usize),
    #[error("expected {expected} components, decoded {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Encode an embedding into its persistence form. Total and deterministic.
pub fn encode(embedding: &Embedding) -> EncodedForm {
    let mut bytes = Vec::with_capacity(ENCODED_BYTES);
    for value in embedding.values() {
        bytes.extend_from_slice(&value.to_be_bytes());
    }
    EncodedForm::new(STANDARD.encode(bytes))
}

/// Decode a persistence form back into an embedding.
///
/// Strict: whitespace, missing padding and non-canonical trailing bits are
/// all rejected as [`CodecError::InvalidBase64`].
pub fn decode(encoded: &EncodedForm) -> Result<Embedding, CodecError> {
    let bytes = STANDARD.decode(encoded.as_str())?;

    if bytes.is_empty() || bytes.len() % BYTES_PER_COMPONENT != 0 {
        return Err(CodecError::CorruptLength(bytes.len()));
    }

    let components = bytes.len() / BYTES_PER_COMPONENT;
    if components != EMBEDDING_DIM {
        return Err(CodecError::DimensionMismatch {
            expected: EMBEDDING_DIM,
            actual: components,
        });
    }

    let mut values = [0.0f32; EMBEDDING_DIM];
    for (slot, chunk) in values
        .iter_mut()
        .zip(bytes.chunks_exact(BYTES_PER_COMPONENT))
    {
        *slot = f32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }

    Ok(Embedding::new(values))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Embedding {
        Embedding::from_fn(|i| ((i as f32) * 0.37).sin() / 7.0)
    }

    #[test]
    fn test_round_trip_is_bit_exact() {
        let original = sample();
        let decoded = decode(&encode(&original)).unwrap();
        assert!(decoded.bit_eq(&original));
    }

    #[test]
    fn test_round_trip_preserves_awkward_values() {
        let original = Embedding::from_fn(|i| match i % 6 {
            0 => -0.0,
            1 => f32::MIN_POSITIVE / 2.0, // subnormal
            2 => f32::MAX,
            3 => f32::MIN,
            4 => f32::EPSILON,
            _ => 1.0 / 3.0,
        });
        let decoded = decode(&encode(&original)).unwrap();
        assert!(decoded.bit_eq(&original));
    }

    #[test]
    fn test_encoding_is_big_endian() {
        let e = Embedding::from_fn(|i| if i == 0 { 1.0 } else { 0.0 });
        let bytes = STANDARD.decode(encode(&e).as_str()).unwrap();
        assert_eq!(&bytes[..4], &[0x3f, 0x80, 0x00, 0x00]);
        assert_eq!(bytes.len(), ENCODED_BYTES);
    }

    #[test]
    fn test_encoded_length_is_padded() {
        let text = encode(&sample()).into_string();
        assert_eq!(text.len() % 4, 0);
        // 2048 bytes leave a remainder of 2 per 3-byte group: one pad char.
        assert!(text.ends_with('=') && !text.ends_with("=="));
    }

    #[test]
    fn test_decode_empty_is_corrupt_length() {
        let err = decode(&EncodedForm::new("")).unwrap_err();
        assert_eq!(err, CodecError::CorruptLength(0));
    }

    #[test]
    fn test_decode_non_multiple_of_four_bytes() {
        // 3 bytes
        let err = decode(&EncodedForm::new(STANDARD.encode([1u8, 2, 3]))).unwrap_err();
        assert_eq!(err, CodecError::CorruptLength(3));
    }

    #[test]
    fn test_decode_wrong_dimension() {
        let bytes = vec![0u8; 128 * BYTES_PER_COMPONENT];
        let err = decode(&EncodedForm::new(STANDARD.encode(bytes))).unwrap_err();
        assert_eq!(
            err,
            CodecError::DimensionMismatch {
                expected: EMBEDDING_DIM,
                actual: 128
            }
        );
    }

    #[test]
    fn test_decode_rejects_missing_padding() {
        let text = encode(&sample()).into_string();
        let stripped = text.trim_end_matches('=');
        assert!(matches!(
            decode(&EncodedForm::new(stripped)),
            Err(CodecError::InvalidBase64(_))
        ));
    }

    #[test]
    fn test_decode_rejects_embedded_whitespace() {
        let text = encode(&sample()).into_string();
        let wrapped = format!("{}\n{}", &text[..76], &text[76..]);
        assert!(matches!(
            decode(&EncodedForm::new(wrapped)),
            Err(CodecError::InvalidBase64(_))
        ));
    }
}
