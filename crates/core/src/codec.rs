//! Canonical binary encoding.
//!
//! Everything that is hashed or sent to a peer goes through bincode's default
//! options: little-endian fixed-width integers, `u64` length prefixes, struct
//! fields in declaration order and a one-byte tag for `Option`. The layout
//! does not depend on the platform, so two nodes hashing the same logical
//! value always get the same digest.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Errors that can occur while encoding or decoding wire payloads.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("encoding failed: {0}")]
    Encode(#[source] bincode::Error),

    #[error("decoding failed: {0}")]
    Decode(#[source] bincode::Error),
}

pub type Result<T> = std::result::Result<T, CodecError>;

/// Encode a value into its canonical byte form.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(CodecError::Encode)
}

/// Decode a value from its canonical byte form.
///
/// Stored hashes are taken as-is and never recomputed, so a payload that was
/// altered in transit still decodes and is caught by the `is_valid` checks.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(CodecError::Decode)
}

/// Canonical bytes of a value that is about to be hashed.
///
/// # Panics
///
/// Panics if `T`'s `Serialize` impl emits a sequence of unknown length,
/// which none of the ledger types do.
pub(crate) fn canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Vec<u8> {
    bincode::serialize(value).expect("serialization should not fail")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_layout_is_little_endian() {
        let bytes = encode(&0x0102_0304_0506_0708u64).unwrap();
        assert_eq!(bytes, vec![8, 7, 6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_string_is_length_prefixed() {
        let bytes = encode("ab").unwrap();
        assert_eq!(bytes, vec![2, 0, 0, 0, 0, 0, 0, 0, b'a', b'b']);
    }

    #[test]
    fn test_option_tag() {
        assert_eq!(encode(&None::<u8>).unwrap(), vec![0]);
        assert_eq!(encode(&Some(7u8)).unwrap(), vec![1, 7]);
    }

    #[test]
    fn test_decode_truncated_payload_fails() {
        let bytes = encode(&(1u64, 2u64)).unwrap();
        let result: Result<(u64, u64)> = decode(&bytes[..10]);
        assert!(matches!(result, Err(CodecError::Decode(_))));
    }

    #[test]
    fn test_canonical_bytes_matches_encode() {
        let value = ("sealchain", 42u64, [1u8; 4]);
        assert_eq!(canonical_bytes(&value), encode(&value).unwrap());
    }
}
