//! Base58 text encoding used by every proof-token field.
//!
//! Uses the Bitcoin alphabet. Leading zero bytes are carried as leading `1`
//! characters, so `decode(encode(b)) == b` for every byte sequence,
//! including the empty one.

/// Errors produced while decoding base58 text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum CodecError {
    /// The input contains a character outside the base58 alphabet.
    #[error("invalid base58 encoding")]
    InvalidEncoding,
}

/// Encode raw bytes as base58 text.
#[must_use]
pub fn encode(bytes: impl AsRef<[u8]>) -> String {
    bs58::encode(bytes).into_string()
}

/// Decode base58 text into raw bytes.
///
/// # Errors
///
/// Returns [`CodecError::InvalidEncoding`] if `text` contains a character
/// outside the base58 alphabet.
pub fn decode(text: &str) -> Result<Vec<u8>, CodecError> {
    bs58::decode(text)
        .into_vec()
        .map_err(|_| CodecError::InvalidEncoding)
}
