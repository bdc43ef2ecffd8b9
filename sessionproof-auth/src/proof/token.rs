//! Proof token wire format.
//!
//! A proof is four base58 segments joined by `.`:
//!
//! ```text
//! b58(user_id) . b58(session_id) . b58(signature) . b58(public_jwk_json)
//! ```
//!
//! The signature covers the first two segments exactly as they appear in
//! the token, including the separating dot.

use crate::codec;
use crate::identity::{KeyError, KeyPair, KeyPairManager, Signature};

use super::ProofError;

/// Segment separator.
pub const SEPARATOR: &str = ".";

/// Number of segments in a well-formed proof.
const SEGMENT_COUNT: usize = 4;

/// Longest proof text accepted, in bytes.
///
/// A proof for a 4096-bit key is under 3 KiB.
pub const MAX_PROOF_LEN: usize = 16 * 1024;

/// A structurally valid proof token.
///
/// Parsing checks shape and encoding only. Nothing here says the signature
/// or the public key is any good; that is the verifier's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofToken {
    text: String,
    payload_len: usize,
    key_offset: usize,
    user_id: Vec<u8>,
    session_id: Vec<u8>,
    signature: Signature,
    public_key: Vec<u8>,
}

impl ProofToken {
    /// Parse proof text.
    ///
    /// # Errors
    ///
    /// - `ProofError::MalformedProof` if `text` is longer than
    ///   [`MAX_PROOF_LEN`] or does not have exactly four non-empty segments
    /// - `ProofError::InvalidEncoding` if any segment is not base58
    pub fn parse(text: &str) -> Result<Self, ProofError> {
        if text.len() > MAX_PROOF_LEN {
            return Err(ProofError::MalformedProof);
        }

        let segments: Vec<&str> = text.split(SEPARATOR).collect();
        if segments.len() != SEGMENT_COUNT || segments.iter().any(|s| s.is_empty()) {
            return Err(ProofError::MalformedProof);
        }

        let decode = |segment: &str| codec::decode(segment).map_err(|_| ProofError::InvalidEncoding);
        let user_id = decode(segments[0])?;
        let session_id = decode(segments[1])?;
        let signature = Signature::from_bytes(decode(segments[2])?);
        let public_key = decode(segments[3])?;

        Ok(Self {
            text: text.to_string(),
            payload_len: segments[0].len() + 1 + segments[1].len(),
            key_offset: text.len() - segments[3].len(),
            user_id,
            session_id,
            signature,
            public_key,
        })
    }

    /// The bytes the client signed: the first two segments, dot-joined.
    #[must_use]
    pub fn signed_payload(&self) -> &str {
        &self.text[..self.payload_len]
    }

    /// Encode the four fields and join them into proof text.
    #[must_use]
    pub fn serialize(
        user_id: impl AsRef<[u8]>,
        session_id: impl AsRef<[u8]>,
        signature: &Signature,
        public_key_json: impl AsRef<[u8]>,
    ) -> String {
        [
            codec::encode(user_id),
            codec::encode(session_id),
            signature.to_base58(),
            codec::encode(public_key_json),
        ]
        .join(SEPARATOR)
    }

    /// Build a proof for `user_id`/`session_id` signed by `client_key`.
    ///
    /// The client's public JWK is embedded so the server can verify
    /// without prior registration.
    ///
    /// # Errors
    ///
    /// Returns a `KeyError` if signing or public key export fails.
    pub fn mint(
        manager: &KeyPairManager,
        client_key: &KeyPair,
        user_id: &str,
        session_id: &str,
    ) -> Result<String, KeyError> {
        let payload = format!("{}{SEPARATOR}{}", codec::encode(user_id), codec::encode(session_id));
        let signature = manager.sign(client_key, payload.as_bytes())?;
        let public_key_json = manager.export_public_jwk(client_key)?;
        Ok(Self::serialize(user_id, session_id, &signature, public_key_json))
    }

    /// The full proof text as received.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Decoded user id bytes.
    #[must_use]
    pub fn user_id(&self) -> &[u8] {
        &self.user_id
    }

    /// Decoded session id bytes.
    #[must_use]
    pub fn session_id(&self) -> &[u8] {
        &self.session_id
    }

    /// Decoded client signature.
    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Decoded public key bytes (JWK JSON, uninterpreted).
    #[must_use]
    pub fn public_key_bytes(&self) -> &[u8] {
        &self.public_key
    }

    /// The still-encoded public key segment, the compact key form.
    #[must_use]
    pub fn public_key_segment(&self) -> &str {
        &self.text[self.key_offset..]
    }
}
