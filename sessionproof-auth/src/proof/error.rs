//! Proof rejection reasons.

/// Why a proof was rejected.
///
/// `Display` is intentionally coarse so that it can be shown to the caller
/// without revealing which stage failed. Use [`ProofError::reason`] for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ProofError {
    /// A segment is not valid base58.
    #[error("invalid proof")]
    InvalidEncoding,

    /// Wrong segment count, an empty segment, or ids that are not UTF-8.
    #[error("invalid proof")]
    MalformedProof,

    /// The user id in the proof is not the authenticated caller.
    #[error("invalid proof")]
    IdentityMismatch,

    /// The embedded public key cannot be imported for RS512 verification.
    #[error("invalid proof")]
    InvalidPublicKey,

    /// The signature does not verify over the signed payload.
    #[error("invalid signature")]
    InvalidSignature,
}

impl ProofError {
    /// Stable machine-readable tag for the rejection stage.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidEncoding => "invalid_encoding",
            Self::MalformedProof => "malformed_proof",
            Self::IdentityMismatch => "identity_mismatch",
            Self::InvalidPublicKey => "invalid_public_key",
            Self::InvalidSignature => "invalid_signature",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_generic() {
        assert_eq!(ProofError::IdentityMismatch.to_string(), "invalid proof");
        assert_eq!(ProofError::InvalidPublicKey.to_string(), "invalid proof");
        assert_eq!(ProofError::InvalidSignature.to_string(), "invalid signature");
    }

    #[test]
    fn test_reason_is_specific() {
        assert_eq!(ProofError::IdentityMismatch.reason(), "identity_mismatch");
        assert_eq!(ProofError::MalformedProof.reason(), "malformed_proof");
    }
}
