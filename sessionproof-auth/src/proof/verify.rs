//! Proof verification.
//!
//! Stages run in a fixed order and stop at the first failure:
//!
//! 1. Parse: four base58 segments, UTF-8 ids
//! 2. Identity: the proof's user id is the authenticated caller
//! 3. Public key: the embedded JWK imports as an RS512 verification key
//! 4. Signature: the key verifies the signature over the signed payload
//!
//! The embedded key is self-asserted. A valid proof shows that whoever holds
//! the matching private key claimed this session for this user; binding the
//! user is the caller's authentication, not the key.

use subtle::ConstantTimeEq;

use crate::identity::KeyPairManager;

use super::error::ProofError;
use super::token::ProofToken;

/// Result of successful proof verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedSession {
    user_id: String,
    session_id: String,
    proof: String,
}

impl VerifiedSession {
    /// Create a verified session.
    ///
    /// # Visibility
    ///
    /// Crate-private so that a `VerifiedSession` only comes out of
    /// [`ProofVerifier::verify`], which performs the signature check.
    #[must_use]
    pub(crate) fn new(user_id: String, session_id: String, proof: String) -> Self {
        Self {
            user_id,
            session_id,
            proof,
        }
    }

    /// The verified user id.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The verified session id.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The original proof text.
    #[must_use]
    pub fn proof(&self) -> &str {
        &self.proof
    }
}

/// Verifies client proofs against the authenticated caller.
///
/// Stateless and side-effect free; the same input always yields the same
/// result.
#[derive(Debug, Clone, Default)]
pub struct ProofVerifier {
    manager: KeyPairManager,
}

impl ProofVerifier {
    /// Verifier using `manager` for key import and signature checks.
    #[must_use]
    pub fn new(manager: KeyPairManager) -> Self {
        Self { manager }
    }

    /// Verify `proof` for the caller identified as `authenticated_user_id`.
    ///
    /// # Errors
    ///
    /// Returns the [`ProofError`] of the first stage that fails. Every
    /// parse failure, bad base58 included, is `MalformedProof`.
    #[must_use = "verification result must be checked"]
    pub fn verify(
        &self,
        proof: &str,
        authenticated_user_id: &str,
    ) -> Result<VerifiedSession, ProofError> {
        let token = ProofToken::parse(proof).map_err(|_| ProofError::MalformedProof)?;
        let user_id =
            std::str::from_utf8(token.user_id()).map_err(|_| ProofError::MalformedProof)?;
        let session_id =
            std::str::from_utf8(token.session_id()).map_err(|_| ProofError::MalformedProof)?;

        if !bool::from(user_id.as_bytes().ct_eq(authenticated_user_id.as_bytes())) {
            return Err(ProofError::IdentityMismatch);
        }

        let public_key = self
            .manager
            .import_public_only(token.public_key_segment())
            .map_err(|_| ProofError::InvalidPublicKey)?;

        if !self.manager.verify(
            &public_key,
            token.signed_payload().as_bytes(),
            token.signature(),
        ) {
            return Err(ProofError::InvalidSignature);
        }

        Ok(VerifiedSession::new(
            user_id.to_string(),
            session_id.to_string(),
            token.as_str().to_string(),
        ))
    }
}
