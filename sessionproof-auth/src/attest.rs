//! Server counter-signatures over verified proofs.
//!
//! Once a proof verifies, the server signs the entire proof text with its
//! long-lived key. Anyone holding the server's public key can later check
//! the resulting [`SignatureRecord`] offline with [`verify_attestation`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::identity::{CompactPublicKey, KeyError, KeyPair, KeyPairManager, PublicKey, Signature};
use crate::proof::VerifiedSession;

/// A counter-signed proof, as stored and served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRecord {
    pub session_id: String,
    pub user_id: String,
    /// Full proof text as submitted by the client.
    pub proof: String,
    /// base58 server signature over `proof`.
    pub signature: String,
}

/// Signs on behalf of the server using its long-lived key pair.
#[derive(Debug, Clone)]
pub struct ServerAttestor {
    manager: KeyPairManager,
    key_pair: Arc<KeyPair>,
    compact_public_key: CompactPublicKey,
    public_jwk: String,
}

impl ServerAttestor {
    /// Wrap the server key pair. Both public key forms are computed once.
    ///
    /// # Errors
    ///
    /// Returns `KeyError::ExportError` if the public key cannot be exported.
    pub fn new(manager: KeyPairManager, key_pair: Arc<KeyPair>) -> Result<Self, KeyError> {
        let compact_public_key = manager.export_public_only(&key_pair)?;
        let public_jwk = manager.export_public_jwk(&key_pair)?;
        Ok(Self {
            manager,
            key_pair,
            compact_public_key,
            public_jwk,
        })
    }

    /// Sign `payload` and return the base58 signature.
    ///
    /// # Errors
    ///
    /// Returns `KeyError::Signing` if the primitive fails.
    pub fn sign(&self, payload: &str) -> Result<String, KeyError> {
        self.manager
            .sign(&self.key_pair, payload.as_bytes())
            .map(|signature| signature.to_base58())
    }

    /// Counter-sign a verified session's full proof text.
    ///
    /// # Errors
    ///
    /// Returns `KeyError::Signing` if the primitive fails.
    pub fn attest(&self, session: &VerifiedSession) -> Result<SignatureRecord, KeyError> {
        Ok(SignatureRecord {
            session_id: session.session_id().to_string(),
            user_id: session.user_id().to_string(),
            proof: session.proof().to_string(),
            signature: self.sign(session.proof())?,
        })
    }

    /// The server public key in compact form.
    #[must_use]
    pub fn compact_public_key(&self) -> &CompactPublicKey {
        &self.compact_public_key
    }

    /// The server public key as JWK JSON.
    #[must_use]
    pub fn public_jwk(&self) -> &str {
        &self.public_jwk
    }

    /// The server verification key.
    #[must_use]
    pub fn public_key(&self) -> &PublicKey {
        self.key_pair.public_key()
    }
}

/// Check a record's counter-signature with the server's public key.
///
/// Returns `false` for a signature that is not base58 or does not verify.
#[must_use]
pub fn verify_attestation(
    manager: &KeyPairManager,
    record: &SignatureRecord,
    server_key: &PublicKey,
) -> bool {
    match Signature::from_base58(&record.signature) {
        Ok(signature) => manager.verify(server_key, record.proof.as_bytes(), &signature),
        Err(_) => false,
    }
}
