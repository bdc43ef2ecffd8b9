//! Pure session-proof library.
//!
//! This crate is intentionally IO-free:
//! - No filesystem operations
//! - No network calls
//! - No database interactions
//! - No logging
//!
//! Cryptography is injected via [`identity::CryptoProvider`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sessionproof_auth::{KeyPairManager, ProofToken, ProofVerifier, ServerAttestor};
//!
//! let manager = KeyPairManager::new();
//!
//! // Client mints a proof for its session
//! let client_key = manager.generate()?;
//! let proof = ProofToken::mint(&manager, &client_key, "u1", "s1")?;
//!
//! // Server verifies it for the logged-in user and counter-signs
//! let server_key = Arc::new(manager.generate()?);
//! let attestor = ServerAttestor::new(manager.clone(), server_key)?;
//! let session = ProofVerifier::new(manager).verify(&proof, "u1")?;
//! let record = attestor.attest(&session)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod attest;
pub mod codec;
pub mod identity;
pub mod proof;

pub use attest::{verify_attestation, ServerAttestor, SignatureRecord};
pub use codec::CodecError;
pub use identity::{
    CompactPublicKey, CryptoProvider, Jwk, KeyError, KeyPair, KeyPairManager, PublicKey,
    RsaProvider, Signature,
};
pub use proof::{ProofError, ProofToken, ProofVerifier, VerifiedSession, MAX_PROOF_LEN};
