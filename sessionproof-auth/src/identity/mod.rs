//! RSA key identities for session proofs.
//!
//! - [`KeyPairManager`] - Generate, export, import, sign and verify
//! - [`KeyPair`] - Signing key; `Debug` never prints private material
//! - [`PublicKey`] - Verification key imported from a peer
//! - [`CompactPublicKey`] - base58 of the public JWK JSON
//! - [`Jwk`] - WebCrypto-compatible JSON Web Key
//! - [`CryptoProvider`] - Backend seam; [`RsaProvider`] in production
//!
//! # Example
//!
//! ```no_run
//! use sessionproof_auth::identity::KeyPairManager;
//!
//! let manager = KeyPairManager::new();
//! let key_pair = manager.generate()?;
//!
//! // Publish the compact form; peers import it to verify
//! let compact = manager.export_public_only(&key_pair)?;
//! let public_key = manager.import_public_only(compact.as_str())?;
//!
//! let signature = manager.sign(&key_pair, b"message")?;
//! assert!(manager.verify(&public_key, b"message", &signature));
//! # Ok::<(), sessionproof_auth::identity::KeyError>(())
//! ```

mod jwk;
mod keys;
mod manager;
mod provider;

pub use jwk::Jwk;
pub use keys::{
    CompactPublicKey, KeyError, KeyPair, PublicKey, Signature, JWK_ALGORITHM,
    MAX_IMPORT_MODULUS_BITS, MIN_IMPORT_MODULUS_BITS, MODULUS_BITS, PUBLIC_EXPONENT,
};
pub use manager::KeyPairManager;
pub use provider::{CryptoProvider, RsaProvider};

#[cfg(any(test, feature = "test-util"))]
pub use provider::PooledProvider;
