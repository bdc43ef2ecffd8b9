//! RSA key material for session proofs.
//!
//! Every key in the protocol uses a single fixed scheme:
//! RSASSA-PKCS1-v1_5 with SHA-512 over a 2048-bit modulus and public
//! exponent 65537. The parameters are constants so that exported key
//! material stays compatible across versions.
//!
//! - [`KeyPair`] - Server or client signing key; never leaves the process
//!   except through [`super::KeyPairManager::export_pair`]
//! - [`PublicKey`] - Verification-only half, safe to share
//! - [`Signature`] - Raw signature bytes
//! - [`CompactPublicKey`] - base58 of the public JWK JSON, the form embedded
//!   in proof tokens

use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::codec::{self, CodecError};

/// Modulus length of generated keys, in bits.
pub const MODULUS_BITS: usize = 2048;

/// Public exponent of generated keys.
pub const PUBLIC_EXPONENT: u32 = 65537;

/// Smallest modulus accepted when importing a peer's public key.
pub const MIN_IMPORT_MODULUS_BITS: usize = 2048;

/// Largest modulus accepted when importing a peer's public key.
pub const MAX_IMPORT_MODULUS_BITS: usize = 4096;

/// JWK `alg` value for RSASSA-PKCS1-v1_5 with SHA-512.
pub const JWK_ALGORITHM: &str = "RS512";

/// Errors that can occur during key operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum KeyError {
    /// Key generation failed in the underlying primitive.
    #[error("key generation failed")]
    Generation,

    /// Signing failed in the underlying primitive.
    #[error("signing failed")]
    Signing,

    /// The key could not be serialized.
    #[error("key export failed: {0}")]
    ExportError(&'static str),

    /// The stored key pair is not valid JSON or is missing a key.
    #[error("malformed key file")]
    MalformedKeyFile,

    /// The public key text is not a decodable JWK.
    #[error("invalid public key")]
    InvalidPublicKey,

    /// The JWK does not describe a key usable with RS512.
    #[error("unsupported key")]
    UnsupportedKey,
}

/// A signing key pair.
///
/// # Security
///
/// - The private half is zeroized on drop by the `rsa` crate
/// - The `Debug` implementation only prints the public modulus size
#[derive(Clone)]
pub struct KeyPair {
    private: RsaPrivateKey,
    public: PublicKey,
}

impl KeyPair {
    pub(crate) fn from_private(private: RsaPrivateKey) -> Self {
        let public = PublicKey(private.to_public_key());
        Self { private, public }
    }

    pub(crate) fn private(&self) -> &RsaPrivateKey {
        &self.private
    }

    /// The verification half of this pair.
    #[must_use]
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// A verification-only RSA public key.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(RsaPublicKey);

impl PublicKey {
    pub(crate) fn new(inner: RsaPublicKey) -> Self {
        Self(inner)
    }

    pub(crate) fn inner(&self) -> &RsaPublicKey {
        &self.0
    }

    /// Size of the modulus in bits.
    #[must_use]
    pub fn modulus_bits(&self) -> usize {
        self.0.n().bits()
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({}, {} bits)", JWK_ALGORITHM, self.modulus_bits())
    }
}

/// Raw signature bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Signature(Vec<u8>);

impl Signature {
    /// Wrap raw signature bytes.
    ///
    /// Length is not checked here; a signature of the wrong size simply
    /// fails verification.
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Decode a base58 signature.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::InvalidEncoding` if `text` is not base58.
    pub fn from_base58(text: &str) -> Result<Self, CodecError> {
        codec::decode(text).map(Self)
    }

    /// The raw signature bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Encode as base58 text.
    #[must_use]
    pub fn to_base58(&self) -> String {
        codec::encode(&self.0)
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show only the first few bytes
        let shown: String = self.0.iter().take(4).map(|b| format!("{:02x}", b)).collect();
        write!(f, "Signature({}..., {} bytes)", shown, self.0.len())
    }
}

/// A public key in its compact, publishable form: base58 of the JWK JSON.
///
/// This is the form embedded as the fourth proof-token segment and served
/// by the server's key endpoint. Construction does not validate; import
/// through [`super::KeyPairManager::import_public_only`] to get a usable key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompactPublicKey(String);

impl CompactPublicKey {
    /// Wrap compact key text received from a peer.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// The compact key text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the compact key text.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for CompactPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CompactPublicKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
