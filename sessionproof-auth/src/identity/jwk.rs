//! JSON Web Key representation of RSA keys.
//!
//! Field names and value encodings follow what browser WebCrypto emits for
//! `exportKey('jwk', ...)`, so key files and proof tokens produced by
//! existing JavaScript clients import unchanged. Big integers are
//! big-endian, unpadded base64url.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rsa::BigUint;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// An RSA key in JWK form. Private members are present only for private keys.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    pub n: String,
    pub e: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dq: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_ops: Option<Vec<String>>,
}

impl Jwk {
    /// Key type value for RSA keys.
    pub const KTY_RSA: &'static str = "RSA";

    /// Whether any private member is present.
    #[must_use]
    pub fn is_private(&self) -> bool {
        self.d.is_some()
    }

    /// Whether `key_ops`, when present, allows `op`.
    #[must_use]
    pub fn permits(&self, op: &str) -> bool {
        self.key_ops
            .as_ref()
            .map_or(true, |ops| ops.iter().any(|o| o == op))
    }
}

impl Drop for Jwk {
    fn drop(&mut self) {
        self.d.zeroize();
        self.p.zeroize();
        self.q.zeroize();
        self.dp.zeroize();
        self.dq.zeroize();
        self.qi.zeroize();
    }
}

impl std::fmt::Debug for Jwk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Jwk")
            .field("kty", &self.kty)
            .field("alg", &self.alg)
            .field("private", &self.is_private())
            .field("key_ops", &self.key_ops)
            .finish_non_exhaustive()
    }
}

/// Encode a big integer as unpadded base64url.
pub(crate) fn encode_uint(value: &BigUint) -> String {
    URL_SAFE_NO_PAD.encode(value.to_bytes_be())
}

/// Decode an unpadded base64url big integer.
///
/// Returns `None` for invalid base64url or an empty value.
pub(crate) fn decode_uint(text: &str) -> Option<BigUint> {
    let bytes = URL_SAFE_NO_PAD.decode(text).ok()?;
    if bytes.is_empty() {
        return None;
    }
    Some(BigUint::from_bytes_be(&bytes))
}
