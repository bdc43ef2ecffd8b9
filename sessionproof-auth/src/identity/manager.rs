//! Key-pair lifecycle: generation, the two export forms and their imports.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::codec;

use super::jwk::Jwk;
use super::keys::{CompactPublicKey, KeyError, KeyPair, PublicKey, Signature};
use super::provider::{CryptoProvider, RsaProvider};

/// On-disk key file layout: `{"privateKey": JWK, "publicKey": JWK}`.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyFile {
    private_key: Jwk,
    public_key: Jwk,
}

/// Entry point for every key operation in the protocol.
///
/// Cheap to clone; clones share the same provider.
#[derive(Clone)]
pub struct KeyPairManager {
    provider: Arc<dyn CryptoProvider>,
}

impl Default for KeyPairManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for KeyPairManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPairManager").finish_non_exhaustive()
    }
}

impl KeyPairManager {
    /// Manager backed by the production RSA provider.
    #[must_use]
    pub fn new() -> Self {
        Self::with_provider(RsaProvider)
    }

    /// Manager backed by a custom provider.
    #[must_use]
    pub fn with_provider(provider: impl CryptoProvider + 'static) -> Self {
        Self {
            provider: Arc::new(provider),
        }
    }

    /// Generate a fresh key pair.
    ///
    /// # Errors
    ///
    /// Returns `KeyError::Generation` if the primitive fails.
    pub fn generate(&self) -> Result<KeyPair, KeyError> {
        self.provider.generate()
    }

    /// Serialize both halves as pretty-printed key-file JSON.
    ///
    /// The result contains private key material.
    ///
    /// # Errors
    ///
    /// Returns `KeyError::ExportError` if either half cannot be serialized.
    pub fn export_pair(&self, key_pair: &KeyPair) -> Result<String, KeyError> {
        let file = KeyFile {
            private_key: self.provider.export_private(key_pair)?,
            public_key: self.provider.export_public(key_pair.public_key())?,
        };
        serde_json::to_string_pretty(&file)
            .map_err(|_| KeyError::ExportError("key file serialization failed"))
    }

    /// Restore a key pair from key-file JSON.
    ///
    /// # Errors
    ///
    /// Returns `KeyError::MalformedKeyFile` if the text is not valid JSON,
    /// either key is missing or unusable, or the two halves do not belong
    /// to the same pair.
    pub fn import_pair(&self, text: &str) -> Result<KeyPair, KeyError> {
        let file: KeyFile =
            serde_json::from_str(text).map_err(|_| KeyError::MalformedKeyFile)?;

        let key_pair = self
            .provider
            .import_private(&file.private_key)
            .map_err(|_| KeyError::MalformedKeyFile)?;
        let public_key = self
            .provider
            .import_public(&file.public_key)
            .map_err(|_| KeyError::MalformedKeyFile)?;

        if &public_key != key_pair.public_key() {
            return Err(KeyError::MalformedKeyFile);
        }
        Ok(key_pair)
    }

    /// Export the public half in compact form (base58 of the JWK JSON).
    ///
    /// # Errors
    ///
    /// Returns `KeyError::ExportError` if the JWK cannot be serialized.
    pub fn export_public_only(&self, key_pair: &KeyPair) -> Result<CompactPublicKey, KeyError> {
        let json = self.export_public_jwk(key_pair)?;
        Ok(CompactPublicKey::new(codec::encode(json)))
    }

    /// Export the public half as JWK JSON.
    ///
    /// # Errors
    ///
    /// Returns `KeyError::ExportError` if the JWK cannot be serialized.
    pub fn export_public_jwk(&self, key_pair: &KeyPair) -> Result<String, KeyError> {
        let jwk = self.provider.export_public(key_pair.public_key())?;
        serde_json::to_string(&jwk).map_err(|_| KeyError::ExportError("jwk serialization failed"))
    }

    /// Import a compact public key received from a peer.
    ///
    /// # Errors
    ///
    /// - `KeyError::InvalidPublicKey` if the text is not base58, the bytes
    ///   are not UTF-8, or the JSON is not a JWK
    /// - `KeyError::UnsupportedKey` if the JWK is not usable with RS512
    pub fn import_public_only(&self, compact: &str) -> Result<PublicKey, KeyError> {
        let bytes = codec::decode(compact).map_err(|_| KeyError::InvalidPublicKey)?;
        let json = String::from_utf8(bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        self.import_public_jwk(&json)
    }

    /// Import a public key from JWK JSON.
    ///
    /// # Errors
    ///
    /// Same as [`Self::import_public_only`], minus the base58 step.
    pub fn import_public_jwk(&self, json: &str) -> Result<PublicKey, KeyError> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|_| KeyError::InvalidPublicKey)?;

        // Non-RSA keys lack `n`/`e`, so classify by kty before the typed parse
        match value.get("kty").and_then(serde_json::Value::as_str) {
            Some(Jwk::KTY_RSA) => {}
            Some(_) => return Err(KeyError::UnsupportedKey),
            None => return Err(KeyError::InvalidPublicKey),
        }

        let jwk: Jwk = serde_json::from_value(value).map_err(|_| KeyError::InvalidPublicKey)?;
        self.provider.import_public(&jwk)
    }

    /// Sign `message` with the private half of `key_pair`.
    ///
    /// # Errors
    ///
    /// Returns `KeyError::Signing` if the primitive fails.
    pub fn sign(&self, key_pair: &KeyPair, message: &[u8]) -> Result<Signature, KeyError> {
        self.provider.sign(key_pair, message)
    }

    /// Check `signature` over `message`. Never errors; any failure is `false`.
    #[must_use]
    pub fn verify(&self, public_key: &PublicKey, message: &[u8], signature: &Signature) -> bool {
        self.provider.verify(public_key, message, signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::PooledProvider;

    fn manager() -> KeyPairManager {
        KeyPairManager::with_provider(PooledProvider)
    }

    #[test]
    fn test_export_import_pair() {
        let manager = manager();
        let key_pair = manager.generate().unwrap();
        let text = manager.export_pair(&key_pair).unwrap();

        assert!(text.contains("\"privateKey\""));
        assert!(text.contains("\"publicKey\""));
        // Pretty-printed
        assert!(text.contains('\n'));

        let restored = manager.import_pair(&text).unwrap();
        assert_eq!(restored.public_key(), key_pair.public_key());

        let signature = manager.sign(&restored, b"payload").unwrap();
        assert!(manager.verify(key_pair.public_key(), b"payload", &signature));
    }

    #[test]
    fn test_import_pair_rejects_garbage() {
        let manager = manager();
        for text in ["", "not json", "{}", r#"{"privateKey": {}}"#, "[1,2,3]"] {
            assert_eq!(
                manager.import_pair(text).err(),
                Some(KeyError::MalformedKeyFile),
                "{:?}",
                text
            );
        }
    }

    #[test]
    fn test_import_pair_rejects_mismatched_halves() {
        let manager = manager();
        let key1 = manager.generate().unwrap();
        let key2 = PooledProvider.generate_other(key1.public_key()).unwrap();

        let mut file: serde_json::Value =
            serde_json::from_str(&manager.export_pair(&key1).unwrap()).unwrap();
        let other: serde_json::Value =
            serde_json::from_str(&manager.export_pair(&key2).unwrap()).unwrap();
        file["publicKey"] = other["publicKey"].clone();

        assert_eq!(
            manager.import_pair(&file.to_string()).err(),
            Some(KeyError::MalformedKeyFile)
        );
    }

    #[test]
    fn test_compact_public_key_roundtrip() {
        let manager = manager();
        let key_pair = manager.generate().unwrap();
        let compact = manager.export_public_only(&key_pair).unwrap();

        // Decodes to the public JWK JSON
        let json = String::from_utf8(codec::decode(compact.as_str()).unwrap()).unwrap();
        assert_eq!(json, manager.export_public_jwk(&key_pair).unwrap());
        assert!(!json.contains("\"d\""));

        let imported = manager.import_public_only(compact.as_str()).unwrap();
        assert_eq!(&imported, key_pair.public_key());
    }

    #[test]
    fn test_import_public_only_invalid() {
        let manager = manager();
        // Not base58
        assert_eq!(manager.import_public_only("0OIl"), Err(KeyError::InvalidPublicKey));
        // base58 of non-UTF-8 bytes
        let not_utf8 = codec::encode([0xffu8, 0xfe, 0xfd]);
        assert_eq!(manager.import_public_only(&not_utf8), Err(KeyError::InvalidPublicKey));
        // base58 of non-JSON text
        let not_json = codec::encode("hello");
        assert_eq!(manager.import_public_only(&not_json), Err(KeyError::InvalidPublicKey));
        // JSON without kty
        let no_kty = codec::encode(r#"{"n":"AQAB","e":"AQAB"}"#);
        assert_eq!(manager.import_public_only(&no_kty), Err(KeyError::InvalidPublicKey));
    }

    #[test]
    fn test_import_public_jwk_unsupported() {
        let manager = manager();
        let ec = r#"{"kty":"EC","crv":"P-256","x":"AA","y":"AA"}"#;
        assert_eq!(manager.import_public_jwk(ec), Err(KeyError::UnsupportedKey));

        let key_pair = manager.generate().unwrap();
        let json = manager.export_public_jwk(&key_pair).unwrap();
        let rs256 = json.replace("RS512", "RS256");
        assert_eq!(manager.import_public_jwk(&rs256), Err(KeyError::UnsupportedKey));
    }

    #[test]
    fn test_debug_does_not_leak() {
        let manager = manager();
        let key_pair = manager.generate().unwrap();
        let debug = format!("{:?}", key_pair);
        assert!(debug.contains("2048 bits"));
        assert!(!debug.contains("private"));
    }
}
