//! Pluggable cryptographic backend.
//!
//! [`CryptoProvider`] is the capability seam between the protocol and the
//! cryptographic library. [`RsaProvider`] is the only production
//! implementation. Substitutes (such as the pooled provider behind the
//! `test-util` feature) must keep the exact algorithm and encoding contract:
//! RS512 signatures and WebCrypto-compatible JWKs.

use rand::rngs::OsRng;
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha512};

use super::jwk::{decode_uint, encode_uint, Jwk};
use super::keys::{
    KeyError, KeyPair, PublicKey, Signature, JWK_ALGORITHM, MAX_IMPORT_MODULUS_BITS,
    MIN_IMPORT_MODULUS_BITS, MODULUS_BITS, PUBLIC_EXPONENT,
};

/// Cryptographic operations the protocol needs.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; a single provider is shared by
/// every concurrent verification and signing call.
pub trait CryptoProvider: Send + Sync {
    /// Generate a fresh key pair under the fixed algorithm parameters.
    fn generate(&self) -> Result<KeyPair, KeyError>;

    /// Sign `message` with the private half of `key_pair`.
    fn sign(&self, key_pair: &KeyPair, message: &[u8]) -> Result<Signature, KeyError>;

    /// Verify `signature` over `message`. Any failure is reported as `false`.
    fn verify(&self, public_key: &PublicKey, message: &[u8], signature: &Signature) -> bool;

    /// Export the private half as a JWK.
    fn export_private(&self, key_pair: &KeyPair) -> Result<Jwk, KeyError>;

    /// Export the public half as a JWK.
    fn export_public(&self, public_key: &PublicKey) -> Result<Jwk, KeyError>;

    /// Import a private JWK as a key pair.
    fn import_private(&self, jwk: &Jwk) -> Result<KeyPair, KeyError>;

    /// Import a public JWK for verification.
    fn import_public(&self, jwk: &Jwk) -> Result<PublicKey, KeyError>;
}

/// RSASSA-PKCS1-v1_5 / SHA-512 provider backed by the RustCrypto `rsa` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct RsaProvider;

impl RsaProvider {
    fn padding() -> Pkcs1v15Sign {
        Pkcs1v15Sign::new::<Sha512>()
    }
}

impl CryptoProvider for RsaProvider {
    fn generate(&self) -> Result<KeyPair, KeyError> {
        let exponent = BigUint::from(PUBLIC_EXPONENT);
        let private = RsaPrivateKey::new_with_exp(&mut OsRng, MODULUS_BITS, &exponent)
            .map_err(|_| KeyError::Generation)?;
        Ok(KeyPair::from_private(private))
    }

    fn sign(&self, key_pair: &KeyPair, message: &[u8]) -> Result<Signature, KeyError> {
        let digest = Sha512::digest(message);
        key_pair
            .private()
            .sign_with_rng(&mut OsRng, Self::padding(), &digest)
            .map(Signature::from_bytes)
            .map_err(|_| KeyError::Signing)
    }

    fn verify(&self, public_key: &PublicKey, message: &[u8], signature: &Signature) -> bool {
        let digest = Sha512::digest(message);
        public_key
            .inner()
            .verify(Self::padding(), &digest, signature.as_bytes())
            .is_ok()
    }

    fn export_private(&self, key_pair: &KeyPair) -> Result<Jwk, KeyError> {
        let private = key_pair.private();
        let (p, q) = match private.primes() {
            [p, q] => (p, q),
            _ => return Err(KeyError::ExportError("multi-prime RSA keys are not supported")),
        };
        let one = BigUint::from(1u32);
        let two = BigUint::from(2u32);
        let d = private.d();

        // CRT members are derived rather than read back so the JWK is
        // complete regardless of how the key was constructed. p is prime, so
        // q^(p-2) mod p is the inverse of q.
        let dp = d % (p - &one);
        let dq = d % (q - &one);
        let qi = q.modpow(&(p - &two), p);

        Ok(Jwk {
            kty: Jwk::KTY_RSA.to_string(),
            alg: Some(JWK_ALGORITHM.to_string()),
            n: encode_uint(private.n()),
            e: encode_uint(private.e()),
            d: Some(encode_uint(d)),
            p: Some(encode_uint(p)),
            q: Some(encode_uint(q)),
            dp: Some(encode_uint(&dp)),
            dq: Some(encode_uint(&dq)),
            qi: Some(encode_uint(&qi)),
            ext: Some(true),
            key_ops: Some(vec!["sign".to_string()]),
        })
    }

    fn export_public(&self, public_key: &PublicKey) -> Result<Jwk, KeyError> {
        let inner = public_key.inner();
        Ok(Jwk {
            kty: Jwk::KTY_RSA.to_string(),
            alg: Some(JWK_ALGORITHM.to_string()),
            n: encode_uint(inner.n()),
            e: encode_uint(inner.e()),
            d: None,
            p: None,
            q: None,
            dp: None,
            dq: None,
            qi: None,
            ext: Some(true),
            key_ops: Some(vec!["verify".to_string()]),
        })
    }

    fn import_private(&self, jwk: &Jwk) -> Result<KeyPair, KeyError> {
        if jwk.kty != Jwk::KTY_RSA {
            return Err(KeyError::UnsupportedKey);
        }
        if jwk.alg.as_deref().is_some_and(|alg| alg != JWK_ALGORITHM) {
            return Err(KeyError::UnsupportedKey);
        }
        if !jwk.permits("sign") {
            return Err(KeyError::UnsupportedKey);
        }

        let member = |value: Option<&String>| {
            value
                .and_then(|v| decode_uint(v))
                .ok_or(KeyError::MalformedKeyFile)
        };
        let n = member(Some(&jwk.n))?;
        let e = member(Some(&jwk.e))?;
        let d = member(jwk.d.as_ref())?;
        let p = member(jwk.p.as_ref())?;
        let q = member(jwk.q.as_ref())?;

        let private = RsaPrivateKey::from_components(n, e, d, vec![p, q])
            .map_err(|_| KeyError::MalformedKeyFile)?;
        private.validate().map_err(|_| KeyError::MalformedKeyFile)?;

        Ok(KeyPair::from_private(private))
    }

    fn import_public(&self, jwk: &Jwk) -> Result<PublicKey, KeyError> {
        if jwk.kty != Jwk::KTY_RSA {
            return Err(KeyError::UnsupportedKey);
        }
        if jwk.alg.as_deref().is_some_and(|alg| alg != JWK_ALGORITHM) {
            return Err(KeyError::UnsupportedKey);
        }
        if !jwk.permits("verify") {
            return Err(KeyError::UnsupportedKey);
        }

        let n = decode_uint(&jwk.n).ok_or(KeyError::InvalidPublicKey)?;
        let e = decode_uint(&jwk.e).ok_or(KeyError::InvalidPublicKey)?;

        let bits = n.bits();
        if !(MIN_IMPORT_MODULUS_BITS..=MAX_IMPORT_MODULUS_BITS).contains(&bits) {
            return Err(KeyError::UnsupportedKey);
        }

        let inner = RsaPublicKey::new(n, e).map_err(|_| KeyError::UnsupportedKey)?;
        Ok(PublicKey::new(inner))
    }
}

/// Provider that hands out pre-generated key pairs instead of generating.
///
/// Every other operation delegates to [`RsaProvider`], so signatures and
/// JWKs are byte-compatible with production. Keys are generated once per
/// process and handed out round-robin. Concurrent callers share the pool,
/// so use [`PooledProvider::generate_other`] when a test needs two
/// different pairs.
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Default, Clone, Copy)]
pub struct PooledProvider;

#[cfg(any(test, feature = "test-util"))]
impl PooledProvider {
    /// Hand out a pooled pair whose public key differs from `other`.
    pub fn generate_other(&self, other: &PublicKey) -> Result<KeyPair, KeyError> {
        loop {
            let candidate = pool::next()?;
            if candidate.public_key() != other {
                return Ok(candidate);
            }
        }
    }
}

#[cfg(any(test, feature = "test-util"))]
mod pool {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::OnceLock;

    use super::{CryptoProvider, KeyError, KeyPair, RsaProvider};

    const POOL_SIZE: usize = 4;

    static POOL: OnceLock<Vec<KeyPair>> = OnceLock::new();
    static NEXT: AtomicUsize = AtomicUsize::new(0);

    pub(super) fn next() -> Result<KeyPair, KeyError> {
        let pool = match POOL.get() {
            Some(pool) => pool,
            None => {
                let generated = (0..POOL_SIZE)
                    .map(|_| RsaProvider.generate())
                    .collect::<Result<Vec<_>, _>>()?;
                POOL.get_or_init(|| generated)
            }
        };
        let index = NEXT.fetch_add(1, Ordering::Relaxed) % pool.len();
        Ok(pool[index].clone())
    }
}

#[cfg(any(test, feature = "test-util"))]
impl CryptoProvider for PooledProvider {
    fn generate(&self) -> Result<KeyPair, KeyError> {
        pool::next()
    }

    fn sign(&self, key_pair: &KeyPair, message: &[u8]) -> Result<Signature, KeyError> {
        RsaProvider.sign(key_pair, message)
    }

    fn verify(&self, public_key: &PublicKey, message: &[u8], signature: &Signature) -> bool {
        RsaProvider.verify(public_key, message, signature)
    }

    fn export_private(&self, key_pair: &KeyPair) -> Result<Jwk, KeyError> {
        RsaProvider.export_private(key_pair)
    }

    fn export_public(&self, public_key: &PublicKey) -> Result<Jwk, KeyError> {
        RsaProvider.export_public(public_key)
    }

    fn import_private(&self, jwk: &Jwk) -> Result<KeyPair, KeyError> {
        RsaProvider.import_private(jwk)
    }

    fn import_public(&self, jwk: &Jwk) -> Result<PublicKey, KeyError> {
        RsaProvider.import_public(jwk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_uses_fixed_parameters() {
        let key_pair = PooledProvider.generate().unwrap();
        assert_eq!(key_pair.public_key().modulus_bits(), MODULUS_BITS);
        assert_eq!(
            key_pair.public_key().inner().e(),
            &BigUint::from(PUBLIC_EXPONENT)
        );
    }

    #[test]
    fn test_sign_verify() {
        let key_pair = PooledProvider.generate().unwrap();
        let message = b"test message";
        let signature = RsaProvider.sign(&key_pair, message).unwrap();

        // PKCS#1 v1.5 signatures are exactly the modulus length
        assert_eq!(signature.as_bytes().len(), MODULUS_BITS / 8);
        assert!(RsaProvider.verify(key_pair.public_key(), message, &signature));
        assert!(!RsaProvider.verify(key_pair.public_key(), b"other message", &signature));
    }

    #[test]
    fn test_signature_wrong_key_rejected() {
        let key1 = PooledProvider.generate().unwrap();
        let key2 = PooledProvider.generate_other(key1.public_key()).unwrap();

        let signature = RsaProvider.sign(&key1, b"message").unwrap();
        assert!(!RsaProvider.verify(key2.public_key(), b"message", &signature));
    }

    #[test]
    fn test_verify_rejects_truncated_signature() {
        let key_pair = PooledProvider.generate().unwrap();
        let signature = RsaProvider.sign(&key_pair, b"message").unwrap();
        let truncated = Signature::from_bytes(&signature.as_bytes()[..100]);
        assert!(!RsaProvider.verify(key_pair.public_key(), b"message", &truncated));
        assert!(!RsaProvider.verify(key_pair.public_key(), b"message", &Signature::from_bytes(vec![])));
    }

    #[test]
    fn test_private_jwk_roundtrip() {
        let key_pair = PooledProvider.generate().unwrap();
        let jwk = RsaProvider.export_private(&key_pair).unwrap();
        assert!(jwk.is_private());
        assert_eq!(jwk.e, "AQAB");
        assert_eq!(jwk.alg.as_deref(), Some("RS512"));

        let restored = RsaProvider.import_private(&jwk).unwrap();
        assert_eq!(restored.public_key(), key_pair.public_key());

        // The restored key signs for the original public key
        let signature = RsaProvider.sign(&restored, b"roundtrip").unwrap();
        assert!(RsaProvider.verify(key_pair.public_key(), b"roundtrip", &signature));
    }

    #[test]
    fn test_private_jwk_crt_members_consistent() {
        let key_pair = PooledProvider.generate().unwrap();
        let jwk = RsaProvider.export_private(&key_pair).unwrap();

        let p = decode_uint(jwk.p.as_ref().unwrap()).unwrap();
        let q = decode_uint(jwk.q.as_ref().unwrap()).unwrap();
        let qi = decode_uint(jwk.qi.as_ref().unwrap()).unwrap();
        assert_eq!((q * qi) % &p, BigUint::from(1u32));
    }

    #[test]
    fn test_public_jwk_roundtrip() {
        let key_pair = PooledProvider.generate().unwrap();
        let jwk = RsaProvider.export_public(key_pair.public_key()).unwrap();
        assert!(!jwk.is_private());
        assert_eq!(jwk.key_ops.as_deref(), Some(&["verify".to_string()][..]));

        let restored = RsaProvider.import_public(&jwk).unwrap();
        assert_eq!(&restored, key_pair.public_key());
    }

    #[test]
    fn test_import_public_rejects_other_algorithms() {
        let key_pair = PooledProvider.generate().unwrap();
        let mut jwk = RsaProvider.export_public(key_pair.public_key()).unwrap();

        jwk.alg = Some("RS256".to_string());
        assert_eq!(RsaProvider.import_public(&jwk), Err(KeyError::UnsupportedKey));

        jwk.alg = Some("RS512".to_string());
        jwk.kty = "EC".to_string();
        assert_eq!(RsaProvider.import_public(&jwk), Err(KeyError::UnsupportedKey));

        jwk.kty = "RSA".to_string();
        jwk.key_ops = Some(vec!["encrypt".to_string()]);
        assert_eq!(RsaProvider.import_public(&jwk), Err(KeyError::UnsupportedKey));
    }

    #[test]
    fn test_import_public_rejects_small_modulus() {
        // 512-bit modulus: all ones is not a real key but size is checked first
        let jwk = Jwk {
            kty: "RSA".to_string(),
            alg: None,
            n: encode_uint(&BigUint::from_bytes_be(&[0xff; 64])),
            e: "AQAB".to_string(),
            d: None,
            p: None,
            q: None,
            dp: None,
            dq: None,
            qi: None,
            ext: None,
            key_ops: None,
        };
        assert_eq!(RsaProvider.import_public(&jwk), Err(KeyError::UnsupportedKey));
    }

    #[test]
    fn test_import_public_rejects_bad_base64() {
        let key_pair = PooledProvider.generate().unwrap();
        let mut jwk = RsaProvider.export_public(key_pair.public_key()).unwrap();
        jwk.n = "!!not base64!!".to_string();
        assert_eq!(RsaProvider.import_public(&jwk), Err(KeyError::InvalidPublicKey));
    }

    #[test]
    fn test_import_private_rejects_tampered_key() {
        let key_pair = PooledProvider.generate().unwrap();
        let mut jwk = RsaProvider.export_private(&key_pair).unwrap();
        jwk.d = Some("AQAB".to_string());
        assert!(RsaProvider.import_private(&jwk).is_err());
    }

    #[test]
    fn test_import_private_requires_private_members() {
        let key_pair = PooledProvider.generate().unwrap();
        let jwk = RsaProvider.export_public(key_pair.public_key()).unwrap();
        // Public JWK has key_ops ["verify"], which does not permit signing
        assert_eq!(RsaProvider.import_private(&jwk).err(), Some(KeyError::UnsupportedKey));

        let mut jwk = jwk;
        jwk.key_ops = None;
        assert_eq!(RsaProvider.import_private(&jwk).err(), Some(KeyError::MalformedKeyFile));
    }
}
