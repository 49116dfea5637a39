use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::{Digest, Sha256};

use super::key_store::KeyStore;
use crate::error::AdbError;

/// Modulus size the daemon accepts.
pub const KEY_BITS: usize = 2048;

/// Modulus length in 32-bit words.
const MODULUS_WORDS: usize = KEY_BITS / 32;

/// The client's RSA identity: signs auth tokens and presents its public key
/// in the format `adbd` keeps in `adb_keys`.
#[derive(Clone)]
pub struct AdbKey {
    private_key: RsaPrivateKey,
    public_key: Vec<u8>,
    identity: String,
}

impl AdbKey {
    /// Load the stored key, generating and storing a fresh one if none exists.
    pub fn generate_or_load(store: &KeyStore, identity: &str) -> Result<Self, AdbError> {
        if let Some(key) = store.load()? {
            log::debug!("Loaded stored ADB key");
            return Self::from_private_key(key, identity);
        }

        log::info!("Generating new {}-bit ADB key", KEY_BITS);
        let key = RsaPrivateKey::new(&mut OsRng, KEY_BITS)
            .map_err(|e| AdbError::KeyImport(format!("key generation failed: {}", e)))?;
        store.save(&key)?;
        Self::from_private_key(key, identity)
    }

    /// Parse `bytes` (PKCS#8 or PKCS#1, PEM or DER) and persist it.
    ///
    /// On failure the store is left untouched.
    pub fn import(store: &KeyStore, bytes: &[u8], identity: &str) -> Result<Self, AdbError> {
        let key = parse_private_key(bytes)?;
        let adb_key = Self::from_private_key(key, identity)?;
        store.save(&adb_key.private_key)?;
        log::info!("Imported ADB key {}", adb_key.fingerprint());
        Ok(adb_key)
    }

    pub fn from_private_key(private_key: RsaPrivateKey, identity: &str) -> Result<Self, AdbError> {
        let bits = private_key.n().bits();
        if bits != KEY_BITS {
            return Err(AdbError::KeyImport(format!(
                "expected a {KEY_BITS}-bit RSA key, got {bits} bits"
            )));
        }
        private_key
            .validate()
            .map_err(|e| AdbError::KeyImport(format!("invalid RSA key: {}", e)))?;

        let public_key = android_public_key(&private_key.to_public_key());
        Ok(Self {
            private_key,
            public_key,
            identity: identity.to_string(),
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Sign a 20-byte auth token.
    ///
    /// The token is treated as an already-computed SHA-1 digest: the
    /// signature is PKCS#1 v1.5 with the SHA-1 DigestInfo prefix over the
    /// raw token bytes.
    pub fn sign(&self, token: &[u8]) -> Result<Vec<u8>, AdbError> {
        self.private_key
            .sign(Pkcs1v15Sign::new::<Sha1>(), token)
            .map_err(|e| AdbError::Auth(format!("failed to sign token: {}", e)))
    }

    /// `AUTH(RSAPUBLICKEY)` payload: base64 key, a space, the identity, NUL.
    pub fn public_key_payload(&self) -> Vec<u8> {
        let mut payload = STANDARD.encode(&self.public_key).into_bytes();
        payload.push(b' ');
        payload.extend_from_slice(self.identity.as_bytes());
        payload.push(0);
        payload
    }

    /// SHA-256 of the encoded public key, lowercase hex.
    pub fn fingerprint(&self) -> String {
        Sha256::digest(&self.public_key)
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    pub fn public_key(&self) -> RsaPublicKey {
        self.private_key.to_public_key()
    }
}

impl std::fmt::Debug for AdbKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdbKey")
            .field("identity", &self.identity)
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

fn parse_private_key(bytes: &[u8]) -> Result<RsaPrivateKey, AdbError> {
    if bytes.is_empty() {
        return Err(AdbError::KeyImport("key is empty".into()));
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        let text = text.trim();
        if text.starts_with("-----BEGIN") {
            return RsaPrivateKey::from_pkcs8_pem(text)
                .or_else(|_| RsaPrivateKey::from_pkcs1_pem(text))
                .map_err(|e| AdbError::KeyImport(format!("unreadable PEM key: {}", e)));
        }
    }

    RsaPrivateKey::from_pkcs8_der(bytes)
        .or_else(|_| RsaPrivateKey::from_pkcs1_der(bytes))
        .map_err(|e| AdbError::KeyImport(format!("unreadable DER key: {}", e)))
}

/// Encode a public key as `adbd`'s `RSAPublicKey` struct:
///
/// ```text
/// u32 len (= 64) | u32 n0inv | u32 n[64] | u32 rr[64] | u32 exponent
/// ```
///
/// All little-endian; `n0inv = -1/n mod 2^32`, `rr = 2^4096 mod n`.
fn android_public_key(key: &RsaPublicKey) -> Vec<u8> {
    let n = key.n();
    let n_words = to_words(n);
    let rr_words = to_words(&((BigUint::from(1u32) << (KEY_BITS * 2)) % n));
    let exponent = to_words(key.e())[0];

    let mut buf = Vec::with_capacity(4 * (3 + 2 * MODULUS_WORDS));
    buf.extend_from_slice(&(MODULUS_WORDS as u32).to_le_bytes());
    buf.extend_from_slice(&modular_inverse_neg(n_words[0]).to_le_bytes());
    for word in n_words.iter().chain(rr_words.iter()) {
        buf.extend_from_slice(&word.to_le_bytes());
    }
    buf.extend_from_slice(&exponent.to_le_bytes());
    buf
}

/// Little-endian 32-bit words of `value`, zero-padded to the modulus width.
fn to_words(value: &BigUint) -> Vec<u32> {
    let mut bytes = value.to_bytes_le();
    bytes.resize(MODULUS_WORDS * 4, 0);
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// `-(n0^-1) mod 2^32` for odd `n0`, by Newton iteration.
fn modular_inverse_neg(n0: u32) -> u32 {
    let mut inv = n0;
    for _ in 0..5 {
        inv = inv.wrapping_mul(2u32.wrapping_sub(n0.wrapping_mul(inv)));
    }
    inv.wrapping_neg()
}
