use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use rsa::RsaPrivateKey;

use soundmaster_core::PreferenceStore;

use crate::error::AdbError;

/// Preference key holding the base64 PKCS#8 DER private key.
pub const PRIVATE_KEY_PREF: &str = "adb_private_key";

/// Persists the client's RSA private key in a [`PreferenceStore`].
#[derive(Clone)]
pub struct KeyStore {
    prefs: Arc<dyn PreferenceStore>,
}

impl KeyStore {
    pub fn new(prefs: Arc<dyn PreferenceStore>) -> Self {
        Self { prefs }
    }

    /// The stored key, or `None` if nothing has been stored yet.
    pub fn load(&self) -> Result<Option<RsaPrivateKey>, AdbError> {
        let Some(encoded) = self.prefs.get_text(PRIVATE_KEY_PREF) else {
            return Ok(None);
        };
        let der = STANDARD
            .decode(encoded.trim())
            .map_err(|e| AdbError::KeyImport(format!("stored key is not base64: {}", e)))?;
        let key = RsaPrivateKey::from_pkcs8_der(&der)
            .map_err(|e| AdbError::KeyImport(format!("stored key is corrupt: {}", e)))?;
        Ok(Some(key))
    }

    pub fn save(&self, key: &RsaPrivateKey) -> Result<(), AdbError> {
        let der = key
            .to_pkcs8_der()
            .map_err(|e| AdbError::KeyImport(format!("failed to encode key: {}", e)))?;
        self.prefs
            .set_text(PRIVATE_KEY_PREF, &STANDARD.encode(der.as_bytes()))
            .map_err(|e| AdbError::Io(e.to_string()))
    }

    pub fn clear(&self) -> Result<(), AdbError> {
        self.prefs
            .remove(PRIVATE_KEY_PREF)
            .map_err(|e| AdbError::Io(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_key;
    use soundmaster_core::MemoryPreferences;

    #[test]
    fn empty_store_loads_nothing() {
        let store = KeyStore::new(Arc::new(MemoryPreferences::new()));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn save_then_load() {
        let prefs = Arc::new(MemoryPreferences::new());
        let store = KeyStore::new(prefs.clone());
        store.save(test_key()).unwrap();

        assert!(prefs.get_text(PRIVATE_KEY_PREF).is_some());
        assert_eq!(store.load().unwrap().as_ref(), Some(test_key()));

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn corrupt_entry_is_an_error() {
        let prefs = Arc::new(MemoryPreferences::new());
        prefs.set_text(PRIVATE_KEY_PREF, "not base64!").unwrap();
        let store = KeyStore::new(prefs);
        assert!(matches!(store.load(), Err(AdbError::KeyImport(_))));
    }
}
