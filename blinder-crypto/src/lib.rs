//! Crypto primitives (C1, §4.1): master-key-derived session keys and
//! AES-256-GCM authenticated encryption of per-entity plaintexts.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use blinder_core::CryptoError;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;

/// PBKDF2-HMAC-SHA256 iteration count mandated by §4.1. Not configurable:
/// lowering it would weaken every session key already derived against it.
pub const PBKDF2_ITERATIONS: u32 = 600_000;

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// Generate a fresh 32-byte random salt for a newly created session
/// (§4.1). Never reused across sessions and never mutated afterward.
pub fn generate_salt() -> [u8; 32] {
    use rand::RngCore;
    let mut salt = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Derive a 32-byte AES-256 key from a master key string and a per-session
/// salt, using PBKDF2-HMAC-SHA256 with 600,000 iterations (§4.1).
/// Deterministic: identical `(master_key, salt)` always yields the same key.
pub fn derive_key(master_key: &str, salt: &[u8; 32]) -> [u8; KEY_LEN] {
    let mut out = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(master_key.as_bytes(), salt, PBKDF2_ITERATIONS, &mut out);
    out
}

/// AES-256-GCM encrypt `plaintext` with `key`. Returns `(ciphertext, nonce)`
/// with a fresh random 12-byte nonce per call and no associated data.
pub fn encrypt(plaintext: &str, key: &[u8; KEY_LEN]) -> (Vec<u8>, [u8; NONCE_LEN]) {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    // Only fails on plaintext far beyond AES-GCM's practical size limit;
    // never happens for the entity values this vault encrypts.
    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .expect("AES-256-GCM encryption failed");
    (ciphertext, nonce.into())
}

/// AES-256-GCM decrypt `ciphertext` with `key` and `nonce`. Fails with
/// [`CryptoError::AuthenticationFailed`] if the tag is invalid, the nonce
/// is wrong, or the key is wrong - these are all indistinguishable to the
/// caller by design (no padding/tag oracle).
pub fn decrypt(
    ciphertext: &[u8],
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
) -> Result<String, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::AuthenticationFailed)?;
    String::from_utf8(plaintext).map_err(|_| CryptoError::AuthenticationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_salt_produces_distinct_values() {
        assert_ne!(generate_salt(), generate_salt());
    }

    #[test]
    fn derive_key_is_deterministic() {
        let salt = [1u8; 32];
        assert_eq!(derive_key("master", &salt), derive_key("master", &salt));
    }

    #[test]
    fn derive_key_differs_by_master_key() {
        let salt = [1u8; 32];
        assert_ne!(derive_key("master-1", &salt), derive_key("master-2", &salt));
    }

    #[test]
    fn derive_key_differs_by_salt() {
        assert_ne!(
            derive_key("master", &[1u8; 32]),
            derive_key("master", &[2u8; 32])
        );
    }

    #[test]
    fn encrypt_decrypt_roundtrips() {
        let key = derive_key("master", &[9u8; 32]);
        let (ciphertext, nonce) = encrypt("Jane Doe", &key);
        assert_eq!(decrypt(&ciphertext, &key, &nonce).unwrap(), "Jane Doe");
    }

    #[test]
    fn decrypt_fails_with_wrong_key() {
        let key1 = derive_key("master-1", &[9u8; 32]);
        let key2 = derive_key("master-2", &[9u8; 32]);
        let (ciphertext, nonce) = encrypt("Jane Doe", &key1);
        assert!(matches!(
            decrypt(&ciphertext, &key2, &nonce),
            Err(CryptoError::AuthenticationFailed)
        ));
    }

    #[test]
    fn decrypt_fails_with_wrong_nonce() {
        let key = derive_key("master", &[9u8; 32]);
        let (ciphertext, _nonce) = encrypt("Jane Doe", &key);
        let wrong_nonce = [7u8; NONCE_LEN];
        assert!(matches!(
            decrypt(&ciphertext, &key, &wrong_nonce),
            Err(CryptoError::AuthenticationFailed)
        ));
    }

    #[test]
    fn decrypt_fails_with_tampered_ciphertext() {
        let key = derive_key("master", &[9u8; 32]);
        let (mut ciphertext, nonce) = encrypt("Jane Doe", &key);
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xFF;
        assert!(matches!(
            decrypt(&ciphertext, &key, &nonce),
            Err(CryptoError::AuthenticationFailed)
        ));
    }

    proptest::proptest! {
        #[test]
        fn roundtrip_holds_for_arbitrary_strings(s in "\\PC*") {
            let key = derive_key("master", &[3u8; 32]);
            let (ciphertext, nonce) = encrypt(&s, &key);
            proptest::prop_assert_eq!(decrypt(&ciphertext, &key, &nonce).unwrap(), s);
        }
    }
}
