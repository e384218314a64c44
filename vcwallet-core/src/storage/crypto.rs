//! Passphrase key derivation and record encryption.
//!
//! The store key is derived from the passphrase with Argon2id and a per-store
//! random salt. Records are sealed with XChaCha20-Poly1305; the associated
//! data binds each ciphertext to its label and record id so sealed files
//! cannot be swapped for one another.

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    Key, XChaCha20Poly1305, XNonce,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::error::{StorageResult, StoreError};

/// Size of the XChaCha20-Poly1305 nonce in bytes.
pub const NONCE_SIZE: usize = 24;

/// Size of the per-store KDF salt in bytes.
pub const SALT_SIZE: usize = 16;

const KEY_SIZE: usize = 32;
const AAD_PREFIX: &[u8] = b"vcwallet:";

const MAX_MEMORY_KIB: u32 = 1024 * 1024;
const MAX_ITERATIONS: u32 = 64;
const MAX_PARALLELISM: u32 = 16;

/// Argon2id cost parameters, persisted alongside the salt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of passes.
    pub iterations: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    /// Cheap parameters for tests. Never use for a real wallet.
    #[must_use]
    pub const fn insecure_fast() -> Self {
        Self {
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
        }
    }

    /// Returns `true` if Argon2 accepts these parameters and they stay under
    /// the wallet's caps (1 GiB of memory, 64 passes, 16 lanes).
    ///
    /// Parameters read back from disk must pass this check before any key is
    /// derived with them.
    #[must_use]
    pub fn is_within_bounds(&self) -> bool {
        (1..=MAX_PARALLELISM).contains(&self.parallelism)
            && (1..=MAX_ITERATIONS).contains(&self.iterations)
            && (8 * self.parallelism..=MAX_MEMORY_KIB).contains(&self.memory_kib)
    }
}

/// Symmetric key protecting every record of one store.
///
/// Zeroized on drop and redacted from `Debug`.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct StoreKey([u8; KEY_SIZE]);

impl StoreKey {
    /// Derives the store key from `passphrase` and the store's salt.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Crypto`] if the parameters are rejected by Argon2.
    pub fn derive(
        passphrase: &SecretString,
        salt: &[u8],
        params: &KdfParams,
    ) -> StorageResult<Self> {
        let params = Params::new(
            params.memory_kib,
            params.iterations,
            params.parallelism,
            Some(KEY_SIZE),
        )
        .map_err(|err| StoreError::Crypto(format!("invalid argon2 params: {err}")))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let mut key = [0u8; KEY_SIZE];
        argon2
            .hash_password_into(passphrase.expose_secret().as_bytes(), salt, &mut key)
            .map_err(|err| StoreError::Crypto(format!("argon2 key derivation failed: {err}")))?;
        Ok(Self(key))
    }

    fn cipher(&self) -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new(Key::from_slice(&self.0))
    }
}

impl std::fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Fills a fresh buffer from the OS RNG.
///
/// # Errors
///
/// Returns [`StoreError::Crypto`] if the RNG is unavailable.
pub fn random_bytes<const N: usize>() -> StorageResult<[u8; N]> {
    let mut bytes = [0u8; N];
    getrandom::getrandom(&mut bytes)
        .map_err(|err| StoreError::Crypto(format!("getrandom failed: {err}")))?;
    Ok(bytes)
}

fn associated_data(label: &[u8], record_id: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(AAD_PREFIX.len() + label.len() + 1 + record_id.len());
    aad.extend_from_slice(AAD_PREFIX);
    aad.extend_from_slice(label);
    aad.push(b':');
    aad.extend_from_slice(record_id.as_bytes());
    aad
}

/// Encrypts `plaintext` under `key`, returning `(ciphertext, nonce)`.
///
/// # Errors
///
/// Returns an error if the RNG or the AEAD fails.
pub fn seal(
    key: &StoreKey,
    label: &[u8],
    record_id: &str,
    plaintext: &[u8],
) -> StorageResult<(Vec<u8>, [u8; NONCE_SIZE])> {
    let nonce = random_bytes::<NONCE_SIZE>()?;
    let aad = associated_data(label, record_id);
    let ciphertext = key
        .cipher()
        .encrypt(
            XNonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: &aad,
            },
        )
        .map_err(|_| StoreError::Crypto("XChaCha20-Poly1305 encryption failed".to_string()))?;
    Ok((ciphertext, nonce))
}

/// Decrypts a ciphertext produced by [`seal`] with the same label and id.
///
/// # Errors
///
/// Returns [`StoreError::Crypto`] on authentication failure; callers decide
/// whether that means a wrong passphrase or a corrupt record.
pub fn open(
    key: &StoreKey,
    label: &[u8],
    record_id: &str,
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
) -> StorageResult<Vec<u8>> {
    let aad = associated_data(label, record_id);
    key.cipher()
        .decrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad: &aad,
            },
        )
        .map_err(|_| StoreError::Crypto("XChaCha20-Poly1305 decryption failed".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(passphrase: &str, salt: &[u8]) -> StoreKey {
        StoreKey::derive(
            &SecretString::from(passphrase.to_string()),
            salt,
            &KdfParams::insecure_fast(),
        )
        .expect("derive")
    }

    #[test]
    fn test_derivation_is_deterministic_per_salt() {
        let salt = [7u8; SALT_SIZE];
        assert_eq!(key("pw1", &salt).0, key("pw1", &salt).0);
        assert_ne!(key("pw1", &salt).0, key("pw2", &salt).0);
        assert_ne!(key("pw1", &salt).0, key("pw1", &[8u8; SALT_SIZE]).0);
    }

    #[test]
    fn test_open_rejects_wrong_key_and_binding() {
        let salt = [1u8; SALT_SIZE];
        let right = key("pw1", &salt);
        let wrong = key("nope", &salt);
        let (ciphertext, nonce) = seal(&right, b"credential", "abc", b"payload").expect("seal");

        assert_eq!(
            open(&right, b"credential", "abc", &nonce, &ciphertext).expect("open"),
            b"payload"
        );
        assert!(open(&wrong, b"credential", "abc", &nonce, &ciphertext).is_err());
        assert!(open(&right, b"credential", "xyz", &nonce, &ciphertext).is_err());
        assert!(open(&right, b"identity", "abc", &nonce, &ciphertext).is_err());
    }

    #[test]
    fn test_kdf_bounds() {
        assert!(KdfParams::default().is_within_bounds());
        assert!(KdfParams::insecure_fast().is_within_bounds());

        let params = KdfParams::insecure_fast();
        for out_of_range in [
            KdfParams { memory_kib: u32::MAX, ..params },
            KdfParams { memory_kib: 4, ..params },
            KdfParams { iterations: 0, ..params },
            KdfParams { iterations: 1_000, ..params },
            KdfParams { parallelism: 0, ..params },
            KdfParams { parallelism: 64, memory_kib: 1024, ..params },
        ] {
            assert!(!out_of_range.is_within_bounds(), "{out_of_range:?}");
        }
    }

    #[test]
    fn test_debug_redacts_key() {
        let debug = format!("{:?}", key("pw1", &[0u8; SALT_SIZE]));
        assert!(debug.contains("REDACTED"));
    }
}
