//! Wallet identity: a `did:key` DID and its Ed25519 signing keypair.
//!
//! The identity is minted once, when the store is first initialized, and is
//! persisted sealed under the store key. Only a reset destroys it.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::storage::{StorageResult, StoreError};

/// Multicodec prefix for an Ed25519 public key (varint `0xed`).
const ED25519_MULTICODEC: [u8; 2] = [0xed, 0x01];

/// The wallet's decentralized identifier plus its signing key.
///
/// # Security
///
/// The secret key is zeroized on drop and never appears in `Debug` output.
#[derive(Clone)]
pub struct Identity {
    did: String,
    signing_key: SigningKey,
    created_at: u64,
}

impl Identity {
    /// Builds an identity from an existing Ed25519 signing key.
    #[must_use]
    pub fn from_signing_key(signing_key: SigningKey, created_at: u64) -> Self {
        let did = did_key_for(&signing_key.verifying_key());
        Self {
            did,
            signing_key,
            created_at,
        }
    }

    /// Returns the DID, e.g. `did:key:z6Mk...`.
    #[must_use]
    pub fn did(&self) -> &str {
        &self.did
    }

    /// Returns the public half of the keypair.
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Returns the key's verification method id, `<did>#<multibase key>`.
    #[must_use]
    pub fn verification_method(&self) -> String {
        let fragment = self.did.trim_start_matches("did:key:");
        format!("{}#{fragment}", self.did)
    }

    /// Seconds since the Unix epoch at which the identity was minted.
    #[must_use]
    pub const fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Signs `message` with the identity key.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    pub(crate) fn to_persisted(&self) -> PersistedIdentity {
        PersistedIdentity {
            did: self.did.clone(),
            secret_key: Zeroizing::new(self.signing_key.to_bytes()),
            created_at: self.created_at,
        }
    }

    pub(crate) fn from_persisted(persisted: &PersistedIdentity) -> StorageResult<Self> {
        let identity = Self::from_signing_key(
            SigningKey::from_bytes(&persisted.secret_key),
            persisted.created_at,
        );
        if identity.did != persisted.did {
            return Err(StoreError::corrupt(
                "identity record DID does not match its key",
            ));
        }
        Ok(identity)
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("did", &self.did)
            .field("signing_key", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Identity material as stored inside the sealed identity record.
#[derive(Serialize, Deserialize)]
pub(crate) struct PersistedIdentity {
    did: String,
    secret_key: Zeroizing<[u8; 32]>,
    created_at: u64,
}

/// Encodes an Ed25519 public key as a `did:key` identifier.
#[must_use]
pub fn did_key_for(verifying_key: &VerifyingKey) -> String {
    let mut bytes = Vec::with_capacity(ED25519_MULTICODEC.len() + 32);
    bytes.extend_from_slice(&ED25519_MULTICODEC);
    bytes.extend_from_slice(verifying_key.as_bytes());
    format!("did:key:z{}", bs58::encode(bytes).into_string())
}

/// Source of fresh identities for a new store.
///
/// The store calls [`IdentityMinter::mint`] exactly once per initialization;
/// the store's `AlreadyInitialized` guard, not the minter, keeps that to
/// once per store lifetime.
pub trait IdentityMinter: Send + Sync {
    /// Generates a new identity.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Identity`] if key generation fails. The caller
    /// rolls back the partially created store.
    fn mint(&self, now: u64) -> StorageResult<Identity>;
}

/// Mints Ed25519 `did:key` identities from the OS RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct DidMinter;

impl IdentityMinter for DidMinter {
    fn mint(&self, now: u64) -> StorageResult<Identity> {
        let mut seed = Zeroizing::new([0u8; 32]);
        rand::RngCore::try_fill_bytes(&mut OsRng, &mut seed[..])
            .map_err(|err| StoreError::Identity(format!("entropy unavailable: {err}")))?;
        let identity = Identity::from_signing_key(SigningKey::from_bytes(&seed), now);
        log::info!("minted wallet identity {}", identity.did());
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::Verifier;

    use super::*;

    #[test]
    fn test_minted_did_is_ed25519_did_key() {
        let identity = DidMinter.mint(10).expect("mint");
        assert!(identity.did().starts_with("did:key:z6Mk"));
        assert_eq!(identity.created_at(), 10);
        assert!(identity
            .verification_method()
            .starts_with(&format!("{}#z6Mk", identity.did())));
    }

    #[test]
    fn test_each_mint_is_fresh() {
        let a = DidMinter.mint(0).expect("mint");
        let b = DidMinter.mint(0).expect("mint");
        assert_ne!(a.did(), b.did());
    }

    #[test]
    fn test_did_encodes_multicodec_prefixed_key() {
        let identity = DidMinter.mint(0).expect("mint");
        let encoded = identity.did().strip_prefix("did:key:z").expect("multibase");
        let bytes = bs58::decode(encoded).into_vec().expect("base58");
        assert_eq!(&bytes[..2], &ED25519_MULTICODEC);
        assert_eq!(&bytes[2..], identity.verifying_key().as_bytes());
    }

    #[test]
    fn test_signatures_verify_and_persist() {
        let identity = DidMinter.mint(5).expect("mint");
        let signature = identity.sign(b"hello");
        identity
            .verifying_key()
            .verify(b"hello", &signature)
            .expect("verify");

        let restored = Identity::from_persisted(&identity.to_persisted()).expect("restore");
        assert_eq!(restored.did(), identity.did());
        assert!(!format!("{restored:?}").contains("secret"));
    }
}
