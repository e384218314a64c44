//! CBOR envelopes persisted by the store: the metadata record and the
//! sealed-blob wrapper used for identity and credential records.

use serde::{Deserialize, Serialize};

use super::crypto::{self, KdfParams, StoreKey, NONCE_SIZE, SALT_SIZE};
use super::error::{StorageResult, StoreError};

const METADATA_VERSION: u32 = 1;
const SEALED_VERSION: u32 = 1;

const CANARY_LABEL: &[u8] = b"canary";
const CANARY_ID: &str = "meta";
const CANARY_PLAINTEXT: &[u8] = b"vcwallet canary v1";

/// Lifecycle metadata: everything needed to re-derive and verify the key.
#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct StoreMetadata {
    pub(crate) version: u32,
    pub(crate) salt: [u8; SALT_SIZE],
    pub(crate) kdf: KdfParams,
    pub(crate) canary: SealedBlob,
    pub(crate) created_at: u64,
}

impl StoreMetadata {
    /// Builds metadata for a new store, sealing the canary under `key`.
    pub(crate) fn new(
        key: &StoreKey,
        salt: [u8; SALT_SIZE],
        kdf: KdfParams,
        now: u64,
    ) -> StorageResult<Self> {
        Ok(Self {
            version: METADATA_VERSION,
            salt,
            kdf,
            canary: SealedBlob::seal(key, CANARY_LABEL, CANARY_ID, CANARY_PLAINTEXT)?,
            created_at: now,
        })
    }

    /// Checks that `key` opens the canary.
    ///
    /// An authentication failure means the passphrase was wrong. A canary
    /// that opens to unexpected bytes means the record was tampered with.
    pub(crate) fn verify(&self, key: &StoreKey) -> StorageResult<()> {
        let plaintext = self
            .canary
            .open(key, CANARY_LABEL, CANARY_ID)
            .map_err(|_| StoreError::InvalidPassphrase)?;
        if plaintext != CANARY_PLAINTEXT {
            return Err(StoreError::corrupt("canary plaintext mismatch"));
        }
        Ok(())
    }

    pub(crate) fn serialize(&self) -> StorageResult<Vec<u8>> {
        to_cbor(self)
    }

    /// Parses the metadata record. Any failure here is corruption: the
    /// record is written once, atomically, and never by a foreign writer.
    /// KDF parameters outside [`KdfParams::is_within_bounds`] are rejected
    /// before anything is derived from them.
    pub(crate) fn deserialize(bytes: &[u8]) -> StorageResult<Self> {
        let metadata: Self = ciborium::de::from_reader(bytes)
            .map_err(|err| StoreError::corrupt(format!("unreadable metadata: {err}")))?;
        if metadata.version != METADATA_VERSION {
            return Err(StoreError::corrupt(format!(
                "unsupported metadata version {}",
                metadata.version
            )));
        }
        if !metadata.kdf.is_within_bounds() {
            return Err(StoreError::corrupt(format!(
                "metadata KDF parameters out of range: {:?}",
                metadata.kdf
            )));
        }
        Ok(metadata)
    }
}

/// An encrypted payload plus the nonce needed to open it.
#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct SealedBlob {
    pub(crate) version: u32,
    pub(crate) nonce: [u8; NONCE_SIZE],
    pub(crate) ciphertext: Vec<u8>,
}

impl SealedBlob {
    pub(crate) fn seal(
        key: &StoreKey,
        label: &[u8],
        record_id: &str,
        plaintext: &[u8],
    ) -> StorageResult<Self> {
        let (ciphertext, nonce) = crypto::seal(key, label, record_id, plaintext)?;
        Ok(Self {
            version: SEALED_VERSION,
            nonce,
            ciphertext,
        })
    }

    pub(crate) fn open(
        &self,
        key: &StoreKey,
        label: &[u8],
        record_id: &str,
    ) -> StorageResult<Vec<u8>> {
        if self.version != SEALED_VERSION {
            return Err(StoreError::corrupt(format!(
                "unsupported sealed record version {}",
                self.version
            )));
        }
        crypto::open(key, label, record_id, &self.nonce, &self.ciphertext)
    }

    /// Serializes `value` as CBOR and seals it.
    pub(crate) fn seal_value<T: Serialize>(
        key: &StoreKey,
        label: &[u8],
        record_id: &str,
        value: &T,
    ) -> StorageResult<Vec<u8>> {
        let plaintext = zeroize::Zeroizing::new(to_cbor(value)?);
        to_cbor(&Self::seal(key, label, record_id, &plaintext)?)
    }

    /// Reverses [`Self::seal_value`]. The key is already verified by the
    /// canary, so every failure here is reported as corruption.
    pub(crate) fn open_value<T: for<'de> Deserialize<'de>>(
        key: &StoreKey,
        label: &[u8],
        record_id: &str,
        bytes: &[u8],
    ) -> StorageResult<T> {
        let sealed: Self = ciborium::de::from_reader(bytes).map_err(|err| {
            StoreError::corrupt(format!("unreadable sealed record {record_id}: {err}"))
        })?;
        let plaintext = zeroize::Zeroizing::new(sealed.open(key, label, record_id).map_err(
            |_| StoreError::corrupt(format!("record {record_id} failed authentication")),
        )?);
        ciborium::de::from_reader(plaintext.as_slice()).map_err(|err| {
            StoreError::corrupt(format!("unreadable record {record_id}: {err}"))
        })
    }
}

fn to_cbor<T: Serialize>(value: &T) -> StorageResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(value, &mut bytes).map_err(StoreError::serialization)?;
    Ok(bytes)
}
