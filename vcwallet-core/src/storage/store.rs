//! Secure store facade: lifecycle and credential record operations.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use super::crypto::{random_bytes, KdfParams, StoreKey, SALT_SIZE};
use super::envelope::{SealedBlob, StoreMetadata};
use super::error::{StorageResult, StoreError};
use super::files;
use super::lock::{WalletLock, WalletLockGuard};
use super::paths::{StoragePaths, StoreLayout};
use crate::credential::{CredentialId, CredentialRecord, VerifiableCredential};
use crate::identity::{Identity, IdentityMinter, PersistedIdentity};
use crate::utils::unix_now;

const IDENTITY_LABEL: &[u8] = b"identity";
const IDENTITY_RECORD_ID: &str = "self";
const CREDENTIAL_LABEL: &[u8] = b"credential";
const RECORD_EXTENSION: &str = "bin";

/// Passphrase-gated encrypted credential store.
///
/// Two locks guard the store. `session` holds the derived key; `lock` only
/// clears it and never waits behind disk I/O. `mutations` (plus the
/// cross-process [`WalletLock`]) serializes everything that changes the
/// store directory or installs a key, so a key is never installed for a
/// store that a concurrent reset is removing.
pub struct SecureStore {
    paths: StoragePaths,
    kdf: KdfParams,
    file_lock: WalletLock,
    session: RwLock<Option<Arc<StoreKey>>>,
    mutations: Mutex<()>,
}

impl std::fmt::Debug for SecureStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureStore")
            .field("wallet_dir", &self.paths.wallet_dir())
            .field("unlocked", &self.is_unlocked())
            .finish_non_exhaustive()
    }
}

/// Credential record as sealed on disk.
#[derive(Serialize, Deserialize)]
struct PersistedCredential {
    id: CredentialId,
    credential_json: String,
    added_at: u64,
}

impl SecureStore {
    /// Opens a handle on the wallet under `paths`. Nothing is created besides
    /// the wallet directory and its lock file.
    ///
    /// `kdf` only applies to stores created by this handle; existing stores
    /// carry their own parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be opened.
    pub fn open(paths: StoragePaths, kdf: KdfParams) -> StorageResult<Self> {
        let file_lock = WalletLock::open(&paths.lock_path())?;
        Ok(Self {
            paths,
            kdf,
            file_lock,
            session: RwLock::new(None),
            mutations: Mutex::new(()),
        })
    }

    /// Returns the storage paths used by this handle.
    #[must_use]
    pub const fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    /// Returns `true` if a store exists on disk.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.layout().metadata_path().is_file()
    }

    /// Returns `true` if a key is installed in this process and the store it
    /// belongs to still exists.
    ///
    /// A key whose store was reset through another handle or process is
    /// dropped here, so an unlocked store is always an initialized one.
    #[must_use]
    pub fn is_unlocked(&self) -> bool {
        if !self.has_key() {
            return false;
        }
        if self.is_initialized() {
            return true;
        }
        let _mutations = self
            .mutations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.is_initialized() {
            return self.has_key();
        }
        self.install_key(None);
        log::debug!("wallet store removed elsewhere, session key dropped");
        false
    }

    /// Creates a new store protected by `passphrase` and leaves it unlocked.
    ///
    /// The store is assembled in a staging directory (metadata, canary, and
    /// the identity from `minter`) and renamed into place only once complete.
    /// Any failure removes the staging directory, so a retry starts clean.
    ///
    /// # Errors
    ///
    /// - [`StoreError::AlreadyInitialized`] if a store exists.
    /// - [`StoreError::Identity`] if minting fails.
    /// - I/O and crypto errors from building the store.
    pub fn initialize(
        &self,
        passphrase: &SecretString,
        minter: &dyn IdentityMinter,
    ) -> StorageResult<()> {
        let _mutations = self.mutations()?;
        let guard = self.file_lock.acquire()?;

        if self.is_initialized() {
            return Err(StoreError::AlreadyInitialized);
        }
        if !self.kdf.is_within_bounds() {
            return Err(StoreError::Crypto(format!(
                "KDF parameters out of range: {:?}",
                self.kdf
            )));
        }
        let store_dir = self.paths.store_dir();
        if store_dir.exists() {
            return Err(StoreError::corrupt(
                "store directory exists without metadata; reset required",
            ));
        }
        self.sweep_transient_dirs(&guard);

        let salt = random_bytes::<SALT_SIZE>()?;
        let key = StoreKey::derive(passphrase, &salt, &self.kdf)?;
        let staging = StoreLayout::new(self.paths.new_staging_dir());

        if let Err(err) = Self::build_store(&staging, &key, salt, self.kdf, minter) {
            log::warn!("initialize failed, discarding staged store: {err}");
            remove_dir_logged(staging.dir());
            return Err(err);
        }
        if let Err(err) = fs::rename(staging.dir(), &store_dir) {
            remove_dir_logged(staging.dir());
            return Err(StoreError::io("publish staged store", err));
        }
        files::sync_parent(&store_dir)
            .map_err(|err| StoreError::io("sync wallet directory", err))?;

        self.install_key(Some(Arc::new(key)));
        log::info!("wallet store initialized at {}", store_dir.display());
        Ok(())
    }

    fn build_store(
        staging: &StoreLayout,
        key: &StoreKey,
        salt: [u8; SALT_SIZE],
        kdf: KdfParams,
        minter: &dyn IdentityMinter,
    ) -> StorageResult<()> {
        let now = unix_now();
        fs::create_dir_all(staging.credentials_dir())
            .map_err(|err| StoreError::io("create staging directory", err))?;

        let identity = minter.mint(now)?;
        let sealed = SealedBlob::seal_value(
            key,
            IDENTITY_LABEL,
            IDENTITY_RECORD_ID,
            &identity.to_persisted(),
        )?;
        files::write_atomic(&staging.identity_path(), &sealed)?;

        let metadata = StoreMetadata::new(key, salt, kdf, now)?;
        files::write_atomic(&staging.metadata_path(), &metadata.serialize()?)
    }

    /// Derives the key from `passphrase` and installs it if the canary opens.
    ///
    /// A failed unlock leaves the lock state exactly as it was. Runs under
    /// both mutation locks, so it either completes before a reset removes
    /// the store or sees no store at all.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotInitialized`] if there is no store.
    /// - [`StoreError::InvalidPassphrase`] if the canary does not open.
    /// - [`StoreError::StoreCorrupt`] if the metadata record is unreadable
    ///   or carries out-of-range KDF parameters.
    pub fn unlock(&self, passphrase: &SecretString) -> StorageResult<()> {
        let _mutations = self.mutations()?;
        let _guard = self.file_lock.acquire()?;
        let bytes = files::read_optional(&self.layout().metadata_path())?
            .ok_or(StoreError::NotInitialized)?;
        let metadata = StoreMetadata::deserialize(&bytes)?;
        let key = StoreKey::derive(passphrase, &metadata.salt, &metadata.kdf)?;
        metadata.verify(&key)?;
        self.install_key(Some(Arc::new(key)));
        log::debug!("wallet store unlocked");
        Ok(())
    }

    /// Discards the derived key. Idempotent.
    pub fn lock(&self) {
        self.install_key(None);
        log::debug!("wallet store locked");
    }

    /// Irrecoverably destroys the store: records, identity, and metadata.
    ///
    /// Locks first, then moves the live directory aside with a single rename
    /// and deletes it. The key is cleared again under the mutation locks, so
    /// an unlock racing the reset cannot leave a key behind. Either the rename happens and the store is gone, or it
    /// fails and the store is untouched. Trash that cannot be removed is
    /// swept on the next reset or initialize.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Io`] if the rename fails (the store is unchanged).
    /// - [`StoreError::StoreCorrupt`] if a store directory is still present
    ///   afterwards.
    pub fn reset(&self) -> StorageResult<()> {
        self.lock();
        let _mutations = self.mutations()?;
        let guard = self.file_lock.acquire()?;
        self.install_key(None);

        let store_dir = self.paths.store_dir();
        if store_dir.exists() {
            let trash = self.paths.new_trash_dir();
            fs::rename(&store_dir, &trash)
                .map_err(|err| StoreError::io("move store to trash", err))?;
            files::sync_parent(&store_dir)
                .map_err(|err| StoreError::io("sync wallet directory", err))?;
            remove_dir_logged(&trash);
        }
        self.sweep_transient_dirs(&guard);

        if store_dir.exists() {
            return Err(StoreError::corrupt("store directory survived reset"));
        }
        log::info!("wallet store reset");
        Ok(())
    }

    /// Returns the wallet identity.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StoreLocked`] if locked, or
    /// [`StoreError::StoreCorrupt`] if the identity record is missing or
    /// does not open.
    pub fn identity(&self) -> StorageResult<Identity> {
        let key = self.session_key()?;
        let bytes = files::read_optional(&self.layout().identity_path())?
            .ok_or_else(|| StoreError::corrupt("identity record missing"))?;
        let persisted: PersistedIdentity =
            SealedBlob::open_value(&key, IDENTITY_LABEL, IDENTITY_RECORD_ID, &bytes)?;
        Identity::from_persisted(&persisted)
    }

    /// Persists `record` as its own sealed file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StoreLocked`] if locked, or an I/O, crypto, or
    /// serialization error.
    pub fn add_credential(&self, record: &CredentialRecord) -> StorageResult<()> {
        let key = self.session_key()?;
        let record_id = record.id.to_simple_string();
        let persisted = PersistedCredential {
            id: record.id,
            credential_json: record
                .credential
                .to_json()
                .map_err(StoreError::serialization)?,
            added_at: record.added_at,
        };
        let sealed = SealedBlob::seal_value(&key, CREDENTIAL_LABEL, &record_id, &persisted)?;

        let _mutations = self.mutations()?;
        let guard = self.file_lock.acquire()?;
        let layout = self.live_layout(&guard)?;
        files::write_atomic(&layout.credential_path(&record_id), &sealed)?;
        log::debug!("stored credential {}", record.id);
        Ok(())
    }

    /// Deletes the record `id`. Deleting an unknown id succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StoreLocked`] if locked, or an I/O error.
    pub fn delete_credential(&self, id: &CredentialId) -> StorageResult<()> {
        self.session_key()?;
        let _mutations = self.mutations()?;
        let guard = self.file_lock.acquire()?;
        let layout = self.live_layout(&guard)?;
        files::remove_if_exists(&layout.credential_path(&id.to_simple_string()))?;
        log::debug!("deleted credential {id}");
        Ok(())
    }

    /// Reads every persisted credential, oldest first.
    ///
    /// Records are written atomically, so listing does not take the mutation
    /// lock; a record deleted mid-listing is simply skipped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StoreLocked`] if locked, or
    /// [`StoreError::StoreCorrupt`] if a record does not open.
    pub fn get_all_credentials(&self) -> StorageResult<Vec<CredentialRecord>> {
        let key = self.session_key()?;
        let layout = self.layout();
        if !layout.metadata_path().is_file() {
            return Err(StoreError::NotInitialized);
        }

        let mut records = Vec::new();
        for path in files::list_with_extension(&layout.credentials_dir(), RECORD_EXTENSION)? {
            let Some(record_id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let Some(bytes) = files::read_optional(&path)? else {
                continue;
            };
            let persisted: PersistedCredential =
                SealedBlob::open_value(&key, CREDENTIAL_LABEL, record_id, &bytes)?;
            if persisted.id.to_simple_string() != record_id {
                return Err(StoreError::corrupt(format!(
                    "record {record_id} carries id {}",
                    persisted.id
                )));
            }
            let credential = VerifiableCredential::from_json(&persisted.credential_json)
                .map_err(|err| {
                    StoreError::corrupt(format!("record {record_id} payload: {err}"))
                })?;
            records.push(CredentialRecord {
                id: persisted.id,
                credential,
                added_at: persisted.added_at,
            });
        }
        records.sort_by(|a, b| a.added_at.cmp(&b.added_at).then(a.id.cmp(&b.id)));
        Ok(records)
    }

    fn layout(&self) -> StoreLayout {
        StoreLayout::new(self.paths.store_dir())
    }

    /// Layout of the live store, checked under the file lock so a reset from
    /// another process is noticed before writing.
    fn live_layout(&self, _guard: &WalletLockGuard<'_>) -> StorageResult<StoreLayout> {
        let layout = self.layout();
        if layout.metadata_path().is_file() {
            Ok(layout)
        } else {
            self.install_key(None);
            Err(StoreError::NotInitialized)
        }
    }

    fn has_key(&self) -> bool {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn session_key(&self) -> StorageResult<Arc<StoreKey>> {
        self.session
            .read()
            .map_err(|_| StoreError::Lock("session lock poisoned".to_string()))?
            .clone()
            .ok_or(StoreError::StoreLocked)
    }

    fn install_key(&self, key: Option<Arc<StoreKey>>) {
        *self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner) = key;
    }

    fn mutations(&self) -> StorageResult<MutexGuard<'_, ()>> {
        self.mutations
            .lock()
            .map_err(|_| StoreError::Lock("mutation lock poisoned".to_string()))
    }

    /// Removes staging/trash directories left by an interrupted run.
    fn sweep_transient_dirs(&self, _guard: &WalletLockGuard<'_>) {
        let Ok(entries) = fs::read_dir(self.paths.wallet_dir()) else {
            return;
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            if StoragePaths::is_transient_dir_name(&name.to_string_lossy()) {
                remove_dir_logged(&entry.path());
            }
        }
    }
}

fn remove_dir_logged(path: &Path) {
    if let Err(err) = fs::remove_dir_all(path) {
        log::warn!("could not remove {}: {err}", path.display());
    }
}
