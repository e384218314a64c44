//! Storage path helpers.

use std::path::{Path, PathBuf};

use uuid::Uuid;

const WALLET_DIRNAME: &str = "vcwallet";
const STORE_DIRNAME: &str = "store";
const STAGING_PREFIX: &str = "store.staging-";
const TRASH_PREFIX: &str = "store.trash-";
const LOCK_FILENAME: &str = "lock";
const METADATA_FILENAME: &str = "meta.bin";
const IDENTITY_FILENAME: &str = "identity.bin";
const CREDENTIALS_DIRNAME: &str = "credentials";
const RECORD_EXTENSION: &str = "bin";

/// Paths for wallet storage artifacts under `<root>/vcwallet`.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
    wallet_dir: PathBuf,
}

impl StoragePaths {
    /// Builds storage paths rooted at `root`.
    #[must_use]
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let wallet_dir = root.join(WALLET_DIRNAME);
        Self { root, wallet_dir }
    }

    /// Returns the storage root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the wallet directory holding the store and its lock.
    #[must_use]
    pub fn wallet_dir(&self) -> &Path {
        &self.wallet_dir
    }

    /// Returns the path to the cross-process lock file.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.wallet_dir.join(LOCK_FILENAME)
    }

    /// Returns the live store directory.
    #[must_use]
    pub fn store_dir(&self) -> PathBuf {
        self.wallet_dir.join(STORE_DIRNAME)
    }

    /// Returns a fresh staging directory path used while initializing.
    #[must_use]
    pub fn new_staging_dir(&self) -> PathBuf {
        self.wallet_dir
            .join(format!("{STAGING_PREFIX}{}", Uuid::new_v4().simple()))
    }

    /// Returns a fresh trash directory path used while resetting.
    #[must_use]
    pub fn new_trash_dir(&self) -> PathBuf {
        self.wallet_dir
            .join(format!("{TRASH_PREFIX}{}", Uuid::new_v4().simple()))
    }

    /// Returns `true` if `name` is a leftover staging or trash directory.
    #[must_use]
    pub fn is_transient_dir_name(name: &str) -> bool {
        name.starts_with(STAGING_PREFIX) || name.starts_with(TRASH_PREFIX)
    }
}

/// Paths of the files inside one store directory (live or staging).
#[derive(Debug, Clone)]
pub struct StoreLayout {
    dir: PathBuf,
}

impl StoreLayout {
    /// Wraps a store directory.
    #[must_use]
    pub const fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Returns the store directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path of the metadata record (salt, KDF params, canary).
    #[must_use]
    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILENAME)
    }

    /// Returns the path of the sealed identity record.
    #[must_use]
    pub fn identity_path(&self) -> PathBuf {
        self.dir.join(IDENTITY_FILENAME)
    }

    /// Returns the directory holding one file per credential.
    #[must_use]
    pub fn credentials_dir(&self) -> PathBuf {
        self.dir.join(CREDENTIALS_DIRNAME)
    }

    /// Returns the path of the credential record named `id`.
    #[must_use]
    pub fn credential_path(&self, id: &str) -> PathBuf {
        self.credentials_dir()
            .join(format!("{id}.{RECORD_EXTENSION}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_paths() {
        let root = PathBuf::from("/tmp/vcwallet-paths");
        let paths = StoragePaths::new(&root);
        let wallet = root.join("vcwallet");

        assert_eq!(paths.wallet_dir(), wallet);
        assert_eq!(paths.lock_path(), wallet.join("lock"));
        assert_eq!(paths.store_dir(), wallet.join("store"));

        let layout = StoreLayout::new(paths.store_dir());
        assert_eq!(layout.metadata_path(), wallet.join("store").join("meta.bin"));
        assert_eq!(
            layout.credential_path("abc"),
            wallet.join("store").join("credentials").join("abc.bin")
        );
    }

    #[test]
    fn test_transient_dirs_are_unique_and_recognized() {
        let paths = StoragePaths::new("/tmp/vcwallet-paths");
        let staging = paths.new_staging_dir();
        let trash = paths.new_trash_dir();
        assert_ne!(staging, paths.new_staging_dir());

        for dir in [staging, trash] {
            let name = dir.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            assert!(StoragePaths::is_transient_dir_name(name));
        }
        assert!(!StoragePaths::is_transient_dir_name("store"));
    }
}
