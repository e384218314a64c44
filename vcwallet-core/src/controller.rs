//! Wallet controller: the surface a presentation layer drives.
//!
//! The controller owns the lifecycle state the UI renders and the cached
//! list of persisted credentials. State only changes through the methods
//! below, after the store has confirmed the operation.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use secrecy::SecretString;
use serde::Serialize;

use crate::credential::{CredentialId, CredentialRecord};
use crate::foyer::{ApprovalStatus, Decision, Foyer, PendingId};
use crate::identity::{DidMinter, Identity, IdentityMinter};
use crate::storage::{KdfParams, SecureStore, StorageResult, StoragePaths, StoreError};

/// Lifecycle flags as last observed by the controller.
///
/// `None` means the flag has not been determined yet, which is the state
/// before the first [`WalletController::poll`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletLifecycleState {
    /// Whether a store exists on disk.
    pub is_initialized: Option<bool>,
    /// Whether the store key is installed.
    pub is_unlocked: Option<bool>,
    /// Set by a successful reset. Only `initialize` clears it.
    pub needs_restart: bool,
}

impl WalletLifecycleState {
    /// Only an initialized store can be unlocked. A conflict is resolved by
    /// clearing `is_unlocked`; `is_initialized` is never inferred from it.
    const fn normalized(mut self) -> Self {
        if matches!(self.is_unlocked, Some(true)) && !matches!(self.is_initialized, Some(true)) {
            self.is_unlocked = Some(false);
        }
        if matches!(self.is_initialized, Some(false)) {
            self.is_unlocked = Some(false);
        }
        self
    }
}

#[derive(Default)]
struct ControllerState {
    lifecycle: WalletLifecycleState,
    credentials: Vec<CredentialRecord>,
}

/// Orchestrates the secure store and the foyer for one wallet.
pub struct WalletController {
    store: Arc<SecureStore>,
    foyer: Foyer,
    minter: Box<dyn IdentityMinter>,
    state: Mutex<ControllerState>,
}

impl std::fmt::Debug for WalletController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletController")
            .field("store", &self.store)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl WalletController {
    /// Builds a controller over `store` with the default minter and foyer.
    #[must_use]
    pub fn new(store: Arc<SecureStore>) -> Self {
        Self {
            foyer: Foyer::new(Arc::clone(&store)),
            store,
            minter: Box::new(DidMinter),
            state: Mutex::new(ControllerState::default()),
        }
    }

    /// Opens the wallet rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the wallet lock file cannot be opened.
    pub fn open(root: impl AsRef<Path>, kdf: KdfParams) -> StorageResult<Self> {
        let store = SecureStore::open(StoragePaths::new(root), kdf)?;
        Ok(Self::new(Arc::new(store)))
    }

    /// Replaces the identity minter used by [`Self::initialize`].
    #[must_use]
    pub fn with_minter(mut self, minter: impl IdentityMinter + 'static) -> Self {
        self.minter = Box::new(minter);
        self
    }

    /// Replaces the foyer. It should wrap the same store as the controller.
    #[must_use]
    pub fn with_foyer(mut self, foyer: Foyer) -> Self {
        self.foyer = foyer;
        self
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &Arc<SecureStore> {
        &self.store
    }

    /// The approval queue.
    #[must_use]
    pub const fn foyer(&self) -> &Foyer {
        &self.foyer
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WalletLifecycleState {
        self.inner().lifecycle
    }

    /// Persisted credentials as of the last refresh.
    #[must_use]
    pub fn credentials(&self) -> Vec<CredentialRecord> {
        self.inner().credentials.clone()
    }

    /// Re-reads the lifecycle flags from the store.
    pub fn poll(&self) -> WalletLifecycleState {
        let mut state = self.inner();
        state.lifecycle = WalletLifecycleState {
            is_initialized: Some(self.store.is_initialized()),
            is_unlocked: Some(self.store.is_unlocked()),
            needs_restart: state.lifecycle.needs_restart,
        }
        .normalized();
        state.lifecycle
    }

    /// Creates the store and the wallet identity, leaving the wallet unlocked.
    ///
    /// # Errors
    ///
    /// Propagates store errors, e.g. [`StoreError::AlreadyInitialized`].
    pub fn initialize(&self, passphrase: &SecretString) -> StorageResult<()> {
        let mut state = self.inner();
        self.store.initialize(passphrase, self.minter.as_ref())?;
        state.lifecycle = WalletLifecycleState {
            is_initialized: Some(true),
            is_unlocked: Some(true),
            needs_restart: false,
        };
        state.credentials.clear();
        Ok(())
    }

    /// Unlocks the wallet, then loads the credential list.
    ///
    /// A failed unlock does not touch the lifecycle state. Loading the list
    /// is not part of the unlock: if it fails the wallet stays unlocked with
    /// an empty cached list, and the failure is logged. Call
    /// [`Self::refresh_credential_list`] to get the error itself.
    ///
    /// # Errors
    ///
    /// Propagates store errors, e.g. [`StoreError::InvalidPassphrase`].
    pub fn unlock(&self, passphrase: &SecretString) -> StorageResult<()> {
        {
            let mut state = self.inner();
            Self::ensure_ready(&state)?;
            self.store.unlock(passphrase)?;
            state.lifecycle.is_initialized = Some(true);
            state.lifecycle.is_unlocked = Some(true);
            state.credentials.clear();
        }
        if let Err(err) = self.refresh_credential_list() {
            log::warn!("wallet unlocked but the credential list could not be loaded: {err}");
        }
        Ok(())
    }

    /// Locks the wallet and forgets the cached credential list.
    pub fn lock(&self) {
        let mut state = self.inner();
        self.store.lock();
        state.lifecycle.is_unlocked = Some(false);
        state.credentials.clear();
    }

    /// Destroys the store. Afterwards only `initialize` is accepted.
    ///
    /// # Errors
    ///
    /// Propagates store errors; on error the lifecycle state is unchanged.
    pub fn reset(&self) -> StorageResult<()> {
        let mut state = self.inner();
        Self::ensure_ready(&state)?;
        self.store.reset()?;
        state.lifecycle = WalletLifecycleState {
            is_initialized: Some(false),
            is_unlocked: Some(false),
            needs_restart: true,
        };
        state.credentials.clear();
        Ok(())
    }

    /// Re-reads every persisted credential into the cached list.
    ///
    /// # Errors
    ///
    /// Propagates store errors, e.g. [`StoreError::StoreLocked`].
    pub fn refresh_credential_list(&self) -> StorageResult<Vec<CredentialRecord>> {
        Self::ensure_ready(&self.inner())?;
        let records = self.store.get_all_credentials()?;
        self.inner().credentials.clone_from(&records);
        Ok(records)
    }

    /// Applies a decision to a foyer entry and refreshes the credential list
    /// once an accept is persisted.
    ///
    /// Returns `None` for an unknown entry. Every decision on a pending
    /// entry settles it: an accept the store refuses (locked, or reset and
    /// awaiting a restart) becomes [`ApprovalStatus::Errored`]. A refresh
    /// failure after a persisted accept is logged and leaves the status
    /// `Accepted`.
    pub fn decide(&self, id: PendingId, decision: Decision) -> Option<ApprovalStatus> {
        let status = self.foyer.decide(id, decision);
        if status == Some(ApprovalStatus::Accepted) && decision == Decision::Accept {
            if let Err(err) = self.refresh_credential_list() {
                log::warn!("credential {id} accepted but the list could not be refreshed: {err}");
            }
        }
        status
    }

    /// Deletes a persisted credential and refreshes the list. Unknown ids
    /// are a no-op.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub fn delete_credential(&self, id: &CredentialId) -> StorageResult<()> {
        Self::ensure_ready(&self.inner())?;
        self.store.delete_credential(id)?;
        self.refresh_credential_list()?;
        Ok(())
    }

    /// The wallet identity.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub fn identity(&self) -> StorageResult<Identity> {
        Self::ensure_ready(&self.inner())?;
        self.store.identity()
    }

    const fn ensure_ready(state: &ControllerState) -> StorageResult<()> {
        if state.lifecycle.needs_restart {
            return Err(StoreError::NotInitialized);
        }
        Ok(())
    }

    fn inner(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
