//! Core of a local verifiable-credential wallet.
//!
//! - [`storage::SecureStore`]: passphrase-gated encrypted store holding the
//!   wallet identity and accepted credentials.
//! - [`identity`]: `did:key` identity minted once per store.
//! - [`foyer::Foyer`]: approval queue for offered credentials.
//! - [`controller::WalletController`]: lifecycle surface for a UI or CLI.
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod config;
pub use config::{ConfigError, WalletConfig};

pub mod controller;
pub use controller::{WalletController, WalletLifecycleState};

mod credential;
pub use credential::*;

pub mod foyer;
pub use foyer::{ApprovalStatus, Decision, Foyer, PendingCredential, PendingId};

pub mod identity;
pub use identity::{DidMinter, Identity, IdentityMinter};

/// Bridge from the `log` facade to a host-provided logger.
pub mod logger;

pub mod registry;
pub use registry::{IssuerEntry, IssuerRegistry};

pub mod storage;
pub use storage::{KdfParams, SecureStore, StorageResult, StoragePaths, StoreError};

mod utils;
pub use utils::unix_now;
