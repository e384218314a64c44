//! Passphrase-gated encrypted storage for the wallet.
//!
//! Everything lives under `<root>/vcwallet/`:
//!
//! ```text
//! lock                      cross-process advisory lock
//! store/meta.bin            salt, KDF parameters, sealed canary
//! store/identity.bin        sealed wallet identity
//! store/credentials/*.bin   one sealed record per credential
//! ```
//!
//! Records are sealed with XChaCha20-Poly1305 under a key derived from the
//! passphrase with Argon2id. The associated data binds each record to its
//! kind and id, so files cannot be swapped between slots.

mod crypto;
mod envelope;
pub mod error;
mod files;
pub mod lock;
pub mod paths;
mod store;

pub use crypto::KdfParams;
pub use error::{StorageResult, StoreError};
pub use lock::{WalletLock, WalletLockGuard};
pub use paths::{StoragePaths, StoreLayout};
pub use store::SecureStore;
