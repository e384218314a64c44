//! Common test utilities shared across integration tests.
#![allow(dead_code, missing_docs)]

use std::path::Path;
use std::sync::Arc;

use secrecy::SecretString;
use tempfile::TempDir;
use vcwallet_core::{
    Identity, IdentityMinter, KdfParams, SecureStore, StorageResult, StoragePaths, StoreError,
    VerifiableCredential, WalletController,
};

pub fn temp_root() -> TempDir {
    tempfile::tempdir().expect("create temp root")
}

pub fn passphrase(value: &str) -> SecretString {
    SecretString::from(value.to_string())
}

pub fn open_store(root: &Path) -> Arc<SecureStore> {
    Arc::new(SecureStore::open(StoragePaths::new(root), KdfParams::insecure_fast()).expect("open"))
}

pub fn open_wallet(root: &Path) -> WalletController {
    WalletController::open(root, KdfParams::insecure_fast()).expect("open wallet")
}

/// A minter that always fails, for rollback tests.
pub struct BrokenMinter;

impl IdentityMinter for BrokenMinter {
    fn mint(&self, _now: u64) -> StorageResult<Identity> {
        Err(StoreError::Identity("hardware RNG offline".to_string()))
    }
}

/// An Open Badges style credential from `issuer` about `subject`.
pub fn credential(issuer: &str, subject: &str, achievement: &str) -> VerifiableCredential {
    VerifiableCredential::from_json(&format!(
        r#"{{
            "@context": [
                "https://www.w3.org/2018/credentials/v1",
                "https://w3id.org/dcc/v1"
            ],
            "type": ["VerifiableCredential", "Assertion"],
            "issuer": {{ "id": "{issuer}", "type": "Issuer" }},
            "issuanceDate": "2021-05-01T00:00:00Z",
            "credentialSubject": {{
                "id": "{subject}",
                "hasCredential": {{ "type": ["Course"], "name": "{achievement}" }}
            }},
            "proof": {{ "type": "Ed25519Signature2018", "jws": "eyJhbGciOiJFZERTQSJ9..sig" }}
        }}"#
    ))
    .expect("test credential")
}
