//! Optional TOML configuration for a wallet.
//!
//! ```toml
//! root = "/var/lib/vcwallet"
//!
//! [kdf]
//! memory_kib = 19456
//! iterations = 2
//! parallelism = 1
//!
//! [issuers."did:web:example.edu"]
//! name = "Example University"
//! location = "Somewhere"
//! url = "https://example.edu"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::{IssuerEntry, IssuerRegistry};
use crate::storage::KdfParams;

/// Errors raised while loading a [`WalletConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read config {path}: {source}")]
    Io {
        /// Path of the config file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid TOML for this schema.
    #[error("invalid config {path}: {source}")]
    Parse {
        /// Path of the config file.
        path: PathBuf,
        /// The TOML error.
        #[source]
        source: toml::de::Error,
    },
}

/// Wallet settings. Every field is optional in the file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WalletConfig {
    /// Storage root; the wallet lives in `<root>/vcwallet`. Callers pick a
    /// platform default when unset.
    pub root: Option<PathBuf>,
    /// Argon2id cost for newly created stores.
    pub kdf: KdfParams,
    /// Extra known issuers, merged over the builtin registry.
    pub issuers: BTreeMap<String, IssuerEntry>,
}

impl WalletConfig {
    /// Reads a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parses a config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns the TOML error if the text does not match the schema.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// The builtin issuer registry with configured issuers applied.
    #[must_use]
    pub fn registry(&self) -> IssuerRegistry {
        let mut registry = IssuerRegistry::builtin();
        for (did, entry) in &self.issuers {
            registry.insert(did.clone(), entry.clone());
        }
        registry
    }
}
