//! Known-issuer registry used to label credentials in the approval UI.
//!
//! The registry is advisory. It never decides whether a credential may be
//! accepted; it only supplies a display name and location when the
//! credential itself does not carry one.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Timestamp of the first builtin registry snapshot.
pub const BUILTIN_CREATED: &str = "2020-12-02T02:32:16+0000";
/// Timestamp of the latest builtin registry snapshot.
pub const BUILTIN_UPDATED: &str = "2021-12-15T18:41:36+0000";

/// Display information for one issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerEntry {
    /// Human readable issuer name.
    pub name: String,
    /// Free-form location, e.g. `Cambridge, MA, USA`.
    pub location: String,
    /// Public homepage.
    pub url: String,
}

impl IssuerEntry {
    fn new(name: &str, location: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            location: location.to_string(),
            url: url.to_string(),
        }
    }
}

/// Lookup table keyed by issuer DID.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerRegistry {
    entries: HashMap<String, IssuerEntry>,
}

impl IssuerRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The issuers shipped with the wallet.
    #[must_use]
    pub fn builtin() -> Self {
        const CAMBRIDGE: &str = "Cambridge, MA, USA";
        let mut registry = Self::new();
        registry.insert(
            "did:key:z6Mktpn6cXks1PBKLMgZH2VaahvCtBMF6K8eCa7HzrnuYLZv",
            IssuerEntry::new(
                "Example University 1 (DCC test-only issuer)",
                CAMBRIDGE,
                "https://openlearning.mit.edu",
            ),
        );
        registry.insert(
            "did:key:z6MkhVTX9BF3NGYX6cc7jWpbNnR7cAjH8LUffabZP8Qu4ysC",
            IssuerEntry::new(
                "DCC Playground",
                CAMBRIDGE,
                "https://digitalcredentials.github.io/playground",
            ),
        );
        registry.insert(
            "did:web:digitalcredentials.odl.mit.edu",
            IssuerEntry::new("MIT xPRO", CAMBRIDGE, "https://xpro.mit.edu"),
        );
        for did in [
            "did:web:digitalcredentials-rc.odl.mit.edu",
            "did:web:digitalcredentials-rc.mit.edu",
        ] {
            registry.insert(
                did,
                IssuerEntry::new("MIT xPRO (RC)", CAMBRIDGE, "https://rc.xpro.mit.edu"),
            );
        }
        registry.insert(
            "did:web:c21u.gatech.edu",
            IssuerEntry::new(
                "Georgia Tech Center for 21st Century Universities",
                "Atlanta, GA, USA",
                "https://c21u.gatech.edu",
            ),
        );
        registry.insert(
            "did:key:z6Mknx219amLmnD2dPDg4iDRsgERWhj2SoQxefv6XutdeQRh",
            IssuerEntry::new("Badgr", "Eugene, OR, USA", "https://badgr.com"),
        );
        registry
    }

    /// Adds or replaces the entry for `did`.
    pub fn insert(&mut self, did: impl Into<String>, entry: IssuerEntry) {
        self.entries.insert(did.into(), entry);
    }

    /// Returns the entry for `did`, if known.
    #[must_use]
    pub fn lookup(&self, did: &str) -> Option<&IssuerEntry> {
        self.entries.get(did)
    }

    /// Number of known issuers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no issuer is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
