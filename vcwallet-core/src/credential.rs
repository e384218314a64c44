//! Verifiable credential payloads and persisted credential records.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::registry::IssuerRegistry;

/// Identifier of a persisted credential record.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialId(Uuid);

impl CredentialId {
    /// Generates a new random credential ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the hyphenless lowercase form used for file names.
    #[must_use]
    pub fn to_simple_string(&self) -> String {
        self.0.simple().to_string()
    }
}

impl fmt::Debug for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CredentialId({})", self.0)
    }
}

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for CredentialId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// The `issuer` member: either a bare identifier or an object with an `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Issuer {
    /// `"issuer": "did:web:example.edu"`
    Id(String),
    /// `"issuer": { "id": "did:web:example.edu", "name": "Example" }`
    Object {
        /// Issuer identifier.
        id: String,
        /// Human readable name, if the issuer supplied one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        /// Remaining members (image, url, ...), kept verbatim.
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
}

impl Issuer {
    /// Returns the issuer identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Id(id) | Self::Object { id, .. } => id,
        }
    }

    /// Returns the name embedded in the credential, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Id(_) => None,
            Self::Object { name, .. } => name.as_deref(),
        }
    }
}

/// A verifiable credential document as handed over by ingestion.
///
/// Only the members the wallet reasons about are typed; every other member
/// is kept in `extra` so the stored payload is the payload that was offered.
/// Well-formedness (proofs, schemas) is checked by an external verifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiableCredential {
    /// Explicit credential identifier, when the format provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Credential types (`type` accepts a single string or an array).
    #[serde(
        rename = "type",
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub types: Vec<String>,
    /// The issuing party.
    pub issuer: Issuer,
    /// Subject claims.
    pub credential_subject: Value,
    /// Every other member of the document.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VerifiableCredential {
    /// Parses a credential from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the document lacks `issuer` or `credentialSubject`
    /// or is not valid JSON.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Serializes the credential back to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if a retained member cannot be serialized.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Returns the issuer identifier.
    #[must_use]
    pub fn issuer_id(&self) -> &str {
        self.issuer.id()
    }

    /// Returns the subject identifier (`credentialSubject.id`), if present.
    #[must_use]
    pub fn subject_id(&self) -> Option<&str> {
        self.credential_subject.get("id").and_then(Value::as_str)
    }

    /// Returns the credential types as a set, order-insensitive.
    #[must_use]
    pub fn type_set(&self) -> BTreeSet<&str> {
        self.types.iter().map(String::as_str).collect()
    }

    /// Returns the achievement title (`credentialSubject.hasCredential.name`).
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.credential_subject
            .get("hasCredential")
            .and_then(|c| c.get("name"))
            .and_then(Value::as_str)
    }

    /// Returns the issuer name: embedded name first, then the registry.
    #[must_use]
    pub fn issuer_display_name<'a>(&'a self, registry: &'a IssuerRegistry) -> Option<&'a str> {
        self.issuer.name().or_else(|| {
            registry
                .lookup(self.issuer_id())
                .map(|entry| entry.name.as_str())
        })
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(one) => vec![one],
        OneOrMany::Many(many) => many,
    })
}

/// A credential persisted in the secure store.
///
/// Records are immutable: they are created on acceptance and only ever
/// deleted, never edited in place.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    /// Stable record identifier.
    pub id: CredentialId,
    /// The credential exactly as accepted.
    pub credential: VerifiableCredential,
    /// Seconds since the Unix epoch at which the record was created.
    pub added_at: u64,
}

impl CredentialRecord {
    /// Wraps an accepted credential into a new record with a fresh id.
    #[must_use]
    pub fn from_credential(credential: VerifiableCredential, now: u64) -> Self {
        Self {
            id: CredentialId::generate(),
            credential,
            added_at: now,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::VerifiableCredential;

    /// A minimal Open Badges style credential.
    pub fn badge(issuer: &str, subject: &str, name: &str) -> VerifiableCredential {
        VerifiableCredential::from_json(&format!(
            r#"{{
                "@context": ["https://www.w3.org/2018/credentials/v1"],
                "type": ["VerifiableCredential", "OpenBadgeCredential"],
                "issuer": {{ "id": "{issuer}", "name": "Issuer of {name}" }},
                "issuanceDate": "2021-01-01T00:00:00Z",
                "credentialSubject": {{
                    "id": "{subject}",
                    "hasCredential": {{ "name": "{name}" }}
                }}
            }}"#
        ))
        .expect("fixture credential")
    }
}
