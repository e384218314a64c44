//! JSON views printed by the CLI.

use serde::Serialize;
use vcwallet_core::{
    foyer::{StatusIcon, StatusTone},
    ApprovalStatus, CredentialRecord, Identity, IssuerRegistry, PendingCredential, PendingId,
};

/// One persisted credential as listed by `vcwallet list`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialView {
    pub id: String,
    pub title: Option<String>,
    pub issuer: String,
    pub issuer_name: Option<String>,
    pub types: Vec<String>,
    pub added_at: u64,
}

impl CredentialView {
    pub fn new(record: &CredentialRecord, registry: &IssuerRegistry) -> Self {
        let credential = &record.credential;
        Self {
            id: record.id.to_string(),
            title: credential.title().map(str::to_string),
            issuer: credential.issuer_id().to_string(),
            issuer_name: credential.issuer_display_name(registry).map(str::to_string),
            types: credential.types.clone(),
            added_at: record.added_at,
        }
    }
}

/// One foyer entry as printed by `vcwallet offer`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingView {
    pub pending_id: PendingId,
    pub title: Option<String>,
    pub issuer_name: Option<String>,
    pub status: ApprovalStatus,
    pub message: String,
    pub icon: StatusIcon,
    pub tone: StatusTone,
}

impl PendingView {
    pub fn new(pending: &PendingCredential, registry: &IssuerRegistry) -> Self {
        let credential = &pending.credential;
        Self {
            pending_id: pending.id,
            title: credential.title().map(str::to_string),
            issuer_name: credential.issuer_display_name(registry).map(str::to_string),
            status: pending.status,
            message: pending.message().to_string(),
            icon: pending.status.icon(),
            tone: pending.status.tone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityView {
    pub did: String,
    pub verification_method: String,
    pub created_at: u64,
}

impl From<&Identity> for IdentityView {
    fn from(identity: &Identity) -> Self {
        Self {
            did: identity.did().to_string(),
            verification_method: identity.verification_method(),
            created_at: identity.created_at(),
        }
    }
}

/// Prints `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> eyre::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use vcwallet_core::VerifiableCredential;

    use super::*;

    #[test]
    fn test_credential_view_uses_registry_name() {
        let credential = VerifiableCredential::from_json(
            r#"{
                "type": ["VerifiableCredential"],
                "issuer": "did:web:c21u.gatech.edu",
                "credentialSubject": {"hasCredential": {"name": "Data Science"}}
            }"#,
        )
        .expect("parse");
        let record = CredentialRecord::from_credential(credential, 42);
        let view = CredentialView::new(&record, &IssuerRegistry::builtin());

        let json = serde_json::to_value(&view).expect("json");
        assert_eq!(json["title"], "Data Science");
        assert_eq!(
            json["issuerName"],
            "Georgia Tech Center for 21st Century Universities"
        );
        assert_eq!(json["addedAt"], 42);
    }
}
