//! The credential foyer: offered credentials wait here for the holder's
//! decision before anything is persisted.

use std::fmt;
use std::iter::FusedIterator;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, TryLockError};

use serde::Serialize;
use strum::{Display, EnumString};

use crate::credential::{CredentialRecord, VerifiableCredential};
use crate::storage::{SecureStore, StoreError};
use crate::utils::unix_now;

/// Identifier of an entry in the foyer queue. Unique per [`Foyer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PendingId(u64);

impl PendingId {
    /// Returns the numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for PendingId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for PendingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Where an offered credential stands.
///
/// `Pending` and `PendingDuplicate` are the only undecided states. Once an
/// entry leaves them it never returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ApprovalStatus {
    /// Awaiting a decision.
    Pending,
    /// Awaiting a decision; the wallet already holds an equivalent credential.
    PendingDuplicate,
    /// Persisted to the store.
    Accepted,
    /// Declined by the holder. Nothing was persisted.
    Rejected,
    /// Accepted by the holder, but persisting failed.
    Errored,
}

/// Icon category shown next to a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StatusIcon {
    /// Still waiting.
    Schedule,
    /// Did not end up in the wallet.
    Close,
    /// In the wallet.
    Done,
}

/// Color category shown with a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StatusTone {
    /// Neutral or positive.
    Success,
    /// Negative.
    Error,
}

impl ApprovalStatus {
    /// Returns `true` once a decision has been applied.
    #[must_use]
    pub const fn is_settled(self) -> bool {
        match self {
            Self::Pending | Self::PendingDuplicate => false,
            Self::Accepted | Self::Rejected | Self::Errored => true,
        }
    }

    /// Message shown when the entry has no override.
    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::Pending => "awaiting your decision",
            Self::PendingDuplicate => "you already have this credential",
            Self::Accepted => "added to your wallet",
            Self::Rejected => "declined",
            Self::Errored => "could not be added",
        }
    }

    /// Icon shown next to the entry.
    #[must_use]
    pub const fn icon(self) -> StatusIcon {
        match self {
            Self::Pending | Self::PendingDuplicate => StatusIcon::Schedule,
            Self::Rejected | Self::Errored => StatusIcon::Close,
            Self::Accepted => StatusIcon::Done,
        }
    }

    /// Color of the status line. Only rejected and errored entries use the
    /// error tone.
    #[must_use]
    pub const fn tone(self) -> StatusTone {
        match self {
            Self::Pending | Self::PendingDuplicate | Self::Accepted => StatusTone::Success,
            Self::Rejected | Self::Errored => StatusTone::Error,
        }
    }

    /// Label of the reject action while undecided. Duplicates are skipped
    /// rather than declined.
    #[must_use]
    pub const fn reject_label(self) -> Option<&'static str> {
        match self {
            Self::Pending => Some("Decline"),
            Self::PendingDuplicate => Some("Skip"),
            Self::Accepted | Self::Rejected | Self::Errored => None,
        }
    }
}

/// The holder's choice for one foyer entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Decision {
    /// Persist the credential.
    Accept,
    /// Drop the credential.
    Reject,
}

/// A credential waiting in (or settled in) the foyer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingCredential {
    /// Queue identifier.
    pub id: PendingId,
    /// The offered payload.
    pub credential: VerifiableCredential,
    /// Current status.
    pub status: ApprovalStatus,
    /// Replaces the status' default message when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_override: Option<String>,
}

impl PendingCredential {
    /// The message to display for this entry.
    #[must_use]
    pub fn message(&self) -> &str {
        self.message_override
            .as_deref()
            .unwrap_or_else(|| self.status.default_message())
    }
}

/// Decides whether an offered credential duplicates a persisted one.
pub trait DuplicatePredicate: Send + Sync {
    /// Returns `true` if `offered` is equivalent to `persisted`.
    fn is_duplicate(&self, offered: &VerifiableCredential, persisted: &VerifiableCredential)
        -> bool;
}

impl<F> DuplicatePredicate for F
where
    F: Fn(&VerifiableCredential, &VerifiableCredential) -> bool + Send + Sync,
{
    fn is_duplicate(
        &self,
        offered: &VerifiableCredential,
        persisted: &VerifiableCredential,
    ) -> bool {
        self(offered, persisted)
    }
}

/// Default equivalence.
///
/// When both credentials carry an explicit `id`, the ids decide. Otherwise
/// two credentials are duplicates if they share the issuer, the subject
/// (`credentialSubject.id`, or the whole claims object when neither has an
/// id), and the set of types.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultDuplicatePredicate;

impl DuplicatePredicate for DefaultDuplicatePredicate {
    fn is_duplicate(
        &self,
        offered: &VerifiableCredential,
        persisted: &VerifiableCredential,
    ) -> bool {
        if let (Some(a), Some(b)) = (offered.id.as_deref(), persisted.id.as_deref()) {
            return a == b;
        }
        let same_subject = match (offered.subject_id(), persisted.subject_id()) {
            (Some(a), Some(b)) => a == b,
            (None, None) => offered.credential_subject == persisted.credential_subject,
            _ => false,
        };
        offered.issuer_id() == persisted.issuer_id()
            && same_subject
            && offered.type_set() == persisted.type_set()
    }
}

/// Receives decision outcomes the foyer does not return to the caller.
pub trait DecisionObserver: Send + Sync {
    /// Called when persisting an accepted credential fails. The entry is
    /// already `Errored` when this runs.
    fn accept_failed(&self, pending: &PendingCredential, error: &StoreError);

    /// Called after every applied decision.
    fn settled(&self, _pending: &PendingCredential) {}
}

/// Writes accept failures to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl DecisionObserver for LogObserver {
    fn accept_failed(&self, pending: &PendingCredential, error: &StoreError) {
        log::warn!(
            "credential {} from {} could not be added: {error}",
            pending.id,
            pending.credential.issuer_id()
        );
    }

    fn settled(&self, pending: &PendingCredential) {
        log::debug!("foyer entry {} is now {}", pending.id, pending.status);
    }
}

struct Entry {
    id: PendingId,
    slot: Mutex<PendingCredential>,
}

/// In-memory approval queue in front of the [`SecureStore`].
pub struct Foyer {
    store: Arc<SecureStore>,
    duplicates: Box<dyn DuplicatePredicate>,
    observer: Arc<dyn DecisionObserver>,
    queue: Mutex<Vec<Arc<Entry>>>,
    next_id: AtomicU64,
}

impl fmt::Debug for Foyer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Foyer")
            .field("entries", &self.queue().len())
            .finish_non_exhaustive()
    }
}

impl Foyer {
    /// Creates an empty foyer with the default predicate and observer.
    #[must_use]
    pub fn new(store: Arc<SecureStore>) -> Self {
        Self {
            store,
            duplicates: Box::new(DefaultDuplicatePredicate),
            observer: Arc::new(LogObserver),
            queue: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Replaces the duplicate predicate.
    #[must_use]
    pub fn with_duplicate_predicate(mut self, predicate: impl DuplicatePredicate + 'static) -> Self {
        self.duplicates = Box::new(predicate);
        self
    }

    /// Replaces the decision observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn DecisionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Offers credentials to the holder.
    ///
    /// The returned iterator is lazy: each credential is classified and
    /// joins the queue only when the iterator yields it. Classification
    /// compares against the records persisted when the first item is pulled.
    /// If the store cannot be listed (typically because it is locked) every
    /// item is `Pending`.
    pub fn enqueue<I>(&self, offered: I) -> Enqueue<'_, I::IntoIter>
    where
        I: IntoIterator<Item = VerifiableCredential>,
    {
        Enqueue {
            foyer: self,
            offered: offered.into_iter(),
            persisted: None,
        }
    }

    /// Applies `decision` to entry `id`.
    ///
    /// Returns the entry's status afterwards, or `None` if `id` is unknown.
    /// A settled entry is left as is. Accept failures are reported to the
    /// observer and show up as `Errored`; they are never returned.
    pub fn decide(&self, id: PendingId, decision: Decision) -> Option<ApprovalStatus> {
        let entry = self.find(id)?;
        let mut slot = entry.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.status.is_settled() {
            return Some(slot.status);
        }

        let outcome = match decision {
            Decision::Reject => Ok(ApprovalStatus::Rejected),
            Decision::Accept => {
                let record = CredentialRecord::from_credential(slot.credential.clone(), unix_now());
                self.store
                    .add_credential(&record)
                    .map(|()| ApprovalStatus::Accepted)
            }
        };
        match outcome {
            Ok(status) => slot.status = status,
            Err(err) => {
                slot.status = ApprovalStatus::Errored;
                self.observer.accept_failed(&slot, &err);
            }
        }
        self.observer.settled(&slot);
        Some(slot.status)
    }

    /// Sets or clears the message override of entry `id`.
    ///
    /// Returns `false` if `id` is unknown.
    pub fn set_message_override(&self, id: PendingId, message: Option<String>) -> bool {
        let Some(entry) = self.find(id) else {
            return false;
        };
        entry
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .message_override = message;
        true
    }

    /// Snapshot of the whole queue, settled entries included, in offer order.
    #[must_use]
    pub fn pending(&self) -> Vec<PendingCredential> {
        let entries = self.queue().clone();
        entries.iter().map(|entry| snapshot(entry)).collect()
    }

    /// Snapshot of entry `id`.
    #[must_use]
    pub fn get(&self, id: PendingId) -> Option<PendingCredential> {
        self.find(id).map(|entry| snapshot(&entry))
    }

    /// Drops settled entries from the queue. Entries with a decision in
    /// flight are kept.
    pub fn clear_settled(&self) {
        self.queue().retain(|entry| match entry.slot.try_lock() {
            Ok(slot) => !slot.status.is_settled(),
            Err(TryLockError::Poisoned(poisoned)) => !poisoned.into_inner().status.is_settled(),
            Err(TryLockError::WouldBlock) => true,
        });
    }

    fn find(&self, id: PendingId) -> Option<Arc<Entry>> {
        self.queue().iter().find(|entry| entry.id == id).cloned()
    }

    fn queue(&self) -> std::sync::MutexGuard<'_, Vec<Arc<Entry>>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit(
        &self,
        credential: VerifiableCredential,
        persisted: Option<&[CredentialRecord]>,
    ) -> PendingCredential {
        let duplicate = persisted.is_some_and(|records| {
            records
                .iter()
                .any(|record| self.duplicates.is_duplicate(&credential, &record.credential))
        });
        let pending = PendingCredential {
            id: PendingId(self.next_id.fetch_add(1, Ordering::Relaxed)),
            credential,
            status: if duplicate {
                ApprovalStatus::PendingDuplicate
            } else {
                ApprovalStatus::Pending
            },
            message_override: None,
        };
        self.queue().push(Arc::new(Entry {
            id: pending.id,
            slot: Mutex::new(pending.clone()),
        }));
        pending
    }
}

fn snapshot(entry: &Entry) -> PendingCredential {
    entry
        .slot
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Iterator returned by [`Foyer::enqueue`].
pub struct Enqueue<'a, I> {
    foyer: &'a Foyer,
    offered: I,
    /// `None` until the first pull; `Some(None)` when the store was not
    /// listable.
    persisted: Option<Option<Vec<CredentialRecord>>>,
}

impl<I> Iterator for Enqueue<'_, I>
where
    I: Iterator<Item = VerifiableCredential>,
{
    type Item = PendingCredential;

    fn next(&mut self) -> Option<Self::Item> {
        let credential = self.offered.next()?;
        let foyer = self.foyer;
        let persisted = self.persisted.get_or_insert_with(|| {
            match foyer.store.get_all_credentials() {
                Ok(records) => Some(records),
                Err(err) => {
                    log::debug!("duplicate check skipped: {err}");
                    None
                }
            }
        });
        Some(foyer.admit(credential, persisted.as_deref()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.offered.size_hint()
    }
}

impl<I> FusedIterator for Enqueue<'_, I> where I: FusedIterator<Item = VerifiableCredential> {}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use secrecy::SecretString;
    use test_case::test_case;

    use super::*;
    use crate::credential::fixtures::badge;
    use crate::identity::DidMinter;
    use crate::storage::{KdfParams, StoragePaths};

    fn unlocked_store(root: &std::path::Path) -> Arc<SecureStore> {
        let store = SecureStore::open(StoragePaths::new(root), KdfParams::insecure_fast())
            .expect("open");
        store
            .initialize(&SecretString::from("pw1".to_string()), &DidMinter)
            .expect("initialize");
        Arc::new(store)
    }

    #[derive(Default)]
    struct RecordingObserver {
        failures: StdMutex<Vec<(PendingId, String)>>,
    }

    impl DecisionObserver for RecordingObserver {
        fn accept_failed(&self, pending: &PendingCredential, error: &StoreError) {
            self.failures
                .lock()
                .expect("lock")
                .push((pending.id, error.to_string()));
        }
    }

    #[test_case(ApprovalStatus::Pending, StatusIcon::Schedule, StatusTone::Success)]
    #[test_case(ApprovalStatus::PendingDuplicate, StatusIcon::Schedule, StatusTone::Success)]
    #[test_case(ApprovalStatus::Accepted, StatusIcon::Done, StatusTone::Success)]
    #[test_case(ApprovalStatus::Rejected, StatusIcon::Close, StatusTone::Error)]
    #[test_case(ApprovalStatus::Errored, StatusIcon::Close, StatusTone::Error)]
    fn test_status_presentation(status: ApprovalStatus, icon: StatusIcon, tone: StatusTone) {
        assert_eq!(status.icon(), icon);
        assert_eq!(status.tone(), tone);
        assert!(!status.default_message().is_empty());
        assert_eq!(status.reject_label().is_some(), !status.is_settled());
    }

    #[test]
    fn test_status_and_decision_strings() {
        assert_eq!(ApprovalStatus::PendingDuplicate.to_string(), "pending_duplicate");
        assert_eq!("accept".parse::<Decision>().expect("parse"), Decision::Accept);
        assert!("maybe".parse::<Decision>().is_err());
    }

    #[test]
    fn test_message_override_wins() {
        let mut pending = PendingCredential {
            id: PendingId(1),
            credential: badge("did:web:a", "s", "A"),
            status: ApprovalStatus::Pending,
            message_override: None,
        };
        assert_eq!(pending.message(), "awaiting your decision");
        pending.message_override = Some("from your university".to_string());
        assert_eq!(pending.message(), "from your university");
    }

    #[test]
    fn test_default_predicate() {
        let predicate = DefaultDuplicatePredicate;
        let a = badge("did:web:a", "did:key:s", "Rust");
        assert!(predicate.is_duplicate(&a, &a.clone()));
        assert!(!predicate.is_duplicate(&a, &badge("did:web:b", "did:key:s", "Rust")));
        assert!(!predicate.is_duplicate(&a, &badge("did:web:a", "did:key:t", "Rust")));

        let mut with_id = a.clone();
        with_id.id = Some("urn:uuid:1".to_string());
        let mut other_id = a.clone();
        other_id.id = Some("urn:uuid:2".to_string());
        assert!(!predicate.is_duplicate(&with_id, &other_id));
        assert!(predicate.is_duplicate(&with_id, &a));
    }

    #[test]
    fn test_enqueue_is_lazy_and_ordered() {
        let root = tempfile::tempdir().expect("tempdir");
        let foyer = Foyer::new(unlocked_store(root.path()));
        let mut offered = foyer.enqueue(vec![
            badge("did:web:a", "s", "First"),
            badge("did:web:a", "s", "Second"),
        ]);
        assert!(foyer.pending().is_empty());

        let first = offered.next().expect("first");
        assert_eq!(foyer.pending().len(), 1);
        let second = offered.next().expect("second");
        assert!(offered.next().is_none());

        assert!(first.id < second.id);
        let titles: Vec<_> = foyer
            .pending()
            .iter()
            .map(|p| p.credential.title().unwrap_or_default().to_string())
            .collect();
        assert_eq!(titles, vec!["First", "Second"]);
    }

    #[test]
    fn test_accept_then_reoffer_is_duplicate() {
        let root = tempfile::tempdir().expect("tempdir");
        let store = unlocked_store(root.path());
        let foyer = Foyer::new(Arc::clone(&store));

        let first: Vec<_> = foyer.enqueue([badge("did:web:a", "s", "A")]).collect();
        assert_eq!(
            foyer.decide(first[0].id, Decision::Accept),
            Some(ApprovalStatus::Accepted)
        );
        assert_eq!(store.get_all_credentials().expect("list").len(), 1);

        let again: Vec<_> = foyer.enqueue([badge("did:web:a", "s", "A")]).collect();
        assert_eq!(again[0].status, ApprovalStatus::PendingDuplicate);
        assert_eq!(again[0].message(), "you already have this credential");
    }

    #[test]
    fn test_reject_persists_nothing_and_settled_is_final() {
        let root = tempfile::tempdir().expect("tempdir");
        let store = unlocked_store(root.path());
        let foyer = Foyer::new(Arc::clone(&store));
        let id = foyer
            .enqueue([badge("did:web:a", "s", "A")])
            .next()
            .expect("item")
            .id;

        assert_eq!(foyer.decide(id, Decision::Reject), Some(ApprovalStatus::Rejected));
        assert_eq!(foyer.decide(id, Decision::Accept), Some(ApprovalStatus::Rejected));
        assert!(store.get_all_credentials().expect("list").is_empty());
        assert_eq!(foyer.decide(PendingId(999), Decision::Accept), None);
    }

    #[test]
    fn test_accept_while_locked_errors_and_notifies() {
        let root = tempfile::tempdir().expect("tempdir");
        let store = unlocked_store(root.path());
        store.lock();
        let observer = Arc::new(RecordingObserver::default());
        let foyer = Foyer::new(Arc::clone(&store)).with_observer(observer.clone());

        let pending = foyer
            .enqueue([badge("did:web:a", "s", "A")])
            .next()
            .expect("item");
        assert_eq!(pending.status, ApprovalStatus::Pending);
        assert_eq!(
            foyer.decide(pending.id, Decision::Accept),
            Some(ApprovalStatus::Errored)
        );

        let failures = observer.failures.lock().expect("lock");
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, pending.id);
        assert!(failures[0].1.contains("locked"));
    }

    #[test]
    fn test_custom_predicate_and_clear_settled() {
        let root = tempfile::tempdir().expect("tempdir");
        let store = unlocked_store(root.path());
        let foyer = Foyer::new(Arc::clone(&store)).with_duplicate_predicate(
            |offered: &VerifiableCredential, persisted: &VerifiableCredential| {
                offered.issuer_id() == persisted.issuer_id()
            },
        );

        let accepted = foyer.enqueue([badge("did:web:a", "s", "A")]).next().expect("item");
        foyer.decide(accepted.id, Decision::Accept);

        let offered: Vec<_> = foyer
            .enqueue([badge("did:web:a", "other", "B"), badge("did:web:b", "s", "C")])
            .collect();
        assert_eq!(offered[0].status, ApprovalStatus::PendingDuplicate);
        assert_eq!(offered[1].status, ApprovalStatus::Pending);

        assert!(foyer.set_message_override(offered[1].id, Some("new issuer".to_string())));
        assert_eq!(foyer.get(offered[1].id).expect("entry").message(), "new issuer");

        foyer.clear_settled();
        let remaining: Vec<_> = foyer.pending().iter().map(|p| p.id).collect();
        assert_eq!(remaining, vec![offered[0].id, offered[1].id]);
        assert!(foyer.get(accepted.id).is_none());
    }
}
