//! Deterministic in-memory backend.
//!
//! Used for local development (`BACKEND_MODE=memory`) and tests. Every
//! capability can be made to fail with [`Fault`], every call is counted, and
//! live listeners are tracked so tests can check that subscriptions are
//! released exactly once.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use leadline_core::{CollectionPath, DocumentPath, Fields, RecordId};
use tokio::sync::mpsc;

use super::{
    Backend, BackendError, DocumentEvent, DocumentSnapshot, Principal, SetOptions, Subscription,
};

/// Injected failure for one capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Fail the next `n` calls, then succeed.
    Times(u32, BackendError),
    /// Fail every call.
    Always(BackendError),
}

impl Fault {
    #[must_use]
    pub const fn times(n: u32, error: BackendError) -> Self {
        Self::Times(n, error)
    }

    #[must_use]
    pub const fn always(error: BackendError) -> Self {
        Self::Always(error)
    }
}

/// Consume one failure from `slot`, if any is armed.
fn trip(slot: &mut Option<Fault>) -> Option<BackendError> {
    match slot.take() {
        None => None,
        Some(Fault::Always(error)) => {
            *slot = Some(Fault::Always(error.clone()));
            Some(error)
        }
        Some(Fault::Times(0, _)) => None,
        Some(Fault::Times(n, error)) => {
            if n > 1 {
                *slot = Some(Fault::Times(n - 1, error.clone()));
            }
            Some(error)
        }
    }
}

#[derive(Debug, Default)]
struct Faults {
    sign_in: Option<Fault>,
    get_document: Option<Fault>,
    set_document: Option<Fault>,
    add_record: Option<Fault>,
    subscribe: Option<BackendError>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Calls {
    sign_in: usize,
    get_document: usize,
    set_document: usize,
    add_record: usize,
}

#[derive(Default)]
struct State {
    principal: Option<Principal>,
    tokens: BTreeMap<String, String>,
    documents: BTreeMap<DocumentPath, DocumentSnapshot>,
    collections: BTreeMap<CollectionPath, Vec<(RecordId, Fields)>>,
    auth_listeners: BTreeMap<u64, mpsc::UnboundedSender<Option<Principal>>>,
    document_listeners: BTreeMap<u64, (DocumentPath, mpsc::UnboundedSender<DocumentEvent>)>,
    next_listener: u64,
    next_revision: u64,
    next_uid: u64,
    next_record: u64,
    released: usize,
    faults: Faults,
    calls: Calls,
}

impl State {
    fn listener_id(&mut self) -> u64 {
        self.next_listener += 1;
        self.next_listener
    }

    fn revision(&mut self) -> u64 {
        self.next_revision += 1;
        self.next_revision
    }

    fn notify_auth(&mut self) {
        let principal = self.principal.clone();
        self.auth_listeners
            .retain(|_, tx| tx.send(principal.clone()).is_ok());
    }

    fn notify_document(&mut self, path: &DocumentPath, event: &DocumentEvent) {
        self.document_listeners
            .retain(|_, (watched, tx)| watched != path || tx.send(event.clone()).is_ok());
    }

    fn sign_in(&mut self, principal: Principal) -> Principal {
        self.principal = Some(principal.clone());
        self.notify_auth();
        principal
    }

    fn write_document(&mut self, path: &DocumentPath, fields: Fields) {
        let snapshot = DocumentSnapshot {
            fields,
            revision: self.revision(),
        };
        self.documents.insert(path.clone(), snapshot.clone());
        self.notify_document(path, &DocumentEvent::Snapshot(snapshot));
    }
}

/// In-process [`Backend`] implementation.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `principal` already signed in.
    #[must_use]
    pub fn with_principal(self, principal: Principal) -> Self {
        self.lock().principal = Some(principal);
        self
    }

    /// Accept `token` for [`Backend::sign_in_with_token`], signing in as `uid`.
    #[must_use]
    pub fn with_token(self, token: impl Into<String>, uid: impl Into<String>) -> Self {
        self.lock().tokens.insert(token.into(), uid.into());
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Fault injection
    // =========================================================================

    /// Make anonymous and token sign-in fail.
    pub fn fail_sign_in(&self, fault: Fault) {
        self.lock().faults.sign_in = Some(fault);
    }

    /// Make one-off document reads fail.
    pub fn fail_get_document(&self, fault: Fault) {
        self.lock().faults.get_document = Some(fault);
    }

    /// Make document writes fail.
    pub fn fail_set_document(&self, fault: Fault) {
        self.lock().faults.set_document = Some(fault);
    }

    /// Make record appends fail.
    pub fn fail_add_record(&self, fault: Fault) {
        self.lock().faults.add_record = Some(fault);
    }

    /// Make every new document subscription fail immediately with `error`.
    pub fn fail_subscriptions(&self, error: BackendError) {
        self.lock().faults.subscribe = Some(error);
    }

    // =========================================================================
    // Operator-side access (bypasses faults)
    // =========================================================================

    /// Replace a document as an administrator would, notifying listeners.
    pub fn put_document(&self, path: &DocumentPath, fields: Fields) {
        self.lock().write_document(path, fields);
    }

    /// Delete a document, notifying listeners.
    pub fn delete_document(&self, path: &DocumentPath) {
        let mut state = self.lock();
        if state.documents.remove(path).is_some() {
            state.notify_document(path, &DocumentEvent::Missing);
        }
    }

    /// Deliver an arbitrary event to listeners of `path`.
    pub fn push_document_event(&self, path: &DocumentPath, event: DocumentEvent) {
        self.lock().notify_document(path, &event);
    }

    /// Sign the current principal out, notifying listeners.
    pub fn sign_out(&self) {
        let mut state = self.lock();
        state.principal = None;
        state.notify_auth();
    }

    #[must_use]
    pub fn principal(&self) -> Option<Principal> {
        self.lock().principal.clone()
    }

    #[must_use]
    pub fn document(&self, path: &DocumentPath) -> Option<Fields> {
        self.lock()
            .documents
            .get(path)
            .map(|snapshot| snapshot.fields.clone())
    }

    /// Records appended to `collection`, in insertion order.
    #[must_use]
    pub fn records(&self, collection: &CollectionPath) -> Vec<Fields> {
        self.lock()
            .collections
            .get(collection)
            .map(|records| records.iter().map(|(_, fields)| fields.clone()).collect())
            .unwrap_or_default()
    }

    /// Total number of records across every collection.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.lock().collections.values().map(Vec::len).sum()
    }

    // =========================================================================
    // Call accounting
    // =========================================================================

    #[must_use]
    pub fn sign_in_calls(&self) -> usize {
        self.lock().calls.sign_in
    }

    #[must_use]
    pub fn get_document_calls(&self) -> usize {
        self.lock().calls.get_document
    }

    #[must_use]
    pub fn set_document_calls(&self) -> usize {
        self.lock().calls.set_document
    }

    #[must_use]
    pub fn add_record_calls(&self) -> usize {
        self.lock().calls.add_record
    }

    /// Number of remote calls of any kind.
    #[must_use]
    pub fn remote_calls(&self) -> usize {
        let calls = self.lock().calls;
        calls.sign_in + calls.get_document + calls.set_document + calls.add_record
    }

    #[must_use]
    pub fn active_auth_listeners(&self) -> usize {
        self.lock().auth_listeners.len()
    }

    #[must_use]
    pub fn active_document_listeners(&self) -> usize {
        self.lock().document_listeners.len()
    }

    /// How many subscriptions have been released through their unsubscribe hook.
    #[must_use]
    pub fn released_subscriptions(&self) -> usize {
        self.lock().released
    }

    fn release_hook(&self, id: u64) -> impl FnOnce() + Send + 'static {
        let state = Arc::clone(&self.state);
        move || {
            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            state.auth_listeners.remove(&id);
            state.document_listeners.remove(&id);
            state.released += 1;
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn sign_in_anonymously(&self) -> Result<Principal, BackendError> {
        let mut state = self.lock();
        state.calls.sign_in += 1;
        if let Some(error) = trip(&mut state.faults.sign_in) {
            return Err(error);
        }
        state.next_uid += 1;
        let uid = format!("anon-{}", state.next_uid);
        Ok(state.sign_in(Principal::new(uid, true)))
    }

    async fn sign_in_with_token(&self, token: &str) -> Result<Principal, BackendError> {
        let mut state = self.lock();
        state.calls.sign_in += 1;
        if let Some(error) = trip(&mut state.faults.sign_in) {
            return Err(error);
        }
        let Some(uid) = state.tokens.get(token).cloned() else {
            return Err(BackendError::Auth("invalid custom token".to_string()));
        };
        Ok(state.sign_in(Principal::new(uid, false)))
    }

    fn on_auth_state_changed(&self) -> Subscription<Option<Principal>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut state = self.lock();
            let id = state.listener_id();
            // Receiver is held below, so the initial delivery cannot fail.
            let _ = tx.send(state.principal.clone());
            state.auth_listeners.insert(id, tx);
            id
        };
        Subscription::new(rx, self.release_hook(id))
    }

    async fn get_document(
        &self,
        path: &DocumentPath,
    ) -> Result<Option<DocumentSnapshot>, BackendError> {
        let mut state = self.lock();
        state.calls.get_document += 1;
        if let Some(error) = trip(&mut state.faults.get_document) {
            return Err(error);
        }
        Ok(state.documents.get(path).cloned())
    }

    async fn set_document(
        &self,
        path: &DocumentPath,
        fields: &Fields,
        options: SetOptions,
    ) -> Result<(), BackendError> {
        let mut state = self.lock();
        state.calls.set_document += 1;
        if let Some(error) = trip(&mut state.faults.set_document) {
            return Err(error);
        }
        let mut merged = if options.merge {
            state
                .documents
                .get(path)
                .map(|snapshot| snapshot.fields.clone())
                .unwrap_or_default()
        } else {
            Fields::new()
        };
        merged.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        state.write_document(path, merged);
        Ok(())
    }

    fn subscribe_document(&self, path: &DocumentPath) -> Subscription<DocumentEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut state = self.lock();
            if let Some(error) = state.faults.subscribe.clone() {
                return Subscription::single(DocumentEvent::Error(error));
            }
            let id = state.listener_id();
            let current = state
                .documents
                .get(path)
                .cloned()
                .map_or(DocumentEvent::Missing, DocumentEvent::Snapshot);
            let _ = tx.send(current);
            state.document_listeners.insert(id, (path.clone(), tx));
            id
        };
        Subscription::new(rx, self.release_hook(id))
    }

    async fn add_record(
        &self,
        collection: &CollectionPath,
        record: &Fields,
    ) -> Result<RecordId, BackendError> {
        let mut state = self.lock();
        state.calls.add_record += 1;
        if let Some(error) = trip(&mut state.faults.add_record) {
            return Err(error);
        }
        state.next_record += 1;
        let id = RecordId::new(format!("rec-{}", state.next_record));
        state
            .collections
            .entry(collection.clone())
            .or_default()
            .push((id.clone(), record.clone()));
        Ok(id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn doc() -> DocumentPath {
        DocumentPath::new("artifacts/test/public/data/site_config/metrics")
    }

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_trip_counts_down_then_clears() {
        let mut slot = Some(Fault::times(2, BackendError::Network("down".to_string())));
        assert!(trip(&mut slot).is_some());
        assert!(trip(&mut slot).is_some());
        assert!(trip(&mut slot).is_none());
        assert!(slot.is_none());
    }

    #[test]
    fn test_trip_always_stays_armed() {
        let mut slot = Some(Fault::always(BackendError::Network("down".to_string())));
        for _ in 0..10 {
            assert!(trip(&mut slot).is_some());
        }
    }

    #[tokio::test]
    async fn test_sign_in_fault_then_success_notifies_listeners() {
        let backend = MemoryBackend::new();
        backend.fail_sign_in(Fault::times(1, BackendError::Auth("nope".to_string())));
        let mut auth = backend.on_auth_state_changed();
        assert_eq!(auth.next().await, Some(None));

        assert!(backend.sign_in_anonymously().await.is_err());
        let principal = backend.sign_in_anonymously().await.unwrap();
        assert!(principal.anonymous);
        assert_eq!(auth.next().await, Some(Some(principal)));
        assert_eq!(backend.sign_in_calls(), 2);
    }

    #[tokio::test]
    async fn test_unknown_token_is_rejected() {
        let backend = MemoryBackend::new().with_token("good", "user-1");
        assert!(matches!(
            backend.sign_in_with_token("bad").await,
            Err(BackendError::Auth(_))
        ));
        let principal = backend.sign_in_with_token("good").await.unwrap();
        assert_eq!(principal.uid.as_str(), "user-1");
        assert!(!principal.anonymous);
    }

    #[tokio::test]
    async fn test_merge_write_keeps_other_fields() {
        let backend = MemoryBackend::new();
        backend.put_document(&doc(), fields(&[("years", "7+")]));
        backend
            .set_document(&doc(), &fields(&[("clients", "50")]), SetOptions::merge())
            .await
            .unwrap();
        assert_eq!(
            backend.document(&doc()),
            Some(fields(&[("clients", "50"), ("years", "7+")]))
        );

        backend
            .set_document(&doc(), &fields(&[("clients", "60")]), SetOptions::default())
            .await
            .unwrap();
        assert_eq!(backend.document(&doc()), Some(fields(&[("clients", "60")])));
    }

    #[tokio::test]
    async fn test_document_subscription_sees_changes_in_order() {
        let backend = MemoryBackend::new();
        let mut sub = backend.subscribe_document(&doc());
        assert_eq!(sub.next().await, Some(DocumentEvent::Missing));

        backend.put_document(&doc(), fields(&[("years", "7+")]));
        backend.delete_document(&doc());

        let Some(DocumentEvent::Snapshot(snapshot)) = sub.next().await else {
            panic!("expected snapshot");
        };
        assert_eq!(snapshot.fields, fields(&[("years", "7+")]));
        assert_eq!(sub.next().await, Some(DocumentEvent::Missing));
    }

    #[tokio::test]
    async fn test_dropping_subscription_releases_listener_once() {
        let backend = MemoryBackend::new();
        let sub = backend.subscribe_document(&doc());
        let auth = backend.on_auth_state_changed();
        assert_eq!(backend.active_document_listeners(), 1);
        assert_eq!(backend.active_auth_listeners(), 1);

        drop(sub);
        auth.unsubscribe();
        assert_eq!(backend.active_document_listeners(), 0);
        assert_eq!(backend.active_auth_listeners(), 0);
        assert_eq!(backend.released_subscriptions(), 2);
    }

    #[tokio::test]
    async fn test_subscription_fault_is_a_single_error() {
        let backend = MemoryBackend::new();
        backend.fail_subscriptions(BackendError::Permission("denied".to_string()));
        let mut sub = backend.subscribe_document(&doc());
        assert!(matches!(sub.next().await, Some(DocumentEvent::Error(_))));
        assert_eq!(sub.next().await, None);
        assert_eq!(backend.active_document_listeners(), 0);
    }

    #[tokio::test]
    async fn test_add_record_appends_whole_record() {
        let backend = MemoryBackend::new();
        let collection = CollectionPath::new("artifacts/test/users/u1/leads");
        backend
            .add_record(&collection, &fields(&[("name", "Acme")]))
            .await
            .unwrap();
        assert_eq!(backend.records(&collection), vec![fields(&[("name", "Acme")])]);
        assert_eq!(backend.record_count(), 1);
    }
}
