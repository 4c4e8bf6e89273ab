//! Live view of the shared site configuration document.
//!
//! The view starts at the compiled-in defaults and is never empty. Once the
//! identity is ready the store:
//!
//! 1. spawns a best-effort merge-write of the defaults (seed), retried and
//!    then ignored on failure;
//! 2. opens one live subscription to the document and mirrors it:
//!    - snapshot: the remote mapping verbatim
//!    - document missing: defaults
//!    - subscription error: defaults, and the subscription is released
//!
//! Reads are never retried; only the seed write is.

use std::sync::Arc;

use leadline_core::{DocumentPath, IdentityState, SharedConfig, SharedConfigView};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{Backend, DocumentEvent, SetOptions, SharedBackend};
use crate::sync::RetryPolicy;

/// Read-mostly view of the shared config document.
pub struct SharedConfigStore {
    view: watch::Receiver<SharedConfigView>,
    task: Option<JoinHandle<()>>,
}

impl SharedConfigStore {
    /// Start mirroring `document` once `identity` is ready.
    ///
    /// Must be called from within a tokio runtime when a backend is given.
    #[must_use]
    pub fn start(
        backend: Option<SharedBackend>,
        identity: watch::Receiver<IdentityState>,
        document: DocumentPath,
        retry: RetryPolicy,
    ) -> Self {
        let (tx, view) = watch::channel(SharedConfigView::defaults());

        let Some(backend) = backend else {
            debug!("No backend configured, shared config stays at defaults");
            return Self { view, task: None };
        };

        let task = tokio::spawn(mirror(backend, identity, document, retry, tx));
        Self {
            view,
            task: Some(task),
        }
    }

    /// Snapshot of the current view.
    #[must_use]
    pub fn current(&self) -> SharedConfigView {
        self.view.borrow().clone()
    }

    /// Receiver notified whenever the view changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SharedConfigView> {
        self.view.clone()
    }

    /// Stop mirroring and release the document subscription.
    pub async fn shutdown(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for SharedConfigStore {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn mirror(
    backend: SharedBackend,
    mut identity: watch::Receiver<IdentityState>,
    document: DocumentPath,
    retry: RetryPolicy,
    view: watch::Sender<SharedConfigView>,
) {
    if identity.wait_for(IdentityState::is_ready).await.is_err() {
        debug!("Identity manager went away before it was ready");
        return;
    }

    tokio::spawn(seed(Arc::clone(&backend), document.clone(), retry));

    let mut subscription = backend.subscribe_document(&document);
    let mut high_water = None;
    while let Some(event) = subscription.next().await {
        let terminal = matches!(event, DocumentEvent::Error(_));
        if let DocumentEvent::Error(err) = &event {
            warn!(path = %document, error = %err, "Shared config subscription failed, using defaults");
        }

        view.send_if_modified(|current| apply_event(current, &mut high_water, event));

        if terminal {
            break;
        }
    }
    debug!(path = %document, "Shared config subscription ended");
}

/// Best-effort write of the defaults; failure is expected once the document
/// is locked down.
async fn seed(backend: SharedBackend, document: DocumentPath, retry: RetryPolicy) {
    let defaults = SharedConfig::defaults().into_map();
    let backend: &dyn Backend = backend.as_ref();
    let (path, fields) = (&document, &defaults);

    match retry
        .run("seed_shared_config", move || {
            backend.set_document(path, fields, SetOptions::merge())
        })
        .await
    {
        Ok(()) => info!(path = %document, "Seeded shared config defaults"),
        Err(err) => info!(path = %document, error = %err, "Shared config seed skipped"),
    }
}

/// Fold one subscription event into the view.
///
/// Returns whether the view changed. Snapshots older than the newest one
/// already applied are ignored, so the view never moves backward.
fn apply_event(
    current: &mut SharedConfigView,
    high_water: &mut Option<u64>,
    event: DocumentEvent,
) -> bool {
    let next = match event {
        DocumentEvent::Snapshot(snapshot) => {
            if high_water.is_some_and(|seen| snapshot.revision < seen) {
                debug!(
                    revision = snapshot.revision,
                    "Ignoring stale shared config snapshot"
                );
                return false;
            }
            *high_water = Some(snapshot.revision);
            match SharedConfig::from_remote(snapshot.fields) {
                Some(metrics) => SharedConfigView::remote(metrics, snapshot.revision),
                None => SharedConfigView::defaults(),
            }
        }
        DocumentEvent::Missing | DocumentEvent::Error(_) => SharedConfigView::defaults(),
    };

    if *current == next {
        false
    } else {
        *current = next;
        true
    }
}
