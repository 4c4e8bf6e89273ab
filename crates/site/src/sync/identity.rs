//! Session identity bootstrap.
//!
//! # State machine
//!
//! ```text
//! Uninitialized -> Initializing -> Ready(identity)
//! ```
//!
//! - No backend: straight to `Ready(None)` (degraded mode)
//! - Backend reports a signed-in principal: adopt it
//! - No principal: sign in with the one-time token if configured, else
//!   anonymously, under [`RetryPolicy`]
//! - Sign-in exhausted: `Ready` with a locally generated fallback id, so an
//!   auth outage never blocks the rest of the site
//!
//! The manager owns exactly one auth-state subscription, held by its
//! background task and released when the manager is dropped or shut down.

use std::sync::Arc;

use leadline_core::{Identity, IdentitySource, IdentityState, VisitorId};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::backend::{Backend, BackendError, Principal, SharedBackend, Subscription};
use crate::sync::RetryPolicy;

/// Inputs to the identity bootstrap.
#[derive(Debug, Clone, Default)]
pub struct IdentityOptions {
    /// One-time credential token preferred over anonymous sign-in.
    pub initial_token: Option<SecretString>,
    /// Backoff applied to sign-in attempts.
    pub retry: RetryPolicy,
}

/// Owns the identity bootstrap for one session.
pub struct IdentityManager {
    state: Arc<watch::Sender<IdentityState>>,
    task: Option<JoinHandle<()>>,
}

impl IdentityManager {
    /// Start establishing an identity.
    ///
    /// Returns immediately; observe progress with [`IdentityManager::subscribe`]
    /// or [`IdentityManager::wait_ready`]. Must be called from within a tokio
    /// runtime when a backend is given.
    #[must_use]
    pub fn start(backend: Option<SharedBackend>, options: IdentityOptions) -> Self {
        let (tx, _) = watch::channel(IdentityState::Uninitialized);
        let state = Arc::new(tx);
        advance(&state, IdentityState::Initializing);

        let Some(backend) = backend else {
            warn!("No backend configured, continuing without an identity");
            advance(&state, IdentityState::Ready(None));
            return Self { state, task: None };
        };

        let auth = backend.on_auth_state_changed();
        let task = tokio::spawn(bootstrap(backend, auth, options, Arc::clone(&state)));

        Self {
            state,
            task: Some(task),
        }
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn current(&self) -> IdentityState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<IdentityState> {
        self.state.subscribe()
    }

    /// Wait until the state is `Ready` and return it.
    pub async fn wait_ready(&self) -> IdentityState {
        let mut rx = self.state.subscribe();
        // The sender lives as long as `self`, so the channel cannot close here.
        match rx.wait_for(IdentityState::is_ready).await {
            Ok(state) => state.clone(),
            Err(_) => self.current(),
        }
    }

    /// Stop the bootstrap task and release the auth subscription.
    pub async fn shutdown(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for IdentityManager {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Move forward to `next`; backward or repeated transitions are dropped.
fn advance(state: &watch::Sender<IdentityState>, next: IdentityState) {
    state.send_if_modified(|current| {
        if next.rank() > current.rank() {
            *current = next;
            true
        } else {
            false
        }
    });
}

async fn bootstrap(
    backend: SharedBackend,
    mut auth: Subscription<Option<Principal>>,
    options: IdentityOptions,
    state: Arc<watch::Sender<IdentityState>>,
) {
    while let Some(principal) = auth.next().await {
        if state.borrow().is_ready() {
            debug!(
                uid = principal.as_ref().map(|p| p.uid.as_str()),
                "Auth state changed after identity was assigned, ignoring"
            );
            continue;
        }

        let identity = match principal {
            Some(principal) => {
                info!(
                    uid = %principal.uid,
                    anonymous = principal.anonymous,
                    "Adopted signed-in principal"
                );
                Identity::new(principal.uid, IdentitySource::Principal)
            }
            None => sign_in(backend.as_ref(), &options).await,
        };
        advance(&state, IdentityState::Ready(Some(identity)));
    }

    if !state.borrow().is_ready() {
        let identity = fallback("auth state stream closed before sign-in completed");
        advance(&state, IdentityState::Ready(Some(identity)));
    }
}

async fn sign_in(backend: &dyn Backend, options: &IdentityOptions) -> Identity {
    let retry = options.retry;
    let result: Result<(Principal, IdentitySource), BackendError> = match &options.initial_token {
        Some(token) => {
            let token = token.expose_secret();
            retry
                .run("sign_in_with_token", move || backend.sign_in_with_token(token))
                .await
                .map(|principal| (principal, IdentitySource::Token))
        }
        None => retry
            .run("sign_in_anonymously", move || backend.sign_in_anonymously())
            .await
            .map(|principal| (principal, IdentitySource::Anonymous)),
    };

    match result {
        Ok((principal, source)) => {
            info!(uid = %principal.uid, %source, "Signed in");
            Identity::new(principal.uid, source)
        }
        Err(err) => fallback(&format!(
            "sign-in failed after {} attempts: {err}",
            retry.attempts()
        )),
    }
}

fn fallback(reason: &str) -> Identity {
    let id = VisitorId::random();
    error!(
        fallback_id = %id,
        reason,
        "Continuing with a fallback identity; backend writes will likely be rejected"
    );
    Identity::new(id, IdentitySource::Fallback)
}
