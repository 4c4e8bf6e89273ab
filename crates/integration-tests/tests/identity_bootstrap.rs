//! Identity bootstrap end to end.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use leadline_core::{IdentitySource, IdentityState};
use leadline_integration_tests::{identity, settle, shared};
use leadline_site::backend::{BackendError, Fault, MemoryBackend};
use leadline_site::sync::{IdentityManager, IdentityOptions};
use tokio::time::Instant;

// =============================================================================
// Readiness
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_permanent_auth_outage_still_becomes_ready() {
    let backend = MemoryBackend::new();
    backend.fail_sign_in(Fault::always(BackendError::Auth("service unavailable".to_string())));
    let start = Instant::now();

    let manager = identity(&backend);
    let state = manager.wait_ready().await;

    let current = state.identity().unwrap();
    assert_eq!(current.source, IdentitySource::Fallback);
    assert!(!current.id.as_str().is_empty());
    assert_eq!(backend.sign_in_calls(), 6);
    assert!(start.elapsed() <= Duration::from_secs(31));
}

#[tokio::test(start_paused = true)]
async fn test_sign_in_recovers_on_third_attempt() {
    let backend = MemoryBackend::new();
    backend.fail_sign_in(Fault::times(2, BackendError::Network("reset".to_string())));

    let manager = identity(&backend);
    let state = manager.wait_ready().await;

    let current = state.identity().unwrap();
    assert_eq!(current.source, IdentitySource::Anonymous);
    assert_eq!(backend.sign_in_calls(), 3);
    assert_eq!(backend.principal().map(|p| p.uid), Some(current.id.clone()));
}

#[tokio::test]
async fn test_degraded_mode_without_backend() {
    let manager = IdentityManager::start(None, IdentityOptions::default());
    assert_eq!(manager.wait_ready().await, IdentityState::Ready(None));
}

// =============================================================================
// Subscription lifecycle
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_dropping_manager_releases_auth_listener_once() {
    let backend = MemoryBackend::new();
    let manager = identity(&backend);
    manager.wait_ready().await;
    assert_eq!(backend.active_auth_listeners(), 1);

    drop(manager);
    settle().await;

    assert_eq!(backend.active_auth_listeners(), 0);
    assert_eq!(backend.released_subscriptions(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_manager_mid_retry_does_not_resubscribe() {
    let backend = MemoryBackend::new();
    backend.fail_sign_in(Fault::always(BackendError::Network("down".to_string())));
    let manager = identity(&backend);
    settle().await;
    assert_eq!(backend.sign_in_calls(), 1);

    drop(manager);
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(backend.sign_in_calls(), 1);
    assert_eq!(backend.active_auth_listeners(), 0);
    assert_eq!(backend.released_subscriptions(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_independent_managers_share_backend_read_only() {
    let backend = MemoryBackend::new();
    let first = IdentityManager::start(Some(shared(&backend)), IdentityOptions::default());
    let first_state = first.wait_ready().await;

    // A second session sees the already signed-in principal and adopts it.
    let second = IdentityManager::start(Some(shared(&backend)), IdentityOptions::default());
    let second_state = second.wait_ready().await;

    assert_eq!(first_state.id(), second_state.id());
    assert_eq!(
        second_state.identity().map(|i| i.source),
        Some(IdentitySource::Principal)
    );
    assert_eq!(backend.sign_in_calls(), 1);
}
