//! Session identity and its readiness state machine.

use serde::{Deserialize, Serialize};

use crate::types::id::VisitorId;

/// How the session identifier was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    /// The backend already had a signed-in principal.
    Principal,
    /// Signed in with the configured one-time credential token.
    Token,
    /// Signed in anonymously.
    Anonymous,
    /// Sign-in was exhausted; the id was generated locally.
    Fallback,
}

impl std::fmt::Display for IdentitySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Principal => write!(f, "principal"),
            Self::Token => write!(f, "token"),
            Self::Anonymous => write!(f, "anonymous"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

/// A resolved session identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: VisitorId,
    pub source: IdentitySource,
}

impl Identity {
    #[must_use]
    pub const fn new(id: VisitorId, source: IdentitySource) -> Self {
        Self { id, source }
    }

    /// Whether the id was generated locally after sign-in was exhausted.
    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        matches!(self.source, IdentitySource::Fallback)
    }
}

/// Observable identity state.
///
/// Transitions only move forward:
///
/// ```text
/// Uninitialized -> Initializing -> Ready(identity)
/// ```
///
/// `Ready(None)` is degraded mode: no backend is configured, so there is
/// nothing to sign in against.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IdentityState {
    #[default]
    Uninitialized,
    Initializing,
    Ready(Option<Identity>),
}

impl IdentityState {
    /// True once a sign-in attempt has completed (or was skipped).
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    #[must_use]
    pub const fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Ready(identity) => identity.as_ref(),
            Self::Uninitialized | Self::Initializing => None,
        }
    }

    #[must_use]
    pub fn id(&self) -> Option<&VisitorId> {
        self.identity().map(|identity| &identity.id)
    }

    /// Rank used to reject backward transitions.
    #[must_use]
    pub const fn rank(&self) -> u8 {
        match self {
            Self::Uninitialized => 0,
            Self::Initializing => 1,
            Self::Ready(_) => 2,
        }
    }
}
