//! Process-wide map from user identity to session.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};

use super::state::{SessionState, UserId, UserSession};

/// Key-addressed session registry.
///
/// Holds at most one [`UserSession`] per user. Every access is a short
/// read-modify-write under a single lock that is never held across an await
/// on anything else.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<UserId, UserSession>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the user's session, creating it in `Idle` if absent.
    ///
    /// Refreshes `last_activity` either way.
    pub async fn get_or_create(&self, user: &UserId) -> UserSession {
        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(user.clone()).or_insert_with(|| {
            debug!(user = %user, "created new session");
            UserSession::new(user.clone())
        });
        session.touch();
        session.clone()
    }

    /// Snapshot of the user's session.
    pub async fn get(&self, user: &UserId) -> Option<UserSession> {
        self.sessions.read().await.get(user).cloned()
    }

    /// Current state, `Idle` when the user has no session.
    pub async fn state(&self, user: &UserId) -> SessionState {
        self.sessions
            .read()
            .await
            .get(user)
            .map(|s| s.state().clone())
            .unwrap_or_default()
    }

    /// Move the user to `state`, creating the session if needed.
    pub async fn transition(&self, user: &UserId, state: SessionState) {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(user.clone())
            .or_insert_with(|| UserSession::new(user.clone()));
        debug!(user = %user, from = %session.state(), to = %state, "session transition");
        session.enter(state);
    }

    /// Remove the user's session. Returns whether one existed.
    pub async fn remove(&self, user: &UserId) -> bool {
        let removed = self.sessions.write().await.remove(user).is_some();
        if removed {
            debug!(user = %user, "session removed");
        }
        removed
    }

    /// Evict sessions idle for at least `ttl`.
    ///
    /// Sessions in a non-interruptible state are kept: their flow is still
    /// running and will write the next state itself.
    pub async fn sweep(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| {
            session.state().is_non_interruptible()
                || now.duration_since(session.last_activity()) < ttl
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            info!(evicted, remaining = sessions.len(), "evicted idle sessions");
        }
        evicted
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no sessions exist.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::WalletRef;
    use crate::wallet::Network;

    fn user(id: &str) -> UserId {
        UserId::new("test", id)
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let registry = SessionRegistry::new();
        let alice = user("alice");

        let first = registry.get_or_create(&alice).await;
        assert_eq!(first.state(), &SessionState::Idle);

        registry
            .transition(&alice, SessionState::NetworkSelection)
            .await;
        let second = registry.get_or_create(&alice).await;
        assert_eq!(second.state(), &SessionState::NetworkSelection);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_state_defaults_to_idle() {
        let registry = SessionRegistry::new();
        assert_eq!(registry.state(&user("ghost")).await, SessionState::Idle);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove() {
        let registry = SessionRegistry::new();
        let alice = user("alice");
        registry.get_or_create(&alice).await;

        assert!(registry.remove(&alice).await);
        assert!(!registry.remove(&alice).await);
        assert!(registry.get(&alice).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_idle_but_keeps_busy_sessions() {
        let registry = SessionRegistry::new();
        let wallet = WalletRef::new(Network::Mainnet, "kaspa:qabc");

        registry.get_or_create(&user("idle")).await;
        registry
            .transition(
                &user("sending"),
                SessionState::SendingKaspa {
                    wallet: wallet.clone(),
                },
            )
            .await;

        tokio::time::advance(Duration::from_secs(120)).await;
        registry
            .transition(&user("fresh"), SessionState::WalletActions { wallet })
            .await;

        assert_eq!(registry.sweep(Duration::from_secs(60)).await, 1);
        assert!(registry.get(&user("idle")).await.is_none());
        assert!(registry.get(&user("sending")).await.is_some());
        assert!(registry.get(&user("fresh")).await.is_some());
    }
}
