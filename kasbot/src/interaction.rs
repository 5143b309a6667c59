//! Waiting for a user's next input with a deadline.
//!
//! A conversation step registers what it expects from one user and suspends
//! on a oneshot channel. The gateway offers every non-trigger event here
//! first; a matching event completes the wait immediately.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{RwLock, oneshot};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::events::{Destination, EventKind, InboundEvent};
use crate::session::UserId;
use crate::util::generate_id;

/// What kind of input completes a wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expect {
    /// A click on one of these component ids.
    Choice(Vec<String>),
    /// Any free-text message.
    Text,
}

impl Expect {
    fn accepts(&self, kind: &EventKind) -> bool {
        match (self, kind) {
            (Self::Choice(ids), EventKind::Interaction { custom_id }) => ids.contains(custom_id),
            (Self::Text, EventKind::Message { .. }) => true,
            _ => false,
        }
    }
}

/// Why a wait ended without input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    /// The deadline elapsed.
    #[error("no input within {0:?}")]
    Timeout(Duration),
    /// A newer wait replaced this one, or it was cancelled.
    #[error("wait superseded")]
    Superseded,
}

struct PendingInteraction {
    wait_id: String,
    expect: Expect,
    chat: Destination,
    deadline: Instant,
    tx: oneshot::Sender<InboundEvent>,
}

/// Registry of outstanding waits, at most one per user.
#[derive(Default)]
pub struct InteractionWaiter {
    pending: RwLock<HashMap<UserId, PendingInteraction>>,
}

impl std::fmt::Debug for InteractionWaiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractionWaiter").finish_non_exhaustive()
    }
}

impl InteractionWaiter {
    /// Create an empty waiter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspend until `user` sends matching input in `chat`, or `timeout`
    /// elapses.
    ///
    /// Registering a wait replaces any earlier wait for the same user.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::Timeout`] when the deadline passes and
    /// [`WaitError::Superseded`] when the wait is replaced or cancelled.
    pub async fn wait_for(
        &self,
        user: &UserId,
        chat: &Destination,
        expect: Expect,
        timeout: Duration,
    ) -> Result<InboundEvent, WaitError> {
        let (tx, rx) = oneshot::channel();
        let wait_id = generate_id("wait");

        let previous = self.pending.write().await.insert(
            user.clone(),
            PendingInteraction {
                wait_id: wait_id.clone(),
                expect,
                chat: chat.clone(),
                deadline: Instant::now() + timeout,
                tx,
            },
        );
        if previous.is_some() {
            debug!(user = %user, "replaced outstanding wait");
        }
        trace!(user = %user, wait = %wait_id, ?timeout, "waiting for input");

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(event)) => Ok(event),
            Ok(Err(_)) => Err(WaitError::Superseded),
            Err(_) => {
                let mut pending = self.pending.write().await;
                if pending.get(user).is_some_and(|p| p.wait_id == wait_id) {
                    pending.remove(user);
                }
                debug!(user = %user, wait = %wait_id, "wait timed out");
                Err(WaitError::Timeout(timeout))
            }
        }
    }

    /// Deliver `event` to the user's outstanding wait if it matches.
    ///
    /// Returns the event back when nothing consumed it.
    pub async fn offer(&self, event: InboundEvent) -> Option<InboundEvent> {
        let mut pending = self.pending.write().await;
        let Some(wait) = pending.get(&event.user_id) else {
            return Some(event);
        };

        if Instant::now() >= wait.deadline
            || wait.chat.channel != event.channel
            || wait.chat.chat_id != event.chat_id
            || !wait.expect.accepts(&event.kind)
        {
            return Some(event);
        }

        let wait = pending.remove(&event.user_id)?;
        match wait.tx.send(event) {
            Ok(()) => {
                trace!(wait = %wait.wait_id, "input delivered");
                None
            }
            // The waiting task is gone; hand the event back to the caller.
            Err(event) => Some(event),
        }
    }

    /// Drop the user's outstanding wait. Returns whether one existed.
    pub async fn cancel(&self, user: &UserId) -> bool {
        self.pending.write().await.remove(user).is_some()
    }

    /// Whether the user has an outstanding wait.
    pub async fn is_waiting(&self, user: &UserId) -> bool {
        self.pending
            .read()
            .await
            .get(user)
            .is_some_and(|p| !p.tx.is_closed())
    }
}
