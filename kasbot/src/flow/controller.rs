//! The session state machine driver.
//!
//! [`SessionController::route`] is the single entry point for inbound
//! events. Answers go to the user's outstanding wait; the command trigger
//! starts (or restarts) a flow task that drives the user's session through
//! the steps in an explicit loop until a step suspends it.
//!
//! `route` never waits on the network: opening the direct chat happens in
//! the flow's supervisor task, so one slow platform call cannot hold up
//! other users' events.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::AbortHandle;
use tracing::{debug, error, info, trace, warn};

use super::context::{Conversation, FlowContext};
use super::recovery::{Failure, Recovery, classify};
use super::steps;
use crate::error::FlowError;
use crate::events::{Destination, InboundEvent};
use crate::session::{SessionState, UserId};

/// What [`SessionController::route`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Completed the user's outstanding wait.
    Delivered,
    /// Started a flow for the user.
    Started,
    /// A trigger that could not start a flow.
    Dropped,
    /// Neither a trigger nor an expected answer.
    Ignored,
}

#[derive(Debug)]
struct FlowSlot {
    generation: u64,
    abort: Option<AbortHandle>,
}

/// Drives every user's conversation.
#[derive(Debug)]
pub struct SessionController {
    ctx: FlowContext,
    flows: Mutex<HashMap<UserId, FlowSlot>>,
    next_generation: AtomicU64,
}

impl SessionController {
    /// Create a controller over the given collaborators.
    #[must_use]
    pub fn new(ctx: FlowContext) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            flows: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
        })
    }

    /// Shared collaborators.
    #[must_use]
    pub const fn context(&self) -> &FlowContext {
        &self.ctx
    }

    fn flows(&self) -> MutexGuard<'_, HashMap<UserId, FlowSlot>> {
        self.flows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Route one inbound event.
    pub async fn route(self: &Arc<Self>, event: InboundEvent) -> RouteOutcome {
        if !event.is_trigger(&self.ctx.config.command) {
            return match self.ctx.waiter.offer(event).await {
                None => RouteOutcome::Delivered,
                Some(event) => {
                    trace!(user = %event.user_id, "event matched no wait");
                    RouteOutcome::Ignored
                }
            };
        }

        let user = event.user_id.clone();
        let session = self.ctx.registry.get_or_create(&user).await;
        if session.state().is_non_interruptible() {
            debug!(user = %user, state = %session.state(), "trigger ignored during non-interruptible step");
            return RouteOutcome::Dropped;
        }

        self.abort_flow(&user).await;

        if matches!(
            session.state(),
            SessionState::CheckingBalance { .. } | SessionState::ViewingHistory { .. }
        ) {
            warn!(user = %user, state = %session.state(), "resetting interrupted session");
            self.ctx.registry.transition(&user, SessionState::Idle).await;
        }

        self.spawn_flow(user, event);
        RouteOutcome::Started
    }

    /// Claim the user's flow slot and hand the trigger to a supervisor task.
    ///
    /// The supervisor opens the direct chat, runs the flow in its own task
    /// and repairs the session if that task panics.
    fn spawn_flow(self: &Arc<Self>, user: UserId, origin: InboundEvent) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        self.flows().insert(
            user.clone(),
            FlowSlot {
                generation,
                abort: None,
            },
        );

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.supervise(user, origin, generation).await;
        });
    }

    async fn supervise(self: Arc<Self>, user: UserId, origin: InboundEvent, generation: u64) {
        let Some(chat) = self.open_chat(&user, &origin).await else {
            self.release(&user, generation);
            return;
        };

        let task = {
            let mut flows = self.flows();
            let Some(slot) = flows
                .get_mut(&user)
                .filter(|slot| slot.generation == generation)
            else {
                debug!(user = %user, "flow superseded before it started");
                return;
            };
            let this = Arc::clone(&self);
            let task_user = user.clone();
            let task_chat = chat.clone();
            let task = tokio::spawn(async move {
                this.run_flow(&task_user, &task_chat, generation).await;
            });
            slot.abort = Some(task.abort_handle());
            task
        };

        if let Err(e) = task.await {
            if e.is_panic() && self.is_current(&user, generation) {
                error!(user = %user, error = %e, "flow task panicked");
                self.ctx.waiter.cancel(&user).await;
                let recovery = Self::panic_recovery(self.ctx.registry.state(&user).await);
                let conv = Conversation::new(&self.ctx, &user, &chat);
                self.recover(&conv, Failure::new(FlowError::internal(e.to_string()), recovery))
                    .await;
            }
        }
        self.release(&user, generation);
    }

    async fn open_chat(&self, user: &UserId, origin: &InboundEvent) -> Option<Destination> {
        match self.ctx.transport.open_direct(origin).await {
            Ok(chat) => Some(chat),
            Err(e) => {
                let error = FlowError::ChannelType(e.to_string());
                let notice = classify(&error);
                warn!(user = %user, code = notice.code, error = %error, "cannot open direct chat");
                if let Err(e) = self.ctx.transport.render(&origin.origin(), &notice.prompt()).await {
                    warn!(user = %user, error = %e, "failed to deliver message");
                }
                None
            }
        }
    }

    /// Where a session goes when its flow dies mid-step.
    fn panic_recovery(state: SessionState) -> Recovery {
        match state {
            SessionState::Idle | SessionState::NetworkSelection => Recovery::Discard,
            SessionState::WalletOptions { network } | SessionState::ImportingWallet { network } => {
                Recovery::Park(SessionState::WalletOptions { network })
            }
            SessionState::WalletActions { wallet }
            | SessionState::SendingKaspa { wallet }
            | SessionState::CheckingBalance { wallet }
            | SessionState::ViewingHistory { wallet } => {
                Recovery::Park(SessionState::WalletActions { wallet })
            }
        }
    }

    /// Stop the user's running flow, if any.
    pub async fn abort_flow(&self, user: &UserId) -> bool {
        let slot = self.flows().remove(user);
        let aborted = slot.is_some_and(|slot| {
            if let Some(abort) = slot.abort {
                abort.abort();
            }
            true
        });
        if aborted {
            debug!(user = %user, "aborted running flow");
        }
        self.ctx.waiter.cancel(user).await;
        aborted
    }

    /// Stop every running flow.
    pub fn abort_all(&self) -> usize {
        let slots: Vec<_> = self.flows().drain().collect();
        for (_, slot) in &slots {
            if let Some(abort) = &slot.abort {
                abort.abort();
            }
        }
        slots.len()
    }

    /// Number of flows in flight.
    #[must_use]
    pub fn active_flows(&self) -> usize {
        self.flows().len()
    }

    fn is_current(&self, user: &UserId, generation: u64) -> bool {
        self.flows()
            .get(user)
            .is_some_and(|slot| slot.generation == generation)
    }

    fn release(&self, user: &UserId, generation: u64) {
        let mut flows = self.flows();
        if flows.get(user).is_some_and(|slot| slot.generation == generation) {
            flows.remove(user);
        }
    }

    /// Drive the user's session until a step suspends it.
    ///
    /// Never fails: every step failure is classified, shown to the user and
    /// turned into a state change.
    pub async fn run_flow(&self, user: &UserId, chat: &Destination, generation: u64) {
        let conv = Conversation::new(&self.ctx, user, chat);
        info!(user = %user, chat = %chat.chat_id, "flow started");

        loop {
            let state = self.ctx.registry.state(user).await;
            trace!(user = %user, %state, "dispatching");

            let result = match &state {
                SessionState::Idle | SessionState::NetworkSelection => {
                    steps::select_network(conv).await
                }
                SessionState::WalletOptions { network } => {
                    steps::wallet_options(conv, *network).await
                }
                SessionState::ImportingWallet { network } => {
                    steps::import_wallet(conv, *network).await
                }
                SessionState::WalletActions { wallet } => steps::wallet_actions(conv, wallet).await,
                SessionState::SendingKaspa { wallet } => steps::send(conv, wallet).await,
                SessionState::CheckingBalance { wallet } => steps::balance(conv, wallet).await,
                SessionState::ViewingHistory { wallet } => steps::history(conv, wallet).await,
            };

            if !self.is_current(user, generation) {
                debug!(user = %user, "flow superseded, leaving session untouched");
                return;
            }

            match result {
                Ok(next) => self.ctx.registry.transition(user, next).await,
                Err(failure) => {
                    if !self.recover(&conv, failure).await {
                        info!(user = %user, "flow suspended");
                        return;
                    }
                }
            }
        }
    }

    /// Apply a failure's recovery. Returns whether the flow keeps running.
    async fn recover(&self, conv: &Conversation<'_>, failure: Failure) -> bool {
        let Failure { error, recovery } = failure;
        let notice = classify(&error);
        warn!(
            user = %conv.user,
            code = notice.code,
            error = %error,
            %recovery,
            "flow step failed"
        );
        conv.notify(&notice.prompt()).await;

        match recovery {
            Recovery::Discard => {
                self.ctx.registry.remove(conv.user).await;
                false
            }
            Recovery::Resume(state) => {
                self.ctx.registry.transition(conv.user, state).await;
                true
            }
            Recovery::Park(state) => {
                self.ctx.registry.transition(conv.user, state).await;
                false
            }
        }
    }
}
