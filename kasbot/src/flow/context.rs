//! Collaborators shared by every flow, and the per-flow conversation handle.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::channel::Transport;
use crate::config::BotConfig;
use crate::error::{FlowError, FlowResult};
use crate::events::{Destination, InboundEvent, Prompt, PromptHandle};
use crate::interaction::{Expect, InteractionWaiter, WaitError};
use crate::ratelimit::{ActionKey, RateLimiter};
use crate::session::{SessionRegistry, UserId};
use crate::validate::Validator;
use crate::wallet::WalletService;

/// Everything a flow needs, shared across users.
#[derive(Clone)]
pub struct FlowContext {
    /// User sessions.
    pub registry: Arc<SessionRegistry>,
    /// Per-action throttle.
    pub limiter: Arc<RateLimiter>,
    /// Outstanding waits.
    pub waiter: Arc<InteractionWaiter>,
    /// Prompt rendering.
    pub transport: Arc<dyn Transport>,
    /// Wallet operations.
    pub wallet: Arc<dyn WalletService>,
    /// Input checks.
    pub validator: Arc<dyn Validator>,
    /// Deadlines, limits and explorer links.
    pub config: Arc<BotConfig>,
}

impl std::fmt::Debug for FlowContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowContext")
            .field("registry", &self.registry)
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

/// One user's flow talking to its direct-message chat.
#[derive(Debug, Clone, Copy)]
pub struct Conversation<'a> {
    /// Shared collaborators.
    pub ctx: &'a FlowContext,
    /// The user driving this flow.
    pub user: &'a UserId,
    /// Direct-message destination for prompts.
    pub chat: &'a Destination,
}

impl<'a> Conversation<'a> {
    /// Create a conversation handle.
    #[must_use]
    pub const fn new(ctx: &'a FlowContext, user: &'a UserId, chat: &'a Destination) -> Self {
        Self { ctx, user, chat }
    }

    /// Spend one unit of the user's budget for `action`.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::RateLimitExceeded`] when the budget is exhausted.
    pub fn check_rate(&self, action: ActionKey) -> FlowResult<()> {
        if self.ctx.limiter.allow(self.user, action) {
            Ok(())
        } else {
            Err(FlowError::RateLimitExceeded {
                action,
                remaining: self.ctx.limiter.remaining(self.user, action),
            })
        }
    }

    /// Render a prompt.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Transport`] when delivery fails.
    pub async fn render(&self, prompt: &Prompt) -> FlowResult<PromptHandle> {
        Ok(self.ctx.transport.render(self.chat, prompt).await?)
    }

    /// Render a message whose delivery failure is only logged.
    pub async fn notify(&self, prompt: &Prompt) {
        if let Err(e) = self.ctx.transport.render(self.chat, prompt).await {
            warn!(user = %self.user, error = %e, "failed to deliver message");
        }
    }

    /// Delete a message, logging failures.
    pub async fn discard(&self, handle: &PromptHandle) {
        if let Err(e) = self.ctx.transport.delete(handle).await {
            debug!(user = %self.user, message = %handle.message_id, error = %e, "failed to delete message");
        }
    }

    /// Show a prompt with options and return the chosen option id.
    ///
    /// The prompt is deleted once answered or expired.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InteractionTimeout`] for `step` when no choice
    /// arrives in time, and [`FlowError::Transport`] when the prompt cannot
    /// be shown.
    pub async fn choose(&self, step: &'static str, prompt: &Prompt) -> FlowResult<String> {
        self.choose_within(step, prompt, self.ctx.config.flow.selection_timeout())
            .await
    }

    /// Show a prompt and wait for a free-text reply in the chat.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InteractionTimeout`] for `step` when no reply
    /// arrives in time, and [`FlowError::Transport`] when the prompt cannot
    /// be shown.
    pub async fn read_text(&self, step: &'static str, prompt: &Prompt) -> FlowResult<InboundEvent> {
        self.ask(step, prompt, Expect::Text, self.ctx.config.flow.text_timeout())
            .await
    }

    /// Like [`choose`](Self::choose) with an explicit deadline.
    ///
    /// # Errors
    ///
    /// See [`choose`](Self::choose).
    pub async fn choose_within(
        &self,
        step: &'static str,
        prompt: &Prompt,
        timeout: Duration,
    ) -> FlowResult<String> {
        let event = self
            .ask(step, prompt, Expect::Choice(prompt.option_ids()), timeout)
            .await?;
        event
            .custom_id()
            .map(str::to_string)
            .ok_or(FlowError::invalid("choice"))
    }

    async fn ask(
        &self,
        step: &'static str,
        prompt: &Prompt,
        expect: Expect,
        timeout: Duration,
    ) -> FlowResult<InboundEvent> {
        let handle = self.render(prompt).await?;
        let answer = self
            .ctx
            .waiter
            .wait_for(self.user, self.chat, expect, timeout)
            .await;
        self.discard(&handle).await;

        match answer {
            Ok(event) => Ok(event),
            Err(WaitError::Timeout(_)) => Err(FlowError::timeout(step)),
            Err(WaitError::Superseded) => Err(FlowError::session(format!("{step} was superseded"))),
        }
    }
}
