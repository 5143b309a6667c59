//! Channel trait, transport contract and channel management.
//!
//! A [`Channel`] is a chat-platform integration (CLI, Telegram). The session
//! core never talks to a channel directly: it uses the [`Transport`]
//! contract, which [`ChannelManager`] implements by routing on the
//! destination's channel name.

use crate::bus::MessageBus;
use crate::error::{ChannelError, ChannelResult};
use crate::events::{Destination, InboundEvent, Prompt, PromptHandle};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

/// Rendering and delivery operations the session core relies on.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Render a prompt and return a handle for later deletion.
    async fn render(&self, destination: &Destination, prompt: &Prompt)
    -> ChannelResult<PromptHandle>;

    /// Delete a previously rendered prompt or a user message.
    async fn delete(&self, handle: &PromptHandle) -> ChannelResult<()>;

    /// Resolve the direct-message destination for the event's sender.
    async fn open_direct(&self, origin: &InboundEvent) -> ChannelResult<Destination>;

    /// Remove bot messages from a destination. Returns how many were removed.
    async fn clear(&self, destination: &Destination) -> ChannelResult<usize>;
}

/// Channel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    /// Channel is not started.
    #[default]
    Stopped,
    /// Channel is starting up.
    Starting,
    /// Channel is running and connected.
    Running,
    /// Channel is stopping.
    Stopping,
}

/// Channel status information.
#[derive(Debug, Clone)]
pub struct ChannelStatus {
    /// Channel name.
    pub name: String,
    /// Current state.
    pub state: ChannelState,
    /// Number of events received.
    pub events_received: u64,
    /// Number of prompts rendered.
    pub prompts_sent: u64,
    /// Last error message, if any.
    pub last_error: Option<String>,
    /// Whether the channel is healthy.
    pub healthy: bool,
}

/// Trait for implementing chat channels.
#[async_trait]
pub trait Channel: Transport {
    /// Get the unique name of this channel.
    fn name(&self) -> &str;

    /// Start the channel and begin publishing inbound events onto `bus`.
    async fn start(&self, bus: &MessageBus) -> ChannelResult<()>;

    /// Stop the channel and cleanup resources.
    async fn stop(&self) -> ChannelResult<()>;

    /// Get the current channel status.
    async fn status(&self) -> ChannelStatus;

    /// Check if the channel is currently running.
    async fn is_running(&self) -> bool {
        self.status().await.state == ChannelState::Running
    }
}

/// Manager for multiple channels.
pub struct ChannelManager {
    channels: RwLock<Vec<Arc<dyn Channel>>>,
    bus: MessageBus,
}

impl std::fmt::Debug for ChannelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelManager")
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}

impl ChannelManager {
    /// Create a new channel manager with the given message bus.
    #[must_use]
    pub fn new(bus: MessageBus) -> Self {
        Self {
            channels: RwLock::new(Vec::new()),
            bus,
        }
    }

    /// Register a channel with the manager.
    pub async fn register(&self, channel: impl Channel + 'static) {
        self.register_arc(Arc::new(channel)).await;
    }

    /// Register a shared channel.
    pub async fn register_arc(&self, channel: Arc<dyn Channel>) {
        info!(channel = %channel.name(), "channel registered");
        self.channels.write().await.push(channel);
    }

    /// Look up a channel by name.
    pub async fn channel(&self, name: &str) -> Option<Arc<dyn Channel>> {
        self.channels
            .read()
            .await
            .iter()
            .find(|c| c.name() == name)
            .map(Arc::clone)
    }

    async fn route(&self, name: &str) -> ChannelResult<Arc<dyn Channel>> {
        self.channel(name)
            .await
            .ok_or_else(|| ChannelError::NotFound(name.to_string()))
    }

    /// Start all registered channels.
    pub async fn start_all(&self) -> Vec<ChannelResult<()>> {
        let channels = self.channels.read().await;
        let mut results = Vec::with_capacity(channels.len());

        for channel in channels.iter() {
            info!(channel = %channel.name(), "starting channel");
            let result = channel.start(&self.bus).await;
            if let Err(ref e) = result {
                error!(channel = %channel.name(), error = %e, "failed to start channel");
            }
            results.push(result);
        }

        results
    }

    /// Stop all registered channels.
    pub async fn stop_all(&self) -> Vec<ChannelResult<()>> {
        let channels = self.channels.read().await;
        let mut results = Vec::with_capacity(channels.len());

        for channel in channels.iter() {
            info!(channel = %channel.name(), "stopping channel");
            let result = channel.stop().await;
            if let Err(ref e) = result {
                error!(channel = %channel.name(), error = %e, "failed to stop channel");
            }
            results.push(result);
        }

        results
    }

    /// Get status of all channels.
    pub async fn status_all(&self) -> Vec<ChannelStatus> {
        let channels = self.channels.read().await;
        let mut statuses = Vec::with_capacity(channels.len());
        for channel in channels.iter() {
            statuses.push(channel.status().await);
        }
        statuses
    }

    /// Get the number of registered channels.
    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }
}

#[async_trait]
impl Transport for ChannelManager {
    async fn render(
        &self,
        destination: &Destination,
        prompt: &Prompt,
    ) -> ChannelResult<PromptHandle> {
        self.route(&destination.channel)
            .await?
            .render(destination, prompt)
            .await
    }

    async fn delete(&self, handle: &PromptHandle) -> ChannelResult<()> {
        self.route(&handle.destination.channel)
            .await?
            .delete(handle)
            .await
    }

    async fn open_direct(&self, origin: &InboundEvent) -> ChannelResult<Destination> {
        self.route(&origin.channel).await?.open_direct(origin).await
    }

    async fn clear(&self, destination: &Destination) -> ChannelResult<usize> {
        self.route(&destination.channel)
            .await?
            .clear(destination)
            .await
    }
}

/// Base implementation helpers for channels.
pub struct ChannelBase {
    name: String,
    state: RwLock<ChannelState>,
    stats: RwLock<ChannelStats>,
}

impl std::fmt::Debug for ChannelBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelBase")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct ChannelStats {
    events_received: u64,
    prompts_sent: u64,
    last_error: Option<String>,
}

impl ChannelBase {
    /// Create a new channel base.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(ChannelState::default()),
            stats: RwLock::new(ChannelStats::default()),
        }
    }

    /// Get the channel name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the current state.
    pub async fn state(&self) -> ChannelState {
        *self.state.read().await
    }

    /// Set the channel state.
    pub async fn set_state(&self, state: ChannelState) {
        *self.state.write().await = state;
        debug!(channel = %self.name, ?state, "channel state changed");
    }

    /// Record a received event.
    pub async fn record_received(&self) {
        self.stats.write().await.events_received += 1;
    }

    /// Record a rendered prompt.
    pub async fn record_sent(&self) {
        self.stats.write().await.prompts_sent += 1;
    }

    /// Record an error.
    pub async fn record_error(&self, error: impl Into<String>) {
        let error = error.into();
        error!(channel = %self.name, %error, "channel error");
        self.stats.write().await.last_error = Some(error);
    }

    /// Build status from current state and stats.
    pub async fn build_status(&self) -> ChannelStatus {
        let state = *self.state.read().await;
        let stats = self.stats.read().await;

        ChannelStatus {
            name: self.name.clone(),
            state,
            events_received: stats.events_received,
            prompts_sent: stats.prompts_sent,
            last_error: stats.last_error.clone(),
            healthy: state == ChannelState::Running && stats.last_error.is_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::RecordingTransport;

    #[tokio::test]
    async fn test_channel_base() {
        let base = ChannelBase::new("test");
        assert_eq!(base.name(), "test");
        assert_eq!(base.state().await, ChannelState::Stopped);

        base.set_state(ChannelState::Running).await;
        assert_eq!(base.state().await, ChannelState::Running);

        base.record_received().await;
        base.record_sent().await;

        let status = base.build_status().await;
        assert_eq!(status.events_received, 1);
        assert_eq!(status.prompts_sent, 1);
        assert!(status.healthy);

        base.record_error("boom").await;
        assert!(!base.build_status().await.healthy);
    }

    #[tokio::test]
    async fn test_manager_routes_by_channel_name() {
        let manager = ChannelManager::new(MessageBus::new());
        let recorder = Arc::new(RecordingTransport::new("test"));
        manager.register_arc(recorder.clone()).await;
        assert_eq!(manager.channel_count().await, 1);

        let dest = Destination::new("test", "chat");
        let handle = manager.render(&dest, &Prompt::notice("hi")).await.unwrap();
        assert_eq!(handle.destination, dest);
        assert_eq!(recorder.rendered().await.len(), 1);

        manager.delete(&handle).await.unwrap();
        assert_eq!(recorder.deleted().await, vec![handle]);
    }

    #[tokio::test]
    async fn test_manager_unknown_channel() {
        let manager = ChannelManager::new(MessageBus::new());
        let err = manager
            .render(&Destination::new("nowhere", "chat"), &Prompt::notice("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::NotFound(_)));
    }
}
