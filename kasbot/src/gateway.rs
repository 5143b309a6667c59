//! Gateway service for running the complete bot.
//!
//! The gateway is the unified entry point that orchestrates:
//! - Message bus
//! - Channel manager (Telegram, CLI)
//! - Session controller
//! - Janitor

use crate::bus::MessageBus;
use crate::channel::{ChannelManager, Transport};
use crate::channels::{CliChannel, CliChannelConfig};
use crate::config::{BotConfig, load_config, load_config_from};
use crate::error::{BotError, Result};
use crate::flow::{FlowContext, SessionController};
use crate::interaction::InteractionWaiter;
use crate::janitor::{Janitor, JanitorConfig, JanitorStatus};
use crate::ratelimit::RateLimiter;
use crate::session::SessionRegistry;
use crate::validate::StandardValidator;
use crate::wallet::{DevWallet, RetryingWallet, WalletService};

#[cfg(feature = "telegram")]
use crate::channels::{TelegramChannel, TelegramChannelConfig};

use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Notify, RwLock};
use tracing::{debug, error, info, warn};

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bot configuration.
    pub bot_config: BotConfig,
    /// Whether to enable the CLI channel.
    pub enable_cli: bool,
    /// Whether to enable the Telegram channel.
    pub enable_telegram: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bot_config: BotConfig::default(),
            enable_cli: true,
            enable_telegram: true,
        }
    }
}

/// Gateway service that runs the complete bot.
pub struct Gateway {
    config: GatewayConfig,
    bus: MessageBus,
    channels: Arc<ChannelManager>,
    registry: Arc<SessionRegistry>,
    limiter: Arc<RateLimiter>,
    controller: Arc<SessionController>,
    janitor_status: RwLock<Option<Arc<RwLock<JanitorStatus>>>>,
    running: Arc<RwLock<bool>>,
    shutdown: Notify,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("config", &self.config)
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}

impl Gateway {
    /// Create a gateway backed by the given wallet service.
    #[must_use]
    pub fn new(config: GatewayConfig, wallet: Arc<dyn WalletService>) -> Self {
        let bus = MessageBus::new();
        let channels = Arc::new(ChannelManager::new(bus.clone()));
        let registry = Arc::new(SessionRegistry::new());
        let limiter = Arc::new(RateLimiter::new(config.bot_config.rate_limits.clone()));

        let ctx = FlowContext {
            registry: Arc::clone(&registry),
            limiter: Arc::clone(&limiter),
            waiter: Arc::new(InteractionWaiter::new()),
            transport: Arc::clone(&channels) as Arc<dyn Transport>,
            wallet,
            validator: Arc::new(StandardValidator),
            config: Arc::new(config.bot_config.clone()),
        };

        Self {
            config,
            bus,
            channels,
            registry,
            limiter,
            controller: SessionController::new(ctx),
            janitor_status: RwLock::new(None),
            running: Arc::new(RwLock::new(false)),
            shutdown: Notify::new(),
        }
    }

    /// Get a reference to the message bus.
    #[must_use]
    pub const fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// Get a reference to the channel manager.
    #[must_use]
    pub fn channels(&self) -> &ChannelManager {
        &self.channels
    }

    /// Get the session controller.
    #[must_use]
    pub const fn controller(&self) -> &Arc<SessionController> {
        &self.controller
    }

    /// Register channels based on configuration.
    async fn setup_channels(&self) {
        let channels = &self.config.bot_config.channels;

        if self.config.enable_cli && channels.cli.enabled {
            let cli = CliChannel::with_config(CliChannelConfig::new().user(&channels.cli.user));
            self.channels.register(cli).await;
            info!("CLI channel enabled");
        }

        #[cfg(feature = "telegram")]
        if self.config.enable_telegram && channels.telegram.enabled {
            if channels.telegram.token.is_empty() {
                error!("Telegram enabled but no token configured");
            } else {
                let telegram =
                    TelegramChannel::new(TelegramChannelConfig::from(&channels.telegram));
                self.channels.register(telegram).await;
                info!("Telegram channel enabled");
            }
        }

        #[cfg(not(feature = "telegram"))]
        if self.config.enable_telegram && channels.telegram.enabled {
            warn!("Telegram enabled in config but built without the telegram feature");
        }
    }

    /// Run the gateway.
    ///
    /// Starts all channels and the janitor, then routes inbound events until
    /// Ctrl+C, [`shutdown`](Self::shutdown) or the bus closing.
    ///
    /// # Errors
    ///
    /// Returns an error when no channel could be started.
    pub async fn run(&self) -> Result<()> {
        *self.running.write().await = true;
        info!("Gateway starting...");

        self.setup_channels().await;

        let results = self.channels.start_all().await;
        let mut started = 0;
        for result in &results {
            match result {
                Ok(()) => started += 1,
                Err(e) => error!(error = %e, "failed to start channel"),
            }
        }
        if started == 0 {
            *self.running.write().await = false;
            return Err(BotError::internal("no channel could be started"));
        }

        let janitor = Janitor::new(
            JanitorConfig::from(&self.config.bot_config.session),
            Arc::clone(&self.registry),
            Arc::clone(&self.limiter),
        );
        *self.janitor_status.write().await = Some(janitor.status_handle());
        let janitor = janitor.start();

        info!(channels = started, "Gateway started. Press Ctrl+C to stop.");

        loop {
            tokio::select! {
                event = self.bus.consume_inbound() => {
                    let Some(event) = event else {
                        warn!("inbound bus closed");
                        break;
                    };
                    let user = event.user_id.clone();
                    let outcome = self.controller.route(event).await;
                    debug!(user = %user, ?outcome, "event routed");
                }
                () = self.shutdown.notified() => {
                    info!("shutdown requested");
                    break;
                }
                signal = tokio::signal::ctrl_c() => {
                    if let Err(e) = signal {
                        error!(error = %e, "failed to listen for Ctrl+C");
                    }
                    break;
                }
            }
        }

        info!("Gateway stopping...");
        janitor.stop().await;
        let aborted = self.controller.abort_all();
        if aborted > 0 {
            info!(aborted, "aborted in-flight conversations");
        }
        self.channels.stop_all().await;
        *self.running.write().await = false;

        info!("Gateway stopped");
        Ok(())
    }

    /// Ask a running gateway to stop.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Check if the gateway is running.
    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Snapshot of the gateway and its channels.
    pub async fn status(&self) -> GatewayStatus {
        let bus_stats = self.bus.stats();
        let janitor = match &*self.janitor_status.read().await {
            Some(status) => *status.read().await,
            None => JanitorStatus::default(),
        };

        GatewayStatus {
            running: *self.running.read().await,
            channels: self
                .channels
                .status_all()
                .await
                .into_iter()
                .map(|s| ChannelStatusInfo {
                    name: s.name,
                    state: format!("{:?}", s.state),
                    events_received: s.events_received,
                    prompts_sent: s.prompts_sent,
                    healthy: s.healthy,
                })
                .collect(),
            total_inbound: bus_stats.inbound_count,
            total_routed: bus_stats.consumed_count,
            sessions: self.registry.len().await,
            active_flows: self.controller.active_flows(),
            sessions_evicted: janitor.sessions_evicted,
        }
    }
}

/// Gateway status information.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GatewayStatus {
    /// Whether the gateway is running.
    pub running: bool,
    /// Channel statuses.
    pub channels: Vec<ChannelStatusInfo>,
    /// Total inbound events published.
    pub total_inbound: u64,
    /// Total inbound events routed.
    pub total_routed: u64,
    /// Live sessions.
    pub sessions: usize,
    /// Conversations currently running.
    pub active_flows: usize,
    /// Sessions evicted by the janitor.
    pub sessions_evicted: u64,
}

/// Channel status info for gateway status.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChannelStatusInfo {
    /// Channel name.
    pub name: String,
    /// Channel state.
    pub state: String,
    /// Events received.
    pub events_received: u64,
    /// Prompts rendered.
    pub prompts_sent: u64,
    /// Whether the channel is healthy.
    pub healthy: bool,
}

/// Builder for creating a Gateway.
#[derive(Default)]
pub struct GatewayBuilder {
    config: GatewayConfig,
    wallet: Option<Arc<dyn WalletService>>,
}

impl std::fmt::Debug for GatewayBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl GatewayBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the wallet service.
    #[must_use]
    pub fn wallet(mut self, wallet: Arc<dyn WalletService>) -> Self {
        self.wallet = Some(wallet);
        self
    }

    /// Set the bot configuration.
    #[must_use]
    pub fn bot_config(mut self, config: BotConfig) -> Self {
        self.config.bot_config = config;
        self
    }

    /// Enable or disable the CLI channel.
    #[must_use]
    pub const fn enable_cli(mut self, enable: bool) -> Self {
        self.config.enable_cli = enable;
        self
    }

    /// Enable or disable the Telegram channel.
    #[must_use]
    pub const fn enable_telegram(mut self, enable: bool) -> Self {
        self.config.enable_telegram = enable;
        self
    }

    /// Load configuration from the default location.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub async fn load_config(mut self) -> Result<Self> {
        self.config.bot_config = load_config().await?;
        Ok(self)
    }

    /// Load configuration from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub async fn load_config_from(mut self, path: &Path) -> Result<Self> {
        self.config.bot_config = load_config_from(path).await?;
        Ok(self)
    }

    /// Build the gateway.
    ///
    /// Without an explicit wallet service, the in-memory development wallet
    /// is used behind the configured retry policy.
    #[must_use]
    pub fn build(self) -> Gateway {
        let wallet = self.wallet.unwrap_or_else(|| {
            warn!("no wallet service configured, using the in-memory development wallet");
            Arc::new(RetryingWallet::new(
                DevWallet::new(),
                self.config.bot_config.retry,
            ))
        });
        Gateway::new(self.config, wallet)
    }
}
