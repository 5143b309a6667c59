//! Configuration for kasbot.
//!
//! Stored as JSON at `~/.kasbot/config.json`. Every section has defaults, so
//! an empty file (or no file at all) yields a working local setup.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::ratelimit::{ActionKey, RateLimitRule, default_rules};
use crate::util::config_dir;
use crate::wallet::{Network, RetryConfig};

/// Environment variable that overrides the Telegram bot token.
pub const TELEGRAM_TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Command word that starts or resumes a session.
    pub command: String,
    /// Conversation deadlines and limits.
    pub flow: FlowConfig,
    /// Per-action rate limits.
    pub rate_limits: BTreeMap<ActionKey, RateLimitRule>,
    /// Session lifecycle.
    pub session: SessionConfig,
    /// Block explorer transaction URL prefix per network.
    pub explorers: BTreeMap<Network, String>,
    /// Retry policy for wallet queries.
    pub retry: RetryConfig,
    /// Channel settings.
    pub channels: ChannelsConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            command: "!wallet".to_string(),
            flow: FlowConfig::default(),
            rate_limits: default_rules(),
            session: SessionConfig::default(),
            explorers: default_explorers(),
            retry: RetryConfig::default(),
            channels: ChannelsConfig::default(),
        }
    }
}

fn default_explorers() -> BTreeMap<Network, String> {
    BTreeMap::from([
        (Network::Mainnet, "https://explorer.kaspa.org/txs/".to_string()),
        (
            Network::Testnet10,
            "https://explorer-tn10.kaspa.org/txs/".to_string(),
        ),
    ])
}

/// Deadlines and limits applied inside a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Deadline for button selections, in seconds.
    pub selection_timeout_secs: u64,
    /// Deadline for free-text replies, in seconds.
    pub text_timeout_secs: u64,
    /// Deadline for the send confirmation, in seconds.
    pub confirm_timeout_secs: u64,
    /// Number of history entries shown.
    pub history_limit: usize,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            selection_timeout_secs: 300,
            text_timeout_secs: 60,
            confirm_timeout_secs: 300,
            history_limit: 10,
        }
    }
}

impl FlowConfig {
    /// Deadline for button selections.
    #[must_use]
    pub const fn selection_timeout(&self) -> Duration {
        Duration::from_secs(self.selection_timeout_secs)
    }

    /// Deadline for free-text replies.
    #[must_use]
    pub const fn text_timeout(&self) -> Duration {
        Duration::from_secs(self.text_timeout_secs)
    }

    /// Deadline for the send confirmation.
    #[must_use]
    pub const fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }
}

/// Session lifecycle settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Sessions idle this long are evicted, in seconds.
    pub idle_ttl_secs: u64,
    /// How often the janitor runs, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_ttl_secs: 30 * 60,
            sweep_interval_secs: 60,
        }
    }
}

impl SessionConfig {
    /// Idle time after which a session is evicted.
    #[must_use]
    pub const fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }

    /// Janitor interval.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Channel settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    /// Local terminal channel.
    pub cli: CliConfig,
    /// Telegram channel.
    pub telegram: TelegramConfig,
}

/// Local terminal channel settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Whether the terminal channel is started.
    pub enabled: bool,
    /// Sender id used for terminal input.
    pub user: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            user: "local".to_string(),
        }
    }
}

/// Telegram channel settings.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Whether the Telegram channel is started.
    pub enabled: bool,
    /// Bot token from `@BotFather`.
    pub token: String,
    /// Allowed user ids or usernames. Empty allows everyone.
    pub allow_from: Vec<String>,
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("enabled", &self.enabled)
            .field("token", &if self.token.is_empty() { "" } else { "***" })
            .field("allow_from", &self.allow_from)
            .finish()
    }
}

/// Severity of a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IssueLevel {
    /// Works, but probably not what was intended.
    Warning,
    /// The bot cannot run correctly with this value.
    Error,
}

/// A problem found by [`BotConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    /// Severity.
    pub level: IssueLevel,
    /// Dotted path of the offending field.
    pub field: String,
    /// What is wrong.
    pub message: String,
}

impl ConfigIssue {
    fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: IssueLevel::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: IssueLevel::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            IssueLevel::Warning => "warning",
            IssueLevel::Error => "error",
        };
        write!(f, "{level}: {}: {}", self.field, self.message)
    }
}

impl BotConfig {
    /// Apply environment overrides.
    pub fn apply_env(&mut self) {
        if let Some(token) = std::env::var(TELEGRAM_TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
        {
            debug!("telegram token taken from environment");
            self.channels.telegram.token = token.trim().to_string();
        }
    }

    /// Check the configuration for mistakes.
    #[must_use]
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.command.trim().is_empty() {
            issues.push(ConfigIssue::error("command", "must not be empty"));
        } else if self.command.split_whitespace().count() > 1 {
            issues.push(ConfigIssue::error("command", "must be a single word"));
        }

        for (field, secs) in [
            ("flow.selection_timeout_secs", self.flow.selection_timeout_secs),
            ("flow.text_timeout_secs", self.flow.text_timeout_secs),
            ("flow.confirm_timeout_secs", self.flow.confirm_timeout_secs),
            ("session.sweep_interval_secs", self.session.sweep_interval_secs),
        ] {
            if secs == 0 {
                issues.push(ConfigIssue::error(field, "must be greater than zero"));
            }
        }

        if self.flow.history_limit == 0 {
            issues.push(ConfigIssue::warning(
                "flow.history_limit",
                "history will always be empty",
            ));
        }

        if self.session.idle_ttl_secs < self.flow.selection_timeout_secs {
            issues.push(ConfigIssue::warning(
                "session.idle_ttl_secs",
                "shorter than the selection timeout; waiting sessions may be evicted",
            ));
        }

        for (action, rule) in &self.rate_limits {
            let field = format!("rate_limits.{}", serde_key(action));
            if rule.window_secs == 0 {
                issues.push(ConfigIssue::error(&field, "window_secs must be greater than zero"));
            }
            if rule.max_attempts == 0 {
                issues.push(ConfigIssue::warning(&field, "max_attempts 0 blocks this action"));
            }
        }

        for (network, url) in &self.explorers {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                issues.push(ConfigIssue::warning(
                    format!("explorers.{}", network.id()),
                    "expected an http(s) URL prefix",
                ));
            }
        }

        let telegram = &self.channels.telegram;
        if telegram.enabled && telegram.token.trim().is_empty() {
            issues.push(ConfigIssue::error(
                "channels.telegram.token",
                format!("required when telegram is enabled (or set {TELEGRAM_TOKEN_ENV})"),
            ));
        }

        if !self.channels.cli.enabled && !telegram.enabled {
            issues.push(ConfigIssue::warning("channels", "no channel is enabled"));
        }

        issues
    }

    /// Whether [`validate`](Self::validate) reports any error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.validate()
            .iter()
            .any(|issue| issue.level == IssueLevel::Error)
    }

    /// Explorer link for a transaction, if one is configured for `network`.
    #[must_use]
    pub fn explorer_link(&self, network: Network, tx_id: &str) -> Option<String> {
        self.explorers
            .get(&network)
            .filter(|prefix| !prefix.is_empty())
            .map(|prefix| format!("{prefix}{tx_id}"))
    }
}

fn serde_key(action: &ActionKey) -> String {
    serde_json::to_value(action)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| action.label().to_string())
}

/// Default configuration file path.
#[must_use]
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Load configuration from the default path.
///
/// A missing file yields the defaults. Environment overrides are applied.
///
/// # Errors
///
/// Returns an error when the file exists but cannot be read or parsed.
pub async fn load_config() -> ConfigResult<BotConfig> {
    load_config_from(&config_path()).await
}

/// Load configuration from `path`.
///
/// # Errors
///
/// Returns an error when the file exists but cannot be read or parsed.
pub async fn load_config_from(path: &Path) -> ConfigResult<BotConfig> {
    let mut config = match tokio::fs::read_to_string(path).await {
        Ok(content) => serde_json::from_str::<BotConfig>(&content)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no config file, using defaults");
            BotConfig::default()
        }
        Err(e) => return Err(ConfigError::Io(e)),
    };
    config.apply_env();
    Ok(config)
}

/// Write configuration to the default path.
///
/// # Errors
///
/// Returns an error when the directory or file cannot be written.
pub async fn save_config(config: &BotConfig) -> ConfigResult<()> {
    save_config_to(config, &config_path()).await
}

/// Write configuration to `path`, creating parent directories.
///
/// # Errors
///
/// Returns an error when the directory or file cannot be written.
pub async fn save_config_to(config: &BotConfig, path: &Path) -> ConfigResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let content = serde_json::to_string_pretty(config)?;
    tokio::fs::write(path, content).await?;
    info!(path = %path.display(), "configuration saved");
    Ok(())
}

/// Write the default configuration to the default path.
///
/// # Errors
///
/// Returns an error when the file cannot be written.
pub async fn init_config() -> ConfigResult<BotConfig> {
    let config = BotConfig::default();
    save_config(&config).await?;
    Ok(config)
}
