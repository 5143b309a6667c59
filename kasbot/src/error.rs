//! Unified error types for kasbot.
//!
//! Infrastructure errors (bus, channels, config, wallet collaborator) roll up
//! into [`BotError`]. Failures raised while a user is inside a conversation
//! are [`FlowError`]s: each carries a machine code and a remediation message
//! and never leaves the session controller.

use std::fmt;
use std::time::Duration;

use crate::ratelimit::ActionKey;
use crate::util::ceil_secs;

// ============================================================================
// Main Error Type
// ============================================================================

/// The main error type for kasbot operations.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    /// Message bus error.
    #[error("bus: {0}")]
    Bus(#[from] BusError),

    /// Channel error.
    #[error("channel: {0}")]
    Channel(#[from] ChannelError),

    /// Configuration error.
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    /// Wallet collaborator error.
    #[error("wallet: {0}")]
    Wallet(#[from] WalletError),

    /// IO error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic internal error.
    #[error("{0}")]
    Internal(String),
}

impl BotError {
    /// Create a config error from a string.
    #[inline]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(ConfigError::Invalid(msg.into()))
    }

    /// Create an internal error.
    #[inline]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type alias for kasbot operations.
pub type Result<T> = std::result::Result<T, BotError>;

// ============================================================================
// Message Bus Errors
// ============================================================================

/// Error type for message bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// Failed to send inbound event.
    #[error("inbound channel closed")]
    InboundClosed,
}

/// Result type for message bus operations.
pub type BusResult<T> = std::result::Result<T, BusError>;

// ============================================================================
// Channel Errors
// ============================================================================

/// Error type for channel (transport) operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Failed to start the channel.
    #[error("start failed: {0}")]
    StartFailed(String),

    /// Failed to send a prompt.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Failed to delete a prompt or message.
    #[error("delete failed: {0}")]
    DeleteFailed(String),

    /// A direct-message channel could not be opened for the user.
    #[error("direct messages unavailable: {0}")]
    DirectUnavailable(String),

    /// No channel is registered under this name.
    #[error("channel not found: {0}")]
    NotFound(String),

    /// Channel is not connected.
    #[error("not connected")]
    NotConnected,
}

impl ChannelError {
    /// Create a send failed error.
    #[inline]
    pub fn send(msg: impl Into<String>) -> Self {
        Self::SendFailed(msg.into())
    }

    /// Create a delete failed error.
    #[inline]
    pub fn delete(msg: impl Into<String>) -> Self {
        Self::DeleteFailed(msg.into())
    }
}

/// Result type for channel operations.
pub type ChannelResult<T> = std::result::Result<T, ChannelError>;

// ============================================================================
// Configuration Errors
// ============================================================================

/// Error type for configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("parse: {0}")]
    Parse(#[from] serde_json::Error),

    /// Invalid value.
    #[error("invalid: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Create an invalid value error.
    #[inline]
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// ============================================================================
// Wallet Errors
// ============================================================================

/// Error type reported by the wallet collaborator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WalletError {
    /// Key material could not be generated.
    #[error("creation failed: {0}")]
    Creation(String),

    /// The private key was malformed or rejected.
    #[error("import failed: {0}")]
    Import(String),

    /// The transaction could not be built, signed or submitted.
    #[error("transaction failed: {0}")]
    Transaction(String),

    /// Balance or history lookup failed.
    #[error("query failed: {0}")]
    Query(String),
}

impl WalletError {
    /// Whether retrying the same call may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Query(_))
    }
}

/// Result type for wallet operations.
pub type WalletResult<T> = std::result::Result<T, WalletError>;

// ============================================================================
// Flow Errors
// ============================================================================

/// A failure raised inside a conversation step.
///
/// Validators and the rate limiter never raise; call sites translate their
/// boolean answers into these variants.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// The user exhausted the budget for an action.
    #[error("rate limit exceeded for {action}, retry in {remaining:?}")]
    RateLimitExceeded {
        /// Throttled action.
        action: ActionKey,
        /// Time until the window resets.
        remaining: Duration,
    },

    /// A user-supplied value failed validation.
    #[error("invalid {field}")]
    InvalidInput {
        /// Name of the offending field.
        field: &'static str,
    },

    /// The session is missing data required by the step.
    #[error("invalid session: {reason}")]
    InvalidSession {
        /// What was wrong.
        reason: String,
    },

    /// No answer arrived before the deadline.
    #[error("no response for {step} within the deadline")]
    InteractionTimeout {
        /// Step that was waiting.
        step: &'static str,
    },

    /// Wallet generation failed.
    #[error("wallet creation failed: {0}")]
    WalletCreation(String),

    /// Private-key import failed.
    #[error("wallet import failed: {0}")]
    WalletImport(String),

    /// Sending funds failed.
    #[error("transaction failed: {0}")]
    Transaction(String),

    /// A direct-message channel could not be used.
    #[error("channel type error: {0}")]
    ChannelType(String),

    /// Balance or history lookup failed.
    #[error("wallet query failed: {0}")]
    Wallet(String),

    /// A prompt could not be delivered.
    #[error("transport: {0}")]
    Transport(#[from] ChannelError),

    /// The flow died unexpectedly.
    #[error("internal: {0}")]
    Internal(String),
}

impl FlowError {
    /// Create an invalid-input error.
    #[inline]
    #[must_use]
    pub const fn invalid(field: &'static str) -> Self {
        Self::InvalidInput { field }
    }

    /// Create a timeout error.
    #[inline]
    #[must_use]
    pub const fn timeout(step: &'static str) -> Self {
        Self::InteractionTimeout { step }
    }

    /// Create an invalid-session error.
    #[inline]
    pub fn session(reason: impl Into<String>) -> Self {
        Self::InvalidSession {
            reason: reason.into(),
        }
    }

    /// Create an internal error.
    #[inline]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Short machine-oriented code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::InvalidSession { .. } => "INVALID_SESSION",
            Self::InteractionTimeout { .. } => "INTERACTION_TIMEOUT",
            Self::WalletCreation(_) => "WALLET_CREATION_ERROR",
            Self::WalletImport(_) => "WALLET_IMPORT_ERROR",
            Self::Transaction(_) => "TRANSACTION_ERROR",
            Self::ChannelType(_) => "CHANNEL_TYPE_ERROR",
            Self::Wallet(_) => "WALLET_ERROR",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Human-readable remediation shown to the user.
    #[must_use]
    pub fn remediation(&self) -> String {
        match self {
            Self::RateLimitExceeded { action, remaining } => format!(
                "You're doing that too often. Please wait {}s before using {} again.",
                ceil_secs(*remaining).max(1),
                action.label()
            ),
            Self::InvalidInput { field } => {
                format!("That {field} doesn't look right. Please check it and try again.")
            }
            Self::InvalidSession { .. } => {
                "Your session is no longer valid. Please start again.".to_string()
            }
            Self::InteractionTimeout { step } => {
                format!("No response received for {step} in time.")
            }
            Self::WalletCreation(_) => {
                "The wallet could not be created. Please try again.".to_string()
            }
            Self::WalletImport(_) => {
                "That private key could not be imported. Check it and try again.".to_string()
            }
            Self::Transaction(reason) => format!("The transaction failed: {reason}"),
            Self::ChannelType(_) => {
                "I couldn't reach you by direct message. Please enable DMs and try again."
                    .to_string()
            }
            Self::Wallet(_) => {
                "The wallet service is unavailable right now. Please try again later."
                    .to_string()
            }
            Self::Transport(_) => "Something went wrong showing that screen.".to_string(),
            Self::Internal(_) => {
                "Something broke on our side. Your session was reset to the last menu.".to_string()
            }
        }
    }
}

impl From<WalletError> for FlowError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::Creation(msg) => Self::WalletCreation(msg),
            WalletError::Import(msg) => Self::WalletImport(msg),
            WalletError::Transaction(msg) => Self::Transaction(msg),
            WalletError::Query(msg) => Self::Wallet(msg),
        }
    }
}

/// Result type for conversation steps.
pub type FlowResult<T> = std::result::Result<T, FlowError>;

// ============================================================================
// Display Helpers
// ============================================================================

/// A wrapper that displays errors in a user-friendly format.
#[derive(Debug)]
pub struct DisplayError<'a>(pub &'a BotError);

impl fmt::Display for DisplayError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            BotError::Config(e) => write!(f, "Configuration error: {e}"),
            BotError::Channel(e) => write!(f, "Channel error: {e}"),
            BotError::Bus(e) => write!(f, "Message bus error: {e}"),
            BotError::Wallet(e) => write!(f, "Wallet error: {e}"),
            BotError::Io(e) => write!(f, "IO error: {e}"),
            BotError::Json(e) => write!(f, "JSON error: {e}"),
            BotError::Internal(e) => write!(f, "Internal error: {e}"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversions() {
        let bot_err: BotError = BusError::InboundClosed.into();
        assert!(matches!(bot_err, BotError::Bus(_)));

        let bot_err: BotError = ChannelError::NotConnected.into();
        assert!(matches!(bot_err, BotError::Channel(_)));

        let flow_err: FlowError = WalletError::Import("bad key".into()).into();
        assert_eq!(flow_err.code(), "WALLET_IMPORT_ERROR");
    }

    #[test]
    fn test_rate_limit_remediation_rounds_up() {
        let err = FlowError::RateLimitExceeded {
            action: ActionKey::Balance,
            remaining: Duration::from_millis(2_100),
        };
        assert_eq!(err.code(), "RATE_LIMIT_EXCEEDED");
        assert!(err.remediation().contains("3s"));
        assert!(err.remediation().contains("balance"));
    }

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            FlowError::invalid("address"),
            FlowError::session("missing wallet"),
            FlowError::timeout("network selection"),
            FlowError::WalletCreation(String::new()),
            FlowError::WalletImport(String::new()),
            FlowError::Transaction(String::new()),
            FlowError::ChannelType(String::new()),
            FlowError::Wallet(String::new()),
            FlowError::Transport(ChannelError::NotConnected),
            FlowError::internal("task panicked"),
        ];
        let mut codes: Vec<_> = errors.iter().map(FlowError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_display_error() {
        let err = BotError::config("bad value");
        assert_eq!(
            DisplayError(&err).to_string(),
            "Configuration error: invalid: bad value"
        );
    }
}
