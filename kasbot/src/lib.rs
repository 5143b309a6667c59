//! Kasbot - a conversational wallet bot for chat platforms.
//!
//! Users type a trigger command in a chat and are walked through a wallet
//! conversation (pick a network, create or import a wallet, then send,
//! check the balance or view history) by a per-user session state machine.
//!
//! # Architecture
//!
//! - **Message Bus** ([`bus`]) - Queue carrying inbound events from channels
//! - **Channels** ([`channels`]) - Platform integrations (CLI, Telegram)
//! - **Sessions** ([`session`]) - Typed per-user conversation state
//! - **Flows** ([`flow`]) - The state machine driver and its steps
//! - **Waits** ([`interaction`]) - Suspending a flow until the user answers
//! - **Rate limits** ([`ratelimit`]) - Per-user, per-action throttling
//! - **Wallet** ([`wallet`]) - The wallet collaborator contract
//! - **Gateway** ([`gateway`]) - Unified orchestration of all components
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use kasbot::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let gateway = GatewayBuilder::new().load_config().await?.build();
//!     gateway.run().await
//! }
//! ```
//!
//! # Features
//!
//! - `telegram` - Enable Telegram bot support via teloxide

// Core modules
pub mod bus;
pub mod channel;
pub mod channels;
pub mod config;
pub mod error;
pub mod events;
pub mod flow;
pub mod gateway;
pub mod interaction;
pub mod ratelimit;
pub mod session;
pub mod util;
pub mod validate;
pub mod wallet;

// Background services
pub mod janitor;

#[cfg(test)]
mod testkit;

/// Prelude module for convenient imports.
pub mod prelude {
    // Error types (centralized)
    pub use crate::error::{
        BotError, BusError, BusResult, ChannelError, ChannelResult, ConfigError, ConfigResult,
        FlowError, FlowResult, Result, WalletError, WalletResult,
    };

    // Bus
    pub use crate::bus::{InboundHandle, MessageBus};

    // Channel
    pub use crate::channel::{
        Channel, ChannelBase, ChannelManager, ChannelState, ChannelStatus, Transport,
    };
    pub use crate::channels::{CliChannel, CliChannelConfig};
    #[cfg(feature = "telegram")]
    pub use crate::channels::{TelegramChannel, TelegramChannelConfig};

    // Config
    pub use crate::config::{
        BotConfig, ConfigIssue, IssueLevel, config_path, init_config, load_config,
    };

    // Events
    pub use crate::events::{Destination, InboundEvent, Prompt, PromptHandle, PromptOption};

    // Sessions and flows
    pub use crate::flow::{FlowContext, RouteOutcome, SessionController};
    pub use crate::interaction::InteractionWaiter;
    pub use crate::ratelimit::{ActionKey, RateLimitRule, RateLimiter};
    pub use crate::session::{SessionRegistry, SessionState, UserId, UserSession, WalletRef};
    pub use crate::validate::{StandardValidator, Validator};

    // Wallet
    pub use crate::wallet::{DevWallet, Network, RetryConfig, RetryingWallet, WalletService};

    // Gateway
    pub use crate::gateway::{Gateway, GatewayBuilder, GatewayConfig, GatewayStatus};
    pub use crate::janitor::{Janitor, JanitorConfig};
}
