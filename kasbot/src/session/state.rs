//! Session identity and the typed state machine states.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::Instant;

use crate::wallet::Network;

/// Stable identity of a chat user, qualified by channel (e.g. `telegram:42`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Build an identity from a channel name and the platform's sender id.
    pub fn new(channel: &str, sender: impl fmt::Display) -> Self {
        Self(format!("{channel}:{sender}"))
    }

    /// The raw key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Channel part of the identity.
    #[must_use]
    pub fn channel(&self) -> &str {
        self.0.split_once(':').map_or(self.0.as_str(), |(c, _)| c)
    }

    /// Platform sender id part of the identity.
    #[must_use]
    pub fn sender(&self) -> &str {
        self.0.split_once(':').map_or("", |(_, s)| s)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The wallet a session operates on once created or imported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletRef {
    /// Network the wallet lives on.
    pub network: Network,
    /// Wallet address.
    pub address: String,
}

impl WalletRef {
    /// Create a wallet reference.
    pub fn new(network: Network, address: impl Into<String>) -> Self {
        Self {
            network,
            address: address.into(),
        }
    }
}

/// Where a user currently is in the conversation.
///
/// Each variant carries exactly the data valid at that point, so a state at
/// or after network choice can never lack a network.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    /// No flow started yet.
    #[default]
    Idle,
    /// Choosing a network.
    NetworkSelection,
    /// Choosing between creating and importing a wallet.
    WalletOptions {
        /// Chosen network.
        network: Network,
    },
    /// Waiting for a private key.
    ImportingWallet {
        /// Chosen network.
        network: Network,
    },
    /// The wallet actions menu.
    WalletActions {
        /// Active wallet.
        wallet: WalletRef,
    },
    /// Inside the send flow.
    SendingKaspa {
        /// Active wallet.
        wallet: WalletRef,
    },
    /// Fetching the balance.
    CheckingBalance {
        /// Active wallet.
        wallet: WalletRef,
    },
    /// Fetching the transaction history.
    ViewingHistory {
        /// Active wallet.
        wallet: WalletRef,
    },
}

impl SessionState {
    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::NetworkSelection => "NETWORK_SELECTION",
            Self::WalletOptions { .. } => "WALLET_OPTIONS",
            Self::ImportingWallet { .. } => "IMPORTING_WALLET",
            Self::WalletActions { .. } => "WALLET_ACTIONS",
            Self::SendingKaspa { .. } => "SENDING_KASPA",
            Self::CheckingBalance { .. } => "CHECKING_BALANCE",
            Self::ViewingHistory { .. } => "VIEWING_HISTORY",
        }
    }

    /// Whether inbound triggers must be ignored while in this state.
    ///
    /// These states own the user's single interaction slot until they finish.
    #[must_use]
    pub const fn is_non_interruptible(&self) -> bool {
        matches!(self, Self::SendingKaspa { .. } | Self::ImportingWallet { .. })
    }

    /// Network chosen for this session, if any.
    #[must_use]
    pub const fn network(&self) -> Option<Network> {
        match self {
            Self::Idle | Self::NetworkSelection => None,
            Self::WalletOptions { network } | Self::ImportingWallet { network } => Some(*network),
            Self::WalletActions { wallet }
            | Self::SendingKaspa { wallet }
            | Self::CheckingBalance { wallet }
            | Self::ViewingHistory { wallet } => Some(wallet.network),
        }
    }

    /// Active wallet, if one has been created or imported.
    #[must_use]
    pub const fn wallet(&self) -> Option<&WalletRef> {
        match self {
            Self::WalletActions { wallet }
            | Self::SendingKaspa { wallet }
            | Self::CheckingBalance { wallet }
            | Self::ViewingHistory { wallet } => Some(wallet),
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One user's conversation context.
#[derive(Debug, Clone)]
pub struct UserSession {
    user_id: UserId,
    state: SessionState,
    created_at: Instant,
    last_activity: Instant,
}

impl UserSession {
    /// Create a session in [`SessionState::Idle`].
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        let now = Instant::now();
        Self {
            user_id,
            state: SessionState::Idle,
            created_at: now,
            last_activity: now,
        }
    }

    /// Owning user.
    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    /// Selected network.
    #[must_use]
    pub const fn network(&self) -> Option<Network> {
        self.state.network()
    }

    /// Wallet address, once known.
    #[must_use]
    pub fn address(&self) -> Option<&str> {
        self.state.wallet().map(|w| w.address.as_str())
    }

    /// When the session was created.
    #[must_use]
    pub const fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Last state-entering event.
    #[must_use]
    pub const fn last_activity(&self) -> Instant {
        self.last_activity
    }

    pub(crate) fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub(crate) fn enter(&mut self, state: SessionState) {
        self.state = state;
        self.touch();
    }
}
