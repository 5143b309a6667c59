//! Wallet collaborator interface.
//!
//! The session machine never touches key material or chain state itself. It
//! calls a [`WalletService`], passing the network carried by the session,
//! and treats every identifier it gets back as opaque.

mod dev;
mod retry;
mod types;

pub use dev::DevWallet;
pub use retry::{RetryConfig, RetryingWallet};
pub use types::{
    AMOUNT_SCALE, Balance, GeneratedWallet, HistoryEntry, ImportedWallet, NATIVE_TICKER, Network,
    SOMPI_PER_KAS, TokenBalance, TxKind, UnknownNetwork, format_amount, to_minor_units,
};

use crate::error::WalletResult;
use crate::session::UserId;
use async_trait::async_trait;

/// Cryptographic and chain operations used by the conversation steps.
#[async_trait]
pub trait WalletService: Send + Sync {
    /// Generate a fresh wallet for the user on `network`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::WalletError::Creation`] when key generation fails.
    async fn generate_wallet(&self, user: &UserId, network: Network)
    -> WalletResult<GeneratedWallet>;

    /// Import a wallet from a private key.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::WalletError::Import`] when the key is rejected.
    async fn import_wallet(
        &self,
        private_key: &str,
        user: &UserId,
        network: Network,
    ) -> WalletResult<ImportedWallet>;

    /// Send `amount` minor units to `recipient`. Returns the transaction id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::WalletError::Transaction`] when the transfer
    /// cannot be built or submitted.
    async fn send_funds(
        &self,
        user: &UserId,
        amount: u64,
        recipient: &str,
        network: Network,
    ) -> WalletResult<String>;

    /// Native and token balances of the user's wallet.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::WalletError::Query`] when the lookup fails.
    async fn get_balance(&self, user: &UserId, network: Network) -> WalletResult<Balance>;

    /// Transactions touching `address`, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::WalletError::Query`] when the lookup fails.
    async fn get_history(&self, address: &str, network: Network)
    -> WalletResult<Vec<HistoryEntry>>;
}
