//! Retry-with-backoff wrapper for wallet queries.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::types::{Balance, GeneratedWallet, HistoryEntry, ImportedWallet, Network};
use super::WalletService;
use crate::error::WalletResult;
use crate::session::UserId;

/// Retry configuration for transient wallet failures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Initial delay between retries in milliseconds.
    pub initial_delay_ms: u64,
    /// Exponential backoff multiplier.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Calculate delay for a given retry number (0-indexed).
    #[must_use]
    #[allow(
        clippy::cast_possible_wrap,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(delay_ms as u64)
    }
}

/// Wraps a [`WalletService`] and retries balance and history lookups.
///
/// Creation, import and transfers are passed through untouched: repeating a
/// transfer could move funds twice.
#[derive(Debug)]
pub struct RetryingWallet<W> {
    inner: W,
    config: RetryConfig,
}

impl<W: WalletService> RetryingWallet<W> {
    /// Wrap `inner` with the given retry policy.
    pub const fn new(inner: W, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// The wrapped service.
    pub const fn inner(&self) -> &W {
        &self.inner
    }

    async fn retry<T, F, Fut>(&self, op: &'static str, mut call: F) -> WalletResult<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = WalletResult<T>> + Send,
        T: Send,
    {
        let attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match call().await {
                Err(e) if e.is_transient() && attempt + 1 < attempts => {
                    let delay = self.config.delay_for_attempt(attempt);
                    warn!(op, attempt = attempt + 1, ?delay, error = %e, "wallet query failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

#[async_trait]
impl<W: WalletService> WalletService for RetryingWallet<W> {
    async fn generate_wallet(
        &self,
        user: &UserId,
        network: Network,
    ) -> WalletResult<GeneratedWallet> {
        self.inner.generate_wallet(user, network).await
    }

    async fn import_wallet(
        &self,
        private_key: &str,
        user: &UserId,
        network: Network,
    ) -> WalletResult<ImportedWallet> {
        self.inner.import_wallet(private_key, user, network).await
    }

    async fn send_funds(
        &self,
        user: &UserId,
        amount: u64,
        recipient: &str,
        network: Network,
    ) -> WalletResult<String> {
        self.inner.send_funds(user, amount, recipient, network).await
    }

    async fn get_balance(&self, user: &UserId, network: Network) -> WalletResult<Balance> {
        self.retry("balance", || self.inner.get_balance(user, network))
            .await
    }

    async fn get_history(
        &self,
        address: &str,
        network: Network,
    ) -> WalletResult<Vec<HistoryEntry>> {
        self.retry("history", || self.inner.get_history(address, network))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::ScriptedWallet;

    #[test]
    fn test_delay_for_attempt() {
        let config = RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 1000,
            backoff_multiplier: 2.0,
        };
        assert_eq!(config.delay_for_attempt(0).as_millis(), 1000);
        assert_eq!(config.delay_for_attempt(1).as_millis(), 2000);
        assert_eq!(config.delay_for_attempt(2).as_millis(), 4000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_query_is_retried() {
        let scripted = ScriptedWallet::new();
        scripted.fail_queries(2);
        let wallet = RetryingWallet::new(scripted, RetryConfig::default());

        let balance = wallet
            .get_balance(&UserId::new("test", "alice"), Network::Mainnet)
            .await
            .unwrap();
        assert_eq!(balance.native, wallet.inner().balance().native);
        assert_eq!(wallet.inner().query_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let scripted = ScriptedWallet::new();
        scripted.fail_queries(10);
        let wallet = RetryingWallet::new(scripted, RetryConfig::default());

        assert!(
            wallet
                .get_history("kaspa:qabc", Network::Mainnet)
                .await
                .is_err()
        );
        assert_eq!(wallet.inner().query_calls(), 3);
    }

    #[tokio::test]
    async fn test_transfers_are_not_retried() {
        let scripted = ScriptedWallet::new();
        scripted.fail_sends(true);
        let wallet = RetryingWallet::new(scripted, RetryConfig::default());

        assert!(
            wallet
                .send_funds(&UserId::new("test", "a"), 1, "kaspa:qabc", Network::Mainnet)
                .await
                .is_err()
        );
        assert_eq!(wallet.inner().send_calls().len(), 1);
    }
}
