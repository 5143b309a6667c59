//! In-memory development wallet.
//!
//! Keeps one account per (user, network) in process memory. Addresses, keys
//! and transaction ids are random but well-formed, so the whole conversation
//! can be exercised locally without a node.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::types::{
    Balance, GeneratedWallet, HistoryEntry, ImportedWallet, Network, SOMPI_PER_KAS, TokenBalance,
    TxKind,
};
use super::WalletService;
use crate::error::{WalletError, WalletResult};
use crate::session::UserId;
use crate::util::timestamp_ms;

const ADDRESS_CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const ADDRESS_BODY_LEN: usize = 60;

const MNEMONIC_WORDS: [&str; 32] = [
    "amber", "anchor", "bamboo", "beacon", "cactus", "canyon", "cedar", "comet", "coral", "delta",
    "ember", "falcon", "fjord", "glacier", "harbor", "island", "jasper", "kernel", "lagoon",
    "maple", "meadow", "nebula", "orbit", "pebble", "quartz", "raven", "saddle", "timber",
    "tundra", "velvet", "willow", "zephyr",
];

/// Starting balance for accounts on test networks, in whole coins.
const TESTNET_FAUCET_KAS: u64 = 1_000;

#[derive(Debug, Clone)]
struct DevAccount {
    address: String,
    balance: u64,
    history: Vec<HistoryEntry>,
}

impl DevAccount {
    fn new(address: String, network: Network) -> Self {
        let balance = if network.is_testnet() {
            TESTNET_FAUCET_KAS * SOMPI_PER_KAS
        } else {
            0
        };
        let mut history = Vec::new();
        if balance > 0 {
            history.push(HistoryEntry {
                id: random_hex(),
                amount: balance,
                kind: TxKind::Received,
                timestamp: timestamp_ms(),
            });
        }
        Self {
            address,
            balance,
            history,
        }
    }
}

/// Process-local wallet ledger.
#[derive(Debug, Default)]
pub struct DevWallet {
    accounts: RwLock<HashMap<(UserId, Network), DevAccount>>,
}

impl DevWallet {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of accounts held.
    pub async fn account_count(&self) -> usize {
        self.accounts.read().await.len()
    }
}

fn random_bytes(len: usize) -> Vec<u8> {
    std::iter::repeat_with(|| Uuid::new_v4().into_bytes())
        .flatten()
        .take(len)
        .collect()
}

fn random_hex() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

fn encode_address(network: Network, bytes: &[u8]) -> String {
    let body: String = bytes
        .iter()
        .take(ADDRESS_BODY_LEN)
        .map(|b| char::from(ADDRESS_CHARSET[usize::from(b % 32)]))
        .collect();
    format!("{}:q{body}", network.address_prefix())
}

fn address_from_key(network: Network, private_key: &str) -> WalletResult<String> {
    let key = private_key.trim().trim_start_matches("0x");
    if key.len() != 64 || !key.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(WalletError::Import("expected 64 hex characters".to_string()));
    }
    Ok(encode_address(network, &key.to_ascii_lowercase().into_bytes()))
}

fn random_mnemonic() -> String {
    random_bytes(12)
        .into_iter()
        .map(|b| MNEMONIC_WORDS[usize::from(b % 32)])
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl WalletService for DevWallet {
    async fn generate_wallet(
        &self,
        user: &UserId,
        network: Network,
    ) -> WalletResult<GeneratedWallet> {
        let private_key = random_hex();
        let address = address_from_key(network, &private_key)
            .map_err(|e| WalletError::Creation(e.to_string()))?;
        let wallet = GeneratedWallet {
            address: address.clone(),
            private_key,
            mnemonic: random_mnemonic(),
        };

        self.accounts
            .write()
            .await
            .insert((user.clone(), network), DevAccount::new(address, network));
        info!(user = %user, %network, address = %wallet.address, "dev wallet generated");
        Ok(wallet)
    }

    async fn import_wallet(
        &self,
        private_key: &str,
        user: &UserId,
        network: Network,
    ) -> WalletResult<ImportedWallet> {
        let address = address_from_key(network, private_key)?;
        self.accounts
            .write()
            .await
            .entry((user.clone(), network))
            .and_modify(|account| account.address.clone_from(&address))
            .or_insert_with(|| DevAccount::new(address.clone(), network));
        info!(user = %user, %network, %address, "dev wallet imported");
        Ok(ImportedWallet { address })
    }

    async fn send_funds(
        &self,
        user: &UserId,
        amount: u64,
        recipient: &str,
        network: Network,
    ) -> WalletResult<String> {
        let mut accounts = self.accounts.write().await;
        let sender = accounts
            .get_mut(&(user.clone(), network))
            .ok_or_else(|| WalletError::Transaction("no wallet on this network".to_string()))?;

        if amount > sender.balance {
            return Err(WalletError::Transaction("insufficient funds".to_string()));
        }

        let tx_id = random_hex();
        let now = timestamp_ms();
        sender.balance -= amount;
        sender.history.insert(
            0,
            HistoryEntry {
                id: tx_id.clone(),
                amount,
                kind: TxKind::Sent,
                timestamp: now,
            },
        );

        if let Some(((_, _), receiver)) = accounts
            .iter_mut()
            .find(|((_, n), acct)| *n == network && acct.address == recipient)
        {
            receiver.balance = receiver.balance.saturating_add(amount);
            receiver.history.insert(
                0,
                HistoryEntry {
                    id: tx_id.clone(),
                    amount,
                    kind: TxKind::Received,
                    timestamp: now,
                },
            );
        }

        debug!(user = %user, %network, amount, %recipient, tx = %tx_id, "dev transfer");
        Ok(tx_id)
    }

    async fn get_balance(&self, user: &UserId, network: Network) -> WalletResult<Balance> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .get(&(user.clone(), network))
            .map_or_else(Balance::default, |account| Balance {
                native: account.balance,
                tokens: if network.is_testnet() {
                    vec![TokenBalance {
                        ticker: "TKAS".to_string(),
                        amount: "0".to_string(),
                    }]
                } else {
                    Vec::new()
                },
            }))
    }

    async fn get_history(
        &self,
        address: &str,
        network: Network,
    ) -> WalletResult<Vec<HistoryEntry>> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .iter()
            .find(|((_, n), account)| *n == network && account.address == address)
            .map(|(_, account)| account.history.clone())
            .unwrap_or_default())
    }
}
