//! Value types exchanged with the wallet collaborator.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Minor units per whole coin (1 KAS = 10^8 sompi).
pub const SOMPI_PER_KAS: u64 = 100_000_000;

/// Number of decimal places carried by the minor unit.
pub const AMOUNT_SCALE: u32 = 8;

/// Ticker used when rendering native amounts.
pub const NATIVE_TICKER: &str = "KAS";

/// A supported wallet network.
///
/// Networks are opaque to the session machine: they are chosen once, carried
/// by the session state and handed back to the wallet collaborator.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Network {
    /// Production network.
    #[serde(rename = "mainnet")]
    Mainnet,
    /// Public testnet 10.
    #[serde(rename = "testnet-10")]
    Testnet10,
    /// Public testnet 11.
    #[serde(rename = "testnet-11")]
    Testnet11,
}

impl Network {
    /// Every network offered on the selection screen, in display order.
    pub const ALL: [Self; 3] = [Self::Mainnet, Self::Testnet10, Self::Testnet11];

    /// Stable identifier, also used as the component id on prompts.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet10 => "testnet-10",
            Self::Testnet11 => "testnet-11",
        }
    }

    /// Human-readable name.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Mainnet => "Mainnet",
            Self::Testnet10 => "Testnet-10",
            Self::Testnet11 => "Testnet-11",
        }
    }

    /// Address prefix expected for this network.
    #[must_use]
    pub const fn address_prefix(self) -> &'static str {
        match self {
            Self::Mainnet => "kaspa",
            Self::Testnet10 | Self::Testnet11 => "kaspatest",
        }
    }

    /// Whether this is a test network.
    #[must_use]
    pub const fn is_testnet(self) -> bool {
        !matches!(self, Self::Mainnet)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error returned when a string does not name a supported network.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown network: {0}")]
pub struct UnknownNetwork(pub String);

impl FromStr for Network {
    type Err = UnknownNetwork;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Self::ALL
            .into_iter()
            .find(|n| n.id().eq_ignore_ascii_case(needle) || n.label().eq_ignore_ascii_case(needle))
            .ok_or_else(|| UnknownNetwork(needle.to_string()))
    }
}

/// Material returned when a fresh wallet is generated.
#[derive(Clone, Serialize, Deserialize)]
pub struct GeneratedWallet {
    /// Receive address.
    pub address: String,
    /// Hex-encoded private key.
    pub private_key: String,
    /// Recovery phrase.
    pub mnemonic: String,
}

impl fmt::Debug for GeneratedWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedWallet")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Result of importing an existing private key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedWallet {
    /// Address derived from the imported key.
    pub address: String,
}

/// A non-native token held by the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBalance {
    /// Token ticker.
    pub ticker: String,
    /// Display amount, already scaled by the token's decimals.
    pub amount: String,
}

/// Wallet balance snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Native balance in minor units.
    pub native: u64,
    /// Token balances, possibly empty.
    #[serde(default)]
    pub tokens: Vec<TokenBalance>,
}

/// Direction of a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    /// Funds left the wallet.
    Sent,
    /// Funds arrived in the wallet.
    Received,
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sent => f.write_str("sent"),
            Self::Received => f.write_str("received"),
        }
    }
}

/// One transaction in the wallet history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Transaction identifier.
    pub id: String,
    /// Amount in minor units.
    pub amount: u64,
    /// Direction.
    pub kind: TxKind,
    /// Unix milliseconds.
    pub timestamp: u64,
}

/// Convert a whole-coin decimal string (e.g. `"1.5"`) into minor units.
///
/// Returns `None` for non-positive values, more than eight decimal places, or
/// values that overflow `u64`.
#[must_use]
pub fn to_minor_units(amount: &str) -> Option<u64> {
    let value = Decimal::from_str(amount.trim()).ok()?;
    if value <= Decimal::ZERO || value.normalize().scale() > AMOUNT_SCALE {
        return None;
    }
    value
        .checked_mul(Decimal::from(SOMPI_PER_KAS))?
        .trunc()
        .to_u64()
}

/// Render minor units as a whole-coin amount with ticker, e.g. `1.5 KAS`.
#[must_use]
pub fn format_amount(minor: u64) -> String {
    let value = Decimal::from_i128_with_scale(i128::from(minor), AMOUNT_SCALE).normalize();
    format!("{value} {NATIVE_TICKER}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_parse() {
        assert_eq!("Mainnet".parse::<Network>(), Ok(Network::Mainnet));
        assert_eq!("testnet-10".parse::<Network>(), Ok(Network::Testnet10));
        assert_eq!(" TESTNET-11 ".parse::<Network>(), Ok(Network::Testnet11));
        assert!("devnet".parse::<Network>().is_err());
    }

    #[test]
    fn test_network_serde_ids() {
        let json = serde_json::to_string(&Network::Testnet10).unwrap();
        assert_eq!(json, "\"testnet-10\"");
        let back: Network = serde_json::from_str("\"mainnet\"").unwrap();
        assert_eq!(back, Network::Mainnet);
    }

    #[test]
    fn test_to_minor_units() {
        assert_eq!(to_minor_units("1"), Some(100_000_000));
        assert_eq!(to_minor_units("1.5"), Some(150_000_000));
        assert_eq!(to_minor_units("0.00000001"), Some(1));
        assert_eq!(to_minor_units("0"), None);
        assert_eq!(to_minor_units("-2"), None);
        assert_eq!(to_minor_units("0.000000001"), None);
        assert_eq!(to_minor_units("abc"), None);
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(150_000_000), "1.5 KAS");
        assert_eq!(format_amount(0), "0 KAS");
        assert_eq!(format_amount(1), "0.00000001 KAS");
    }

    #[test]
    fn test_generated_wallet_debug_hides_secrets() {
        let wallet = GeneratedWallet {
            address: "kaspa:qabc".to_string(),
            private_key: "deadbeef".to_string(),
            mnemonic: "one two three".to_string(),
        };
        let debug = format!("{wallet:?}");
        assert!(debug.contains("kaspa:qabc"));
        assert!(!debug.contains("deadbeef"));
        assert!(!debug.contains("one two"));
    }
}
