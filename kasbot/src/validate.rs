//! Syntactic validation of user input.
//!
//! Validators are pure predicates: they answer yes or no and never raise.
//! Call sites turn a `false` into [`crate::error::FlowError::InvalidInput`].

use std::sync::LazyLock;

use regex::Regex;

use crate::wallet::{Network, to_minor_units};

/// Upper bound on free-text input kept after sanitising.
pub const MAX_INPUT_CHARS: usize = 256;

static ADDRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(kaspa|kaspatest):[qp][qpzry9x8gf2tvdw0s3jn54khce6mua7l]{60,62}$")
        .expect("valid regex")
});

static AMOUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,11}(\.\d{1,8})?$").expect("valid regex"));

static PRIVATE_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(0x)?[0-9a-fA-F]{64}$").expect("valid regex"));

/// Input checks used by the conversation steps.
pub trait Validator: Send + Sync {
    /// Whether `input` is a well-formed address on `network`.
    fn validate_address(&self, input: &str, network: Network) -> bool;

    /// Whether `input` is a positive whole-coin amount with at most eight
    /// decimal places.
    fn validate_amount(&self, input: &str) -> bool;

    /// Whether `input` looks like a hex-encoded 32-byte private key.
    fn validate_private_key(&self, input: &str) -> bool;

    /// Whether `input` names a supported network.
    fn validate_network(&self, input: &str) -> bool;

    /// Normalise free text before validation.
    ///
    /// Only the ends are trimmed. Control characters inside the text are
    /// kept so the checks above reject it.
    fn sanitize_input(&self, input: &str) -> String;
}

/// Regex-backed validator for Kaspa-style addresses and keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardValidator;

impl Validator for StandardValidator {
    fn validate_address(&self, input: &str, network: Network) -> bool {
        ADDRESS_RE
            .captures(input)
            .and_then(|caps| caps.get(1))
            .is_some_and(|prefix| prefix.as_str() == network.address_prefix())
    }

    fn validate_amount(&self, input: &str) -> bool {
        AMOUNT_RE.is_match(input) && to_minor_units(input).is_some()
    }

    fn validate_private_key(&self, input: &str) -> bool {
        PRIVATE_KEY_RE.is_match(input)
    }

    fn validate_network(&self, input: &str) -> bool {
        input.parse::<Network>().is_ok()
    }

    fn sanitize_input(&self, input: &str) -> String {
        input
            .trim_matches(|c: char| c.is_whitespace() || c.is_control())
            .chars()
            .take(MAX_INPUT_CHARS)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(prefix: &str) -> String {
        format!("{prefix}:q{}", "p".repeat(60))
    }

    #[test]
    fn test_address_must_match_network_prefix() {
        let v = StandardValidator;
        assert!(v.validate_address(&address("kaspa"), Network::Mainnet));
        assert!(v.validate_address(&address("kaspatest"), Network::Testnet10));
        assert!(!v.validate_address(&address("kaspatest"), Network::Mainnet));
        assert!(!v.validate_address(&address("kaspa"), Network::Testnet11));
    }

    #[test]
    fn test_address_rejects_garbage() {
        let v = StandardValidator;
        assert!(!v.validate_address("", Network::Mainnet));
        assert!(!v.validate_address("kaspa:qshort", Network::Mainnet));
        // 'b' is outside the bech32 alphabet
        assert!(!v.validate_address(&format!("kaspa:q{}", "b".repeat(60)), Network::Mainnet));
    }

    #[test]
    fn test_amount() {
        let v = StandardValidator;
        assert!(v.validate_amount("1"));
        assert!(v.validate_amount("0.00000001"));
        assert!(v.validate_amount("12.5"));
        assert!(!v.validate_amount("0"));
        assert!(!v.validate_amount("-1"));
        assert!(!v.validate_amount("1.000000001"));
        assert!(!v.validate_amount("abc"));
        assert!(!v.validate_amount("1e5"));
    }

    #[test]
    fn test_private_key() {
        let v = StandardValidator;
        assert!(v.validate_private_key(&"a".repeat(64)));
        assert!(v.validate_private_key(&format!("0x{}", "F".repeat(64))));
        assert!(!v.validate_private_key(&"a".repeat(63)));
        assert!(!v.validate_private_key(&"g".repeat(64)));
    }

    #[test]
    fn test_network() {
        let v = StandardValidator;
        assert!(v.validate_network("mainnet"));
        assert!(v.validate_network("Testnet-11"));
        assert!(!v.validate_network("devnet"));
    }

    #[test]
    fn test_sanitize_input() {
        let v = StandardValidator;
        assert_eq!(v.sanitize_input("  kaspa:qabc\u{0007} \n"), "kaspa:qabc");
        assert_eq!(v.sanitize_input(&"x".repeat(400)).len(), MAX_INPUT_CHARS);
    }

    #[test]
    fn test_embedded_control_characters_are_rejected() {
        let v = StandardValidator;
        let key = format!("{}\u{0007}{}", "a".repeat(32), "a".repeat(32));
        let cleaned = v.sanitize_input(&key);
        assert_eq!(cleaned, key);
        assert!(!v.validate_private_key(&cleaned));

        let amount = v.sanitize_input("1\u{0000}0");
        assert!(!v.validate_amount(&amount));
    }
}
