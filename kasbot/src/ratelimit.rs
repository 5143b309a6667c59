//! Per-(user, action) fixed-window rate limiter.
//!
//! Each action key has its own budget; spending the balance budget never
//! affects the history budget. Windows are measured with
//! [`tokio::time::Instant`] so paused-clock tests can drive them.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::session::UserId;

/// An independently throttled operation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ActionKey {
    /// Opening the network selection screen.
    NetworkSelection,
    /// Opening the wallet actions menu.
    WalletActions,
    /// Checking the wallet balance.
    Balance,
    /// Viewing transaction history.
    History,
    /// Showing the help text.
    Help,
    /// Clearing bot messages from the chat.
    ClearChat,
}

impl ActionKey {
    /// Every action key.
    pub const ALL: [Self; 6] = [
        Self::NetworkSelection,
        Self::WalletActions,
        Self::Balance,
        Self::History,
        Self::Help,
        Self::ClearChat,
    ];

    /// Label used in user-facing messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::NetworkSelection => "network selection",
            Self::WalletActions => "the wallet menu",
            Self::Balance => "balance",
            Self::History => "history",
            Self::Help => "help",
            Self::ClearChat => "clear chat",
        }
    }
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Budget for one action: at most `max_attempts` calls per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    /// Calls allowed within one window.
    pub max_attempts: u32,
    /// Window length in seconds.
    pub window_secs: u64,
}

impl RateLimitRule {
    /// Create a rule.
    #[must_use]
    pub const fn new(max_attempts: u32, window_secs: u64) -> Self {
        Self {
            max_attempts,
            window_secs,
        }
    }

    /// Window length.
    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Default budget for an action.
#[must_use]
pub const fn default_rule(action: ActionKey) -> RateLimitRule {
    match action {
        ActionKey::NetworkSelection => RateLimitRule::new(5, 60),
        ActionKey::WalletActions => RateLimitRule::new(30, 60),
        ActionKey::Balance => RateLimitRule::new(1, 30),
        ActionKey::History => RateLimitRule::new(1, 60),
        ActionKey::Help => RateLimitRule::new(3, 60),
        ActionKey::ClearChat => RateLimitRule::new(1, 60),
    }
}

/// Default rules for every action key.
#[must_use]
pub fn default_rules() -> BTreeMap<ActionKey, RateLimitRule> {
    ActionKey::ALL
        .into_iter()
        .map(|action| (action, default_rule(action)))
        .collect()
}

/// Counting state for one (user, action) pair.
#[derive(Debug, Clone, Copy)]
struct RateLimitRecord {
    window_start: Instant,
    count: u32,
}

/// Thread-safe fixed-window rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    rules: BTreeMap<ActionKey, RateLimitRule>,
    records: Mutex<HashMap<(UserId, ActionKey), RateLimitRecord>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl RateLimiter {
    /// Create a limiter with the given per-action rules.
    ///
    /// Actions missing from `rules` fall back to [`default_rule`].
    #[must_use]
    pub fn new(rules: BTreeMap<ActionKey, RateLimitRule>) -> Self {
        Self {
            rules,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Effective rule for an action.
    #[must_use]
    pub fn rule(&self, action: ActionKey) -> RateLimitRule {
        self.rules
            .get(&action)
            .copied()
            .unwrap_or_else(|| default_rule(action))
    }

    fn records(&self) -> MutexGuard<'_, HashMap<(UserId, ActionKey), RateLimitRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record an attempt and report whether it is within budget.
    pub fn allow(&self, user: &UserId, action: ActionKey) -> bool {
        let rule = self.rule(action);
        let now = Instant::now();
        let mut records = self.records();

        let record = records
            .entry((user.clone(), action))
            .or_insert(RateLimitRecord {
                window_start: now,
                count: 0,
            });

        if record.count == 0 || now.duration_since(record.window_start) >= rule.window() {
            record.window_start = now;
            record.count = 1;
        } else {
            record.count = record.count.saturating_add(1);
        }

        let allowed = record.count <= rule.max_attempts;
        if allowed {
            trace!(user = %user, %action, count = record.count, "rate limit ok");
        } else {
            debug!(user = %user, %action, count = record.count, "rate limit exceeded");
        }
        allowed
    }

    /// Time until the current window for this pair resets.
    ///
    /// Zero when no window is open.
    pub fn remaining(&self, user: &UserId, action: ActionKey) -> Duration {
        let window = self.rule(action).window();
        let now = Instant::now();
        self.records()
            .get(&(user.clone(), action))
            .map_or(Duration::ZERO, |record| {
                (record.window_start + window).saturating_duration_since(now)
            })
    }

    /// Drop records whose window has elapsed. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut records = self.records();
        let before = records.len();
        records.retain(|(_, action), record| {
            let window = self
                .rules
                .get(action)
                .copied()
                .unwrap_or_else(|| default_rule(*action))
                .window();
            now.duration_since(record.window_start) < window
        });
        before - records.len()
    }

    /// Number of tracked (user, action) pairs.
    pub fn tracked(&self) -> usize {
        self.records().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> UserId {
        UserId::new("test", id)
    }

    fn limiter(max: u32, window_secs: u64) -> RateLimiter {
        let rules = ActionKey::ALL
            .into_iter()
            .map(|a| (a, RateLimitRule::new(max, window_secs)))
            .collect();
        RateLimiter::new(rules)
    }

    #[tokio::test(start_paused = true)]
    async fn test_denies_after_ceiling_within_window() {
        let limiter = limiter(3, 60);
        let alice = user("alice");

        assert!(limiter.allow(&alice, ActionKey::Balance));
        assert!(limiter.allow(&alice, ActionKey::Balance));
        assert!(limiter.allow(&alice, ActionKey::Balance));
        assert!(!limiter.allow(&alice, ActionKey::Balance));
        assert!(limiter.remaining(&alice, ActionKey::Balance) > Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_elapsed_resets_count() {
        let limiter = limiter(1, 30);
        let alice = user("alice");

        assert!(limiter.allow(&alice, ActionKey::History));
        assert!(!limiter.allow(&alice, ActionKey::History));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(limiter.allow(&alice, ActionKey::History));
        assert!(!limiter.allow(&alice, ActionKey::History));
    }

    #[tokio::test(start_paused = true)]
    async fn test_actions_and_users_are_independent() {
        let limiter = limiter(1, 60);
        let alice = user("alice");
        let bob = user("bob");

        assert!(limiter.allow(&alice, ActionKey::Balance));
        assert!(limiter.allow(&alice, ActionKey::History));
        assert!(limiter.allow(&bob, ActionKey::Balance));
        assert!(!limiter.allow(&alice, ActionKey::Balance));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_counts_down() {
        let limiter = limiter(1, 60);
        let alice = user("alice");

        assert_eq!(limiter.remaining(&alice, ActionKey::Help), Duration::ZERO);
        limiter.allow(&alice, ActionKey::Help);
        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(
            limiter.remaining(&alice, ActionKey::Help),
            Duration::from_secs(40)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_elapsed_records() {
        let limiter = limiter(1, 10);
        limiter.allow(&user("a"), ActionKey::Balance);
        limiter.allow(&user("b"), ActionKey::Balance);
        assert_eq!(limiter.tracked(), 2);
        assert_eq!(limiter.sweep(), 0);

        tokio::time::advance(Duration::from_secs(11)).await;
        limiter.allow(&user("c"), ActionKey::Balance);
        assert_eq!(limiter.sweep(), 2);
        assert_eq!(limiter.tracked(), 1);
    }

    #[test]
    fn test_default_rules_cover_every_action() {
        let rules = default_rules();
        assert_eq!(rules.len(), ActionKey::ALL.len());
        assert_eq!(rules[&ActionKey::Balance].max_attempts, 1);
    }
}
