//! Test doubles shared by unit tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};

use crate::bus::MessageBus;
use crate::channel::{Channel, ChannelBase, ChannelState, ChannelStatus, Transport};
use crate::config::BotConfig;
use crate::error::{ChannelError, ChannelResult, WalletError, WalletResult};
use crate::events::{Destination, InboundEvent, Prompt, PromptHandle};
use crate::flow::{FlowContext, RouteOutcome, SessionController};
use crate::interaction::InteractionWaiter;
use crate::ratelimit::RateLimiter;
use crate::session::{SessionRegistry, SessionState, UserId};
use crate::validate::StandardValidator;
use crate::wallet::{
    Balance, GeneratedWallet, HistoryEntry, ImportedWallet, Network, RetryConfig, RetryingWallet,
    SOMPI_PER_KAS, TokenBalance, TxKind, WalletService,
};

/// Transport that records everything it is asked to do.
#[derive(Debug)]
pub struct RecordingTransport {
    base: ChannelBase,
    rendered: RwLock<Vec<(Destination, Prompt)>>,
    deleted: RwLock<Vec<PromptHandle>>,
    next_id: AtomicU64,
    deny_direct: AtomicBool,
    direct_delay: Mutex<Duration>,
    cleared: AtomicU64,
    tx: mpsc::UnboundedSender<Prompt>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Prompt>>,
}

impl RecordingTransport {
    pub fn new(name: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            base: ChannelBase::new(name),
            rendered: RwLock::new(Vec::new()),
            deleted: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            deny_direct: AtomicBool::new(false),
            direct_delay: Mutex::new(Duration::ZERO),
            cleared: AtomicU64::new(0),
            tx,
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    pub async fn rendered(&self) -> Vec<(Destination, Prompt)> {
        self.rendered.read().await.clone()
    }

    pub async fn deleted(&self) -> Vec<PromptHandle> {
        self.deleted.read().await.clone()
    }

    pub fn deny_direct(&self, deny: bool) {
        self.deny_direct.store(deny, Ordering::SeqCst);
    }

    /// Make opening a direct chat take `delay`, like a platform round-trip.
    pub fn delay_direct(&self, delay: Duration) {
        *self.direct_delay.lock().unwrap() = delay;
    }

    pub fn clear_calls(&self) -> u64 {
        self.cleared.load(Ordering::SeqCst)
    }

    /// Next rendered prompt, in order.
    pub async fn next_prompt(&self) -> Prompt {
        self.rx
            .lock()
            .await
            .recv()
            .await
            .expect("transport dropped")
    }

    /// Skip rendered prompts until one with `title` arrives.
    pub async fn prompt_titled(&self, title: &str) -> Prompt {
        loop {
            let prompt = self.next_prompt().await;
            if prompt.title == title {
                return prompt;
            }
        }
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn render(
        &self,
        destination: &Destination,
        prompt: &Prompt,
    ) -> ChannelResult<PromptHandle> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.rendered
            .write()
            .await
            .push((destination.clone(), prompt.clone()));
        let _ = self.tx.send(prompt.clone());
        Ok(PromptHandle::new(destination.clone(), id.to_string()))
    }

    async fn delete(&self, handle: &PromptHandle) -> ChannelResult<()> {
        self.deleted.write().await.push(handle.clone());
        Ok(())
    }

    async fn open_direct(&self, origin: &InboundEvent) -> ChannelResult<Destination> {
        let delay = *self.direct_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.deny_direct.load(Ordering::SeqCst) {
            return Err(ChannelError::DirectUnavailable("dms closed".to_string()));
        }
        Ok(Destination::new(
            origin.channel.clone(),
            format!("dm-{}", origin.user_id.sender()),
        ))
    }

    async fn clear(&self, _destination: &Destination) -> ChannelResult<usize> {
        self.cleared.fetch_add(1, Ordering::SeqCst);
        Ok(self.rendered.read().await.len())
    }
}

#[async_trait]
impl Channel for RecordingTransport {
    fn name(&self) -> &str {
        self.base.name()
    }

    async fn start(&self, _bus: &MessageBus) -> ChannelResult<()> {
        self.base.set_state(ChannelState::Running).await;
        Ok(())
    }

    async fn stop(&self) -> ChannelResult<()> {
        self.base.set_state(ChannelState::Stopped).await;
        Ok(())
    }

    async fn status(&self) -> ChannelStatus {
        self.base.build_status().await
    }
}

/// Wallet whose answers and failures are scripted by the test.
#[derive(Debug, Default)]
pub struct ScriptedWallet {
    failing_queries: AtomicU32,
    query_calls: AtomicU32,
    fail_sends: AtomicBool,
    fail_creation: AtomicBool,
    fail_import: AtomicBool,
    crash_sends: AtomicBool,
    sends: Mutex<Vec<(u64, String, Network)>>,
    history: Mutex<Vec<HistoryEntry>>,
}

impl ScriptedWallet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` balance or history queries.
    pub fn fail_queries(&self, n: u32) {
        self.failing_queries.store(n, Ordering::SeqCst);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn fail_creation(&self, fail: bool) {
        self.fail_creation.store(fail, Ordering::SeqCst);
    }

    pub fn fail_import(&self, fail: bool) {
        self.fail_import.store(fail, Ordering::SeqCst);
    }

    /// Panic inside `send_funds`, like a crashing backend.
    pub fn crash_sends(&self, crash: bool) {
        self.crash_sends.store(crash, Ordering::SeqCst);
    }

    pub fn set_history(&self, entries: Vec<HistoryEntry>) {
        *self.history.lock().unwrap() = entries;
    }

    pub fn query_calls(&self) -> u32 {
        self.query_calls.load(Ordering::SeqCst)
    }

    pub fn send_calls(&self) -> Vec<(u64, String, Network)> {
        self.sends.lock().unwrap().clone()
    }

    pub fn balance(&self) -> Balance {
        Balance {
            native: 42 * SOMPI_PER_KAS,
            tokens: vec![TokenBalance {
                ticker: "NACHO".to_string(),
                amount: "7".to_string(),
            }],
        }
    }

    pub fn address(network: Network) -> String {
        format!("{}:q{}", network.address_prefix(), "z".repeat(60))
    }

    fn query(&self) -> WalletResult<()> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self.failing_queries.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_queries.store(failing - 1, Ordering::SeqCst);
            return Err(WalletError::Query("node unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl WalletService for ScriptedWallet {
    async fn generate_wallet(
        &self,
        _user: &UserId,
        network: Network,
    ) -> WalletResult<GeneratedWallet> {
        if self.fail_creation.load(Ordering::SeqCst) {
            return Err(WalletError::Creation("rng unavailable".to_string()));
        }
        Ok(GeneratedWallet {
            address: Self::address(network),
            private_key: "ab".repeat(32),
            mnemonic: "one two three four five six seven eight nine ten eleven twelve".into(),
        })
    }

    async fn import_wallet(
        &self,
        _private_key: &str,
        _user: &UserId,
        network: Network,
    ) -> WalletResult<ImportedWallet> {
        if self.fail_import.load(Ordering::SeqCst) {
            return Err(WalletError::Import("key rejected".to_string()));
        }
        Ok(ImportedWallet {
            address: Self::address(network),
        })
    }

    async fn send_funds(
        &self,
        _user: &UserId,
        amount: u64,
        recipient: &str,
        network: Network,
    ) -> WalletResult<String> {
        self.sends
            .lock()
            .unwrap()
            .push((amount, recipient.to_string(), network));
        assert!(
            !self.crash_sends.load(Ordering::SeqCst),
            "wallet backend crashed"
        );
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(WalletError::Transaction("insufficient funds".to_string()));
        }
        Ok("txid0123456789".to_string())
    }

    async fn get_balance(&self, _user: &UserId, _network: Network) -> WalletResult<Balance> {
        self.query()?;
        Ok(self.balance())
    }

    async fn get_history(
        &self,
        _address: &str,
        _network: Network,
    ) -> WalletResult<Vec<HistoryEntry>> {
        self.query()?;
        Ok(self.history.lock().unwrap().clone())
    }
}

#[async_trait]
impl WalletService for Arc<ScriptedWallet> {
    async fn generate_wallet(
        &self,
        user: &UserId,
        network: Network,
    ) -> WalletResult<GeneratedWallet> {
        self.as_ref().generate_wallet(user, network).await
    }

    async fn import_wallet(
        &self,
        private_key: &str,
        user: &UserId,
        network: Network,
    ) -> WalletResult<ImportedWallet> {
        self.as_ref().import_wallet(private_key, user, network).await
    }

    async fn send_funds(
        &self,
        user: &UserId,
        amount: u64,
        recipient: &str,
        network: Network,
    ) -> WalletResult<String> {
        self.as_ref().send_funds(user, amount, recipient, network).await
    }

    async fn get_balance(&self, user: &UserId, network: Network) -> WalletResult<Balance> {
        self.as_ref().get_balance(user, network).await
    }

    async fn get_history(
        &self,
        address: &str,
        network: Network,
    ) -> WalletResult<Vec<HistoryEntry>> {
        self.as_ref().get_history(address, network).await
    }
}

/// A history entry for tests.
pub fn entry(id: &str, kas: u64, kind: TxKind) -> HistoryEntry {
    HistoryEntry {
        id: id.to_string(),
        amount: kas * SOMPI_PER_KAS,
        kind,
        timestamp: 0,
    }
}

/// Channel name used by [`Harness`] events.
pub const CHANNEL: &str = "test";

/// A controller wired to test doubles.
pub struct Harness {
    pub controller: Arc<SessionController>,
    pub transport: Arc<RecordingTransport>,
    pub wallet: Arc<ScriptedWallet>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(BotConfig::default())
    }

    pub fn with_config(config: BotConfig) -> Self {
        Self::build(config, None, None)
    }

    /// Wire a harness whose wallet retries transient query failures.
    pub fn with_retries(retry: RetryConfig) -> Self {
        Self::build(BotConfig::default(), None, Some(retry))
    }

    /// Wire a harness whose rate limits are all `max` per `window_secs`.
    pub fn with_uniform_limits(max: u32, window_secs: u64) -> Self {
        let rules: BTreeMap<_, _> = crate::ratelimit::ActionKey::ALL
            .into_iter()
            .map(|a| (a, crate::ratelimit::RateLimitRule::new(max, window_secs)))
            .collect();
        Self::build(BotConfig::default(), Some(rules), None)
    }

    fn build(
        config: BotConfig,
        rules: Option<BTreeMap<crate::ratelimit::ActionKey, crate::ratelimit::RateLimitRule>>,
        retry: Option<RetryConfig>,
    ) -> Self {
        let transport = Arc::new(RecordingTransport::new(CHANNEL));
        let wallet = Arc::new(ScriptedWallet::new());
        let limiter = RateLimiter::new(rules.unwrap_or_else(|| config.rate_limits.clone()));
        let service: Arc<dyn WalletService> = match retry {
            Some(retry) => Arc::new(RetryingWallet::new(wallet.clone(), retry)),
            None => wallet.clone(),
        };
        let ctx = FlowContext {
            registry: Arc::new(SessionRegistry::new()),
            limiter: Arc::new(limiter),
            waiter: Arc::new(InteractionWaiter::new()),
            transport: transport.clone(),
            wallet: service,
            validator: Arc::new(StandardValidator),
            config: Arc::new(config),
        };
        Self {
            controller: SessionController::new(ctx),
            transport,
            wallet,
        }
    }

    pub fn user(sender: &str) -> UserId {
        UserId::new(CHANNEL, sender)
    }

    fn dm(sender: &str) -> String {
        format!("dm-{sender}")
    }

    pub async fn trigger(&self, sender: &str) -> RouteOutcome {
        let command = self.controller.context().config.command.clone();
        self.controller
            .route(InboundEvent::message(CHANNEL, sender, Self::dm(sender), command))
            .await
    }

    /// Click an option once the user's flow is waiting for it.
    pub async fn click(&self, sender: &str, id: &str) -> RouteOutcome {
        self.settle(sender).await;
        self.controller
            .route(InboundEvent::interaction(CHANNEL, sender, Self::dm(sender), id))
            .await
    }

    /// Type a reply once the user's flow is waiting for it.
    pub async fn say(&self, sender: &str, text: &str) -> RouteOutcome {
        self.settle(sender).await;
        let event = InboundEvent::message(CHANNEL, sender, Self::dm(sender), text).with_handle(
            PromptHandle::new(Destination::new(CHANNEL, Self::dm(sender)), format!("user-{text}")),
        );
        self.controller.route(event).await
    }

    /// Yield until the user's flow has registered its wait.
    pub async fn settle(&self, sender: &str) {
        let user = Self::user(sender);
        for _ in 0..10_000 {
            if self.controller.context().waiter.is_waiting(&user).await {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("flow for {sender} never started waiting");
    }

    /// Yield until no flow is running.
    pub async fn quiesce(&self) {
        for _ in 0..10_000 {
            if self.controller.active_flows() == 0 {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("flows still running");
    }

    pub async fn state(&self, sender: &str) -> SessionState {
        self.controller
            .context()
            .registry
            .state(&Self::user(sender))
            .await
    }

    pub async fn has_session(&self, sender: &str) -> bool {
        self.controller
            .context()
            .registry
            .get(&Self::user(sender))
            .await
            .is_some()
    }

    /// Walk a fresh user to the wallet actions menu on `network`.
    pub async fn open_wallet(&self, sender: &str, network: Network) {
        assert_eq!(self.trigger(sender).await, RouteOutcome::Started);
        self.transport.prompt_titled("Select Network").await;
        self.click(sender, network.id()).await;
        self.transport.prompt_titled("Wallet Options").await;
        self.click(sender, "create").await;
        self.transport.prompt_titled("Wallet").await;
        self.settle(sender).await;
    }
}
