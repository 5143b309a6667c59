//! Command-line interface channel implementation.
//!
//! Prompts are printed to stdout with their options numbered. Typing a
//! number (or an option id) answers the last prompt as if its button had
//! been pressed; anything else is delivered as a text message.

use crate::bus::{InboundHandle, MessageBus};
use crate::channel::{Channel, ChannelBase, ChannelState, ChannelStatus, Transport};
use crate::error::{ChannelError, ChannelResult};
use crate::events::{Destination, InboundEvent, Prompt, PromptHandle};
use async_trait::async_trait;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Channel name used in destinations and user ids.
pub const CLI_CHANNEL: &str = "cli";

/// CLI channel configuration.
#[derive(Debug, Clone)]
pub struct CliChannelConfig {
    /// Prompt string to display before user input.
    pub prompt: String,
    /// Sender id for terminal input.
    pub user: String,
    /// Chat id of the terminal conversation.
    pub chat_id: String,
}

impl Default for CliChannelConfig {
    fn default() -> Self {
        Self {
            prompt: "> ".to_string(),
            user: "local".to_string(),
            chat_id: "terminal".to_string(),
        }
    }
}

impl CliChannelConfig {
    /// Create a new CLI channel config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the prompt string.
    #[must_use]
    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Set the sender id.
    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }
}

#[derive(Debug, Default)]
struct CliView {
    /// Option ids of the most recent prompt that had options.
    options: Vec<String>,
    /// Messages printed since the last clear.
    printed: usize,
}

/// Command-line interface channel.
#[derive(Debug)]
pub struct CliChannel {
    base: ChannelBase,
    config: CliChannelConfig,
    view: Arc<RwLock<CliView>>,
    next_message_id: AtomicU64,
    shutdown_tx: RwLock<Option<mpsc::Sender<()>>>,
    reader: RwLock<Option<JoinHandle<()>>>,
}

impl CliChannel {
    /// Create a new CLI channel with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(CliChannelConfig::default())
    }

    /// Create a new CLI channel with the given configuration.
    #[must_use]
    pub fn with_config(config: CliChannelConfig) -> Self {
        Self {
            base: ChannelBase::new(CLI_CHANNEL),
            config,
            view: Arc::new(RwLock::new(CliView::default())),
            next_message_id: AtomicU64::new(1),
            shutdown_tx: RwLock::new(None),
            reader: RwLock::new(None),
        }
    }

    /// Turn a line of terminal input into an event.
    ///
    /// Returns `None` for blank lines.
    pub async fn translate_input(&self, line: &str) -> Option<InboundEvent> {
        translate(&self.config, &*self.view.read().await, line)
    }

    /// Format a prompt for the terminal.
    #[must_use]
    pub fn format_prompt(prompt: &Prompt) -> String {
        let mut out = prompt.text().replace("**", "");
        for (n, option) in prompt.options.iter().enumerate() {
            out.push_str(&format!("\n  [{}] {}", n + 1, option.label));
        }
        out
    }
}

fn translate(config: &CliChannelConfig, view: &CliView, line: &str) -> Option<InboundEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let chosen = trimmed
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| view.options.get(i))
        .or_else(|| {
            view.options
                .iter()
                .find(|id| id.eq_ignore_ascii_case(trimmed))
        });

    Some(match chosen {
        Some(id) => InboundEvent::interaction(CLI_CHANNEL, &config.user, &config.chat_id, id),
        None => InboundEvent::message(CLI_CHANNEL, &config.user, &config.chat_id, trimmed),
    })
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(clippy::print_stdout)] // CLI channel intentionally prints to stdout
fn print_prompt(text: &str, input_prompt: &str) {
    println!("\n{text}\n");
    print!("{input_prompt}");
    let _ = io::stdout().flush();
}

async fn pump_input(
    config: CliChannelConfig,
    view: Arc<RwLock<CliView>>,
    publisher: InboundHandle,
    mut lines: mpsc::Receiver<String>,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    loop {
        tokio::select! {
            line = lines.recv() => {
                let Some(line) = line else { break };
                let trimmed = line.trim();
                if matches!(trimmed, "exit" | "quit" | "/quit") {
                    info!("CLI input closed by user");
                    break;
                }
                let event = translate(&config, &*view.read().await, trimmed);
                if let Some(event) = event {
                    if let Err(e) = publisher.publish(event).await {
                        error!(error = %e, "failed to publish CLI input");
                        break;
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                debug!("CLI input handler shutting down");
                break;
            }
        }
    }
}

#[async_trait]
impl Transport for CliChannel {
    async fn render(
        &self,
        destination: &Destination,
        prompt: &Prompt,
    ) -> ChannelResult<PromptHandle> {
        let id = self.next_message_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut view = self.view.write().await;
            if !prompt.options.is_empty() {
                view.options = prompt.option_ids();
            }
            view.printed += 1;
        }
        print_prompt(&Self::format_prompt(prompt), &self.config.prompt);
        self.base.record_sent().await;
        Ok(PromptHandle::new(destination.clone(), id.to_string()))
    }

    async fn delete(&self, handle: &PromptHandle) -> ChannelResult<()> {
        // Printed lines cannot be taken back; just stop accepting its numbers.
        debug!(message = %handle.message_id, "CLI prompt retired");
        self.view.write().await.options.clear();
        Ok(())
    }

    async fn open_direct(&self, origin: &InboundEvent) -> ChannelResult<Destination> {
        // The terminal is always a one-to-one conversation.
        Ok(origin.origin())
    }

    async fn clear(&self, _destination: &Destination) -> ChannelResult<usize> {
        let mut view = self.view.write().await;
        let cleared = view.printed;
        view.printed = 0;
        view.options.clear();
        drop(view);
        print_prompt(&"-".repeat(40), &self.config.prompt);
        Ok(cleared)
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        self.base.name()
    }

    async fn start(&self, bus: &MessageBus) -> ChannelResult<()> {
        self.base.set_state(ChannelState::Starting).await;

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        *self.shutdown_tx.write().await = Some(shutdown_tx);

        let (line_tx, line_rx) = mpsc::channel::<String>(16);
        std::thread::Builder::new()
            .name("kasbot-stdin".to_string())
            .spawn(move || {
                let stdin = io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else { break };
                    if line_tx.blocking_send(line).is_err() {
                        break;
                    }
                }
            })
            .map_err(|e| ChannelError::StartFailed(e.to_string()))?;

        let handle = tokio::spawn(pump_input(
            self.config.clone(),
            Arc::clone(&self.view),
            bus.inbound_handle(),
            line_rx,
            shutdown_rx,
        ));
        *self.reader.write().await = Some(handle);

        self.base.set_state(ChannelState::Running).await;
        info!(user = %self.config.user, "CLI channel started");
        print_prompt(
            "Type a command to begin (\"quit\" to exit).",
            &self.config.prompt,
        );

        Ok(())
    }

    async fn stop(&self) -> ChannelResult<()> {
        self.base.set_state(ChannelState::Stopping).await;

        let guard = self.shutdown_tx.write().await;
        if let Some(tx) = &*guard {
            let _ = tx.send(()).await;
        }
        drop(guard);

        if let Some(handle) = self.reader.write().await.take() {
            handle.abort();
        }

        self.base.set_state(ChannelState::Stopped).await;
        info!("CLI channel stopped");

        Ok(())
    }

    async fn status(&self) -> ChannelStatus {
        self.base.build_status().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::PromptOption;

    fn menu() -> Prompt {
        Prompt::new("Select Network", "Pick one").options([
            PromptOption::new("mainnet", "Mainnet"),
            PromptOption::new("testnet-10", "Testnet-10"),
        ])
    }

    #[tokio::test]
    async fn test_numbers_answer_last_prompt() {
        let channel = CliChannel::new();
        let dest = Destination::new(CLI_CHANNEL, "terminal");
        channel.render(&dest, &menu()).await.unwrap();

        let event = channel.translate_input("2").await.unwrap();
        assert_eq!(event.custom_id(), Some("testnet-10"));
        assert_eq!(event.user_id.as_str(), "cli:local");

        let event = channel.translate_input("MAINNET").await.unwrap();
        assert_eq!(event.custom_id(), Some("mainnet"));

        let event = channel.translate_input("7").await.unwrap();
        assert_eq!(event.text(), Some("7"));
    }

    #[tokio::test]
    async fn test_text_after_prompt_retired() {
        let channel = CliChannel::new();
        let dest = Destination::new(CLI_CHANNEL, "terminal");
        let handle = channel.render(&dest, &menu()).await.unwrap();
        channel.delete(&handle).await.unwrap();

        let event = channel.translate_input("1").await.unwrap();
        assert_eq!(event.text(), Some("1"));
        assert!(channel.translate_input("   ").await.is_none());
    }

    #[tokio::test]
    async fn test_clear_counts_printed_messages() {
        let channel = CliChannel::new();
        let dest = Destination::new(CLI_CHANNEL, "terminal");
        channel.render(&dest, &menu()).await.unwrap();
        channel.render(&dest, &Prompt::notice("hi")).await.unwrap();

        assert_eq!(channel.clear(&dest).await.unwrap(), 2);
        assert_eq!(channel.clear(&dest).await.unwrap(), 0);
    }

    #[test]
    fn test_format_prompt_numbers_options() {
        let text = CliChannel::format_prompt(&menu());
        assert!(text.starts_with("Select Network\nPick one"));
        assert!(text.contains("[1] Mainnet"));
        assert!(text.contains("[2] Testnet-10"));
    }

    #[test]
    fn test_config_builder() {
        let config = CliChannelConfig::new().prompt(">> ").user("alice");
        assert_eq!(config.prompt, ">> ");
        assert_eq!(config.user, "alice");
    }
}
