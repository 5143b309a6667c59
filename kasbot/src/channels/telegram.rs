//! Telegram channel implementation using teloxide.
//!
//! Prompt options are rendered as inline keyboard buttons whose callback data
//! is the option id, so a button press arrives as an interaction event.
//!
//! # Setup
//!
//! 1. Create a bot via [@BotFather](https://t.me/botfather)
//! 2. Put the token in the config file or `TELEGRAM_BOT_TOKEN`
//! 3. Optionally restrict access with `channels.telegram.allow_from`

use crate::bus::MessageBus;
use crate::channel::{Channel, ChannelBase, ChannelState, ChannelStatus, Transport};
use crate::config::TelegramConfig;
use crate::error::{ChannelError, ChannelResult};
use crate::events::{Destination, InboundEvent, MessageFormat, Prompt, PromptHandle};
use async_trait::async_trait;
use regex::Regex;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, OnceLock};
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, MessageId, ParseMode, User};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Channel name used in destinations and user ids.
pub const TELEGRAM_CHANNEL: &str = "telegram";

/// Telegram's message length limit.
const MAX_MESSAGE_LENGTH: usize = 4096;

/// Buttons per keyboard row.
const BUTTONS_PER_ROW: usize = 2;

/// Bot messages remembered per chat for Clear Chat. Oldest are forgotten
/// first; Telegram refuses to delete messages older than 48 hours anyway.
const MAX_TRACKED_PER_CHAT: usize = 200;

/// Telegram channel configuration.
#[derive(Clone)]
pub struct TelegramChannelConfig {
    /// Bot token from @BotFather.
    pub token: String,
    /// Allowed user ids or usernames. Empty means allow all.
    pub allow_from: Vec<String>,
    /// Maximum message length before splitting.
    pub max_message_length: usize,
}

impl std::fmt::Debug for TelegramChannelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramChannelConfig")
            .field("allow_from", &self.allow_from)
            .field("max_message_length", &self.max_message_length)
            .finish_non_exhaustive()
    }
}

impl TelegramChannelConfig {
    /// Create a new Telegram channel config with the given token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            allow_from: Vec::new(),
            max_message_length: MAX_MESSAGE_LENGTH,
        }
    }

    /// Allow a user id or username.
    #[must_use]
    pub fn allow(mut self, who: impl Into<String>) -> Self {
        self.allow_from.push(who.into());
        self
    }

    /// Check if a sender is allowed.
    #[must_use]
    pub fn is_allowed(&self, user_id: u64, username: Option<&str>) -> bool {
        if self.allow_from.is_empty() {
            return true;
        }
        let id = user_id.to_string();
        self.allow_from.iter().any(|entry| {
            let entry = entry.trim();
            entry == id
                || username.is_some_and(|name| {
                    entry.trim_start_matches('@').eq_ignore_ascii_case(name)
                })
        })
    }
}

impl From<&TelegramConfig> for TelegramChannelConfig {
    fn from(config: &TelegramConfig) -> Self {
        Self {
            token: config.token.clone(),
            allow_from: config.allow_from.clone(),
            max_message_length: MAX_MESSAGE_LENGTH,
        }
    }
}

/// Telegram channel implementation.
pub struct TelegramChannel {
    base: ChannelBase,
    config: TelegramChannelConfig,
    bot: RwLock<Option<Bot>>,
    /// Bot messages per chat, for clearing.
    sent: RwLock<HashMap<i64, VecDeque<MessageId>>>,
    dispatcher: RwLock<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for TelegramChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramChannel")
            .field("base", &self.base)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TelegramChannel {
    /// Create a new Telegram channel with the given configuration.
    #[must_use]
    pub fn new(config: TelegramChannelConfig) -> Self {
        Self {
            base: ChannelBase::new(TELEGRAM_CHANNEL),
            config,
            bot: RwLock::new(None),
            sent: RwLock::new(HashMap::new()),
            dispatcher: RwLock::new(None),
        }
    }

    async fn bot(&self) -> ChannelResult<Bot> {
        self.bot.read().await.clone().ok_or(ChannelError::NotConnected)
    }

    fn parse_chat(chat_id: &str) -> ChannelResult<ChatId> {
        chat_id
            .parse::<i64>()
            .map(ChatId)
            .map_err(|_| ChannelError::send(format!("invalid chat id: {chat_id}")))
    }

    fn keyboard(prompt: &Prompt) -> InlineKeyboardMarkup {
        let rows: Vec<Vec<InlineKeyboardButton>> = prompt
            .options
            .chunks(BUTTONS_PER_ROW)
            .map(|row| {
                row.iter()
                    .map(|o| InlineKeyboardButton::callback(o.label.clone(), o.id.clone()))
                    .collect()
            })
            .collect();
        InlineKeyboardMarkup::new(rows)
    }

    /// Convert Markdown to Telegram-safe HTML.
    fn markdown_to_telegram_html(text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        let patterns = MarkdownPatterns::get();

        let mut result = text
            .replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;");

        // Code first so markdown inside code is left alone.
        result = patterns
            .code_block
            .replace_all(&result, "<pre>$1</pre>")
            .into_owned();
        result = patterns
            .code_inline
            .replace_all(&result, "<code>$1</code>")
            .into_owned();
        result = patterns
            .bold
            .replace_all(&result, "<b>$1</b>")
            .into_owned();
        result = patterns
            .link
            .replace_all(&result, r#"<a href="$2">$1</a>"#)
            .into_owned();

        result
    }

    /// Split a long message into chunks.
    fn split_message(text: &str, max_len: usize) -> Vec<String> {
        if text.len() <= max_len {
            return vec![text.to_string()];
        }

        let mut chunks = Vec::new();
        let mut current = String::new();

        for line in text.lines() {
            if current.len() + line.len() + 1 > max_len && !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            if line.len() > max_len {
                let mut piece = String::new();
                for ch in line.chars() {
                    if piece.len() + ch.len_utf8() > max_len {
                        chunks.push(std::mem::take(&mut piece));
                    }
                    piece.push(ch);
                }
                current = piece;
                continue;
            }
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
        }

        if !current.is_empty() {
            chunks.push(current);
        }

        chunks
    }

    async fn track(&self, chat: ChatId, id: MessageId) {
        let mut sent = self.sent.write().await;
        let ids = sent.entry(chat.0).or_default();
        ids.push_back(id);
        while ids.len() > MAX_TRACKED_PER_CHAT {
            ids.pop_front();
        }
    }
}

/// Cached regex patterns for markdown to HTML conversion.
struct MarkdownPatterns {
    bold: Regex,
    code_inline: Regex,
    code_block: Regex,
    link: Regex,
}

impl MarkdownPatterns {
    fn new() -> Self {
        Self {
            bold: Regex::new(r"\*\*(.+?)\*\*").expect("valid regex"),
            code_inline: Regex::new(r"`([^`]+)`").expect("valid regex"),
            code_block: Regex::new(r"```\w*\n?([\s\S]*?)```").expect("valid regex"),
            link: Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("valid regex"),
        }
    }

    fn get() -> &'static Self {
        static PATTERNS: OnceLock<MarkdownPatterns> = OnceLock::new();
        PATTERNS.get_or_init(Self::new)
    }
}

fn sender_allowed(config: &TelegramChannelConfig, user: &User) -> bool {
    config.is_allowed(user.id.0, user.username.as_deref())
}

#[async_trait]
impl Transport for TelegramChannel {
    async fn render(
        &self,
        destination: &Destination,
        prompt: &Prompt,
    ) -> ChannelResult<PromptHandle> {
        let bot = self.bot().await?;
        let chat = Self::parse_chat(&destination.chat_id)?;

        let text = prompt.text();
        let (content, html) = if prompt.format == MessageFormat::Markdown {
            (Self::markdown_to_telegram_html(&text), true)
        } else {
            (text, false)
        };

        let chunks = Self::split_message(&content, self.config.max_message_length);
        let last = chunks.len().saturating_sub(1);
        let mut handle = None;

        for (n, chunk) in chunks.into_iter().enumerate() {
            let mut request = bot.send_message(chat, chunk);
            if html {
                request = request.parse_mode(ParseMode::Html);
            }
            if n == last && !prompt.options.is_empty() {
                request = request.reply_markup(Self::keyboard(prompt));
            }
            let sent = request.await.map_err(|e| {
                ChannelError::send(format!("telegram send_message: {e}"))
            })?;
            self.track(chat, sent.id).await;
            handle = Some(PromptHandle::new(destination.clone(), sent.id.0.to_string()));
        }

        self.base.record_sent().await;
        handle.ok_or_else(|| ChannelError::send("empty prompt"))
    }

    async fn delete(&self, handle: &PromptHandle) -> ChannelResult<()> {
        let bot = self.bot().await?;
        let chat = Self::parse_chat(&handle.destination.chat_id)?;
        let id = handle
            .message_id
            .parse::<i32>()
            .map(MessageId)
            .map_err(|_| ChannelError::delete(format!("invalid message id: {}", handle.message_id)))?;

        bot.delete_message(chat, id)
            .await
            .map_err(|e| ChannelError::delete(e.to_string()))?;

        if let Some(ids) = self.sent.write().await.get_mut(&chat.0) {
            ids.retain(|m| *m != id);
        }
        Ok(())
    }

    async fn open_direct(&self, origin: &InboundEvent) -> ChannelResult<Destination> {
        if origin.direct {
            return Ok(origin.origin());
        }

        // A private chat with a user shares the user's id.
        let sender = origin.user_id.sender();
        let chat = Self::parse_chat(sender)
            .map_err(|_| ChannelError::DirectUnavailable(format!("bad sender id {sender}")))?;
        let bot = self.bot().await?;
        bot.get_chat(chat).await.map_err(|e| {
            ChannelError::DirectUnavailable(format!(
                "user has not started a private chat with the bot: {e}"
            ))
        })?;
        Ok(Destination::new(TELEGRAM_CHANNEL, sender))
    }

    async fn clear(&self, destination: &Destination) -> ChannelResult<usize> {
        let bot = self.bot().await?;
        let chat = Self::parse_chat(&destination.chat_id)?;
        let ids = self.sent.write().await.remove(&chat.0).unwrap_or_default();

        let mut cleared = 0;
        for id in ids {
            match bot.delete_message(chat, id).await {
                Ok(_) => cleared += 1,
                Err(e) => debug!(chat = chat.0, message = id.0, error = %e, "could not delete message"),
            }
        }
        Ok(cleared)
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        self.base.name()
    }

    async fn start(&self, bus: &MessageBus) -> ChannelResult<()> {
        self.base.set_state(ChannelState::Starting).await;

        if self.config.token.trim().is_empty() {
            self.base.set_state(ChannelState::Stopped).await;
            return Err(ChannelError::StartFailed("telegram token is empty".to_string()));
        }

        let bot = Bot::new(&self.config.token);
        *self.bot.write().await = Some(bot.clone());

        let message_config = self.config.clone();
        let message_bus = bus.inbound_handle();
        let message_handler = Update::filter_message().endpoint(move |msg: Message| {
            let config = message_config.clone();
            let bus = message_bus.clone();

            async move {
                let Some(user) = msg.from.as_ref() else {
                    return Ok::<(), teloxide::RequestError>(());
                };
                if !sender_allowed(&config, user) {
                    debug!(user_id = user.id.0, chat_id = msg.chat.id.0, "message from unauthorized user");
                    return Ok(());
                }
                let Some(text) = msg.text() else {
                    return Ok(());
                };

                let chat_id = msg.chat.id.0.to_string();
                let handle = PromptHandle::new(
                    Destination::new(TELEGRAM_CHANNEL, chat_id.clone()),
                    msg.id.0.to_string(),
                );
                let event = InboundEvent::message(TELEGRAM_CHANNEL, user.id.0, chat_id, text)
                    .with_direct(msg.chat.is_private())
                    .with_handle(handle);

                if let Err(e) = bus.publish(event).await {
                    error!(error = %e, "failed to publish telegram message to bus");
                }
                Ok(())
            }
        });

        let callback_config = self.config.clone();
        let callback_bus = bus.inbound_handle();
        let callback_handler =
            Update::filter_callback_query().endpoint(move |bot: Bot, query: CallbackQuery| {
                let config = callback_config.clone();
                let bus = callback_bus.clone();

                async move {
                    if let Err(e) = bot.answer_callback_query(query.id.clone()).await {
                        warn!(error = %e, "failed to answer callback query");
                    }
                    if !sender_allowed(&config, &query.from) {
                        return Ok::<(), teloxide::RequestError>(());
                    }
                    let (Some(data), Some(message)) = (query.data.as_ref(), query.message.as_ref())
                    else {
                        return Ok(());
                    };

                    let chat = message.chat();
                    let event = InboundEvent::interaction(
                        TELEGRAM_CHANNEL,
                        query.from.id.0,
                        chat.id.0.to_string(),
                        data.clone(),
                    )
                    .with_direct(chat.is_private());

                    if let Err(e) = bus.publish(event).await {
                        error!(error = %e, "failed to publish telegram callback to bus");
                    }
                    Ok(())
                }
            });

        let handler = dptree::entry()
            .branch(message_handler)
            .branch(callback_handler);

        let mut dispatcher = Dispatcher::builder(bot, handler)
            .enable_ctrlc_handler()
            .build();

        let handle = tokio::spawn(async move {
            dispatcher.dispatch().await;
        });
        *self.dispatcher.write().await = Some(handle);

        self.base.set_state(ChannelState::Running).await;
        info!("Telegram channel started");

        Ok(())
    }

    async fn stop(&self) -> ChannelResult<()> {
        self.base.set_state(ChannelState::Stopping).await;

        if let Some(handle) = self.dispatcher.write().await.take() {
            handle.abort();
        }
        *self.bot.write().await = None;

        self.base.set_state(ChannelState::Stopped).await;
        info!("Telegram channel stopped");

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

    #[test]
    fn test_allowlist() {
        let config = TelegramChannelConfig::new("token")
            .allow("12345")
            .allow("@Alice");

        assert!(config.is_allowed(12345, None));
        assert!(config.is_allowed(1, Some("alice")));
        assert!(!config.is_allowed(99999, Some("mallory")));

        let open = TelegramChannelConfig::new("token");
        assert!(open.is_allowed(99999, None));
    }

    #[tokio::test]
    async fn test_tracked_messages_are_capped_per_chat() {
        let channel = TelegramChannel::new(TelegramChannelConfig::new("token"));
        let extra = 5;
        for i in 0..MAX_TRACKED_PER_CHAT + extra {
            channel
                .track(ChatId(7), MessageId(i32::try_from(i).unwrap()))
                .await;
        }
        channel.track(ChatId(8), MessageId(1)).await;

        let sent = channel.sent.read().await;
        let ids = &sent[&7];
        assert_eq!(ids.len(), MAX_TRACKED_PER_CHAT);
        assert_eq!(ids.front(), Some(&MessageId(i32::try_from(extra).unwrap())));
        assert_eq!(sent[&8].len(), 1);
    }

    #[test]
    fn test_debug_hides_token() {
        let config = TelegramChannelConfig::new("123:secret");
        assert!(!format!("{config:?}").contains("secret"));
    }

    #[test]
    fn test_keyboard_rows() {
        let prompt = Prompt::new("Wallet", "").options([
            PromptOption::new("send", "Send"),
            PromptOption::new("balance", "Balance"),
            PromptOption::new("history", "History"),
        ]);
        let keyboard = TelegramChannel::keyboard(&prompt);
        assert_eq!(keyboard.inline_keyboard.len(), 2);
        assert_eq!(keyboard.inline_keyboard[0].len(), 2);
        assert_eq!(keyboard.inline_keyboard[1].len(), 1);
    }

    #[test]
    fn test_split_message() {
        let chunks = TelegramChannel::split_message("Hello, world!", 100);
        assert_eq!(chunks.len(), 1);

        let long = "Line 1\nLine 2\nLine 3\nLine 4";
        let chunks = TelegramChannel::split_message(long, 15);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.len() <= 15));
    }

    #[test]
    fn test_markdown_to_html() {
        assert_eq!(
            TelegramChannel::markdown_to_telegram_html("**bold**"),
            "<b>bold</b>"
        );
        assert_eq!(
            TelegramChannel::markdown_to_telegram_html("`kaspa:qabc`"),
            "<code>kaspa:qabc</code>"
        );
        assert_eq!(
            TelegramChannel::markdown_to_telegram_html("[tx](https://explorer.kaspa.org/txs/1)"),
            r#"<a href="https://explorer.kaspa.org/txs/1">tx</a>"#
        );
        assert_eq!(
            TelegramChannel::markdown_to_telegram_html("<script>"),
            "&lt;script&gt;"
        );
    }

    #[tokio::test]
    async fn test_render_requires_connection() {
        let channel = TelegramChannel::new(TelegramChannelConfig::new("token"));
        let err = channel
            .render(&Destination::new(TELEGRAM_CHANNEL, "1"), &Prompt::notice("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::NotConnected));
    }
}
