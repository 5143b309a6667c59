//! Event and prompt types exchanged between channels and the session core.
//!
//! Channels publish [`InboundEvent`]s (typed messages and component clicks)
//! onto the bus; the core answers by rendering [`Prompt`]s to a
//! [`Destination`] through the transport.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::session::UserId;
use crate::util::generate_event_id;

/// Where a prompt is rendered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination {
    /// Channel name (e.g. "telegram", "cli").
    pub channel: String,
    /// Chat identifier within the channel.
    pub chat_id: String,
}

impl Destination {
    /// Create a destination.
    pub fn new(channel: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            chat_id: chat_id.into(),
        }
    }
}

/// Handle to a rendered message, used to delete it later.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PromptHandle {
    /// Destination the message lives in.
    pub destination: Destination,
    /// Platform message identifier.
    pub message_id: String,
}

impl PromptHandle {
    /// Create a handle.
    pub fn new(destination: Destination, message_id: impl Into<String>) -> Self {
        Self {
            destination,
            message_id: message_id.into(),
        }
    }
}

/// What kind of input an event carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// A free-text message.
    Message {
        /// Text content.
        content: String,
    },
    /// A click on an interactive component.
    Interaction {
        /// Component identifier.
        custom_id: String,
    },
}

/// An inbound event from a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Unique event ID.
    pub id: String,
    /// Channel identifier.
    pub channel: String,
    /// Originating user.
    pub user_id: UserId,
    /// Chat the event arrived in.
    pub chat_id: String,
    /// Whether the chat is a one-to-one direct conversation.
    pub direct: bool,
    /// Payload.
    pub kind: EventKind,
    /// Handle to the user's own message, when the platform allows deleting it.
    pub handle: Option<PromptHandle>,
    /// When the event was received.
    pub timestamp: SystemTime,
}

impl InboundEvent {
    fn new(
        channel: impl Into<String>,
        sender: impl std::fmt::Display,
        chat_id: impl Into<String>,
        kind: EventKind,
    ) -> Self {
        let channel = channel.into();
        Self {
            id: generate_event_id(),
            user_id: UserId::new(&channel, sender),
            channel,
            chat_id: chat_id.into(),
            direct: true,
            kind,
            handle: None,
            timestamp: SystemTime::now(),
        }
    }

    /// Create a text message event.
    pub fn message(
        channel: impl Into<String>,
        sender: impl std::fmt::Display,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::new(
            channel,
            sender,
            chat_id,
            EventKind::Message {
                content: content.into(),
            },
        )
    }

    /// Create a component-click event.
    pub fn interaction(
        channel: impl Into<String>,
        sender: impl std::fmt::Display,
        chat_id: impl Into<String>,
        custom_id: impl Into<String>,
    ) -> Self {
        Self::new(
            channel,
            sender,
            chat_id,
            EventKind::Interaction {
                custom_id: custom_id.into(),
            },
        )
    }

    /// Mark whether the event came from a direct chat.
    #[must_use]
    pub const fn with_direct(mut self, direct: bool) -> Self {
        self.direct = direct;
        self
    }

    /// Attach a handle to the user's message.
    #[must_use]
    pub fn with_handle(mut self, handle: PromptHandle) -> Self {
        self.handle = Some(handle);
        self
    }

    /// Text content, for message events.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            EventKind::Message { content } => Some(content),
            EventKind::Interaction { .. } => None,
        }
    }

    /// Component id, for interaction events.
    #[must_use]
    pub fn custom_id(&self) -> Option<&str> {
        match &self.kind {
            EventKind::Interaction { custom_id } => Some(custom_id),
            EventKind::Message { .. } => None,
        }
    }

    /// Whether this event is the command that starts or resumes a session.
    #[must_use]
    pub fn is_trigger(&self, command: &str) -> bool {
        self.text()
            .and_then(|t| t.split_whitespace().next())
            .is_some_and(|word| word.eq_ignore_ascii_case(command))
    }

    /// Chat the event arrived in.
    #[must_use]
    pub fn origin(&self) -> Destination {
        Destination::new(self.channel.clone(), self.chat_id.clone())
    }
}

/// Visual emphasis for a prompt option.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionStyle {
    /// Regular choice.
    #[default]
    Primary,
    /// Neutral choice.
    Secondary,
    /// Destructive or cancelling choice.
    Danger,
    /// Confirming choice.
    Success,
}

/// A selectable choice on a prompt (button-equivalent).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptOption {
    /// Component identifier delivered back on click.
    pub id: String,
    /// Label shown to the user.
    pub label: String,
    /// Emphasis.
    pub style: OptionStyle,
}

impl PromptOption {
    /// Create a primary option.
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            style: OptionStyle::Primary,
        }
    }

    /// Set the style.
    #[must_use]
    pub const fn with_style(mut self, style: OptionStyle) -> Self {
        self.style = style;
        self
    }
}

/// Message format hint for rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageFormat {
    /// Plain text, no formatting.
    #[default]
    Plain,
    /// Markdown formatted text.
    Markdown,
}

/// Content rendered by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    /// Heading line.
    pub title: String,
    /// Body text.
    pub body: String,
    /// Interactive choices; empty for plain notices.
    #[serde(default)]
    pub options: Vec<PromptOption>,
    /// Format hint.
    pub format: MessageFormat,
}

impl Prompt {
    /// Create a prompt with a title and body.
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            options: Vec::new(),
            format: MessageFormat::Markdown,
        }
    }

    /// Create a notice without a title.
    pub fn notice(body: impl Into<String>) -> Self {
        Self::new(String::new(), body)
    }

    /// Add a choice.
    #[must_use]
    pub fn option(mut self, option: PromptOption) -> Self {
        self.options.push(option);
        self
    }

    /// Add several choices.
    #[must_use]
    pub fn options(mut self, options: impl IntoIterator<Item = PromptOption>) -> Self {
        self.options.extend(options);
        self
    }

    /// Set the format hint.
    #[must_use]
    pub const fn with_format(mut self, format: MessageFormat) -> Self {
        self.format = format;
        self
    }

    /// Component ids of all choices.
    #[must_use]
    pub fn option_ids(&self) -> Vec<String> {
        self.options.iter().map(|o| o.id.clone()).collect()
    }

    /// Title and body joined for text-only transports.
    #[must_use]
    pub fn text(&self) -> String {
        if self.title.is_empty() {
            self.body.clone()
        } else if self.body.is_empty() {
            format!("**{}**", self.title)
        } else {
            format!("**{}**\n{}", self.title, self.body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_event() {
        let event = InboundEvent::message("telegram", 42, "42", "!wallet");
        assert_eq!(event.user_id.as_str(), "telegram:42");
        assert_eq!(event.text(), Some("!wallet"));
        assert!(event.custom_id().is_none());
        assert!(event.is_trigger("!wallet"));
        assert!(event.is_trigger("!WALLET"));
    }

    #[test]
    fn test_trigger_requires_command_word() {
        let event = InboundEvent::message("cli", "user", "direct", "show my !wallet");
        assert!(!event.is_trigger("!wallet"));

        let click = InboundEvent::interaction("cli", "user", "direct", "!wallet");
        assert!(!click.is_trigger("!wallet"));
    }

    #[test]
    fn test_prompt_text() {
        let prompt = Prompt::new("Select Network", "Pick one")
            .option(PromptOption::new("mainnet", "Mainnet"));
        assert_eq!(prompt.text(), "**Select Network**\nPick one");
        assert_eq!(prompt.option_ids(), vec!["mainnet".to_string()]);
        assert_eq!(Prompt::notice("hi").text(), "hi");
    }

    #[test]
    fn test_event_ids_are_unique() {
        let a = InboundEvent::message("cli", "u", "c", "x");
        let b = InboundEvent::message("cli", "u", "c", "x");
        assert_ne!(a.id, b.id);
    }
}
