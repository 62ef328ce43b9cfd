//! Outbound Telegram sends.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ParseMode, Recipient};
use tracing::{info, warn};

/// How Telegram should interpret the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    Plain,
    /// Weather digest.
    Html,
    /// Generated posts and direct replies (legacy Markdown).
    Markdown,
}

impl TextFormat {
    #[allow(deprecated)]
    fn parse_mode(self) -> Option<ParseMode> {
        match self {
            TextFormat::Plain => None,
            TextFormat::Html => Some(ParseMode::Html),
            TextFormat::Markdown => Some(ParseMode::Markdown),
        }
    }
}

/// Anything that can deliver a message to a chat.
#[async_trait]
pub trait Outbox: Send + Sync {
    async fn send(&self, to: Recipient, text: &str, format: TextFormat) -> Result<i64, String>;
}

/// Telegram API client.
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Outbox for TelegramClient {
    async fn send(&self, to: Recipient, text: &str, format: TextFormat) -> Result<i64, String> {
        let target = format!("{to:?}");
        let mut request = self.bot.send_message(to, text);
        if let Some(mode) = format.parse_mode() {
            request = request.parse_mode(mode);
        }

        let msg = request.await.map_err(|e| {
            let msg = format!("Failed to send to {target}: {e}");
            warn!("{}", msg);
            msg
        })?;

        info!("📤 Sent message {} to {}", msg.id.0, target);
        Ok(msg.id.0 as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(deprecated)]
    fn test_parse_modes() {
        assert_eq!(TextFormat::Plain.parse_mode(), None);
        assert_eq!(TextFormat::Html.parse_mode(), Some(ParseMode::Html));
        assert_eq!(TextFormat::Markdown.parse_mode(), Some(ParseMode::Markdown));
    }
}
