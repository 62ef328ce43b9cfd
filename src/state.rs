use std::sync::Arc;

use teloxide::Bot;
use teloxide::types::Recipient;

use crate::completion::CompletionClient;
use crate::config::{Config, Settings};
use crate::iam::{CredentialProvider, IamTokenProvider};
use crate::telegram::{Outbox, TelegramClient};
use crate::weather::WeatherFetcher;

/// Everything a handler or job needs. Built once at startup, never mutated.
pub struct BotState {
    pub settings: Settings,
    /// Destination of scheduled posts.
    pub chat_id: Recipient,
    pub credentials: Arc<dyn CredentialProvider>,
    pub completion: CompletionClient,
    pub weather: WeatherFetcher,
    pub outbox: Arc<dyn Outbox>,
}

impl BotState {
    pub fn new(config: &Config, bot: Bot) -> Self {
        let secrets = &config.secrets;
        Self {
            settings: config.settings.clone(),
            chat_id: secrets.chat_id.clone(),
            credentials: Arc::new(IamTokenProvider::new(secrets.oauth_token.clone())),
            completion: CompletionClient::new(&secrets.folder_id),
            weather: WeatherFetcher::new(secrets.weather_api_key.clone()),
            outbox: Arc::new(TelegramClient::new(bot)),
        }
    }
}
