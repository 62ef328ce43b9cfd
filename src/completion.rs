//! YandexGPT completion client.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const COMPLETION_URL: &str = "https://llm.api.cloud.yandex.net/foundationModels/v1/completion";

/// Shown to the user when the completion request itself fails.
pub const REQUEST_FAILED: &str = "Произошла ошибка при запросе к Yandex GPT.";
/// Used when the reply envelope has no candidate.
pub const NO_ANSWER: &str = "Ошибка получения ответа.";
/// Used when a topic post envelope has no candidate.
pub const NO_POST: &str = "Ошибка генерации поста.";

const POST_PERSONA: &str = "Ты генерируешь посты для Telegram. Для каждой темы ты создаешь пост, \
который фокусируется на одной конкретной части этой темы. Пост должен быть красиво оформлен с \
использованием эмодзи, заголовков, выделений и других визуальных элементов для улучшения восприятия.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// Sampling options and prompt for one completion.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Remove « and » from the answer.
    pub strip_quotes: bool,
}

impl Prompt {
    /// Direct reply in the bot's persona.
    pub fn reply(bot_name: &str, bot_behavior: &str, user_text: &str) -> Self {
        Self {
            system: format!("Ты {bot_name}. {bot_behavior}"),
            user: user_text.to_string(),
            temperature: 0.5,
            max_tokens: 1000,
            strip_quotes: true,
        }
    }

    /// Channel post about one aspect of `topic`.
    pub fn topic_post(topic: &str) -> Self {
        Self {
            system: POST_PERSONA.to_string(),
            user: format!("Тема: {topic}. Расскажи мне о конкретной части этой темы."),
            temperature: 0.5,
            max_tokens: 500,
            strip_quotes: false,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionRequest<'a> {
    model_uri: &'a str,
    completion_options: CompletionOptions,
    messages: Vec<ApiMessage<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionOptions {
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: Role,
    text: &'a str,
}

#[derive(Deserialize, Debug)]
struct CompletionResponse {
    #[serde(default)]
    result: Option<CompletionResult>,
}

#[derive(Deserialize, Debug)]
struct CompletionResult {
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Deserialize, Debug)]
struct Alternative {
    message: Option<AlternativeMessage>,
}

#[derive(Deserialize, Debug)]
struct AlternativeMessage {
    text: Option<String>,
}

pub struct CompletionClient {
    model_uri: String,
    endpoint: String,
    http: reqwest::Client,
}

impl CompletionClient {
    pub fn new(folder_id: &str) -> Self {
        Self::with_endpoint(folder_id, COMPLETION_URL)
    }

    pub fn with_endpoint(folder_id: &str, endpoint: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();

        Self {
            model_uri: format!("gpt://{folder_id}/yandexgpt"),
            endpoint: endpoint.into(),
            http,
        }
    }

    pub fn model_uri(&self) -> &str {
        &self.model_uri
    }

    /// Send one completion request.
    ///
    /// Transport and status failures are errors. A well-formed response
    /// without a candidate yields `fallback` instead.
    pub async fn request(&self, bearer: &str, prompt: &Prompt, fallback: &str) -> Result<String, CompletionError> {
        let request = CompletionRequest {
            model_uri: &self.model_uri,
            completion_options: CompletionOptions {
                temperature: prompt.temperature,
                max_tokens: prompt.max_tokens,
            },
            messages: vec![
                ApiMessage {
                    role: Role::System,
                    text: &prompt.system,
                },
                ApiMessage {
                    role: Role::User,
                    text: &prompt.user,
                },
            ],
        };

        let response = self
            .http
            .post(&self.endpoint)
            .header("Accept", "application/json")
            .bearer_auth(bearer)
            .json(&request)
            .send()
            .await
            .map_err(|e| CompletionError::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CompletionError::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(CompletionError::Api(format!("{status}: {body}")));
        }

        debug!("YandexGPT response: {body}");

        let parsed: CompletionResponse =
            serde_json::from_str(&body).map_err(|e| CompletionError::Parse(e.to_string()))?;
        Ok(extract_answer(parsed, fallback, prompt.strip_quotes))
    }

    /// Like [`request`](Self::request), but never fails: errors become
    /// [`REQUEST_FAILED`].
    pub async fn complete(&self, bearer: &str, prompt: &Prompt, fallback: &str) -> String {
        match self.request(bearer, prompt, fallback).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!("YandexGPT request failed: {e}");
                REQUEST_FAILED.to_string()
            }
        }
    }
}

fn extract_answer(response: CompletionResponse, fallback: &str, strip_quotes: bool) -> String {
    let text = response
        .result
        .and_then(|r| r.alternatives.into_iter().next())
        .and_then(|a| a.message)
        .and_then(|m| m.text);

    match text {
        Some(text) if strip_quotes => strip_guillemets(&text),
        Some(text) => text,
        None => fallback.to_string(),
    }
}

/// Drop « and » from generated text.
pub fn strip_guillemets(text: &str) -> String {
    text.chars().filter(|c| !matches!(c, '«' | '»')).collect()
}

#[derive(Debug)]
pub enum CompletionError {
    Http(String),
    Api(String),
    Parse(String),
}

impl std::fmt::Display for CompletionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompletionError::Http(e) => write!(f, "HTTP error: {e}"),
            CompletionError::Api(e) => write!(f, "API error: {e}"),
            CompletionError::Parse(e) => write!(f, "Parse error: {e}"),
        }
    }
}

impl std::error::Error for CompletionError {}
