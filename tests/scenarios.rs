//! Job bodies and the mention handler with fake credentials and a recording outbox.
//!
//! Run with: cargo test --test scenarios

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::TimeZone;
use teloxide::types::{ChatId, Recipient};

use herald::completion::{CompletionClient, NO_POST, Prompt, REQUEST_FAILED};
use herald::config::Settings;
use herald::handlers::{TOKEN_FAILED, answer_mention};
use herald::iam::{AuthError, CredentialProvider};
use herald::jobs::{JobOutcome, publish_topic_post, run_topic_post, run_weather_digest};
use herald::state::BotState;
use herald::telegram::{Outbox, TextFormat};
use herald::weather::WeatherFetcher;

const COMPLETION_PATH: &str = "/foundationModels/v1/completion";
const CHANNEL: i64 = -100500;

struct FakeCredentials {
    fail: bool,
    calls: AtomicUsize,
}

impl FakeCredentials {
    fn ok() -> Arc<Self> {
        Arc::new(Self { fail: false, calls: AtomicUsize::new(0) })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self { fail: true, calls: AtomicUsize::new(0) })
    }
}

#[async_trait]
impl CredentialProvider for FakeCredentials {
    async fn bearer_token(&self) -> Result<String, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(AuthError::Status("401 Unauthorized".into()))
        } else {
            Ok("t1.fake".into())
        }
    }
}

#[derive(Default)]
struct RecordingOutbox {
    sent: Mutex<Vec<(Recipient, String, TextFormat)>>,
}

impl RecordingOutbox {
    fn sent(&self) -> Vec<(Recipient, String, TextFormat)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Outbox for RecordingOutbox {
    async fn send(&self, to: Recipient, text: &str, format: TextFormat) -> Result<i64, String> {
        let mut sent = self.sent.lock().unwrap();
        sent.push((to, text.to_string(), format));
        Ok(sent.len() as i64)
    }
}

fn state(
    settings_json: &str,
    credentials: Arc<FakeCredentials>,
    outbox: Arc<RecordingOutbox>,
    base_url: &str,
) -> BotState {
    BotState {
        settings: Settings::from_json(settings_json).unwrap(),
        chat_id: Recipient::Id(ChatId(CHANNEL)),
        credentials,
        completion: CompletionClient::with_endpoint("folder", format!("{base_url}{COMPLETION_PATH}")),
        weather: WeatherFetcher::with_endpoint("key".into(), format!("{base_url}/data/2.5/weather")),
        outbox,
    }
}

fn answer_body(text: &str) -> String {
    serde_json::json!({ "result": { "alternatives": [ { "message": { "role": "assistant", "text": text } } ] } })
        .to_string()
}

mod weather_job {
    use super::*;

    #[tokio::test]
    async fn test_disabled_sends_nothing() {
        let outbox = Arc::new(RecordingOutbox::default());
        let st = state(
            r#"{ "bot_name": "Вася", "send_weather": "Нет", "cities_for_weather": ["москва"] }"#,
            FakeCredentials::ok(),
            outbox.clone(),
            "http://127.0.0.1:1",
        );
        let now = chrono_tz::Europe::Moscow.with_ymd_and_hms(2024, 3, 5, 7, 30, 0).unwrap();

        assert_eq!(run_weather_digest(&st, now).await, JobOutcome::Disabled);
        assert!(outbox.sent().is_empty());
    }

    #[tokio::test]
    async fn test_posts_one_html_digest_with_failed_city() {
        let mut server = mockito::Server::new_async().await;
        let _ok = server
            .mock("GET", "/data/2.5/weather")
            .match_query(mockito::Matcher::UrlEncoded("q".into(), "москва".into()))
            .with_status(200)
            .with_body(r#"{"weather":[{"description":"ясно"}],"main":{"temp":2.5,"humidity":40},"wind":{"speed":3.0}}"#)
            .create_async()
            .await;
        let _fail = server
            .mock("GET", "/data/2.5/weather")
            .match_query(mockito::Matcher::UrlEncoded("q".into(), "казань".into()))
            .with_status(500)
            .create_async()
            .await;

        let outbox = Arc::new(RecordingOutbox::default());
        let st = state(
            r#"{ "bot_name": "Вася", "send_weather": "Да", "cities_for_weather": ["москва", "казань"] }"#,
            FakeCredentials::ok(),
            outbox.clone(),
            &server.url(),
        );
        let now = chrono_tz::Europe::Moscow.with_ymd_and_hms(2024, 3, 5, 7, 30, 0).unwrap();

        assert_eq!(run_weather_digest(&st, now).await, JobOutcome::Sent);

        let sent = outbox.sent();
        assert_eq!(sent.len(), 1);
        let (to, text, format) = &sent[0];
        assert_eq!(*to, Recipient::Id(ChatId(CHANNEL)));
        assert_eq!(*format, TextFormat::Html);
        assert!(text.starts_with("🌤️ <b>Прогноз погоды на 05-03-2024 07:30:</b>"));
        assert!(text.contains("<b>Москва:</b>"));
        assert!(text.contains("Температура: 2.5°C"));
        assert!(text.contains("<b>Казань:</b> Ошибка при получении данных"));
        assert!(text.ends_with("#Погода #Прогноз #Weather #Forecast"));
    }
}

mod post_job {
    use super::*;

    const POSTS_ON: &str = r#"{ "bot_name": "Вася", "send_posts": "Да", "topics_list": ["X"], "posts_interval": 60 }"#;

    #[tokio::test]
    async fn test_disabled_sends_nothing() {
        let credentials = FakeCredentials::ok();
        let outbox = Arc::new(RecordingOutbox::default());
        let st = state(r#"{ "bot_name": "Вася", "send_posts": "Нет" }"#, credentials.clone(), outbox.clone(), "http://127.0.0.1:1");

        assert_eq!(run_topic_post(&st).await, JobOutcome::Disabled);
        assert!(outbox.sent().is_empty());
        assert_eq!(credentials.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_credential_failure_drops_post() {
        let credentials = FakeCredentials::failing();
        let outbox = Arc::new(RecordingOutbox::default());
        let st = state(POSTS_ON, credentials.clone(), outbox.clone(), "http://127.0.0.1:1");

        assert_eq!(run_topic_post(&st).await, JobOutcome::Dropped);
        assert!(outbox.sent().is_empty());
        assert_eq!(credentials.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_completion_failure_drops_post() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("POST", COMPLETION_PATH).with_status(503).create_async().await;

        let outbox = Arc::new(RecordingOutbox::default());
        let st = state(POSTS_ON, FakeCredentials::ok(), outbox.clone(), &server.url());

        assert_eq!(run_topic_post(&st).await, JobOutcome::Dropped);
        assert!(outbox.sent().is_empty());
    }

    #[tokio::test]
    async fn test_publishes_markdown_post() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", COMPLETION_PATH)
            .match_header("authorization", "Bearer t1.fake")
            .match_body(mockito::Matcher::Json(serde_json::json!({
                "modelUri": "gpt://folder/yandexgpt",
                "completionOptions": { "temperature": 0.5, "maxTokens": 500 },
                "messages": [
                    { "role": "system", "text": Prompt::topic_post("X").system },
                    { "role": "user", "text": "Тема: X. Расскажи мне о конкретной части этой темы." }
                ]
            })))
            .with_status(200)
            .with_body(answer_body("🚀 **Про «X»**"))
            .create_async()
            .await;

        let outbox = Arc::new(RecordingOutbox::default());
        let st = state(POSTS_ON, FakeCredentials::ok(), outbox.clone(), &server.url());

        assert_eq!(run_topic_post(&st).await, JobOutcome::Sent);
        mock.assert_async().await;

        let sent = outbox.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "*Тема:* X\n\n🚀 **Про «X»**");
        assert_eq!(sent[0].2, TextFormat::Markdown);
    }

    #[tokio::test]
    async fn test_empty_alternatives_post_fallback_text() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", COMPLETION_PATH)
            .with_status(200)
            .with_body(r#"{"result":{"alternatives":[]}}"#)
            .create_async()
            .await;

        let outbox = Arc::new(RecordingOutbox::default());
        let st = state(POSTS_ON, FakeCredentials::ok(), outbox.clone(), &server.url());

        assert_eq!(publish_topic_post(&st, "X").await, JobOutcome::Sent);
        assert_eq!(outbox.sent()[0].1, format!("*Тема:* X\n\n{NO_POST}"));
    }
}

mod mentions {
    use super::*;

    const SETTINGS: &str = r#"{ "bot_name": "Вася", "bot_behavior": "Отвечай кратко." }"#;

    #[tokio::test]
    async fn test_no_mention_no_upstream_calls() {
        let credentials = FakeCredentials::ok();
        let st = state(SETTINGS, credentials.clone(), Arc::new(RecordingOutbox::default()), "http://127.0.0.1:1");

        assert_eq!(answer_mention(&st, "всем привет", Some("Вася тут?")).await, None);
        assert_eq!(credentials.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_mention_with_quote_sends_combined_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", COMPLETION_PATH)
            .match_body(mockito::Matcher::Json(serde_json::json!({
                "modelUri": "gpt://folder/yandexgpt",
                "completionOptions": { "temperature": 0.5, "maxTokens": 1000 },
                "messages": [
                    { "role": "system", "text": "Ты Вася. Отвечай кратко." },
                    { "role": "user", "text": "вася, что скажешь?\n\nПересланное сообщение: завтра дождь" }
                ]
            })))
            .with_status(200)
            .with_body(answer_body("«Бери зонт»"))
            .create_async()
            .await;

        let st = state(SETTINGS, FakeCredentials::ok(), Arc::new(RecordingOutbox::default()), &server.url());
        let answer = answer_mention(&st, "вася, что скажешь?", Some("завтра дождь")).await;

        assert_eq!(answer.as_deref(), Some("Бери зонт"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_credential_failure_apologises() {
        let st = state(SETTINGS, FakeCredentials::failing(), Arc::new(RecordingOutbox::default()), "http://127.0.0.1:1");
        assert_eq!(answer_mention(&st, "Вася?", None).await.as_deref(), Some(TOKEN_FAILED));
    }

    #[tokio::test]
    async fn test_completion_failure_apologises() {
        let st = state(SETTINGS, FakeCredentials::ok(), Arc::new(RecordingOutbox::default()), "http://127.0.0.1:1");
        assert_eq!(answer_mention(&st, "Вася?", None).await.as_deref(), Some(REQUEST_FAILED));
    }
}
