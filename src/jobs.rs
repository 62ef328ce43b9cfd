//! Bodies of the two scheduled jobs: weather digest and topic post.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{error, info, warn};

use crate::completion::{NO_POST, Prompt};
use crate::scheduler::Job;
use crate::state::BotState;
use crate::telegram::TextFormat;
use crate::weather::format_digest;

/// What a single job run ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// The job's flag is off.
    Disabled,
    Sent,
    /// Something failed; nothing (or nothing more) was posted.
    Dropped,
}

/// Fetch weather for every configured city and post one digest.
pub async fn run_weather_digest(state: &BotState, now: DateTime<Tz>) -> JobOutcome {
    if !state.settings.send_weather.is_on() {
        return JobOutcome::Disabled;
    }

    let batch = state.weather.fetch_weather(&state.settings.cities).await;
    let message = format_digest(&batch, now);

    match state.outbox.send(state.chat_id.clone(), &message, TextFormat::Html).await {
        Ok(_) => {
            info!("🌤️ Weather digest posted");
            JobOutcome::Sent
        }
        Err(e) => {
            error!("Failed to post weather digest: {e}");
            JobOutcome::Dropped
        }
    }
}

/// Uniform choice from the topic list.
pub fn pick_topic<'a, R: Rng + ?Sized>(topics: &'a [String], rng: &mut R) -> Option<&'a str> {
    topics.choose(rng).map(String::as_str)
}

/// Pick a random topic and post a generated article about it.
pub async fn run_topic_post(state: &BotState) -> JobOutcome {
    if !state.settings.send_posts.is_on() {
        return JobOutcome::Disabled;
    }

    let topic = {
        let mut rng = rand::thread_rng();
        pick_topic(&state.settings.topics, &mut rng).map(str::to_owned)
    };
    let Some(topic) = topic else {
        warn!("Topic list is empty, skipping post");
        return JobOutcome::Dropped;
    };

    publish_topic_post(state, &topic).await
}

/// Generate and post an article about `topic`. Any failure drops the post.
pub async fn publish_topic_post(state: &BotState, topic: &str) -> JobOutcome {
    info!("📝 Topic for post: {topic}");

    let token = match state.credentials.bearer_token().await {
        Ok(token) => token,
        Err(e) => {
            error!("Failed to get IAM token: {e}");
            return JobOutcome::Dropped;
        }
    };

    let text = match state.completion.request(&token, &Prompt::topic_post(topic), NO_POST).await {
        Ok(text) => text,
        Err(e) => {
            error!("YandexGPT request failed: {e}");
            return JobOutcome::Dropped;
        }
    };

    let message = format!("*Тема:* {topic}\n\n{text}");
    match state.outbox.send(state.chat_id.clone(), &message, TextFormat::Markdown).await {
        Ok(_) => {
            info!("📝 Post published");
            JobOutcome::Sent
        }
        Err(e) => {
            error!("Failed to publish post: {e}");
            JobOutcome::Dropped
        }
    }
}

pub struct WeatherJob {
    state: Arc<BotState>,
}

impl WeatherJob {
    pub fn new(state: Arc<BotState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Job for WeatherJob {
    fn name(&self) -> &'static str {
        "weather digest"
    }

    async fn run(&self) {
        let now = Utc::now().with_timezone(&self.state.settings.timezone);
        let outcome = run_weather_digest(&self.state, now).await;
        info!("Weather digest run: {:?}", outcome);
    }
}

pub struct PostJob {
    state: Arc<BotState>,
}

impl PostJob {
    pub fn new(state: Arc<BotState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Job for PostJob {
    fn name(&self) -> &'static str {
        "topic post"
    }

    async fn run(&self) {
        let outcome = run_topic_post(&self.state).await;
        info!("Topic post run: {:?}", outcome);
    }
}
