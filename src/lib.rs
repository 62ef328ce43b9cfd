//! Telegram channel bot: answers mentions through YandexGPT and posts a
//! daily weather digest plus periodic generated articles.

pub mod completion;
pub mod config;
pub mod handlers;
pub mod iam;
pub mod jobs;
pub mod router;
pub mod scheduler;
pub mod state;
pub mod telegram;
pub mod weather;
