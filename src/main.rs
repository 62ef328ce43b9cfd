use std::sync::Arc;

use teloxide::prelude::*;
use tracing::info;
use tracing_subscriber::prelude::*;

use herald::config::Config;
use herald::handlers;
use herald::jobs::{PostJob, WeatherJob};
use herald::scheduler::{Scheduler, Trigger};
use herald::state::BotState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let settings_path = std::env::var("SETTINGS_PATH").unwrap_or_else(|_| "settings.json".to_string());
    let config = match Config::from_env(&settings_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {e}");
            std::process::exit(1);
        }
    };

    // Setup logging
    let log_dir = &config.settings.log_dir;
    std::fs::create_dir_all(log_dir).ok();
    let log_file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("herald.log"))
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("❌ failed to open log file in '{}': {e}", log_dir.display());
            std::process::exit(1);
        }
    };
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    info!("🚀 Starting herald...");
    info!("Loaded settings from {settings_path}");
    info!("Bot name: {}", config.settings.bot_name);

    let bot = Bot::new(&config.secrets.bot_token);
    let state = Arc::new(BotState::new(&config, bot.clone()));
    let settings = &config.settings;

    let mut scheduler = Scheduler::new(settings.timezone);
    if settings.send_weather.is_on() {
        scheduler.spawn(
            Trigger::Daily(settings.weather_time),
            Arc::new(WeatherJob::new(state.clone())),
        );
    } else {
        info!("Weather digest disabled");
    }
    match settings.posts_period {
        Some(period) if settings.send_posts.is_on() => {
            scheduler.spawn(
                Trigger::Every(period),
                Arc::new(PostJob::new(state.clone())),
            );
        }
        _ => info!("Topic posts disabled"),
    }

    Dispatcher::builder(bot, handlers::schema())
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    scheduler.shutdown();
}
