use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use teloxide::types::{ChatId, Recipient};

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the settings file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// A required environment variable is missing or empty.
    MissingEnv(&'static str),
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read settings file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse settings file '{}': {}", path.display(), source)
            }
            Self::MissingEnv(name) => write!(f, "environment variable {} is required", name),
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::MissingEnv(_) | Self::Validation(_) => None,
        }
    }
}

/// Two-valued switch. The settings document spells it "Да"/"Нет".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Toggle {
    On,
    #[default]
    Off,
}

impl Toggle {
    pub fn is_on(self) -> bool {
        self == Toggle::On
    }

    fn parse(key: &str, raw: RawToggle) -> Result<Self, ConfigError> {
        match raw {
            RawToggle::Bool(true) => Ok(Toggle::On),
            RawToggle::Bool(false) => Ok(Toggle::Off),
            RawToggle::Text(s) => match s.trim().to_lowercase().as_str() {
                "да" => Ok(Toggle::On),
                "нет" => Ok(Toggle::Off),
                _ => Err(ConfigError::Validation(format!(
                    "{key} must be \"Да\" or \"Нет\", got \"{s}\""
                ))),
            },
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawToggle {
    Bool(bool),
    Text(String),
}

/// Time of day for the daily weather digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyTime {
    pub hour: u32,
    pub minute: u32,
}

impl DailyTime {
    /// Parse "HH:MM".
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::Validation(format!("weather_time must be HH:MM, got \"{input}\""));
        let (h, m) = input.trim().split_once(':').ok_or_else(invalid)?;
        let hour: u32 = h.trim().parse().map_err(|_| invalid())?;
        let minute: u32 = m.trim().parse().map_err(|_| invalid())?;
        if hour > 23 || minute > 59 {
            return Err(invalid());
        }
        Ok(Self { hour, minute })
    }
}

impl Default for DailyTime {
    fn default() -> Self {
        Self { hour: 7, minute: 30 }
    }
}

#[derive(Deserialize)]
struct SettingsFile {
    bot_name: String,
    /// Persona description appended to the system prompt.
    #[serde(default)]
    bot_behavior: String,
    #[serde(default)]
    topics_list: Vec<String>,
    #[serde(default)]
    cities_for_weather: Vec<String>,
    send_weather: Option<RawToggle>,
    send_posts: Option<RawToggle>,
    weather_time: Option<String>,
    posts_interval: Option<u64>,
    timezone: Option<String>,
    log_dir: Option<String>,
}

const DEFAULT_TIMEZONE: &str = "Europe/Moscow";
/// One week.
const MAX_POSTS_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

/// Immutable bot settings, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bot_name: String,
    pub bot_behavior: String,
    pub topics: Vec<String>,
    pub cities: Vec<String>,
    pub send_weather: Toggle,
    pub send_posts: Toggle,
    pub weather_time: DailyTime,
    /// Time between topic posts. Always `Some` when posting is on.
    pub posts_period: Option<Duration>,
    pub timezone: Tz,
    pub log_dir: PathBuf,
}

impl Settings {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::ReadFile { path: path.clone(), source: e })?;
        let file: SettingsFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: path.clone(), source: e })?;
        Self::from_file(file)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let file: SettingsFile = serde_json::from_str(json).map_err(|e| ConfigError::ParseJson {
            path: PathBuf::from("<inline>"),
            source: e,
        })?;
        Self::from_file(file)
    }

    fn from_file(file: SettingsFile) -> Result<Self, ConfigError> {
        let bot_name = file.bot_name.trim().to_string();
        if bot_name.is_empty() {
            return Err(ConfigError::Validation("bot_name is required".into()));
        }

        let send_weather = match file.send_weather {
            Some(raw) => Toggle::parse("send_weather", raw)?,
            None => Toggle::Off,
        };
        let send_posts = match file.send_posts {
            Some(raw) => Toggle::parse("send_posts", raw)?,
            None => Toggle::Off,
        };

        let weather_time = match file.weather_time.as_deref() {
            Some(s) => DailyTime::parse(s)?,
            None => DailyTime::default(),
        };

        let topics: Vec<String> = file
            .topics_list
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        // Repeated cities are posted once, first occurrence wins.
        let mut seen = HashSet::new();
        let cities: Vec<String> = file
            .cities_for_weather
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty() && seen.insert(c.to_lowercase()))
            .collect();

        let posts_period = file.posts_interval.map(posts_period).transpose()?;

        if send_posts.is_on() {
            if topics.is_empty() {
                return Err(ConfigError::Validation(
                    "topics_list must not be empty when send_posts is on".into(),
                ));
            }
            if posts_period.is_none() {
                return Err(ConfigError::Validation(
                    "posts_interval is required when send_posts is on".into(),
                ));
            }
        }
        if send_weather.is_on() && cities.is_empty() {
            return Err(ConfigError::Validation(
                "cities_for_weather must not be empty when send_weather is on".into(),
            ));
        }

        let tz_name = file.timezone.as_deref().unwrap_or(DEFAULT_TIMEZONE);
        let timezone: Tz = tz_name
            .parse()
            .map_err(|_| ConfigError::Validation(format!("unknown timezone \"{tz_name}\"")))?;

        Ok(Self {
            bot_name,
            bot_behavior: file.bot_behavior.trim().to_string(),
            topics,
            cities,
            send_weather,
            send_posts,
            weather_time,
            posts_period,
            timezone,
            log_dir: PathBuf::from(file.log_dir.unwrap_or_else(|| "logs".to_string())),
        })
    }
}

/// Minutes from the settings file to a scheduler period, 1 minute to 1 week.
fn posts_period(minutes: u64) -> Result<Duration, ConfigError> {
    if minutes == 0 {
        return Err(ConfigError::Validation("posts_interval must be positive".into()));
    }
    if minutes > MAX_POSTS_INTERVAL_MINUTES {
        return Err(ConfigError::Validation(format!(
            "posts_interval must be at most {MAX_POSTS_INTERVAL_MINUTES} minutes, got {minutes}"
        )));
    }
    Ok(Duration::from_secs(minutes * 60))
}

/// Process secrets supplied through the environment.
#[derive(Clone)]
pub struct Secrets {
    pub bot_token: String,
    pub oauth_token: String,
    pub folder_id: String,
    pub chat_id: Recipient,
    /// Empty when the weather digest is off.
    pub weather_api_key: String,
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("folder_id", &self.folder_id)
            .field("chat_id", &self.chat_id)
            .finish_non_exhaustive()
    }
}

impl Secrets {
    /// Read secrets through `lookup`, usually `std::env::var`.
    pub fn from_lookup<F>(lookup: F, settings: &Settings) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| -> Result<String, ConfigError> {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::MissingEnv(name))
        };

        let bot_token = required("BOT_TOKEN")?;
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_valid = bot_token
            .split_once(':')
            .is_some_and(|(id, secret)| id.parse::<u64>().is_ok() && !secret.is_empty());
        if !token_valid {
            return Err(ConfigError::Validation(
                "BOT_TOKEN appears invalid (expected format: 123456789:ABCdefGHI...)".into(),
            ));
        }

        let weather_api_key = if settings.send_weather.is_on() {
            required("WEATHER_API_KEY")?
        } else {
            lookup("WEATHER_API_KEY").unwrap_or_default()
        };

        Ok(Self {
            bot_token,
            oauth_token: required("OAUTH_TOKEN")?,
            folder_id: required("FOLDER_ID")?,
            chat_id: parse_recipient(&required("CHAT_ID")?),
            weather_api_key,
        })
    }
}

/// Numeric ids become `ChatId`, anything else is treated as a channel username.
pub fn parse_recipient(raw: &str) -> Recipient {
    match raw.parse::<i64>() {
        Ok(id) => Recipient::Id(ChatId(id)),
        Err(_) => {
            let name = raw.trim_start_matches('@');
            Recipient::ChannelUsername(format!("@{name}"))
        }
    }
}

/// Everything the process reads at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub settings: Settings,
    pub secrets: Secrets,
}

impl Config {
    pub fn load<P, F>(path: P, lookup: F) -> Result<Self, ConfigError>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> Option<String>,
    {
        let settings = Settings::load(path)?;
        let secrets = Secrets::from_lookup(lookup, &settings)?;
        Ok(Self { settings, secrets })
    }

    /// Read settings from `path` and secrets from the process environment.
    pub fn from_env<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::load(path, |name| std::env::var(name).ok())
    }
}
