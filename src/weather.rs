//! OpenWeatherMap client and the HTML weather digest.

use std::time::Duration;

use chrono::DateTime;
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::{info, warn};

const WEATHER_URL: &str = "http://api.openweathermap.org/data/2.5/weather";

/// Stored for a city whose lookup failed.
pub const UNAVAILABLE: &str = "Ошибка при получении данных";

const FOOTER: &str = "#Погода #Прогноз #Weather #Forecast";

/// Current conditions for one city.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherRecord {
    /// °C
    pub temp: f64,
    pub description: String,
    /// Percent.
    pub humidity: i64,
    /// m/s
    pub wind: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WeatherReport {
    Ok(WeatherRecord),
    Unavailable(String),
}

/// Reports in the order the cities were configured.
pub type WeatherBatch = Vec<(String, WeatherReport)>;

#[derive(Deserialize)]
struct ApiResponse {
    main: ApiMain,
    weather: Vec<ApiCondition>,
    wind: ApiWind,
}

#[derive(Deserialize)]
struct ApiMain {
    temp: f64,
    humidity: i64,
}

#[derive(Deserialize)]
struct ApiCondition {
    description: String,
}

#[derive(Deserialize)]
struct ApiWind {
    speed: f64,
}

pub struct WeatherFetcher {
    api_key: String,
    endpoint: String,
    http: reqwest::Client,
}

impl WeatherFetcher {
    pub fn new(api_key: String) -> Self {
        Self::with_endpoint(api_key, WEATHER_URL)
    }

    pub fn with_endpoint(api_key: String, endpoint: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            api_key,
            endpoint: endpoint.into(),
            http,
        }
    }

    /// Look up every city. A failed city gets [`WeatherReport::Unavailable`]
    /// and the rest of the batch carries on.
    pub async fn fetch_weather(&self, cities: &[String]) -> WeatherBatch {
        let mut batch = Vec::with_capacity(cities.len());
        for city in cities {
            let report = match self.fetch_city(city).await {
                Ok(record) => WeatherReport::Ok(record),
                Err(e) => {
                    warn!("Weather lookup for {city} failed: {e}");
                    WeatherReport::Unavailable(UNAVAILABLE.to_string())
                }
            };
            batch.push((city.clone(), report));
        }
        info!("🌤️ Weather fetched for {} city(ies)", batch.len());
        batch
    }

    async fn fetch_city(&self, city: &str) -> Result<WeatherRecord, WeatherError> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("q", city),
                ("appid", self.api_key.as_str()),
                ("units", "metric"),
                ("lang", "ru"),
            ])
            .send()
            .await
            .map_err(|e| WeatherError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WeatherError::Status(status.as_u16()));
        }

        let data: ApiResponse = response
            .json()
            .await
            .map_err(|e| WeatherError::Parse(e.to_string()))?;

        let description = data
            .weather
            .into_iter()
            .next()
            .map(|c| c.description)
            .ok_or_else(|| WeatherError::Parse("empty weather list".into()))?;

        Ok(WeatherRecord {
            temp: data.main.temp,
            description,
            humidity: data.main.humidity,
            wind: data.wind.speed,
        })
    }
}

#[derive(Debug)]
pub enum WeatherError {
    Http(String),
    Status(u16),
    Parse(String),
}

impl std::fmt::Display for WeatherError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WeatherError::Http(e) => write!(f, "HTTP error: {e}"),
            WeatherError::Status(code) => write!(f, "HTTP status {code}"),
            WeatherError::Parse(e) => write!(f, "Parse error: {e}"),
        }
    }
}

impl std::error::Error for WeatherError {}

/// Escape text for Telegram's HTML parse mode.
fn html_escape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '&' => result.push_str("&amp;"),
            _ => result.push(c),
        }
    }
    result
}

/// Whole numbers keep one decimal place: 3.0 -> "3.0", 2.25 -> "2.25".
fn decimal(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 {
        format!("{v:.1}")
    } else {
        v.to_string()
    }
}

/// "нижний новгород" -> "Нижний новгород"
fn capitalize(s: &str) -> String {
    let lower = s.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Render the digest posted by the weather job (Telegram HTML).
pub fn format_digest(batch: &[(String, WeatherReport)], now: DateTime<Tz>) -> String {
    let mut message = format!(
        "🌤️ <b>Прогноз погоды на {}:</b>\n\n",
        now.format("%d-%m-%Y %H:%M")
    );

    for (city, report) in batch {
        let city = html_escape(&capitalize(city));
        match report {
            WeatherReport::Ok(r) => {
                message.push_str(&format!("🌍 <b>{city}:</b>\n"));
                message.push_str(&format!("🌡️ Температура: {}°C\n", decimal(r.temp)));
                message.push_str(&format!("☁️ Погода: {}\n", html_escape(&r.description)));
                message.push_str(&format!("💧 Влажность: {}%\n", r.humidity));
                message.push_str(&format!("🌬️ Ветер: {} м/с\n\n", decimal(r.wind)));
            }
            WeatherReport::Unavailable(err) => {
                message.push_str(&format!("<b>{city}:</b> {}\n\n", html_escape(err)));
            }
        }
    }

    message.push_str(FOOTER);
    message
}
