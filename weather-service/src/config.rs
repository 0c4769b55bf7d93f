use chrono::Duration;
use common::errors::AppError;
use common::tracing::LogFormat;
use std::env;

/// Value shipped in sample `.env` files; treated the same as a missing key.
pub const PLACEHOLDER_API_KEY: &str = "your_api_key_here";

/// Upper bound for configured cache TTLs (30 days).
pub const MAX_CACHE_TTL_MS: i64 = 30 * 24 * 60 * 60 * 1000;

pub struct Config {
    pub port: u16,
    pub api_key: Option<String>,
    pub weather_base_url: String,
    pub geocoding_base_url: String,
    pub current_ttl: Duration,
    pub forecast_ttl: Duration,
    pub http_timeout_secs: u64,
    pub http_max_retries: u32,
    pub geocoding_limit: usize,
    pub preferred_country: String,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            port: var("PORT").and_then(|p| p.parse().ok()).unwrap_or(3002),
            api_key: var("OPENWEATHER_API_KEY"),
            weather_base_url: var("OPENWEATHER_BASE_URL")
                .unwrap_or_else(|| "https://api.openweathermap.org/data/2.5".to_string()),
            geocoding_base_url: var("OPENWEATHER_GEOCODING_URL")
                .unwrap_or_else(|| "http://api.openweathermap.org/geo/1.0".to_string()),
            current_ttl: ttl_millis(var("CACHE_TTL_CURRENT"), 300_000), // 5 minutes
            forecast_ttl: ttl_millis(var("CACHE_TTL_FORECAST"), 1_800_000), // 30 minutes
            http_timeout_secs: var("WEATHER_HTTP_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            http_max_retries: var("WEATHER_HTTP_MAX_RETRIES")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            geocoding_limit: var("GEOCODING_LIMIT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            preferred_country: var("PREFERRED_COUNTRY").unwrap_or_else(|| "VN".to_string()),
            log_format: var("LOG_FORMAT")
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
        }
    }

    /// The provider API key, or a configuration error when it is missing,
    /// blank or still the sample placeholder.
    pub fn api_key(&self) -> Result<&str, AppError> {
        validate_api_key(self.api_key.as_deref())
    }
}

/// A TTL in milliseconds. Zero, negative and oversized values fall back to `default_ms`.
fn ttl_millis(raw: Option<String>, default_ms: i64) -> Duration {
    let ms = raw
        .and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|ms| (1..=MAX_CACHE_TTL_MS).contains(ms))
        .unwrap_or(default_ms);
    Duration::milliseconds(ms)
}

pub fn validate_api_key(key: Option<&str>) -> Result<&str, AppError> {
    match key.map(str::trim) {
        Some(key) if !key.is_empty() && key != PLACEHOLDER_API_KEY => Ok(key),
        _ => Err(AppError::configuration(
            "OpenWeatherMap API key is not configured; set OPENWEATHER_API_KEY",
        )),
    }
}
