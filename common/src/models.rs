use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Where a weather payload was served from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Api,
    Cache,
}

/// A payload tagged with the source that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sourced<T> {
    pub source: DataSource,
    pub data: T,
}

impl<T> Sourced<T> {
    pub fn api(data: T) -> Self {
        Self {
            source: DataSource::Api,
            data,
        }
    }

    pub fn cache(data: T) -> Self {
        Self {
            source: DataSource::Cache,
            data,
        }
    }
}

/// Location block shared by current and forecast payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LocationInfo {
    pub name: String,
    pub country: String,
    pub lat: f64,
    pub lon: f64,
}

/// Current conditions for one location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WeatherSnapshot {
    pub location: LocationInfo,
    pub temperature: f64,
    pub feels_like: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub description: String,
    pub main: String,
    pub icon: String,
    pub icon_url: String,
    pub wind_speed: f64,
    pub wind_direction: Option<f64>,
    pub cloud_cover: Option<f64>,
    pub visibility: Option<f64>,
    pub sunrise: Option<i64>,
    pub sunset: Option<i64>,
    /// Shift in seconds from UTC
    pub timezone_offset: i64,
    /// Observation time, epoch seconds
    pub observed_at: i64,
}

/// One day of a forecast, aggregated from the provider's 3-hour slots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ForecastDay {
    /// Local calendar date at the location, `YYYY-MM-DD`
    pub date: String,
    pub timestamp: i64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub temp_avg: f64,
    pub description: String,
    pub icon: String,
    pub icon_url: String,
    pub humidity: f64,
    pub wind_speed: f64,
}

/// Multi-day forecast for one location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ForecastSnapshot {
    pub location: LocationInfo,
    pub forecast: Vec<ForecastDay>,
}

impl ForecastSnapshot {
    /// Copy holding only the first `days` entries.
    pub fn truncated(&self, days: usize) -> Self {
        Self {
            location: self.location.clone(),
            forecast: self.forecast.iter().take(days).cloned().collect(),
        }
    }
}

/// Envelope returned by the weather endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct WeatherResponse<T> {
    pub success: bool,
    pub source: DataSource,
    pub data: T,
}

impl<T> From<Sourced<T>> for WeatherResponse<T> {
    fn from(sourced: Sourced<T>) -> Self {
        Self {
            success: true,
            source: sourced.source,
            data: sourced.data,
        }
    }
}

/// One cache entry as seen by the stats endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntryStats {
    pub key: String,
    pub expires_at: DateTime<Utc>,
    /// Remaining lifetime in milliseconds; negative once expired
    pub ttl_ms: i64,
    pub expired: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_entries: usize,
    pub entries: Vec<CacheEntryStats>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CacheStatsResponse {
    pub success: bool,
    pub data: CacheStats,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ClearCacheResponse {
    pub success: bool,
    pub message: String,
    pub removed: usize,
}
