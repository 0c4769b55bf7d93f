use async_trait::async_trait;
use common::errors::{AppError, UpstreamStage};
use common::http_client::HttpClient;
use serde::Deserialize;
use tracing::{info, instrument};

use crate::config::{Config, validate_api_key};

/// One match returned by the geocoding endpoint
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeocodingCandidate {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Coord {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Condition {
    #[serde(default)]
    pub main: String,
    pub description: String,
    pub icon: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MainReadings {
    pub temp: f64,
    #[serde(default)]
    pub feels_like: Option<f64>,
    #[serde(default)]
    pub temp_min: Option<f64>,
    #[serde(default)]
    pub temp_max: Option<f64>,
    #[serde(default)]
    pub pressure: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Wind {
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub deg: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Clouds {
    pub all: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Sys {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub sunrise: Option<i64>,
    #[serde(default)]
    pub sunset: Option<i64>,
}

/// Current conditions as returned by `/weather`
#[derive(Debug, Clone, Deserialize)]
pub struct RawCurrentWeather {
    pub coord: Coord,
    #[serde(default)]
    pub weather: Vec<Condition>,
    pub main: MainReadings,
    #[serde(default)]
    pub visibility: Option<f64>,
    #[serde(default)]
    pub wind: Wind,
    #[serde(default)]
    pub clouds: Option<Clouds>,
    pub dt: i64,
    #[serde(default)]
    pub sys: Sys,
    #[serde(default)]
    pub timezone: i64,
    #[serde(default)]
    pub name: String,
}

/// One 3-hour slot of `/forecast`
#[derive(Debug, Clone, Deserialize)]
pub struct ForecastSlot {
    pub dt: i64,
    pub main: MainReadings,
    #[serde(default)]
    pub weather: Vec<Condition>,
    #[serde(default)]
    pub wind: Wind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForecastCity {
    pub name: String,
    pub coord: Coord,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub timezone: i64,
}

/// Forecast as returned by `/forecast`
#[derive(Debug, Clone, Deserialize)]
pub struct RawForecast {
    pub list: Vec<ForecastSlot>,
    pub city: ForecastCity,
}

#[async_trait]
pub trait GeocodingClient: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<GeocodingCandidate>, AppError>;
}

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn fetch_current(&self, lat: f64, lon: f64) -> Result<RawCurrentWeather, AppError>;

    /// `count` is the number of 3-hour slots to request.
    async fn fetch_forecast(&self, lat: f64, lon: f64, count: usize)
    -> Result<RawForecast, AppError>;
}

/// OpenWeatherMap client covering geocoding, current weather and forecast
pub struct OpenWeatherClient {
    http_client: HttpClient,
    api_key: Option<String>,
    base_url: String,
    geocoding_url: String,
}

impl OpenWeatherClient {
    pub fn new(
        api_key: Option<String>,
        base_url: String,
        geocoding_url: String,
        http_client: HttpClient,
    ) -> Self {
        Self {
            http_client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            geocoding_url: geocoding_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let http_client = HttpClient::new(config.http_timeout_secs, config.http_max_retries)?;
        Ok(Self::new(
            config.api_key.clone(),
            config.weather_base_url.clone(),
            config.geocoding_base_url.clone(),
            http_client,
        ))
    }

    fn api_key(&self) -> Result<String, AppError> {
        validate_api_key(self.api_key.as_deref()).map(str::to_string)
    }

    async fn fetch_weather_json<T>(
        &self,
        endpoint: &str,
        stage: UpstreamStage,
        mut query: Vec<(&str, String)>,
    ) -> Result<T, AppError>
    where
        T: serde::de::DeserializeOwned,
    {
        query.push(("appid", self.api_key()?));
        query.push(("units", "metric".to_string()));
        let url = format!("{}/{}", self.base_url, endpoint);

        self.http_client
            .get_json(&url, &query)
            .await
            .map_err(|e| classify(stage, e))
    }
}

#[async_trait]
impl GeocodingClient for OpenWeatherClient {
    #[instrument(skip(self))]
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<GeocodingCandidate>, AppError> {
        let api_key = self.api_key()?;
        let url = format!("{}/direct", self.geocoding_url);

        info!(query = %query, limit, "Geocoding location");

        self.http_client
            .get_json(
                &url,
                &[
                    ("q", query.to_string()),
                    ("limit", limit.to_string()),
                    ("appid", api_key),
                ],
            )
            .await
            .map_err(|e| classify(UpstreamStage::Geocoding, e))
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherClient {
    #[instrument(skip(self))]
    async fn fetch_current(&self, lat: f64, lon: f64) -> Result<RawCurrentWeather, AppError> {
        info!(lat, lon, "Fetching current weather from API");
        self.fetch_weather_json(
            "weather",
            UpstreamStage::CurrentWeather,
            vec![("lat", lat.to_string()), ("lon", lon.to_string())],
        )
        .await
    }

    #[instrument(skip(self))]
    async fn fetch_forecast(
        &self,
        lat: f64,
        lon: f64,
        count: usize,
    ) -> Result<RawForecast, AppError> {
        info!(lat, lon, count, "Fetching forecast from API");
        self.fetch_weather_json(
            "forecast",
            UpstreamStage::Forecast,
            vec![
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
                ("cnt", count.to_string()),
            ],
        )
        .await
    }
}

/// Wrap a transport failure with the stage it happened in, rewording the
/// provider statuses callers most often need to act on.
fn classify(stage: UpstreamStage, err: AppError) -> AppError {
    let err = match err {
        AppError::HttpError { status: 401, .. } => {
            AppError::http(401, "Invalid API key, check OPENWEATHER_API_KEY")
        }
        AppError::HttpError { status: 429, .. } => {
            AppError::http(429, "API rate limit exceeded, try again later")
        }
        other => other,
    };
    AppError::upstream(stage, err)
}
