use common::errors::AppError;
use serde::Deserialize;
use std::fmt;
use utoipa::IntoParams;

pub const MAX_FORECAST_DAYS: u8 = 5;

/// What a caller wants to know about a location
#[derive(Debug, Clone, PartialEq)]
pub enum LocationQuery {
    PlaceName(String),
    Coordinates { lat: f64, lon: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Current,
    Forecast,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RequestKind::Current => "current",
            RequestKind::Forecast => "forecast",
        })
    }
}

impl LocationQuery {
    /// Cache key `{kind}:{form}:{value}`.
    ///
    /// Place names are lower-cased so casing variants share an entry.
    /// Coordinates are written exactly as parsed, without rounding.
    pub fn cache_key(&self, kind: RequestKind) -> String {
        match self {
            LocationQuery::PlaceName(name) => format!("{}:city:{}", kind, name.to_lowercase()),
            LocationQuery::Coordinates { lat, lon } => format!("{}:coords:{},{}", kind, lat, lon),
        }
    }
}

/// Query-string parameters of the current-weather endpoint
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LocationParams {
    /// Place name, e.g. "Hanoi" or "London,UK"
    pub city: Option<String>,
    /// Latitude, use together with `lon`
    pub lat: Option<f64>,
    /// Longitude, use together with `lat`
    pub lon: Option<f64>,
}

impl LocationParams {
    pub fn location(&self) -> Result<LocationQuery, AppError> {
        parse_location(self.city.as_deref(), self.lat, self.lon)
    }
}

/// Query-string parameters of the forecast endpoint
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ForecastParams {
    /// Place name, e.g. "Tokyo" or "London,UK"
    pub city: Option<String>,
    /// Latitude, use together with `lon`
    pub lat: Option<f64>,
    /// Longitude, use together with `lat`
    pub lon: Option<f64>,
    /// Forecast days (1-5, default 5)
    pub days: Option<i64>,
}

impl ForecastParams {
    pub fn location(&self) -> Result<LocationQuery, AppError> {
        parse_location(self.city.as_deref(), self.lat, self.lon)
    }

    /// Requested forecast length, defaulting to the full window.
    pub fn days(&self) -> Result<u8, AppError> {
        validate_days(self.days.unwrap_or(i64::from(MAX_FORECAST_DAYS)))
    }
}

/// Exactly one of a place name or a full coordinate pair.
fn parse_location(
    city: Option<&str>,
    lat: Option<f64>,
    lon: Option<f64>,
) -> Result<LocationQuery, AppError> {
    match (city, lat, lon) {
        (Some(_), Some(_), _) | (Some(_), _, Some(_)) => Err(AppError::validation(
            "Please provide either city name OR coordinates (lat and lon)",
        )),
        (Some(city), None, None) => validate_city(city).map(LocationQuery::PlaceName),
        (None, Some(lat), Some(lon)) => validate_coordinates(lat, lon),
        (None, Some(_), None) | (None, None, Some(_)) => Err(AppError::validation(
            "Both latitude and longitude are required when using coordinates",
        )),
        (None, None, None) => Err(AppError::validation(
            "Please provide either city name OR coordinates (lat and lon)",
        )),
    }
}

pub fn validate_days(days: i64) -> Result<u8, AppError> {
    match u8::try_from(days) {
        Ok(days @ 1..=MAX_FORECAST_DAYS) => Ok(days),
        _ => Err(AppError::validation("Forecast days must be between 1 and 5")),
    }
}

fn validate_city(city: &str) -> Result<String, AppError> {
    let city = city.trim();
    let length = city.chars().count();

    if length < 2 {
        return Err(AppError::validation("City name must be at least 2 characters"));
    }
    if length > 100 {
        return Err(AppError::validation("City name cannot exceed 100 characters"));
    }
    if !city
        .chars()
        .all(|c| c.is_alphabetic() || c.is_whitespace() || matches!(c, ',' | '.' | '-'))
    {
        return Err(AppError::validation(
            "City name can only contain letters, spaces, commas, periods, and hyphens",
        ));
    }

    Ok(city.to_string())
}

fn validate_coordinates(lat: f64, lon: f64) -> Result<LocationQuery, AppError> {
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(AppError::validation("Latitude must be between -90 and 90"));
    }
    if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
        return Err(AppError::validation("Longitude must be between -180 and 180"));
    }
    Ok(LocationQuery::Coordinates { lat, lon })
}
