use axum::{
    extract::{Query, State, rejection::QueryRejection},
    response::Json,
};
use common::errors::AppError;
use common::models::{
    CacheStatsResponse, ClearCacheResponse, ForecastSnapshot, WeatherResponse, WeatherSnapshot,
};
use std::sync::Arc;
use tracing::info;

use crate::query::{ForecastParams, LocationParams};
use crate::service::WeatherService;

#[derive(Clone)]
pub struct AppState {
    pub weather: Arc<WeatherService>,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service health check")
    )
)]
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "service": "weather-service" }))
}

#[utoipa::path(
    get,
    path = "/api/weather/current",
    params(LocationParams),
    responses(
        (status = 200, description = "Current weather, cached for 5 minutes", body = WeatherSnapshot),
        (status = 400, description = "Invalid location parameters"),
        (status = 404, description = "Location not found"),
        (status = 502, description = "Weather provider unavailable")
    ),
    tag = "weather"
)]
pub async fn get_current_weather(
    State(state): State<AppState>,
    params: Result<Query<LocationParams>, QueryRejection>,
) -> Result<Json<WeatherResponse<WeatherSnapshot>>, AppError> {
    let Query(params) = params?;
    let query = params.location()?;
    info!(?query, "Current weather request received");

    let weather = state.weather.get_current_weather(&query).await?;

    Ok(Json(weather.into()))
}

#[utoipa::path(
    get,
    path = "/api/weather/forecast",
    params(ForecastParams),
    responses(
        (status = 200, description = "Daily forecast, cached for 30 minutes", body = ForecastSnapshot),
        (status = 400, description = "Invalid location parameters or days"),
        (status = 404, description = "Location not found"),
        (status = 502, description = "Weather provider unavailable")
    ),
    tag = "weather"
)]
pub async fn get_forecast(
    State(state): State<AppState>,
    params: Result<Query<ForecastParams>, QueryRejection>,
) -> Result<Json<WeatherResponse<ForecastSnapshot>>, AppError> {
    let Query(params) = params?;
    let query = params.location()?;
    let days = params.days()?;
    info!(?query, days, "Forecast request received");

    let forecast = state.weather.get_forecast(&query, days).await?;

    Ok(Json(forecast.into()))
}

#[utoipa::path(
    delete,
    path = "/api/weather/cache/clear",
    responses(
        (status = 200, description = "Cache cleared", body = ClearCacheResponse)
    ),
    tag = "cache"
)]
pub async fn clear_cache(State(state): State<AppState>) -> Json<ClearCacheResponse> {
    let removed = state.weather.clear_cache().await;

    Json(ClearCacheResponse {
        success: true,
        message: format!("Cache cleared successfully. Removed {} entries.", removed),
        removed,
    })
}

#[utoipa::path(
    get,
    path = "/api/weather/cache/stats",
    responses(
        (status = 200, description = "Cache entries and their remaining TTL", body = CacheStatsResponse)
    ),
    tag = "cache"
)]
pub async fn cache_stats(State(state): State<AppState>) -> Json<CacheStatsResponse> {
    Json(CacheStatsResponse {
        success: true,
        data: state.weather.cache_stats().await,
    })
}
