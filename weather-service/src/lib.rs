//! Weather lookups by place name or coordinates, served through an
//! in-process TTL cache in front of an OpenWeatherMap-compatible provider.

pub mod api_client;
pub mod cache;
pub mod clock;
pub mod config;
pub mod format;
pub mod handlers;
pub mod openapi;
pub mod query;
pub mod resolver;
pub mod service;

use axum::{
    Router,
    routing::{delete, get},
};
use common::errors::AppError;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api_client::OpenWeatherClient;
use crate::cache::WeatherCache;
use crate::clock::Clock;
use crate::config::Config;
use crate::resolver::LocationResolver;
use crate::service::{CacheTtls, WeatherService};

/// Wire the OpenWeatherMap client, resolver and cache from configuration.
pub fn build_service(
    config: &Config,
    clock: Arc<dyn Clock>,
    cancellation_token: CancellationToken,
) -> Result<WeatherService, AppError> {
    let client = Arc::new(OpenWeatherClient::from_config(config)?);
    let resolver = LocationResolver::new(
        client.clone(),
        config.preferred_country.clone(),
        config.geocoding_limit,
    );

    Ok(WeatherService::new(
        WeatherCache::new(clock),
        resolver,
        client,
        CacheTtls {
            current: config.current_ttl,
            forecast: config.forecast_ttl,
        },
        cancellation_token,
    ))
}

pub fn app(state: handlers::AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/weather/current", get(handlers::get_current_weather))
        .route("/api/weather/forecast", get(handlers::get_forecast))
        .route("/api/weather/cache/clear", delete(handlers::clear_cache))
        .route("/api/weather/cache/stats", get(handlers::cache_stats))
        .merge(openapi::swagger_ui())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
