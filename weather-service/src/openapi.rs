use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers;
use common::models::{
    CacheEntryStats, CacheStats, CacheStatsResponse, ClearCacheResponse, DataSource, ForecastDay,
    ForecastSnapshot, LocationInfo, WeatherSnapshot,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::get_current_weather,
        handlers::get_forecast,
        handlers::clear_cache,
        handlers::cache_stats,
    ),
    components(schemas(
        WeatherSnapshot,
        ForecastSnapshot,
        ForecastDay,
        LocationInfo,
        DataSource,
        CacheStats,
        CacheEntryStats,
        CacheStatsResponse,
        ClearCacheResponse,
    )),
    tags(
        (name = "weather", description = "Current conditions and forecasts"),
        (name = "cache", description = "Cache administration"),
    ),
)]
pub struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())
}
