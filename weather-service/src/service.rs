use chrono::Duration;
use common::errors::{AppError, UpstreamStage};
use common::models::{CacheStats, ForecastSnapshot, Sourced, WeatherSnapshot};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::api_client::WeatherProvider;
use crate::cache::{CachedWeather, WeatherCache};
use crate::format::{SLOTS_PER_DAY, format_current, format_forecast};
use crate::query::{LocationQuery, MAX_FORECAST_DAYS, RequestKind, validate_days};
use crate::resolver::LocationResolver;

/// Freshness window per request kind
#[derive(Debug, Clone, Copy)]
pub struct CacheTtls {
    pub current: Duration,
    pub forecast: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            current: Duration::minutes(5),
            forecast: Duration::minutes(30),
        }
    }
}

/// Cache-first weather lookups.
///
/// Misses resolve the place name (coordinates skip this), fetch from the
/// provider, format and store the result. Failures are returned as-is and
/// never written to the cache. Concurrent misses for the same key are not
/// coalesced; each fetches and the last successful write wins.
pub struct WeatherService {
    cache: WeatherCache,
    resolver: LocationResolver,
    provider: Arc<dyn WeatherProvider>,
    ttls: CacheTtls,
    cancellation_token: CancellationToken,
}

struct Target {
    lat: f64,
    lon: f64,
    resolved_name: Option<String>,
}

impl WeatherService {
    pub fn new(
        cache: WeatherCache,
        resolver: LocationResolver,
        provider: Arc<dyn WeatherProvider>,
        ttls: CacheTtls,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            cache,
            resolver,
            provider,
            ttls,
            cancellation_token,
        }
    }

    #[instrument(skip(self))]
    pub async fn get_current_weather(
        &self,
        query: &LocationQuery,
    ) -> Result<Sourced<WeatherSnapshot>, AppError> {
        let key = query.cache_key(RequestKind::Current);

        if let Some(CachedWeather::Current(snapshot)) = self.cache.get(&key).await {
            info!(key = %key, "Serving current weather from cache");
            return Ok(Sourced::cache(snapshot));
        }

        let snapshot = self
            .until_cancelled(async {
                let target = self.locate(query).await?;
                let raw = self.provider.fetch_current(target.lat, target.lon).await?;
                format_current(&raw, target.resolved_name.as_deref())
                    .map_err(|e| AppError::upstream(UpstreamStage::CurrentWeather, e))
            })
            .await
            .inspect_err(|e| warn!(key = %key, error = %e, "Current weather lookup failed"))?;

        self.cache
            .set(key, CachedWeather::Current(snapshot.clone()), self.ttls.current)
            .await;

        Ok(Sourced::api(snapshot))
    }

    /// Forecast truncated to `days`. The cached entry always holds the full
    /// window, so every `days` value for a location shares one entry.
    #[instrument(skip(self))]
    pub async fn get_forecast(
        &self,
        query: &LocationQuery,
        days: u8,
    ) -> Result<Sourced<ForecastSnapshot>, AppError> {
        let days = usize::from(validate_days(i64::from(days))?);
        let key = query.cache_key(RequestKind::Forecast);

        if let Some(CachedWeather::Forecast(snapshot)) = self.cache.get(&key).await {
            info!(key = %key, days, "Serving forecast from cache");
            return Ok(Sourced::cache(snapshot.truncated(days)));
        }

        let snapshot = self
            .until_cancelled(async {
                let target = self.locate(query).await?;
                let slots = usize::from(MAX_FORECAST_DAYS) * SLOTS_PER_DAY;
                let raw = self
                    .provider
                    .fetch_forecast(target.lat, target.lon, slots)
                    .await?;
                format_forecast(&raw).map_err(|e| AppError::upstream(UpstreamStage::Forecast, e))
            })
            .await
            .inspect_err(|e| warn!(key = %key, error = %e, "Forecast lookup failed"))?;

        let truncated = snapshot.truncated(days);
        self.cache
            .set(key, CachedWeather::Forecast(snapshot), self.ttls.forecast)
            .await;

        Ok(Sourced::api(truncated))
    }

    pub async fn clear_cache(&self) -> usize {
        self.cache.clear().await
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    async fn locate(&self, query: &LocationQuery) -> Result<Target, AppError> {
        match query {
            LocationQuery::PlaceName(name) => {
                let resolved = self.resolver.resolve(name).await?;
                Ok(Target {
                    lat: resolved.lat,
                    lon: resolved.lon,
                    resolved_name: Some(resolved.name),
                })
            }
            LocationQuery::Coordinates { lat, lon } => Ok(Target {
                lat: *lat,
                lon: *lon,
                resolved_name: None,
            }),
        }
    }

    async fn until_cancelled<T>(
        &self,
        work: impl Future<Output = Result<T, AppError>>,
    ) -> Result<T, AppError> {
        tokio::select! {
            biased;
            _ = self.cancellation_token.cancelled() => {
                Err(AppError::cancelled("service is shutting down"))
            }
            result = work => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_client::{GeocodingCandidate, GeocodingClient, RawCurrentWeather, RawForecast};
    use crate::clock::ManualClock;
    use async_trait::async_trait;
    use chrono::DateTime;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakeGeocoder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GeocodingClient for FakeGeocoder {
        async fn search(&self, query: &str, _limit: usize) -> Result<Vec<GeocodingCandidate>, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if query.eq_ignore_ascii_case("atlantis") {
                return Ok(vec![]);
            }
            Ok(vec![GeocodingCandidate {
                name: "Hanoi".to_string(),
                lat: 21.0285,
                lon: 105.8542,
                country: "VN".to_string(),
                state: None,
            }])
        }
    }

    struct FakeProvider {
        current_calls: AtomicUsize,
        forecast_calls: AtomicUsize,
        failing: AtomicBool,
        temperature: std::sync::Mutex<f64>,
    }

    impl FakeProvider {
        fn new() -> Self {
            Self {
                current_calls: AtomicUsize::new(0),
                forecast_calls: AtomicUsize::new(0),
                failing: AtomicBool::new(false),
                temperature: std::sync::Mutex::new(28.0),
            }
        }

        fn set_temperature(&self, value: f64) {
            *self.temperature.lock().expect("lock") = value;
        }

        fn fail(&self, stage: UpstreamStage) -> Result<(), AppError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(AppError::upstream(stage, AppError::http(503, "unavailable")));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl WeatherProvider for FakeProvider {
        async fn fetch_current(&self, lat: f64, lon: f64) -> Result<RawCurrentWeather, AppError> {
            self.current_calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.fail(UpstreamStage::CurrentWeather)?;
            let temp = *self.temperature.lock().expect("lock");
            Ok(serde_json::from_value(json!({
                "coord": { "lat": lat, "lon": lon },
                "weather": [{ "main": "Clouds", "description": "few clouds", "icon": "02d" }],
                "main": { "temp": temp, "humidity": 70, "pressure": 1010 },
                "wind": { "speed": 2.5 },
                "dt": 1_700_000_000,
                "sys": { "country": "VN" },
                "timezone": 25200,
                "name": "Hanoi"
            }))
            .expect("valid payload"))
        }

        async fn fetch_forecast(
            &self,
            lat: f64,
            lon: f64,
            count: usize,
        ) -> Result<RawForecast, AppError> {
            self.forecast_calls.fetch_add(1, Ordering::SeqCst);
            self.fail(UpstreamStage::Forecast)?;
            assert_eq!(count, 40);
            let list: Vec<_> = (0..count as i64)
                .map(|i| {
                    json!({
                        "dt": 1_704_067_200 + i * 3 * 3600,
                        "main": { "temp": 20.0 + i as f64 * 0.1, "humidity": 60 },
                        "weather": [{ "main": "Clear", "description": "clear sky", "icon": "01d" }],
                        "wind": { "speed": 1.0 }
                    })
                })
                .collect();
            Ok(serde_json::from_value(json!({
                "list": list,
                "city": { "name": "Shuzenji", "country": "JP", "timezone": 0,
                          "coord": { "lat": lat, "lon": lon } }
            }))
            .expect("valid payload"))
        }
    }

    struct Harness {
        clock: Arc<ManualClock>,
        geocoder: Arc<FakeGeocoder>,
        provider: Arc<FakeProvider>,
        token: CancellationToken,
        service: WeatherService,
    }

    fn harness() -> Harness {
        let start = DateTime::from_timestamp(1_700_000_000, 0).expect("valid timestamp");
        let clock = Arc::new(ManualClock::new(start));
        let geocoder = Arc::new(FakeGeocoder {
            calls: AtomicUsize::new(0),
        });
        let provider = Arc::new(FakeProvider::new());
        let token = CancellationToken::new();
        let service = WeatherService::new(
            WeatherCache::new(clock.clone()),
            LocationResolver::new(geocoder.clone(), "VN".to_string(), 5),
            provider.clone(),
            CacheTtls::default(),
            token.clone(),
        );
        Harness {
            clock,
            geocoder,
            provider,
            token,
            service,
        }
    }

    fn hanoi() -> LocationQuery {
        LocationQuery::PlaceName("Hanoi".to_string())
    }

    fn tokyo() -> LocationQuery {
        LocationQuery::Coordinates {
            lat: 35.6762,
            lon: 139.6503,
        }
    }

    #[tokio::test]
    async fn second_lookup_within_ttl_is_a_cache_hit_with_identical_data() {
        let h = harness();

        let first = h.service.get_current_weather(&hanoi()).await.expect("api");
        let second = h
            .service
            .get_current_weather(&LocationQuery::PlaceName("HANOI".to_string()))
            .await
            .expect("cache");

        assert_eq!(first.source, common::models::DataSource::Api);
        assert_eq!(second.source, common::models::DataSource::Cache);
        assert_eq!(first.data, second.data);
        assert_eq!(first.data.location.name, "Hanoi");
        assert_eq!(h.provider.current_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.geocoder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entries_trigger_a_fresh_fetch() {
        let h = harness();
        h.service.get_current_weather(&hanoi()).await.expect("api");

        h.clock.advance(Duration::minutes(4) + Duration::seconds(59));
        let cached = h.service.get_current_weather(&hanoi()).await.expect("cache");
        assert_eq!(cached.source, common::models::DataSource::Cache);

        h.provider.set_temperature(31.0);
        h.clock.advance(Duration::seconds(1));
        let refreshed = h.service.get_current_weather(&hanoi()).await.expect("api");
        assert_eq!(refreshed.source, common::models::DataSource::Api);
        assert_eq!(refreshed.data.temperature, 31.0);
        assert_eq!(h.provider.current_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn coordinate_lookups_skip_geocoding() {
        let h = harness();
        let result = h.service.get_current_weather(&tokyo()).await.expect("api");
        assert_eq!(result.data.location.lat, 35.6762);
        assert_eq!(h.geocoder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn clear_removes_everything_and_forces_misses() {
        let h = harness();
        h.service.get_current_weather(&hanoi()).await.expect("api");
        h.service.get_forecast(&hanoi(), 3).await.expect("api");
        h.service.get_current_weather(&tokyo()).await.expect("api");

        assert_eq!(h.service.cache_stats().await.total_entries, 3);
        assert_eq!(h.service.clear_cache().await, 3);

        let after = h.service.get_current_weather(&hanoi()).await.expect("api");
        assert_eq!(after.source, common::models::DataSource::Api);
    }

    #[tokio::test]
    async fn forecasts_for_different_day_counts_share_one_fetch() {
        let h = harness();

        let three = h.service.get_forecast(&tokyo(), 3).await.expect("api");
        let five = h.service.get_forecast(&tokyo(), 5).await.expect("cache");
        let two = h.service.get_forecast(&tokyo(), 2).await.expect("cache");

        assert_eq!(h.provider.forecast_calls.load(Ordering::SeqCst), 1);
        assert_eq!(three.source, common::models::DataSource::Api);
        assert_eq!(five.source, common::models::DataSource::Cache);
        assert_eq!(three.data.forecast.len(), 3);
        assert_eq!(five.data.forecast.len(), 5);
        assert_eq!(two.data.forecast.len(), 2);
        assert_eq!(three.data.forecast[..], five.data.forecast[..3]);
        assert_eq!(two.data.forecast[..], five.data.forecast[..2]);
    }

    #[tokio::test]
    async fn forecast_days_outside_range_fail_before_any_fetch() {
        let h = harness();
        for days in [0, 6] {
            let err = h.service.get_forecast(&tokyo(), days).await.expect_err("invalid");
            assert!(matches!(err, AppError::ValidationError(_)));
        }
        assert_eq!(h.provider.forecast_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let h = harness();
        h.provider.failing.store(true, Ordering::SeqCst);

        let err = h.service.get_current_weather(&hanoi()).await.expect_err("down");
        assert!(matches!(
            err,
            AppError::UpstreamError {
                stage: UpstreamStage::CurrentWeather,
                ..
            }
        ));
        assert_eq!(h.service.cache_stats().await.total_entries, 0);

        h.provider.failing.store(false, Ordering::SeqCst);
        let ok = h.service.get_current_weather(&hanoi()).await.expect("recovered");
        assert_eq!(ok.source, common::models::DataSource::Api);
        assert_eq!(h.provider.current_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unknown_places_are_not_found_and_not_cached() {
        let h = harness();
        let query = LocationQuery::PlaceName("Atlantis".to_string());

        let err = h.service.get_current_weather(&query).await.expect_err("unknown");
        assert!(matches!(err, AppError::NotFoundError(_)));
        assert_eq!(h.provider.current_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.service.cache_stats().await.total_entries, 0);
    }

    #[tokio::test]
    async fn a_failed_refresh_leaves_a_fresh_entry_for_another_key_untouched() {
        let h = harness();
        h.service.get_current_weather(&hanoi()).await.expect("api");

        h.provider.failing.store(true, Ordering::SeqCst);
        h.service.get_current_weather(&tokyo()).await.expect_err("down");

        let cached = h.service.get_current_weather(&hanoi()).await.expect("cache");
        assert_eq!(cached.source, common::models::DataSource::Cache);
    }

    #[tokio::test]
    async fn cancelled_service_writes_nothing() {
        let h = harness();
        h.token.cancel();

        let err = h.service.get_current_weather(&hanoi()).await.expect_err("cancelled");
        assert!(matches!(err, AppError::CancelledError(_)));
        assert_eq!(h.service.cache_stats().await.total_entries, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_misses_each_fetch_and_leave_one_valid_entry() {
        let h = Arc::new(harness());

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let h = h.clone();
                tokio::spawn(async move { h.service.get_current_weather(&tokyo()).await })
            })
            .collect();

        for task in tasks {
            let result = task.await.expect("join").expect("lookup");
            assert_eq!(result.data.location.lat, 35.6762);
        }

        let stats = h.service.cache_stats().await;
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.entries[0].key, "current:coords:35.6762,139.6503");

        let calls = h.provider.current_calls.load(Ordering::SeqCst);
        assert!((1..=8).contains(&calls));

        let cached = h.service.get_current_weather(&tokyo()).await.expect("cache");
        assert_eq!(cached.source, common::models::DataSource::Cache);
        assert_eq!(cached.data.temperature, 28.0);
    }
}
