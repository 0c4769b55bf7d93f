use chrono::{DateTime, NaiveDate};
use common::errors::AppError;
use common::models::{ForecastDay, ForecastSnapshot, LocationInfo, WeatherSnapshot};
use std::collections::HashMap;

use crate::api_client::{Condition, ForecastSlot, RawCurrentWeather, RawForecast};
use crate::query::MAX_FORECAST_DAYS;

/// 3-hour slots per day in the provider's forecast feed.
pub const SLOTS_PER_DAY: usize = 8;

pub fn icon_url(icon: &str) -> String {
    format!("https://openweathermap.org/img/wn/{}@2x.png", icon)
}

/// Map `/weather` output to a [`WeatherSnapshot`]. `fallback_name` is used
/// when the provider returns no station name (common for remote coordinates).
pub fn format_current(
    raw: &RawCurrentWeather,
    fallback_name: Option<&str>,
) -> Result<WeatherSnapshot, AppError> {
    let condition = primary_condition(&raw.weather, raw.dt)?;
    let name = match (raw.name.trim(), fallback_name) {
        ("", Some(fallback)) => fallback.to_string(),
        (name, _) => name.to_string(),
    };
    let main = &raw.main;

    Ok(WeatherSnapshot {
        location: LocationInfo {
            name,
            country: raw.sys.country.clone().unwrap_or_default(),
            lat: raw.coord.lat,
            lon: raw.coord.lon,
        },
        temperature: main.temp.round(),
        feels_like: main.feels_like.unwrap_or(main.temp).round(),
        temp_min: main.temp_min.unwrap_or(main.temp).round(),
        temp_max: main.temp_max.unwrap_or(main.temp).round(),
        humidity: main.humidity.unwrap_or_default(),
        pressure: main.pressure.unwrap_or_default(),
        description: condition.description.clone(),
        main: condition.main.clone(),
        icon: condition.icon.clone(),
        icon_url: icon_url(&condition.icon),
        wind_speed: raw.wind.speed,
        wind_direction: raw.wind.deg,
        cloud_cover: raw.clouds.as_ref().map(|c| c.all),
        visibility: raw.visibility,
        sunrise: raw.sys.sunrise,
        sunset: raw.sys.sunset,
        timezone_offset: raw.timezone,
        observed_at: raw.dt,
    })
}

/// Group `/forecast` slots into per-day summaries, keyed by the local
/// calendar date at the location. At most [`MAX_FORECAST_DAYS`] are kept.
pub fn format_forecast(raw: &RawForecast) -> Result<ForecastSnapshot, AppError> {
    if raw.list.is_empty() {
        return Err(AppError::malformed("forecast contains no entries"));
    }

    let mut days: Vec<(NaiveDate, Vec<&ForecastSlot>)> = Vec::new();
    for slot in &raw.list {
        let date = local_date(slot.dt, raw.city.timezone)?;
        if let Some((_, slots)) = days.last_mut().filter(|(current, _)| *current == date) {
            slots.push(slot);
        } else {
            days.push((date, vec![slot]));
        }
    }

    let forecast = days
        .into_iter()
        .take(usize::from(MAX_FORECAST_DAYS))
        .map(|(date, slots)| summarize_day(date, &slots))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ForecastSnapshot {
        location: LocationInfo {
            name: raw.city.name.clone(),
            country: raw.city.country.clone(),
            lat: raw.city.coord.lat,
            lon: raw.city.coord.lon,
        },
        forecast,
    })
}

fn summarize_day(date: NaiveDate, slots: &[&ForecastSlot]) -> Result<ForecastDay, AppError> {
    let mut descriptions = Vec::with_capacity(slots.len());
    let mut icons = Vec::with_capacity(slots.len());
    for slot in slots {
        let condition = primary_condition(&slot.weather, slot.dt)?;
        descriptions.push(condition.description.as_str());
        icons.push(condition.icon.as_str());
    }

    let temps: Vec<f64> = slots.iter().map(|s| s.main.temp).collect();
    let temp_min = temps.iter().copied().fold(f64::INFINITY, f64::min);
    let temp_max = temps.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let icon = most_common(&icons).unwrap_or_default().to_string();

    Ok(ForecastDay {
        date: date.format("%Y-%m-%d").to_string(),
        timestamp: slots[0].dt,
        temp_min: temp_min.round(),
        temp_max: temp_max.round(),
        temp_avg: mean(temps.iter().copied()).round(),
        description: most_common(&descriptions).unwrap_or_default().to_string(),
        icon_url: icon_url(&icon),
        icon,
        humidity: mean(slots.iter().map(|s| s.main.humidity.unwrap_or_default())).round(),
        wind_speed: mean(slots.iter().map(|s| s.wind.speed)).round(),
    })
}

fn primary_condition(conditions: &[Condition], dt: i64) -> Result<&Condition, AppError> {
    conditions
        .first()
        .ok_or_else(|| AppError::malformed(format!("no weather condition for timestamp {}", dt)))
}

fn local_date(dt: i64, offset_secs: i64) -> Result<NaiveDate, AppError> {
    DateTime::from_timestamp(dt + offset_secs, 0)
        .map(|t| t.date_naive())
        .ok_or_else(|| AppError::malformed(format!("timestamp {} out of range", dt)))
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if count == 0 { 0.0 } else { sum / count as f64 }
}

/// Most frequent value; on a tie the one that reached the count first wins.
fn most_common<'a>(values: &[&'a str]) -> Option<&'a str> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut best: Option<(&str, usize)> = None;

    for &value in values {
        let count = counts.entry(value).or_insert(0);
        *count += 1;
        if best.is_none_or(|(_, top)| *count > top) {
            best = Some((value, *count));
        }
    }

    best.map(|(value, _)| value)
}
