//! Place name to coordinates.
//!
//! Geocoders return several candidates for most names ("Phú Yên" is a
//! commune, a district and a province). [`select_best`] narrows them with an
//! ordered list of preferences; a step only applies when it leaves at least
//! one candidate, and the provider's own ordering breaks whatever tie
//! remains. This is a best-effort ranking, not an exact lookup.

use common::errors::AppError;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::api_client::{GeocodingCandidate, GeocodingClient};

/// Lower-cased name prefixes marking sub-district units such as communes.
const COMMUNE_PREFIXES: &[&str] = &["xã "];
const COMMUNE_MARKER: &str = "commune";

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLocation {
    pub name: String,
    pub country: String,
    pub state: Option<String>,
    pub lat: f64,
    pub lon: f64,
}

impl From<&GeocodingCandidate> for ResolvedLocation {
    fn from(candidate: &GeocodingCandidate) -> Self {
        Self {
            name: candidate.name.clone(),
            country: candidate.country.clone(),
            state: candidate.state.clone().filter(|s| !s.is_empty()),
            lat: candidate.lat,
            lon: candidate.lon,
        }
    }
}

pub struct LocationResolver {
    client: Arc<dyn GeocodingClient>,
    preferred_country: String,
    limit: usize,
}

impl LocationResolver {
    pub fn new(client: Arc<dyn GeocodingClient>, preferred_country: String, limit: usize) -> Self {
        Self {
            client,
            preferred_country,
            limit: limit.max(1),
        }
    }

    #[instrument(skip(self))]
    pub async fn resolve(&self, place_name: &str) -> Result<ResolvedLocation, AppError> {
        let candidates = self.client.search(place_name, self.limit).await?;

        if candidates.is_empty() {
            return Err(AppError::not_found(format!(
                "Location \"{}\" not found; try adding a country code (e.g. \"Phu Yen, VN\") or a nearby major city",
                place_name
            )));
        }

        debug!(count = candidates.len(), "Geocoding candidates received");
        for (index, c) in candidates.iter().enumerate() {
            debug!(
                rank = index + 1,
                name = %c.name,
                state = c.state.as_deref().unwrap_or(""),
                country = %c.country,
                lat = c.lat,
                lon = c.lon,
                "Candidate"
            );
        }

        let best = select_best(&candidates, place_name, &self.preferred_country)
            .ok_or_else(|| AppError::not_found(format!("Location \"{}\" not found", place_name)))?;

        info!(
            name = %best.name,
            state = best.state.as_deref().unwrap_or(""),
            country = %best.country,
            lat = best.lat,
            lon = best.lon,
            "Location resolved"
        );

        Ok(ResolvedLocation::from(best))
    }
}

type Step = fn(&[&GeocodingCandidate], &str) -> Vec<usize>;

/// Applied in order within the preferred country; each returns the indices it keeps.
const STEPS: &[Step] = &[drop_communes, prefer_with_state, prefer_name_match];

/// Pick the most plausible candidate for `query`, or `None` when there are none.
///
/// When no candidate is in `preferred_country` the provider's first result
/// is taken as-is.
pub fn select_best<'a>(
    candidates: &'a [GeocodingCandidate],
    query: &str,
    preferred_country: &str,
) -> Option<&'a GeocodingCandidate> {
    let mut remaining: Vec<&GeocodingCandidate> = candidates
        .iter()
        .filter(|c| in_country(c, preferred_country))
        .collect();
    if remaining.is_empty() {
        return candidates.first();
    }

    for step in STEPS {
        let kept = step(&remaining, query);
        if !kept.is_empty() {
            remaining = kept.into_iter().map(|i| remaining[i]).collect();
        }
    }

    remaining.first().copied()
}

fn drop_communes(set: &[&GeocodingCandidate], _query: &str) -> Vec<usize> {
    keep(set, |c| !is_commune(c))
}

fn prefer_with_state(set: &[&GeocodingCandidate], _query: &str) -> Vec<usize> {
    keep(set, has_state)
}

fn prefer_name_match(set: &[&GeocodingCandidate], query: &str) -> Vec<usize> {
    keep(set, |c| names_overlap(c, query))
}

fn keep(set: &[&GeocodingCandidate], pred: impl Fn(&GeocodingCandidate) -> bool) -> Vec<usize> {
    set.iter()
        .enumerate()
        .filter(|(_, c)| pred(**c))
        .map(|(i, _)| i)
        .collect()
}

pub fn in_country(candidate: &GeocodingCandidate, country: &str) -> bool {
    candidate.country.eq_ignore_ascii_case(country)
}

pub fn is_commune(candidate: &GeocodingCandidate) -> bool {
    let name = candidate.name.to_lowercase();
    COMMUNE_PREFIXES.iter().any(|p| name.starts_with(p)) || name.contains(COMMUNE_MARKER)
}

pub fn has_state(candidate: &GeocodingCandidate) -> bool {
    candidate.state.as_deref().is_some_and(|s| !s.trim().is_empty())
}

pub fn names_overlap(candidate: &GeocodingCandidate, query: &str) -> bool {
    let name = candidate.name.to_lowercase();
    let query = query.trim().to_lowercase();
    name.contains(&query) || query.contains(&name)
}
