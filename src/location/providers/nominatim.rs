//! OpenStreetMap Nominatim: free forward and reverse geocoding.
//!
//! The usage policy requires a descriptive User-Agent and at most one request
//! per second; the spacing is enforced by the resolver's `RateLimiter`, not here.

use super::GeocodeProvider;
use crate::location::types::{GeocodeHit, LatLng, ProviderError, ResolutionSource};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

pub const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";
pub const USER_AGENT: &str = "Mikrolage/0.3 (micro-location enrichment)";

const NOMINATIM: &str = "Nominatim";

/// First non-empty field wins.
const DISTRICT_FIELDS: &[&str] = &[
    "suburb",
    "neighbourhood",
    "quarter",
    "district",
    "borough",
    "city_district",
];

const CITY_FIELDS: &[&str] = &["city", "town", "village"];

pub struct NominatimClient {
    agent: ureq::Agent,
    base_url: String,
    user_agent: String,
    language: String,
}

impl NominatimClient {
    pub fn new(timeout: Duration, language: impl Into<String>) -> Self {
        Self::with_base_url(NOMINATIM_URL, USER_AGENT, timeout, language)
    }

    /// Point the client at a self-hosted instance.
    pub fn with_base_url(
        base_url: impl Into<String>,
        user_agent: impl Into<String>,
        timeout: Duration,
        language: impl Into<String>,
    ) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_agent: user_agent.into(),
            language: language.into(),
        }
    }

    fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, ProviderError> {
        let mut request = self
            .agent
            .get(&format!("{}/{}", self.base_url, path))
            .set("User-Agent", &self.user_agent);
        for (name, value) in query {
            request = request.query(name, value);
        }
        let response = request
            .query("format", "json")
            .query("addressdetails", "1")
            .query("accept-language", &self.language)
            .call()
            .map_err(|e| ProviderError::from_ureq(NOMINATIM, e))?;

        response
            .into_json()
            .map_err(|e| ProviderError::invalid(NOMINATIM, e.to_string()))
    }
}

impl GeocodeProvider for NominatimClient {
    fn source(&self) -> ResolutionSource {
        ResolutionSource::Nominatim
    }

    fn geocode(&self, address: &str) -> Result<Option<GeocodeHit>, ProviderError> {
        let payload = self.get_json("search", &[("q", address), ("limit", "1")])?;
        parse_search_response(payload)
    }

    fn reverse_geocode(&self, at: LatLng) -> Result<Option<GeocodeHit>, ProviderError> {
        let lat = at.lat.to_string();
        let lon = at.lng.to_string();
        let payload = self.get_json("reverse", &[("lat", lat.as_str()), ("lon", lon.as_str())])?;
        parse_reverse_response(payload)
    }
}

// ─── Response parsing ───────────────────────────────────────────

#[derive(Deserialize, Debug, Clone)]
struct NominatimResult {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    place_id: Option<Value>,
    #[serde(default)]
    address: BTreeMap<String, Value>,
}

impl NominatimResult {
    fn field(&self, name: &str) -> Option<String> {
        self.address
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    }

    fn first_field(&self, names: &[&str]) -> Option<String> {
        names.iter().find_map(|name| self.field(name))
    }

    fn into_hit(self, raw: Value) -> Result<GeocodeHit, ProviderError> {
        let lat: f64 = self
            .lat
            .parse()
            .map_err(|_| ProviderError::invalid(NOMINATIM, format!("bad latitude '{}'", self.lat)))?;
        let lon: f64 = self
            .lon
            .parse()
            .map_err(|_| ProviderError::invalid(NOMINATIM, format!("bad longitude '{}'", self.lon)))?;

        let place_id = match &self.place_id {
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        };

        Ok(GeocodeHit {
            location: LatLng::new(lat, lon),
            formatted_address: self.display_name.clone().unwrap_or_default(),
            place_id,
            district: self.first_field(DISTRICT_FIELDS),
            city: self.first_field(CITY_FIELDS),
            state: self.field("state"),
            postcode: self.field("postcode"),
            country: self.field("country"),
            raw,
        })
    }
}

/// `/search` answers with an array; empty means "not found".
pub fn parse_search_response(payload: Value) -> Result<Option<GeocodeHit>, ProviderError> {
    let results: Vec<NominatimResult> = serde_json::from_value(payload.clone())
        .map_err(|e| ProviderError::invalid(NOMINATIM, e.to_string()))?;

    match results.into_iter().next() {
        Some(first) => first.into_hit(payload).map(Some),
        None => Ok(None),
    }
}

/// `/reverse` answers with one object, or `{"error": "Unable to geocode"}`.
pub fn parse_reverse_response(payload: Value) -> Result<Option<GeocodeHit>, ProviderError> {
    if payload.get("error").is_some() || payload.as_object().is_some_and(|o| o.is_empty()) {
        return Ok(None);
    }
    let result: NominatimResult = serde_json::from_value(payload.clone())
        .map_err(|e| ProviderError::invalid(NOMINATIM, e.to_string()))?;
    result.into_hit(payload).map(Some)
}
