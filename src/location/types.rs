//! Core types for the location subsystem.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

impl fmt::Display for LatLng {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat, self.lng)
    }
}

impl FromStr for LatLng {
    type Err = String;

    /// Parses `"52.52,13.405"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lng) = s
            .split_once(',')
            .ok_or_else(|| format!("expected LAT,LNG but got '{}'", s))?;
        let lat: f64 = lat.trim().parse().map_err(|_| format!("invalid latitude '{}'", lat))?;
        let lng: f64 = lng.trim().parse().map_err(|_| format!("invalid longitude '{}'", lng))?;
        let at = LatLng::new(lat, lng);
        if !at.is_valid() {
            return Err(format!("coordinates out of range: {}", at));
        }
        Ok(at)
    }
}

/// How an address was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionSource {
    Cache,
    Google,
    Nominatim,
}

impl fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache => write!(f, "Cache"),
            Self::Google => write!(f, "Google"),
            Self::Nominatim => write!(f, "Nominatim"),
        }
    }
}

/// What a geocoding provider hands back for one address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeHit {
    pub location: LatLng,
    pub formatted_address: String,
    #[serde(default)]
    pub place_id: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postcode: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    /// Provider payload as received, kept for the geocode cache.
    #[serde(default)]
    pub raw: serde_json::Value,
}

/// A fully resolved address with coordinates, administrative components and provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedAddress {
    pub location: LatLng,
    pub formatted_address: String,
    pub place_id: Option<String>,
    pub district: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub country: Option<String>,
    pub source: ResolutionSource,
}

impl ResolvedAddress {
    pub fn from_hit(hit: GeocodeHit, source: ResolutionSource) -> Self {
        Self {
            location: hit.location,
            formatted_address: hit.formatted_address,
            place_id: hit.place_id,
            district: hit.district,
            city: hit.city,
            state: hit.state,
            postcode: hit.postcode,
            country: hit.country,
            source,
        }
    }
}

/// A point of interest returned by the nearby search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub place_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_label: Option<String>,
}

impl Place {
    pub fn location(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

/// Travel modes understood by the distance provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    Driving,
    Walking,
    Transit,
}

impl TravelMode {
    pub const ALL: [TravelMode; 3] = [TravelMode::Driving, TravelMode::Walking, TravelMode::Transit];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Driving => "driving",
            Self::Walking => "walking",
            Self::Transit => "transit",
        }
    }
}

impl fmt::Display for TravelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TravelMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "driving" | "car" => Ok(Self::Driving),
            "walking" | "walk" => Ok(Self::Walking),
            "transit" => Ok(Self::Transit),
            _ => Err(format!("Unknown travel mode '{}'. Use driving, walking or transit.", s)),
        }
    }
}

/// Distance and duration for one origin/destination pair. Both are `None` when
/// the provider found no route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RouteEstimate {
    pub distance_meters: Option<u32>,
    pub duration_seconds: Option<u32>,
}

impl RouteEstimate {
    pub const NO_ROUTE: RouteEstimate = RouteEstimate {
        distance_meters: None,
        duration_seconds: None,
    };

    pub fn new(distance_meters: u32, duration_seconds: u32) -> Self {
        Self {
            distance_meters: Some(distance_meters),
            duration_seconds: Some(duration_seconds),
        }
    }

    pub fn has_route(&self) -> bool {
        self.distance_meters.is_some()
    }
}

/// Configuration problems. Fatal: raised before any cache or network access.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Google Maps API key not configured (set GOOGLE_MAPS_API_KEY or pass --api-key)")]
    MissingApiKey,
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Failures talking to an external provider. "Not found" is never one of these.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("network error calling {service}: {message}")]
    Network { service: &'static str, message: String },
    #[error("{service} did not answer within the timeout")]
    Timeout { service: &'static str },
    #[error("{service} answered HTTP {status}")]
    Http { service: &'static str, status: u16 },
    #[error("{service} reported status {status}")]
    Status { service: &'static str, status: String },
    #[error("invalid response from {service}: {message}")]
    InvalidResponse { service: &'static str, message: String },
}

impl ProviderError {
    pub(crate) fn invalid(service: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            service,
            message: message.into(),
        }
    }

    /// Maps a ureq failure onto the taxonomy: timeouts, transport and HTTP status stay distinct.
    pub(crate) fn from_ureq(service: &'static str, err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(status, _) => Self::Http { service, status },
            ureq::Error::Transport(transport) => {
                let timed_out = std::error::Error::source(&transport)
                    .and_then(|source| source.downcast_ref::<std::io::Error>())
                    .map(|io| {
                        matches!(
                            io.kind(),
                            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                        )
                    })
                    .unwrap_or(false);
                if timed_out {
                    Self::Timeout { service }
                } else {
                    Self::Network {
                        service,
                        message: transport.to_string(),
                    }
                }
            }
        }
    }
}

/// Nearby-search failures. An unknown category is rejected before any network call.
#[derive(Debug, thiserror::Error)]
pub enum PlacesError {
    #[error("Invalid category '{0}'. Use shopping, transit or leisure.")]
    UnknownCategory(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Cache persistence errors. Callers log these and carry on with fetched data.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("cache (de)serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("cache lock poisoned")]
    Poisoned,
    #[error("cannot create cache directory: {0}")]
    Io(#[from] std::io::Error),
}
