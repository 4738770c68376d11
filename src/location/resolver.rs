//! Address resolution strategies.
//!
//! Cached flow:        cache (within TTL) → metered provider → upsert → result
//! Rate-limited flow:  limiter (min spacing) → free provider → result
//!
//! Both answer with the same trichotomy: `Ok(Some)` resolved, `Ok(None)` not
//! found, `Err` provider unavailable.

use super::cache::{coord_key, normalize_address, CacheKey, CacheStore, CacheTable};
use super::providers::GeocodeProvider;
use super::rate_limit::RateLimiter;
use super::types::{GeocodeHit, LatLng, ProviderError, ResolutionSource, ResolvedAddress};
use serde::Serialize;
use std::sync::Arc;

pub trait AddressResolver: Send + Sync {
    fn resolve(&self, address: &str, force_refresh: bool) -> Result<Option<ResolvedAddress>, ProviderError>;

    fn reverse(&self, at: LatLng, force_refresh: bool) -> Result<Option<ResolvedAddress>, ProviderError>;
}

/// Natural key of the geocode table: the normalized address, or the exact
/// coordinate pair for reverse lookups.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GeocodeKey {
    Address { address: String },
    Reverse { lat: f64, lng: f64 },
}

impl GeocodeKey {
    pub fn address(address: &str) -> Self {
        Self::Address {
            address: normalize_address(address),
        }
    }

    pub fn reverse(at: LatLng) -> Self {
        Self::Reverse { lat: at.lat, lng: at.lng }
    }
}

impl CacheKey for GeocodeKey {
    const TABLE: CacheTable = CacheTable::Geocode;

    fn cache_id(&self) -> String {
        match self {
            Self::Address { address } => format!("address|{}", address),
            Self::Reverse { lat, lng } => format!("reverse|{}|{}", coord_key(*lat), coord_key(*lng)),
        }
    }
}

/// Metered strategy: every successful lookup is memoized.
pub struct CachedResolver {
    provider: Arc<dyn GeocodeProvider>,
    cache: Arc<CacheStore>,
}

impl CachedResolver {
    pub fn new(provider: Arc<dyn GeocodeProvider>, cache: Arc<CacheStore>) -> Self {
        Self { provider, cache }
    }

    fn lookup(
        &self,
        key: GeocodeKey,
        force_refresh: bool,
        fetch: impl FnOnce(&dyn GeocodeProvider) -> Result<Option<GeocodeHit>, ProviderError>,
    ) -> Result<Option<ResolvedAddress>, ProviderError> {
        if !force_refresh {
            if let Some(hit) = self.cache.get_fresh::<_, GeocodeHit>(&key) {
                return Ok(Some(ResolvedAddress::from_hit(hit, ResolutionSource::Cache)));
            }
        }

        let Some(hit) = fetch(self.provider.as_ref())? else {
            tracing::info!(key = %key.cache_id(), "geocoding returned no results");
            return Ok(None);
        };
        self.cache.put_best_effort(&key, &hit);
        Ok(Some(ResolvedAddress::from_hit(hit, self.provider.source())))
    }
}

impl AddressResolver for CachedResolver {
    fn resolve(&self, address: &str, force_refresh: bool) -> Result<Option<ResolvedAddress>, ProviderError> {
        let query = address.trim();
        if query.is_empty() {
            return Ok(None);
        }
        self.lookup(GeocodeKey::address(query), force_refresh, |provider| provider.geocode(query))
    }

    fn reverse(&self, at: LatLng, force_refresh: bool) -> Result<Option<ResolvedAddress>, ProviderError> {
        self.lookup(GeocodeKey::reverse(at), force_refresh, |provider| {
            provider.reverse_geocode(at)
        })
    }
}

/// Free strategy: no cache, every call waits its turn on the shared limiter.
pub struct RateLimitedResolver {
    provider: Arc<dyn GeocodeProvider>,
    limiter: Arc<RateLimiter>,
}

impl RateLimitedResolver {
    pub fn new(provider: Arc<dyn GeocodeProvider>, limiter: Arc<RateLimiter>) -> Self {
        Self { provider, limiter }
    }

    /// Resolve a structured address and flag whether it could be validated.
    /// A city differing from the input is only worth a warning; boundaries differ between datasets.
    pub fn validate_and_enrich(&self, address: &StructuredAddress) -> Result<AddressCheck, ProviderError> {
        let query = address.to_query();
        let resolved = self.resolve(&query, false)?;

        if let (Some(found), Some(input_city)) = (&resolved, address.city.as_deref()) {
            let found_city = found.city.as_deref().unwrap_or_default().to_lowercase();
            let input_city = input_city.trim().to_lowercase();
            if !input_city.is_empty() && !found_city.is_empty() && !found_city.contains(&input_city) {
                tracing::warn!(input = %input_city, geocoded = %found_city, "city mismatch");
            }
        }

        Ok(AddressCheck {
            is_valid: resolved.is_some(),
            resolved,
        })
    }
}

impl AddressResolver for RateLimitedResolver {
    fn resolve(&self, address: &str, _force_refresh: bool) -> Result<Option<ResolvedAddress>, ProviderError> {
        let query = address.trim();
        if query.is_empty() {
            return Ok(None);
        }
        self.limiter.acquire();
        let hit = self.provider.geocode(query)?;
        match hit {
            Some(hit) => {
                tracing::info!(query, district = ?hit.district, "geocoded address");
                Ok(Some(ResolvedAddress::from_hit(hit, self.provider.source())))
            }
            None => {
                tracing::warn!(query, "no geocoding results");
                Ok(None)
            }
        }
    }

    fn reverse(&self, at: LatLng, _force_refresh: bool) -> Result<Option<ResolvedAddress>, ProviderError> {
        self.limiter.acquire();
        let source = self.provider.source();
        Ok(self.provider.reverse_geocode(at)?.map(|mut hit| {
            // Keep the requested coordinates, not the snapped ones.
            hit.location = at;
            ResolvedAddress::from_hit(hit, source)
        }))
    }
}

/// A postal address in parts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuredAddress {
    pub street: Option<String>,
    pub house_number: Option<String>,
    pub postcode: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

impl StructuredAddress {
    pub const DEFAULT_COUNTRY: &'static str = "Deutschland";

    /// `"<street> <no>, <zip>, <city>, <state>, <country>"`, empty parts skipped.
    pub fn to_query(&self) -> String {
        fn non_empty(part: &Option<String>) -> Option<&str> {
            part.as_deref().map(str::trim).filter(|s| !s.is_empty())
        }

        let mut parts: Vec<String> = Vec::new();
        match (non_empty(&self.street), non_empty(&self.house_number)) {
            (Some(street), Some(number)) => parts.push(format!("{} {}", street, number)),
            (Some(street), None) => parts.push(street.to_string()),
            _ => {}
        }
        for part in [&self.postcode, &self.city, &self.state] {
            if let Some(p) = non_empty(part) {
                parts.push(p.to_string());
            }
        }
        parts.push(
            non_empty(&self.country)
                .unwrap_or(Self::DEFAULT_COUNTRY)
                .to_string(),
        );
        parts.join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddressCheck {
    pub is_valid: bool,
    pub resolved: Option<ResolvedAddress>,
}
