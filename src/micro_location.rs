//! Micro-location enrichment: one address in, one bundle out.
//!
//! ```text
//! resolve ──► places × category (parallel) ──► distances × mode (parallel) ──► bundle
//! ```
//!
//! Only a resolver failure aborts the bundle. A failed category is left out and
//! a failed travel mode comes back as no-route entries.

use crate::config::Config;
use crate::location::{
    AddressResolver, CacheError, CachedResolver, Category, ConfigError, DistanceMatrixComputer,
    GoogleMapsClient, LatLng, NearbyPlaceFinder, Place, ProviderError, ResolvedAddress,
    RouteEstimate, TravelMode,
};
use crate::street_view::{self, StreetView};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

#[derive(Debug, thiserror::Error)]
pub enum MicroLocationError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("address resolution failed: {0}")]
    Resolver(#[from] ProviderError),
    #[error("cache unavailable: {0}")]
    Cache(#[from] CacheError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleLocation {
    pub lat: f64,
    pub lng: f64,
    pub formatted_address: String,
}

impl From<&ResolvedAddress> for BundleLocation {
    fn from(resolved: &ResolvedAddress) -> Self {
        Self {
            lat: resolved.location.lat,
            lng: resolved.location.lng,
            formatted_address: resolved.formatted_address.clone(),
        }
    }
}

/// A place with its route estimate for every requested travel mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedPlace {
    #[serde(flatten)]
    pub place: Place,
    pub distances: BTreeMap<TravelMode, RouteEstimate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicroLocationBundle {
    pub location: BundleLocation,
    /// Keyed by category label. Categories with no results are absent.
    pub categories: BTreeMap<String, Vec<EnhancedPlace>>,
    pub street_view: StreetView,
}

pub struct MicroLocationService {
    resolver: Arc<dyn AddressResolver>,
    places: NearbyPlaceFinder,
    distances: DistanceMatrixComputer,
    modes: Vec<TravelMode>,
}

impl MicroLocationService {
    pub fn new(
        resolver: Arc<dyn AddressResolver>,
        places: NearbyPlaceFinder,
        distances: DistanceMatrixComputer,
    ) -> Self {
        Self {
            resolver,
            places,
            distances,
            modes: TravelMode::ALL.to_vec(),
        }
    }

    pub fn with_modes(mut self, modes: Vec<TravelMode>) -> Self {
        self.modes = modes;
        self
    }

    /// Wire the metered Google stack and the shared cache. The API key is
    /// checked before the cache is touched.
    pub fn from_config(config: &Config) -> Result<Self, MicroLocationError> {
        let api_key = config.require_api_key()?;
        config.validate()?;
        let cache = config.open_cache()?;

        let google = Arc::new(GoogleMapsClient::new(
            api_key,
            config.request_timeout,
            config.language.clone(),
        ));
        let resolver = Arc::new(CachedResolver::new(google.clone(), cache.clone()));
        let places = NearbyPlaceFinder::new(google.clone(), cache.clone())
            .with_default_radius(config.search_radius_m)
            .with_max_results(config.max_places);
        let distances = DistanceMatrixComputer::new(google, cache);

        Ok(Self::new(resolver, places, distances).with_modes(config.travel_modes.clone()))
    }

    pub fn resolver(&self) -> &dyn AddressResolver {
        self.resolver.as_ref()
    }

    pub fn places(&self) -> &NearbyPlaceFinder {
        &self.places
    }

    pub fn distances(&self) -> &DistanceMatrixComputer {
        &self.distances
    }

    pub fn modes(&self) -> &[TravelMode] {
        &self.modes
    }

    /// Enrich `address`. `Ok(None)` when the address cannot be found.
    /// `force_refresh` skips every cache read but still stores what it fetches.
    pub fn enrich(
        &self,
        address: &str,
        force_refresh: bool,
    ) -> Result<Option<MicroLocationBundle>, MicroLocationError> {
        let Some(resolved) = self.resolver.resolve(address, force_refresh)? else {
            tracing::info!(address, "address not found, no bundle");
            return Ok(None);
        };
        let location = resolved.location;

        let found = self.find_all_categories(location, force_refresh);
        let destinations: Vec<LatLng> = found
            .iter()
            .flat_map(|(_, places)| places.iter().map(Place::location))
            .collect();
        let matrix = self
            .distances
            .compute_batch(location, &destinations, &self.modes, force_refresh);

        let mut index = 0;
        let mut categories = BTreeMap::new();
        let mut candidates = Vec::with_capacity(destinations.len());
        for (category, places) in found {
            let mut enhanced = Vec::with_capacity(places.len());
            for place in places {
                let distances: BTreeMap<TravelMode, RouteEstimate> = matrix
                    .iter()
                    .map(|(&mode, routes)| {
                        (mode, routes.get(index).copied().unwrap_or(RouteEstimate::NO_ROUTE))
                    })
                    .collect();
                let walking = distances
                    .get(&TravelMode::Walking)
                    .and_then(|route| route.distance_meters);
                candidates.push((place.location(), walking));
                enhanced.push(EnhancedPlace { place, distances });
                index += 1;
            }
            categories.insert(category.label().to_string(), enhanced);
        }

        let street_view = street_view::camera_for(location, &candidates);
        tracing::info!(
            address,
            categories = categories.len(),
            places = destinations.len(),
            heading = street_view.heading,
            "micro-location bundle ready"
        );

        Ok(Some(MicroLocationBundle {
            location: BundleLocation::from(&resolved),
            categories,
            street_view,
        }))
    }

    /// Non-empty categories in `Category::ALL` order. Failures are logged and skipped.
    fn find_all_categories(&self, at: LatLng, force_refresh: bool) -> Vec<(Category, Vec<Place>)> {
        thread::scope(|scope| {
            let handles: Vec<_> = Category::ALL
                .iter()
                .map(|&category| {
                    let handle = scope.spawn(move || self.places.find(at, category, None, force_refresh));
                    (category, handle)
                })
                .collect();

            handles
                .into_iter()
                .filter_map(|(category, handle)| match handle.join() {
                    Ok(Ok(places)) if !places.is_empty() => Some((category, places)),
                    Ok(Ok(_)) => {
                        tracing::debug!(%category, "no places found");
                        None
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(%category, error = %e, "nearby search failed, category skipped");
                        None
                    }
                    Err(_) => {
                        tracing::error!(%category, "nearby search worker panicked");
                        None
                    }
                })
                .collect()
        })
    }
}
