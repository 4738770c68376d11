//! Location providers: Google Maps (metered) and OpenStreetMap Nominatim (free).
//!
//! Each external service sits behind a trait so the resolver, place finder and
//! distance computer can run against call-counting stubs.

pub mod google;
pub mod nominatim;

use super::types::{GeocodeHit, LatLng, Place, ProviderError, ResolutionSource, RouteEstimate, TravelMode};
use serde::Serialize;

pub use google::GoogleMapsClient;
pub use nominatim::NominatimClient;

/// Forward and reverse address resolution.
pub trait GeocodeProvider: Send + Sync {
    /// Tag recorded on addresses this provider resolves.
    fn source(&self) -> ResolutionSource;

    /// `Ok(None)` means the provider reported zero results.
    fn geocode(&self, address: &str) -> Result<Option<GeocodeHit>, ProviderError>;

    fn reverse_geocode(&self, at: LatLng) -> Result<Option<GeocodeHit>, ProviderError>;
}

/// One nearby-search request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearbySearch {
    pub center: LatLng,
    pub radius_m: u32,
    pub included_types: &'static [&'static str],
    pub excluded_types: &'static [&'static str],
    pub max_results: usize,
    pub rank_by_distance: bool,
}

pub trait PlacesProvider: Send + Sync {
    fn search_nearby(&self, request: &NearbySearch) -> Result<Vec<Place>, ProviderError>;
}

pub trait DistanceProvider: Send + Sync {
    /// One batched call for a single mode. The answer is positional: entry `i`
    /// belongs to `destinations[i]`, with `RouteEstimate::NO_ROUTE` where no route exists.
    fn distance_matrix(
        &self,
        origin: LatLng,
        destinations: &[LatLng],
        mode: TravelMode,
    ) -> Result<Vec<RouteEstimate>, ProviderError>;
}
