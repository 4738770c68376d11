//! Location subsystem: address resolution, nearby places and travel distances,
//! each memoized in a shared SQLite cache with a fixed validity window.

pub mod cache;
pub mod distance;
pub mod places;
pub mod providers;
pub mod rate_limit;
pub mod resolver;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CacheStore, CacheTable, TableStats};
pub use distance::{DistanceMatrix, DistanceMatrixComputer};
pub use places::{Category, NearbyPlaceFinder};
pub use providers::{GoogleMapsClient, NominatimClient};
pub use rate_limit::RateLimiter;
pub use resolver::{AddressCheck, AddressResolver, CachedResolver, RateLimitedResolver, StructuredAddress};
pub use types::{
    CacheError, ConfigError, LatLng, Place, PlacesError, ProviderError, ResolutionSource,
    ResolvedAddress, RouteEstimate, TravelMode,
};
