//! Call-counting provider stubs and a manual clock for unit tests.

use super::cache::{CacheStore, Clock};
use super::providers::{DistanceProvider, GeocodeProvider, NearbySearch, PlacesProvider};
use super::types::{
    GeocodeHit, LatLng, Place, ProviderError, ResolutionSource, RouteEstimate, TravelMode,
};
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const BERLIN_ADDRESS: &str = "Beispielstr. 1, 10115 Berlin";
pub const BERLIN: LatLng = LatLng {
    lat: 52.5323,
    lng: 13.3846,
};

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn starting_now() -> Self {
        Self {
            now: Mutex::new(Utc::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now = *now + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

pub fn memory_cache(clock: Arc<ManualClock>) -> Arc<CacheStore> {
    Arc::new(CacheStore::in_memory().unwrap().with_clock(clock))
}

pub fn hit_at(location: LatLng, formatted_address: &str) -> GeocodeHit {
    GeocodeHit {
        location,
        formatted_address: formatted_address.to_string(),
        place_id: Some(format!("place-{}", location)),
        district: Some("Mitte".to_string()),
        city: Some("Berlin".to_string()),
        state: Some("Berlin".to_string()),
        postcode: Some("10115".to_string()),
        country: Some("Deutschland".to_string()),
        raw: serde_json::json!({ "status": "OK" }),
    }
}

/// Answers from a fixed table keyed by the exact query string.
pub struct StubGeocoder {
    hits: HashMap<String, GeocodeHit>,
    calls: AtomicUsize,
    failing: bool,
}

impl StubGeocoder {
    pub fn berlin() -> Self {
        let mut hits = HashMap::new();
        hits.insert(
            BERLIN_ADDRESS.to_string(),
            hit_at(BERLIN, "Beispielstraße 1, 10115 Berlin, Deutschland"),
        );
        Self {
            hits,
            calls: AtomicUsize::new(0),
            failing: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            hits: HashMap::new(),
            calls: AtomicUsize::new(0),
            failing: true,
        }
    }

    pub fn insert_hit(&mut self, query: &str, hit: GeocodeHit) {
        self.hits.insert(query.to_string(), hit);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl GeocodeProvider for StubGeocoder {
    fn source(&self) -> ResolutionSource {
        ResolutionSource::Google
    }

    fn geocode(&self, address: &str) -> Result<Option<GeocodeHit>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(ProviderError::Timeout { service: "stub geocoder" });
        }
        Ok(self.hits.get(address).cloned())
    }

    fn reverse_geocode(&self, at: LatLng) -> Result<Option<GeocodeHit>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(ProviderError::Timeout { service: "stub geocoder" });
        }
        Ok(self.hits.values().find(|h| h.location == at).cloned())
    }
}

/// Generates `count` places around the search center for every request; the
/// offsets depend on the first included type so categories never overlap.
pub struct StubPlaces {
    count: usize,
    calls: AtomicUsize,
    failing_types: HashSet<&'static str>,
    requests: Mutex<Vec<NearbySearch>>,
}

impl StubPlaces {
    pub fn new(count: usize) -> Self {
        Self {
            count,
            calls: AtomicUsize::new(0),
            failing_types: HashSet::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests whose first included type is `included_type` fail.
    pub fn failing_for(mut self, included_type: &'static str) -> Self {
        self.failing_types.insert(included_type);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<NearbySearch> {
        self.requests.lock().unwrap().clone()
    }
}

impl PlacesProvider for StubPlaces {
    fn search_nearby(&self, request: &NearbySearch) -> Result<Vec<Place>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let first_type = request.included_types.first().copied().unwrap_or("none");
        if self.failing_types.contains(first_type) {
            return Err(ProviderError::Http {
                service: "stub places",
                status: 503,
            });
        }

        let seed = first_type.len() as f64;
        Ok((0..self.count.min(request.max_results))
            .map(|i| {
                let step = (i + 1) as f64 * 0.001;
                Place {
                    name: format!("{} {}", first_type, i + 1),
                    lat: request.center.lat + step,
                    lng: request.center.lng + seed * 0.0001 + step,
                    place_id: format!("{}-{}", first_type, i + 1),
                    type_label: Some(first_type.to_string()),
                }
            })
            .collect())
    }
}

/// Straight-line metres from origin to each destination; walking speed 1.4 m/s,
/// other modes faster. Modes in `failing` answer with an HTTP error.
pub struct StubDistances {
    calls: Mutex<BTreeMap<TravelMode, usize>>,
    failing: HashSet<TravelMode>,
    no_route_from: Option<usize>,
}

impl StubDistances {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(BTreeMap::new()),
            failing: HashSet::new(),
            no_route_from: None,
        }
    }

    pub fn failing_for(mut self, mode: TravelMode) -> Self {
        self.failing.insert(mode);
        self
    }

    /// Destinations at index `from` and beyond have no route.
    pub fn no_route_from(mut self, from: usize) -> Self {
        self.no_route_from = Some(from);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn calls_for(&self, mode: TravelMode) -> usize {
        self.calls.lock().unwrap().get(&mode).copied().unwrap_or(0)
    }
}

pub fn straight_line_meters(a: LatLng, b: LatLng) -> f64 {
    let dlat = (b.lat - a.lat) * 111_320.0;
    let dlng = (b.lng - a.lng) * 111_320.0 * a.lat.to_radians().cos();
    (dlat * dlat + dlng * dlng).sqrt()
}

impl DistanceProvider for StubDistances {
    fn distance_matrix(
        &self,
        origin: LatLng,
        destinations: &[LatLng],
        mode: TravelMode,
    ) -> Result<Vec<RouteEstimate>, ProviderError> {
        *self.calls.lock().unwrap().entry(mode).or_insert(0) += 1;
        if self.failing.contains(&mode) {
            return Err(ProviderError::Http {
                service: "stub distances",
                status: 500,
            });
        }

        let speed = match mode {
            TravelMode::Walking => 1.4,
            TravelMode::Transit => 6.0,
            TravelMode::Driving => 9.0,
        };
        Ok(destinations
            .iter()
            .enumerate()
            .map(|(i, &destination)| {
                if self.no_route_from.is_some_and(|from| i >= from) {
                    return RouteEstimate::NO_ROUTE;
                }
                let meters = straight_line_meters(origin, destination);
                RouteEstimate::new(meters.round() as u32, (meters / speed).round() as u32)
            })
            .collect())
    }
}
