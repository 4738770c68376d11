//! Nearby points of interest per fixed category.

use super::cache::{coord_key, CacheKey, CacheStore, CacheTable};
use super::providers::{NearbySearch, PlacesProvider};
use super::types::{LatLng, Place, PlacesError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub const DEFAULT_RADIUS_M: u32 = 2000;
pub const MAX_PLACES: usize = 4;

/// The closed set of POI categories. Each carries its provider type lists and label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Shopping,
    Transit,
    Leisure,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Shopping, Category::Transit, Category::Leisure];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shopping => "shopping",
            Self::Transit => "transit",
            Self::Leisure => "leisure",
        }
    }

    /// Label used as the bundle key.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Shopping => "Einkaufsmöglichkeiten",
            Self::Transit => "Infrastruktur",
            Self::Leisure => "Freizeitmöglichkeiten",
        }
    }

    pub fn included_types(&self) -> &'static [&'static str] {
        match self {
            Self::Shopping => &["supermarket", "grocery_store", "shopping_mall", "department_store"],
            Self::Transit => &[
                "transit_station",
                "subway_station",
                "train_station",
                "bus_station",
                "light_rail_station",
            ],
            Self::Leisure => &["park", "gym", "movie_theater", "restaurant", "cafe", "museum"],
        }
    }

    pub fn excluded_types(&self) -> &'static [&'static str] {
        match self {
            Self::Shopping => &["gas_station"],
            Self::Transit => &["taxi_stand"],
            Self::Leisure => &["lodging"],
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = PlacesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PlacesError::UnknownCategory(s.to_string()))
    }
}

/// Natural key of the places table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacesKey {
    pub lat: f64,
    pub lng: f64,
    pub category: Category,
    pub radius_m: u32,
}

impl CacheKey for PlacesKey {
    const TABLE: CacheTable = CacheTable::Places;

    fn cache_id(&self) -> String {
        format!(
            "places|{}|{}|{}|{}",
            coord_key(self.lat),
            coord_key(self.lng),
            self.category,
            self.radius_m
        )
    }
}

pub struct NearbyPlaceFinder {
    provider: Arc<dyn PlacesProvider>,
    cache: Arc<CacheStore>,
    default_radius_m: u32,
    max_results: usize,
}

impl NearbyPlaceFinder {
    pub fn new(provider: Arc<dyn PlacesProvider>, cache: Arc<CacheStore>) -> Self {
        Self {
            provider,
            cache,
            default_radius_m: DEFAULT_RADIUS_M,
            max_results: MAX_PLACES,
        }
    }

    pub fn with_default_radius(mut self, radius_m: u32) -> Self {
        self.default_radius_m = radius_m;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Category given by name; unknown names are rejected before any lookup.
    pub fn find_named(
        &self,
        at: LatLng,
        category: &str,
        radius_m: Option<u32>,
        force_refresh: bool,
    ) -> Result<Vec<Place>, PlacesError> {
        let category: Category = category.parse()?;
        self.find(at, category, radius_m, force_refresh)
    }

    /// Up to `max_results` places of `category`, nearest first.
    pub fn find(
        &self,
        at: LatLng,
        category: Category,
        radius_m: Option<u32>,
        force_refresh: bool,
    ) -> Result<Vec<Place>, PlacesError> {
        let radius_m = radius_m.unwrap_or(self.default_radius_m);
        let key = PlacesKey {
            lat: at.lat,
            lng: at.lng,
            category,
            radius_m,
        };

        if !force_refresh {
            if let Some(mut places) = self.cache.get_fresh::<_, Vec<Place>>(&key) {
                places.truncate(self.max_results);
                return Ok(places);
            }
        }

        let request = NearbySearch {
            center: at,
            radius_m,
            included_types: category.included_types(),
            excluded_types: category.excluded_types(),
            max_results: self.max_results,
            rank_by_distance: true,
        };
        let mut places = self.provider.search_nearby(&request)?;
        places.truncate(self.max_results);
        tracing::debug!(%category, found = places.len(), "nearby search");

        self.cache.put_best_effort(&key, &places);
        Ok(places)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::testing::{memory_cache, ManualClock, StubPlaces, BERLIN};
    use crate::location::types::ProviderError;
    use chrono::Duration;

    fn finder(stub: Arc<StubPlaces>) -> (NearbyPlaceFinder, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        (NearbyPlaceFinder::new(stub, memory_cache(clock.clone())), clock)
    }

    #[test]
    fn test_category_parse() {
        assert_eq!("Transit".parse::<Category>().unwrap(), Category::Transit);
        assert!(matches!(
            "nightlife".parse::<Category>(),
            Err(PlacesError::UnknownCategory(c)) if c == "nightlife"
        ));
    }

    #[test]
    fn test_category_labels_unique() {
        let mut labels: Vec<&str> = Category::ALL.iter().map(Category::label).collect();
        labels.sort();
        labels.dedup();
        assert_eq!(labels.len(), Category::ALL.len());
    }

    #[test]
    fn test_unknown_category_makes_no_call() {
        let stub = Arc::new(StubPlaces::new(4));
        let (finder, _clock) = finder(stub.clone());
        let err = finder.find_named(BERLIN, "nightlife", None, false).unwrap_err();
        assert!(matches!(err, PlacesError::UnknownCategory(_)));
        assert_eq!(stub.calls(), 0);
    }

    #[test]
    fn test_request_shape() {
        let stub = Arc::new(StubPlaces::new(2));
        let (finder, _clock) = finder(stub.clone());
        finder.find(BERLIN, Category::Shopping, None, false).unwrap();

        let requests = stub.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].radius_m, DEFAULT_RADIUS_M);
        assert_eq!(requests[0].max_results, MAX_PLACES);
        assert!(requests[0].rank_by_distance);
        assert_eq!(requests[0].included_types, Category::Shopping.included_types());
        assert_eq!(requests[0].excluded_types, &["gas_station"]);
    }

    #[test]
    fn test_results_capped_and_cached() {
        let stub = Arc::new(StubPlaces::new(10));
        let (finder, _clock) = finder(stub.clone());

        let first = finder.find(BERLIN, Category::Leisure, None, false).unwrap();
        assert_eq!(first.len(), MAX_PLACES);
        let second = finder.find(BERLIN, Category::Leisure, None, false).unwrap();
        assert_eq!(first, second);
        assert_eq!(stub.calls(), 1);
    }

    #[test]
    fn test_radius_is_part_of_key() {
        let stub = Arc::new(StubPlaces::new(3));
        let (finder, _clock) = finder(stub.clone());
        finder.find(BERLIN, Category::Transit, None, false).unwrap();
        finder.find(BERLIN, Category::Transit, Some(500), false).unwrap();
        finder.find(BERLIN, Category::Transit, Some(DEFAULT_RADIUS_M), false).unwrap();
        assert_eq!(stub.calls(), 2);
    }

    #[test]
    fn test_expired_places_refetched() {
        let stub = Arc::new(StubPlaces::new(3));
        let (finder, clock) = finder(stub.clone());
        finder.find(BERLIN, Category::Shopping, None, false).unwrap();
        clock.advance(Duration::days(31));
        finder.find(BERLIN, Category::Shopping, None, false).unwrap();
        finder.find(BERLIN, Category::Shopping, None, false).unwrap();
        assert_eq!(stub.calls(), 2);
    }

    #[test]
    fn test_force_refresh() {
        let stub = Arc::new(StubPlaces::new(3));
        let (finder, _clock) = finder(stub.clone());
        finder.find(BERLIN, Category::Shopping, None, false).unwrap();
        finder.find(BERLIN, Category::Shopping, None, true).unwrap();
        assert_eq!(stub.calls(), 2);
    }

    #[test]
    fn test_provider_failure_propagates() {
        let stub = Arc::new(StubPlaces::new(3).failing_for("supermarket"));
        let (finder, _clock) = finder(stub);
        let err = finder.find(BERLIN, Category::Shopping, None, false).unwrap_err();
        assert!(matches!(err, PlacesError::Provider(ProviderError::Http { status: 503, .. })));
    }

    #[test]
    fn test_empty_result_is_cached() {
        let stub = Arc::new(StubPlaces::new(0));
        let (finder, _clock) = finder(stub.clone());
        assert!(finder.find(BERLIN, Category::Transit, None, false).unwrap().is_empty());
        assert!(finder.find(BERLIN, Category::Transit, None, false).unwrap().is_empty());
        assert_eq!(stub.calls(), 1);
    }
}
