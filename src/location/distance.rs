//! Batched origin→destinations distances, one provider call per travel mode.

use super::cache::{coord_key, CacheKey, CacheStore, CacheTable};
use super::providers::DistanceProvider;
use super::types::{LatLng, RouteEstimate, TravelMode};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

/// Google's Distance Matrix accepts at most 25 destinations per request.
pub const MAX_DESTINATIONS_PER_CALL: usize = 25;

/// Per-mode results, positionally aligned with the requested destinations.
pub type DistanceMatrix = BTreeMap<TravelMode, Vec<RouteEstimate>>;

/// Natural key of the distance table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistanceKey {
    pub origin_lat: f64,
    pub origin_lng: f64,
    pub destination_lat: f64,
    pub destination_lng: f64,
    pub mode: TravelMode,
}

impl DistanceKey {
    pub fn new(origin: LatLng, destination: LatLng, mode: TravelMode) -> Self {
        Self {
            origin_lat: origin.lat,
            origin_lng: origin.lng,
            destination_lat: destination.lat,
            destination_lng: destination.lng,
            mode,
        }
    }
}

impl CacheKey for DistanceKey {
    const TABLE: CacheTable = CacheTable::Distance;

    fn cache_id(&self) -> String {
        format!(
            "distance|{}|{}|{}|{}|{}",
            coord_key(self.origin_lat),
            coord_key(self.origin_lng),
            coord_key(self.destination_lat),
            coord_key(self.destination_lng),
            self.mode
        )
    }
}

pub struct DistanceMatrixComputer {
    provider: Arc<dyn DistanceProvider>,
    cache: Arc<CacheStore>,
}

impl DistanceMatrixComputer {
    pub fn new(provider: Arc<dyn DistanceProvider>, cache: Arc<CacheStore>) -> Self {
        Self { provider, cache }
    }

    /// Distances from `origin` to every destination for each mode.
    ///
    /// Never fails: a mode whose provider call fails comes back as all
    /// no-route entries, and the other modes are unaffected. Modes run in
    /// parallel; each mode costs at most one provider call however many
    /// destinations there are.
    pub fn compute_batch(
        &self,
        origin: LatLng,
        destinations: &[LatLng],
        modes: &[TravelMode],
        force_refresh: bool,
    ) -> DistanceMatrix {
        let mut modes = modes.to_vec();
        modes.sort();
        modes.dedup();

        if destinations.is_empty() {
            return modes.into_iter().map(|mode| (mode, Vec::new())).collect();
        }

        thread::scope(|scope| {
            let handles: Vec<_> = modes
                .iter()
                .map(|&mode| {
                    let handle = scope
                        .spawn(move || self.compute_mode(origin, destinations, mode, force_refresh));
                    (mode, handle)
                })
                .collect();

            handles
                .into_iter()
                .map(|(mode, handle)| {
                    let routes = handle.join().unwrap_or_else(|_| {
                        tracing::error!(%mode, "distance worker panicked");
                        vec![RouteEstimate::NO_ROUTE; destinations.len()]
                    });
                    (mode, routes)
                })
                .collect()
        })
    }

    fn compute_mode(
        &self,
        origin: LatLng,
        destinations: &[LatLng],
        mode: TravelMode,
        force_refresh: bool,
    ) -> Vec<RouteEstimate> {
        let keys: Vec<DistanceKey> = destinations
            .iter()
            .map(|&destination| DistanceKey::new(origin, destination, mode))
            .collect();

        if !force_refresh {
            let cached: Option<Vec<RouteEstimate>> =
                keys.iter().map(|key| self.cache.get_fresh(key)).collect();
            if let Some(routes) = cached {
                tracing::debug!(%mode, destinations = routes.len(), "distances served from cache");
                return routes;
            }
        }

        if destinations.len() > MAX_DESTINATIONS_PER_CALL {
            tracing::warn!(
                %mode,
                destinations = destinations.len(),
                limit = MAX_DESTINATIONS_PER_CALL,
                "more destinations than the provider accepts in one call"
            );
        }

        let mut routes = match self.provider.distance_matrix(origin, destinations, mode) {
            Ok(routes) => routes,
            Err(e) => {
                tracing::warn!(%mode, error = %e, "distance matrix failed, mode degraded to no-route");
                return vec![RouteEstimate::NO_ROUTE; destinations.len()];
            }
        };
        routes.resize(destinations.len(), RouteEstimate::NO_ROUTE);

        for (key, route) in keys.iter().zip(&routes) {
            self.cache.put_best_effort(key, route);
        }
        routes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::cache::CacheStore;
    use crate::location::testing::{memory_cache, ManualClock, StubDistances, BERLIN};
    use chrono::Duration;
    use tempfile::TempDir;

    fn destinations(n: usize) -> Vec<LatLng> {
        (0..n)
            .map(|i| LatLng::new(BERLIN.lat + 0.002 * (i + 1) as f64, BERLIN.lng - 0.001 * i as f64))
            .collect()
    }

    fn computer(stub: Arc<StubDistances>) -> (DistanceMatrixComputer, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        (DistanceMatrixComputer::new(stub, memory_cache(clock.clone())), clock)
    }

    #[test]
    fn test_one_call_per_mode_regardless_of_destinations() {
        for n in [1, 4, 12] {
            let stub = Arc::new(StubDistances::new());
            let (computer, _clock) = computer(stub.clone());
            let matrix = computer.compute_batch(BERLIN, &destinations(n), &TravelMode::ALL, false);

            assert_eq!(stub.calls(), TravelMode::ALL.len());
            for mode in TravelMode::ALL {
                assert_eq!(stub.calls_for(mode), 1);
                assert_eq!(matrix[&mode].len(), n);
                assert!(matrix[&mode].iter().all(RouteEstimate::has_route));
            }
        }
    }

    #[test]
    fn test_failed_mode_does_not_affect_others() {
        let stub = Arc::new(StubDistances::new().failing_for(TravelMode::Walking));
        let (computer, _clock) = computer(stub);
        let matrix = computer.compute_batch(BERLIN, &destinations(5), &TravelMode::ALL, false);

        assert_eq!(matrix[&TravelMode::Walking], vec![RouteEstimate::NO_ROUTE; 5]);
        assert!(matrix[&TravelMode::Driving].iter().all(RouteEstimate::has_route));
        assert!(matrix[&TravelMode::Transit].iter().all(RouteEstimate::has_route));
    }

    #[test]
    fn test_failed_mode_is_not_cached() {
        let stub = Arc::new(StubDistances::new().failing_for(TravelMode::Walking));
        let (computer, _clock) = computer(stub.clone());
        let dests = destinations(2);
        computer.compute_batch(BERLIN, &dests, &[TravelMode::Walking], false);
        computer.compute_batch(BERLIN, &dests, &[TravelMode::Walking], false);
        assert_eq!(stub.calls_for(TravelMode::Walking), 2);
    }

    #[test]
    fn test_no_route_destinations_are_null_and_cached() {
        let stub = Arc::new(StubDistances::new().no_route_from(2));
        let (computer, _clock) = computer(stub.clone());
        let dests = destinations(4);

        let first = computer.compute_batch(BERLIN, &dests, &[TravelMode::Transit], false);
        let routes = &first[&TravelMode::Transit];
        assert!(routes[0].has_route() && routes[1].has_route());
        assert_eq!(routes[2], RouteEstimate::NO_ROUTE);
        assert_eq!(routes[3], RouteEstimate::NO_ROUTE);

        let second = computer.compute_batch(BERLIN, &dests, &[TravelMode::Transit], false);
        assert_eq!(first, second);
        assert_eq!(stub.calls(), 1);
    }

    #[test]
    fn test_fully_cached_batch_makes_no_calls() {
        let stub = Arc::new(StubDistances::new());
        let (computer, _clock) = computer(stub.clone());
        let dests = destinations(6);

        let first = computer.compute_batch(BERLIN, &dests, &TravelMode::ALL, false);
        let second = computer.compute_batch(BERLIN, &dests, &TravelMode::ALL, false);
        assert_eq!(first, second);
        assert_eq!(stub.calls(), TravelMode::ALL.len());
    }

    #[test]
    fn test_partially_cached_batch_refetches_once() {
        let stub = Arc::new(StubDistances::new());
        let (computer, _clock) = computer(stub.clone());
        let dests = destinations(4);

        computer.compute_batch(BERLIN, &dests[..2], &[TravelMode::Driving], false);
        let matrix = computer.compute_batch(BERLIN, &dests, &[TravelMode::Driving], false);
        assert_eq!(matrix[&TravelMode::Driving].len(), 4);
        assert_eq!(stub.calls_for(TravelMode::Driving), 2);
    }

    #[test]
    fn test_expired_entries_refetched() {
        let stub = Arc::new(StubDistances::new());
        let (computer, clock) = computer(stub.clone());
        let dests = destinations(3);

        computer.compute_batch(BERLIN, &dests, &[TravelMode::Walking], false);
        clock.advance(Duration::days(30) + Duration::seconds(1));
        computer.compute_batch(BERLIN, &dests, &[TravelMode::Walking], false);
        computer.compute_batch(BERLIN, &dests, &[TravelMode::Walking], false);
        assert_eq!(stub.calls_for(TravelMode::Walking), 2);
    }

    #[test]
    fn test_force_refresh_bypasses_cache() {
        let stub = Arc::new(StubDistances::new());
        let (computer, _clock) = computer(stub.clone());
        let dests = destinations(2);
        computer.compute_batch(BERLIN, &dests, &[TravelMode::Driving], false);
        computer.compute_batch(BERLIN, &dests, &[TravelMode::Driving], true);
        assert_eq!(stub.calls(), 2);
    }

    #[test]
    fn test_cache_write_failure_still_returns_results() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.db");
        drop(CacheStore::open_at(&path).unwrap());
        let cache = Arc::new(CacheStore::open_read_only(&path).unwrap());

        let stub = Arc::new(StubDistances::new());
        let computer = DistanceMatrixComputer::new(stub.clone(), cache);
        let matrix = computer.compute_batch(BERLIN, &destinations(3), &[TravelMode::Walking], false);
        assert!(matrix[&TravelMode::Walking].iter().all(RouteEstimate::has_route));
    }

    #[test]
    fn test_empty_destinations() {
        let stub = Arc::new(StubDistances::new());
        let (computer, _clock) = computer(stub.clone());
        let matrix = computer.compute_batch(BERLIN, &[], &TravelMode::ALL, false);
        assert_eq!(matrix.len(), 3);
        assert!(matrix.values().all(Vec::is_empty));
        assert_eq!(stub.calls(), 0);
    }

    #[test]
    fn test_duplicate_modes_collapse() {
        let stub = Arc::new(StubDistances::new());
        let (computer, _clock) = computer(stub.clone());
        let matrix = computer.compute_batch(
            BERLIN,
            &destinations(2),
            &[TravelMode::Walking, TravelMode::Walking],
            false,
        );
        assert_eq!(matrix.len(), 1);
        assert_eq!(stub.calls(), 1);
    }

    #[test]
    fn test_key_keeps_full_precision() {
        let a = DistanceKey::new(BERLIN, LatLng::new(52.5323001, 13.3846), TravelMode::Walking);
        let b = DistanceKey::new(BERLIN, LatLng::new(52.5323002, 13.3846), TravelMode::Walking);
        assert_ne!(a.cache_id(), b.cache_id());
    }
}
