//! Street-level camera placement.
//!
//! The nearest points of interest approximate where the street runs. The camera
//! is moved a fixed share of the way from the building toward that point and turned to
//! face the building.

use crate::location::LatLng;
use serde::{Deserialize, Serialize};

/// How many nearby places are averaged into the street estimate.
pub const NEAREST_PLACES: usize = 3;
/// Share of the building→street vector the camera is moved along.
pub const CAMERA_OFFSET_FRACTION: f64 = 0.2;
/// Guards the direction normalization when the street estimate sits on the building.
const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreetView {
    pub lat: f64,
    pub lng: f64,
    /// Compass heading in whole degrees, 0..=359.
    pub heading: u16,
}

impl StreetView {
    /// Camera on the location itself, facing north.
    pub fn at(location: LatLng) -> Self {
        Self {
            lat: location.lat,
            lng: location.lng,
            heading: 0,
        }
    }

    pub fn location(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

fn normalize_degrees(deg: f64) -> f64 {
    deg.rem_euclid(360.0)
}

/// Planar bearing from `from` toward `to`, in [0, 360). 0 is north, 90 is east.
pub fn bearing_deg(from: LatLng, to: LatLng) -> f64 {
    let d_lat = to.lat - from.lat;
    let d_lng = to.lng - from.lng;
    if d_lat.abs() < EPSILON && d_lng.abs() < EPSILON {
        return 0.0;
    }
    normalize_degrees(d_lng.atan2(d_lat).to_degrees())
}

fn whole_degrees(bearing: f64) -> u16 {
    (bearing.round() as u16) % 360
}

/// Camera for `location` given candidate places as `(position, walking meters)`.
///
/// Uses the [`NEAREST_PLACES`] candidates with the shortest known walking
/// distance (ties keep input order). When no candidate has a walking distance
/// the first ones in input order are used. Without candidates the camera sits
/// on the location facing north.
pub fn camera_for(location: LatLng, candidates: &[(LatLng, Option<u32>)]) -> StreetView {
    let mut walkable: Vec<(usize, LatLng, u32)> = candidates
        .iter()
        .enumerate()
        .filter_map(|(i, &(at, walking))| walking.map(|meters| (i, at, meters)))
        .collect();
    walkable.sort_by_key(|&(i, _, meters)| (meters, i));

    let nearest: Vec<LatLng> = if walkable.is_empty() {
        candidates.iter().take(NEAREST_PLACES).map(|&(at, _)| at).collect()
    } else {
        walkable.iter().take(NEAREST_PLACES).map(|&(_, at, _)| at).collect()
    };

    if nearest.is_empty() {
        return StreetView::at(location);
    }

    let n = nearest.len() as f64;
    let street = LatLng::new(
        nearest.iter().map(|p| p.lat).sum::<f64>() / n,
        nearest.iter().map(|p| p.lng).sum::<f64>() / n,
    );

    let d_lat = street.lat - location.lat;
    let d_lng = street.lng - location.lng;
    let len = (d_lat * d_lat + d_lng * d_lng).sqrt();
    let step = CAMERA_OFFSET_FRACTION * len / (len + EPSILON);

    StreetView {
        lat: location.lat + d_lat * step,
        lng: location.lng + d_lng * step,
        heading: whole_degrees(bearing_deg(street, location)),
    }
}
