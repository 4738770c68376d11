//! Google Maps Platform: Geocoding, Places (searchNearby) and Distance Matrix.

use super::{DistanceProvider, GeocodeProvider, NearbySearch, PlacesProvider};
use crate::location::types::{
    GeocodeHit, LatLng, Place, ProviderError, ResolutionSource, RouteEstimate, TravelMode,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

pub const GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";
pub const DISTANCE_MATRIX_URL: &str = "https://maps.googleapis.com/maps/api/distancematrix/json";
pub const PLACES_NEARBY_URL: &str = "https://places.googleapis.com/v1/places:searchNearby";

const GEOCODING: &str = "Google Geocoding";
const PLACES: &str = "Google Places";
const DISTANCE_MATRIX: &str = "Google Distance Matrix";

const PLACES_FIELD_MASK: &str =
    "places.id,places.displayName,places.location,places.primaryTypeDisplayName";

/// First matching component wins.
const DISTRICT_COMPONENTS: &[&str] = &[
    "sublocality_level_1",
    "sublocality",
    "neighborhood",
    "administrative_area_level_3",
    "administrative_area_level_4",
];

/// Client for the metered Google APIs. One agent, one timeout for every call.
pub struct GoogleMapsClient {
    agent: ureq::Agent,
    api_key: String,
    language: String,
}

impl GoogleMapsClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration, language: impl Into<String>) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            api_key: api_key.into(),
            language: language.into(),
        }
    }

    fn get_json(
        &self,
        service: &'static str,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Value, ProviderError> {
        let mut request = self.agent.get(url);
        for (name, value) in query {
            request = request.query(name, value);
        }
        let response = request
            .query("language", &self.language)
            .query("key", &self.api_key)
            .call()
            .map_err(|e| ProviderError::from_ureq(service, e))?;

        response
            .into_json()
            .map_err(|e| ProviderError::invalid(service, e.to_string()))
    }
}

impl GeocodeProvider for GoogleMapsClient {
    fn source(&self) -> ResolutionSource {
        ResolutionSource::Google
    }

    fn geocode(&self, address: &str) -> Result<Option<GeocodeHit>, ProviderError> {
        let payload = self.get_json(GEOCODING, GEOCODE_URL, &[("address", address)])?;
        parse_geocode_response(payload)
    }

    fn reverse_geocode(&self, at: LatLng) -> Result<Option<GeocodeHit>, ProviderError> {
        let latlng = at.to_string();
        let payload = self.get_json(GEOCODING, GEOCODE_URL, &[("latlng", latlng.as_str())])?;
        parse_geocode_response(payload)
    }
}

impl PlacesProvider for GoogleMapsClient {
    fn search_nearby(&self, request: &NearbySearch) -> Result<Vec<Place>, ProviderError> {
        let mut body = json!({
            "includedTypes": request.included_types,
            "maxResultCount": request.max_results,
            "languageCode": self.language,
            "locationRestriction": {
                "circle": {
                    "center": {
                        "latitude": request.center.lat,
                        "longitude": request.center.lng,
                    },
                    "radius": f64::from(request.radius_m),
                }
            },
        });
        if !request.excluded_types.is_empty() {
            body["excludedTypes"] = json!(request.excluded_types);
        }
        if request.rank_by_distance {
            body["rankPreference"] = json!("DISTANCE");
        }

        let response = self
            .agent
            .post(PLACES_NEARBY_URL)
            .set("X-Goog-Api-Key", &self.api_key)
            .set("X-Goog-FieldMask", PLACES_FIELD_MASK)
            .send_json(body)
            .map_err(|e| ProviderError::from_ureq(PLACES, e))?;

        let payload: Value = response
            .into_json()
            .map_err(|e| ProviderError::invalid(PLACES, e.to_string()))?;
        parse_nearby_response(payload, request.max_results)
    }
}

impl DistanceProvider for GoogleMapsClient {
    fn distance_matrix(
        &self,
        origin: LatLng,
        destinations: &[LatLng],
        mode: TravelMode,
    ) -> Result<Vec<RouteEstimate>, ProviderError> {
        if destinations.is_empty() {
            return Ok(Vec::new());
        }
        let origins = origin.to_string();
        let destinations_param = destinations
            .iter()
            .map(LatLng::to_string)
            .collect::<Vec<_>>()
            .join("|");

        let payload = self.get_json(
            DISTANCE_MATRIX,
            DISTANCE_MATRIX_URL,
            &[
                ("origins", origins.as_str()),
                ("destinations", destinations_param.as_str()),
                ("mode", mode.as_str()),
                ("units", "metric"),
            ],
        )?;
        parse_distance_matrix_response(payload, destinations.len())
    }
}

// ─── Response parsing ───────────────────────────────────────────

#[derive(Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Deserialize)]
struct GeocodeResult {
    formatted_address: String,
    #[serde(default)]
    place_id: Option<String>,
    geometry: Geometry,
    #[serde(default)]
    address_components: Vec<AddressComponent>,
}

#[derive(Deserialize)]
struct Geometry {
    location: GoogleLatLng,
}

#[derive(Deserialize)]
struct GoogleLatLng {
    lat: f64,
    lng: f64,
}

#[derive(Deserialize)]
struct AddressComponent {
    long_name: String,
    #[serde(default)]
    types: Vec<String>,
}

fn component<'a>(components: &'a [AddressComponent], kind: &str) -> Option<&'a str> {
    components
        .iter()
        .find(|c| c.types.iter().any(|t| t == kind) && !c.long_name.is_empty())
        .map(|c| c.long_name.as_str())
}

fn status_error(service: &'static str, status: String, message: Option<String>) -> ProviderError {
    let status = match message {
        Some(msg) if !msg.is_empty() => format!("{} ({})", status, msg),
        _ => status,
    };
    ProviderError::Status { service, status }
}

/// `OK` → first result, `ZERO_RESULTS` → `None`, anything else is a provider failure.
pub fn parse_geocode_response(payload: Value) -> Result<Option<GeocodeHit>, ProviderError> {
    let response: GeocodeResponse = serde_json::from_value(payload.clone())
        .map_err(|e| ProviderError::invalid(GEOCODING, e.to_string()))?;

    if response.status == "ZERO_RESULTS" {
        return Ok(None);
    }
    if response.status != "OK" {
        return Err(status_error(GEOCODING, response.status, response.error_message));
    }

    let Some(result) = response.results.into_iter().next() else {
        return Ok(None);
    };
    let components = &result.address_components;
    let district = DISTRICT_COMPONENTS
        .iter()
        .find_map(|kind| component(components, kind))
        .map(str::to_string);

    Ok(Some(GeocodeHit {
        location: LatLng::new(result.geometry.location.lat, result.geometry.location.lng),
        formatted_address: result.formatted_address.clone(),
        place_id: result.place_id.clone(),
        district,
        city: component(components, "locality").map(str::to_string),
        state: component(components, "administrative_area_level_1").map(str::to_string),
        postcode: component(components, "postal_code").map(str::to_string),
        country: component(components, "country").map(str::to_string),
        raw: payload,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NearbyResponse {
    #[serde(default)]
    places: Vec<NearbyPlace>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NearbyPlace {
    id: String,
    #[serde(default)]
    display_name: Option<LocalizedText>,
    location: NearbyLocation,
    #[serde(default)]
    primary_type_display_name: Option<LocalizedText>,
}

#[derive(Deserialize)]
struct LocalizedText {
    text: String,
}

#[derive(Deserialize)]
struct NearbyLocation {
    latitude: f64,
    longitude: f64,
}

/// Places come back already ranked; keep the provider order and cut at `max_results`.
pub fn parse_nearby_response(payload: Value, max_results: usize) -> Result<Vec<Place>, ProviderError> {
    let response: NearbyResponse = serde_json::from_value(payload)
        .map_err(|e| ProviderError::invalid(PLACES, e.to_string()))?;

    Ok(response
        .places
        .into_iter()
        .take(max_results)
        .map(|p| Place {
            name: p.display_name.map(|n| n.text).unwrap_or_else(|| p.id.clone()),
            lat: p.location.latitude,
            lng: p.location.longitude,
            place_id: p.id,
            type_label: p.primary_type_display_name.map(|t| t.text),
        })
        .collect())
}

#[derive(Deserialize)]
struct MatrixResponse {
    status: String,
    #[serde(default)]
    rows: Vec<MatrixRow>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Deserialize)]
struct MatrixRow {
    #[serde(default)]
    elements: Vec<MatrixElement>,
}

#[derive(Deserialize)]
struct MatrixElement {
    status: String,
    #[serde(default)]
    distance: Option<MatrixValue>,
    #[serde(default)]
    duration: Option<MatrixValue>,
}

#[derive(Deserialize)]
struct MatrixValue {
    value: u32,
}

/// One row (the single origin), one element per destination. Elements without a
/// route become `NO_ROUTE`; a short row is padded so the result stays positional.
pub fn parse_distance_matrix_response(
    payload: Value,
    destinations: usize,
) -> Result<Vec<RouteEstimate>, ProviderError> {
    let response: MatrixResponse = serde_json::from_value(payload)
        .map_err(|e| ProviderError::invalid(DISTANCE_MATRIX, e.to_string()))?;

    if response.status != "OK" {
        return Err(status_error(DISTANCE_MATRIX, response.status, response.error_message));
    }
    let row = response
        .rows
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::invalid(DISTANCE_MATRIX, "no rows for origin"))?;

    let mut estimates: Vec<RouteEstimate> = row
        .elements
        .into_iter()
        .take(destinations)
        .map(|element| match (element.status.as_str(), element.distance, element.duration) {
            ("OK", Some(distance), Some(duration)) => RouteEstimate::new(distance.value, duration.value),
            _ => RouteEstimate::NO_ROUTE,
        })
        .collect();
    estimates.resize(destinations, RouteEstimate::NO_ROUTE);
    Ok(estimates)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn berlin_geocode_payload() -> Value {
        json!({
            "status": "OK",
            "results": [{
                "formatted_address": "Beispielstraße 1, 10115 Berlin, Deutschland",
                "place_id": "ChIJbeispiel",
                "geometry": { "location": { "lat": 52.5323, "lng": 13.3846 } },
                "address_components": [
                    { "long_name": "1", "types": ["street_number"] },
                    { "long_name": "Mitte", "types": ["sublocality_level_1", "sublocality", "political"] },
                    { "long_name": "Berlin", "types": ["locality", "political"] },
                    { "long_name": "Berlin", "types": ["administrative_area_level_1", "political"] },
                    { "long_name": "Deutschland", "types": ["country", "political"] },
                    { "long_name": "10115", "types": ["postal_code"] }
                ]
            }]
        })
    }

    #[test]
    fn test_parse_geocode_ok() {
        let hit = parse_geocode_response(berlin_geocode_payload()).unwrap().unwrap();
        assert_eq!(hit.location, LatLng::new(52.5323, 13.3846));
        assert_eq!(hit.place_id.as_deref(), Some("ChIJbeispiel"));
        assert_eq!(hit.district.as_deref(), Some("Mitte"));
        assert_eq!(hit.city.as_deref(), Some("Berlin"));
        assert_eq!(hit.postcode.as_deref(), Some("10115"));
        assert_eq!(hit.country.as_deref(), Some("Deutschland"));
        assert_eq!(hit.raw["status"], "OK");
    }

    #[test]
    fn test_parse_geocode_district_fallback_order() {
        let payload = json!({
            "status": "OK",
            "results": [{
                "formatted_address": "Somewhere",
                "geometry": { "location": { "lat": 1.0, "lng": 2.0 } },
                "address_components": [
                    { "long_name": "Kreis", "types": ["administrative_area_level_3"] },
                    { "long_name": "Kiez", "types": ["neighborhood"] }
                ]
            }]
        });
        let hit = parse_geocode_response(payload).unwrap().unwrap();
        assert_eq!(hit.district.as_deref(), Some("Kiez"));
        assert!(hit.place_id.is_none());
    }

    #[test]
    fn test_parse_geocode_zero_results_is_absent() {
        let payload = json!({ "status": "ZERO_RESULTS", "results": [] });
        assert!(parse_geocode_response(payload).unwrap().is_none());
    }

    #[test]
    fn test_parse_geocode_denied_is_failure() {
        let payload = json!({ "status": "REQUEST_DENIED", "error_message": "bad key" });
        let err = parse_geocode_response(payload).unwrap_err();
        assert!(matches!(err, ProviderError::Status { .. }));
        assert!(err.to_string().contains("bad key"));
    }

    #[test]
    fn test_parse_geocode_malformed() {
        let err = parse_geocode_response(json!({ "results": "nope" })).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse { .. }));
    }

    #[test]
    fn test_parse_nearby_caps_results() {
        let places: Vec<Value> = (0..6)
            .map(|i| {
                json!({
                    "id": format!("p{}", i),
                    "displayName": { "text": format!("Markt {}", i) },
                    "location": { "latitude": 52.53 + f64::from(i) * 0.001, "longitude": 13.38 },
                    "primaryTypeDisplayName": { "text": "Supermarkt" }
                })
            })
            .collect();
        let parsed = parse_nearby_response(json!({ "places": places }), 4).unwrap();
        assert_eq!(parsed.len(), 4);
        assert_eq!(parsed[0].place_id, "p0");
        assert_eq!(parsed[3].name, "Markt 3");
        assert_eq!(parsed[0].type_label.as_deref(), Some("Supermarkt"));
    }

    #[test]
    fn test_parse_nearby_empty_object() {
        assert!(parse_nearby_response(json!({}), 4).unwrap().is_empty());
    }

    #[test]
    fn test_parse_distance_matrix_positional() {
        let payload = json!({
            "status": "OK",
            "rows": [{
                "elements": [
                    { "status": "OK", "distance": { "value": 850 }, "duration": { "value": 620 } },
                    { "status": "ZERO_RESULTS" },
                    { "status": "OK", "distance": { "value": 1200 }, "duration": { "value": 900 } }
                ]
            }]
        });
        let legs = parse_distance_matrix_response(payload, 4).unwrap();
        assert_eq!(legs.len(), 4);
        assert_eq!(legs[0], RouteEstimate::new(850, 620));
        assert_eq!(legs[1], RouteEstimate::NO_ROUTE);
        assert_eq!(legs[2], RouteEstimate::new(1200, 900));
        assert_eq!(legs[3], RouteEstimate::NO_ROUTE);
    }

    #[test]
    fn test_parse_distance_matrix_bad_status() {
        let payload = json!({ "status": "OVER_QUERY_LIMIT", "rows": [] });
        assert!(matches!(
            parse_distance_matrix_response(payload, 2),
            Err(ProviderError::Status { .. })
        ));
    }
}
