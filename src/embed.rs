//! Google Maps Embed URLs for a coordinate.

use crate::location::LatLng;
use crate::street_view::StreetView;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

pub const EMBED_BASE_URL: &str = "https://www.google.com/maps/embed/v1";

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum EmbedError {
    #[error("invalid latitude {0} (expected -90..=90)")]
    Latitude(f64),
    #[error("invalid longitude {0} (expected -180..=180)")]
    Longitude(f64),
    #[error("{name} {value} out of range {min}..={max}")]
    OutOfRange {
        name: &'static str,
        value: i32,
        min: i32,
        max: i32,
    },
    #[error("unknown map type '{0}' (roadmap, satellite, hybrid, terrain, streetview)")]
    UnknownMapType(String),
    #[error("cannot build embed URL: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapType {
    Roadmap,
    Satellite,
    Hybrid,
    Terrain,
    Streetview,
}

impl MapType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Roadmap => "roadmap",
            Self::Satellite => "satellite",
            Self::Hybrid => "hybrid",
            Self::Terrain => "terrain",
            Self::Streetview => "streetview",
        }
    }
}

impl fmt::Display for MapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MapType {
    type Err = EmbedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "roadmap" => Ok(Self::Roadmap),
            "satellite" => Ok(Self::Satellite),
            "hybrid" => Ok(Self::Hybrid),
            "terrain" => Ok(Self::Terrain),
            "streetview" | "street_view" => Ok(Self::Streetview),
            _ => Err(EmbedError::UnknownMapType(s.to_string())),
        }
    }
}

/// Zoom applies to the map types, the rest to street view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbedOptions {
    pub zoom: i32,
    pub heading: i32,
    pub pitch: i32,
    pub fov: i32,
}

impl Default for EmbedOptions {
    fn default() -> Self {
        Self {
            zoom: 15,
            heading: 0,
            pitch: 10,
            fov: 90,
        }
    }
}

impl EmbedOptions {
    /// Street-view options facing the camera's heading.
    pub fn facing(camera: &StreetView) -> Self {
        Self {
            heading: i32::from(camera.heading),
            ..Self::default()
        }
    }

    fn validate(&self, map_type: MapType) -> Result<(), EmbedError> {
        let checks = match map_type {
            MapType::Streetview => vec![
                ("heading", self.heading, 0, 360),
                ("pitch", self.pitch, -90, 90),
                ("fov", self.fov, 10, 100),
            ],
            _ => vec![("zoom", self.zoom, 0, 21)],
        };
        for (name, value, min, max) in checks {
            if !(min..=max).contains(&value) {
                return Err(EmbedError::OutOfRange { name, value, min, max });
            }
        }
        Ok(())
    }
}

/// Embed URL for `lat,lng`. Roadmap uses place mode so a marker is shown;
/// satellite, hybrid and terrain use view mode.
pub fn map_url(
    api_key: &str,
    lat: f64,
    lng: f64,
    map_type: MapType,
    options: &EmbedOptions,
) -> Result<String, EmbedError> {
    if !(-90.0..=90.0).contains(&lat) {
        return Err(EmbedError::Latitude(lat));
    }
    if !(-180.0..=180.0).contains(&lng) {
        return Err(EmbedError::Longitude(lng));
    }
    options.validate(map_type)?;

    let at = LatLng::new(lat, lng).to_string();
    let url = match map_type {
        MapType::Streetview => Url::parse_with_params(
            &format!("{}/streetview", EMBED_BASE_URL),
            &[
                ("key", api_key),
                ("location", at.as_str()),
                ("heading", options.heading.to_string().as_str()),
                ("pitch", options.pitch.to_string().as_str()),
                ("fov", options.fov.to_string().as_str()),
                ("source", "outdoor"),
            ],
        )?,
        MapType::Roadmap => Url::parse_with_params(
            &format!("{}/place", EMBED_BASE_URL),
            &[
                ("key", api_key),
                ("q", at.as_str()),
                ("zoom", options.zoom.to_string().as_str()),
                ("maptype", map_type.as_str()),
            ],
        )?,
        MapType::Satellite | MapType::Hybrid | MapType::Terrain => Url::parse_with_params(
            &format!("{}/view", EMBED_BASE_URL),
            &[
                ("key", api_key),
                ("center", at.as_str()),
                ("zoom", options.zoom.to_string().as_str()),
                ("maptype", map_type.as_str()),
            ],
        )?,
    };
    Ok(url.into())
}

/// Street-view embed for a computed camera.
pub fn street_view_url(api_key: &str, camera: &StreetView) -> Result<String, EmbedError> {
    map_url(
        api_key,
        camera.lat,
        camera.lng,
        MapType::Streetview,
        &EmbedOptions::facing(camera),
    )
}
