//! Mikrolage: micro-location profiles for street addresses.
//!
//! An address is geocoded, searched for nearby shopping, transit and leisure
//! places, and measured against each of them by car, on foot and by public
//! transport. Every remote answer is memoized in a local SQLite cache with a
//! fixed validity window. A street-view camera facing the building is derived
//! from the nearest places.

pub mod config;
pub mod embed;
pub mod location;
pub mod logging;
pub mod micro_location;
pub mod street_view;

pub use config::Config;
pub use micro_location::{EnhancedPlace, MicroLocationBundle, MicroLocationError, MicroLocationService};
pub use street_view::StreetView;
