//! Weather and location services for Nimbus
//!
//! Resolves positions (device sensor, IP lookup, city name), fetches
//! current conditions and forecasts from Open-Meteo, and serves debounced
//! city autocomplete.

pub mod geocode;
pub mod http;
pub mod location;
pub mod provider;
pub mod suggest;
pub mod types;

pub use geocode::{Geocoder, Place};
pub use http::Endpoints;
pub use location::{
    LocationResolver, LocationSensor, NoSensor, SensorOptions, SensorReading, StaticSensor,
    Strategy,
};
pub use provider::WeatherClient;
pub use suggest::{CitySearch, CitySuggester, SuggesterOptions};
pub use types::*;
