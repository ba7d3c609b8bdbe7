//! Geocoding: coordinates to place names and back.
//!
//! Nominatim (OpenStreetMap) handles reverse lookups and free-text search;
//! Open-Meteo's geocoder handles autocomplete and city-name weather lookups.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;

use crate::http::{get_json, Endpoints};
use crate::suggest::CitySearch;
use crate::types::{
    parse_coordinate, CitySuggestion, LocationError, Position, ResolutionMethod, UNKNOWN,
};

/// Place names for a coordinate pair; missing parts are [`UNKNOWN`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Place {
    pub city: String,
    pub country: String,
    pub region: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NominatimReverse {
    address: Option<NominatimAddress>,
}

#[derive(Debug, Deserialize)]
struct NominatimMatch {
    lat: serde_json::Value,
    lon: serde_json::Value,
    name: Option<String>,
    display_name: Option<String>,
    address: Option<NominatimAddress>,
}

#[derive(Debug, Default, Deserialize)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    county: Option<String>,
    state: Option<String>,
    region: Option<String>,
    country: Option<String>,
}

impl NominatimAddress {
    fn locality(&self) -> Option<String> {
        self.city
            .clone()
            .or_else(|| self.town.clone())
            .or_else(|| self.village.clone())
            .or_else(|| self.county.clone())
    }

    fn region(&self) -> Option<String> {
        self.state.clone().or_else(|| self.region.clone())
    }
}

#[derive(Debug, Deserialize)]
struct OpenMeteoSearch {
    #[serde(default)]
    results: Vec<OpenMeteoPlace>,
}

/// A match from the Open-Meteo geocoder
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct OpenMeteoPlace {
    id: Option<i64>,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub country: Option<String>,
    admin1: Option<String>,
}

impl OpenMeteoPlace {
    fn into_suggestion(self) -> CitySuggestion {
        let display_name = [
            Some(self.name.as_str()),
            self.admin1.as_deref(),
            self.country.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
        let country = self.country.unwrap_or_else(|| UNKNOWN.to_string());
        let id = match self.id {
            Some(id) => id.to_string(),
            None => format!("{:.4},{:.4}", self.latitude, self.longitude),
        };

        CitySuggestion {
            id,
            name: self.name,
            display_name,
            latitude: self.latitude,
            longitude: self.longitude,
            region: self.admin1,
            country,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Geocoder {
    client: Client,
    nominatim_url: String,
    geocoding_url: String,
}

impl Geocoder {
    pub fn new(client: Client, endpoints: &Endpoints) -> Self {
        Self {
            client,
            nominatim_url: endpoints.nominatim_url.trim_end_matches('/').to_string(),
            geocoding_url: endpoints.geocoding_url.clone(),
        }
    }

    /// Reverse geocode coordinates to place names.
    /// Returns `None` on any failure; callers fall back to [`UNKNOWN`].
    #[instrument(skip(self), level = "info")]
    pub async fn reverse(&self, latitude: f64, longitude: f64) -> Option<Place> {
        let url = format!("{}/reverse", self.nominatim_url);
        let query = [
            ("format", "json".to_string()),
            ("lat", latitude.to_string()),
            ("lon", longitude.to_string()),
            ("zoom", "10".to_string()),
            ("addressdetails", "1".to_string()),
        ];

        let body: NominatimReverse = match get_json(&self.client, &url, &query).await {
            Ok(b) => b,
            Err(e) => {
                tracing::debug!("Reverse geocode failed: {}", e);
                return None;
            }
        };

        let Some(addr) = body.address else {
            tracing::debug!("Reverse geocode returned no address");
            return None;
        };

        let place = Place {
            city: addr.locality().unwrap_or_else(|| UNKNOWN.to_string()),
            country: addr.country.clone().unwrap_or_else(|| UNKNOWN.to_string()),
            region: addr.region(),
        };

        tracing::info!("Reverse geocoded to: {}, {}", place.city, place.country);
        Some(place)
    }

    /// Free-text forward geocoding; the top-ranked match becomes a
    /// [`ResolutionMethod::CitySearch`] position.
    #[instrument(skip(self), level = "info")]
    pub async fn search(&self, name: &str) -> Result<Position, LocationError> {
        let url = format!("{}/search", self.nominatim_url);
        let query = [
            ("format", "json".to_string()),
            ("q", name.to_string()),
            ("limit", "1".to_string()),
            ("addressdetails", "1".to_string()),
        ];

        let matches: Vec<NominatimMatch> = get_json(&self.client, &url, &query)
            .await
            .map_err(|e| e.into_geocoding())?;

        let Some(top) = matches.into_iter().next() else {
            return Err(LocationError::CityNotFound(name.to_string()));
        };

        let latitude = parse_coordinate(Some(&top.lat)).map_err(LocationError::GeocodingFailed)?;
        let longitude = parse_coordinate(Some(&top.lon)).map_err(LocationError::GeocodingFailed)?;

        let address = top.address.unwrap_or_default();
        let city = top
            .name
            .filter(|n| !n.trim().is_empty())
            .or_else(|| address.locality())
            .unwrap_or_else(|| name.to_string());
        // The last display_name segment is the country
        let country = address.country.clone().or_else(|| {
            top.display_name
                .as_deref()
                .and_then(|d| d.rsplit(',').next())
                .map(|c| c.trim().to_string())
        });

        Position::new(
            latitude,
            longitude,
            city,
            country.unwrap_or_default(),
            address.region(),
            ResolutionMethod::CitySearch,
        )
        .map_err(|e| LocationError::GeocodingFailed(e.to_string()))
    }

    /// Ranked Open-Meteo matches for `name`, at most `count` of them
    pub(crate) async fn lookup(
        &self,
        name: &str,
        count: usize,
    ) -> Result<Vec<OpenMeteoPlace>, LocationError> {
        let query = [
            ("name", name.to_string()),
            ("count", count.to_string()),
            ("language", "en".to_string()),
            ("format", "json".to_string()),
        ];

        let body: OpenMeteoSearch = get_json(&self.client, &self.geocoding_url, &query)
            .await
            .map_err(|e| e.into_geocoding())?;

        Ok(body.results)
    }
}

#[async_trait]
impl CitySearch for Geocoder {
    #[instrument(skip(self), level = "info")]
    async fn search_cities(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<CitySuggestion>, LocationError> {
        let places = self.lookup(query, limit).await?;
        Ok(places
            .into_iter()
            .take(limit)
            .map(OpenMeteoPlace::into_suggestion)
            .collect())
    }
}
