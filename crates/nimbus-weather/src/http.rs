//! Shared HTTP plumbing: endpoint set, client construction, JSON GETs.

use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::types::{LocationError, WeatherError};

const FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";
const GEOCODING_URL: &str = "https://geocoding-api.open-meteo.com/v1/search";
const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";
const IP_LOOKUP_URL: &str = "https://ipapi.co/json/";
const USER_AGENT: &str = concat!("Nimbus/", env!("CARGO_PKG_VERSION"));

/// Base URLs of every upstream service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub forecast_url: String,
    pub geocoding_url: String,
    pub nominatim_url: String,
    pub ip_lookup_url: String,
    pub user_agent: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            forecast_url: FORECAST_URL.to_string(),
            geocoding_url: GEOCODING_URL.to_string(),
            nominatim_url: NOMINATIM_URL.to_string(),
            ip_lookup_url: IP_LOOKUP_URL.to_string(),
            user_agent: USER_AGENT.to_string(),
        }
    }
}

impl Endpoints {
    /// Point every service at one server, using the real services' paths.
    /// Used with mock servers in tests.
    pub fn with_base_url(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            forecast_url: format!("{}/v1/forecast", base),
            geocoding_url: format!("{}/v1/search", base),
            nominatim_url: base.to_string(),
            ip_lookup_url: format!("{}/json/", base),
            user_agent: USER_AGENT.to_string(),
        }
    }

    /// Build the HTTP client shared by all services; it sends our User-Agent
    pub fn client(&self) -> Result<Client, WeatherError> {
        Client::builder()
            .user_agent(self.user_agent.clone())
            .build()
            .map_err(|e| HttpError::transport(&e).into())
    }
}

/// A failed GET: no response (status `None`), non-2xx, or unparseable body
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}{message}", .status.map(|s| format!("HTTP {}: ", s)).unwrap_or_default())]
pub(crate) struct HttpError {
    pub status: Option<u16>,
    pub message: String,
}

impl HttpError {
    fn transport(e: &reqwest::Error) -> Self {
        Self {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

impl From<HttpError> for WeatherError {
    fn from(e: HttpError) -> Self {
        WeatherError::Provider {
            status: e.status,
            message: e.message,
        }
    }
}

impl HttpError {
    pub fn into_geocoding(self) -> LocationError {
        LocationError::GeocodingFailed(self.to_string())
    }

    pub fn into_ip_lookup(self) -> LocationError {
        LocationError::IpLookupFailed(self.to_string())
    }
}

/// GET `url` with `query` and decode a JSON body
pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    query: &[(&str, String)],
) -> Result<T, HttpError> {
    tracing::debug!(url, ?query, "GET");

    let response = client
        .get(url)
        .query(query)
        .send()
        .await
        .map_err(|e| HttpError::transport(&e))?;

    let status = response.status();

    if status.is_success() {
        response.json().await.map_err(|e| HttpError {
            status: Some(status.as_u16()),
            message: format!("JSON parse error: {}", e),
        })
    } else {
        let text = response.text().await.unwrap_or_default();
        Err(HttpError {
            status: Some(status.as_u16()),
            message: if text.is_empty() {
                status.to_string()
            } else {
                text
            },
        })
    }
}
