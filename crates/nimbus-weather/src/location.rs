//! Position resolution: device sensor, IP lookup, or city name.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;

use crate::geocode::Geocoder;
use crate::http::{get_json, Endpoints};
use crate::types::{
    parse_coordinate, LocationError, Position, ResolutionMethod, SensorError, UNKNOWN,
};

/// Options handed to the device sensor on each read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorOptions {
    /// How long a read may take before it fails with `Timeout`
    pub timeout: Duration,
    /// Oldest cached reading the sensor may return
    pub maximum_age: Duration,
    pub high_accuracy: bool,
}

impl Default for SensorOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            maximum_age: Duration::from_secs(300),
            high_accuracy: false,
        }
    }
}

/// A raw sensor fix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub latitude: f64,
    pub longitude: f64,
    pub taken_at: DateTime<Utc>,
}

/// Platform location capability
#[async_trait]
pub trait LocationSensor: Send + Sync {
    async fn read(&self, options: &SensorOptions) -> Result<SensorReading, SensorError>;
}

/// A platform without a location sensor
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSensor;

#[async_trait]
impl LocationSensor for NoSensor {
    async fn read(&self, _options: &SensorOptions) -> Result<SensorReading, SensorError> {
        Err(SensorError::Unsupported)
    }
}

/// A sensor that always reports the same coordinates, read fresh each time
#[derive(Debug, Clone, Copy)]
pub struct StaticSensor {
    latitude: f64,
    longitude: f64,
}

impl StaticSensor {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

#[async_trait]
impl LocationSensor for StaticSensor {
    async fn read(&self, _options: &SensorOptions) -> Result<SensorReading, SensorError> {
        Ok(SensorReading {
            latitude: self.latitude,
            longitude: self.longitude,
            taken_at: Utc::now(),
        })
    }
}

/// One step of the automatic resolution chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Sensor,
    IpLookup,
}

/// Default chain: sensor first, IP lookup as fallback
pub const DEFAULT_STRATEGIES: [Strategy; 2] = [Strategy::Sensor, Strategy::IpLookup];

#[derive(Debug, Deserialize)]
struct IpLookupResponse {
    #[serde(default)]
    latitude: serde_json::Value,
    #[serde(default)]
    longitude: serde_json::Value,
    city: Option<String>,
    country_name: Option<String>,
    region: Option<String>,
    // ipapi.co answers 200 with `error: true` when rate limited
    #[serde(default)]
    error: bool,
    reason: Option<String>,
}

pub struct LocationResolver {
    client: Client,
    ip_lookup_url: String,
    geocoder: Geocoder,
    sensor: Arc<dyn LocationSensor>,
    sensor_options: SensorOptions,
    strategies: Vec<Strategy>,
}

impl LocationResolver {
    pub fn new(client: Client, endpoints: &Endpoints, sensor: Arc<dyn LocationSensor>) -> Self {
        Self {
            geocoder: Geocoder::new(client.clone(), endpoints),
            client,
            ip_lookup_url: endpoints.ip_lookup_url.clone(),
            sensor,
            sensor_options: SensorOptions::default(),
            strategies: DEFAULT_STRATEGIES.to_vec(),
        }
    }

    pub fn with_sensor_options(mut self, options: SensorOptions) -> Self {
        self.sensor_options = options;
        self
    }

    pub fn with_strategies(mut self, strategies: Vec<Strategy>) -> Self {
        self.strategies = strategies;
        self
    }

    /// Walk the strategy chain and return the first position found.
    ///
    /// Fails with `AllMethodsExhausted` carrying each strategy's error in order.
    #[instrument(skip(self), level = "info")]
    pub async fn resolve(&self) -> Result<Position, LocationError> {
        let mut causes = Vec::with_capacity(self.strategies.len());

        for strategy in &self.strategies {
            let attempt = match strategy {
                Strategy::Sensor => self.from_sensor().await,
                Strategy::IpLookup => self.from_ip_lookup().await,
            };

            match attempt {
                Ok(position) => {
                    tracing::info!(
                        "Resolved position via {:?}: {}, {} ({}, {})",
                        strategy,
                        position.latitude(),
                        position.longitude(),
                        position.city(),
                        position.country()
                    );
                    return Ok(position);
                }
                Err(e) => {
                    tracing::warn!("Location strategy {:?} failed: {}", strategy, e);
                    causes.push(e);
                }
            }
        }

        Err(LocationError::AllMethodsExhausted { causes })
    }

    /// Resolve free text to the top-ranked geocoding match
    #[instrument(skip(self), level = "info")]
    pub async fn resolve_by_city_name(&self, name: &str) -> Result<Position, LocationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LocationError::InvalidInput("city name is empty".to_string()));
        }

        let position = self.geocoder.search(name).await?;
        tracing::info!(
            "Resolved '{}' to {}, {}",
            name,
            position.latitude(),
            position.longitude()
        );
        Ok(position)
    }

    async fn from_sensor(&self) -> Result<Position, LocationError> {
        let options = &self.sensor_options;
        let reading = tokio::time::timeout(options.timeout, self.sensor.read(options))
            .await
            .map_err(|_| SensorError::Timeout)??;

        let age = Utc::now().signed_duration_since(reading.taken_at);
        if age.to_std().map_or(false, |age| age > options.maximum_age) {
            tracing::debug!("Discarding sensor reading aged {}s", age.num_seconds());
            return Err(SensorError::PositionUnavailable.into());
        }

        // Reject bad sensor output before spending a reverse lookup on it
        crate::types::check_coordinates(reading.latitude, reading.longitude)
            .map_err(|_| LocationError::from(SensorError::PositionUnavailable))?;

        let place = self
            .geocoder
            .reverse(reading.latitude, reading.longitude)
            .await;
        let (city, country, region) = match place {
            Some(p) => (p.city, p.country, p.region),
            None => (UNKNOWN.to_string(), UNKNOWN.to_string(), None),
        };

        Position::new(
            reading.latitude,
            reading.longitude,
            city,
            country,
            region,
            ResolutionMethod::Sensor,
        )
    }

    async fn from_ip_lookup(&self) -> Result<Position, LocationError> {
        let body: IpLookupResponse = get_json(&self.client, &self.ip_lookup_url, &[])
            .await
            .map_err(|e| e.into_ip_lookup())?;

        if body.error {
            return Err(LocationError::IpLookupFailed(
                body.reason.unwrap_or_else(|| "lookup refused".to_string()),
            ));
        }

        let latitude =
            parse_coordinate(Some(&body.latitude)).map_err(LocationError::IpLookupFailed)?;
        let longitude =
            parse_coordinate(Some(&body.longitude)).map_err(LocationError::IpLookupFailed)?;

        Position::new(
            latitude,
            longitude,
            body.city.unwrap_or_default(),
            body.country_name.unwrap_or_default(),
            body.region,
            ResolutionMethod::IpLookup,
        )
        .map_err(|e| LocationError::IpLookupFailed(e.to_string()))
    }
}
