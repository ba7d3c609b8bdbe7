//! Builds a session from the application config.

use std::sync::Arc;
use std::time::Duration;

use nimbus_core::{Config, UnitSystem};
use nimbus_weather::{
    CitySuggester, Endpoints, Geocoder, LocationResolver, LocationSensor, NoSensor,
    SensorOptions, StaticSensor, SuggesterOptions, Unit, WeatherClient,
};

use crate::controller::SessionController;
use crate::error::SessionError;

pub fn unit_from_config(unit: UnitSystem) -> Unit {
    match unit {
        UnitSystem::Metric => Unit::Metric,
        UnitSystem::Imperial => Unit::Imperial,
    }
}

pub fn endpoints_from_config(config: &Config) -> Endpoints {
    let providers = &config.providers;
    Endpoints {
        forecast_url: providers.forecast_url.clone(),
        geocoding_url: providers.geocoding_url.clone(),
        nominatim_url: providers.nominatim_url.clone(),
        ip_lookup_url: providers.ip_lookup_url.clone(),
        user_agent: providers.user_agent.clone(),
    }
}

/// A configured fixed position acts as the device sensor
pub fn sensor_from_config(config: &Config) -> Arc<dyn LocationSensor> {
    match config.location.fixed_position {
        Some(fixed) => Arc::new(StaticSensor::new(fixed.latitude, fixed.longitude)),
        None => Arc::new(NoSensor),
    }
}

impl SessionController {
    /// Wire resolver, weather client and suggester from `config`
    pub fn from_config(config: &Config) -> Result<Self, SessionError> {
        let endpoints = endpoints_from_config(config);
        let client = endpoints.client()?;

        let sensor_options = SensorOptions {
            timeout: Duration::from_secs(config.location.sensor_timeout_secs),
            maximum_age: Duration::from_secs(config.location.sensor_max_age_secs),
            ..SensorOptions::default()
        };
        let resolver = LocationResolver::new(client.clone(), &endpoints, sensor_from_config(config))
            .with_sensor_options(sensor_options);

        let weather = WeatherClient::new(client.clone(), &endpoints);

        let suggester_options = SuggesterOptions {
            debounce: Duration::from_millis(config.search.debounce_ms),
            min_query_chars: config.search.min_query_chars,
            limit: config.search.suggestion_limit,
        };
        let suggester = CitySuggester::new(
            Arc::new(Geocoder::new(client, &endpoints)),
            suggester_options,
        );

        tracing::debug!("Session wired to {:?}", endpoints);
        Ok(Self::new(
            resolver,
            weather,
            suggester,
            unit_from_config(config.weather.unit),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_core::FixedPosition;
    use nimbus_weather::SensorReading;

    #[test]
    fn test_endpoints_follow_config() {
        let mut config = Config::default();
        config.providers.forecast_url = "http://localhost:8080/v1/forecast".into();
        config.providers.user_agent = "nimbus-test".into();

        let endpoints = endpoints_from_config(&config);

        assert_eq!(endpoints.forecast_url, "http://localhost:8080/v1/forecast");
        assert_eq!(endpoints.user_agent, "nimbus-test");
        assert_eq!(endpoints.nominatim_url, config.providers.nominatim_url);
    }

    #[test]
    fn test_unit_mapping() {
        assert_eq!(unit_from_config(UnitSystem::Metric), Unit::Metric);
        assert_eq!(unit_from_config(UnitSystem::Imperial), Unit::Imperial);
    }

    #[tokio::test]
    async fn test_fixed_position_becomes_sensor() {
        let mut config = Config::default();
        config.location.fixed_position = Some(FixedPosition {
            latitude: 59.33,
            longitude: 18.07,
        });

        let reading: SensorReading = sensor_from_config(&config)
            .read(&SensorOptions::default())
            .await
            .unwrap();

        assert_eq!((reading.latitude, reading.longitude), (59.33, 18.07));
    }

    #[tokio::test]
    async fn test_no_fixed_position_means_no_sensor() {
        let config = Config::default();
        let result = sensor_from_config(&config).read(&SensorOptions::default()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_from_config_starts_idle_with_configured_unit() {
        let mut config = Config::default();
        config.weather.unit = UnitSystem::Imperial;

        let controller = SessionController::from_config(&config).unwrap();
        let snapshot = controller.snapshot();

        assert_eq!(snapshot.unit, Unit::Imperial);
        assert_eq!(snapshot.generation, 0);
    }
}
