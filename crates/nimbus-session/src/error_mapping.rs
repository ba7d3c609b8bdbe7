//! Maps session errors to nimbus_core::AppError for user-facing messages.

use nimbus_core::{
    AppError, LocationError as AppLocationError, NetworkError, WeatherError as AppWeatherError,
};
use nimbus_weather::{LocationError, WeatherError};

use crate::error::SessionError;

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Location(e) => map_location(e),
            SessionError::Weather(WeatherError::Location(e)) => map_location(e),
            SessionError::Weather(WeatherError::Provider {
                status: Some(status),
                message,
            }) if status >= 500 => AppError::Network(NetworkError::ServerError { status, message }),
            SessionError::Weather(WeatherError::Provider { status, message }) => {
                AppError::Weather(AppWeatherError::ApiError(match status {
                    Some(status) => format!("{}: {}", status, message),
                    None => message,
                }))
            }
        }
    }
}

fn map_location(e: LocationError) -> AppError {
    let mapped = match e {
        LocationError::SensorPermissionDenied => AppLocationError::PermissionDenied,
        LocationError::SensorTimeout => AppLocationError::Timeout,
        LocationError::CityNotFound(name) => AppLocationError::CityNotFound(name),
        LocationError::InvalidInput(msg) => AppLocationError::InvalidInput(msg),
        LocationError::AllMethodsExhausted { ref causes }
            if causes.contains(&LocationError::SensorPermissionDenied) =>
        {
            AppLocationError::PermissionDenied
        }
        other @ (LocationError::SensorUnavailable
        | LocationError::IpLookupFailed(_)
        | LocationError::GeocodingFailed(_)
        | LocationError::AllMethodsExhausted { .. }) => {
            AppLocationError::Unavailable(other.to_string())
        }
    };
    AppError::Location(mapped)
}
