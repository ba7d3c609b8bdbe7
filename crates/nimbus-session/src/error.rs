use nimbus_weather::{LocationError, WeatherError};

/// Why a session operation failed; stored in the snapshot
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Location(#[from] LocationError),
    #[error(transparent)]
    Weather(#[from] WeatherError),
}
