//! Application error hierarchy with user-facing messages.

use thiserror::Error;

/// Top-level application error type.
///
/// Errors from the weather and session crates are mapped into this type at
/// the edge of the application. Use `user_message()` for display.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Location error: {0}")]
    Location(#[from] LocationError),

    #[error("Weather service error: {0}")]
    Weather(#[from] WeatherError),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Returns a user-friendly message suitable for display.
    ///
    /// These messages are designed to be actionable and non-technical.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Network(e) => e.user_message(),
            AppError::Location(e) => e.user_message(),
            AppError::Weather(e) => e.user_message(),
            AppError::Other(_) => "An unexpected error occurred. Please try again.",
        }
    }

    /// Whether the failed action can simply be retried by the user.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Network(_) | AppError::Weather(_) => true,
            AppError::Location(e) => !matches!(
                e,
                LocationError::InvalidInput(_) | LocationError::CityNotFound(_)
            ),
            AppError::Other(_) => false,
        }
    }
}

/// Network-related errors (HTTP, connectivity).
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },
}

impl NetworkError {
    pub fn user_message(&self) -> &'static str {
        match self {
            NetworkError::ServerError { status, .. } if *status >= 500 => {
                "The server is experiencing issues. Please try again later."
            }
            NetworkError::ServerError { .. } => "The request failed. Please try again.",
        }
    }
}

/// Location resolution errors.
#[derive(Debug, Error)]
pub enum LocationError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Location unavailable: {0}")]
    Unavailable(String),

    #[error("Location request timed out")]
    Timeout,

    #[error("City not found: {0}")]
    CityNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl LocationError {
    pub fn user_message(&self) -> &'static str {
        match self {
            LocationError::PermissionDenied => {
                "Location access was denied. Search for a city instead."
            }
            LocationError::Unavailable(_) => {
                "Could not determine your location. Search for a city instead."
            }
            LocationError::Timeout => "Finding your location took too long. Please try again.",
            LocationError::CityNotFound(_) => "City not found. Check the spelling and try again.",
            LocationError::InvalidInput(_) => "Please enter a city name.",
        }
    }
}

/// Weather service errors.
#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("Weather API error: {0}")]
    ApiError(String),
}

impl WeatherError {
    pub fn user_message(&self) -> &'static str {
        match self {
            WeatherError::ApiError(_) => "Weather service error. Please try again.",
        }
    }
}
