pub mod config;
pub mod error;

pub use config::{
    Config, FixedPosition, LocationConfig, ProvidersConfig, SearchConfig, UnitSystem,
    ValidationResult, WeatherConfig,
};
pub use error::{AppError, LocationError, NetworkError, WeatherError};

use anyhow::Result;

/// Initialize logging.
///
/// `RUST_LOG` wins over `default_level` when it is set.
pub fn init(default_level: &str) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {e}"))?;

    tracing::info!("Nimbus core initialized");
    Ok(())
}
