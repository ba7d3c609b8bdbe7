use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory the config file lives in; derived at load time, never stored
    #[serde(skip)]
    pub config_dir: PathBuf,

    /// Weather display preferences
    #[serde(default)]
    pub weather: WeatherConfig,

    /// Upstream HTTP endpoints
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Device location settings
    #[serde(default)]
    pub location: LocationConfig,

    /// City autocomplete settings
    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Measurement system requested from the weather provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    #[default]
    Metric,
    Imperial,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// Unit system used for the first fetch of a session
    #[serde(default)]
    pub unit: UnitSystem,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Open-Meteo forecast endpoint (current + daily + hourly)
    #[serde(default = "default_forecast_url")]
    pub forecast_url: String,

    /// Open-Meteo geocoding endpoint (autocomplete, city-name lookups)
    #[serde(default = "default_geocoding_url")]
    pub geocoding_url: String,

    /// Nominatim base URL (reverse and forward geocoding)
    #[serde(default = "default_nominatim_url")]
    pub nominatim_url: String,

    /// IP geolocation endpoint
    #[serde(default = "default_ip_lookup_url")]
    pub ip_lookup_url: String,

    /// User-Agent sent with every request; Nominatim rejects anonymous clients
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_forecast_url() -> String {
    "https://api.open-meteo.com/v1/forecast".to_string()
}

fn default_geocoding_url() -> String {
    "https://geocoding-api.open-meteo.com/v1/search".to_string()
}

fn default_nominatim_url() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}

fn default_ip_lookup_url() -> String {
    "https://ipapi.co/json/".to_string()
}

fn default_user_agent() -> String {
    format!("Nimbus/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            forecast_url: default_forecast_url(),
            geocoding_url: default_geocoding_url(),
            nominatim_url: default_nominatim_url(),
            ip_lookup_url: default_ip_lookup_url(),
            user_agent: default_user_agent(),
        }
    }
}

/// Coordinates reported by the static location sensor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixedPosition {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    /// How long to wait for the device sensor (default: 10)
    #[serde(default = "default_sensor_timeout")]
    pub sensor_timeout_secs: u64,

    /// Oldest sensor reading that may be reused (default: 300)
    #[serde(default = "default_sensor_max_age")]
    pub sensor_max_age_secs: u64,

    /// When set, the sensor reports these coordinates instead of being absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_position: Option<FixedPosition>,
}

fn default_sensor_timeout() -> u64 {
    10
}

fn default_sensor_max_age() -> u64 {
    300
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            sensor_timeout_secs: default_sensor_timeout(),
            sensor_max_age_secs: default_sensor_max_age(),
            fixed_position: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Quiet window before an autocomplete request is sent (default: 400)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Shortest trimmed query that reaches the network (default: 2)
    #[serde(default = "default_min_query_chars")]
    pub min_query_chars: usize,

    /// Maximum number of suggestions (default: 5)
    #[serde(default = "default_suggestion_limit")]
    pub suggestion_limit: usize,
}

fn default_debounce_ms() -> u64 {
    400
}

fn default_min_query_chars() -> usize {
    2
}

fn default_suggestion_limit() -> usize {
    5
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            min_query_chars: default_min_query_chars(),
            suggestion_limit: default_suggestion_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_dir: default_config_dir(),
            weather: WeatherConfig::default(),
            providers: ProvidersConfig::default(),
            location: LocationConfig::default(),
            search: SearchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nimbus")
}

impl Config {
    /// Load configuration from the default location, creating it if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit file, writing defaults there if it is missing
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        if !config_path.exists() {
            let config = Self {
                config_dir,
                ..Self::default()
            };
            config.save_to(config_path)?;
            tracing::info!("Wrote default config to {}", config_path.display());
            return Ok(config);
        }

        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", config_path.display()))?;
        config.config_dir = config_dir;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        Self::load()?.into_validated()
    }

    /// Validate an already-loaded config, bailing on errors and logging warnings
    pub fn into_validated(self) -> Result<(Self, ValidationResult)> {
        let validation = self.validate();

        if !validation.is_valid() {
            anyhow::bail!(
                "Configuration validation failed: {}",
                validation.error_summary()
            );
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((self, validation))
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_url(&self.providers.forecast_url, "providers.forecast_url", &mut result);
        self.validate_url(&self.providers.geocoding_url, "providers.geocoding_url", &mut result);
        self.validate_url(&self.providers.nominatim_url, "providers.nominatim_url", &mut result);
        self.validate_url(&self.providers.ip_lookup_url, "providers.ip_lookup_url", &mut result);

        if self.providers.user_agent.trim().is_empty() {
            result.add_error("providers.user_agent", "User agent must not be empty");
        }

        if self.location.sensor_timeout_secs == 0 {
            result.add_error(
                "location.sensor_timeout_secs",
                "Sensor timeout must be greater than 0",
            );
        } else if self.location.sensor_timeout_secs > 120 {
            result.add_warning(
                "location.sensor_timeout_secs",
                "Sensor timeout is unusually long (>120s)",
            );
        }

        if let Some(fixed) = &self.location.fixed_position {
            if !fixed.latitude.is_finite() || !(-90.0..=90.0).contains(&fixed.latitude) {
                result.add_error(
                    "location.fixed_position.latitude",
                    format!("Latitude out of range: {}", fixed.latitude),
                );
            }
            if !fixed.longitude.is_finite() || !(-180.0..=180.0).contains(&fixed.longitude) {
                result.add_error(
                    "location.fixed_position.longitude",
                    format!("Longitude out of range: {}", fixed.longitude),
                );
            }
        }

        if self.search.debounce_ms == 0 {
            result.add_warning(
                "search.debounce_ms",
                "Autocomplete debounce disabled (0 ms)",
            );
        }

        if self.search.suggestion_limit == 0 {
            result.add_error(
                "search.suggestion_limit",
                "Suggestion limit must be greater than 0",
            );
        }

        if self.search.min_query_chars == 0 {
            result.add_warning(
                "search.min_query_chars",
                "Empty queries will be sent to the geocoder",
            );
        }

        result
    }

    /// Validate a URL field
    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("nimbus");

        Ok(config_dir.join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_default_config() {
        let config = Config::default();
        let result = config.validate();
        assert!(result.is_valid(), "Default config should be valid: {:?}", result.errors);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.weather.unit, UnitSystem::Metric);
        assert_eq!(config.location.sensor_timeout_secs, 10);
        assert_eq!(config.location.sensor_max_age_secs, 300);
        assert_eq!(config.search.debounce_ms, 400);
        assert_eq!(config.search.min_query_chars, 2);
        assert_eq!(config.search.suggestion_limit, 5);
        assert!(config.providers.user_agent.starts_with("Nimbus/"));
    }

    #[test]
    fn test_invalid_url() {
        let mut config = Config::default();
        config.providers.forecast_url = "not-a-url".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "providers.forecast_url"));
    }

    #[test]
    fn test_invalid_url_scheme() {
        let mut config = Config::default();
        config.providers.ip_lookup_url = "ftp://ipapi.co/json/".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.message.contains("http or https")));
    }

    #[test]
    fn test_zero_suggestion_limit_is_error() {
        let mut config = Config::default();
        config.search.suggestion_limit = 0;
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "search.suggestion_limit"));
    }

    #[test]
    fn test_zero_debounce_is_warning() {
        let mut config = Config::default();
        config.search.debounce_ms = 0;
        let result = config.validate();
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.field == "search.debounce_ms"));
    }

    #[test]
    fn test_fixed_position_out_of_range() {
        let mut config = Config::default();
        config.location.fixed_position = Some(FixedPosition {
            latitude: 91.0,
            longitude: 2.35,
        });
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result
            .errors
            .iter()
            .any(|e| e.field == "location.fixed_position.latitude"));
    }

    #[test]
    fn test_load_from_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nimbus").join("config.toml");

        let config = Config::load_from(&path).unwrap();

        assert!(path.exists());
        assert_eq!(config.config_dir, dir.path().join("nimbus"));
        assert_eq!(config.search.debounce_ms, 400);
    }

    #[test]
    fn test_load_from_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[weather]
unit = "imperial"

[location]
fixed_position = { latitude = 48.85, longitude = 2.35 }
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();

        assert_eq!(config.weather.unit, UnitSystem::Imperial);
        assert_eq!(
            config.location.fixed_position,
            Some(FixedPosition {
                latitude: 48.85,
                longitude: 2.35
            })
        );
        assert_eq!(config.location.sensor_timeout_secs, 10);
        assert_eq!(config.providers.forecast_url, default_forecast_url());
    }

    #[test]
    fn test_load_from_malformed_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "weather = [").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_into_validated_bails_on_errors() {
        let mut config = Config::default();
        config.search.suggestion_limit = 0;
        let err = config.into_validated().unwrap_err();
        assert!(err.to_string().contains("search.suggestion_limit"));
    }

    #[test]
    fn test_into_validated_passes_warnings_through() {
        let mut config = Config::default();
        config.search.debounce_ms = 0;
        let (config, validation) = config.into_validated().unwrap();
        assert_eq!(config.search.debounce_ms, 0);
        assert_eq!(validation.warnings.len(), 1);
    }

    #[test]
    fn test_validation_result_error_summary() {
        let mut result = ValidationResult::default();
        result.add_error("field1", "error1");
        result.add_error("field2", "error2");
        let summary = result.error_summary();
        assert!(summary.contains("field1"));
        assert!(summary.contains("field2"));
    }
}
