use serde::{Deserialize, Serialize};

/// Placeholder for place names the providers could not supply
pub const UNKNOWN: &str = "Unknown";

/// Measurement system sent to the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    /// °C and m/s
    #[default]
    Metric,
    /// °F and mph
    Imperial,
}

impl Unit {
    /// Value of Open-Meteo's `temperature_unit` parameter
    pub fn temperature_param(&self) -> &'static str {
        match self {
            Self::Metric => "celsius",
            Self::Imperial => "fahrenheit",
        }
    }

    /// Value of Open-Meteo's `wind_speed_unit` parameter
    pub fn wind_speed_param(&self) -> &'static str {
        match self {
            Self::Metric => "ms",
            Self::Imperial => "mph",
        }
    }

    pub fn temperature_symbol(&self) -> &'static str {
        match self {
            Self::Metric => "°C",
            Self::Imperial => "°F",
        }
    }

    pub fn wind_speed_symbol(&self) -> &'static str {
        match self {
            Self::Metric => "m/s",
            Self::Imperial => "mph",
        }
    }
}

/// Coarse condition buckets derived from WMO weather codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConditionClass {
    #[default]
    Clear,
    Clouds,
    Rain,
    Snow,
    Thunderstorm,
    Fog,
}

impl ConditionClass {
    /// Classify a WMO weather code into a condition and its description.
    /// See: https://open-meteo.com/en/docs#weathervariables
    pub fn classify(code: i64) -> (Self, &'static str) {
        match code {
            0 => (Self::Clear, "clear sky"),
            1..=3 => (Self::Clouds, "partly cloudy"),
            4..=48 => (Self::Fog, "foggy"),
            49..=67 => (Self::Rain, "rainy"),
            68..=77 => (Self::Snow, "snowy"),
            78..=82 => (Self::Rain, "rain showers"),
            83..=86 => (Self::Snow, "snow showers"),
            87..=99 => (Self::Thunderstorm, "thunderstorm"),
            _ => (Self::Clear, "clear"),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Clear => "Clear",
            Self::Clouds => "Clouds",
            Self::Rain => "Rain",
            Self::Snow => "Snow",
            Self::Thunderstorm => "Thunderstorm",
            Self::Fog => "Fog",
        }
    }
}

/// How a [`Position`] was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionMethod {
    Sensor,
    IpLookup,
    CitySearch,
}

/// A resolved geographic position.
///
/// Fields are private so the coordinate range check in [`Position::new`]
/// cannot be bypassed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    latitude: f64,
    longitude: f64,
    city: String,
    country: String,
    region: Option<String>,
    resolution_method: ResolutionMethod,
}

impl Position {
    /// Build a position, rejecting non-finite or out-of-range coordinates.
    /// Blank city/country names become [`UNKNOWN`].
    pub fn new(
        latitude: f64,
        longitude: f64,
        city: impl Into<String>,
        country: impl Into<String>,
        region: Option<String>,
        resolution_method: ResolutionMethod,
    ) -> Result<Self, LocationError> {
        check_coordinates(latitude, longitude).map_err(LocationError::InvalidInput)?;

        Ok(Self {
            latitude,
            longitude,
            city: or_unknown(city.into()),
            country: or_unknown(country.into()),
            region: region.filter(|r| !r.trim().is_empty()),
            resolution_method,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn city(&self) -> &str {
        &self.city
    }

    pub fn country(&self) -> &str {
        &self.country
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    pub fn resolution_method(&self) -> ResolutionMethod {
        self.resolution_method
    }
}

fn or_unknown(value: String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        UNKNOWN.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Check latitude ∈ [-90, 90] and longitude ∈ [-180, 180], both finite
pub(crate) fn check_coordinates(latitude: f64, longitude: f64) -> Result<(), String> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(format!("latitude out of range: {}", latitude));
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(format!("longitude out of range: {}", longitude));
    }
    Ok(())
}

/// Read a coordinate that a provider may send as a JSON number or a numeric string
pub(crate) fn parse_coordinate(value: Option<&serde_json::Value>) -> Result<f64, String> {
    let parsed = match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(format!("invalid coordinate: {}", display_value(value))),
    }
}

fn display_value(value: Option<&serde_json::Value>) -> String {
    value.map_or_else(|| "missing".to_string(), |v| v.to_string())
}

/// Current conditions at a coordinate pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentConditions {
    pub temperature: f64,
    pub feels_like: f64,
    /// Synthesized as `temperature - 2`; the current-conditions feed has no range
    pub temp_min: f64,
    /// Synthesized as `temperature + 2`
    pub temp_max: f64,
    pub humidity: f64,
    pub pressure_hpa: f64,
    pub description: String,
    pub condition: ConditionClass,
    pub wind_speed: f64,
    pub wind_direction_deg: f64,
    pub cloud_cover_percent: f64,
    pub visibility_meters: f64,
    pub sunrise: Option<i64>,
    pub sunset: Option<i64>,
    pub timezone_offset_seconds: i64,
    pub city_name: String,
    pub country: String,
    pub observed_at: i64,
    pub latitude: f64,
    pub longitude: f64,
}

/// One day of the forecast
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastDay {
    /// UTC midnight of the forecast date, epoch seconds
    pub date: i64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub temp_avg: f64,
    pub condition: ConditionClass,
    pub precipitation_mm: f64,
    pub rain_mm: f64,
    pub wind_speed_max: f64,
}

/// One hour of the short-range outlook
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlySample {
    pub time: i64,
    pub temp: f64,
    pub condition: ConditionClass,
    pub description: String,
}

/// Number of days a forecast always carries
pub const FORECAST_DAYS: usize = 5;

/// Maximum number of hourly samples kept
pub const HOURLY_SAMPLES: usize = 8;

/// Exactly [`FORECAST_DAYS`] days in ascending order plus up to
/// [`HOURLY_SAMPLES`] hourly samples
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastSet {
    days: Vec<ForecastDay>,
    hourly: Vec<HourlySample>,
}

impl ForecastSet {
    /// Keep the first five days and first eight hours, in order.
    /// Fewer than five days is a malformed payload.
    pub fn from_entries(
        mut days: Vec<ForecastDay>,
        mut hourly: Vec<HourlySample>,
    ) -> Result<Self, WeatherError> {
        if days.len() < FORECAST_DAYS {
            return Err(WeatherError::malformed(format!(
                "expected at least {} daily entries, got {}",
                FORECAST_DAYS,
                days.len()
            )));
        }
        days.truncate(FORECAST_DAYS);
        hourly.truncate(HOURLY_SAMPLES);

        Ok(Self { days, hourly })
    }

    pub fn days(&self) -> &[ForecastDay] {
        &self.days
    }

    pub fn hourly(&self) -> &[HourlySample] {
        &self.hourly
    }
}

/// Result of one fetch cycle: current conditions and forecast for the same coordinates
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherReport {
    pub current: CurrentConditions,
    pub forecast: ForecastSet,
}

/// An autocomplete candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitySuggestion {
    /// Provider id, stable for a given place
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub region: Option<String>,
    pub country: String,
}

/// Device sensor failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SensorError {
    #[error("Location permission denied")]
    PermissionDenied,
    #[error("Position unavailable")]
    PositionUnavailable,
    #[error("Location request timed out")]
    Timeout,
    #[error("Location sensor not supported")]
    Unsupported,
}

/// Location resolution errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LocationError {
    #[error("Location sensor unavailable")]
    SensorUnavailable,
    #[error("Location permission denied")]
    SensorPermissionDenied,
    #[error("Location sensor timed out")]
    SensorTimeout,
    #[error("IP lookup failed: {0}")]
    IpLookupFailed(String),
    #[error("Geocoding failed: {0}")]
    GeocodingFailed(String),
    #[error("City not found: {0}")]
    CityNotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("All location methods failed: {}", join_causes(.causes))]
    AllMethodsExhausted { causes: Vec<LocationError> },
}

fn join_causes(causes: &[LocationError]) -> String {
    if causes.is_empty() {
        return "no methods configured".to_string();
    }
    causes
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<SensorError> for LocationError {
    fn from(e: SensorError) -> Self {
        match e {
            SensorError::PermissionDenied => Self::SensorPermissionDenied,
            SensorError::Timeout => Self::SensorTimeout,
            SensorError::PositionUnavailable | SensorError::Unsupported => {
                Self::SensorUnavailable
            }
        }
    }
}

/// Weather provider errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WeatherError {
    /// Non-2xx status, transport failure or malformed payload
    #[error("Weather provider error{}: {message}", status_suffix(.status))]
    Provider { status: Option<u16>, message: String },
    #[error("Location error: {0}")]
    Location(#[from] LocationError),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({})", s)).unwrap_or_default()
}

impl WeatherError {
    /// A payload that parsed but does not have the expected shape
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::Provider {
            status: None,
            message: message.into(),
        }
    }

    /// HTTP status of a provider failure, when there was a response
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Provider { status, .. } => *status,
            Self::Location(_) => None,
        }
    }
}
