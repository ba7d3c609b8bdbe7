//! Open-Meteo weather client.
//!
//! A fetch cycle asks for current conditions and the forecast at the same
//! time and publishes both or neither.

use chrono::{NaiveDate, NaiveDateTime};
use reqwest::Client;
use tracing::instrument;

use crate::geocode::Geocoder;
use crate::http::{get_json, Endpoints};
use crate::types::{
    ConditionClass, CurrentConditions, ForecastDay, ForecastSet, HourlySample, LocationError,
    Unit, WeatherError, WeatherReport, HOURLY_SAMPLES, UNKNOWN,
};

const CURRENT_FIELDS: &str = "temperature_2m,relative_humidity_2m,apparent_temperature,\
precipitation,weather_code,cloud_cover,pressure_msl,surface_pressure,wind_speed_10m,\
wind_direction_10m,visibility";
const DAILY_FIELDS: &str = "weather_code,temperature_2m_max,temperature_2m_min,sunrise,sunset,\
precipitation_sum,rain_sum,showers_sum,snowfall_sum,wind_speed_10m_max";
const HOURLY_FIELDS: &str = "temperature_2m,weather_code";
const FORECAST_REQUEST_DAYS: &str = "7";
/// Used when the provider does not report visibility
const DEFAULT_VISIBILITY_METERS: f64 = 10_000.0;
/// Half-width of the synthesized current temperature range
const SYNTHETIC_RANGE: f64 = 2.0;

/// Open-Meteo response payloads
mod open_meteo {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct CurrentResponse {
        #[serde(default)]
        pub utc_offset_seconds: i64,
        pub current: Current,
        pub daily: Option<SunTimes>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Current {
        pub time: String,
        pub temperature_2m: f64,
        pub relative_humidity_2m: f64,
        pub apparent_temperature: f64,
        pub weather_code: i64,
        #[serde(default)]
        pub cloud_cover: f64,
        pub pressure_msl: Option<f64>,
        pub surface_pressure: Option<f64>,
        pub wind_speed_10m: f64,
        #[serde(default)]
        pub wind_direction_10m: f64,
        pub visibility: Option<f64>,
    }

    #[derive(Debug, Deserialize)]
    pub struct SunTimes {
        #[serde(default)]
        pub sunrise: Vec<String>,
        #[serde(default)]
        pub sunset: Vec<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct ForecastResponse {
        #[serde(default)]
        pub utc_offset_seconds: i64,
        pub daily: Daily,
        pub hourly: Option<Hourly>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Daily {
        pub time: Vec<String>,
        pub weather_code: Vec<i64>,
        pub temperature_2m_max: Vec<f64>,
        pub temperature_2m_min: Vec<f64>,
        #[serde(default)]
        pub precipitation_sum: Vec<Option<f64>>,
        #[serde(default)]
        pub rain_sum: Vec<Option<f64>>,
        #[serde(default)]
        pub wind_speed_10m_max: Vec<Option<f64>>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Hourly {
        pub time: Vec<String>,
        pub temperature_2m: Vec<f64>,
        pub weather_code: Vec<i64>,
    }
}

/// Provider-local "YYYY-MM-DDTHH:MM" to epoch seconds
fn local_to_epoch(local: &str, utc_offset_seconds: i64) -> Option<i64> {
    NaiveDateTime::parse_from_str(local, "%Y-%m-%dT%H:%M")
        .ok()
        .map(|t| t.and_utc().timestamp() - utc_offset_seconds)
}

/// "YYYY-MM-DD" to UTC midnight epoch seconds
fn date_to_epoch(date: &str) -> Option<i64> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc().timestamp())
}

fn field<T: Copy>(values: &[T], index: usize, name: &str) -> Result<T, WeatherError> {
    values
        .get(index)
        .copied()
        .ok_or_else(|| WeatherError::malformed(format!("{} has no entry {}", name, index)))
}

#[derive(Debug, Clone)]
pub struct WeatherClient {
    client: Client,
    forecast_url: String,
    geocoder: Geocoder,
}

impl WeatherClient {
    pub fn new(client: Client, endpoints: &Endpoints) -> Self {
        Self {
            geocoder: Geocoder::new(client.clone(), endpoints),
            client,
            forecast_url: endpoints.forecast_url.clone(),
        }
    }

    /// Fetch current conditions and forecast concurrently.
    ///
    /// Either request failing fails the whole call; there is no partial report.
    #[instrument(skip(self), level = "info")]
    pub async fn fetch_by_coordinates(
        &self,
        latitude: f64,
        longitude: f64,
        unit: Unit,
    ) -> Result<WeatherReport, WeatherError> {
        let (current, forecast) = tokio::try_join!(
            self.fetch_current(latitude, longitude, unit),
            self.fetch_forecast(latitude, longitude, unit),
        )?;

        tracing::info!(
            "Fetched weather for {}: {} {}, {} forecast days",
            current.city_name,
            current.temperature,
            current.description,
            forecast.days().len()
        );

        Ok(WeatherReport { current, forecast })
    }

    /// Current conditions with place names from a best-effort reverse lookup
    #[instrument(skip(self), level = "info")]
    pub async fn fetch_current(
        &self,
        latitude: f64,
        longitude: f64,
        unit: Unit,
    ) -> Result<CurrentConditions, WeatherError> {
        let (observation, place) = tokio::join!(
            self.observe(latitude, longitude, unit),
            self.geocoder.reverse(latitude, longitude),
        );

        let mut conditions = observation?;
        if let Some(place) = place {
            conditions.city_name = place.city;
            conditions.country = place.country;
        }
        Ok(conditions)
    }

    /// Five-day forecast plus up to eight hourly samples
    #[instrument(skip(self), level = "info")]
    pub async fn fetch_forecast(
        &self,
        latitude: f64,
        longitude: f64,
        unit: Unit,
    ) -> Result<ForecastSet, WeatherError> {
        let mut query = self.base_query(latitude, longitude, unit);
        query.push(("daily", DAILY_FIELDS.to_string()));
        query.push(("hourly", HOURLY_FIELDS.to_string()));
        query.push(("forecast_days", FORECAST_REQUEST_DAYS.to_string()));

        let body: open_meteo::ForecastResponse =
            get_json(&self.client, &self.forecast_url, &query).await?;

        let daily = &body.daily;
        let mut days = Vec::with_capacity(daily.time.len());
        for (i, date) in daily.time.iter().enumerate() {
            let date = date_to_epoch(date)
                .ok_or_else(|| WeatherError::malformed(format!("bad forecast date: {}", date)))?;
            let temp_max = field(&daily.temperature_2m_max, i, "temperature_2m_max")?;
            let temp_min = field(&daily.temperature_2m_min, i, "temperature_2m_min")?;
            let code = field(&daily.weather_code, i, "weather_code")?;
            let (condition, _) = ConditionClass::classify(code);

            days.push(ForecastDay {
                date,
                temp_min,
                temp_max,
                temp_avg: (temp_max + temp_min) / 2.0,
                condition,
                precipitation_mm: daily.precipitation_sum.get(i).copied().flatten().unwrap_or(0.0),
                rain_mm: daily.rain_sum.get(i).copied().flatten().unwrap_or(0.0),
                wind_speed_max: daily.wind_speed_10m_max.get(i).copied().flatten().unwrap_or(0.0),
            });
        }

        let mut hourly = Vec::new();
        if let Some(h) = &body.hourly {
            for (i, time) in h.time.iter().enumerate().take(HOURLY_SAMPLES) {
                let Some(time) = local_to_epoch(time, body.utc_offset_seconds) else {
                    return Err(WeatherError::malformed(format!("bad hourly time: {}", time)));
                };
                let (condition, description) =
                    ConditionClass::classify(field(&h.weather_code, i, "hourly weather_code")?);
                hourly.push(HourlySample {
                    time,
                    temp: field(&h.temperature_2m, i, "hourly temperature_2m")?,
                    condition,
                    description: description.to_string(),
                });
            }
        }

        ForecastSet::from_entries(days, hourly)
    }

    /// Look a city up by name, then fetch its current conditions.
    ///
    /// City and country come from the geocoding match; the returned
    /// conditions carry the match's coordinates.
    #[instrument(skip(self), level = "info")]
    pub async fn fetch_by_city_name(
        &self,
        name: &str,
        unit: Unit,
    ) -> Result<CurrentConditions, WeatherError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LocationError::InvalidInput("city name is empty".to_string()).into());
        }

        let place = self
            .geocoder
            .lookup(name, 1)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| LocationError::CityNotFound(name.to_string()))?;

        let mut conditions = self.observe(place.latitude, place.longitude, unit).await?;
        conditions.city_name = place.name;
        conditions.country = place.country.unwrap_or_else(|| UNKNOWN.to_string());

        tracing::info!(
            "Fetched weather for '{}' at {}, {}",
            name,
            conditions.latitude,
            conditions.longitude
        );
        Ok(conditions)
    }

    fn base_query(&self, latitude: f64, longitude: f64, unit: Unit) -> Vec<(&'static str, String)> {
        vec![
            ("latitude", latitude.to_string()),
            ("longitude", longitude.to_string()),
            ("temperature_unit", unit.temperature_param().to_string()),
            ("wind_speed_unit", unit.wind_speed_param().to_string()),
            ("timezone", "auto".to_string()),
        ]
    }

    async fn observe(
        &self,
        latitude: f64,
        longitude: f64,
        unit: Unit,
    ) -> Result<CurrentConditions, WeatherError> {
        let mut query = self.base_query(latitude, longitude, unit);
        query.push(("current", CURRENT_FIELDS.to_string()));
        query.push(("daily", "sunrise,sunset".to_string()));
        query.push(("forecast_days", "1".to_string()));

        let body: open_meteo::CurrentResponse =
            get_json(&self.client, &self.forecast_url, &query).await?;
        let offset = body.utc_offset_seconds;
        let current = body.current;

        let observed_at = local_to_epoch(&current.time, offset).ok_or_else(|| {
            WeatherError::malformed(format!("bad observation time: {}", current.time))
        })?;
        let pressure_hpa = current
            .pressure_msl
            .or(current.surface_pressure)
            .ok_or_else(|| WeatherError::malformed("no pressure reading"))?;
        let (condition, description) = ConditionClass::classify(current.weather_code);
        let sun_time = |times: &[String]| times.first().and_then(|t| local_to_epoch(t, offset));
        let (sunrise, sunset) = match &body.daily {
            Some(d) => (sun_time(&d.sunrise), sun_time(&d.sunset)),
            None => (None, None),
        };

        Ok(CurrentConditions {
            temperature: current.temperature_2m,
            feels_like: current.apparent_temperature,
            temp_min: current.temperature_2m - SYNTHETIC_RANGE,
            temp_max: current.temperature_2m + SYNTHETIC_RANGE,
            humidity: current.relative_humidity_2m,
            pressure_hpa,
            description: description.to_string(),
            condition,
            wind_speed: current.wind_speed_10m,
            wind_direction_deg: current.wind_direction_10m.rem_euclid(360.0),
            cloud_cover_percent: current.cloud_cover,
            visibility_meters: current.visibility.unwrap_or(DEFAULT_VISIBILITY_METERS),
            sunrise,
            sunset,
            timezone_offset_seconds: offset,
            city_name: UNKNOWN.to_string(),
            country: UNKNOWN.to_string(),
            observed_at,
            latitude,
            longitude,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{current_body, forecast_body};
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> WeatherClient {
        WeatherClient::new(Client::new(), &Endpoints::with_base_url(&server.uri()))
    }

    async fn mount_current(server: &MockServer, template: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .and(query_param("forecast_days", "1"))
            .respond_with(template)
            .mount(server)
            .await;
    }

    async fn mount_forecast(server: &MockServer, template: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .and(query_param("forecast_days", "7"))
            .respond_with(template)
            .mount(server)
            .await;
    }

    #[test]
    fn test_local_to_epoch_applies_offset() {
        // 14:00 at UTC+2 is 12:00 UTC
        assert_eq!(local_to_epoch("2024-06-01T14:00", 7200), Some(1_717_243_200));
        assert_eq!(local_to_epoch("yesterday", 0), None);
    }

    #[test]
    fn test_date_to_epoch_is_utc_midnight() {
        assert_eq!(date_to_epoch("2024-06-01"), Some(1_717_200_000));
        assert_eq!(date_to_epoch("2024-13-01"), None);
    }

    #[tokio::test]
    async fn test_fetch_by_coordinates_combines_both_requests() {
        let server = MockServer::start().await;
        mount_current(&server, ResponseTemplate::new(200).set_body_json(current_body(21.0, 2))).await;
        mount_forecast(&server, ResponseTemplate::new(200).set_body_json(forecast_body(7))).await;
        Mock::given(method("GET"))
            .and(path("/reverse"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "address": { "city": "Paris", "country": "France" }
            })))
            .mount(&server)
            .await;

        let report = client(&server)
            .fetch_by_coordinates(48.85, 2.35, Unit::Metric)
            .await
            .unwrap();

        let current = &report.current;
        assert_eq!(current.temperature, 21.0);
        assert_eq!(current.temp_min, 19.0);
        assert_eq!(current.temp_max, 23.0);
        assert_eq!(current.condition, ConditionClass::Clouds);
        assert_eq!(current.description, "partly cloudy");
        assert_eq!(current.pressure_hpa, 1016.2);
        assert_eq!(current.visibility_meters, 10_000.0);
        assert_eq!(current.timezone_offset_seconds, 7200);
        assert_eq!(current.sunrise, local_to_epoch("2024-06-01T05:48", 7200));
        assert_eq!(current.city_name, "Paris");
        assert_eq!(current.country, "France");
        assert_eq!((current.latitude, current.longitude), (48.85, 2.35));

        let days = report.forecast.days();
        assert_eq!(days.len(), 5);
        assert_eq!(days[0].date, date_to_epoch("2024-06-01").unwrap());
        assert_eq!(days[4].date, date_to_epoch("2024-06-05").unwrap());
        assert_eq!(days[0].temp_avg, 15.0);
        assert_eq!(days[1].precipitation_mm, 0.0);
        assert_eq!(days[2].condition, ConditionClass::Rain);
        assert_eq!(days[0].wind_speed_max, 7.2);
        assert_eq!(report.forecast.hourly().len(), 8);
        assert_eq!(report.forecast.hourly()[0].description, "rain showers");
    }

    #[tokio::test]
    async fn test_reverse_failure_leaves_city_unknown() {
        let server = MockServer::start().await;
        mount_current(&server, ResponseTemplate::new(200).set_body_json(current_body(5.0, 0))).await;

        let current = client(&server)
            .fetch_current(10.0, 10.0, Unit::Metric)
            .await
            .unwrap();

        assert_eq!(current.city_name, UNKNOWN);
        assert_eq!(current.condition, ConditionClass::Clear);
    }

    #[tokio::test]
    async fn test_unit_selects_request_parameters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .and(query_param("forecast_days", "1"))
            .and(query_param("temperature_unit", "fahrenheit"))
            .and(query_param("wind_speed_unit", "mph"))
            .and(query_param("timezone", "auto"))
            .respond_with(ResponseTemplate::new(200).set_body_json(current_body(70.0, 0)))
            .expect(1)
            .mount(&server)
            .await;

        let current = client(&server)
            .fetch_current(40.7, -74.0, Unit::Imperial)
            .await
            .unwrap();

        // Values are passed through untouched
        assert_eq!(current.temperature, 70.0);
    }

    #[tokio::test]
    async fn test_forecast_failure_fails_whole_cycle() {
        let server = MockServer::start().await;
        mount_current(&server, ResponseTemplate::new(200).set_body_json(current_body(21.0, 2))).await;
        mount_forecast(&server, ResponseTemplate::new(502).set_body_string("upstream")).await;

        let err = client(&server)
            .fetch_by_coordinates(48.85, 2.35, Unit::Metric)
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(502));
    }

    #[tokio::test]
    async fn test_current_failure_fails_whole_cycle() {
        let server = MockServer::start().await;
        mount_current(&server, ResponseTemplate::new(500)).await;
        mount_forecast(&server, ResponseTemplate::new(200).set_body_json(forecast_body(7))).await;

        let err = client(&server)
            .fetch_by_coordinates(48.85, 2.35, Unit::Metric)
            .await
            .unwrap_err();

        assert!(matches!(err, WeatherError::Provider { status: Some(500), .. }));
    }

    #[tokio::test]
    async fn test_short_forecast_is_malformed() {
        let server = MockServer::start().await;
        mount_forecast(&server, ResponseTemplate::new(200).set_body_json(forecast_body(3))).await;

        let err = client(&server)
            .fetch_forecast(48.85, 2.35, Unit::Metric)
            .await
            .unwrap_err();

        assert!(matches!(err, WeatherError::Provider { status: None, .. }));
    }

    #[tokio::test]
    async fn test_pressure_falls_back_to_surface() {
        let server = MockServer::start().await;
        let mut body = current_body(12.0, 3);
        body["current"]["pressure_msl"] = serde_json::Value::Null;
        body["current"]["visibility"] = serde_json::json!(2400.0);
        mount_current(&server, ResponseTemplate::new(200).set_body_json(body)).await;

        let current = client(&server)
            .fetch_current(1.0, 1.0, Unit::Metric)
            .await
            .unwrap();

        assert_eq!(current.pressure_hpa, 1008.0);
        assert_eq!(current.visibility_meters, 2400.0);
    }

    #[tokio::test]
    async fn test_fetch_by_city_name_uses_geocoding_match() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .and(query_param("name", "Oslo"))
            .and(query_param("count", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{ "id": 3143244, "name": "Oslo", "latitude": 59.91, "longitude": 10.75,
                              "country": "Norway", "admin1": "Oslo" }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .and(query_param("latitude", "59.91"))
            .and(query_param("longitude", "10.75"))
            .respond_with(ResponseTemplate::new(200).set_body_json(current_body(8.0, 71)))
            .mount(&server)
            .await;

        let current = client(&server)
            .fetch_by_city_name("Oslo", Unit::Metric)
            .await
            .unwrap();

        assert_eq!(current.city_name, "Oslo");
        assert_eq!(current.country, "Norway");
        assert_eq!((current.latitude, current.longitude), (59.91, 10.75));
        assert_eq!(current.condition, ConditionClass::Snow);
    }

    #[tokio::test]
    async fn test_fetch_by_city_name_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let err = client(&server)
            .fetch_by_city_name("Atlantis", Unit::Metric)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            WeatherError::Location(LocationError::CityNotFound("Atlantis".into()))
        );
    }

    #[tokio::test]
    async fn test_fetch_by_city_name_rejects_blank() {
        let server = MockServer::start().await;
        let err = client(&server)
            .fetch_by_city_name("  ", Unit::Metric)
            .await
            .unwrap_err();

        assert!(matches!(err, WeatherError::Location(LocationError::InvalidInput(_))));
    }
}
