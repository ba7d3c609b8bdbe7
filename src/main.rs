use std::process::ExitCode;

use anyhow::Result;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use clap::Parser;

use nimbus_core::{AppError, Config};
use nimbus_session::{SessionController, SessionPhase, SessionSnapshot};
use nimbus_weather::{CitySuggestion, Unit};

#[derive(Parser)]
#[command(name = "nimbus", version, about = "Current weather and 5-day forecast", long_about = None)]
struct Cli {
    /// City to show. Without it the location is detected automatically.
    city: Option<String>,

    /// Override the configured unit system.
    #[arg(long, value_parser = parse_unit)]
    unit: Option<Unit>,

    /// List autocomplete suggestions for a partial city name and exit.
    #[arg(long, conflicts_with = "city")]
    suggest: Option<String>,
}

fn parse_unit(s: &str) -> Result<Unit, String> {
    match s.to_lowercase().as_str() {
        "metric" | "c" => Ok(Unit::Metric),
        "imperial" | "f" => Ok(Unit::Imperial),
        other => Err(format!("unknown unit '{}' (expected metric or imperial)", other)),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = Config::load()?;
    nimbus_core::init(&config.logging.level)?;
    let (config, _) = config.into_validated()?;
    tracing::info!("Loaded config from {}", config.config_dir.display());

    let session = SessionController::from_config(&config).map_err(AppError::from)?;

    if let Some(query) = cli.suggest.as_deref() {
        let suggestions = session.suggest(query).await.unwrap_or_default();
        print_suggestions(&suggestions);
        return Ok(ExitCode::SUCCESS);
    }

    if let Some(unit) = cli.unit {
        session.set_unit(unit).await;
    }

    let snapshot = match cli.city.as_deref() {
        Some(city) => session.search(city).await,
        None => session.start().await,
    };

    Ok(report(snapshot))
}

fn report(snapshot: SessionSnapshot) -> ExitCode {
    match (snapshot.phase, snapshot.error) {
        (SessionPhase::Failed, Some(error)) => {
            let app_error = AppError::from(error);
            eprintln!("{}", app_error.user_message());
            eprintln!("  ({})", app_error);
            ExitCode::FAILURE
        }
        (phase, _) => {
            let (Some(position), Some(weather)) = (snapshot.position, snapshot.weather) else {
                eprintln!("No weather available (session is {:?})", phase);
                return ExitCode::FAILURE;
            };
            let unit = snapshot.unit;
            let current = &weather.current;
            let offset = i32::try_from(current.timezone_offset_seconds)
                .ok()
                .and_then(FixedOffset::east_opt)
                .unwrap_or_else(|| Utc.fix());

            println!("{}, {}", position.city(), position.country());
            if let Some(region) = position.region() {
                println!("  {}", region);
            }
            println!(
                "  {:.1}{} (feels like {:.1}{}), {}",
                current.temperature,
                unit.temperature_symbol(),
                current.feels_like,
                unit.temperature_symbol(),
                current.description
            );
            println!(
                "  Humidity {:.0}%  Pressure {:.0} hPa  Wind {:.1} {} from {:.0}°",
                current.humidity,
                current.pressure_hpa,
                current.wind_speed,
                unit.wind_speed_symbol(),
                current.wind_direction_deg
            );
            if let (Some(sunrise), Some(sunset)) = (current.sunrise, current.sunset) {
                println!(
                    "  Sunrise {}  Sunset {}",
                    local_time(sunrise, &offset, "%H:%M"),
                    local_time(sunset, &offset, "%H:%M")
                );
            }

            println!();
            for day in weather.forecast.days() {
                println!(
                    "  {}  {:>6.1} / {:>6.1}{}  {:<12} {:.1} mm",
                    local_time(day.date, &Utc.fix(), "%a %d %b"),
                    day.temp_min,
                    day.temp_max,
                    unit.temperature_symbol(),
                    day.condition.name(),
                    day.precipitation_mm
                );
            }
            ExitCode::SUCCESS
        }
    }
}

fn local_time(epoch: i64, offset: &FixedOffset, format: &str) -> String {
    DateTime::<Utc>::from_timestamp(epoch, 0)
        .map(|t| t.with_timezone(offset).format(format).to_string())
        .unwrap_or_else(|| "--".to_string())
}

fn print_suggestions(suggestions: &[CitySuggestion]) {
    if suggestions.is_empty() {
        println!("No matching cities");
        return;
    }
    for (i, s) in suggestions.iter().enumerate() {
        println!(
            "{}. {} ({:.2}, {:.2})",
            i + 1,
            s.display_name,
            s.latitude,
            s.longitude
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_unit() {
        assert_eq!(parse_unit("Imperial"), Ok(Unit::Imperial));
        assert_eq!(parse_unit("c"), Ok(Unit::Metric));
        assert!(parse_unit("kelvin").is_err());
    }

    #[test]
    fn test_local_time_applies_offset() {
        let offset = FixedOffset::east_opt(3600).unwrap();
        // 2024-06-01T12:00:00Z
        assert_eq!(local_time(1_717_243_200, &offset, "%H:%M"), "13:00");
    }

    #[test]
    fn test_cli_rejects_city_with_suggest() {
        assert!(Cli::try_parse_from(["nimbus", "Paris", "--suggest", "par"]).is_err());
        let cli = Cli::try_parse_from(["nimbus", "--unit", "imperial", "Oslo"]).unwrap();
        assert_eq!(cli.city.as_deref(), Some("Oslo"));
        assert_eq!(cli.unit, Some(Unit::Imperial));
    }
}
