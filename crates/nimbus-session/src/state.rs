use nimbus_weather::{Position, Unit, WeatherReport};

use crate::error::SessionError;

/// Where the session is in its resolve/fetch cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// Nothing has been requested yet
    #[default]
    Idle,
    Resolving,
    FetchingWeather,
    Ready,
    /// The last operation failed; `retry()` re-runs it
    Failed,
}

/// Immutable view of the session, replaced wholesale on every change
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub unit: Unit,
    pub position: Option<Position>,
    pub weather: Option<WeatherReport>,
    pub error: Option<SessionError>,
    /// Ticket of the operation that last wrote this snapshot; 0 before any
    pub generation: u64,
}

impl SessionSnapshot {
    pub fn new(unit: Unit) -> Self {
        Self {
            phase: SessionPhase::Idle,
            unit,
            position: None,
            weather: None,
            error: None,
            generation: 0,
        }
    }
}
