//! Session orchestration: location then weather, with unit toggles, search and retry.
//!
//! Each operation takes a ticket from a monotonically increasing sequence and
//! publishes only while its ticket is the latest. Superseded operations run
//! to completion but their results are dropped.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::instrument;

use nimbus_weather::{
    CitySuggester, CitySuggestion, LocationError, LocationResolver, Position, ResolutionMethod,
    Unit, WeatherClient, WeatherReport,
};

use crate::error::SessionError;
use crate::state::{SessionPhase, SessionSnapshot};

/// An operation that can be re-run by `retry()`
#[derive(Debug, Clone, PartialEq)]
enum Request {
    Startup,
    Search(String),
    Suggestion(CitySuggestion),
    Refresh,
}

impl Request {
    fn first_phase(&self) -> SessionPhase {
        match self {
            Self::Startup | Self::Search(_) => SessionPhase::Resolving,
            Self::Suggestion(_) | Self::Refresh => SessionPhase::FetchingWeather,
        }
    }
}

struct Failure {
    error: SessionError,
    /// Whether the location stage succeeded before the failure
    located: bool,
}

impl Failure {
    fn before_location(error: impl Into<SessionError>) -> Self {
        Self {
            error: error.into(),
            located: false,
        }
    }

    fn after_location(error: impl Into<SessionError>) -> Self {
        Self {
            error: error.into(),
            located: true,
        }
    }
}

pub struct SessionController {
    resolver: LocationResolver,
    weather: WeatherClient,
    suggester: CitySuggester,
    latest: AtomicU64,
    state: watch::Sender<SessionSnapshot>,
    last_failed: Mutex<Option<Request>>,
}

impl SessionController {
    pub fn new(
        resolver: LocationResolver,
        weather: WeatherClient,
        suggester: CitySuggester,
        unit: Unit,
    ) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::new(unit));
        Self {
            resolver,
            weather,
            suggester,
            latest: AtomicU64::new(0),
            state,
            last_failed: Mutex::new(None),
        }
    }

    /// The current snapshot
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    /// Receive every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    /// Resolve the device position automatically, then fetch its weather
    #[instrument(skip(self), level = "info")]
    pub async fn start(&self) -> SessionSnapshot {
        self.run(Request::Startup).await
    }

    /// Resolve `text` as a city, then fetch weather for its coordinates
    #[instrument(skip(self), level = "info")]
    pub async fn search(&self, text: &str) -> SessionSnapshot {
        self.run(Request::Search(text.to_string())).await
    }

    /// Fetch weather by the suggestion's name, skipping the resolver.
    ///
    /// The published position comes from the returned conditions, so it can
    /// differ from what `search` would resolve for the same text.
    #[instrument(skip(self), level = "info")]
    pub async fn select_suggestion(&self, suggestion: &CitySuggestion) -> SessionSnapshot {
        self.run(Request::Suggestion(suggestion.clone())).await
    }

    /// Record the unit and re-fetch for the known position, if there is one
    #[instrument(skip(self), level = "info")]
    pub async fn set_unit(&self, unit: Unit) -> SessionSnapshot {
        self.state.send_modify(|snapshot| snapshot.unit = unit);
        self.refresh().await
    }

    /// Re-fetch weather for the known position under the current unit.
    /// Without a position this is a no-op.
    #[instrument(skip(self), level = "info")]
    pub async fn refresh(&self) -> SessionSnapshot {
        if self.state.borrow().position.is_none() {
            tracing::debug!("No position yet; nothing to refetch");
            return self.snapshot();
        }
        self.run(Request::Refresh).await
    }

    /// Drop weather and error, keeping position and unit.
    /// Operations still in flight are superseded.
    pub fn clear_weather(&self) -> SessionSnapshot {
        let ticket = self.next_ticket();
        self.publish(ticket, |snapshot| {
            snapshot.phase = SessionPhase::Idle;
            snapshot.weather = None;
            snapshot.error = None;
            *self.last_failed.lock() = None;
        });
        self.snapshot()
    }

    /// Re-run the last failed operation; no-op when nothing failed
    #[instrument(skip(self), level = "info")]
    pub async fn retry(&self) -> SessionSnapshot {
        let request = self.last_failed.lock().clone();
        match request {
            Some(request) => self.run(request).await,
            None => self.snapshot(),
        }
    }

    /// Debounced autocomplete; `None` when superseded by a newer call
    pub async fn suggest(&self, text: &str) -> Option<Vec<CitySuggestion>> {
        self.suggester.suggest(text).await
    }

    /// The visible suggestion list
    pub fn suggestions(&self) -> Vec<CitySuggestion> {
        self.suggester.current()
    }

    async fn run(&self, request: Request) -> SessionSnapshot {
        let ticket = self.next_ticket();

        self.publish(ticket, |snapshot| {
            snapshot.phase = request.first_phase();
            snapshot.error = None;
        });

        match self.execute(ticket, &request).await {
            Ok((position, report)) => {
                tracing::info!(
                    "Session ready: {} {:.1} {}",
                    position.city(),
                    report.current.temperature,
                    report.current.description
                );
                self.publish(ticket, |snapshot| {
                    snapshot.phase = SessionPhase::Ready;
                    snapshot.position = Some(position);
                    snapshot.weather = Some(report);
                    snapshot.error = None;
                    *self.last_failed.lock() = None;
                });
            }
            Err(failure) => {
                tracing::warn!("Session operation {:?} failed: {}", request, failure.error);
                self.publish(ticket, |snapshot| {
                    snapshot.phase = SessionPhase::Failed;
                    snapshot.weather = None;
                    if !failure.located {
                        snapshot.position = None;
                    }
                    snapshot.error = Some(failure.error);
                    *self.last_failed.lock() = Some(request);
                });
            }
        }

        self.snapshot()
    }

    async fn execute(
        &self,
        ticket: u64,
        request: &Request,
    ) -> Result<(Position, WeatherReport), Failure> {
        match request {
            Request::Startup => {
                let position = self
                    .resolver
                    .resolve()
                    .await
                    .map_err(Failure::before_location)?;
                self.fetch_for(ticket, position).await
            }
            Request::Search(text) => {
                let position = self
                    .resolver
                    .resolve_by_city_name(text)
                    .await
                    .map_err(Failure::before_location)?;
                self.fetch_for(ticket, position).await
            }
            Request::Refresh => {
                let position = self.state.borrow().position.clone();
                let position = position.ok_or_else(|| {
                    Failure::before_location(LocationError::InvalidInput(
                        "no position to refresh".to_string(),
                    ))
                })?;
                self.fetch_for(ticket, position).await
            }
            Request::Suggestion(suggestion) => self.fetch_suggestion(suggestion).await,
        }
    }

    /// Publish the resolved position, then fetch current + forecast for it.
    /// Weather from the previous cycle is withdrawn with the same update.
    async fn fetch_for(
        &self,
        ticket: u64,
        position: Position,
    ) -> Result<(Position, WeatherReport), Failure> {
        self.publish(ticket, |snapshot| {
            snapshot.phase = SessionPhase::FetchingWeather;
            snapshot.position = Some(position.clone());
            snapshot.weather = None;
        });

        let report = self
            .weather
            .fetch_by_coordinates(position.latitude(), position.longitude(), self.unit())
            .await
            .map_err(Failure::after_location)?;

        Ok((position, report))
    }

    async fn fetch_suggestion(
        &self,
        suggestion: &CitySuggestion,
    ) -> Result<(Position, WeatherReport), Failure> {
        let unit = self.unit();
        let current = self
            .weather
            .fetch_by_city_name(&suggestion.name, unit)
            .await
            .map_err(Failure::before_location)?;

        let position = Position::new(
            current.latitude,
            current.longitude,
            current.city_name.clone(),
            current.country.clone(),
            suggestion.region.clone(),
            ResolutionMethod::CitySearch,
        )
        .map_err(Failure::before_location)?;

        let forecast = self
            .weather
            .fetch_forecast(current.latitude, current.longitude, unit)
            .await
            .map_err(Failure::before_location)?;

        Ok((position, WeatherReport { current, forecast }))
    }

    fn unit(&self) -> Unit {
        self.state.borrow().unit
    }

    fn next_ticket(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_latest(&self, ticket: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket
    }

    /// Apply `update` only if `ticket` is still the latest operation
    fn publish(&self, ticket: u64, update: impl FnOnce(&mut SessionSnapshot)) -> bool {
        let published = self.state.send_if_modified(|snapshot| {
            if !self.is_latest(ticket) {
                return false;
            }
            update(snapshot);
            snapshot.generation = ticket;
            true
        });

        if !published {
            tracing::debug!("Dropping update from superseded operation {}", ticket);
        }
        published
    }
}
